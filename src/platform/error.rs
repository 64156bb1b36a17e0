//! Platform API error types.
//!
//! Errors are classified so callers can tell a flaky platform from a request
//! that will never succeed:
//!
//! - **Transient**: timeouts, connection failures, HTTP 5xx and 429
//! - **Permanent**: everything else (bad tokens, missing permissions, invalid ids)
//!
//! Nothing is retried automatically. A timed-out publish is treated
//! exactly like any other failed publish. The classification is there for
//! logging and for the moderator-facing error text.

use std::fmt;

use thiserror::Error;

/// The kind of platform error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformErrorKind {
    /// The request may succeed if repeated later.
    Transient,

    /// The request is wrong or not permitted; repeating it will not help.
    Permanent,
}

/// An error returned by a call to the platform API.
#[derive(Debug, Error)]
pub struct PlatformError {
    pub kind: PlatformErrorKind,

    /// The HTTP status code, if a response was received.
    pub status_code: Option<u16>,

    pub message: String,

    /// Whether the request hit the client deadline.
    pub timed_out: bool,

    #[source]
    pub source: Option<reqwest::Error>,
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "platform API error (HTTP {}): {}", code, self.message),
            None => write!(f, "platform API error: {}", self.message),
        }
    }
}

impl PlatformError {
    /// Categorizes a transport-level error from the HTTP client.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        let status_code = err.status().map(|s| s.as_u16());
        let timed_out = err.is_timeout();
        let kind = if timed_out || err.is_connect() || err.is_request() {
            PlatformErrorKind::Transient
        } else {
            match status_code {
                Some(code) => kind_for_status(code),
                None => PlatformErrorKind::Permanent,
            }
        };

        Self {
            kind,
            status_code,
            message: err.to_string(),
            timed_out,
            source: Some(err),
        }
    }

    /// Builds an error from a non-success HTTP response.
    ///
    /// Graph API error bodies look like `{"error": {"message": "...", ...}}`;
    /// the inner message is used when present, the raw body otherwise.
    pub fn from_response(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| {
                v.get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| body.to_string());

        Self {
            kind: kind_for_status(status),
            status_code: Some(status),
            message,
            timed_out: false,
            source: None,
        }
    }

    /// A successful response that lacked something we needed.
    pub fn unexpected_response(message: impl Into<String>) -> Self {
        Self {
            kind: PlatformErrorKind::Permanent,
            status_code: None,
            message: message.into(),
            timed_out: false,
            source: None,
        }
    }

    /// A request that hit the client deadline.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: PlatformErrorKind::Transient,
            status_code: None,
            message: message.into(),
            timed_out: true,
            source: None,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == PlatformErrorKind::Transient
    }
}

fn kind_for_status(code: u16) -> PlatformErrorKind {
    match code {
        429 => PlatformErrorKind::Transient,
        code if (500..600).contains(&code) => PlatformErrorKind::Transient,
        _ => PlatformErrorKind::Permanent,
    }
}
