//! Webhook endpoint handlers.
//!
//! `POST /` validates the signature before anything in the body is looked
//! at, then parses the delivery. Message events go to the worker pool;
//! postbacks are handled before the response is sent. The platform only
//! needs to see `200 ok`, so nothing after the signature check changes the
//! response.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::AppState;
use crate::persistence::Store;
use crate::platform::Platform;
use crate::webhooks::{MessagingEvent, parse_webhook, verify_signature};
use crate::worker::WorkUnit;

/// Header carrying `sha1=<hex>` over the raw body.
const HEADER_SIGNATURE: &str = "x-hub-signature";

/// Served on `GET /` outside of the verification handshake.
const LANDING_TEXT: &str = "Confessions!";

/// Why a delivery was refused.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing X-Hub-Signature header")]
    MissingSignature,

    #[error("invalid signature")]
    InvalidSignature,
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}

/// Query parameters of the verification handshake.
#[derive(Debug, Default, Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
}

/// Webhook verification handler.
///
/// # Response
///
/// - 200 OK echoing `hub.challenge` when the handshake token matches
/// - 403 Forbidden when it does not
/// - 200 OK with the landing text when no handshake is requested
pub async fn verify_handler<P: Platform, S: Store>(
    State(app_state): State<AppState<P, S>>,
    Query(params): Query<VerifyParams>,
) -> (StatusCode, String) {
    match (params.mode.as_deref(), params.challenge) {
        (Some("subscribe"), Some(challenge)) if !challenge.is_empty() => {
            if params.verify_token.as_deref() == Some(app_state.config().verify_token.as_str()) {
                info!("Webhook verified");
                (StatusCode::OK, challenge)
            } else {
                warn!("Webhook verification token mismatch");
                (
                    StatusCode::FORBIDDEN,
                    "Verification token mismatch".to_string(),
                )
            }
        }
        _ => (StatusCode::OK, LANDING_TEXT.to_string()),
    }
}

/// Webhook delivery handler.
///
/// # Response
///
/// - 200 OK with `ok` once the signature is valid, even if the body turns
///   out to be malformed or the work queue is full
/// - 400 Bad Request on a missing or wrong signature
pub async fn webhook_handler<P: Platform, S: Store>(
    State(app_state): State<AppState<P, S>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str), WebhookError> {
    let signature_header = headers
        .get(HEADER_SIGNATURE)
        .and_then(|v| v.to_str().ok())
        .ok_or(WebhookError::MissingSignature)?;

    if !verify_signature(&body, signature_header, app_state.config().app_secret.as_bytes()) {
        warn!(bytes = body.len(), "Invalid webhook signature");
        return Err(WebhookError::InvalidSignature);
    }

    let events = match parse_webhook(&body) {
        Ok(events) => events,
        Err(e) => {
            warn!(error = %e, "Malformed webhook delivery");
            return Ok((StatusCode::OK, "ok"));
        }
    };
    debug!(events = events.len(), "Received webhook");

    for event in events {
        if event.is_self_message() {
            debug!(sender = %event.sender(), "Ignoring message to self");
            continue;
        }
        match event {
            MessagingEvent::Message {
                sender,
                recipient,
                text,
            } => {
                let unit = WorkUnit::message(sender, recipient, text);
                let sender = unit.sender.clone();
                if let Err(e) = app_state.dispatcher().enqueue(unit) {
                    warn!(sender = %sender, error = %e, "Could not queue message");
                    app_state
                        .bot()
                        .report_error(&format!("Dropped message from {}: {}", sender, e))
                        .await;
                }
            }
            MessagingEvent::Postback {
                sender,
                recipient,
                payload,
            } => {
                app_state
                    .bot()
                    .run_inline(&WorkUnit::postback(sender, recipient, payload))
                    .await;
            }
        }
    }

    Ok((StatusCode::OK, "ok"))
}
