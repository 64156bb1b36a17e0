//! Process configuration.
//!
//! Everything the bot needs from its environment is read once at startup
//! into a [`Config`] value, which is then passed to the components that need
//! it. Nothing reads the environment after that.
//!
//! # Variables
//!
//! | Variable | Required | Default |
//! |---|---|---|
//! | `APP_SECRET` | yes | |
//! | `VERIFY_TOKEN` | yes | |
//! | `APP_ID` | yes | |
//! | `PAGE_ACCESS_TOKEN` | yes | |
//! | `URL` | yes | |
//! | `ADMIN_SENDER_ID` | no | |
//! | `DISABLED` | no | `0` |
//! | `BIND_ADDR` | no | `0.0.0.0:3000` |
//! | `GRAPH_BASE_URL` | no | `https://graph.facebook.com/v2.9/` |
//! | `STATE_PATH` | no | in-memory only |
//! | `WORKER_COUNT` | no | `4` |
//! | `QUEUE_CAPACITY` | no | `256` |
//! | `REQUEST_TIMEOUT_SECS` | no | `10` |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;
use thiserror::Error;

use crate::types::{ChannelId, SenderId};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.facebook.com/v2.9/";
const DEFAULT_WORKER_COUNT: usize = 4;
const DEFAULT_QUEUE_CAPACITY: usize = 256;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// The OAuth dialog the moderator is sent to for granting page access.
const OAUTH_DIALOG_URL: &str = "https://www.facebook.com/v2.9/dialog/oauth";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Runtime configuration.
#[derive(Clone)]
pub struct Config {
    /// Address the HTTP server listens on.
    pub bind_addr: SocketAddr,

    /// Externally reachable base URL of this service, used for the login
    /// redirect and the submission links handed to moderators.
    pub base_url: Url,

    pub app_id: String,

    /// Shared secret for webhook signatures and the OAuth code exchange.
    pub app_secret: String,

    /// Token the platform must echo during the webhook verification handshake.
    pub verify_token: String,

    /// The bot's own page token, used for sending messages.
    pub page_access_token: String,

    /// Receives error reports and may run admin commands.
    pub admin_sender_id: Option<SenderId>,

    /// When set, every user gets an "offline" reply and nothing else runs.
    pub disabled: bool,

    /// Graph API base, ending in `/`.
    pub graph_base_url: String,

    /// Snapshot file for persisted state. `None` keeps state in memory.
    pub state_path: Option<PathBuf>,

    /// Number of background workers draining the work queue.
    pub worker_count: usize,

    /// Capacity of the work queue. Enqueueing into a full queue fails.
    pub queue_capacity: usize,

    /// Deadline for every call to the platform.
    pub request_timeout: Duration,
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| -> Result<String, ConfigError> {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(name))
        };
        let optional = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let base_url = required("URL")?;
        let base_url = Url::parse(&base_url).map_err(|e| ConfigError::Invalid {
            name: "URL",
            reason: e.to_string(),
        })?;

        let mut graph_base_url =
            optional("GRAPH_BASE_URL").unwrap_or_else(|| DEFAULT_GRAPH_BASE_URL.to_string());
        if !graph_base_url.ends_with('/') {
            graph_base_url.push('/');
        }

        Ok(Config {
            bind_addr: parse_or("BIND_ADDR", optional("BIND_ADDR"), || {
                DEFAULT_BIND_ADDR.parse()
            })?,
            base_url,
            app_id: required("APP_ID")?,
            app_secret: required("APP_SECRET")?,
            verify_token: required("VERIFY_TOKEN")?,
            page_access_token: required("PAGE_ACCESS_TOKEN")?,
            admin_sender_id: optional("ADMIN_SENDER_ID").map(SenderId::new),
            disabled: optional("DISABLED").as_deref() == Some("1"),
            graph_base_url,
            state_path: optional("STATE_PATH").map(PathBuf::from),
            worker_count: parse_or("WORKER_COUNT", optional("WORKER_COUNT"), || {
                Ok::<_, std::num::ParseIntError>(DEFAULT_WORKER_COUNT)
            })?
            .max(1),
            queue_capacity: parse_or("QUEUE_CAPACITY", optional("QUEUE_CAPACITY"), || {
                Ok::<_, std::num::ParseIntError>(DEFAULT_QUEUE_CAPACITY)
            })?
            .max(1),
            request_timeout: Duration::from_secs(parse_or(
                "REQUEST_TIMEOUT_SECS",
                optional("REQUEST_TIMEOUT_SECS"),
                || Ok::<_, std::num::ParseIntError>(DEFAULT_REQUEST_TIMEOUT_SECS),
            )?),
        })
    }

    /// The OAuth redirect target for `sender`: `<base>/login?sender=<id>`.
    ///
    /// The same string must be used for the dialog and the code exchange.
    pub fn login_redirect_uri(&self, sender: &SenderId) -> String {
        let mut url = self.base_url.clone();
        url.set_path("/login");
        url.query_pairs_mut()
            .clear()
            .append_pair("sender", sender.as_str());
        url.to_string()
    }

    /// The OAuth dialog URL that asks `sender` for `scopes`.
    pub fn login_url(&self, sender: &SenderId, scopes: &[&str]) -> String {
        let redirect_uri = self.login_redirect_uri(sender);
        let scope = scopes.join(",");
        match Url::parse_with_params(
            OAUTH_DIALOG_URL,
            &[
                ("display", "popup"),
                ("redirect_uri", redirect_uri.as_str()),
                ("client_id", self.app_id.as_str()),
                ("scope", scope.as_str()),
            ],
        ) {
            Ok(url) => url.to_string(),
            // OAUTH_DIALOG_URL is a valid constant.
            Err(_) => OAUTH_DIALOG_URL.to_string(),
        }
    }

    /// Where submissions for `channel` are posted.
    pub fn submission_url(&self, channel: &ChannelId) -> String {
        let mut url = self.base_url.clone();
        url.set_path(&format!("/channels/{}/items", channel));
        url.set_query(None);
        url.to_string()
    }
}

fn parse_or<T, E, D>(name: &'static str, value: Option<String>, default: D) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    D: FnOnce() -> Result<T, E>,
    E: std::fmt::Display,
{
    match value {
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: format!("{:?}: {}", value, e),
        }),
        None => default().map_err(|e| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
    }
}

// Secrets stay out of logs.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bind_addr", &self.bind_addr)
            .field("base_url", &self.base_url.as_str())
            .field("app_id", &self.app_id)
            .field("admin_sender_id", &self.admin_sender_id)
            .field("disabled", &self.disabled)
            .field("graph_base_url", &self.graph_base_url)
            .field("state_path", &self.state_path)
            .field("worker_count", &self.worker_count)
            .field("queue_capacity", &self.queue_capacity)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config::from_lookup(|name| {
        match name {
            "URL" => Some("https://bot.example.com"),
            "APP_ID" => Some("app-id"),
            "APP_SECRET" => Some("app-secret"),
            "VERIFY_TOKEN" => Some("verify-me"),
            "PAGE_ACCESS_TOKEN" => Some("page-token"),
            "ADMIN_SENDER_ID" => Some("ADMIN"),
            _ => None,
        }
        .map(str::to_string)
    })
    .unwrap()
}
