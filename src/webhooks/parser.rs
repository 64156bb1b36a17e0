//! Webhook envelope parser.
//!
//! Deliveries look like:
//!
//! ```text
//! {
//!   "object": "page",
//!   "entry": [
//!     { "messaging": [
//!         { "sender": {"id": "..."}, "recipient": {"id": "..."},
//!           "message": {"text": "..."} },
//!         { "sender": {"id": "..."}, "recipient": {"id": "..."},
//!           "postback": {"payload": "..."} }
//!     ] }
//!   ]
//! }
//! ```
//!
//! # Parsing Strategy
//!
//! 1. Envelopes for objects other than `"page"` yield no events (ignored, not error)
//! 2. Each messaging entry yields a message event, a postback event, both, or nothing
//! 3. Unknown fields are ignored
//! 4. Structurally malformed envelopes return `Err`

use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::{debug, info};

use crate::types::SenderId;

use super::events::MessagingEvent;

/// The only envelope object type that carries messaging events.
const PAGE_OBJECT: &str = "page";

/// Error type for webhook parsing failures.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON deserialization failed (includes missing required fields).
    #[error("malformed webhook envelope: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parses a raw webhook body into its messaging events, in delivery order.
///
/// # Returns
///
/// * `Ok(events)` - possibly empty (non-page objects, entries with no content)
/// * `Err(e)` - the envelope does not have the expected shape
///
/// # Examples
///
/// ```
/// use confessions_bot::webhooks::{MessagingEvent, parse_webhook};
///
/// let body = br#"{
///     "object": "page",
///     "entry": [{ "messaging": [{
///         "sender": { "id": "123" },
///         "recipient": { "id": "456" },
///         "message": { "text": "hello" }
///     }]}]
/// }"#;
///
/// let events = parse_webhook(body).unwrap();
/// assert_eq!(events.len(), 1);
/// assert!(matches!(&events[0], MessagingEvent::Message { text, .. } if text == "hello"));
/// ```
pub fn parse_webhook(payload: &[u8]) -> Result<Vec<MessagingEvent>, ParseError> {
    let raw: RawEnvelope = serde_json::from_slice(payload)?;
    Ok(flatten(raw))
}

fn flatten(raw: RawEnvelope) -> Vec<MessagingEvent> {
    if raw.object != PAGE_OBJECT {
        debug!(object = %raw.object, "Ignoring webhook for non-page object");
        return Vec::new();
    }

    let mut events = Vec::new();
    for entry in raw.entry {
        for messaging in entry.messaging {
            let sender = SenderId::new(messaging.sender.id);
            let recipient = SenderId::new(messaging.recipient.id);

            if let Some(message) = messaging.message {
                let text = match message.text {
                    Some(text) => text,
                    None => {
                        info!(sender = %sender, "Received message without text");
                        String::new()
                    }
                };
                events.push(MessagingEvent::Message {
                    sender: sender.clone(),
                    recipient: recipient.clone(),
                    text,
                });
            }

            if let Some(postback) = messaging.postback {
                match postback.payload {
                    Some(payload) => events.push(MessagingEvent::Postback {
                        sender,
                        recipient,
                        payload,
                    }),
                    None => info!(sender = %sender, "Received postback without payload"),
                }
            }
        }
    }
    events
}

// ============================================================================
// Raw payload structures for deserialization
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    object: String,
    #[serde(default)]
    entry: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(default)]
    messaging: Vec<RawMessaging>,
}

#[derive(Debug, Deserialize)]
struct RawMessaging {
    sender: RawParty,
    recipient: RawParty,
    message: Option<RawMessage>,
    postback: Option<RawPostback>,
}

#[derive(Debug, Deserialize)]
struct RawParty {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPostback {
    payload: Option<String>,
}

/// Ids are documented as strings, but test tools routinely send numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(u64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}
