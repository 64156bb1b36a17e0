//! Messaging event types.
//!
//! A webhook delivery batches any number of messaging entries. The parser
//! flattens them into [`MessagingEvent`] values carrying only what the bot
//! acts on.

use serde::{Deserialize, Serialize};

use crate::types::SenderId;

/// A single event extracted from a webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessagingEvent {
    /// Someone sent the page a message.
    ///
    /// Attachments and stickers arrive without text; those are normalized to
    /// an empty string rather than dropped.
    Message {
        sender: SenderId,
        recipient: SenderId,
        text: String,
    },

    /// Someone tapped a postback button in an earlier message.
    ///
    /// The payload is opaque here; [`crate::actions::ActionPayload::decode`]
    /// interprets it.
    Postback {
        sender: SenderId,
        recipient: SenderId,
        payload: String,
    },
}

impl MessagingEvent {
    pub fn sender(&self) -> &SenderId {
        match self {
            MessagingEvent::Message { sender, .. } => sender,
            MessagingEvent::Postback { sender, .. } => sender,
        }
    }

    pub fn recipient(&self) -> &SenderId {
        match self {
            MessagingEvent::Message { recipient, .. } => recipient,
            MessagingEvent::Postback { recipient, .. } => recipient,
        }
    }

    /// Returns true for message events the page sent to itself (echoes).
    ///
    /// Postbacks are never considered self-addressed: they are moderator
    /// actions even when the moderator is the page.
    pub fn is_self_message(&self) -> bool {
        match self {
            MessagingEvent::Message {
                sender, recipient, ..
            } => sender == recipient,
            MessagingEvent::Postback { .. } => false,
        }
    }
}
