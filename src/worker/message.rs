//! Units of background work.

use crate::types::SenderId;

/// Which handler a unit is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    /// An incoming text message; `data` is the text.
    Message,
    /// A button tap; `data` is the opaque payload.
    Postback,
}

impl HandlerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerKind::Message => "message",
            HandlerKind::Postback => "postback",
        }
    }
}

/// One event handed to the worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    pub kind: HandlerKind,
    pub sender: SenderId,
    pub recipient: SenderId,
    pub data: String,
}

impl WorkUnit {
    pub fn message(sender: SenderId, recipient: SenderId, text: impl Into<String>) -> Self {
        WorkUnit {
            kind: HandlerKind::Message,
            sender,
            recipient,
            data: text.into(),
        }
    }

    pub fn postback(sender: SenderId, recipient: SenderId, payload: impl Into<String>) -> Self {
        WorkUnit {
            kind: HandlerKind::Postback,
            sender,
            recipient,
            data: payload.into(),
        }
    }
}
