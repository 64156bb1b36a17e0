//! Outbound notifications.
//!
//! [`OutboundMessage`] models the three message shapes the bot sends (plain
//! text, text with buttons, carousels) and enforces the platform's template
//! limits. [`Composer`] sends them, splitting long text and large carousels
//! into several messages.

mod chunk;
mod composer;
mod message;

use thiserror::Error;

use crate::platform::PlatformError;

pub use chunk::{MAX_MESSAGE_LENGTH, chunk_text};
pub use composer::Composer;
pub use message::{Button, Element, MAX_BUTTONS, MAX_ELEMENTS, OutboundMessage};

/// A message that exceeds a template limit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComposeError {
    #[error("too many buttons: {0} (at most {max})", max = MAX_BUTTONS)]
    TooManyButtons(usize),

    #[error("too many carousel elements: {0} (at most {max})", max = MAX_ELEMENTS)]
    TooManyElements(usize),
}

/// Errors from sending a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error(transparent)]
    Compose(#[from] ComposeError),

    /// A message (or one chunk of a multi-part message) was not delivered.
    #[error("failed to send part {part} of {total}: {source}")]
    Send {
        part: usize,
        total: usize,
        #[source]
        source: PlatformError,
    },
}

impl NotifyError {
    /// The underlying platform error, if sending failed.
    pub fn platform_error(&self) -> Option<&PlatformError> {
        match self {
            NotifyError::Compose(_) => None,
            NotifyError::Send { source, .. } => Some(source),
        }
    }
}
