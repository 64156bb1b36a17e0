//! Postback action routing.
//!
//! Buttons sent to users carry an encoded [`ActionPayload`]; when a button
//! is tapped the payload comes back as a postback event and
//! [`ActionRegistry::route`] decodes it into a typed [`Action`].
//!
//! # Example
//!
//! ```
//! use confessions_bot::actions::{Action, ActionKind, ActionRegistry};
//!
//! let registry = ActionRegistry::new(&ActionKind::ALL);
//! let payload = Action::ListPages.to_payload().encode();
//! assert_eq!(registry.route(&payload).unwrap(), Action::ListPages);
//! ```

mod payload;
mod registry;

use thiserror::Error;

pub use payload::{ACTION_TYPE, ActionArgs, ActionPayload};
pub use registry::{Action, ActionKind, ActionRegistry};

/// Errors raised while decoding or routing a postback payload.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The payload is not a JSON object with a string `action`.
    #[error("malformed postback payload: {0}")]
    Malformed(String),

    /// The payload has no `type` tag.
    #[error("no 'type' included in postback")]
    MissingType,

    /// The payload's `type` is not `"action"`.
    #[error("unrecognized postback type '{0}'")]
    UnrecognizedType(String),

    /// The action name is not in the registry.
    #[error("no handler registered for action '{0}'")]
    NoHandler(String),

    /// `args` is not a flat object of primitives.
    #[error("invalid postback arguments: {0}")]
    InvalidArguments(String),

    #[error("action '{action}' is missing argument '{name}'")]
    MissingArgument { action: String, name: &'static str },

    #[error("action '{action}' has invalid argument '{name}': {value}")]
    InvalidArgument {
        action: String,
        name: &'static str,
        value: String,
    },
}
