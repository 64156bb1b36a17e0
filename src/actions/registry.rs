//! The static action registry and typed actions.
//!
//! Postback payloads name their action by string. The registry maps those
//! names onto a closed set of [`ActionKind`]s, built once per persona at
//! startup and never modified afterwards. Names outside the table are a
//! typed [`ActionError::NoHandler`] error.

use std::collections::HashMap;

use crate::types::{ChannelId, ItemId};

use super::ActionError;
use super::payload::{ActionArgs, ActionPayload};

/// Every action the bot knows how to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// Greets a new moderator and offers the login button.
    SendWelcome,
    /// Starts the page-listing flow (which needs a login first).
    ListPages,
    /// Registers a page as a managed channel.
    ManagePage,
    /// Approves and publishes a pending item.
    AcceptItem,
    /// Discards a pending item.
    RejectItem,
    /// Resends every pending item.
    SendPending,
}

impl ActionKind {
    pub const ALL: [ActionKind; 6] = [
        ActionKind::SendWelcome,
        ActionKind::ListPages,
        ActionKind::ManagePage,
        ActionKind::AcceptItem,
        ActionKind::RejectItem,
        ActionKind::SendPending,
    ];

    /// The wire name used in postback payloads.
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::SendWelcome => "send_welcome",
            ActionKind::ListPages => "list_pages",
            ActionKind::ManagePage => "manage_page",
            ActionKind::AcceptItem => "accept_item",
            ActionKind::RejectItem => "reject_item",
            ActionKind::SendPending => "send_pending",
        }
    }
}

/// A fully decoded action with typed arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    SendWelcome,
    ListPages,
    ManagePage {
        page_id: ChannelId,
        name: String,
        token: String,
    },
    AcceptItem {
        item_id: ItemId,
    },
    RejectItem {
        item_id: ItemId,
    },
    SendPending,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::SendWelcome => ActionKind::SendWelcome,
            Action::ListPages => ActionKind::ListPages,
            Action::ManagePage { .. } => ActionKind::ManagePage,
            Action::AcceptItem { .. } => ActionKind::AcceptItem,
            Action::RejectItem { .. } => ActionKind::RejectItem,
            Action::SendPending => ActionKind::SendPending,
        }
    }

    /// Builds the payload a button should carry to trigger this action.
    pub fn to_payload(&self) -> ActionPayload {
        let args = match self {
            Action::SendWelcome | Action::ListPages | Action::SendPending => ActionArgs::new(),
            Action::ManagePage {
                page_id,
                name,
                token,
            } => ActionArgs::new()
                .with("page_id", page_id.as_str())
                .with("name", name.as_str())
                .with("token", token.as_str()),
            Action::AcceptItem { item_id } | Action::RejectItem { item_id } => {
                ActionArgs::new().with("item_id", item_id.0)
            }
        };
        ActionPayload::new(self.kind().name(), args)
    }

    /// Reads the typed arguments for `kind` out of `args`.
    fn from_args(kind: ActionKind, args: &ActionArgs) -> Result<Action, ActionError> {
        let name = kind.name();
        Ok(match kind {
            ActionKind::SendWelcome => Action::SendWelcome,
            ActionKind::ListPages => Action::ListPages,
            ActionKind::SendPending => Action::SendPending,
            ActionKind::ManagePage => Action::ManagePage {
                page_id: ChannelId::new(args.require_str(name, "page_id")?),
                name: args.require_str(name, "name")?.to_string(),
                token: args.require_str(name, "token")?.to_string(),
            },
            ActionKind::AcceptItem => Action::AcceptItem {
                item_id: ItemId(args.require_u64(name, "item_id")?),
            },
            ActionKind::RejectItem => Action::RejectItem {
                item_id: ItemId(args.require_u64(name, "item_id")?),
            },
        })
    }
}

/// The closed table of actions a persona accepts.
#[derive(Debug, Clone)]
pub struct ActionRegistry {
    handlers: HashMap<&'static str, ActionKind>,
}

impl ActionRegistry {
    /// Builds a registry accepting exactly `kinds`.
    pub fn new(kinds: &[ActionKind]) -> Self {
        ActionRegistry {
            handlers: kinds.iter().map(|kind| (kind.name(), *kind)).collect(),
        }
    }

    /// Returns true if `kind` is registered.
    pub fn contains(&self, kind: ActionKind) -> bool {
        self.handlers.get(kind.name()) == Some(&kind)
    }

    /// Looks up the handler for an action name.
    pub fn resolve(&self, name: &str) -> Result<ActionKind, ActionError> {
        self.handlers
            .get(name)
            .copied()
            .ok_or_else(|| ActionError::NoHandler(name.to_string()))
    }

    /// Decodes an opaque postback payload into a typed action.
    ///
    /// # Examples
    ///
    /// ```
    /// use confessions_bot::actions::{Action, ActionKind, ActionRegistry};
    /// use confessions_bot::types::ItemId;
    ///
    /// let registry = ActionRegistry::new(&ActionKind::ALL);
    /// let payload = Action::AcceptItem { item_id: ItemId(3) }.to_payload().encode();
    ///
    /// assert_eq!(registry.route(&payload).unwrap(), Action::AcceptItem { item_id: ItemId(3) });
    /// assert!(registry.route(r#"{"type":"action","action":"__init__"}"#).is_err());
    /// ```
    pub fn route(&self, payload: &str) -> Result<Action, ActionError> {
        let decoded = ActionPayload::decode(payload)?;
        let kind = self.resolve(&decoded.action)?;
        Action::from_args(kind, &decoded.args)
    }
}
