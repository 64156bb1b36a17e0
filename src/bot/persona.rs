//! Bot personas.
//!
//! A persona is plain configuration: the actions its buttons may trigger and
//! the permissions it asks moderators for. The registry is built once here
//! and never changes afterwards.

use crate::actions::{ActionKind, ActionRegistry};

/// Permissions requested when a moderator logs in.
pub const MODERATOR_SCOPES: [&str; 3] = ["manage_pages", "publish_pages", "pages_show_list"];

#[derive(Debug, Clone)]
pub struct Persona {
    pub name: &'static str,
    pub scopes: &'static [&'static str],
    registry: ActionRegistry,
}

impl Persona {
    /// The persona that onboards moderators and runs the moderation queue.
    pub fn moderator() -> Self {
        Persona {
            name: "moderator",
            scopes: &MODERATOR_SCOPES,
            registry: ActionRegistry::new(&ActionKind::ALL),
        }
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }
}

/// Fixed texts the bot sends.
pub(crate) mod phrases {
    pub const OFFLINE: &str = "I am temporarily offline. Follow the page for updates!";
    pub const WELCOME: &str = "Hello! I'm glad you decided to use this app.";
    pub const LOGIN_PROMPT: &str = "I need access to your pages.";
    pub const LOGIN_BUTTON: &str = "Grant access";
    pub const LOGIN_FAILED: &str = "Couldn't access your pages, please try again:";
    pub const NO_PAGES: &str = "Couldn't find any pages that you manage.";
    pub const PAGES_FOUND: &str = "Found these pages. Select which ones you want me to help manage.";
    pub const MANAGE_BUTTON: &str = "Manage";
    pub const GREETING: &str = "Let's get you hooked up!";
    pub const SETTINGS_MENU: &str = "Settings";
    pub const LIST_PAGES_MENU: &str = "List pages";
}
