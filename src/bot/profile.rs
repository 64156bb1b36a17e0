//! The messenger profile: get-started button, greeting, and persistent menu.

use serde_json::{Value, json};

use crate::actions::Action;

use super::persona::phrases;

/// Builds the profile published by the `setup` admin command.
pub fn messenger_profile() -> Value {
    json!({
        "get_started": {
            "payload": Action::SendWelcome.to_payload().encode(),
        },
        "greeting": [
            { "locale": "default", "text": phrases::GREETING },
        ],
        "persistent_menu": [
            {
                "locale": "default",
                "composer_input_disabled": false,
                "call_to_actions": [
                    {
                        "title": phrases::SETTINGS_MENU,
                        "type": "nested",
                        "call_to_actions": [
                            {
                                "title": phrases::LIST_PAGES_MENU,
                                "type": "postback",
                                "payload": Action::ListPages.to_payload().encode(),
                            }
                        ],
                    }
                ],
            }
        ],
    })
}
