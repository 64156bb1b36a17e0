//! Admin chat commands.
//!
//! Messages from the configured admin are checked for a command before any
//! other handling. Anything that is not a command falls through.

/// A command the admin can send as a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    /// `setup`: publishes the messenger profile.
    Setup,
    /// `indexItems` (or `indexConfessions`): re-reads the numbers of posted items.
    IndexItems,
}

impl AdminCommand {
    /// The acknowledgement sent before the command runs.
    pub fn acknowledgement(&self) -> &'static str {
        match self {
            AdminCommand::Setup => "Running setup",
            AdminCommand::IndexItems => "Indexing items",
        }
    }
}

/// Parses an admin message.
///
/// # Parsing Rules
///
/// - The whole message is the command; surrounding whitespace is ignored
/// - Command names are case-insensitive
/// - Returns `None` for anything else
///
/// # Examples
///
/// ```
/// use confessions_bot::bot::{AdminCommand, parse_admin_command};
///
/// assert_eq!(parse_admin_command("Setup"), Some(AdminCommand::Setup));
/// assert_eq!(parse_admin_command("indexConfessions"), Some(AdminCommand::IndexItems));
/// assert_eq!(parse_admin_command("setup please"), None);
/// ```
pub fn parse_admin_command(text: &str) -> Option<AdminCommand> {
    match text.trim().to_ascii_lowercase().as_str() {
        "setup" => Some(AdminCommand::Setup),
        "indexitems" | "indexconfessions" => Some(AdminCommand::IndexItems),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn recognizes_commands() {
        assert_eq!(parse_admin_command("setup"), Some(AdminCommand::Setup));
        assert_eq!(parse_admin_command("  SETUP\n"), Some(AdminCommand::Setup));
        assert_eq!(parse_admin_command("indexItems"), Some(AdminCommand::IndexItems));
        assert_eq!(
            parse_admin_command("INDEXCONFESSIONS"),
            Some(AdminCommand::IndexItems)
        );
    }

    #[test]
    fn other_text_is_not_a_command() {
        assert_eq!(parse_admin_command(""), None);
        assert_eq!(parse_admin_command("set up"), None);
        assert_eq!(parse_admin_command("run setup"), None);
        assert_eq!(parse_admin_command("index"), None);
    }

    proptest! {
        #[test]
        fn never_panics(text in "\\PC*") {
            let _ = parse_admin_command(&text);
        }

        #[test]
        fn case_does_not_matter(mask in proptest::collection::vec(any::<bool>(), 5)) {
            let text: String = "setup"
                .chars()
                .zip(mask)
                .map(|(c, upper)| if upper { c.to_ascii_uppercase() } else { c })
                .collect();
            prop_assert_eq!(parse_admin_command(&text), Some(AdminCommand::Setup));
        }
    }
}
