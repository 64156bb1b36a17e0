//! Publishing channels.

use serde::{Deserialize, Serialize};

use super::ids::{ChannelId, SenderId};

/// A publishing destination (a platform page) and the moderator who approves
/// its items.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,

    /// Display name, used to label items sent to the moderator.
    pub name: String,

    /// The page access token used to publish to this channel.
    pub token: String,

    /// Who receives this channel's items for approval.
    pub moderator: SenderId,
}

impl Channel {
    pub fn new(
        id: ChannelId,
        name: impl Into<String>,
        token: impl Into<String>,
        moderator: SenderId,
    ) -> Self {
        Channel {
            id,
            name: name.into(),
            token: token.into(),
            moderator,
        }
    }
}

// The token is a credential; keep it out of logs.
impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("moderator", &self.moderator)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_omits_token() {
        let channel = Channel::new(
            ChannelId::new("C1"),
            "Campus Confessions",
            "secret-page-token",
            SenderId::new("M1"),
        );
        let debug = format!("{:?}", channel);
        assert!(debug.contains("Campus Confessions"));
        assert!(!debug.contains("secret-page-token"));
    }
}
