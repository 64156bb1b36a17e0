//! Submitted items and their moderation status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ChannelId, ItemId, PostId, SequenceNumber};

/// Where an item is in its moderation lifecycle.
///
/// The only legal paths are `Fresh -> Pending -> {Posted, Rejected}`, plus
/// `Pending -> Fresh` when publishing fails. See
/// [`crate::moderation::next_status`] for the transition function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Submitted, waiting to be shown to the moderator.
    Fresh,
    /// Shown to the moderator, awaiting a decision.
    Pending,
    /// Approved and published.
    Posted,
    /// Discarded by the moderator.
    Rejected,
}

impl ItemStatus {
    /// Returns true for states no moderator action can leave.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Posted | ItemStatus::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Fresh => "fresh",
            ItemStatus::Pending => "pending",
            ItemStatus::Posted => "posted",
            ItemStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of submitted content.
///
/// `post_id` and `sequence` are written only when the item is published.
/// Replies to an earlier item get a `post_id` (the comment) but no
/// `sequence`, since they do not consume a number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,

    /// The channel that owns this item.
    pub channel: ChannelId,

    pub text: String,

    pub submitted_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    pub status: ItemStatus,

    /// The published post or comment, once posted.
    pub post_id: Option<PostId>,

    /// The assigned sequence number, once posted as a top-level post.
    pub sequence: Option<SequenceNumber>,

    /// Bumped by the store on every successful write. A write carrying a
    /// stale version is rejected as a conflict.
    pub version: u64,
}

impl Item {
    /// Creates a fresh item. The store assigns the id.
    pub fn new(
        id: ItemId,
        channel: ChannelId,
        text: impl Into<String>,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Item {
            id,
            channel,
            text: text.into(),
            submitted_at,
            updated_at: submitted_at,
            status: ItemStatus::Fresh,
            post_id: None,
            sequence: None,
            version: 0,
        }
    }

    /// Returns true if the item was published as a comment rather than a post.
    pub fn is_reply(&self) -> bool {
        self.status == ItemStatus::Posted && self.post_id.is_some() && self.sequence.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_item_is_fresh_and_unpublished() {
        let now = Utc::now();
        let item = Item::new(ItemId(1), ChannelId::new("C1"), "some text", now);

        assert_eq!(item.status, ItemStatus::Fresh);
        assert_eq!(item.submitted_at, item.updated_at);
        assert!(item.post_id.is_none());
        assert!(item.sequence.is_none());
        assert_eq!(item.version, 0);
        assert!(!item.is_reply());
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ItemStatus::Pending).unwrap(),
            "\"pending\""
        );
        let parsed: ItemStatus = serde_json::from_str("\"rejected\"").unwrap();
        assert_eq!(parsed, ItemStatus::Rejected);
    }

    #[test]
    fn terminal_states() {
        assert!(!ItemStatus::Fresh.is_terminal());
        assert!(!ItemStatus::Pending.is_terminal());
        assert!(ItemStatus::Posted.is_terminal());
        assert!(ItemStatus::Rejected.is_terminal());
    }

    #[test]
    fn reply_detection() {
        let mut item = Item::new(ItemId(2), ChannelId::new("C1"), "#1 nice", Utc::now());
        item.status = ItemStatus::Posted;
        item.post_id = Some(PostId::new("C1_10_20"));
        assert!(item.is_reply());

        item.sequence = Some(SequenceNumber(3));
        assert!(!item.is_reply());
    }
}
