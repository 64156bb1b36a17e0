//! The moderation workflow.
//!
//! Items move `fresh -> pending -> {posted, rejected}`, with `pending ->
//! fresh` when publishing fails. A channel shows its moderator one item at a
//! time: a new item is sent only while nothing else in the channel is
//! pending, and every decision pulls the next fresh item forward.
//!
//! [`machine`] holds the pure transition function; [`Moderator`] drives it
//! against the store and the platform.

mod engine;
mod locks;
mod machine;

use thiserror::Error;

use crate::notify::NotifyError;
use crate::persistence::StoreError;
use crate::platform::PlatformError;
use crate::types::{ChannelId, Item, ItemId, PostId, SenderId};

pub use engine::{MIN_SUBMISSION_LENGTH, Moderator};
pub use locks::ChannelLocks;
pub use machine::{Transition, TransitionError, next_status};

/// What [`Moderator::advance_queue`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueOutcome {
    /// The channel already has an item awaiting a decision.
    AlreadyPending(ItemId),
    /// The item was sent to the moderator and is now pending.
    Notified(ItemId),
    /// Nothing is waiting.
    Empty,
}

/// The result of a moderator decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The item was published.
    Posted(Item),
    /// Approving an item that was already published changes nothing.
    AlreadyPosted(Item),
    /// The item was not pending, so there was nothing to decide.
    AlreadyHandled(Item),
    Rejected(Item),
}

/// An accepted submission.
#[derive(Debug)]
pub struct Submission {
    /// The item as stored after the queue was advanced.
    pub item: Item,
    /// Set when the item was stored but the queue could not be advanced.
    pub queue_error: Option<ModerationError>,
}

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("unknown item {0}")]
    UnknownItem(ItemId),

    #[error("unknown channel {0}")]
    UnknownChannel(ChannelId),

    #[error("{sender} does not moderate channel {channel}")]
    NotModerator { sender: SenderId, channel: ChannelId },

    /// Publishing failed; the item went back to fresh.
    #[error("failed to publish item {item}: {source}")]
    Publish {
        item: ItemId,
        #[source]
        source: PlatformError,
    },

    /// The post is live but its status could not be written. The engine
    /// keeps the result so a later approval records it without publishing
    /// again.
    #[error("item {item} was published as {post_id} but could not be recorded: {source}")]
    Unrecorded {
        item: ItemId,
        post_id: PostId,
        #[source]
        source: StoreError,
    },

    #[error("failed to notify moderator: {0}")]
    Notify(#[from] NotifyError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Why a submission was refused.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("submission must be at least {min} characters")]
    TooShort { min: usize },

    #[error("unknown channel {0}")]
    UnknownChannel(ChannelId),

    #[error("this text was already submitted")]
    Duplicate(ItemId),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for SubmitError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate { existing } => SubmitError::Duplicate(existing),
            StoreError::UnknownChannel(channel) => SubmitError::UnknownChannel(channel),
            other => SubmitError::Store(other),
        }
    }
}
