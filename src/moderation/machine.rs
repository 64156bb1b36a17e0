//! Pure moderation transitions.

use thiserror::Error;

use crate::types::ItemStatus;

/// Something that happens to an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The item was delivered to the moderator.
    Notify,
    /// The moderator approved and publishing succeeded.
    Approve,
    /// The moderator discarded the item.
    Reject,
    /// The moderator approved but publishing failed.
    PublishFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot apply {transition:?} to a {from} item")]
pub struct TransitionError {
    pub from: ItemStatus,
    pub transition: Transition,
}

/// Returns the status an item moves to, or an error for an illegal move.
///
/// ```text
/// fresh   --Notify-------> pending
/// pending --Approve------> posted
/// pending --Reject-------> rejected
/// pending --PublishFailed-> fresh
/// ```
pub fn next_status(from: ItemStatus, transition: Transition) -> Result<ItemStatus, TransitionError> {
    use ItemStatus::*;
    use Transition::*;

    match (from, transition) {
        (Fresh, Notify) => Ok(Pending),
        (Pending, Approve) => Ok(Posted),
        (Pending, Reject) => Ok(Rejected),
        (Pending, PublishFailed) => Ok(Fresh),
        _ => Err(TransitionError { from, transition }),
    }
}
