//! Sequence numbers for published items.
//!
//! Every top-level post carries a `#N` prefix. The next number is derived
//! from both the channel's own feed and the local record, so posts made
//! outside the bot do not cause collisions and a failing feed scan does not
//! block publishing. Submissions that open with `#N` or `@N` naming an
//! earlier post are published as comments under it instead.

mod reconciler;
mod reference;

pub use reconciler::{PublishPlan, Published, RECENT_POSTS_LIMIT, Reconciler};
pub use reference::{parse_leading_index, parse_reference};
