//! Core domain types for the moderation bot.

pub mod channel;
pub mod ids;
pub mod item;

pub use channel::Channel;
pub use ids::{ChannelId, ItemId, PostId, SenderId, SequenceNumber};
pub use item::{Item, ItemStatus};
