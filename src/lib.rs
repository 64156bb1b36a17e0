//! Confessions Bot - a moderated submissions bot for Messenger pages.
//!
//! Anonymous submissions for a page are queued, shown one at a time to the
//! page's moderator in Messenger, and published to the page feed with a
//! gap-free `#N` number once approved.

pub mod actions;
pub mod bot;
pub mod config;
pub mod moderation;
pub mod notify;
pub mod persistence;
pub mod platform;
pub mod sequence;
pub mod server;
pub mod types;
pub mod webhooks;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_utils;
