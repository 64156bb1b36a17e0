//! Messaging platform (Graph API) client.
//!
//! [`Platform`] is the seam between the bot and the outside world: every
//! send, publish, feed scan and credential exchange goes through it.
//! [`GraphClient`] implements it over HTTP; tests use an in-memory double.

mod client;
mod error;

use std::future::Future;

use crate::notify::OutboundMessage;
use crate::types::{Channel, ChannelId, PostId, SenderId};

pub use client::GraphClient;
pub use error::{PlatformError, PlatformErrorKind};

/// Public web address for pages and posts.
pub const WEB_BASE_URL: &str = "https://www.facebook.com/";

/// Returns the public URL of a page or post.
pub fn object_url(id: &str) -> String {
    format!("{}{}", WEB_BASE_URL, id)
}

/// A post read back from a channel's feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedPost {
    pub id: PostId,
    /// Absent for posts without text (photos, shares).
    pub message: Option<String>,
}

/// A page the logged-in user manages, with its page access token.
#[derive(Clone, PartialEq, Eq)]
pub struct ManagedPage {
    pub id: ChannelId,
    pub name: String,
    pub access_token: String,
}

impl std::fmt::Debug for ManagedPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedPage")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Operations the bot performs against the messaging platform.
///
/// Channel-scoped calls authenticate with the channel's own token; message
/// sends and profile updates use the bot's page token.
pub trait Platform: Send + Sync + 'static {
    /// Sends a message to a messenger identity.
    fn send_message(
        &self,
        recipient: &SenderId,
        message: &OutboundMessage,
    ) -> impl Future<Output = Result<(), PlatformError>> + Send;

    /// Returns up to `limit` of the channel's most recent posts, newest first.
    fn recent_posts(
        &self,
        channel: &Channel,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<FeedPost>, PlatformError>> + Send;

    /// Reads a single post.
    fn fetch_post(
        &self,
        channel: &Channel,
        post: &PostId,
    ) -> impl Future<Output = Result<FeedPost, PlatformError>> + Send;

    /// Publishes a top-level post to the channel's feed.
    fn publish_post(
        &self,
        channel: &Channel,
        message: &str,
    ) -> impl Future<Output = Result<PostId, PlatformError>> + Send;

    /// Publishes a comment under an existing post.
    fn publish_comment(
        &self,
        channel: &Channel,
        parent: &PostId,
        message: &str,
    ) -> impl Future<Output = Result<PostId, PlatformError>> + Send;

    /// Exchanges an OAuth code for a user access token.
    fn exchange_code(
        &self,
        redirect_uri: &str,
        code: &str,
    ) -> impl Future<Output = Result<String, PlatformError>> + Send;

    /// Lists the pages a user manages.
    fn managed_pages(
        &self,
        user_token: &str,
    ) -> impl Future<Output = Result<Vec<ManagedPage>, PlatformError>> + Send;

    /// Returns the URL of a page's profile picture, if it has one.
    fn page_picture_url(
        &self,
        page: &ChannelId,
        user_token: &str,
    ) -> impl Future<Output = Result<Option<String>, PlatformError>> + Send;

    /// Replaces the bot's messenger profile (get-started button, greeting, menu).
    fn set_messenger_profile(
        &self,
        profile: &serde_json::Value,
    ) -> impl Future<Output = Result<(), PlatformError>> + Send;
}
