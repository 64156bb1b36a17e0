//! Shared test doubles.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use serde_json::Value;

use crate::notify::OutboundMessage;
use crate::platform::{FeedPost, ManagedPage, Platform, PlatformError};
use crate::types::{Channel, ChannelId, PostId, SenderId};

/// How the next publish should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishFailure {
    /// The platform answers with an error.
    Rejected,
    /// The request hits the client deadline.
    Timeout,
}

/// A post or comment the mock accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedRecord {
    pub channel: ChannelId,
    /// Set for comments.
    pub parent: Option<PostId>,
    pub message: String,
    pub id: PostId,
}

#[derive(Default)]
struct MockState {
    sent: Vec<(SenderId, OutboundMessage)>,
    sends_before_failure: Option<usize>,
    refused_recipients: HashSet<SenderId>,
    feeds: HashMap<ChannelId, Vec<FeedPost>>,
    feed_fails: bool,
    posts: HashMap<PostId, FeedPost>,
    published: Vec<PublishedRecord>,
    publish_failure: Option<PublishFailure>,
    next_post: u64,
    user_token: Option<String>,
    pages: Option<Vec<ManagedPage>>,
    profiles: Vec<Value>,
}

/// An in-memory [`Platform`] that records what the bot sends and publishes.
///
/// Published posts are prepended to the channel's feed, so later feed scans
/// see them the way the real platform would.
#[derive(Default)]
pub struct MockPlatform {
    state: Mutex<MockState>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(SenderId, OutboundMessage)> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn messages_to(&self, to: &SenderId) -> Vec<OutboundMessage> {
        self.sent()
            .into_iter()
            .filter(|(r, _)| r == to)
            .map(|(_, m)| m)
            .collect()
    }

    /// The visible text of every message sent to `to`.
    pub fn texts_to(&self, to: &SenderId) -> Vec<String> {
        self.messages_to(to).iter().map(OutboundMessage::summary).collect()
    }

    pub fn clear_sent(&self) {
        self.state.lock().unwrap().sent.clear();
    }

    /// Lets `n` more sends through, then fails every send after that.
    pub fn fail_sends_after(&self, n: usize) {
        self.state.lock().unwrap().sends_before_failure = Some(n);
    }

    pub fn restore_sends(&self) {
        let mut state = self.state.lock().unwrap();
        state.sends_before_failure = None;
        state.refused_recipients.clear();
    }

    /// Fails every send to `recipient` until [`MockPlatform::restore_sends`].
    pub fn refuse_sends_to(&self, recipient: &SenderId) {
        self.state
            .lock()
            .unwrap()
            .refused_recipients
            .insert(recipient.clone());
    }

    /// Replaces a channel's feed. `posts` are newest first.
    pub fn set_feed(&self, channel: &ChannelId, posts: Vec<FeedPost>) {
        let mut state = self.state.lock().unwrap();
        for post in &posts {
            state.posts.insert(post.id.clone(), post.clone());
        }
        state.feeds.insert(channel.clone(), posts);
    }

    pub fn fail_feed(&self, fail: bool) {
        self.state.lock().unwrap().feed_fails = fail;
    }

    pub fn published(&self) -> Vec<PublishedRecord> {
        self.state.lock().unwrap().published.clone()
    }

    pub fn fail_next_publish(&self, failure: PublishFailure) {
        self.state.lock().unwrap().publish_failure = Some(failure);
    }

    /// Makes the OAuth exchange succeed with `user_token` and list `pages`.
    pub fn grant(&self, user_token: &str, pages: Vec<ManagedPage>) {
        let mut state = self.state.lock().unwrap();
        state.user_token = Some(user_token.to_string());
        state.pages = Some(pages);
    }

    pub fn profiles(&self) -> Vec<Value> {
        self.state.lock().unwrap().profiles.clone()
    }

    fn publish(
        &self,
        channel: &Channel,
        parent: Option<&PostId>,
        message: &str,
    ) -> Result<PostId, PlatformError> {
        let mut state = self.state.lock().unwrap();
        match state.publish_failure.take() {
            Some(PublishFailure::Rejected) => {
                return Err(PlatformError::from_response(
                    500,
                    r#"{"error":{"message":"An unexpected error has occurred."}}"#,
                ));
            }
            Some(PublishFailure::Timeout) => {
                return Err(PlatformError::timeout("operation timed out"));
            }
            None => {}
        }

        state.next_post += 1;
        let id = match parent {
            Some(parent) => PostId::new(format!("{}_c{}", parent, state.next_post)),
            None => PostId::new(format!("{}_{}", channel.id, state.next_post)),
        };
        let post = FeedPost {
            id: id.clone(),
            message: Some(message.to_string()),
        };
        state.posts.insert(id.clone(), post.clone());
        if parent.is_none() {
            state.feeds.entry(channel.id.clone()).or_default().insert(0, post);
        }
        state.published.push(PublishedRecord {
            channel: channel.id.clone(),
            parent: parent.cloned(),
            message: message.to_string(),
            id: id.clone(),
        });
        Ok(id)
    }
}

impl Platform for MockPlatform {
    async fn send_message(
        &self,
        recipient: &SenderId,
        message: &OutboundMessage,
    ) -> Result<(), PlatformError> {
        let mut state = self.state.lock().unwrap();
        if state.refused_recipients.contains(recipient) {
            return Err(PlatformError::from_response(400, "recipient unavailable"));
        }
        if let Some(remaining) = state.sends_before_failure.as_mut() {
            if *remaining == 0 {
                return Err(PlatformError::from_response(400, "send refused"));
            }
            *remaining -= 1;
        }
        state.sent.push((recipient.clone(), message.clone()));
        Ok(())
    }

    async fn recent_posts(
        &self,
        channel: &Channel,
        limit: usize,
    ) -> Result<Vec<FeedPost>, PlatformError> {
        let state = self.state.lock().unwrap();
        if state.feed_fails {
            return Err(PlatformError::from_response(503, "feed unavailable"));
        }
        Ok(state
            .feeds
            .get(&channel.id)
            .map(|posts| posts.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn fetch_post(&self, _channel: &Channel, post: &PostId) -> Result<FeedPost, PlatformError> {
        self.state
            .lock()
            .unwrap()
            .posts
            .get(post)
            .cloned()
            .ok_or_else(|| PlatformError::from_response(404, "no such post"))
    }

    async fn publish_post(&self, channel: &Channel, message: &str) -> Result<PostId, PlatformError> {
        self.publish(channel, None, message)
    }

    async fn publish_comment(
        &self,
        channel: &Channel,
        parent: &PostId,
        message: &str,
    ) -> Result<PostId, PlatformError> {
        self.publish(channel, Some(parent), message)
    }

    async fn exchange_code(&self, _redirect_uri: &str, _code: &str) -> Result<String, PlatformError> {
        self.state
            .lock()
            .unwrap()
            .user_token
            .clone()
            .ok_or_else(|| PlatformError::from_response(400, "invalid code"))
    }

    async fn managed_pages(&self, _user_token: &str) -> Result<Vec<ManagedPage>, PlatformError> {
        self.state
            .lock()
            .unwrap()
            .pages
            .clone()
            .ok_or_else(|| PlatformError::from_response(403, "missing permission"))
    }

    async fn page_picture_url(
        &self,
        page: &ChannelId,
        _user_token: &str,
    ) -> Result<Option<String>, PlatformError> {
        Ok(Some(format!("https://img.example/{}.png", page)))
    }

    async fn set_messenger_profile(&self, profile: &Value) -> Result<(), PlatformError> {
        self.state.lock().unwrap().profiles.push(profile.clone());
        Ok(())
    }
}

/// A channel with a fixed token, named after its id.
pub fn test_channel(id: &str, moderator: &str) -> Channel {
    Channel::new(
        ChannelId::new(id),
        format!("Page {}", id),
        format!("token-{}", id),
        SenderId::new(moderator),
    )
}

/// A feed post with text.
pub fn feed_post(id: &str, message: &str) -> FeedPost {
    FeedPost {
        id: PostId::new(id),
        message: Some(message.to_string()),
    }
}
