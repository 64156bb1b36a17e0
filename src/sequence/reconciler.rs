//! Choosing how and under which number an approved item is published.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::persistence::{Store, StoreError};
use crate::platform::{Platform, PlatformError};
use crate::types::{Channel, Item, PostId, SequenceNumber};

use super::reference::{parse_leading_index, parse_reference};

/// How many recent feed posts are scanned for the last published number.
pub const RECENT_POSTS_LIMIT: usize = 25;

/// Where an approved item goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishPlan {
    /// A new top-level post, published as `#N <text>`.
    Post { sequence: SequenceNumber },
    /// A comment under the post of an earlier item. Consumes no number.
    Reply {
        parent: PostId,
        referenced: SequenceNumber,
    },
}

/// The outcome of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub post_id: PostId,
    /// `None` for replies.
    pub sequence: Option<SequenceNumber>,
}

/// Reconciles sequence numbers between the channel's feed and the store.
///
/// Callers must hold the channel's lock from [`Reconciler::plan`] through
/// recording the result, otherwise two approvals can pick the same number.
pub struct Reconciler<P, S> {
    platform: Arc<P>,
    store: Arc<S>,
}

impl<P, S> Clone for Reconciler<P, S> {
    fn clone(&self) -> Self {
        Reconciler {
            platform: Arc::clone(&self.platform),
            store: Arc::clone(&self.store),
        }
    }
}

impl<P: Platform, S: Store> Reconciler<P, S> {
    pub fn new(platform: Arc<P>, store: Arc<S>) -> Self {
        Reconciler { platform, store }
    }

    /// The highest `#N` among the channel's recent posts.
    ///
    /// `Ok(None)` when no recent post carries a number.
    pub async fn last_published(
        &self,
        channel: &Channel,
    ) -> Result<Option<SequenceNumber>, PlatformError> {
        let posts = self
            .platform
            .recent_posts(channel, RECENT_POSTS_LIMIT)
            .await?;
        Ok(posts
            .iter()
            .filter_map(|p| p.message.as_deref())
            .filter_map(parse_leading_index)
            .max())
    }

    /// The number the next top-level post in `channel` receives.
    ///
    /// One more than the larger of the last number seen on the feed and the
    /// last number recorded locally. A feed that cannot be read falls back
    /// to the local record alone.
    pub async fn next_sequence(&self, channel: &Channel) -> Result<SequenceNumber, StoreError> {
        let local = self.store.max_sequence(&channel.id)?;
        let external = match self.last_published(channel).await {
            Ok(external) => external,
            Err(e) => {
                warn!(channel = %channel.id, error = %e, "Feed scan failed, using local sequence");
                None
            }
        };

        if let (Some(external), Some(local)) = (external, local)
            && external != local
        {
            warn!(
                channel = %channel.id,
                external = %external,
                local = %local,
                "Feed and local sequence disagree"
            );
        }

        let next = match external.max(local) {
            Some(last) => last.next(),
            None => SequenceNumber::FIRST,
        };
        debug!(channel = %channel.id, next = %next, "Reconciled sequence");
        Ok(next)
    }

    /// The earlier item `item` refers to, if it can be replied to.
    ///
    /// The reference must name a posted item in the same channel that has a
    /// post id.
    pub fn referenced_item(&self, item: &Item) -> Result<Option<Item>, StoreError> {
        let Some(sequence) = parse_reference(&item.text) else {
            return Ok(None);
        };
        Ok(self
            .store
            .item_by_sequence(&item.channel, sequence)?
            .filter(|referenced| referenced.id != item.id && referenced.post_id.is_some()))
    }

    /// Decides between replying to a referenced item and a new numbered post.
    pub async fn plan(&self, channel: &Channel, item: &Item) -> Result<PublishPlan, StoreError> {
        if let Some(referenced) = self.referenced_item(item)?
            && let (Some(parent), Some(sequence)) = (referenced.post_id, referenced.sequence)
        {
            return Ok(PublishPlan::Reply {
                parent,
                referenced: sequence,
            });
        }
        Ok(PublishPlan::Post {
            sequence: self.next_sequence(channel).await?,
        })
    }

    /// Carries out a plan.
    pub async fn publish(
        &self,
        channel: &Channel,
        plan: &PublishPlan,
        text: &str,
    ) -> Result<Published, PlatformError> {
        match plan {
            PublishPlan::Post { sequence } => {
                let message = format!("{} {}", sequence, text);
                let post_id = self.platform.publish_post(channel, &message).await?;
                info!(channel = %channel.id, sequence = %sequence, post = %post_id, "Published post");
                Ok(Published {
                    post_id,
                    sequence: Some(*sequence),
                })
            }
            PublishPlan::Reply { parent, referenced } => {
                let post_id = self.platform.publish_comment(channel, parent, text).await?;
                info!(
                    channel = %channel.id,
                    referenced = %referenced,
                    post = %post_id,
                    "Published reply"
                );
                Ok(Published {
                    post_id,
                    sequence: None,
                })
            }
        }
    }
}
