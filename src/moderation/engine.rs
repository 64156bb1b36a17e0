//! The moderation engine.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use crate::actions::Action;
use crate::config::Config;
use crate::notify::{Button, Composer};
use crate::persistence::{ChannelUpsert, Store, StoreError};
use crate::platform::{Platform, object_url};
use crate::sequence::{Published, Reconciler, parse_leading_index};
use crate::types::{Channel, ChannelId, Item, ItemId, ItemStatus, PostId, SenderId, SequenceNumber};

use super::locks::ChannelLocks;
use super::machine::{Transition, next_status};
use super::{Decision, ModerationError, QueueOutcome, SubmitError, Submission};

/// Submissions shorter than this (in characters, after trimming) are refused.
pub const MIN_SUBMISSION_LENGTH: usize = 10;

const QUEUE_EMPTY: &str = "There are no more pending items.";
const NOTHING_PENDING: &str = "No pending items.";
const ALREADY_HANDLED: &str = "Already handled that item";
const PUBLISH_FAILED: &str = "Failed to post item.";

/// Publishes whose status write failed.
///
/// Read and written only under the item's channel lock.
#[derive(Debug, Default)]
struct UnrecordedPublishes(Mutex<HashMap<ItemId, Published>>);

impl UnrecordedPublishes {
    fn get(&self, item: ItemId) -> Option<Published> {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&item)
            .cloned()
    }

    fn insert(&self, item: ItemId, published: Published) {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(item, published);
    }

    fn remove(&self, item: ItemId) {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&item);
    }
}

/// Runs the moderation workflow for every channel.
///
/// Status writes happen only after the external call they depend on has
/// succeeded, so a failed send or publish never leaves an item in a state
/// the moderator has not seen. A publish whose write then fails is kept in
/// memory and recorded by the next decision on that item.
pub struct Moderator<P, S> {
    store: Arc<S>,
    composer: Composer<P>,
    reconciler: Reconciler<P, S>,
    locks: Arc<ChannelLocks>,
    unrecorded: Arc<UnrecordedPublishes>,
    config: Arc<Config>,
}

impl<P, S> Clone for Moderator<P, S> {
    fn clone(&self) -> Self {
        Moderator {
            store: Arc::clone(&self.store),
            composer: self.composer.clone(),
            reconciler: self.reconciler.clone(),
            locks: Arc::clone(&self.locks),
            unrecorded: Arc::clone(&self.unrecorded),
            config: Arc::clone(&self.config),
        }
    }
}

impl<P: Platform, S: Store> Moderator<P, S> {
    pub fn new(platform: Arc<P>, store: Arc<S>, config: Arc<Config>) -> Self {
        Moderator {
            composer: Composer::new(Arc::clone(&platform)),
            reconciler: Reconciler::new(platform, Arc::clone(&store)),
            locks: Arc::new(ChannelLocks::new()),
            unrecorded: Arc::new(UnrecordedPublishes::default()),
            store,
            config,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    // ─── Submissions ──────────────────────────────────────────────────────────

    /// Accepts a new submission for `channel` and moves the queue along.
    ///
    /// The item is read back after the queue was advanced, so it is
    /// `pending` when it went straight to the moderator. A failure to advance
    /// the queue does not fail the submission; it comes back in
    /// [`Submission::queue_error`] for the caller to report.
    #[instrument(skip_all, fields(channel = %channel))]
    pub async fn submit(&self, channel: &ChannelId, text: &str) -> Result<Submission, SubmitError> {
        let text = text.trim();
        if text.chars().count() < MIN_SUBMISSION_LENGTH {
            return Err(SubmitError::TooShort {
                min: MIN_SUBMISSION_LENGTH,
            });
        }
        let channel = self
            .store
            .channel(channel)?
            .ok_or_else(|| SubmitError::UnknownChannel(channel.clone()))?;

        let item = self.store.create_item(&channel.id, text, Utc::now())?;
        info!(item = %item.id, "Accepted submission");

        let queue_error = match self.advance_queue(&channel).await {
            Ok(_) => None,
            Err(e) => {
                warn!(item = %item.id, error = %e, "Could not advance queue after submission");
                Some(e)
            }
        };
        Ok(Submission {
            item: self.store.item(item.id)?.unwrap_or(item),
            queue_error,
        })
    }

    // ─── Queue ────────────────────────────────────────────────────────────────

    /// Sends the oldest fresh item to the moderator unless one is pending.
    #[instrument(skip_all, fields(channel = %channel.id))]
    pub async fn advance_queue(&self, channel: &Channel) -> Result<QueueOutcome, ModerationError> {
        let _guard = self.locks.lock(&channel.id).await;

        if let Some(pending) = self.store.pending(&channel.id)?.first() {
            debug!(item = %pending.id, "Item already pending");
            return Ok(QueueOutcome::AlreadyPending(pending.id));
        }
        let Some(item) = self.store.oldest_fresh(&channel.id)? else {
            return Ok(QueueOutcome::Empty);
        };

        self.notify(channel, &item).await?;
        let item = self.commit(&item, Transition::Notify, |_| {})?;
        info!(item = %item.id, "Item sent to moderator");
        Ok(QueueOutcome::Notified(item.id))
    }

    /// Sends one item to the channel's moderator with its decision buttons.
    async fn notify(&self, channel: &Channel, item: &Item) -> Result<(), ModerationError> {
        let text = format!(
            "[{}]\n{}\n\"{}\"",
            channel.name,
            item.submitted_at.format("%Y-%m-%d %H:%M"),
            item.text
        );

        let mut buttons = Vec::with_capacity(3);
        if let Some(referenced) = self.reconciler.referenced_item(item)?
            && let (Some(post_id), Some(sequence)) = (&referenced.post_id, referenced.sequence)
        {
            buttons.push(Button::url(
                format!("View {}", sequence),
                object_url(post_id.as_str()),
            ));
        }
        buttons.push(Button::action("Post", &Action::AcceptItem { item_id: item.id }));
        buttons.push(Button::action("Discard", &Action::RejectItem { item_id: item.id }));

        self.composer
            .send_long_with_buttons(&channel.moderator, &text, buttons)
            .await?;
        Ok(())
    }

    /// Runs after a decision: pulls the next item forward, or tells the
    /// moderator there is nothing left.
    async fn after_decision(&self, channel: &Channel) -> Result<(), ModerationError> {
        if self.advance_queue(channel).await? == QueueOutcome::Empty {
            self.reply(&channel.moderator, QUEUE_EMPTY).await;
        }
        Ok(())
    }

    // ─── Decisions ────────────────────────────────────────────────────────────

    /// Approves and publishes a pending item.
    ///
    /// Approving an already posted item only repeats its link. If publishing
    /// fails the item returns to fresh, the queue is advanced (which usually
    /// re-sends the same item) and [`ModerationError::Publish`] is returned.
    /// If the post went out but could not be recorded, the moderator still
    /// gets its link and [`ModerationError::Unrecorded`] is returned.
    #[instrument(skip_all, fields(sender = %sender, item = %item_id))]
    pub async fn approve(&self, sender: &SenderId, item_id: ItemId) -> Result<Decision, ModerationError> {
        let channel = self.channel_for_decision(sender, item_id)?;
        let guard = self.locks.lock(&channel.id).await;

        // Re-read under the lock so a concurrent approval is seen.
        let item = self.load_item(item_id)?;
        match item.status {
            ItemStatus::Pending => {}
            ItemStatus::Posted => {
                drop(guard);
                let link = item
                    .post_id
                    .as_ref()
                    .map(|p| object_url(p.as_str()))
                    .unwrap_or_default();
                self.reply(sender, &already_posted(&link)).await;
                return Ok(Decision::AlreadyPosted(item));
            }
            ItemStatus::Fresh | ItemStatus::Rejected => {
                drop(guard);
                self.reply(sender, ALREADY_HANDLED).await;
                return Ok(Decision::AlreadyHandled(item));
            }
        }

        let published = match self.unrecorded.get(item.id) {
            Some(published) => {
                info!(post = %published.post_id, "Recording earlier publish");
                published
            }
            None => {
                let plan = self.reconciler.plan(&channel, &item).await?;
                match self.reconciler.publish(&channel, &plan, &item.text).await {
                    Ok(published) => published,
                    Err(source) => {
                        warn!(error = %source, timed_out = source.timed_out, "Publish failed, returning item to queue");
                        self.commit(&item, Transition::PublishFailed, |_| {})?;
                        drop(guard);

                        self.reply(sender, PUBLISH_FAILED).await;
                        if let Err(e) = self.after_decision(&channel).await {
                            warn!(error = %e, "Could not advance queue after failed publish");
                        }
                        return Err(ModerationError::Publish {
                            item: item.id,
                            source,
                        });
                    }
                }
            }
        };

        let recorded = self.record_publish(&item, &published);
        drop(guard);

        self.reply(
            sender,
            &format!("Posted item: {}", object_url(published.post_id.as_str())),
        )
        .await;
        let item = recorded?;
        self.after_decision(&channel).await?;
        Ok(Decision::Posted(item))
    }

    /// Writes a successful publish. On failure the result is kept so the next
    /// decision on the item records it instead of publishing again.
    fn record_publish(&self, item: &Item, published: &Published) -> Result<Item, ModerationError> {
        let result = self.commit(item, Transition::Approve, |i| {
            i.post_id = Some(published.post_id.clone());
            i.sequence = published.sequence;
        });
        match result {
            Ok(recorded) => {
                self.unrecorded.remove(item.id);
                Ok(recorded)
            }
            Err(e) => {
                error!(post = %published.post_id, error = %e, "Published item could not be recorded");
                self.unrecorded.insert(item.id, published.clone());
                Err(match e {
                    ModerationError::Store(source) => ModerationError::Unrecorded {
                        item: item.id,
                        post_id: published.post_id.clone(),
                        source,
                    },
                    other => other,
                })
            }
        }
    }

    /// Discards a pending item.
    #[instrument(skip_all, fields(sender = %sender, item = %item_id))]
    pub async fn reject(&self, sender: &SenderId, item_id: ItemId) -> Result<Decision, ModerationError> {
        let channel = self.channel_for_decision(sender, item_id)?;
        let guard = self.locks.lock(&channel.id).await;

        let item = self.load_item(item_id)?;
        if item.status != ItemStatus::Pending {
            drop(guard);
            self.reply(sender, ALREADY_HANDLED).await;
            return Ok(Decision::AlreadyHandled(item));
        }

        // The post is already live, so the item can only end up posted.
        if let Some(published) = self.unrecorded.get(item.id) {
            let recorded = self.record_publish(&item, &published);
            drop(guard);

            self.reply(sender, &already_posted(&object_url(published.post_id.as_str())))
                .await;
            let item = recorded?;
            self.after_decision(&channel).await?;
            return Ok(Decision::AlreadyPosted(item));
        }

        let item = self.commit(&item, Transition::Reject, |_| {})?;
        drop(guard);
        info!("Item rejected");

        self.after_decision(&channel).await?;
        Ok(Decision::Rejected(item))
    }

    /// Resolves the item's channel and checks that `sender` moderates it.
    fn channel_for_decision(&self, sender: &SenderId, item_id: ItemId) -> Result<Channel, ModerationError> {
        let item = self.load_item(item_id)?;
        let channel = self
            .store
            .channel(&item.channel)?
            .ok_or_else(|| ModerationError::UnknownChannel(item.channel.clone()))?;
        if &channel.moderator != sender {
            return Err(ModerationError::NotModerator {
                sender: sender.clone(),
                channel: channel.id,
            });
        }
        Ok(channel)
    }

    // ─── Moderator Requests ───────────────────────────────────────────────────

    /// Re-sends every pending item across the channels `moderator` moderates.
    ///
    /// Returns how many items were sent.
    #[instrument(skip_all, fields(moderator = %moderator))]
    pub async fn send_pending(&self, moderator: &SenderId) -> Result<usize, ModerationError> {
        let pending = self.store.pending_for_moderator(moderator)?;
        if pending.is_empty() {
            self.reply(moderator, NOTHING_PENDING).await;
            return Ok(0);
        }
        for item in &pending {
            let channel = self
                .store
                .channel(&item.channel)?
                .ok_or_else(|| ModerationError::UnknownChannel(item.channel.clone()))?;
            self.notify(&channel, item).await?;
        }
        Ok(pending.len())
    }

    /// Starts managing a page, or refreshes the token of one already managed.
    #[instrument(skip_all, fields(sender = %sender, page = %page_id))]
    pub async fn manage_channel(
        &self,
        sender: &SenderId,
        page_id: &ChannelId,
        name: &str,
        token: &str,
    ) -> Result<ChannelUpsert, ModerationError> {
        let channel = match self.store.channel(page_id)? {
            Some(mut existing) => {
                existing.token = token.to_string();
                existing
            }
            None => Channel::new(page_id.clone(), name, token, sender.clone()),
        };
        let outcome = self.store.upsert_channel(channel)?;

        let message = match outcome {
            ChannelUpsert::Created => format!("I am now managing the page {}", name),
            ChannelUpsert::Updated => format!("I already manage the page {}", name),
        };
        info!(?outcome, "Channel registered");
        self.reply(sender, &message).await;
        self.reply(
            sender,
            &format!(
                "Items need to be submitted to: {}",
                self.config.submission_url(page_id)
            ),
        )
        .await;
        Ok(outcome)
    }

    /// Re-reads the number of every posted top-level item from its post.
    ///
    /// An item is updated only when its post reads exactly `#N <text>`, so
    /// replies (whose comments often start with a `#N` reference) are left
    /// alone. Returns how many items changed.
    #[instrument(skip(self))]
    pub async fn index_items(&self) -> Result<usize, ModerationError> {
        let mut updated = 0;
        for item in self.store.items_with_status(ItemStatus::Posted)? {
            let Some(post_id) = item.post_id.clone() else {
                continue;
            };
            let Some(channel) = self.store.channel(&item.channel)? else {
                continue;
            };
            let post = match self.fetch_post_text(&channel, &post_id).await {
                Ok(post) => post,
                Err(e) => {
                    warn!(item = %item.id, error = %e, "Could not read post, skipping");
                    continue;
                }
            };
            let Some(sequence) = post.as_deref().and_then(|m| published_sequence(m, &item.text))
            else {
                continue;
            };
            if item.sequence == Some(sequence) {
                continue;
            }

            let _guard = self.locks.lock(&channel.id).await;
            let Some(mut current) = self.store.item(item.id)? else {
                continue;
            };
            current.sequence = Some(sequence);
            current.updated_at = Utc::now();
            match self.store.save_item(&current) {
                Ok(_) => updated += 1,
                Err(StoreError::Conflict { .. }) => {
                    warn!(item = %item.id, "Item changed during indexing, skipping");
                }
                Err(e) => return Err(e.into()),
            }
        }
        info!(updated, "Indexed posted items");
        Ok(updated)
    }

    async fn fetch_post_text(
        &self,
        channel: &Channel,
        post: &PostId,
    ) -> Result<Option<String>, crate::platform::PlatformError> {
        Ok(self.composer.platform().fetch_post(channel, post).await?.message)
    }

    // ─── Helpers ──────────────────────────────────────────────────────────────

    fn load_item(&self, id: ItemId) -> Result<Item, ModerationError> {
        self.store.item(id)?.ok_or(ModerationError::UnknownItem(id))
    }

    /// Applies a transition and writes it, retrying once on a version conflict.
    fn commit(
        &self,
        item: &Item,
        transition: Transition,
        apply: impl Fn(&mut Item),
    ) -> Result<Item, ModerationError> {
        match self.try_commit(item.clone(), transition, &apply) {
            Err(ModerationError::Store(StoreError::Conflict { .. })) => {
                warn!(item = %item.id, ?transition, "Write conflict, retrying once");
                let current = self.load_item(item.id)?;
                self.try_commit(current, transition, &apply)
            }
            other => other,
        }
    }

    fn try_commit(
        &self,
        mut item: Item,
        transition: Transition,
        apply: &impl Fn(&mut Item),
    ) -> Result<Item, ModerationError> {
        item.status = next_status(item.status, transition)?;
        apply(&mut item);
        item.updated_at = Utc::now();
        Ok(self.store.save_item(&item)?)
    }

    /// Sends a short notice. Failures are logged, never propagated.
    async fn reply(&self, to: &SenderId, text: &str) {
        if let Err(e) = self.composer.send_text(to, text).await {
            warn!(recipient = %to, error = %e, "Failed to send reply");
        }
    }
}

fn already_posted(link: &str) -> String {
    format!("Item was already posted: {}", link)
}

/// Reads `N` from a post that reads exactly `#N <text>`.
fn published_sequence(message: &str, text: &str) -> Option<SequenceNumber> {
    let sequence = parse_leading_index(message)?;
    (message == format!("{} {}", sequence, text)).then_some(sequence)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use chrono::DateTime;

    use super::*;
    use crate::notify::OutboundMessage;
    use crate::persistence::SnapshotStore;
    use crate::platform::FeedPost;
    use crate::test_utils::{MockPlatform, PublishFailure, feed_post, test_channel};

    struct Fixture<S> {
        platform: Arc<MockPlatform>,
        store: Arc<S>,
        moderator: Moderator<MockPlatform, S>,
        channel: Channel,
        mod_id: SenderId,
    }

    fn fixture_with<S: Store>(store: S) -> Fixture<S> {
        let platform = Arc::new(MockPlatform::new());
        let store = Arc::new(store);
        let channel = test_channel("C1", "M1");
        store.upsert_channel(channel.clone()).unwrap();
        let config = Arc::new(crate::config::test_config());
        Fixture {
            moderator: Moderator::new(Arc::clone(&platform), Arc::clone(&store), config),
            platform,
            store,
            channel,
            mod_id: SenderId::new("M1"),
        }
    }

    fn fixture() -> Fixture<SnapshotStore> {
        fixture_with(SnapshotStore::in_memory())
    }

    impl<S: Store> Fixture<S> {
        fn status(&self, id: ItemId) -> ItemStatus {
            self.store.item(id).unwrap().unwrap().status
        }

        fn pending_count(&self) -> usize {
            self.store.pending(&self.channel.id).unwrap().len()
        }

        fn last_text(&self) -> String {
            self.platform.texts_to(&self.mod_id).pop().unwrap_or_default()
        }
    }

    /// The decision buttons on the last message sent to the moderator.
    fn last_buttons(f: &Fixture<SnapshotStore>) -> Vec<Button> {
        match f.platform.messages_to(&f.mod_id).pop() {
            Some(OutboundMessage::Buttons { buttons, .. }) => buttons,
            other => panic!("expected a button message, got {:?}", other),
        }
    }

    // Scenario A
    #[tokio::test]
    async fn first_submission_goes_straight_to_moderator() {
        let f = fixture();

        let item = f
            .moderator
            .submit(&f.channel.id, "hello world this is long enough")
            .await
            .unwrap()
            .item;

        assert_eq!(item.status, ItemStatus::Pending);
        let text = f.last_text();
        assert!(text.starts_with("[Page C1]\n"));
        assert!(text.ends_with("\"hello world this is long enough\""));

        let buttons = last_buttons(&f);
        assert_eq!(buttons.len(), 2);
        assert_eq!(
            buttons[0],
            Button::action("Post", &Action::AcceptItem { item_id: item.id })
        );
    }

    #[tokio::test]
    async fn second_submission_waits_while_one_is_pending() {
        let f = fixture();
        let first = f.moderator.submit(&f.channel.id, "the first submission").await.unwrap().item;
        let second = f.moderator.submit(&f.channel.id, "the second submission").await.unwrap().item;

        assert_eq!(first.status, ItemStatus::Pending);
        assert_eq!(second.status, ItemStatus::Fresh);
        assert_eq!(f.pending_count(), 1);
        assert_eq!(
            f.moderator.advance_queue(&f.channel).await.unwrap(),
            QueueOutcome::AlreadyPending(first.id)
        );
    }

    // Scenario B
    #[tokio::test]
    async fn approval_assigns_first_number_and_publishes() {
        let f = fixture();
        let item = f
            .moderator
            .submit(&f.channel.id, "hello world this is long enough")
            .await
            .unwrap()
            .item;

        let decision = f.moderator.approve(&f.mod_id, item.id).await.unwrap();

        let Decision::Posted(posted) = decision else {
            panic!("expected a post, got {:?}", decision);
        };
        assert_eq!(posted.status, ItemStatus::Posted);
        assert_eq!(posted.sequence, Some(SequenceNumber(1)));
        assert!(posted.post_id.is_some());

        let published = f.platform.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].message, "#1 hello world this is long enough");

        let texts = f.platform.texts_to(&f.mod_id);
        assert!(texts.iter().any(|t| t.starts_with("Posted item: https://www.facebook.com/")));
        assert_eq!(texts.last().unwrap(), QUEUE_EMPTY);
    }

    // Scenario C
    #[tokio::test]
    async fn reference_is_published_as_reply() {
        let f = fixture();
        let first = f
            .moderator
            .submit(&f.channel.id, "hello world this is long enough")
            .await
            .unwrap()
            .item;
        let Decision::Posted(first) = f.moderator.approve(&f.mod_id, first.id).await.unwrap() else {
            panic!("first item not posted");
        };

        let reply = f.moderator.submit(&f.channel.id, "#1 nice, so true").await.unwrap().item;
        assert_eq!(reply.status, ItemStatus::Pending);

        // The moderator gets a link to the referenced post.
        let buttons = last_buttons(&f);
        assert_eq!(buttons.len(), 3);
        assert!(matches!(&buttons[0], Button::Url { title, .. } if title == "View #1"));

        let Decision::Posted(reply) = f.moderator.approve(&f.mod_id, reply.id).await.unwrap() else {
            panic!("reply not posted");
        };
        assert_eq!(reply.sequence, None);
        assert!(reply.is_reply());

        let published = f.platform.published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[1].parent, first.post_id);
        assert_eq!(published[1].message, "#1 nice, so true");
    }

    // Scenario E
    #[tokio::test]
    async fn publish_timeout_returns_item_to_queue() {
        let f = fixture();
        let item = f
            .moderator
            .submit(&f.channel.id, "hello world this is long enough")
            .await
            .unwrap()
            .item;
        f.platform.clear_sent();
        f.platform.fail_next_publish(PublishFailure::Timeout);

        let result = f.moderator.approve(&f.mod_id, item.id).await;

        assert!(matches!(
            result,
            Err(ModerationError::Publish { item: id, ref source }) if id == item.id && source.timed_out
        ));
        assert!(f.platform.published().is_empty());

        // Reverted, then immediately re-sent as the only fresh item.
        assert_eq!(f.status(item.id), ItemStatus::Pending);
        let texts = f.platform.texts_to(&f.mod_id);
        assert_eq!(texts[0], PUBLISH_FAILED);
        assert!(texts[1].ends_with("\"hello world this is long enough\""));

        // The second attempt succeeds with the number the first one would have had.
        let Decision::Posted(posted) = f.moderator.approve(&f.mod_id, item.id).await.unwrap() else {
            panic!("retry not posted");
        };
        assert_eq!(posted.sequence, Some(SequenceNumber(1)));
    }

    #[tokio::test]
    async fn publish_error_returns_item_to_queue() {
        let f = fixture();
        let item = f
            .moderator
            .submit(&f.channel.id, "hello world this is long enough")
            .await
            .unwrap()
            .item;
        f.platform.clear_sent();
        f.platform.fail_next_publish(PublishFailure::Rejected);

        let result = f.moderator.approve(&f.mod_id, item.id).await;

        assert!(matches!(
            result,
            Err(ModerationError::Publish { ref source, .. })
                if !source.timed_out && source.status_code == Some(500)
        ));
        assert!(f.platform.published().is_empty());
        assert_eq!(f.status(item.id), ItemStatus::Pending);
        assert_eq!(f.platform.texts_to(&f.mod_id)[0], PUBLISH_FAILED);
    }

    #[tokio::test]
    async fn publish_error_wins_over_resend_error() {
        let f = fixture();
        let item = f
            .moderator
            .submit(&f.channel.id, "hello world this is long enough")
            .await
            .unwrap()
            .item;
        f.platform.fail_next_publish(PublishFailure::Rejected);
        // The failure notice goes out, the re-send of the item does not.
        f.platform.fail_sends_after(1);

        let result = f.moderator.approve(&f.mod_id, item.id).await;

        assert!(matches!(result, Err(ModerationError::Publish { item: id, .. }) if id == item.id));
        assert_eq!(f.status(item.id), ItemStatus::Fresh);
        assert_eq!(f.last_text(), PUBLISH_FAILED);
    }

    #[tokio::test]
    async fn approving_twice_posts_once() {
        let f = fixture();
        let item = f
            .moderator
            .submit(&f.channel.id, "hello world this is long enough")
            .await
            .unwrap()
            .item;

        f.moderator.approve(&f.mod_id, item.id).await.unwrap();
        let second = f.moderator.approve(&f.mod_id, item.id).await.unwrap();

        assert!(matches!(second, Decision::AlreadyPosted(_)));
        assert_eq!(f.platform.published().len(), 1);
        assert!(f.last_text().starts_with("Item was already posted: https://www.facebook.com/"));
    }

    #[tokio::test]
    async fn concurrent_approvals_post_once() {
        let f = fixture();
        let item = f
            .moderator
            .submit(&f.channel.id, "hello world this is long enough")
            .await
            .unwrap()
            .item;

        let (a, b) = tokio::join!(
            f.moderator.approve(&f.mod_id, item.id),
            f.moderator.approve(&f.mod_id, item.id)
        );

        let decisions = [a.unwrap(), b.unwrap()];
        assert_eq!(
            decisions.iter().filter(|d| matches!(d, Decision::Posted(_))).count(),
            1
        );
        assert_eq!(f.platform.published().len(), 1);
    }

    #[tokio::test]
    async fn rejection_advances_to_next_item() {
        let f = fixture();
        let first = f.moderator.submit(&f.channel.id, "the first submission").await.unwrap().item;
        let second = f.moderator.submit(&f.channel.id, "the second submission").await.unwrap().item;

        let decision = f.moderator.reject(&f.mod_id, first.id).await.unwrap();

        assert!(matches!(decision, Decision::Rejected(_)));
        assert_eq!(f.status(first.id), ItemStatus::Rejected);
        assert_eq!(f.status(second.id), ItemStatus::Pending);
        assert!(f.last_text().ends_with("\"the second submission\""));
        assert!(f.platform.published().is_empty());
    }

    #[tokio::test]
    async fn rejecting_non_pending_item_is_a_no_op() {
        let f = fixture();
        let first = f.moderator.submit(&f.channel.id, "the first submission").await.unwrap().item;
        let second = f.moderator.submit(&f.channel.id, "the second submission").await.unwrap().item;
        f.moderator.reject(&f.mod_id, first.id).await.unwrap();

        let again = f.moderator.reject(&f.mod_id, first.id).await.unwrap();
        assert!(matches!(again, Decision::AlreadyHandled(_)));
        assert_eq!(f.last_text(), ALREADY_HANDLED);
        assert_eq!(f.status(second.id), ItemStatus::Pending);
    }

    #[tokio::test]
    async fn approving_fresh_item_is_already_handled() {
        let f = fixture();
        f.moderator.submit(&f.channel.id, "the first submission").await.unwrap();
        let waiting = f.moderator.submit(&f.channel.id, "the second submission").await.unwrap().item;

        let decision = f.moderator.approve(&f.mod_id, waiting.id).await.unwrap();
        assert!(matches!(decision, Decision::AlreadyHandled(_)));
        assert_eq!(f.status(waiting.id), ItemStatus::Fresh);
    }

    #[tokio::test]
    async fn only_the_channel_moderator_decides() {
        let f = fixture();
        let item = f.moderator.submit(&f.channel.id, "the first submission").await.unwrap().item;

        let result = f.moderator.approve(&SenderId::new("intruder"), item.id).await;
        assert!(matches!(result, Err(ModerationError::NotModerator { .. })));
        let result = f.moderator.reject(&SenderId::new("intruder"), item.id).await;
        assert!(matches!(result, Err(ModerationError::NotModerator { .. })));
        assert_eq!(f.status(item.id), ItemStatus::Pending);
    }

    #[tokio::test]
    async fn unknown_item() {
        let f = fixture();
        let result = f.moderator.approve(&f.mod_id, ItemId(99)).await;
        assert!(matches!(result, Err(ModerationError::UnknownItem(ItemId(99)))));
    }

    #[tokio::test]
    async fn failed_notification_leaves_item_fresh() {
        let f = fixture();
        f.platform.fail_sends_after(0);

        let submission = f.moderator.submit(&f.channel.id, "the first submission").await.unwrap();
        let item = submission.item;
        assert_eq!(item.status, ItemStatus::Fresh);
        assert!(matches!(submission.queue_error, Some(ModerationError::Notify(_))));

        f.platform.restore_sends();
        assert_eq!(
            f.moderator.advance_queue(&f.channel).await.unwrap(),
            QueueOutcome::Notified(item.id)
        );
    }

    #[tokio::test]
    async fn partially_sent_long_item_stays_fresh() {
        let f = fixture();
        f.platform.fail_sends_after(1);
        let text = "z".repeat(1500);

        let submission = f.moderator.submit(&f.channel.id, &text).await.unwrap();
        assert_eq!(submission.item.status, ItemStatus::Fresh);
        assert!(matches!(
            submission.queue_error,
            Some(ModerationError::Notify(ref e)) if e.to_string().contains("part 2")
        ));
        assert_eq!(f.pending_count(), 0);
    }

    #[tokio::test]
    async fn submission_validation() {
        let f = fixture();
        assert!(matches!(
            f.moderator.submit(&f.channel.id, "   short   ").await,
            Err(SubmitError::TooShort { min: MIN_SUBMISSION_LENGTH })
        ));
        assert!(matches!(
            f.moderator.submit(&ChannelId::new("C9"), "long enough text").await,
            Err(SubmitError::UnknownChannel(_))
        ));

        let first = f.moderator.submit(&f.channel.id, "long enough text").await.unwrap().item;
        assert!(matches!(
            f.moderator.submit(&f.channel.id, "  long enough text ").await,
            Err(SubmitError::Duplicate(id)) if id == first.id
        ));
    }

    #[tokio::test]
    async fn numbers_increase_across_posts() {
        let f = fixture();
        f.platform
            .set_feed(&f.channel.id, vec![feed_post("C1_old", "#41 made by hand")]);

        let mut sequences = Vec::new();
        for text in ["first of three items", "second of three items", "third of three items"] {
            f.moderator.submit(&f.channel.id, text).await.unwrap();
        }
        for _ in 0..3 {
            let pending = f.store.pending(&f.channel.id).unwrap();
            let Decision::Posted(item) = f.moderator.approve(&f.mod_id, pending[0].id).await.unwrap() else {
                panic!("not posted");
            };
            sequences.push(item.sequence.unwrap().0);
            assert!(f.pending_count() <= 1);
        }
        assert_eq!(sequences, vec![42, 43, 44]);
    }

    #[tokio::test]
    async fn send_pending_resends_or_reports_none() {
        let f = fixture();
        f.moderator.send_pending(&f.mod_id).await.unwrap();
        assert_eq!(f.last_text(), NOTHING_PENDING);

        f.moderator.submit(&f.channel.id, "the first submission").await.unwrap();
        f.platform.clear_sent();
        assert_eq!(f.moderator.send_pending(&f.mod_id).await.unwrap(), 1);
        assert!(f.last_text().ends_with("\"the first submission\""));
    }

    #[tokio::test]
    async fn manage_channel_creates_then_updates() {
        let f = fixture();
        let sender = SenderId::new("M2");
        let page = ChannelId::new("C2");

        let outcome = f
            .moderator
            .manage_channel(&sender, &page, "Second Page", "tok-1")
            .await
            .unwrap();
        assert_eq!(outcome, ChannelUpsert::Created);
        let texts = f.platform.texts_to(&sender);
        assert_eq!(texts[0], "I am now managing the page Second Page");
        assert_eq!(
            texts[1],
            "Items need to be submitted to: https://bot.example.com/channels/C2/items"
        );

        let outcome = f
            .moderator
            .manage_channel(&sender, &page, "Second Page", "tok-2")
            .await
            .unwrap();
        assert_eq!(outcome, ChannelUpsert::Updated);
        let stored = f.store.channel(&page).unwrap().unwrap();
        assert_eq!(stored.token, "tok-2");
        assert_eq!(stored.moderator, sender);
    }

    #[tokio::test]
    async fn index_items_reads_numbers_from_posts() {
        let f = fixture();
        let item = f.moderator.submit(&f.channel.id, "an item to index").await.unwrap().item;
        let Decision::Posted(posted) = f.moderator.approve(&f.mod_id, item.id).await.unwrap() else {
            panic!("not posted");
        };
        let reply = f.moderator.submit(&f.channel.id, "#1 a reply to it").await.unwrap().item;
        f.moderator.approve(&f.mod_id, reply.id).await.unwrap();

        // The post was renumbered by hand on the platform.
        let post_id = posted.post_id.clone().unwrap();
        f.platform.set_feed(
            &f.channel.id,
            vec![FeedPost {
                id: post_id,
                message: Some("#7 an item to index".to_string()),
            }],
        );

        assert_eq!(f.moderator.index_items().await.unwrap(), 1);
        assert_eq!(
            f.store.item(item.id).unwrap().unwrap().sequence,
            Some(SequenceNumber(7))
        );
        assert_eq!(f.store.item(reply.id).unwrap().unwrap().sequence, None);
    }

    /// A store that can lose item writes to a concurrent writer.
    struct FlakyStore {
        inner: SnapshotStore,
        /// Another writer touches the item just before the next write.
        race_next_write: AtomicBool,
        /// Every write that marks an item posted conflicts.
        refuse_posted: AtomicBool,
    }

    impl FlakyStore {
        fn new() -> Self {
            FlakyStore {
                inner: SnapshotStore::in_memory(),
                race_next_write: AtomicBool::new(false),
                refuse_posted: AtomicBool::new(false),
            }
        }
    }

    impl Store for FlakyStore {
        fn channel(&self, id: &ChannelId) -> Result<Option<Channel>, StoreError> {
            self.inner.channel(id)
        }
        fn upsert_channel(&self, channel: Channel) -> Result<ChannelUpsert, StoreError> {
            self.inner.upsert_channel(channel)
        }
        fn create_item(
            &self,
            channel: &ChannelId,
            text: &str,
            submitted_at: DateTime<Utc>,
        ) -> Result<Item, StoreError> {
            self.inner.create_item(channel, text, submitted_at)
        }
        fn item(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
            self.inner.item(id)
        }
        fn save_item(&self, item: &Item) -> Result<Item, StoreError> {
            if item.status == ItemStatus::Posted && self.refuse_posted.load(Ordering::SeqCst) {
                return Err(StoreError::Conflict {
                    item: item.id,
                    expected: item.version,
                    found: item.version + 1,
                });
            }
            if self.race_next_write.swap(false, Ordering::SeqCst) {
                let mut other = self.inner.item(item.id)?.unwrap();
                other.updated_at = Utc::now();
                self.inner.save_item(&other)?;
            }
            self.inner.save_item(item)
        }
        fn oldest_fresh(&self, channel: &ChannelId) -> Result<Option<Item>, StoreError> {
            self.inner.oldest_fresh(channel)
        }
        fn pending(&self, channel: &ChannelId) -> Result<Vec<Item>, StoreError> {
            self.inner.pending(channel)
        }
        fn pending_for_moderator(&self, moderator: &SenderId) -> Result<Vec<Item>, StoreError> {
            self.inner.pending_for_moderator(moderator)
        }
        fn max_sequence(&self, channel: &ChannelId) -> Result<Option<SequenceNumber>, StoreError> {
            self.inner.max_sequence(channel)
        }
        fn item_by_sequence(
            &self,
            channel: &ChannelId,
            sequence: SequenceNumber,
        ) -> Result<Option<Item>, StoreError> {
            self.inner.item_by_sequence(channel, sequence)
        }
        fn items_with_status(&self, status: ItemStatus) -> Result<Vec<Item>, StoreError> {
            self.inner.items_with_status(status)
        }
    }

    #[tokio::test]
    async fn write_conflict_is_retried_once() {
        let f = fixture_with(FlakyStore::new());
        f.store.race_next_write.store(true, Ordering::SeqCst);

        let item = f.moderator.submit(&f.channel.id, "the first submission").await.unwrap().item;

        assert_eq!(item.status, ItemStatus::Pending);
        assert_eq!(item.version, 2);
    }

    #[tokio::test]
    async fn unrecorded_publish_is_recorded_without_posting_again() {
        let f = fixture_with(FlakyStore::new());
        let item = f
            .moderator
            .submit(&f.channel.id, "hello world this is long enough")
            .await
            .unwrap()
            .item;
        f.store.refuse_posted.store(true, Ordering::SeqCst);

        let result = f.moderator.approve(&f.mod_id, item.id).await;

        assert!(matches!(
            result,
            Err(ModerationError::Unrecorded { item: id, source: StoreError::Conflict { .. }, .. })
                if id == item.id
        ));
        assert_eq!(f.status(item.id), ItemStatus::Pending);
        assert!(f.last_text().starts_with("Posted item: https://www.facebook.com/"));

        // Still refused: a second approval must not publish again either.
        assert!(f.moderator.approve(&f.mod_id, item.id).await.is_err());
        assert_eq!(f.platform.published().len(), 1);

        f.store.refuse_posted.store(false, Ordering::SeqCst);
        let Decision::Posted(posted) = f.moderator.approve(&f.mod_id, item.id).await.unwrap() else {
            panic!("not recorded");
        };
        let published = f.platform.published();
        assert_eq!(published.len(), 1);
        assert_eq!(posted.post_id, Some(published[0].id.clone()));
        assert_eq!(posted.sequence, Some(SequenceNumber(1)));
    }

    #[tokio::test]
    async fn rejecting_unrecorded_publish_records_it() {
        let f = fixture_with(FlakyStore::new());
        let item = f
            .moderator
            .submit(&f.channel.id, "hello world this is long enough")
            .await
            .unwrap()
            .item;
        f.store.refuse_posted.store(true, Ordering::SeqCst);
        assert!(f.moderator.approve(&f.mod_id, item.id).await.is_err());
        f.store.refuse_posted.store(false, Ordering::SeqCst);

        let decision = f.moderator.reject(&f.mod_id, item.id).await.unwrap();

        assert!(matches!(decision, Decision::AlreadyPosted(ref i) if i.status == ItemStatus::Posted));
        assert_eq!(f.status(item.id), ItemStatus::Posted);
        assert_eq!(f.platform.published().len(), 1);
    }

    #[test]
    fn published_sequence_requires_exact_shape() {
        assert_eq!(published_sequence("#3 some text", "some text"), Some(SequenceNumber(3)));
        assert_eq!(published_sequence("#3 some text", "other"), None);
        assert_eq!(published_sequence("some text", "some text"), None);
    }
}
