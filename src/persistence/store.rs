//! The record store for channels and items.
//!
//! [`Store`] is the seam the moderation engine writes through. The only
//! implementation, [`SnapshotStore`], keeps everything in memory and, when
//! given a path, commits each mutation to a snapshot file before making it
//! visible. A failed write leaves both memory and disk at the previous state.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::types::{Channel, ChannelId, Item, ItemId, ItemStatus, SenderId, SequenceNumber};

use super::snapshot::{PersistedSnapshot, SCHEMA_VERSION, SnapshotError, save_snapshot_atomic, try_load_snapshot};

#[derive(Debug, Error)]
pub enum StoreError {
    /// An item with the same text already exists.
    #[error("an item with this text already exists (item {existing})")]
    Duplicate { existing: ItemId },

    /// The item was modified since it was read.
    #[error("item {item} was modified concurrently (expected version {expected}, found {found})")]
    Conflict {
        item: ItemId,
        expected: u64,
        found: u64,
    },

    #[error("unknown channel {0}")]
    UnknownChannel(ChannelId),

    #[error("unknown item {0}")]
    UnknownItem(ItemId),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("store lock poisoned")]
    Poisoned,
}

/// Whether [`Store::upsert_channel`] created a channel or updated one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelUpsert {
    Created,
    Updated,
}

/// Durable storage for channels and items.
pub trait Store: Send + Sync + 'static {
    fn channel(&self, id: &ChannelId) -> Result<Option<Channel>, StoreError>;

    /// Creates the channel, or replaces the stored one with the same id.
    fn upsert_channel(&self, channel: Channel) -> Result<ChannelUpsert, StoreError>;

    /// Creates a fresh item with the next id.
    ///
    /// Fails with [`StoreError::Duplicate`] if any item already has this
    /// text, and with [`StoreError::UnknownChannel`] if the channel does not
    /// exist.
    fn create_item(
        &self,
        channel: &ChannelId,
        text: &str,
        submitted_at: DateTime<Utc>,
    ) -> Result<Item, StoreError>;

    fn item(&self, id: ItemId) -> Result<Option<Item>, StoreError>;

    /// Writes `item` if its `version` matches the stored one, and returns the
    /// stored copy with the version bumped.
    fn save_item(&self, item: &Item) -> Result<Item, StoreError>;

    /// The earliest submitted fresh item of a channel.
    fn oldest_fresh(&self, channel: &ChannelId) -> Result<Option<Item>, StoreError>;

    /// The pending items of a channel. Never more than one when the
    /// moderation engine is the only writer.
    fn pending(&self, channel: &ChannelId) -> Result<Vec<Item>, StoreError>;

    /// Pending items across every channel `moderator` moderates.
    fn pending_for_moderator(&self, moderator: &SenderId) -> Result<Vec<Item>, StoreError>;

    /// The highest sequence number recorded for a channel.
    fn max_sequence(&self, channel: &ChannelId) -> Result<Option<SequenceNumber>, StoreError>;

    /// The posted item carrying `sequence` in `channel`.
    fn item_by_sequence(
        &self,
        channel: &ChannelId,
        sequence: SequenceNumber,
    ) -> Result<Option<Item>, StoreError>;

    fn items_with_status(&self, status: ItemStatus) -> Result<Vec<Item>, StoreError>;
}

#[derive(Debug, Clone)]
struct State {
    next_item_id: u64,
    channels: BTreeMap<ChannelId, Channel>,
    items: BTreeMap<ItemId, Item>,
}

impl State {
    fn empty() -> Self {
        State {
            next_item_id: 1,
            channels: BTreeMap::new(),
            items: BTreeMap::new(),
        }
    }

    fn from_snapshot(snapshot: PersistedSnapshot) -> Self {
        let items: BTreeMap<ItemId, Item> =
            snapshot.items.into_iter().map(|i| (i.id, i)).collect();
        // Never reuse an id even if the counter was written behind the items.
        let next_item_id = items
            .keys()
            .next_back()
            .map(|id| id.0 + 1)
            .unwrap_or(1)
            .max(snapshot.next_item_id);
        State {
            next_item_id,
            channels: snapshot
                .channels
                .into_iter()
                .map(|c| (c.id.clone(), c))
                .collect(),
            items,
        }
    }

    fn to_snapshot(&self) -> PersistedSnapshot {
        PersistedSnapshot {
            schema_version: SCHEMA_VERSION,
            snapshot_at: Utc::now(),
            next_item_id: self.next_item_id,
            channels: self.channels.values().cloned().collect(),
            items: self.items.values().cloned().collect(),
        }
    }
}

/// A [`Store`] held in memory and optionally mirrored to a snapshot file.
#[derive(Debug)]
pub struct SnapshotStore {
    path: Option<PathBuf>,
    state: Mutex<State>,
}

impl SnapshotStore {
    /// A store that is never written to disk.
    pub fn in_memory() -> Self {
        SnapshotStore {
            path: None,
            state: Mutex::new(State::empty()),
        }
    }

    /// Opens the snapshot at `path`, starting empty if it does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let state = match try_load_snapshot(&path)? {
            Some(snapshot) => {
                info!(
                    path = %path.display(),
                    channels = snapshot.channels.len(),
                    items = snapshot.items.len(),
                    "Loaded state snapshot"
                );
                State::from_snapshot(snapshot)
            }
            None => {
                info!(path = %path.display(), "No state snapshot found, starting empty");
                State::empty()
            }
        };
        Ok(SnapshotStore {
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Poisoned)
    }

    fn read<T>(&self, f: impl FnOnce(&State) -> T) -> Result<T, StoreError> {
        let state = self.lock()?;
        Ok(f(&state))
    }

    /// Applies `f` to a copy of the state, persists the copy, then installs it.
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut State) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut state = self.lock()?;
        let mut next = state.clone();
        let result = f(&mut next)?;
        if let Some(path) = &self.path {
            save_snapshot_atomic(path, &next.to_snapshot())?;
        }
        *state = next;
        Ok(result)
    }
}

impl Store for SnapshotStore {
    fn channel(&self, id: &ChannelId) -> Result<Option<Channel>, StoreError> {
        self.read(|s| s.channels.get(id).cloned())
    }

    fn upsert_channel(&self, channel: Channel) -> Result<ChannelUpsert, StoreError> {
        self.mutate(|s| {
            let outcome = match s.channels.insert(channel.id.clone(), channel) {
                Some(_) => ChannelUpsert::Updated,
                None => ChannelUpsert::Created,
            };
            Ok(outcome)
        })
    }

    fn create_item(
        &self,
        channel: &ChannelId,
        text: &str,
        submitted_at: DateTime<Utc>,
    ) -> Result<Item, StoreError> {
        self.mutate(|s| {
            if !s.channels.contains_key(channel) {
                return Err(StoreError::UnknownChannel(channel.clone()));
            }
            if let Some(existing) = s.items.values().find(|i| i.text == text) {
                return Err(StoreError::Duplicate {
                    existing: existing.id,
                });
            }
            let id = ItemId(s.next_item_id);
            s.next_item_id += 1;
            let item = Item::new(id, channel.clone(), text, submitted_at);
            s.items.insert(id, item.clone());
            debug!(item = %id, channel = %channel, "Created item");
            Ok(item)
        })
    }

    fn item(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        self.read(|s| s.items.get(&id).cloned())
    }

    fn save_item(&self, item: &Item) -> Result<Item, StoreError> {
        self.mutate(|s| {
            let stored = s
                .items
                .get_mut(&item.id)
                .ok_or(StoreError::UnknownItem(item.id))?;
            if stored.version != item.version {
                return Err(StoreError::Conflict {
                    item: item.id,
                    expected: item.version,
                    found: stored.version,
                });
            }
            let mut updated = item.clone();
            updated.version += 1;
            *stored = updated.clone();
            Ok(updated)
        })
    }

    fn oldest_fresh(&self, channel: &ChannelId) -> Result<Option<Item>, StoreError> {
        self.read(|s| {
            s.items
                .values()
                .filter(|i| &i.channel == channel && i.status == ItemStatus::Fresh)
                .min_by_key(|i| (i.submitted_at, i.id))
                .cloned()
        })
    }

    fn pending(&self, channel: &ChannelId) -> Result<Vec<Item>, StoreError> {
        self.read(|s| {
            s.items
                .values()
                .filter(|i| &i.channel == channel && i.status == ItemStatus::Pending)
                .cloned()
                .collect()
        })
    }

    fn pending_for_moderator(&self, moderator: &SenderId) -> Result<Vec<Item>, StoreError> {
        self.read(|s| {
            s.items
                .values()
                .filter(|i| i.status == ItemStatus::Pending)
                .filter(|i| {
                    s.channels
                        .get(&i.channel)
                        .is_some_and(|c| &c.moderator == moderator)
                })
                .cloned()
                .collect()
        })
    }

    fn max_sequence(&self, channel: &ChannelId) -> Result<Option<SequenceNumber>, StoreError> {
        self.read(|s| {
            s.items
                .values()
                .filter(|i| &i.channel == channel)
                .filter_map(|i| i.sequence)
                .max()
        })
    }

    fn item_by_sequence(
        &self,
        channel: &ChannelId,
        sequence: SequenceNumber,
    ) -> Result<Option<Item>, StoreError> {
        self.read(|s| {
            s.items
                .values()
                .find(|i| {
                    &i.channel == channel
                        && i.status == ItemStatus::Posted
                        && i.sequence == Some(sequence)
                })
                .cloned()
        })
    }

    fn items_with_status(&self, status: ItemStatus) -> Result<Vec<Item>, StoreError> {
        self.read(|s| s.items.values().filter(|i| i.status == status).cloned().collect())
    }
}
