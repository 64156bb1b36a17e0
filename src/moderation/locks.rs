//! Per-channel mutual exclusion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::types::ChannelId;

/// One async lock per channel, created on first use.
///
/// Locks are never taken for two channels at once, so there is no lock
/// ordering to get wrong.
#[derive(Debug, Default)]
pub struct ChannelLocks {
    locks: Mutex<HashMap<ChannelId, Arc<AsyncMutex<()>>>>,
}

impl ChannelLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for and takes the lock for `channel`.
    pub async fn lock(&self, channel: &ChannelId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(locks.entry(channel.clone()).or_default())
        };
        lock.lock_owned().await
    }
}
