//! Persistence for channels and items.
//!
//! # File Layout
//!
//! ```text
//! <STATE_PATH>        # the current snapshot (JSON)
//! <STATE_PATH>.tmp    # transient, only present mid-write
//! ```
//!
//! # Crash Safety
//!
//! Each mutation rewrites the snapshot with write-to-temp, fsync, rename and
//! directory fsync, and is applied in memory only after that succeeds.

pub mod fsync;
pub mod snapshot;
pub mod store;

pub use fsync::{fsync_dir, fsync_file};
pub use snapshot::{
    PersistedSnapshot, SCHEMA_VERSION, SnapshotError, load_snapshot, save_snapshot_atomic,
    try_load_snapshot,
};
pub use store::{ChannelUpsert, SnapshotStore, Store, StoreError};
