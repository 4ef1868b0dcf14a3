//! Caching tiers.
//!
//! - `PersistentCache`: one durable, expiring snapshot of the working dataset
//! - `ResponseCache`: short-lived per-request responses with bounded capacity
//! - Storage backends implementing `KeyValueStore` (SQLite on disk, in-memory)

mod response;
mod snapshot;
mod storage;
mod traits;

pub use response::ResponseCache;
pub use snapshot::{
  PersistentCache, Snapshot, SnapshotInfo, SnapshotPayload, SNAPSHOT_KEY, STORED_AT_KEY,
};
pub use storage::{MemoryStorage, SqliteStorage};
pub use traits::{CacheEntry, KeyValueStore};
