//! D21 Snapshot Storage
//!
//! Keeps the latest serialized snapshot of every election, keyed by election id.
//! Older versions never overwrite newer ones.

pub mod memory;
pub mod persistent;

pub use memory::*;
pub use persistent::*;

use d21_core::{D21Result, NodeConfig, SharedSnapshotStore};
use std::sync::Arc;

/// Open the store selected by the node configuration
pub fn open_store(config: &NodeConfig) -> D21Result<SharedSnapshotStore> {
    if config.storage.persistent {
        Ok(Arc::new(PersistentSnapshotStore::open(config.storage_path())?))
    } else {
        Ok(Arc::new(MemorySnapshotStore::new()))
    }
}
