//! In-memory snapshot store for testing and ephemeral nodes

use async_trait::async_trait;
use d21_core::{D21Result, ElectionId, SnapshotStore, StateVersion};
use dashmap::DashMap;
use tracing::debug;

/// In-memory snapshot store
pub struct MemorySnapshotStore {
    data: DashMap<ElectionId, (StateVersion, Vec<u8>)>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for MemorySnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save(&self, id: ElectionId, version: StateVersion, bytes: Vec<u8>) -> D21Result<()> {
        let mut entry = self.data.entry(id).or_insert((version, Vec::new()));
        if entry.0 > version {
            debug!("Ignoring stale snapshot {} of {} (have {})", version, id, entry.0);
            return Ok(());
        }
        *entry = (version, bytes);
        Ok(())
    }

    async fn load(&self, id: ElectionId) -> D21Result<Option<Vec<u8>>> {
        Ok(self.data.get(&id).map(|e| e.value().1.clone()))
    }

    async fn election_ids(&self) -> D21Result<Vec<ElectionId>> {
        Ok(self.data.iter().map(|e| *e.key()).collect())
    }

    async fn version(&self, id: ElectionId) -> D21Result<Option<StateVersion>> {
        Ok(self.data.get(&id).map(|e| e.value().0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemorySnapshotStore::new();
        let id = ElectionId::generate();

        assert_eq!(store.load(id).await.unwrap(), None);

        store.save(id, StateVersion::new(1), b"one".to_vec()).await.unwrap();
        assert_eq!(store.load(id).await.unwrap(), Some(b"one".to_vec()));
        assert_eq!(store.version(id).await.unwrap(), Some(StateVersion::new(1)));
        assert_eq!(store.election_ids().await.unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn test_memory_store_keeps_newest() {
        let store = MemorySnapshotStore::new();
        let id = ElectionId::generate();

        store.save(id, StateVersion::new(5), b"five".to_vec()).await.unwrap();
        store.save(id, StateVersion::new(3), b"three".to_vec()).await.unwrap();

        assert_eq!(store.load(id).await.unwrap(), Some(b"five".to_vec()));
        assert_eq!(store.len(), 1);
    }
}
