//! Persistent snapshot store using sled database

use async_trait::async_trait;
use d21_core::{D21Error, D21Result, ElectionId, SnapshotStore, StateVersion};
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
};
use sled::{Db, Transactional, Tree};
use std::path::Path;
use tracing::{debug, info};

const SNAPSHOT_TREE: &str = "snapshots";
const VERSION_TREE: &str = "versions";

/// Persistent snapshot store backed by sled database
pub struct PersistentSnapshotStore {
    db: Db,
    snapshots: Tree,
    versions: Tree,
}

impl PersistentSnapshotStore {
    pub fn open<P: AsRef<Path>>(path: P) -> D21Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path).map_err(storage_error)?;
        let snapshots = db.open_tree(SNAPSHOT_TREE).map_err(storage_error)?;
        let versions = db.open_tree(VERSION_TREE).map_err(storage_error)?;

        info!(
            "Opened snapshot store at {} ({} elections)",
            path.display(),
            snapshots.len()
        );

        Ok(Self {
            db,
            snapshots,
            versions,
        })
    }
}

fn decode_version(id: &ElectionId, bytes: &[u8]) -> D21Result<StateVersion> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| D21Error::StorageError(format!("corrupt version entry for {}", id)))?;
    Ok(StateVersion::new(u64::from_le_bytes(raw)))
}

#[async_trait]
impl SnapshotStore for PersistentSnapshotStore {
    async fn save(&self, id: ElectionId, version: StateVersion, bytes: Vec<u8>) -> D21Result<()> {
        let key = id.as_bytes();

        // Snapshot and version are written together or not at all
        let written = (&self.snapshots, &self.versions)
            .transaction(|(snapshots, versions)| -> ConflictableTransactionResult<bool, D21Error> {
                if let Some(stored) = versions.get(key)? {
                    let stored = decode_version(&id, &stored)
                        .map_err(ConflictableTransactionError::Abort)?;
                    if stored > version {
                        debug!("Ignoring stale snapshot {} of {} (have {})", version, id, stored);
                        return Ok(false);
                    }
                }

                snapshots.insert(key.as_slice(), bytes.as_slice())?;
                versions.insert(key.as_slice(), version.0.to_le_bytes().as_slice())?;
                Ok(true)
            })
            .map_err(|e| match e {
                TransactionError::Abort(e) => e,
                TransactionError::Storage(e) => storage_error(e),
            })?;

        if written {
            self.db.flush_async().await.map_err(storage_error)?;
        }

        Ok(())
    }

    async fn load(&self, id: ElectionId) -> D21Result<Option<Vec<u8>>> {
        self.snapshots
            .get(id.as_bytes())
            .map(|opt| opt.map(|v| v.to_vec()))
            .map_err(storage_error)
    }

    async fn election_ids(&self) -> D21Result<Vec<ElectionId>> {
        self.snapshots
            .iter()
            .keys()
            .map(|key| {
                let key = key.map_err(storage_error)?;
                let raw: [u8; 16] = key
                    .as_ref()
                    .try_into()
                    .map_err(|_| D21Error::StorageError("corrupt election key".into()))?;
                Ok(ElectionId::from_bytes(raw))
            })
            .collect()
    }

    async fn version(&self, id: ElectionId) -> D21Result<Option<StateVersion>> {
        match self.versions.get(id.as_bytes()).map_err(storage_error)? {
            Some(bytes) => Ok(Some(decode_version(&id, &bytes)?)),
            None => Ok(None),
        }
    }
}

fn storage_error(err: sled::Error) -> D21Error {
    D21Error::StorageError(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_persistent_store_basic() {
        let tmp = TempDir::new().unwrap();
        let store = PersistentSnapshotStore::open(tmp.path()).unwrap();
        let id = ElectionId::generate();

        store.save(id, StateVersion::new(1), b"v1".to_vec()).await.unwrap();
        store.save(id, StateVersion::new(0), b"v0".to_vec()).await.unwrap();

        assert_eq!(store.load(id).await.unwrap(), Some(b"v1".to_vec()));
        assert_eq!(store.version(id).await.unwrap(), Some(StateVersion::new(1)));
    }

    #[tokio::test]
    async fn test_snapshot_and_version_stay_paired() {
        let tmp = TempDir::new().unwrap();
        let store = std::sync::Arc::new(PersistentSnapshotStore::open(tmp.path()).unwrap());
        let id = ElectionId::generate();

        let handles: Vec<_> = (1..=16u64)
            .map(|n| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .save(id, StateVersion::new(n), n.to_le_bytes().to_vec())
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let version = store.version(id).await.unwrap().unwrap();
        let bytes = store.load(id).await.unwrap().unwrap();
        assert_eq!(version, StateVersion::new(16));
        assert_eq!(bytes, 16u64.to_le_bytes().to_vec());
    }

    #[tokio::test]
    async fn test_corrupt_version_entry_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = PersistentSnapshotStore::open(tmp.path()).unwrap();
        let id = ElectionId::generate();
        store.versions.insert(id.as_bytes(), &b"bad"[..]).unwrap();

        assert!(matches!(
            store.save(id, StateVersion::new(1), b"v1".to_vec()).await,
            Err(D21Error::StorageError(_))
        ));
        assert_eq!(store.load(id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_persistent_store_reopen() {
        let tmp = TempDir::new().unwrap();
        let id = ElectionId::generate();

        {
            let store = PersistentSnapshotStore::open(tmp.path()).unwrap();
            store.save(id, StateVersion::new(4), b"state".to_vec()).await.unwrap();
        }

        {
            let store = PersistentSnapshotStore::open(tmp.path()).unwrap();
            assert_eq!(store.election_ids().await.unwrap(), vec![id]);
            assert_eq!(store.load(id).await.unwrap(), Some(b"state".to_vec()));
            assert_eq!(store.version(id).await.unwrap(), Some(StateVersion::new(4)));
        }
    }
}
