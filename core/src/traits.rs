//! Core traits defining D21 interfaces
//!
//! These traits define the contracts between the engine and its collaborators.

use crate::types::*;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Result type for D21 operations
pub type D21Result<T> = Result<T, crate::error::D21Error>;

/// Source of the current time.
///
/// Implementations must be monotonic non-decreasing for the life of an election.
pub trait Clock: Send + Sync {
    /// Current time
    fn now(&self) -> Timestamp;
}

/// Shared clock handle
pub type SharedClock = Arc<dyn Clock>;

/// Wall clock backed by the system time.
///
/// Never reports a time earlier than one it already returned, even if the
/// system clock is stepped back.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: AtomicU64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }

    fn observe(&self, wall: Timestamp) -> Timestamp {
        let previous = self.last.fetch_max(wall.as_millis(), Ordering::SeqCst);
        Timestamp::from_millis(previous.max(wall.as_millis()))
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        self.observe(Timestamp::now())
    }
}

/// A deterministic clock for testing.
///
/// Time only advances when you tell it to.
#[derive(Debug, Default)]
pub struct ManualClock {
    current: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            current: AtomicU64::new(start.as_millis()),
        }
    }

    /// Advance time by a duration
    pub fn advance(&self, by: Duration) {
        let millis = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        let _ = self
            .current
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| {
                Some(t.saturating_add(millis))
            });
    }

    /// Move time forward to `to`. Earlier values are ignored.
    pub fn set(&self, to: Timestamp) {
        self.current.fetch_max(to.as_millis(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.current.load(Ordering::SeqCst))
    }
}

/// Storage for serialized election snapshots
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Store the latest snapshot of an election, replacing any older one
    async fn save(&self, id: ElectionId, version: StateVersion, bytes: Vec<u8>) -> D21Result<()>;

    /// Load the latest snapshot of an election
    async fn load(&self, id: ElectionId) -> D21Result<Option<Vec<u8>>>;

    /// Ids of all stored elections
    async fn election_ids(&self) -> D21Result<Vec<ElectionId>>;

    /// Version of the stored snapshot, if any
    async fn version(&self, id: ElectionId) -> D21Result<Option<StateVersion>>;
}

/// Shared snapshot store handle
pub type SharedSnapshotStore = Arc<dyn SnapshotStore>;
