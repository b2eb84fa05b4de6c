//! Node runtime hosting elections

use d21_core::{
    Address, D21Error, D21Result, ElectionConfig, ElectionId, NodeConfig, SharedClock,
    SharedSnapshotStore, SubjectId,
};
use d21_election::{
    create_election_channel, BallotSlot, Election, ElectionEvent, ElectionSetup,
    ElectionSnapshot, Polarity, SharedElection,
};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info};

/// An election plus the gate that orders its persisted writes
struct ManagedElection {
    election: SharedElection,
    write_gate: Mutex<()>,
}

/// Node-wide counters
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeStats {
    pub elections: usize,
    pub open_elections: usize,
    pub votes_cast: u64,
}

/// Node runtime managing all elections
pub struct NodeRuntime {
    config: NodeConfig,
    clock: SharedClock,
    store: SharedSnapshotStore,
    elections: DashMap<ElectionId, Arc<ManagedElection>>,
    event_tx: mpsc::Sender<ElectionEvent>,
    event_rx: parking_lot::Mutex<Option<mpsc::Receiver<ElectionEvent>>>,
    votes_cast: AtomicU64,
}

impl NodeRuntime {
    /// Create a new node runtime
    pub fn new(config: NodeConfig, clock: SharedClock, store: SharedSnapshotStore) -> Self {
        let (event_tx, event_rx) = create_election_channel();

        Self {
            config,
            clock,
            store,
            elections: DashMap::new(),
            event_tx,
            event_rx: parking_lot::Mutex::new(Some(event_rx)),
            votes_cast: AtomicU64::new(0),
        }
    }

    /// Load every stored election
    pub async fn restore_elections(&self) -> D21Result<usize> {
        let ids = self.store.election_ids().await?;
        let mut restored = 0;

        for id in ids {
            let Some(bytes) = self.store.load(id).await? else {
                continue;
            };
            let snapshot = ElectionSnapshot::from_bytes(&bytes)?;
            let election = Election::restore(snapshot, self.clock.clone())?;
            self.insert(election);
            restored += 1;
        }

        if restored > 0 {
            info!("Restored {} elections from storage", restored);
        }

        Ok(restored)
    }

    /// Open a new, empty election
    pub async fn create_election(
        &self,
        administrator: Address,
        voting_duration_secs: Option<u64>,
    ) -> D21Result<SharedElection> {
        let config = self.election_config(voting_duration_secs)?;
        let election = Election::new(administrator, config, self.clock.clone());
        let election = self.insert(election);
        self.persist(&election).await?;
        Ok(election)
    }

    /// Open an election from a setup document
    pub async fn open_setup(&self, setup: &ElectionSetup) -> D21Result<SharedElection> {
        let election = setup.build(self.config.election, self.clock.clone())?;
        let election = self.insert(election);
        self.persist(&election).await?;
        Ok(election)
    }

    fn election_config(&self, voting_duration_secs: Option<u64>) -> D21Result<ElectionConfig> {
        match voting_duration_secs {
            Some(0) => Err(D21Error::InvalidArgument(
                "voting duration must be positive".into(),
            )),
            Some(secs) => Ok(self.config.election.with_duration_secs(secs)),
            None => Ok(self.config.election),
        }
    }

    fn insert(&self, mut election: Election) -> SharedElection {
        election.set_event_channel(self.event_tx.clone());
        let election = Arc::new(election);
        self.elections.insert(
            election.id(),
            Arc::new(ManagedElection {
                election: election.clone(),
                write_gate: Mutex::new(()),
            }),
        );
        election
    }

    fn managed(&self, id: ElectionId) -> D21Result<Arc<ManagedElection>> {
        self.elections
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or_else(|| D21Error::ElectionNotFound(id.to_string()))
    }

    /// Get an election
    pub fn election(&self, id: ElectionId) -> D21Result<SharedElection> {
        Ok(self.managed(id)?.election.clone())
    }

    /// All hosted election ids
    pub fn election_ids(&self) -> Vec<ElectionId> {
        self.elections.iter().map(|e| *e.key()).collect()
    }

    /// Run a mutation and persist the resulting snapshot, one at a time per election
    async fn mutate<T>(
        &self,
        id: ElectionId,
        op: impl FnOnce(&Election) -> D21Result<T>,
    ) -> D21Result<T> {
        let managed = self.managed(id)?;
        let _gate = managed.write_gate.lock().await;

        let output = op(&*managed.election)?;

        // The engine state is authoritative; a later snapshot supersedes a failed write.
        if let Err(e) = self.persist(&managed.election).await {
            error!("Failed to persist election {}: {}", id, e);
        }

        Ok(output)
    }

    async fn persist(&self, election: &Election) -> D21Result<()> {
        let snapshot = election.snapshot();
        let version = snapshot.version;
        self.store
            .save(election.id(), version, snapshot.to_bytes()?)
            .await?;
        debug!("Persisted election {} at {}", election.id(), version);
        Ok(())
    }

    /// Register a subject in an election
    pub async fn register_subject(&self, id: ElectionId, name: &str) -> D21Result<SubjectId> {
        self.mutate(id, |e| e.register_subject(name)).await
    }

    /// Register a voter in an election
    pub async fn register_voter(
        &self,
        id: ElectionId,
        caller: Address,
        voter: Address,
    ) -> D21Result<()> {
        self.mutate(id, |e| e.register_voter(&caller, voter)).await
    }

    /// Cast a vote in an election
    pub async fn cast_vote(
        &self,
        id: ElectionId,
        caller: Address,
        subject: SubjectId,
        polarity: Polarity,
    ) -> D21Result<BallotSlot> {
        self.mutate(id, |e| e.cast_vote(&caller, subject, polarity)).await
    }

    /// Hand out the event receiver. Only the first caller gets it.
    pub fn take_event_receiver(&self) -> Option<mpsc::Receiver<ElectionEvent>> {
        self.event_rx.lock().take()
    }

    /// Account for an election event
    pub fn record_event(&self, event: &ElectionEvent) {
        if let ElectionEvent::VoteCast { .. } = event {
            self.votes_cast.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> RuntimeStats {
        let elections = self.elections.len();
        let open_elections = self
            .elections
            .iter()
            .filter(|e| !e.value().election.is_closed())
            .count();

        RuntimeStats {
            elections,
            open_elections,
            votes_cast: self.votes_cast.load(Ordering::Relaxed),
        }
    }

    /// Get config reference
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn store(&self) -> &SharedSnapshotStore {
        &self.store
    }
}
