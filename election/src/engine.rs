//! Main voting engine implementation

use crate::snapshot::ElectionSnapshot;
use crate::subject::{Subject, SubjectRegistry, SubjectStanding};
use crate::voter::{BallotSlot, Polarity, VoterRecord};
use d21_core::{
    Address, D21Error, D21Result, ElectionConfig, ElectionId, SharedClock, StateVersion,
    SubjectId, Timestamp,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Events emitted by an election
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElectionEvent {
    /// New subject registered
    SubjectRegistered {
        election: ElectionId,
        subject: SubjectId,
        name: String,
    },
    /// Voter made eligible
    VoterRegistered { election: ElectionId, voter: Address },
    /// Vote accepted
    VoteCast {
        election: ElectionId,
        voter: Address,
        subject: SubjectId,
        slot: BallotSlot,
        score: i64,
    },
}

/// Mutable part of an election, guarded by a single lock
#[derive(Debug, Default)]
pub(crate) struct ElectionState {
    pub(crate) subjects: SubjectRegistry,
    pub(crate) voters: HashMap<Address, VoterRecord>,
    pub(crate) version: StateVersion,
}

/// A single D21 election.
///
/// Mutations take the write lock for their whole duration, so they are
/// applied one at a time and either fully succeed or change nothing.
/// Queries share the read lock and always see a consistent state.
pub struct Election {
    id: ElectionId,
    administrator: Address,
    created_at: Timestamp,
    deadline: Timestamp,
    config: ElectionConfig,
    clock: SharedClock,
    state: RwLock<ElectionState>,
    event_tx: Option<mpsc::Sender<ElectionEvent>>,
}

impl Election {
    /// Create a new election opening now
    pub fn new(administrator: Address, config: ElectionConfig, clock: SharedClock) -> Self {
        Self::with_id(ElectionId::generate(), administrator, config, clock)
    }

    /// Create a new election with a given id
    pub fn with_id(
        id: ElectionId,
        administrator: Address,
        config: ElectionConfig,
        clock: SharedClock,
    ) -> Self {
        let created_at = clock.now();
        let deadline = created_at.saturating_add(config.voting_duration());

        info!(
            "Election {} created by {}, voting closes at {}",
            id,
            administrator,
            deadline.to_rfc3339()
        );

        Self {
            id,
            administrator,
            created_at,
            deadline,
            config,
            clock,
            state: RwLock::new(ElectionState::default()),
            event_tx: None,
        }
    }

    /// Rebuild an election from a snapshot
    pub fn restore(snapshot: ElectionSnapshot, clock: SharedClock) -> D21Result<Self> {
        let subjects = SubjectRegistry::from_subjects(snapshot.subjects)?;

        let mut voters = HashMap::with_capacity(snapshot.voters.len());
        for (address, record) in snapshot.voters {
            if !record.is_consistent()
                || record.voted_subjects.iter().any(|s| !subjects.contains(*s))
            {
                return Err(D21Error::DeserializationError(format!(
                    "corrupt vote record for voter {}",
                    address
                )));
            }
            if voters.insert(address, record).is_some() {
                return Err(D21Error::DeserializationError(format!(
                    "voter {} stored twice",
                    address
                )));
            }
        }

        debug!(
            "Restored election {} at {} with {} subjects and {} voters",
            snapshot.id,
            snapshot.version,
            subjects.len(),
            voters.len()
        );

        Ok(Self {
            id: snapshot.id,
            administrator: snapshot.administrator,
            created_at: snapshot.created_at,
            deadline: snapshot.deadline,
            config: snapshot.config,
            clock,
            state: RwLock::new(ElectionState {
                subjects,
                voters,
                version: snapshot.version,
            }),
            event_tx: None,
        })
    }

    /// Set event channel
    pub fn set_event_channel(&mut self, tx: mpsc::Sender<ElectionEvent>) {
        self.event_tx = Some(tx);
    }

    pub fn id(&self) -> ElectionId {
        self.id
    }

    pub fn administrator(&self) -> Address {
        self.administrator
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn deadline(&self) -> Timestamp {
        self.deadline
    }

    pub fn config(&self) -> &ElectionConfig {
        &self.config
    }

    /// State version, bumped by every successful mutation
    pub fn version(&self) -> StateVersion {
        self.state.read().version
    }

    /// Whether the voting window has elapsed
    pub fn is_closed(&self) -> bool {
        self.clock.now() >= self.deadline
    }

    fn ensure_open(&self) -> D21Result<()> {
        if self.is_closed() {
            return Err(D21Error::VotingClosed);
        }
        Ok(())
    }

    /// Register a new subject. Open to any caller.
    pub fn register_subject(&self, name: &str) -> D21Result<SubjectId> {
        let mut state = self.state.write();

        if self.config.close_subject_registration {
            self.ensure_open()?;
        }

        let id = state.subjects.register(name).map_err(|e| {
            debug!("Subject '{}' rejected in {}: {}", name, self.id, e);
            e
        })?;
        state.version = state.version.next();
        drop(state);

        info!("Subject {} '{}' registered in election {}", id, name, self.id);

        self.emit_event(ElectionEvent::SubjectRegistered {
            election: self.id,
            subject: id,
            name: name.to_string(),
        });

        Ok(id)
    }

    /// Make `voter` eligible. Only the administrator may do this.
    pub fn register_voter(&self, caller: &Address, voter: Address) -> D21Result<()> {
        if *caller != self.administrator {
            warn!(
                "Non-administrator {} tried to register voter {} in {}",
                caller, voter, self.id
            );
            return Err(D21Error::Unauthorized(
                "only the administrator can register voters".into(),
            ));
        }

        let mut state = self.state.write();
        if state.voters.contains_key(&voter) {
            return Err(D21Error::AlreadyRegistered(voter));
        }
        state.voters.insert(voter, VoterRecord::new());
        state.version = state.version.next();
        drop(state);

        info!("Voter {} registered in election {}", voter, self.id);

        self.emit_event(ElectionEvent::VoterRegistered {
            election: self.id,
            voter,
        });

        Ok(())
    }

    /// Whether `identity` is a registered voter
    pub fn is_eligible_voter(&self, identity: &Address) -> bool {
        self.state.read().voters.contains_key(identity)
    }

    /// Whether `identity` may vote at all. Same predicate as [`is_eligible_voter`](Self::is_eligible_voter).
    pub fn can_vote(&self, identity: &Address) -> bool {
        self.is_eligible_voter(identity)
    }

    /// Cast a positive vote, consuming the first or second vote
    pub fn cast_positive_vote(&self, caller: &Address, subject: SubjectId) -> D21Result<BallotSlot> {
        self.cast_vote(caller, subject, Polarity::Positive)
    }

    /// Cast the negative vote, allowed once a positive vote is in
    pub fn cast_negative_vote(&self, caller: &Address, subject: SubjectId) -> D21Result<BallotSlot> {
        self.cast_vote(caller, subject, Polarity::Negative)
    }

    /// Validate and apply one vote. Checks run in a fixed order and nothing
    /// is changed unless all of them pass.
    pub fn cast_vote(
        &self,
        caller: &Address,
        subject: SubjectId,
        polarity: Polarity,
    ) -> D21Result<BallotSlot> {
        let mut state = self.state.write();

        let checked = self.ensure_open().and_then(|_| {
            if !state.subjects.contains(subject) {
                return Err(D21Error::UnknownSubject(subject));
            }
            let record = state.voters.get(caller).ok_or_else(|| {
                D21Error::Unauthorized(format!("{} is not a registered voter", caller))
            })?;
            if record.has_targeted(subject) {
                return Err(D21Error::AlreadyVotedForSubject(subject));
            }
            record.next_slot(polarity)
        });

        let slot = match checked {
            Ok(slot) => slot,
            Err(e) => {
                debug!(
                    "Rejected {} vote from {} for {} in {}: {}",
                    polarity, caller, subject, self.id, e
                );
                return Err(e);
            }
        };

        let score = state.subjects.apply_delta(subject, polarity.delta())?;
        if let Some(record) = state.voters.get_mut(caller) {
            record.record(slot, subject);
        }
        state.version = state.version.next();
        drop(state);

        info!(
            "Vote {:?} from {} for {} in election {} (score now {})",
            slot, caller, subject, self.id, score
        );

        self.emit_event(ElectionEvent::VoteCast {
            election: self.id,
            voter: *caller,
            subject,
            slot,
            score,
        });

        Ok(slot)
    }

    /// Subjects targeted by `identity`, first vote first. Empty for unknown identities.
    pub fn get_voted_subjects(&self, identity: &Address) -> Vec<SubjectId> {
        self.state
            .read()
            .voters
            .get(identity)
            .map(|r| r.voted_subjects.clone())
            .unwrap_or_default()
    }

    /// Time left in the voting window, zero once it has closed
    pub fn get_remaining_time(&self) -> Duration {
        self.deadline.remaining_from(self.clock.now())
    }

    /// Tally sorted by score descending, ties in registration order.
    ///
    /// Readable at any time; before the deadline the result is provisional.
    pub fn get_results(&self) -> Vec<SubjectStanding> {
        self.state.read().subjects.standings()
    }

    /// All subject ids in registration order
    pub fn subjects(&self) -> Vec<SubjectId> {
        self.state.read().subjects.ids()
    }

    /// Look up one subject
    pub fn subject(&self, id: SubjectId) -> Option<Subject> {
        self.state.read().subjects.get(id).cloned()
    }

    /// Vote record of a voter
    pub fn voter(&self, identity: &Address) -> Option<VoterRecord> {
        self.state.read().voters.get(identity).cloned()
    }

    pub fn subject_count(&self) -> usize {
        self.state.read().subjects.len()
    }

    pub fn voter_count(&self) -> usize {
        self.state.read().voters.len()
    }

    /// Consistent serializable image of the election
    pub fn snapshot(&self) -> ElectionSnapshot {
        let state = self.state.read();
        let mut voters: Vec<(Address, VoterRecord)> = state
            .voters
            .iter()
            .map(|(address, record)| (*address, record.clone()))
            .collect();
        voters.sort_by(|a, b| a.0.cmp(&b.0));

        ElectionSnapshot {
            id: self.id,
            administrator: self.administrator,
            created_at: self.created_at,
            deadline: self.deadline,
            config: self.config,
            subjects: state.subjects.all().to_vec(),
            voters,
            version: state.version,
        }
    }

    fn emit_event(&self, event: ElectionEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.try_send(event);
        }
    }
}

/// Shared election handle
pub type SharedElection = Arc<Election>;

/// Create election event channel
pub fn create_election_channel() -> (mpsc::Sender<ElectionEvent>, mpsc::Receiver<ElectionEvent>) {
    mpsc::channel(1024)
}
