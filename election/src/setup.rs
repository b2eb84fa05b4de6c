//! Election setup documents
//!
//! A setup lists the administrator, the subjects and the initial voters of an
//! election so a node can open it at start-up.

use crate::engine::Election;
use d21_core::{Address, D21Error, D21Result, ElectionConfig, SharedClock};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Election setup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ElectionSetup {
    /// Administrator address (hex)
    pub administrator: String,
    /// Voting window override in seconds
    #[serde(default)]
    pub voting_duration_secs: Option<u64>,
    /// Subject names, in registration order
    #[serde(default)]
    pub subjects: Vec<String>,
    /// Voter addresses (hex)
    #[serde(default)]
    pub voters: Vec<String>,
}

impl ElectionSetup {
    pub fn new(administrator: &Address) -> Self {
        Self {
            administrator: administrator.to_hex(),
            ..Default::default()
        }
    }

    /// Add a subject
    pub fn add_subject(mut self, name: &str) -> Self {
        self.subjects.push(name.to_string());
        self
    }

    /// Add a voter
    pub fn add_voter(mut self, voter: &Address) -> Self {
        self.voters.push(voter.to_hex());
        self
    }

    pub fn with_duration_secs(mut self, secs: u64) -> Self {
        self.voting_duration_secs = Some(secs);
        self
    }

    pub fn parse_administrator(&self) -> D21Result<Address> {
        parse_address(&self.administrator)
    }

    pub fn parse_voters(&self) -> D21Result<Vec<Address>> {
        self.voters.iter().map(|v| parse_address(v)).collect()
    }

    /// Open an election and populate it
    pub fn build(&self, defaults: ElectionConfig, clock: SharedClock) -> D21Result<Election> {
        let administrator = self.parse_administrator()?;
        let voters = self.parse_voters()?;

        let config = match self.voting_duration_secs {
            Some(0) => {
                return Err(D21Error::InvalidArgument(
                    "voting duration must be positive".into(),
                ))
            }
            Some(secs) => defaults.with_duration_secs(secs),
            None => defaults,
        };

        let election = Election::new(administrator, config, clock);
        for name in &self.subjects {
            election.register_subject(name)?;
        }
        for voter in voters {
            election.register_voter(&administrator, voter)?;
        }

        info!(
            "Election {} set up with {} subjects and {} voters",
            election.id(),
            election.subject_count(),
            election.voter_count()
        );

        Ok(election)
    }

    /// Save to JSON
    pub fn to_json(&self) -> D21Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| D21Error::SerializationError(e.to_string()))
    }

    /// Load from JSON
    pub fn from_json(json: &str) -> D21Result<Self> {
        serde_json::from_str(json).map_err(|e| D21Error::DeserializationError(e.to_string()))
    }
}

fn parse_address(hex: &str) -> D21Result<Address> {
    Address::from_hex(hex)
        .map_err(|e| D21Error::InvalidArgument(format!("invalid address '{}': {}", hex, e)))
}
