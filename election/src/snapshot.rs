//! Serializable election images

use crate::subject::Subject;
use crate::voter::VoterRecord;
use d21_core::{
    Address, D21Error, D21Result, ElectionConfig, ElectionId, StateVersion, Timestamp,
};
use serde::{Deserialize, Serialize};

/// Full state of one election at a given version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionSnapshot {
    pub id: ElectionId,
    pub administrator: Address,
    pub created_at: Timestamp,
    pub deadline: Timestamp,
    pub config: ElectionConfig,
    /// In registration order
    pub subjects: Vec<Subject>,
    /// Sorted by address
    pub voters: Vec<(Address, VoterRecord)>,
    pub version: StateVersion,
}

impl ElectionSnapshot {
    pub fn to_bytes(&self) -> D21Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> D21Result<Self> {
        bincode::deserialize(bytes).map_err(|e| D21Error::DeserializationError(e.to_string()))
    }
}
