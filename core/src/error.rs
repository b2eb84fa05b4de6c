//! Error types for D21

use crate::types::{Address, SubjectId};
use thiserror::Error;

/// Main error type for D21
#[derive(Error, Debug)]
pub enum D21Error {
    // ============ Voting Rule Errors ============
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Voter {0} is already registered")]
    AlreadyRegistered(Address),

    #[error("Unknown subject {0}")]
    UnknownSubject(SubjectId),

    #[error("Voting window has closed")]
    VotingClosed,

    #[error("Already voted for subject {0}")]
    AlreadyVotedForSubject(SubjectId),

    #[error("Vote budget exhausted")]
    VoteBudgetExhausted,

    #[error("Negative vote requires a prior positive vote")]
    NegativeBeforePositive,

    // ============ Runtime Errors ============
    #[error("Election not found: {0}")]
    ElectionNotFound(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Serialization failed: {0}")]
    SerializationError(String),

    #[error("Deserialization failed: {0}")]
    DeserializationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl D21Error {
    /// Stable machine-readable name of the error kind
    pub fn code(&self) -> &'static str {
        match self {
            D21Error::InvalidArgument(_) => "invalid_argument",
            D21Error::Unauthorized(_) => "unauthorized",
            D21Error::AlreadyRegistered(_) => "already_registered",
            D21Error::UnknownSubject(_) => "unknown_subject",
            D21Error::VotingClosed => "voting_closed",
            D21Error::AlreadyVotedForSubject(_) => "already_voted_for_subject",
            D21Error::VoteBudgetExhausted => "vote_budget_exhausted",
            D21Error::NegativeBeforePositive => "negative_before_positive",
            D21Error::ElectionNotFound(_) => "election_not_found",
            D21Error::StorageError(_) => "storage_error",
            D21Error::SerializationError(_) => "serialization_error",
            D21Error::DeserializationError(_) => "deserialization_error",
            D21Error::ConfigError(_) => "config_error",
            D21Error::Internal(_) | D21Error::Other(_) => "internal",
        }
    }

    /// Whether the error is a rejected voting operation rather than an infrastructure fault
    pub fn is_rule_violation(&self) -> bool {
        matches!(
            self,
            D21Error::InvalidArgument(_)
                | D21Error::Unauthorized(_)
                | D21Error::AlreadyRegistered(_)
                | D21Error::UnknownSubject(_)
                | D21Error::VotingClosed
                | D21Error::AlreadyVotedForSubject(_)
                | D21Error::VoteBudgetExhausted
                | D21Error::NegativeBeforePositive
        )
    }
}

impl From<std::io::Error> for D21Error {
    fn from(err: std::io::Error) -> Self {
        D21Error::StorageError(err.to_string())
    }
}

impl From<bincode::Error> for D21Error {
    fn from(err: bincode::Error) -> Self {
        D21Error::SerializationError(err.to_string())
    }
}

impl From<serde_json::Error> for D21Error {
    fn from(err: serde_json::Error) -> Self {
        D21Error::SerializationError(err.to_string())
    }
}
