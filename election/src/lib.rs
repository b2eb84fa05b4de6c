//! D21 Voting Engine
//!
//! Implements the D21 multi-winner voting method:
//! - One mandatory positive vote per voter
//! - An optional second positive vote for a different subject
//! - Or, instead of the second positive vote, one negative vote
//! - All votes cast inside a fixed voting window

pub mod engine;
pub mod setup;
pub mod snapshot;
pub mod subject;
pub mod voter;

pub use engine::*;
pub use setup::*;
pub use snapshot::*;
pub use subject::*;
pub use voter::*;
