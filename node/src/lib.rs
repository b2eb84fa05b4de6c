//! D21 Node Implementation
//!
//! Main node binary that combines all components:
//! - Election runtime hosting any number of elections
//! - Snapshot persistence
//! - HTTP API

mod api;
mod node;
mod runtime;

pub use api::*;
pub use node::*;
pub use runtime::*;
