//! D21 Core Library
//!
//! Core types, traits, and abstractions for the D21 voting engine.
//! This crate provides the foundation for all other D21 components.

pub mod types;
pub mod traits;
pub mod error;
pub mod config;

pub use types::*;
pub use traits::*;
pub use error::*;
pub use config::*;
