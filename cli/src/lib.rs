//! D21 CLI library: HTTP client for a D21 node

mod commands;

pub use commands::*;
