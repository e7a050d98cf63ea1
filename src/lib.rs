// ABOUTME: Library root for switchyard - exposes public types for testing.
// ABOUTME: The main binary is in main.rs.

pub mod config;
pub mod deploy;
pub mod diagnostics;
pub mod error;
pub mod interrupt;
pub mod output;
pub mod pipeline;
pub mod pool;
pub mod router;
pub mod store;
pub mod substrate;
pub mod types;
pub mod verify;
