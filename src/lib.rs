//! VAULTBOT — Session-Key Trading Agent
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod api;
pub mod config;
pub mod feed;
pub mod funds;
pub mod runner;
pub mod signal;
pub mod store;
pub mod types;
