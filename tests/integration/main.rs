//! End-to-end tests over the public crate API.
//!
//! Runs the worker state machine against deterministic in-memory
//! collaborators, with every wait interval shrunk to milliseconds.

mod api_flow;
mod mocks;
mod run_scenarios;
