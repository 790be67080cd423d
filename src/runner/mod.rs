//! The execution core: run controller, worker state machine, expiry
//! guard, event log, and notification gate.
//!
//! Everything outside this module is a collaborator reached through a
//! narrow trait: fund movement, vault reads, persistence, and alerting.

pub mod controller;
pub mod expiry;
pub mod log;
pub mod notify;
pub mod worker;

pub use controller::{ControlError, RunController};
pub use log::EventLog;
pub use notify::{AlertSink, NotificationGate, ResendClient};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag shared between the controller and the
/// single active worker. The worker checks it at every sleep boundary,
/// so a stop request is observed within one polling granularity.
#[derive(Clone, Debug, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
