//! Run controller: owns the single worker slot.
//!
//! `start` and `stop` race through the run-state mutex, which makes the
//! no-two-concurrent-runs invariant a hard precondition rather than a
//! best-effort check. `snapshot` clones the whole run state under the
//! same mutex, so readers never see a half-applied mutation.

use std::sync::{Arc, Mutex};
use thiserror::Error;

use super::worker::{Worker, WorkerDeps};
use super::StopToken;
use crate::feed::PriceFeed;
use crate::signal::SignalSource;
use crate::types::{new_run_id, RunState, StartParams};

/// Control errors are returned synchronously to the caller and are not
/// run failures; the API layer maps them to 409 Conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("Bot is already running")]
    AlreadyRunning,
    #[error("Bot is not running")]
    NotRunning,
}

/// Per-run strategy and feed builders. A fresh source is constructed for
/// every run so plans never leak state across runs.
pub struct RunFactories {
    pub signal: Box<dyn Fn() -> Box<dyn SignalSource> + Send + Sync>,
    pub feed: Box<dyn Fn() -> Box<dyn PriceFeed> + Send + Sync>,
}

pub struct RunController {
    /// Shared with the active worker: one lock guards every mutation.
    run: Arc<Mutex<RunState>>,
    /// Token of the current (or most recent) run.
    token: Mutex<StopToken>,
    deps: WorkerDeps,
    factories: RunFactories,
}

impl RunController {
    pub fn new(deps: WorkerDeps, factories: RunFactories) -> Self {
        Self {
            run: Arc::new(Mutex::new(RunState::new())),
            token: Mutex::new(StopToken::new()),
            deps,
            factories,
        }
    }

    /// Launch a run. Fails with `AlreadyRunning` while a worker holds the
    /// slot; otherwise resets the run state, installs a fresh stop token,
    /// and spawns the worker. Returns the new run id.
    pub fn start(&self, params: StartParams) -> Result<String, ControlError> {
        let mut run = self.run.lock().unwrap();
        if run.is_running {
            return Err(ControlError::AlreadyRunning);
        }

        let run_id = new_run_id();
        run.reset_for(run_id.clone(), &params);

        let token = StopToken::new();
        *self.token.lock().unwrap() = token.clone();

        let worker = Worker::new(
            Arc::clone(&self.run),
            token,
            self.deps.clone(),
            (self.factories.signal)(),
            (self.factories.feed)(),
        );
        tokio::spawn(worker.run());

        Ok(run_id)
    }

    /// Request cancellation. Returns immediately; the worker observes the
    /// token at its next sleep boundary and runs its own terminal cleanup
    /// (CANCELLED, not a silent halt).
    pub fn stop(&self) -> Result<(), ControlError> {
        let run = self.run.lock().unwrap();
        if !run.is_running {
            return Err(ControlError::NotRunning);
        }
        self.token.lock().unwrap().cancel();
        Ok(())
    }

    /// Consistent point-in-time copy of the run state.
    pub fn snapshot(&self) -> RunState {
        self.run.lock().unwrap().clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
