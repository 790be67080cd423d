//! Deterministic in-memory collaborators for integration testing.
//!
//! All state is controllable and inspectable from test code, with no
//! external dependencies.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use vaultbot::funds::{FundsMover, LedgerReadError, LedgerReader, TransferError};
use vaultbot::store::TradeStore;
use vaultbot::runner::AlertSink;
use vaultbot::types::TradeRecord;

// ---------------------------------------------------------------------------
// Fund movement
// ---------------------------------------------------------------------------

/// A mock funds mover with a scripted arrival schedule.
///
/// `arrive_after_polls: Some(n)` reports arrival on the n-th confirmation
/// poll; `None` never reports arrival, forcing the deadline path.
pub struct MockMover {
    arrive_after_polls: Option<u32>,
    polls: AtomicU32,
    fail_sends: bool,
    sent: Mutex<Vec<(String, u128)>>,
}

impl MockMover {
    pub fn new(arrive_after_polls: Option<u32>) -> Self {
        Self {
            arrive_after_polls,
            polls: AtomicU32::new(0),
            fail_sends: false,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Make every SELL transfer fail.
    pub fn failing_sends() -> Self {
        Self {
            fail_sends: true,
            ..Self::new(Some(1))
        }
    }

    pub fn sent(&self) -> Vec<(String, u128)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn poll_count(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FundsMover for MockMover {
    async fn send(&self, recipient: &str, amount_wei: u128) -> Result<String, TransferError> {
        if self.fail_sends {
            return Err(TransferError::Rejected("mock transfer rejected".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), amount_wei));
        Ok(format!("0xmock{:04x}", self.sent.lock().unwrap().len()))
    }

    async fn has_arrived(
        &self,
        _recipient: &str,
        _baseline_wei: u128,
    ) -> Result<bool, TransferError> {
        let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(matches!(self.arrive_after_polls, Some(k) if n >= k))
    }

    async fn balance(&self, _recipient: &str) -> Result<u128, TransferError> {
        Ok(0)
    }
}

/// A vault ledger with a fixed balance.
pub struct MockLedger {
    pub balance_wei: u128,
}

#[async_trait]
impl LedgerReader for MockLedger {
    async fn vault_balance(&self, _vault: &str, _holder: &str) -> Result<u128, LedgerReadError> {
        Ok(self.balance_wei)
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// An in-memory trade store. With `failing` set, every call errors, which
/// exercises the best-effort persistence path.
pub struct MemoryStore {
    failing: bool,
    runs: Mutex<HashMap<String, String>>,
    trades: Mutex<Vec<TradeRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            failing: false,
            runs: Mutex::new(HashMap::new()),
            trades: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::new()
        }
    }

    pub fn run_status(&self, run_id: &str) -> Option<String> {
        self.runs.lock().unwrap().get(run_id).cloned()
    }

    pub fn trades(&self) -> Vec<TradeRecord> {
        self.trades.lock().unwrap().clone()
    }
}

#[async_trait]
impl TradeStore for MemoryStore {
    async fn start_run(
        &self,
        run_id: &str,
        _user_wallet: &str,
        _buy_amount_wei: u128,
    ) -> Result<()> {
        if self.failing {
            return Err(anyhow!("store unavailable"));
        }
        self.runs
            .lock()
            .unwrap()
            .insert(run_id.to_string(), "ACTIVE".to_string());
        Ok(())
    }

    async fn stop_run(&self, run_id: &str, reason: &str) -> Result<()> {
        if self.failing {
            return Err(anyhow!("store unavailable"));
        }
        self.runs
            .lock()
            .unwrap()
            .insert(run_id.to_string(), reason.to_string());
        Ok(())
    }

    async fn record_trade(&self, record: &TradeRecord) -> Result<()> {
        if self.failing {
            return Err(anyhow!("store unavailable"));
        }
        self.trades.lock().unwrap().push(record.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Alerting
// ---------------------------------------------------------------------------

/// An alert sink that records every delivery attempt.
pub struct RecordingSink {
    failing: bool,
    subjects: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            failing: false,
            subjects: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            subjects: Mutex::new(Vec::new()),
        }
    }

    pub fn subjects(&self) -> Vec<String> {
        self.subjects.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.subjects.lock().unwrap().len()
    }
}

#[async_trait]
impl AlertSink for RecordingSink {
    async fn send(&self, subject: &str, _body: &str) -> Result<bool> {
        self.subjects.lock().unwrap().push(subject.to_string());
        if self.failing {
            return Err(anyhow!("email provider unavailable"));
        }
        Ok(true)
    }
}
