//! Fund movement collaborators.
//!
//! Defines the `FundsMover` and `LedgerReader` traits the worker drives,
//! with two implementations:
//! - JSON-RPC against an Ethereum node (`rpc`) — balances and node-managed
//!   sends; no key material ever passes through this process
//! - in-memory simulation (`sim`) for demo mode and tests

pub mod rpc;
pub mod sim;

use async_trait::async_trait;
use thiserror::Error;

/// A fund transfer was rejected or could not be attempted.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("RPC transport error: {0}")]
    Rpc(String),
    #[error("transfer rejected: {0}")]
    Rejected(String),
    #[error("no sender account configured for SELL transfers")]
    NotConfigured,
}

/// A vault balance read failed. Always non-fatal to the run.
#[derive(Debug, Error)]
#[error("vault balance read failed: {0}")]
pub struct LedgerReadError(pub String);

/// Moves funds and observes balances on behalf of the worker.
///
/// `send` executes a SELL synchronously. `balance`/`has_arrived` support
/// the BUY confirmation poll: the worker captures a baseline balance, then
/// polls `has_arrived` until the external actor's deposit is visible.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FundsMover: Send + Sync {
    /// Transfer `amount_wei` to `recipient`. Returns a transaction reference.
    async fn send(&self, recipient: &str, amount_wei: u128) -> Result<String, TransferError>;

    /// Whether `recipient`'s balance has risen above `baseline_wei`.
    async fn has_arrived(&self, recipient: &str, baseline_wei: u128)
        -> Result<bool, TransferError>;

    /// Current balance of `recipient` in wei.
    async fn balance(&self, recipient: &str) -> Result<u128, TransferError>;
}

/// Read-only view of the vault ledger, used for the pre-flight
/// sufficiency check before a BUY step.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerReader: Send + Sync {
    async fn vault_balance(&self, vault: &str, holder: &str) -> Result<u128, LedgerReadError>;
}
