//! In-memory fund movement for simulation mode and tests.
//!
//! Balances live in a map; `deposit` stands in for the external actor
//! fulfilling a vault withdrawal. With `auto_fulfill` enabled the first
//! confirmation poll reports arrival, which keeps demo runs moving
//! without a frontend.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{FundsMover, LedgerReader, LedgerReadError, TransferError};
use crate::types::new_tx_ref;

pub struct SimFundsMover {
    balances: Mutex<HashMap<String, u128>>,
    auto_fulfill: bool,
}

impl SimFundsMover {
    pub fn new(auto_fulfill: bool) -> Self {
        Self {
            balances: Mutex::new(HashMap::new()),
            auto_fulfill,
        }
    }

    /// Credit an account, simulating an external deposit.
    pub fn deposit(&self, address: &str, amount_wei: u128) {
        let mut balances = self.balances.lock().unwrap();
        *balances.entry(address.to_lowercase()).or_insert(0) += amount_wei;
    }

    fn read(&self, address: &str) -> u128 {
        *self
            .balances
            .lock()
            .unwrap()
            .get(&address.to_lowercase())
            .unwrap_or(&0)
    }
}

#[async_trait]
impl FundsMover for SimFundsMover {
    async fn send(&self, recipient: &str, amount_wei: u128) -> Result<String, TransferError> {
        self.deposit(recipient, amount_wei);
        Ok(new_tx_ref())
    }

    async fn has_arrived(
        &self,
        recipient: &str,
        baseline_wei: u128,
    ) -> Result<bool, TransferError> {
        if self.auto_fulfill {
            self.deposit(recipient, 1);
        }
        Ok(self.read(recipient) > baseline_wei)
    }

    async fn balance(&self, recipient: &str) -> Result<u128, TransferError> {
        Ok(self.read(recipient))
    }
}

/// Simulated vault ledger with a fixed balance for every holder.
pub struct SimLedger {
    balance_wei: u128,
}

impl SimLedger {
    pub fn new(balance_wei: u128) -> Self {
        Self { balance_wei }
    }
}

#[async_trait]
impl LedgerReader for SimLedger {
    async fn vault_balance(&self, _vault: &str, _holder: &str) -> Result<u128, LedgerReadError> {
        Ok(self.balance_wei)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
