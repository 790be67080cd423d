//! JSON-RPC fund movement against an Ethereum node.
//!
//! Only two node methods are used: `eth_getBalance` for confirmation
//! polling and `eth_sendTransaction` for SELL steps. Sends go through a
//! node-managed account, so no signing happens in this process. Contract
//! calldata encoding is out of scope here; the per-account vault ledger
//! is maintained by the frontend, and the pre-flight check reads the
//! vault's native balance as the sufficiency signal.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::{FundsMover, LedgerReader, LedgerReadError, TransferError};

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<serde_json::Value>,
    error: Option<RpcError>,
}

/// Minimal JSON-RPC 2.0 client.
#[derive(Clone)]
pub struct RpcClient {
    http: Client,
    url: String,
}

impl RpcClient {
    pub fn new(url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build RPC HTTP client")?;
        Ok(Self {
            http,
            url: url.to_string(),
        })
    }

    async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let resp: RpcResponse = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("RPC request failed: {method}"))?
            .error_for_status()
            .with_context(|| format!("RPC returned error status: {method}"))?
            .json()
            .await
            .with_context(|| format!("Failed to parse RPC response: {method}"))?;

        if let Some(err) = resp.error {
            return Err(anyhow!("RPC error {} for {method}: {}", err.code, err.message));
        }
        resp.result
            .ok_or_else(|| anyhow!("RPC response for {method} had no result"))
    }

    async fn get_balance(&self, address: &str) -> Result<u128> {
        let result = self
            .call("eth_getBalance", json!([address, "latest"]))
            .await?;
        let hex = result
            .as_str()
            .ok_or_else(|| anyhow!("eth_getBalance returned a non-string result"))?;
        parse_wei_hex(hex)
    }
}

/// Parse a `0x`-prefixed hex quantity into wei.
pub fn parse_wei_hex(hex: &str) -> Result<u128> {
    let digits = hex.strip_prefix("0x").unwrap_or(hex);
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16).with_context(|| format!("Invalid wei quantity: {hex}"))
}

fn to_wei_hex(amount: u128) -> String {
    format!("{amount:#x}")
}

// ---------------------------------------------------------------------------
// FundsMover over RPC
// ---------------------------------------------------------------------------

pub struct RpcFundsMover {
    rpc: RpcClient,
    /// Node-managed sender for SELL steps. When unset the bot runs in
    /// observe-only mode and SELL steps fail as `NotConfigured`.
    bot_address: Option<String>,
}

impl RpcFundsMover {
    pub fn new(rpc: RpcClient, bot_address: Option<String>) -> Self {
        Self { rpc, bot_address }
    }

    pub fn bot_address(&self) -> Option<&str> {
        self.bot_address.as_deref()
    }
}

#[async_trait]
impl FundsMover for RpcFundsMover {
    async fn send(&self, recipient: &str, amount_wei: u128) -> Result<String, TransferError> {
        let from = self
            .bot_address
            .as_deref()
            .ok_or(TransferError::NotConfigured)?;

        let result = self
            .rpc
            .call(
                "eth_sendTransaction",
                json!([{
                    "from": from,
                    "to": recipient,
                    "value": to_wei_hex(amount_wei),
                }]),
            )
            .await
            .map_err(|e| TransferError::Rejected(e.to_string()))?;

        let tx_hash = result
            .as_str()
            .ok_or_else(|| TransferError::Rpc("non-string transaction hash".into()))?
            .to_string();
        debug!(tx_hash = %tx_hash, recipient, "SELL transfer submitted");
        Ok(tx_hash)
    }

    async fn has_arrived(
        &self,
        recipient: &str,
        baseline_wei: u128,
    ) -> Result<bool, TransferError> {
        let current = self.balance(recipient).await?;
        Ok(current > baseline_wei)
    }

    async fn balance(&self, recipient: &str) -> Result<u128, TransferError> {
        self.rpc
            .get_balance(recipient)
            .await
            .map_err(|e| TransferError::Rpc(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// LedgerReader over RPC
// ---------------------------------------------------------------------------

pub struct RpcLedger {
    rpc: RpcClient,
}

impl RpcLedger {
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl LedgerReader for RpcLedger {
    async fn vault_balance(&self, vault: &str, _holder: &str) -> Result<u128, LedgerReadError> {
        // Coarse check: the vault's total native balance bounds what any
        // holder can withdraw. Per-holder accounting lives in the contract
        // and is enforced there.
        self.rpc
            .get_balance(vault)
            .await
            .map_err(|e| LedgerReadError(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
