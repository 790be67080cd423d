//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys, RPC URLs) are referenced by env-var name in the
//! config and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub bot: BotConfig,
    pub strategy: StrategyConfig,
    pub timing: TimingConfig,
    pub chain: ChainConfig,
    pub store: StoreConfig,
    pub alerts: AlertsConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BotConfig {
    pub name: String,
    /// Amount moved per step, in wei.
    pub amount_wei: u64,
    /// Fallback recipient when the caller does not pass one.
    #[serde(default)]
    pub recipient_address: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StrategyConfig {
    /// "sma" for live crossover detection, "scripted" for a fixed plan.
    pub mode: String,
    pub short_sma_period: usize,
    pub long_sma_period: usize,
    /// Upper bound on loop iterations per run.
    pub max_iterations: usize,
    /// Side sequence for scripted mode, e.g. ["BUY", "SELL"].
    #[serde(default)]
    pub script: Vec<String>,
}

/// All worker wait intervals. Kept configurable so integration tests can
/// run the whole state machine in milliseconds.
#[derive(Debug, Deserialize, Clone)]
pub struct TimingConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_confirm_deadline")]
    pub confirm_deadline_ms: u64,
    #[serde(default = "default_inter_step_delay")]
    pub inter_step_delay_ms: u64,
    #[serde(default = "default_cancel_check")]
    pub cancel_check_ms: u64,
}

fn default_poll_interval() -> u64 {
    3_000
}
fn default_confirm_deadline() -> u64 {
    60_000
}
fn default_inter_step_delay() -> u64 {
    2_000
}
fn default_cancel_check() -> u64 {
    1_000
}

impl TimingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
    pub fn confirm_deadline(&self) -> Duration {
        Duration::from_millis(self.confirm_deadline_ms)
    }
    pub fn inter_step_delay(&self) -> Duration {
        Duration::from_millis(self.inter_step_delay_ms)
    }
    pub fn cancel_check(&self) -> Duration {
        Duration::from_millis(self.cancel_check_ms)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            confirm_deadline_ms: default_confirm_deadline(),
            inter_step_delay_ms: default_inter_step_delay(),
            cancel_check_ms: default_cancel_check(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChainConfig {
    /// When true, fund movement is simulated in-memory (no RPC calls).
    pub simulation: bool,
    pub rpc_url_env: String,
    #[serde(default)]
    pub vault_address: Option<String>,
    /// Node-managed sender account for SELL steps. No key material here;
    /// signing happens on the node side.
    #[serde(default)]
    pub bot_address_env: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub database_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertsConfig {
    #[serde(default)]
    pub resend_api_key_env: Option<String>,
    pub email_from: String,
    pub email_to: String,
    /// Graceful completion is non-alerting unless this is set.
    #[serde(default)]
    pub notify_on_complete: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub port: u16,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
