//! Shared types for the VAULTBOT agent.
//!
//! These types form the data model used across all modules.
//! The run state is owned by the controller and mutated only by the
//! active worker; everything else reads it via whole-struct snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Log ring buffer capacity (oldest entries evicted first).
pub const LOG_CAPACITY: usize = 500;

/// Price points kept on the run state for the dashboard chart.
pub const PRICE_HISTORY_CAP: usize = 300;

/// Trade markers kept on the run state for the dashboard chart.
pub const TRADE_HISTORY_CAP: usize = 100;

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

/// Timestamps cross the API as epoch seconds (fractional), matching what
/// the dashboard frontend expects.
pub mod ts_secs {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(dt.timestamp_millis() as f64 / 1000.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let secs = f64::deserialize(d)?;
        DateTime::<Utc>::from_timestamp_millis((secs * 1000.0) as i64)
            .ok_or_else(|| serde::de::Error::custom("timestamp out of range"))
    }
}

/// `Option<DateTime<Utc>>` variant of [`ts_secs`].
pub mod ts_secs_opt {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
        match dt {
            Some(dt) => s.serialize_some(&(dt.timestamp_millis() as f64 / 1000.0)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let secs = Option::<f64>::deserialize(d)?;
        secs.map(|v| {
            DateTime::<Utc>::from_timestamp_millis((v * 1000.0) as i64)
                .ok_or_else(|| serde::de::Error::custom("timestamp out of range"))
        })
        .transpose()
    }
}

/// Wei amounts are serialized as decimal strings. JSON numbers cannot carry
/// a full u128, and the frontend treats amounts as opaque strings anyway.
pub mod wei_str {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(amount: &u128, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&amount.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u128, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse::<u128>().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

/// Trading signal. BUY acquires funds (vault withdrawal to the user's
/// wallet), SELL sends funds from the bot wallet, HOLD does nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Buy => write!(f, "BUY"),
            Signal::Sell => write!(f, "SELL"),
            Signal::Hold => write!(f, "HOLD"),
        }
    }
}

// ---------------------------------------------------------------------------
// Event log
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// One entry in the bounded in-memory log. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(with = "ts_secs")]
    pub ts: DateTime<Utc>,
    pub level: LogLevel,
    pub msg: String,
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// An in-flight vault withdrawal awaiting external fulfillment.
///
/// Created when a BUY step starts waiting for the frontend to move funds;
/// cleared when funds arrive or the deadline elapses. Never outlives the
/// step that created it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAction {
    #[serde(with = "wei_str")]
    pub amount_wei: u128,
    pub reason: String,
    pub vault_address: Option<String>,
    pub session_key_address: Option<String>,
    pub recipient_address: String,
    #[serde(with = "ts_secs")]
    pub deadline: DateTime<Utc>,
    #[serde(with = "ts_secs")]
    pub created_at: DateTime<Utc>,
}

/// The most recently completed step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastStep {
    pub side: Signal,
    pub tx_ref: String,
    #[serde(with = "ts_secs")]
    pub timestamp: DateTime<Utc>,
    #[serde(with = "wei_str")]
    pub amount_wei: u128,
}

/// Per-run counters. Iterations count every pass through the loop
/// (including HOLDs); steps count completed BUY/SELL actions only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepCounters {
    pub iterations: u64,
    pub total_steps: u64,
    pub buy_count: u64,
    pub sell_count: u64,
}

/// Terminal outcome of a run, recorded by the worker's finalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopKind {
    Completed,
    Cancelled,
    Expired,
    TimedOut,
    Failed,
}

impl StopKind {
    /// Status code written to the persistence store.
    pub fn store_code(&self) -> &'static str {
        match self {
            StopKind::Completed => "COMPLETE",
            StopKind::Cancelled => "CANCELLED",
            StopKind::Expired => "SESSION_KEY_EXPIRED",
            StopKind::TimedOut => "TIMEOUT",
            StopKind::Failed => "ERROR",
        }
    }
}

/// A point on the synthetic price chart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePoint {
    #[serde(with = "ts_secs")]
    pub t: DateTime<Utc>,
    pub price: f64,
}

/// A completed trade marker on the chart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeMark {
    pub side: Signal,
    #[serde(with = "ts_secs")]
    pub t: DateTime<Utc>,
    pub price: f64,
}

/// Parameters supplied by the caller of `start`.
#[derive(Debug, Clone, Default)]
pub struct StartParams {
    pub credential_expiry: Option<DateTime<Utc>>,
    pub session_key_address: Option<String>,
    pub smart_account_address: Option<String>,
    pub recipient_address: Option<String>,
    pub vault_address: Option<String>,
}

/// Full state of the current (or most recent) run.
///
/// Owned by the controller; mutated only by the single active worker under
/// the controller's mutex. All reads go through whole-struct clones taken
/// under the same mutex, so no torn read is ever observable.
#[derive(Debug, Clone, Serialize)]
pub struct RunState {
    pub id: Option<String>,
    pub is_running: bool,
    #[serde(with = "ts_secs_opt")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(with = "ts_secs_opt")]
    pub credential_expiry: Option<DateTime<Utc>>,
    pub credential_expired: bool,
    pub session_key_address: Option<String>,
    pub vault_address: Option<String>,
    pub smart_account_address: Option<String>,
    pub recipient_address: Option<String>,
    pub counters: StepCounters,
    pub current_signal: Signal,
    pub current_price: Option<f64>,
    pub last_step: Option<LastStep>,
    pub error: Option<String>,
    pub stop_reason: Option<String>,
    pub pending_action: Option<PendingAction>,
    /// Set to true at most once per run, under the same lock as the rest
    /// of this struct.
    pub alert_sent: bool,
    pub price_history: Vec<PricePoint>,
    pub trade_history: Vec<TradeMark>,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            id: None,
            is_running: false,
            started_at: None,
            credential_expiry: None,
            credential_expired: false,
            session_key_address: None,
            vault_address: None,
            smart_account_address: None,
            recipient_address: None,
            counters: StepCounters::default(),
            current_signal: Signal::Hold,
            current_price: None,
            last_step: None,
            error: None,
            stop_reason: None,
            pending_action: None,
            alert_sent: false,
            price_history: Vec::new(),
            trade_history: Vec::new(),
        }
    }

    /// Reset to the initial values of a fresh run.
    pub fn reset_for(&mut self, run_id: String, params: &StartParams) {
        *self = Self::new();
        self.id = Some(run_id);
        self.is_running = true;
        self.started_at = Some(Utc::now());
        self.credential_expiry = params.credential_expiry;
        self.session_key_address = params.session_key_address.clone();
        self.vault_address = params.vault_address.clone();
        self.smart_account_address = params.smart_account_address.clone();
        self.recipient_address = params.recipient_address.clone();
    }

    pub fn push_price(&mut self, price: f64) {
        self.current_price = Some(price);
        self.price_history.push(PricePoint {
            t: Utc::now(),
            price,
        });
        if self.price_history.len() > PRICE_HISTORY_CAP {
            let excess = self.price_history.len() - PRICE_HISTORY_CAP;
            self.price_history.drain(..excess);
        }
    }

    pub fn push_trade_mark(&mut self, side: Signal, price: f64) {
        self.trade_history.push(TradeMark {
            side,
            t: Utc::now(),
            price,
        });
        if self.trade_history.len() > TRADE_HISTORY_CAP {
            let excess = self.trade_history.len() - TRADE_HISTORY_CAP;
            self.trade_history.drain(..excess);
        }
    }

    /// Price values oldest-first, for signal evaluation.
    pub fn price_values(&self) -> Vec<f64> {
        self.price_history.iter().map(|p| p.price).collect()
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Trade record
// ---------------------------------------------------------------------------

/// One completed step, handed to the persistence store. Never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub trade_id: String,
    pub run_id: String,
    pub user_wallet: String,
    pub side: Signal,
    #[serde(with = "wei_str")]
    pub amount_wei: u128,
    pub tx_ref: String,
    pub to_wallet: String,
    pub status: String,
    #[serde(with = "ts_secs")]
    pub ts: DateTime<Utc>,
    pub meta: serde_json::Value,
}

impl TradeRecord {
    pub fn new(
        run_id: &str,
        user_wallet: &str,
        side: Signal,
        amount_wei: u128,
        tx_ref: &str,
        meta: serde_json::Value,
    ) -> Self {
        Self {
            trade_id: format!("trade:{}", uuid::Uuid::new_v4().simple()),
            run_id: run_id.to_string(),
            user_wallet: user_wallet.to_lowercase(),
            side,
            amount_wei,
            tx_ref: tx_ref.to_string(),
            to_wallet: user_wallet.to_lowercase(),
            status: "CONFIRMED".to_string(),
            ts: Utc::now(),
            meta,
        }
    }
}

/// Run identifiers are `run:<hex>` for easy grepping in store dumps.
pub fn new_run_id() -> String {
    format!("run:{}", uuid::Uuid::new_v4().simple())
}

/// Synthetic transaction reference for fulfilled steps, mirroring the
/// `0x` + 16 hex chars shape the dashboard truncates for display.
pub fn new_tx_ref() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("0x{}", &hex[..16])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
