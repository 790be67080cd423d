//! Bot API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<BotState>`.
//! Control errors map to 409, bad start requests to 400. Error text
//! exposed through `/bot/status` passes through a redaction filter so
//! key material can never leak into a response, whatever a collaborator
//! put in the message.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::funds::FundsMover;
use crate::runner::{ControlError, EventLog, RunController};
use crate::types::{LogEntry, RunState, StartParams};

/// Request body keys that must never be accepted. The bot operates on a
/// scoped session key held elsewhere; any attempt to hand it raw key
/// material is rejected outright.
const FORBIDDEN_START_KEYS: &[&str] = &[
    "private_key",
    "privateKey",
    "wallet_key",
    "walletKey",
    "secret_key",
    "secretKey",
    "account_key",
    "accountKey",
    "key",
    "mnemonic",
    "seed",
];

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct BotState {
    pub controller: Arc<RunController>,
    pub log: Arc<EventLog>,
    pub mover: Arc<dyn FundsMover>,
    /// Fallback recipient when a start request does not pass one.
    pub default_recipient: Option<String>,
    /// Fallback vault contract address.
    pub default_vault: Option<String>,
}

pub type AppState = Arc<BotState>;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ApiMessage {
    pub status: &'static str,
    pub message: String,
}

impl ApiMessage {
    pub fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            status: "ok",
            message: message.into(),
        })
    }

    pub fn error(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            status: "error",
            message: message.into(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StartResponse {
    pub status: &'static str,
    pub message: String,
    pub run_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogsResponse {
    pub logs: Vec<LogEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogsQuery {
    /// Epoch seconds; return only entries strictly after this instant.
    pub since: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InfoResponse {
    pub bot_wallet: Option<String>,
    pub balance_wei: Option<String>,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

type ApiError = (StatusCode, Json<ApiMessage>);

fn bad_request(msg: impl Into<String>) -> ApiError {
    (StatusCode::BAD_REQUEST, ApiMessage::error(msg))
}

fn conflict(err: ControlError) -> ApiError {
    (StatusCode::CONFLICT, ApiMessage::error(err.to_string()))
}

/// POST /bot/start
pub async fn start_bot(
    State(state): State<AppState>,
    body: Option<Json<serde_json::Value>>,
) -> Result<Json<StartResponse>, ApiError> {
    let body = body.map(|Json(v)| v).unwrap_or(serde_json::Value::Null);

    if let Some(obj) = body.as_object() {
        for key in obj.keys() {
            if FORBIDDEN_START_KEYS.contains(&key.as_str()) {
                return Err(bad_request(
                    "Never send key material to this service. Session keys are created in the frontend wallet flow.",
                ));
            }
        }
    }

    let params = parse_start_params(
        &body,
        state.default_recipient.clone(),
        state.default_vault.clone(),
    )?;

    let run_id = state.controller.start(params).map_err(conflict)?;
    Ok(Json(StartResponse {
        status: "ok",
        message: "Bot started".to_string(),
        run_id,
    }))
}

fn parse_start_params(
    body: &serde_json::Value,
    default_recipient: Option<String>,
    default_vault: Option<String>,
) -> Result<StartParams, ApiError> {
    let str_field = |key: &str| -> Option<String> {
        body.get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    };

    let credential_expiry = match body.get("session_key_expiry") {
        None | Some(serde_json::Value::Null) => None,
        Some(v) => {
            let secs = v
                .as_f64()
                .ok_or_else(|| bad_request("session_key_expiry must be epoch seconds"))?;
            let expiry = epoch_secs(secs)
                .ok_or_else(|| bad_request("session_key_expiry is out of range"))?;
            if expiry <= Utc::now() {
                return Err(bad_request("session_key_expiry is in the past"));
            }
            Some(expiry)
        }
    };

    Ok(StartParams {
        credential_expiry,
        session_key_address: str_field("session_key_address"),
        smart_account_address: str_field("smart_account_address"),
        recipient_address: str_field("recipient_address").or(default_recipient),
        vault_address: str_field("vault_address").or(default_vault),
    })
}

fn epoch_secs(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let millis = (secs * 1000.0) as i64;
    Utc.timestamp_millis_opt(millis).single()
}

/// POST /bot/stop
pub async fn stop_bot(
    State(state): State<AppState>,
) -> Result<Json<ApiMessage>, ApiError> {
    state.controller.stop().map_err(conflict)?;
    Ok(ApiMessage::ok("Stop requested"))
}

/// GET /bot/status
pub async fn get_status(State(state): State<AppState>) -> Json<RunState> {
    let mut snapshot = state.controller.snapshot();
    if let Some(err) = snapshot.error.as_deref() {
        snapshot.error = Some(redact_error(err));
    }
    Json(snapshot)
}

/// GET /bot/logs?since=<epoch seconds>
pub async fn get_logs(
    State(state): State<AppState>,
    Query(q): Query<LogsQuery>,
) -> Json<LogsResponse> {
    let since = q.since.and_then(epoch_secs);
    Json(LogsResponse {
        logs: state.log.query(since),
    })
}

/// GET /bot/info
pub async fn get_info(State(state): State<AppState>) -> Json<InfoResponse> {
    let wallet = state
        .controller
        .snapshot()
        .recipient_address
        .or_else(|| state.default_recipient.clone());

    let balance = match wallet.as_deref() {
        Some(w) => state.mover.balance(w).await.ok().map(|b| b.to_string()),
        None => None,
    };

    Json(InfoResponse {
        bot_wallet: wallet,
        balance_wei: balance,
    })
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Strip anything that looks like key material from an error message
/// before it crosses the API boundary.
fn redact_error(msg: &str) -> String {
    let lower = msg.to_lowercase();
    if lower.contains("private_key") || lower.contains("private key") {
        "Error (details redacted)".to_string()
    } else {
        msg.to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
