//! HTTP-level lifecycle: start a run through the router, watch it finish
//! through `/bot/status`, and read the event log back out.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::ServiceExt;

use vaultbot::api::{build_router, routes::BotState};
use vaultbot::config::TimingConfig;
use vaultbot::feed::SyntheticFeed;
use vaultbot::funds::sim::{SimFundsMover, SimLedger};
use vaultbot::runner::controller::RunFactories;
use vaultbot::runner::notify::NotificationGate;
use vaultbot::runner::worker::WorkerDeps;
use vaultbot::runner::{EventLog, RunController};
use vaultbot::signal::ScriptedPlan;
use vaultbot::types::Signal;

use crate::mocks::{MemoryStore, RecordingSink};

fn test_state(plan: Vec<Signal>) -> Arc<BotState> {
    let mover = Arc::new(SimFundsMover::new(true));
    let log = Arc::new(EventLog::new());
    let deps = WorkerDeps {
        mover: mover.clone(),
        ledger: Arc::new(SimLedger::new(u128::MAX)),
        store: Arc::new(MemoryStore::new()),
        gate: NotificationGate::new(Arc::new(RecordingSink::new())),
        log: log.clone(),
        timing: TimingConfig {
            poll_interval_ms: 5,
            confirm_deadline_ms: 60,
            inter_step_delay_ms: 5,
            cancel_check_ms: 2,
        },
        amount_wei: 100,
        notify_on_complete: false,
    };
    let controller = Arc::new(RunController::new(
        deps,
        RunFactories {
            signal: Box::new(move || Box::new(ScriptedPlan::new(plan.clone()))),
            feed: Box::new(|| Box::new(SyntheticFeed::new(3500.0))),
        },
    ));
    Arc::new(BotState {
        controller,
        log,
        mover,
        default_recipient: None,
        default_vault: None,
    })
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_req(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(resp.into_body(), 1_000_000).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn status_json(app: &axum::Router) -> serde_json::Value {
    let resp = app.clone().oneshot(get_req("/bot/status")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    body_json(resp).await
}

#[tokio::test]
async fn full_lifecycle_over_http() {
    let app = build_router(test_state(vec![Signal::Buy, Signal::Sell]));

    // Start with an explicit recipient
    let resp = app
        .clone()
        .oneshot(post_json(
            "/bot/start",
            serde_json::json!({ "recipient_address": "0xUser" }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let started = body_json(resp).await;
    assert_eq!(started["status"], "ok");
    let run_id = started["run_id"].as_str().unwrap().to_string();

    // Poll status until the run reaches its terminal state
    let deadline = Instant::now() + Duration::from_secs(5);
    let final_status = loop {
        let status = status_json(&app).await;
        if status["is_running"] == false && status["id"] == run_id.as_str() {
            break status;
        }
        assert!(Instant::now() < deadline, "run never finished");
        tokio::time::sleep(Duration::from_millis(10)).await;
    };

    assert_eq!(final_status["counters"]["buy_count"], 1);
    assert_eq!(final_status["counters"]["sell_count"], 1);
    assert!(final_status["error"].is_null());
    assert_eq!(
        final_status["stop_reason"],
        "Session complete. BUY: 1, SELL: 1."
    );
    // Timestamps serialize as epoch seconds for the frontend
    assert!(final_status["started_at"].as_f64().unwrap() > 1e9);

    // The event log saw the whole run
    let resp = app.clone().oneshot(get_req("/bot/logs")).await.unwrap();
    let logs = body_json(resp).await;
    let messages: Vec<String> = logs["logs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["msg"].as_str().unwrap().to_string())
        .collect();
    assert!(messages.iter().any(|m| m.starts_with("Bot started")));
    assert!(messages.iter().any(|m| m.starts_with("Bot stopped")));

    // Stopping the finished run conflicts
    let resp = app
        .oneshot(post_json("/bot/stop", serde_json::json!({})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn start_without_recipient_fails_the_run() {
    let app = build_router(test_state(vec![Signal::Sell]));

    // No recipient anywhere: accepted at the API, failed by the worker
    let resp = app
        .clone()
        .oneshot(post_json("/bot/start", serde_json::json!({})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let deadline = Instant::now() + Duration::from_secs(5);
    let status = loop {
        let status = status_json(&app).await;
        if status["is_running"] == false && !status["id"].is_null() {
            break status;
        }
        assert!(Instant::now() < deadline, "run never finished");
        tokio::time::sleep(Duration::from_millis(10)).await;
    };
    assert_eq!(
        status["error"],
        "Pass recipient_address when starting the bot"
    );
    assert_eq!(status["counters"]["total_steps"], 0);
}

#[tokio::test]
async fn key_material_is_rejected_before_anything_starts() {
    let app = build_router(test_state(vec![Signal::Sell]));

    for key in ["private_key", "mnemonic", "walletKey", "seed", "key"] {
        let resp = app
            .clone()
            .oneshot(post_json(
                "/bot/start",
                serde_json::json!({ key: "super-secret", "recipient_address": "0xUser" }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "key: {key}");
        let body = body_json(resp).await;
        assert!(!body["message"].as_str().unwrap().contains("super-secret"));
    }

    // Nothing started
    let status = status_json(&app).await;
    assert_eq!(status["is_running"], false);
    assert!(status["id"].is_null());
}
