//! Full run lifecycle scenarios: completion, timeout, expiry,
//! cancellation, and collaborator failure modes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use vaultbot::config::TimingConfig;
use vaultbot::feed::SyntheticFeed;
use vaultbot::runner::controller::RunFactories;
use vaultbot::runner::notify::NotificationGate;
use vaultbot::runner::worker::WorkerDeps;
use vaultbot::runner::{ControlError, EventLog, RunController};
use vaultbot::signal::ScriptedPlan;
use vaultbot::types::{RunState, Signal, StartParams};

use crate::mocks::{MemoryStore, MockLedger, MockMover, RecordingSink};

const AMOUNT_WEI: u128 = 100;

struct Harness {
    controller: Arc<RunController>,
    store: Arc<MemoryStore>,
    sink: Arc<RecordingSink>,
    log: Arc<EventLog>,
}

fn fast_timing() -> TimingConfig {
    TimingConfig {
        poll_interval_ms: 5,
        confirm_deadline_ms: 60,
        inter_step_delay_ms: 5,
        cancel_check_ms: 2,
    }
}

fn harness(plan: Vec<Signal>, mover: MockMover, store: MemoryStore, sink: RecordingSink) -> Harness {
    let store = Arc::new(store);
    let sink = Arc::new(sink);
    let log = Arc::new(EventLog::new());

    let deps = WorkerDeps {
        mover: Arc::new(mover),
        ledger: Arc::new(MockLedger {
            balance_wei: u128::MAX,
        }),
        store: store.clone(),
        gate: NotificationGate::new(sink.clone()),
        log: log.clone(),
        timing: fast_timing(),
        amount_wei: AMOUNT_WEI,
        notify_on_complete: false,
    };
    let controller = Arc::new(RunController::new(
        deps,
        RunFactories {
            signal: Box::new(move || Box::new(ScriptedPlan::new(plan.clone()))),
            feed: Box::new(|| Box::new(SyntheticFeed::new(3500.0))),
        },
    ));

    Harness {
        controller,
        store,
        sink,
        log,
    }
}

fn start_params() -> StartParams {
    StartParams {
        recipient_address: Some("0xRecipient".to_string()),
        session_key_address: Some("0xSessionKey".to_string()),
        vault_address: Some("0xVault".to_string()),
        ..Default::default()
    }
}

async fn wait_until_idle(controller: &RunController) -> RunState {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let snap = controller.snapshot();
        if !snap.is_running {
            return snap;
        }
        assert!(Instant::now() < deadline, "run never reached a terminal state");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn buy_sell_plan_completes_and_persists() {
    let h = harness(
        vec![Signal::Buy, Signal::Sell],
        MockMover::new(Some(1)),
        MemoryStore::new(),
        RecordingSink::new(),
    );

    let run_id = h.controller.start(start_params()).unwrap();
    let snap = wait_until_idle(&h.controller).await;

    assert_eq!(snap.counters.buy_count, 1);
    assert_eq!(snap.counters.sell_count, 1);
    assert_eq!(snap.counters.total_steps, 2);
    assert!(snap.error.is_none());
    assert_eq!(
        snap.stop_reason.as_deref(),
        Some("Session complete. BUY: 1, SELL: 1.")
    );
    assert!(snap.pending_action.is_none());
    assert!(snap.last_step.is_some());

    // Both steps persisted under the run, in order
    let trades = h.store.trades();
    assert_eq!(trades.len(), 2);
    assert!(trades.iter().all(|t| t.run_id == run_id));
    assert_eq!(trades[0].side, Signal::Buy);
    assert_eq!(trades[1].side, Signal::Sell);
    assert_eq!(trades[0].amount_wei, AMOUNT_WEI);
    assert_eq!(trades[0].user_wallet, "0xrecipient");
    assert_eq!(h.store.run_status(&run_id).as_deref(), Some("COMPLETE"));

    // Graceful completion does not alert
    assert_eq!(h.sink.attempts(), 0);
    assert!(!snap.alert_sent);
}

#[tokio::test]
async fn withdrawal_timeout_halts_and_alerts_once() {
    let h = harness(
        vec![Signal::Buy, Signal::Sell],
        MockMover::new(None),
        MemoryStore::new(),
        RecordingSink::new(),
    );

    let run_id = h.controller.start(start_params()).unwrap();
    let snap = wait_until_idle(&h.controller).await;

    assert_eq!(snap.error.as_deref(), Some("Vault withdrawal timeout"));
    assert_eq!(
        snap.stop_reason.as_deref(),
        Some("Stopped after 0 trades (timeout)")
    );
    assert!(snap.pending_action.is_none());
    // The SELL scheduled after the BUY never ran
    assert_eq!(snap.counters.sell_count, 0);
    assert_eq!(h.store.run_status(&run_id).as_deref(), Some("TIMEOUT"));
    assert_eq!(h.store.trades().len(), 0);

    assert!(snap.alert_sent);
    assert_eq!(h.sink.attempts(), 1);
    assert_eq!(h.sink.subjects(), vec!["Bot stopped".to_string()]);
}

#[tokio::test]
async fn session_expiry_ends_run_mid_flight() {
    let h = harness(
        vec![Signal::Hold; 200],
        MockMover::new(Some(1)),
        MemoryStore::new(),
        RecordingSink::new(),
    );

    let mut params = start_params();
    params.credential_expiry = Some(Utc::now() + chrono::Duration::milliseconds(40));
    let run_id = h.controller.start(params).unwrap();
    let snap = wait_until_idle(&h.controller).await;

    assert!(snap.credential_expired);
    assert_eq!(snap.error.as_deref(), Some("Session key expired"));
    assert_eq!(snap.stop_reason.as_deref(), Some("Session key expired"));
    assert_eq!(
        h.store.run_status(&run_id).as_deref(),
        Some("SESSION_KEY_EXPIRED")
    );

    assert_eq!(h.sink.attempts(), 1);
    assert_eq!(
        h.sink.subjects(),
        vec!["Bot stopped: session key expired".to_string()]
    );
}

#[tokio::test]
async fn already_expired_credential_runs_zero_steps() {
    let h = harness(
        vec![Signal::Buy; 10],
        MockMover::new(Some(1)),
        MemoryStore::new(),
        RecordingSink::new(),
    );

    let mut params = start_params();
    params.credential_expiry = Some(Utc::now() - chrono::Duration::hours(2));
    h.controller.start(params).unwrap();
    let snap = wait_until_idle(&h.controller).await;

    assert!(snap.credential_expired);
    assert_eq!(snap.counters.iterations, 0);
    assert_eq!(snap.counters.total_steps, 0);
    assert_eq!(h.store.trades().len(), 0);
}

#[tokio::test]
async fn stop_lands_within_the_check_interval() {
    let h = harness(
        vec![Signal::Hold; 10_000],
        MockMover::new(Some(1)),
        MemoryStore::new(),
        RecordingSink::new(),
    );

    h.controller.start(start_params()).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let stopped_at = Instant::now();
    h.controller.stop().unwrap();
    let snap = wait_until_idle(&h.controller).await;

    assert!(stopped_at.elapsed() < Duration::from_millis(500));
    assert_eq!(snap.stop_reason.as_deref(), Some("Stopped by user"));
    assert!(snap.error.is_none());
    assert_eq!(h.sink.attempts(), 0);

    // A second stop on the now-idle controller conflicts
    assert_eq!(h.controller.stop(), Err(ControlError::NotRunning));
}

#[tokio::test]
async fn stop_during_confirmation_wait_is_cancelled_not_timed_out() {
    let h = harness(
        vec![Signal::Buy],
        MockMover::new(None),
        MemoryStore::new(),
        RecordingSink::new(),
    );

    h.controller.start(start_params()).unwrap();
    // Land inside the confirmation poll
    tokio::time::sleep(Duration::from_millis(15)).await;
    h.controller.stop().unwrap();
    let snap = wait_until_idle(&h.controller).await;

    assert_eq!(snap.stop_reason.as_deref(), Some("Stopped by user"));
    assert!(snap.error.is_none());
    assert!(snap.pending_action.is_none());
}

#[tokio::test]
async fn sell_failure_halts_with_error() {
    let h = harness(
        vec![Signal::Sell, Signal::Sell],
        MockMover::failing_sends(),
        MemoryStore::new(),
        RecordingSink::new(),
    );

    let run_id = h.controller.start(start_params()).unwrap();
    let snap = wait_until_idle(&h.controller).await;

    assert!(snap
        .error
        .as_deref()
        .unwrap()
        .contains("SELL transfer failed"));
    assert_eq!(h.store.run_status(&run_id).as_deref(), Some("ERROR"));
    assert_eq!(h.sink.attempts(), 1);
}

#[tokio::test]
async fn store_failure_degrades_to_warnings() {
    let h = harness(
        vec![Signal::Buy, Signal::Sell],
        MockMover::new(Some(1)),
        MemoryStore::failing(),
        RecordingSink::new(),
    );

    h.controller.start(start_params()).unwrap();
    let snap = wait_until_idle(&h.controller).await;

    // The run itself completes despite every store call failing
    assert!(snap.error.is_none());
    assert_eq!(snap.counters.total_steps, 2);
    assert!(h
        .log
        .query(None)
        .iter()
        .any(|e| e.msg.contains("Failed to persist")));
}

#[tokio::test]
async fn alert_delivery_failure_never_retries() {
    let h = harness(
        vec![Signal::Buy],
        MockMover::new(None),
        MemoryStore::new(),
        RecordingSink::failing(),
    );

    h.controller.start(start_params()).unwrap();
    let snap = wait_until_idle(&h.controller).await;

    // Latched on the attempt, not on delivery
    assert!(snap.alert_sent);
    assert_eq!(h.sink.attempts(), 1);
    assert!(h
        .log
        .query(None)
        .iter()
        .any(|e| e.msg.contains("Failed to send stop alert email")));
}

#[tokio::test]
async fn restart_produces_a_fresh_run() {
    let h = harness(
        vec![Signal::Sell],
        MockMover::new(Some(1)),
        MemoryStore::new(),
        RecordingSink::new(),
    );

    let first = h.controller.start(start_params()).unwrap();
    wait_until_idle(&h.controller).await;

    let second = h.controller.start(start_params()).unwrap();
    let snap = wait_until_idle(&h.controller).await;

    assert_ne!(first, second);
    assert_eq!(snap.id.as_deref(), Some(second.as_str()));
    // Counters reset with the new run
    assert_eq!(snap.counters.sell_count, 1);
    assert_eq!(h.store.trades().len(), 2);
}
