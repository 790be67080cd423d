//! The worker task: one run of the trading loop, start to terminal state.
//!
//! The loop per iteration: cancellation check, credential expiry check,
//! price tick, signal evaluation, then the side's action. BUY parks a
//! `PendingAction` and polls the recipient balance against a baseline
//! until funds arrive or the deadline passes. SELL sends synchronously.
//! Every wait is sliced by the cancel-check interval, so a stop request
//! lands within one slice regardless of how long the nominal sleep is.
//!
//! Failure policy is strict: a transfer failure, confirmation timeout,
//! or expired credential halts the run. Persistence and alerting
//! failures only degrade to warnings.

use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use super::expiry::{credential_status, CredentialStatus};
use super::log::EventLog;
use super::notify::NotificationGate;
use super::StopToken;
use crate::config::TimingConfig;
use crate::feed::PriceFeed;
use crate::funds::{FundsMover, LedgerReader};
use crate::signal::SignalSource;
use crate::store::TradeStore;
use crate::types::{new_tx_ref, LastStep, PendingAction, RunState, Signal, StopKind, TradeRecord};

/// Everything a worker needs besides the run itself. Cheap to clone;
/// the controller hands a copy to each spawned worker.
#[derive(Clone)]
pub struct WorkerDeps {
    pub mover: Arc<dyn FundsMover>,
    pub ledger: Arc<dyn LedgerReader>,
    pub store: Arc<dyn TradeStore>,
    pub gate: NotificationGate,
    pub log: Arc<EventLog>,
    pub timing: TimingConfig,
    pub amount_wei: u128,
    pub notify_on_complete: bool,
}

/// Result of one BUY confirmation wait.
enum BuyOutcome {
    Filled(String),
    TimedOut,
    Cancelled,
    Insufficient,
}

pub struct Worker {
    state: Arc<Mutex<RunState>>,
    token: StopToken,
    deps: WorkerDeps,
    signal: Box<dyn SignalSource>,
    feed: Box<dyn PriceFeed>,
}

impl Worker {
    pub fn new(
        state: Arc<Mutex<RunState>>,
        token: StopToken,
        deps: WorkerDeps,
        signal: Box<dyn SignalSource>,
        feed: Box<dyn PriceFeed>,
    ) -> Self {
        Self {
            state,
            token,
            deps,
            signal,
            feed,
        }
    }

    /// Drive the run to a terminal state. Never panics the task: any
    /// error is folded into the Failed outcome and finalized like every
    /// other stop.
    pub async fn run(mut self) {
        let kind = match self.run_inner().await {
            Ok(kind) => kind,
            Err(e) => {
                let msg = format!("{e:#}");
                self.deps.log.error(format!("Bot error: {msg}"));
                self.state.lock().unwrap().error = Some(msg);
                StopKind::Failed
            }
        };
        self.finalize(kind).await;
    }

    async fn run_inner(&mut self) -> Result<StopKind> {
        let (run_id, recipient) = {
            let st = self.state.lock().unwrap();
            (
                st.id.clone().unwrap_or_default(),
                st.recipient_address.clone(),
            )
        };
        let recipient = match recipient {
            Some(r) if !r.is_empty() => r,
            _ => anyhow::bail!("Pass recipient_address when starting the bot"),
        };

        if let Err(e) = self
            .deps
            .store
            .start_run(&run_id, &recipient, self.deps.amount_wei)
            .await
        {
            self.deps
                .log
                .warning(format!("Failed to persist run start: {e:#}"));
        }
        self.deps.log.info(format!(
            "Bot started. BUY amount: {} wei.",
            self.deps.amount_wei
        ));

        let mut tx_num: u64 = 0;
        loop {
            if self.token.is_cancelled() {
                return Ok(StopKind::Cancelled);
            }

            let expiry = self.state.lock().unwrap().credential_expiry;
            if credential_status(Utc::now(), expiry) == CredentialStatus::Expired {
                {
                    let mut st = self.state.lock().unwrap();
                    st.credential_expired = true;
                    st.error = Some("Session key expired".to_string());
                }
                self.deps.log.error("Session key expired. Bot stopping.");
                return Ok(StopKind::Expired);
            }

            let price = self.price_tick().await;
            let history = self.state.lock().unwrap().price_values();
            let Some(side) = self.signal.next(&history) else {
                return Ok(StopKind::Completed);
            };

            {
                let mut st = self.state.lock().unwrap();
                st.counters.iterations += 1;
                st.current_signal = side;
            }

            match side {
                Signal::Hold => {
                    self.deps.log.info(format!("HOLD at price {price:.2}"));
                }
                Signal::Buy => {
                    tx_num += 1;
                    match self.buy_step(tx_num, &recipient).await? {
                        BuyOutcome::Filled(tx_ref) => {
                            self.record_step(&run_id, &recipient, Signal::Buy, &tx_ref, tx_num, price)
                                .await;
                        }
                        BuyOutcome::TimedOut => {
                            self.deps.log.error(format!(
                                "BUY #{tx_num}: vault withdrawal not confirmed before deadline"
                            ));
                            let mut st = self.state.lock().unwrap();
                            let steps = st.counters.total_steps;
                            st.error = Some("Vault withdrawal timeout".to_string());
                            st.stop_reason =
                                Some(format!("Stopped after {steps} trades (timeout)"));
                            return Ok(StopKind::TimedOut);
                        }
                        BuyOutcome::Cancelled => return Ok(StopKind::Cancelled),
                        BuyOutcome::Insufficient => {
                            let mut st = self.state.lock().unwrap();
                            let steps = st.counters.total_steps;
                            st.error = Some("Insufficient vault balance for BUY".to_string());
                            st.stop_reason = Some(format!(
                                "Stopped after {steps} trades (insufficient vault balance)"
                            ));
                            return Ok(StopKind::Failed);
                        }
                    }
                }
                Signal::Sell => {
                    tx_num += 1;
                    self.deps.log.info(format!(
                        "SELL #{tx_num}: sending {} wei to {recipient}",
                        self.deps.amount_wei
                    ));
                    match self.deps.mover.send(&recipient, self.deps.amount_wei).await {
                        Ok(tx_ref) => {
                            self.record_step(&run_id, &recipient, Signal::Sell, &tx_ref, tx_num, price)
                                .await;
                        }
                        Err(e) => {
                            self.deps
                                .log
                                .error(format!("SELL #{tx_num} failed: {e}"));
                            let mut st = self.state.lock().unwrap();
                            let steps = st.counters.total_steps;
                            st.error = Some(format!("SELL transfer failed: {e}"));
                            st.stop_reason =
                                Some(format!("Stopped after {steps} trades (SELL failed)"));
                            return Ok(StopKind::Failed);
                        }
                    }
                }
            }

            if !self.sleep_cancellable(self.deps.timing.inter_step_delay()).await {
                return Ok(StopKind::Cancelled);
            }
        }
    }

    /// Pre-flight the vault, park a pending action, then poll the
    /// recipient balance until the withdrawal lands or the deadline does.
    async fn buy_step(&mut self, tx_num: u64, recipient: &str) -> Result<BuyOutcome> {
        let amount = self.deps.amount_wei;
        let (vault, session_key) = {
            let st = self.state.lock().unwrap();
            (st.vault_address.clone(), st.session_key_address.clone())
        };

        // Sufficiency check is advisory only when the read fails.
        if let Some(vault_addr) = vault.as_deref() {
            match self.deps.ledger.vault_balance(vault_addr, recipient).await {
                Ok(b) if b < amount => {
                    self.deps.log.error(format!(
                        "Insufficient vault balance: {b} wei < {amount} wei"
                    ));
                    return Ok(BuyOutcome::Insufficient);
                }
                Ok(b) => {
                    self.deps
                        .log
                        .info(format!("Vault balance OK: {b} wei >= {amount} wei"));
                }
                Err(e) => {
                    self.deps.log.warning(format!(
                        "Vault balance check failed, proceeding anyway: {e}"
                    ));
                }
            }
        }

        let baseline = self
            .deps
            .mover
            .balance(recipient)
            .await
            .context("Failed to read recipient balance")?;

        let deadline =
            Utc::now() + chrono::Duration::milliseconds(self.deps.timing.confirm_deadline_ms as i64);
        {
            let mut st = self.state.lock().unwrap();
            st.pending_action = Some(PendingAction {
                amount_wei: amount,
                reason: format!("BUY #{tx_num}"),
                vault_address: vault,
                session_key_address: session_key,
                recipient_address: recipient.to_string(),
                deadline,
                created_at: Utc::now(),
            });
        }
        self.deps.log.info(format!(
            "BUY #{tx_num}: awaiting vault withdrawal of {amount} wei..."
        ));

        let outcome = loop {
            if Utc::now() >= deadline {
                break BuyOutcome::TimedOut;
            }
            if !self.sleep_cancellable(self.deps.timing.poll_interval()).await {
                break BuyOutcome::Cancelled;
            }
            self.price_tick().await;
            match self.deps.mover.has_arrived(recipient, baseline).await {
                Ok(true) => break BuyOutcome::Filled(new_tx_ref()),
                Ok(false) => {}
                Err(e) => {
                    self.deps.log.warning(format!("Balance poll failed: {e}"));
                }
            }
        };

        self.state.lock().unwrap().pending_action = None;
        Ok(outcome)
    }

    /// Account for a filled step and hand it to the store.
    async fn record_step(
        &self,
        run_id: &str,
        recipient: &str,
        side: Signal,
        tx_ref: &str,
        tx_num: u64,
        price: f64,
    ) {
        let amount = self.deps.amount_wei;
        let seq = {
            let mut st = self.state.lock().unwrap();
            st.counters.total_steps += 1;
            let seq = match side {
                Signal::Buy => {
                    st.counters.buy_count += 1;
                    st.counters.buy_count
                }
                Signal::Sell => {
                    st.counters.sell_count += 1;
                    st.counters.sell_count
                }
                Signal::Hold => 0,
            };
            st.last_step = Some(LastStep {
                side,
                tx_ref: tx_ref.to_string(),
                timestamp: Utc::now(),
                amount_wei: amount,
            });
            st.push_trade_mark(side, price);
            seq
        };

        let short = &tx_ref[..tx_ref.len().min(18)];
        self.deps
            .log
            .info(format!("{side} #{tx_num}: filled (tx: {short}...)"));

        let key = match side {
            Signal::Buy => "buy_seq",
            _ => "sell_seq",
        };
        let record = TradeRecord::new(
            run_id,
            recipient,
            side,
            amount,
            tx_ref,
            serde_json::json!({ key: seq }),
        );
        if let Err(e) = self.deps.store.record_trade(&record).await {
            self.deps
                .log
                .warning(format!("Failed to persist trade: {e:#}"));
        }
    }

    /// One feed tick. Feed errors degrade to the last seen price.
    async fn price_tick(&mut self) -> f64 {
        match self.feed.latest().await {
            Ok(p) => {
                self.state.lock().unwrap().push_price(p);
                p
            }
            Err(e) => {
                self.deps.log.warning(format!("Price feed error: {e:#}"));
                self.state.lock().unwrap().current_price.unwrap_or(0.0)
            }
        }
    }

    /// Sleep `total`, waking at the cancel-check interval. Returns false
    /// as soon as cancellation is observed.
    async fn sleep_cancellable(&self, total: Duration) -> bool {
        let slice = self.deps.timing.cancel_check();
        let mut remaining = total;
        while !remaining.is_zero() {
            if self.token.is_cancelled() {
                return false;
            }
            let step = remaining.min(slice);
            sleep(step).await;
            remaining -= step;
        }
        !self.token.is_cancelled()
    }

    /// Terminal cleanup, identical for every stop kind: settle the stop
    /// reason, persist the outcome, run the alert gate, release the slot.
    async fn finalize(&self, kind: StopKind) {
        let (run_id, reason) = {
            let mut st = self.state.lock().unwrap();
            if st.stop_reason.is_none() {
                st.stop_reason = Some(match kind {
                    StopKind::Completed => format!(
                        "Session complete. BUY: {}, SELL: {}.",
                        st.counters.buy_count, st.counters.sell_count
                    ),
                    StopKind::Cancelled => "Stopped by user".to_string(),
                    StopKind::Expired => "Session key expired".to_string(),
                    StopKind::TimedOut => "Stopped after timeout".to_string(),
                    StopKind::Failed => st
                        .error
                        .clone()
                        .unwrap_or_else(|| "Stopped on error".to_string()),
                });
            }
            st.pending_action = None;
            (st.id.clone(), st.stop_reason.clone().unwrap_or_default())
        };

        if let Some(run_id) = run_id.as_deref() {
            if let Err(e) = self.deps.store.stop_run(run_id, kind.store_code()).await {
                self.deps
                    .log
                    .warning(format!("Failed to persist run stop: {e:#}"));
            }
        }

        let force = kind == StopKind::Completed && self.deps.notify_on_complete;
        self.deps
            .gate
            .notify_once(&self.state, &self.deps.log, &reason, force)
            .await;

        self.state.lock().unwrap().is_running = false;
        self.deps.log.info(format!("Bot stopped: {reason}"));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
