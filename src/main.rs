//! VAULTBOT — Session-Key Trading Agent
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the fund-movement backends (simulated or JSON-RPC), and serves
//! the control API until Ctrl+C.

use anyhow::{Context, Result};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::{info, warn};

use vaultbot::api::{self, routes::BotState};
use vaultbot::config::{self, AppConfig};
use vaultbot::feed::{CoinGeckoFeed, PriceFeed, SyntheticFeed};
use vaultbot::funds::rpc::{RpcClient, RpcFundsMover, RpcLedger};
use vaultbot::funds::sim::{SimFundsMover, SimLedger};
use vaultbot::funds::{FundsMover, LedgerReader};
use vaultbot::runner::controller::RunFactories;
use vaultbot::runner::worker::WorkerDeps;
use vaultbot::runner::{EventLog, NotificationGate, ResendClient, RunController};
use vaultbot::signal::{ScriptedPlan, SignalSource, SmaCrossover};
use vaultbot::store::SqliteStore;

const BANNER: &str = r#"
__     ___   _   _ _   _____ ____   ___ _____
\ \   / / \ | | | | | |_   _| __ ) / _ \_   _|
 \ \ / / _ \| | | | |   | | |  _ \| | | || |
  \ V / ___ \ |_| | |___| | | |_) | |_| || |
   \_/_/   \_\___/|_____|_| |____/ \___/ |_|

  Session-Key Trading Agent
  v0.1.0 — Unattended Execution Worker
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging(&cfg);

    // Print startup banner
    println!("{BANNER}");
    info!(
        bot_name = %cfg.bot.name,
        amount_wei = cfg.bot.amount_wei,
        simulation = cfg.chain.simulation,
        strategy = %cfg.strategy.mode,
        "VAULTBOT starting up"
    );

    // -- Persistence -----------------------------------------------------

    let store = SqliteStore::connect(&cfg.store.database_url)
        .await
        .context("Failed to open the trade store")?;
    let store = Arc::new(store);

    // -- Fund movement ---------------------------------------------------

    let (mover, ledger): (Arc<dyn FundsMover>, Arc<dyn LedgerReader>) = if cfg.chain.simulation {
        info!("Simulation mode: fund movement is in-memory");
        (
            Arc::new(SimFundsMover::new(true)),
            Arc::new(SimLedger::new(u128::MAX)),
        )
    } else {
        let rpc_url = AppConfig::resolve_env(&cfg.chain.rpc_url_env)?;
        let bot_address = cfg
            .chain
            .bot_address_env
            .as_deref()
            .and_then(|env| std::env::var(env).ok());
        if bot_address.is_none() {
            warn!("No sender account configured; SELL steps will fail");
        }
        let rpc = RpcClient::new(&rpc_url)?;
        (
            Arc::new(RpcFundsMover::new(rpc.clone(), bot_address)),
            Arc::new(RpcLedger::new(rpc)),
        )
    };

    // -- Alerting --------------------------------------------------------

    let resend_key = cfg
        .alerts
        .resend_api_key_env
        .as_deref()
        .and_then(|env| std::env::var(env).ok())
        .map(SecretString::new);
    if resend_key.is_none() {
        warn!("No Resend API key configured; stop alerts will be skipped");
    }
    let sink = ResendClient::new(resend_key, &cfg.alerts.email_from, &cfg.alerts.email_to)?;
    let gate = NotificationGate::new(Arc::new(sink));

    // -- Run controller --------------------------------------------------

    let log = Arc::new(EventLog::new());
    let deps = WorkerDeps {
        mover: mover.clone(),
        ledger,
        store,
        gate,
        log: log.clone(),
        timing: cfg.timing.clone(),
        amount_wei: u128::from(cfg.bot.amount_wei),
        notify_on_complete: cfg.alerts.notify_on_complete,
    };

    let strategy = cfg.strategy.clone();
    let chain_simulation = cfg.chain.simulation;
    let factories = RunFactories {
        signal: Box::new(move || -> Box<dyn SignalSource> {
            match strategy.mode.as_str() {
                "scripted" => Box::new(ScriptedPlan::from_strs(&strategy.script)),
                _ => Box::new(SmaCrossover::new(
                    strategy.short_sma_period,
                    strategy.long_sma_period,
                    strategy.max_iterations,
                )),
            }
        }),
        feed: Box::new(move || -> Box<dyn PriceFeed> {
            if chain_simulation {
                return Box::new(SyntheticFeed::new(3_500.0));
            }
            match CoinGeckoFeed::new("ethereum", std::env::var("COINGECKO_API_KEY").ok()) {
                Ok(feed) => Box::new(feed),
                Err(e) => {
                    warn!(error = %e, "CoinGecko feed unavailable, using synthetic prices");
                    Box::new(SyntheticFeed::new(3_500.0))
                }
            }
        }),
    };

    let controller = Arc::new(RunController::new(deps, factories));

    // -- Control API -----------------------------------------------------

    let state = Arc::new(BotState {
        controller,
        log,
        mover,
        default_recipient: cfg.bot.recipient_address.clone(),
        default_vault: cfg.chain.vault_address.clone(),
    });
    api::spawn_api(state, cfg.api.port)?;

    info!(port = cfg.api.port, "Ready. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutting down");

    Ok(())
}

fn init_logging(cfg: &config::AppConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("vaultbot=info"));

    let json_logging = std::env::var("VAULTBOT_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }

    let _ = cfg;
}
