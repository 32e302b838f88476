//! SAGE — Autonomous Trading Cycle Orchestrator with Reflection
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the collaborators (exchange, market feed, oracle, store),
//! spawns the reflection timers and the query API, and runs the
//! trading loop with graceful shutdown.

use anyhow::Result;
use secrecy::SecretString;
use std::sync::Arc;
use tracing::{info, warn};

use sage::api::routes::ApiState;
use sage::api::spawn_api;
use sage::config::AppConfig;
use sage::engine::cycle::CycleRunner;
use sage::exchange::paper::PaperExchange;
use sage::exchange::upbit::UpbitClient;
use sage::exchange::{Exchange, MarketFeed};
use sage::oracle::openai::OpenAiOracle;
use sage::oracle::DecisionOracle;
use sage::scheduler::{spawn_reflection_timers, Scheduler};
use sage::storage::memory::MemoryStore;
use sage::storage::sqlite::SqliteStore;
use sage::storage::LedgerStore;

const BANNER: &str = r#"
 ____    _    ____ _____
/ ___|  / \  / ___| ____|
\___ \ / _ \| |  _|  _|
 ___) / ___ \ |_| | |___
|____/_/   \_\____|_____|

  Self-Assessing Guided Execution
  v0.1.0 — Autonomous Agent
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    // Print startup banner
    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        pair = %cfg.agent.pair,
        currency = %cfg.agent.currency,
        analysis_interval_secs = cfg.trading.analysis_interval_secs,
        minimum_trade_amount = %cfg.trading.minimum_trade_amount,
        trade_ratio = %cfg.trading.trade_ratio,
        paper = cfg.exchange.paper,
        "SAGE starting up"
    );

    // -- Persistence ------------------------------------------------------

    let store: Arc<dyn LedgerStore> = if cfg.database.url == "memory" {
        warn!("In-memory store configured — the ledger will not survive a restart");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(SqliteStore::connect(&cfg.database.url).await?)
    };

    // -- Exchange & market feed -------------------------------------------

    let (exchange, feed): (Arc<dyn Exchange>, Arc<dyn MarketFeed>) = if cfg.exchange.paper {
        info!(
            initial_cash = %cfg.exchange.paper_initial_cash,
            mark_price = %cfg.exchange.paper_mark_price,
            "Paper trading mode — orders fill in memory"
        );
        let paper = Arc::new(PaperExchange::new(
            cfg.exchange.paper_initial_cash,
            cfg.exchange.paper_mark_price,
            cfg.trading.fee_rate,
        ));
        (paper.clone(), paper)
    } else {
        let access_key = AppConfig::resolve_env(&cfg.exchange.access_key_env)?;
        let secret_key = AppConfig::resolve_env(&cfg.exchange.secret_key_env)?;
        let upbit = Arc::new(UpbitClient::new(
            access_key,
            SecretString::new(secret_key),
            &cfg.agent.pair,
            cfg.trading.collaborator_timeout_secs,
        )?);
        (upbit.clone() as Arc<dyn Exchange>, upbit)
    };

    // -- Decision oracle --------------------------------------------------

    let oracle_key = std::env::var(&cfg.oracle.api_key_env).unwrap_or_default();
    if oracle_key.is_empty() {
        warn!(
            env = %cfg.oracle.api_key_env,
            "No oracle API key configured — cycles will fail and retry until it is set"
        );
    }
    if cfg.oracle.provider != "openai" {
        warn!(provider = %cfg.oracle.provider, "Unknown oracle provider, defaulting to OpenAI");
    }
    let oracle: Arc<dyn DecisionOracle> = Arc::new(OpenAiOracle::new(
        SecretString::new(oracle_key),
        Some(cfg.oracle.model.clone()),
        Some(cfg.oracle.max_tokens),
        cfg.oracle.temperature,
    )?);
    info!(model = %cfg.oracle.model, "Decision oracle ready");

    // -- Query API --------------------------------------------------------

    if cfg.api.enabled {
        spawn_api(
            Arc::new(ApiState {
                store: store.clone(),
            }),
            cfg.api.port,
        )?;
    }

    // -- Reflection timers ------------------------------------------------

    let reflection_handles = spawn_reflection_timers(store.clone(), &cfg.reflection);
    info!(timers = reflection_handles.len(), "Reflection cadences armed");

    // -- Trading loop -----------------------------------------------------

    let runner = CycleRunner::new(exchange, feed, oracle, store, &cfg.trading);
    let scheduler = Scheduler::new(runner, cfg.trading.clone());

    info!("Entering main loop. Press Ctrl+C to stop.");
    let cycles = scheduler
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;

    // The scheduler only observes shutdown between cycles, so any
    // in-flight ledger write has already completed here.
    for handle in reflection_handles {
        handle.abort();
    }
    info!(cycles, "SAGE shut down cleanly.");

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sage=info"));

    let json_logging = std::env::var("SAGE_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
