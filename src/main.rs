// =============================================================================
// Mycelial Engine — Main Entry Point
// =============================================================================
//
// Wires together the bus, shared state, storage, paper exchange, and runtime
// config into an `EngineContext`, populates the scheduler with the initial
// agent population, and drives the tick loop until an operator or an
// emergency shutdown stops it. The engine starts in Demo + Paused mode; a
// dashboard or API switching it to Live is out of scope here.

mod agent;
mod agents;
mod bus;
mod error;
mod exchange;
mod handles;
mod indicators;
mod messages;
mod runtime_config;
mod scheduler;
mod shared_state;
mod storage;
mod types;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::agents::archiver::run_archive_pass;
use crate::agents::builder::BuilderAgent;
use crate::agents::data_producer::{MarketDataProducerAgent, MoatDataProducerAgent};
use crate::agents::pattern_learner::PatternLearnerAgent;
use crate::agents::pnl_tracker::PnlTrackerAgent;
use crate::agents::prospector::ProspectorAgent;
use crate::agents::risk_manager::RiskManagerAgent;
use crate::agents::shutdown::ShutdownAgent;
use crate::agents::technical_analysis::TechnicalAnalysisAgent;
use crate::agents::trader::SynthesizerAgent;
use crate::bus::{MessageBus, Payload};
use crate::exchange::paper::PaperExchangeConnector;
use crate::exchange::PairInfo;
use crate::handles::EngineContext;
use crate::messages::SystemControl;
use crate::runtime_config::RuntimeConfig;
use crate::scheduler::Scheduler;
use crate::shared_state::SharedState;
use crate::storage::Storage;
use crate::types::{AccountMode, ProductFocus, Team, TradingMode};

const CONFIG_PATH: &str = "runtime_config.json";
const STORAGE_PATH: &str = "mycelial.db";

/// Auxiliary targets the moat-data producers track, one per product focus.
const MOAT_TARGETS: &[(ProductFocus, &str)] = &[
    (ProductFocus::Code, "rust-lang"),
    (ProductFocus::Logistics, "transpacific"),
    (ProductFocus::Government, "federal-reserve"),
    (ProductFocus::Corporations, "sec-edgar"),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("mycelial engine starting up");

    let mut config = RuntimeConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load runtime config, using defaults");
        RuntimeConfig::default()
    });

    // Force Demo + Paused on startup regardless of what was persisted.
    config.trading_mode = TradingMode::Paused;
    config.account_mode = AccountMode::Demo;

    if let Ok(syms) = std::env::var("MYCELIAL_SYMBOLS") {
        let parsed: Vec<String> = syms
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if !parsed.is_empty() {
            config.symbols = parsed;
        }
    }

    info!(symbols = ?config.symbols, trading_mode = %config.trading_mode, account_mode = %config.account_mode, "engine starting in SAFE mode (Demo + Paused)");

    let universe: Vec<PairInfo> = config
        .symbols
        .iter()
        .map(|s| PairInfo {
            pair: s.clone(),
            status: "online".to_string(),
            quote: "usd".to_string(),
        })
        .collect();

    let bus = Arc::new(MessageBus::new());
    let shared_state = Arc::new(SharedState::new());
    let exchange = Arc::new(PaperExchangeConnector::new(universe));
    let storage = Arc::new(Storage::open(STORAGE_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "failed to open storage database, falling back to in-memory");
        Storage::in_memory().expect("in-memory storage must open")
    }));
    let archive_interval = config.archive_interval;
    let tick_period = Duration::from_secs_f64(config.tick_period_secs);
    let config = Arc::new(RwLock::new(config));

    let ctx = Arc::new(EngineContext::new(
        bus.clone(),
        shared_state,
        exchange,
        config.clone(),
        storage,
    ));

    let scheduler = Arc::new(Scheduler::new(ctx.clone(), archive_interval, |ctx| {
        run_archive_pass(ctx)
    }));

    // --- Seed agents for each configured symbol -----------------------------
    let symbols = config.read().symbols.clone();
    for pair in &symbols {
        scheduler.register(Arc::new(MarketDataProducerAgent::new(ctx.as_ref(), pair, 60.0)));
        for _ in 0..3 {
            scheduler.register(TechnicalAnalysisAgent::spawn(ctx.clone(), pair));
        }
        for i in 0..15 {
            let focus = match i % 5 {
                0 => ProductFocus::Finance,
                1 => ProductFocus::Code,
                2 => ProductFocus::Logistics,
                3 => ProductFocus::Government,
                _ => ProductFocus::Corporations,
            };
            scheduler.register(PatternLearnerAgent::spawn(ctx.clone(), pair, focus, None, 0));
        }
        ctx.active_assets.write().insert(pair.clone());
    }

    // --- Moat data producers: one per auxiliary channel ---------------------
    for (focus, target) in MOAT_TARGETS {
        scheduler.register(Arc::new(MoatDataProducerAgent::new(ctx.as_ref(), *focus, *target, 120.0)));
    }

    // --- Cross-stream synthesis, risk, and P&L tracking ----------------------
    scheduler.register(SynthesizerAgent::spawn(ctx.clone()));
    scheduler.register(RiskManagerAgent::spawn(ctx.clone()));
    scheduler.register(PnlTrackerAgent::spawn(ctx.clone()));

    // --- Prospector teams: three agents per team -----------------------------
    for team in [Team::Hft, Team::DayTrade, Team::Swing] {
        for _ in 0..3 {
            scheduler.register(Arc::new(ProspectorAgent::new(ctx.as_ref(), team)));
        }
    }

    // --- Builder, bound to the scheduler after both exist ---------------------
    let builder = BuilderAgent::spawn(ctx.clone());
    builder.set_scheduler(scheduler.clone());
    scheduler.register(builder);

    // --- Shutdown coordinator --------------------------------------------------
    scheduler.register(ShutdownAgent::spawn(ctx.clone()));

    info!(agents = scheduler.agent_count(), "initial agent population deployed");

    let sched_run = scheduler.clone();
    let run_handle = tokio::spawn(async move {
        sched_run.run(tick_period).await;
    });

    info!("all agents running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received — broadcasting emergency shutdown");

    ctx.bus.publish(
        "system-control",
        Payload::Control(SystemControl {
            command: "EMERGENCY_SHUTDOWN".to_string(),
            reason: Some("operator requested shutdown".to_string()),
            source: Some("main".to_string()),
        }),
    );
    // Give the shutdown coordinator's async callback a moment to run before
    // we stop the tick loop out from under it.
    tokio::time::sleep(Duration::from_millis(200)).await;
    ctx.stop();
    let _ = run_handle.await;

    if let Err(e) = config.read().save(CONFIG_PATH) {
        warn!(error = %e, "failed to save runtime config on shutdown");
    }

    info!("mycelial engine shut down complete");
    Ok(())
}
