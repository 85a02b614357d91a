//! AutoSentinel entry point
//!
//! Usage: cargo run                (single monitoring cycle, prints the payload)
//!        cargo run -- --continuous (timed cycles until Ctrl-C)

use anyhow::{bail, Context, Result};
use autosentinel::config::SentinelConfig;
use autosentinel::oracle::sources::{CoinCapSource, CoinGeckoSource, SimulatedSource, SourceClient};
use autosentinel::orchestrator::{Orchestrator, OrchestratorSettings};
use autosentinel::persistence::CycleRecorder;
use autosentinel::store::{MemoryStateStore, StateStore, StoreSettings};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = SentinelConfig::load().context("could not load configuration")?;
    info!("🚀 AutoSentinel starting: {}", config.digest());
    for warning in config.validate() {
        warn!("config: {}", warning);
    }

    let sources = build_sources(&config);
    if sources.is_empty() {
        bail!("no price sources enabled; set oracle.simulated=true for offline runs");
    }

    let store = Arc::new(MemoryStateStore::new(StoreSettings {
        owner: config.workflow.requester.clone(),
        threshold: config.workflow.threshold,
        min_update_interval: Duration::from_secs(config.store.min_update_interval_secs),
        history_capacity: config.store.history_capacity,
    }));

    let mut orchestrator = Orchestrator::new(
        sources,
        store.clone(),
        OrchestratorSettings {
            threshold: config.workflow.threshold,
            fetch_timeout: Duration::from_millis(config.oracle.fetch_timeout_ms),
            requester: config.workflow.requester.clone(),
            ledger_capacity: config.ledger.capacity,
            volatility_factor: config.workflow.volatility_factor,
        },
    );

    if config.persistence.csv_enabled {
        let recorder = CycleRecorder::new(&config.persistence.data_dir)
            .context("could not initialize the cycle recorder")?;
        orchestrator = orchestrator.with_recorder(recorder);
    }

    let orchestrator = Arc::new(orchestrator);

    if std::env::args().any(|arg| arg == "--continuous") {
        run_continuous(orchestrator, store, config.workflow.update_interval_secs).await
    } else {
        run_once(orchestrator).await
    }
}

/// One cycle, payload to stdout.
async fn run_once(orchestrator: Arc<Orchestrator>) -> Result<()> {
    let payload = orchestrator
        .trigger_and_wait()
        .await
        .context("monitoring cycle failed")?;
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

/// Timed cycles until Ctrl-C, then a statistics summary.
async fn run_continuous(
    orchestrator: Arc<Orchestrator>,
    store: Arc<MemoryStateStore>,
    interval_secs: u64,
) -> Result<()> {
    info!(
        "⏱️ continuous mode: one cycle every {}s (Ctrl-C to stop)",
        interval_secs
    );
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = orchestrator.trigger().await {
                    warn!("could not start cycle: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        }
    }

    let stats = store.statistics().await;
    info!(
        total_requests = stats.total_requests,
        total_updates = stats.total_updates,
        total_threshold_triggers = stats.total_threshold_triggers,
        "final statistics"
    );
    Ok(())
}

fn build_sources(config: &SentinelConfig) -> Vec<Arc<dyn SourceClient>> {
    let mut sources: Vec<Arc<dyn SourceClient>> = Vec::new();
    let timeout = Duration::from_millis(config.oracle.fetch_timeout_ms);

    if config.oracle.simulated {
        sources.push(Arc::new(SimulatedSource::new("SimulatedA")));
        sources.push(Arc::new(SimulatedSource::new("SimulatedB")));
        return sources;
    }

    if config.oracle.coingecko_enabled {
        sources.push(Arc::new(CoinGeckoSource::new(
            &config.oracle.coingecko_url,
            timeout,
        )));
    }
    if config.oracle.coincap_enabled {
        sources.push(Arc::new(CoinCapSource::new(
            &config.oracle.coincap_url,
            timeout,
        )));
    }

    sources
}
