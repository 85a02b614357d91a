//! Configuration management for AutoSentinel
//!
//! Loads from config files + environment variables via .env

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::oracle::sources::{COINCAP_BASE_URL, COINGECKO_BASE_URL};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SentinelConfig {
    pub workflow: WorkflowConfig,
    pub oracle: OracleConfig,
    pub ledger: LedgerConfig,
    pub store: StoreConfig,
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
    /// Score at and above which a cycle persists state
    pub threshold: u8,
    /// Cycle cadence in continuous mode
    pub update_interval_secs: u64,
    /// Identity stamped on requests and store writes
    pub requester: String,
    /// Count the 24h-change factor when scoring
    pub volatility_factor: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    /// Enable the CoinGecko price feed
    pub coingecko_enabled: bool,
    /// Enable the CoinCap price feed
    pub coincap_enabled: bool,
    /// Replace live feeds with two simulated sources (offline mode)
    pub simulated: bool,
    /// Per-source fetch budget in milliseconds
    pub fetch_timeout_ms: u64,
    pub coingecko_url: String,
    pub coincap_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Requests kept before the oldest is evicted
    pub capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Minimum spacing between accepted state writes
    pub min_update_interval_secs: u64,
    /// Superseded states kept in history
    pub history_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// Data directory
    pub data_dir: String,
    /// Enable the CSV cycle audit log
    pub csv_enabled: bool,
}

impl SentinelConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            // Workflow defaults
            .set_default("workflow.threshold", 75)?
            .set_default("workflow.update_interval_secs", 300)?
            .set_default("workflow.requester", "sentinel-operator")?
            .set_default("workflow.volatility_factor", true)?
            // Oracle defaults
            .set_default("oracle.coingecko_enabled", true)?
            .set_default("oracle.coincap_enabled", true)?
            .set_default("oracle.simulated", false)?
            .set_default("oracle.fetch_timeout_ms", 10_000)?
            .set_default("oracle.coingecko_url", COINGECKO_BASE_URL)?
            .set_default("oracle.coincap_url", COINCAP_BASE_URL)?
            // Ledger defaults
            .set_default("ledger.capacity", 256)?
            // Store defaults
            .set_default("store.min_update_interval_secs", 60)?
            .set_default("store.history_capacity", 50)?
            // Persistence defaults
            .set_default("persistence.data_dir", "./data")?
            .set_default("persistence.csv_enabled", true)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (SENTINEL_*)
            .add_source(Environment::with_prefix("SENTINEL").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let sentinel_config: SentinelConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(sentinel_config)
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        format!(
            "threshold={} interval={}s coingecko={} coincap={} simulated={} data_dir={}",
            self.workflow.threshold,
            self.workflow.update_interval_secs,
            self.oracle.coingecko_enabled,
            self.oracle.coincap_enabled,
            self.oracle.simulated,
            self.persistence.data_dir
        )
    }

    /// Collect configuration problems worth surfacing at startup.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.workflow.threshold > 100 {
            warnings.push(format!(
                "workflow.threshold is {} but scores cap at 100; nothing will ever trigger",
                self.workflow.threshold
            ));
        }
        if !self.oracle.simulated && !self.oracle.coingecko_enabled && !self.oracle.coincap_enabled
        {
            warnings.push(
                "no price sources enabled; every cycle will fail (set oracle.simulated for offline runs)"
                    .to_string(),
            );
        }
        if self.workflow.update_interval_secs < self.store.min_update_interval_secs {
            warnings.push(format!(
                "update interval {}s is shorter than the store rate limit {}s; continuous cycles will skip persists",
                self.workflow.update_interval_secs, self.store.min_update_interval_secs
            ));
        }

        warnings
    }
}

impl std::fmt::Display for SentinelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
