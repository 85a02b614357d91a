//! Oracle module - Multi-source price ingestion
//!
//! Collects ETH/BTC spot prices from CoinGecko and CoinCap, tolerates
//! partial source failures, and folds whatever arrived into a single
//! per-cycle snapshot for the decision engine.

mod aggregator;
pub mod sources;

pub use aggregator::aggregate;

/// One source's view of the market at fetch time
///
/// Fields the source could not produce stay `None`. A reading with no usable
/// price for either asset is never constructed; the source reports total
/// failure by returning no reading at all.
#[derive(Debug, Clone)]
pub struct SourceReading {
    pub source_id: String,
    pub eth_price: Option<f64>,
    pub btc_price: Option<f64>,
    pub eth_change_24h: Option<f64>,
    pub btc_change_24h: Option<f64>,
    /// Local receive time in milliseconds
    pub fetched_at: i64,
}

/// Aggregated view across all reporting sources for one decision cycle
///
/// Only constructed when each asset has at least one usable price.
#[derive(Debug, Clone)]
pub struct PriceSnapshot {
    /// The raw per-source readings this snapshot was built from
    pub readings: Vec<SourceReading>,
    /// Mean ETH price across the sources that priced ETH
    pub eth_price: f64,
    /// Mean BTC price across the sources that priced BTC
    pub btc_price: f64,
    /// Worst pairwise ETH disagreement in percent, 0.0 below two reporters
    pub eth_deviation_pct: f64,
    /// Worst pairwise BTC disagreement in percent, 0.0 below two reporters
    pub btc_deviation_pct: f64,
    /// Largest absolute 24h change reported by any source for either asset
    pub max_change_24h_pct: f64,
    /// Source ids that contributed, in fetch order
    pub sources_used: Vec<String>,
    /// Snapshot build time in milliseconds
    pub timestamp: i64,
}
