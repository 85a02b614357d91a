//! Oracle Aggregator - Combines readings from multiple sources
//!
//! Pure consolidation step: takes whatever the per-source fetches produced
//! this cycle and builds one `PriceSnapshot`. Fails when not a single source
//! delivered a reading, or when an asset ends the cycle with no usable price.

use chrono::Utc;
use tracing::debug;

use crate::error::SentinelError;
use crate::oracle::{PriceSnapshot, SourceReading};
use crate::types::Asset;

/// Fold per-source fetch results into a single snapshot.
///
/// `None` entries are sources that failed or timed out this cycle. A price
/// reported as zero does not contribute to that asset's mean or deviation.
/// An asset left with no positive price fails the whole cycle; a snapshot
/// never carries a stand-in price.
pub fn aggregate(results: Vec<Option<SourceReading>>) -> Result<PriceSnapshot, SentinelError> {
    let readings: Vec<SourceReading> = results.into_iter().flatten().collect();
    if readings.is_empty() {
        return Err(SentinelError::NoSourcesAvailable);
    }

    let eth_prices: Vec<f64> = readings
        .iter()
        .filter_map(|r| r.eth_price)
        .filter(|p| *p > 0.0)
        .collect();
    let btc_prices: Vec<f64> = readings
        .iter()
        .filter_map(|r| r.btc_price)
        .filter(|p| *p > 0.0)
        .collect();

    if eth_prices.is_empty() {
        return Err(SentinelError::MissingAssetData { asset: Asset::ETH });
    }
    if btc_prices.is_empty() {
        return Err(SentinelError::MissingAssetData { asset: Asset::BTC });
    }

    let max_change_24h_pct = readings
        .iter()
        .flat_map(|r| [r.eth_change_24h, r.btc_change_24h])
        .flatten()
        .map(f64::abs)
        .fold(0.0, f64::max);

    let sources_used: Vec<String> = readings.iter().map(|r| r.source_id.clone()).collect();

    let snapshot = PriceSnapshot {
        eth_price: mean(&eth_prices),
        btc_price: mean(&btc_prices),
        eth_deviation_pct: max_pairwise_deviation(&eth_prices),
        btc_deviation_pct: max_pairwise_deviation(&btc_prices),
        max_change_24h_pct,
        sources_used,
        timestamp: Utc::now().timestamp_millis(),
        readings,
    };

    debug!(
        sources = ?snapshot.sources_used,
        eth = snapshot.eth_price,
        btc = snapshot.btc_price,
        eth_dev = snapshot.eth_deviation_pct,
        btc_dev = snapshot.btc_deviation_pct,
        "snapshot aggregated"
    );

    Ok(snapshot)
}

/// Average of a non-empty slice.
fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Worst disagreement between any two reporters, as a percent of the
/// smaller price. Zero below two reporters.
fn max_pairwise_deviation(prices: &[f64]) -> f64 {
    let mut max_dev: f64 = 0.0;
    for (i, a) in prices.iter().enumerate() {
        for b in &prices[i + 1..] {
            let dev = (a - b).abs() / a.min(*b) * 100.0;
            max_dev = max_dev.max(dev);
        }
    }
    max_dev
}
