//! Price source implementations (CoinGecko, CoinCap, simulated)

mod coincap;
mod coingecko;
mod simulated;

pub use coincap::{CoinCapSource, COINCAP_BASE_URL};
pub use coingecko::{CoinGeckoSource, COINGECKO_BASE_URL};
pub use simulated::SimulatedSource;

use crate::oracle::SourceReading;
use async_trait::async_trait;

/// Trait for price source clients
///
/// `fetch` never errors past this boundary: network failures, timeouts,
/// non-success statuses and malformed payloads are logged at the source
/// and folded into `None`. Retry is the next cycle, not the source.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Get the source name
    fn name(&self) -> &'static str;

    /// Fetch the current reading, or `None` when the source is unusable
    async fn fetch(&self) -> Option<SourceReading>;
}
