//! Core types used throughout AutoSentinel
//!
//! The sentinel watches exactly two assets; everything downstream keys off
//! this enum rather than loose strings.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Assets tracked by the sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Asset {
    ETH,
    BTC,
}

impl Default for Asset {
    fn default() -> Self {
        Asset::ETH
    }
}

impl Asset {
    /// Get the identifier used by the CoinGecko API
    pub fn coingecko_id(&self) -> &'static str {
        match self {
            Asset::ETH => "ethereum",
            Asset::BTC => "bitcoin",
        }
    }

    /// Get the identifier used by the CoinCap API
    pub fn coincap_id(&self) -> &'static str {
        match self {
            Asset::ETH => "ethereum",
            Asset::BTC => "bitcoin",
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Asset::ETH => write!(f, "ETH"),
            Asset::BTC => write!(f, "BTC"),
        }
    }
}
