//! Simulated price source for offline runs and tests
//!
//! Produces plausible ETH/BTC readings jittered around fixed anchors so the
//! whole pipeline can run without network access. Two instances with
//! different names stand in for two independent feeds.

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;

use crate::oracle::sources::SourceClient;
use crate::oracle::SourceReading;

const ETH_ANCHOR: f64 = 2450.0;
const BTC_ANCHOR: f64 = 43_200.0;

pub struct SimulatedSource {
    name: &'static str,
}

impl SimulatedSource {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

#[async_trait]
impl SourceClient for SimulatedSource {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch(&self) -> Option<SourceReading> {
        let mut rng = rand::thread_rng();
        // Broad drift shared shape plus a small per-source disagreement
        let eth = ETH_ANCHOR + rng.gen_range(-50.0..50.0) + rng.gen_range(-5.0..5.0);
        let btc = BTC_ANCHOR + rng.gen_range(-500.0..500.0) + rng.gen_range(-50.0..50.0);

        Some(SourceReading {
            source_id: self.name.to_string(),
            eth_price: Some(eth),
            btc_price: Some(btc),
            eth_change_24h: Some(rng.gen_range(-5.0..5.0)),
            btc_change_24h: Some(rng.gen_range(-4.0..4.0)),
            fetched_at: Utc::now().timestamp_millis(),
        })
    }
}
