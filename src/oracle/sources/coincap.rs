//! CoinCap source - spot prices via the v2 assets endpoint
//!
//! CoinCap returns numeric values as decimal strings; each field is parsed
//! independently so one bad field never discards the rest of the reading.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::oracle::sources::SourceClient;
use crate::oracle::SourceReading;
use crate::types::Asset;

const SOURCE_ID: &str = "CoinCap";

pub const COINCAP_BASE_URL: &str = "https://api.coincap.io";

pub struct CoinCapSource {
    client: reqwest::Client,
    base_url: String,
}

impl CoinCapSource {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AssetsResponse {
    data: Vec<CoinCapAsset>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoinCapAsset {
    id: String,
    price_usd: Option<String>,
    change_percent_24_hr: Option<String>,
}

fn parse_decimal(raw: Option<&str>) -> Option<f64> {
    raw?.trim().parse().ok()
}

fn parse_assets(body: &str, fetched_at: i64) -> Option<SourceReading> {
    let response: AssetsResponse = match serde_json::from_str(body) {
        Ok(response) => response,
        Err(e) => {
            warn!(source = SOURCE_ID, error = %e, "malformed payload");
            return None;
        }
    };

    let eth = response
        .data
        .iter()
        .find(|a| a.id == Asset::ETH.coincap_id());
    let btc = response
        .data
        .iter()
        .find(|a| a.id == Asset::BTC.coincap_id());

    let eth_price = eth
        .and_then(|a| parse_decimal(a.price_usd.as_deref()))
        .filter(|p| *p > 0.0);
    let btc_price = btc
        .and_then(|a| parse_decimal(a.price_usd.as_deref()))
        .filter(|p| *p > 0.0);
    if eth_price.is_none() && btc_price.is_none() {
        warn!(source = SOURCE_ID, "payload carried no usable prices");
        return None;
    }

    Some(SourceReading {
        source_id: SOURCE_ID.to_string(),
        eth_price,
        btc_price,
        eth_change_24h: eth.and_then(|a| parse_decimal(a.change_percent_24_hr.as_deref())),
        btc_change_24h: btc.and_then(|a| parse_decimal(a.change_percent_24_hr.as_deref())),
        fetched_at,
    })
}

#[async_trait]
impl SourceClient for CoinCapSource {
    fn name(&self) -> &'static str {
        SOURCE_ID
    }

    async fn fetch(&self) -> Option<SourceReading> {
        let url = format!("{}/v2/assets", self.base_url);
        let ids = format!("{},{}", Asset::ETH.coincap_id(), Asset::BTC.coincap_id());
        debug!(source = SOURCE_ID, "fetching spot prices");

        let response = match self
            .client
            .get(&url)
            .query(&[("ids", ids.as_str())])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(source = SOURCE_ID, error = %e, "fetch failed");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(source = SOURCE_ID, status = %response.status(), "request rejected");
            return None;
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(source = SOURCE_ID, error = %e, "failed to read body");
                return None;
            }
        };

        parse_assets(&body, Utc::now().timestamp_millis())
    }
}
