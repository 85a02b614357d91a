//! Sentinel state store - authorized, rate-limited, history-keeping
//!
//! The store is the system of record for accepted sentinel updates. Writes
//! are validated and rate-limited under one lock so concurrent cycles can
//! never both land inside the same minimum interval. Prices cross this
//! boundary as 8-decimal fixed-point integers; everything upstream works
//! in plain floats.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::SentinelError;

const PRICE_SCALE: f64 = 1e8;

/// Convert a float price to 8-decimal fixed point, rounding half away from zero.
pub fn to_fixed_8dp(price: f64) -> u64 {
    (price * PRICE_SCALE).round() as u64
}

pub fn from_fixed_8dp(price: u64) -> f64 {
    price as f64 / PRICE_SCALE
}

/// One write attempt against the store
#[derive(Debug, Clone)]
pub struct StateUpdate {
    pub caller: String,
    pub request_id: String,
    pub eth_price_8dp: u64,
    pub btc_price_8dp: u64,
    pub score: u8,
    pub triggered: bool,
    pub reason: String,
    /// Comma-joined source ids that backed this update
    pub sources: String,
}

/// An accepted update as the store keeps it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentinelState {
    /// Accept time in milliseconds
    pub timestamp: i64,
    pub eth_price_8dp: u64,
    pub btc_price_8dp: u64,
    pub score: u8,
    pub triggered: bool,
    pub reason: String,
    pub sources: String,
    pub request_id: String,
}

/// Store counters, all monotonic except the threshold
#[derive(Debug, Clone, Default, Serialize)]
pub struct Statistics {
    pub total_updates: u64,
    pub total_threshold_triggers: u64,
    pub total_requests: u64,
    pub current_threshold: u8,
    /// Accept time of the latest state in milliseconds, 0 before any write
    pub last_update_time: i64,
}

/// Boundary the orchestrator persists through
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Validate and accept one update, or reject it with the exact cause.
    async fn write(&self, update: StateUpdate) -> Result<(), SentinelError>;

    /// Count an accepted trigger; the cycle outcome is reported separately.
    async fn record_request(&self, request_id: &str);

    async fn latest(&self) -> Option<SentinelState>;

    async fn statistics(&self) -> Statistics;

    /// Up to `n` superseded states, newest first.
    async fn history(&self, n: usize) -> Vec<SentinelState>;

    async fn history_len(&self) -> usize;

    /// Time remaining until the next write can be accepted, zero when open.
    async fn time_until_next_update(&self) -> Duration;
}

pub struct StoreSettings {
    pub owner: String,
    pub threshold: u8,
    /// Minimum spacing between accepted writes; the first write is exempt
    pub min_update_interval: Duration,
    /// Superseded states kept before the oldest is dropped
    pub history_capacity: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            owner: "sentinel-operator".to_string(),
            threshold: 75,
            min_update_interval: Duration::from_secs(60),
            history_capacity: 50,
        }
    }
}

struct StoreInner {
    owner: String,
    authorized: HashSet<String>,
    threshold: u8,
    latest: Option<SentinelState>,
    history: VecDeque<SentinelState>,
    total_updates: u64,
    total_threshold_triggers: u64,
    total_requests: u64,
    last_update_time: i64,
}

pub struct MemoryStateStore {
    min_update_interval: Duration,
    history_capacity: usize,
    inner: Mutex<StoreInner>,
}

impl MemoryStateStore {
    pub fn new(settings: StoreSettings) -> Self {
        Self {
            min_update_interval: settings.min_update_interval.max(Duration::from_millis(1)),
            history_capacity: settings.history_capacity.max(1),
            inner: Mutex::new(StoreInner {
                owner: settings.owner,
                authorized: HashSet::new(),
                threshold: settings.threshold,
                latest: None,
                history: VecDeque::new(),
                total_updates: 0,
                total_threshold_triggers: 0,
                total_requests: 0,
                last_update_time: 0,
            }),
        }
    }

    pub fn owner(&self) -> String {
        self.inner
            .lock()
            .expect("state store lock poisoned")
            .owner
            .clone()
    }

    /// The current owner is always authorized; everyone else must be on the list.
    pub fn is_authorized(&self, caller: &str) -> bool {
        let inner = self.inner.lock().expect("state store lock poisoned");
        caller == inner.owner || inner.authorized.contains(caller)
    }

    /// Grant or revoke write access. Owner-only.
    pub fn set_authorized(
        &self,
        requester: &str,
        caller: &str,
        allowed: bool,
    ) -> Result<(), SentinelError> {
        let mut inner = self.inner.lock().expect("state store lock poisoned");
        if requester != inner.owner {
            return Err(SentinelError::Unauthorized {
                caller: requester.to_string(),
            });
        }
        if caller.is_empty() {
            return Err(SentinelError::InvalidInput(
                "caller identity must not be empty".to_string(),
            ));
        }

        if allowed {
            inner.authorized.insert(caller.to_string());
        } else {
            inner.authorized.remove(caller);
        }
        info!(caller, allowed, "authorization updated");
        Ok(())
    }

    /// Change the trigger threshold. Owner-only, bounded to 0-100.
    pub fn set_threshold(&self, requester: &str, threshold: u8) -> Result<(), SentinelError> {
        let mut inner = self.inner.lock().expect("state store lock poisoned");
        if requester != inner.owner {
            return Err(SentinelError::Unauthorized {
                caller: requester.to_string(),
            });
        }
        if threshold > 100 {
            return Err(SentinelError::InvalidThreshold(threshold));
        }

        let previous = inner.threshold;
        inner.threshold = threshold;
        info!(previous, threshold, "threshold updated");
        Ok(())
    }

    /// Hand the store to a new owner, who also joins the authorized list.
    /// Owner-only; the authorized entry survives any later handover.
    pub fn transfer_ownership(&self, requester: &str, new_owner: &str) -> Result<(), SentinelError> {
        let mut inner = self.inner.lock().expect("state store lock poisoned");
        if requester != inner.owner {
            return Err(SentinelError::Unauthorized {
                caller: requester.to_string(),
            });
        }
        if new_owner.is_empty() {
            return Err(SentinelError::InvalidInput(
                "new owner must not be empty".to_string(),
            ));
        }

        let previous = inner.owner.clone();
        inner.owner = new_owner.to_string();
        inner.authorized.insert(new_owner.to_string());
        info!(previous = %previous, new_owner, "ownership transferred");
        Ok(())
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn write(&self, update: StateUpdate) -> Result<(), SentinelError> {
        let mut inner = self.inner.lock().expect("state store lock poisoned");

        if update.caller != inner.owner && !inner.authorized.contains(&update.caller) {
            return Err(SentinelError::Unauthorized {
                caller: update.caller,
            });
        }
        if update.score > 100 {
            return Err(SentinelError::InvalidInput(format!(
                "score must be 0-100, got {}",
                update.score
            )));
        }
        if update.eth_price_8dp == 0 {
            return Err(SentinelError::InvalidInput("invalid ETH price".to_string()));
        }
        if update.btc_price_8dp == 0 {
            return Err(SentinelError::InvalidInput("invalid BTC price".to_string()));
        }

        let now = Utc::now().timestamp_millis();
        if inner.last_update_time > 0 {
            let elapsed = now - inner.last_update_time;
            let min_ms = self.min_update_interval.as_millis() as i64;
            if elapsed < min_ms {
                let retry_in_secs = ((min_ms - elapsed) as u64 + 999) / 1000;
                return Err(SentinelError::RateLimited { retry_in_secs });
            }
        }

        if let Some(previous) = inner.latest.take() {
            inner.history.push_back(previous);
            while inner.history.len() > self.history_capacity {
                inner.history.pop_front();
            }
        }

        inner.latest = Some(SentinelState {
            timestamp: now,
            eth_price_8dp: update.eth_price_8dp,
            btc_price_8dp: update.btc_price_8dp,
            score: update.score,
            triggered: update.triggered,
            reason: update.reason,
            sources: update.sources,
            request_id: update.request_id,
        });
        inner.total_updates += 1;
        if update.triggered {
            inner.total_threshold_triggers += 1;
        }
        inner.last_update_time = now;

        debug!(total_updates = inner.total_updates, "sentinel state written");
        Ok(())
    }

    async fn record_request(&self, request_id: &str) {
        let mut inner = self.inner.lock().expect("state store lock poisoned");
        inner.total_requests += 1;
        debug!(request_id, total_requests = inner.total_requests, "request recorded");
    }

    async fn latest(&self) -> Option<SentinelState> {
        self.inner
            .lock()
            .expect("state store lock poisoned")
            .latest
            .clone()
    }

    async fn statistics(&self) -> Statistics {
        let inner = self.inner.lock().expect("state store lock poisoned");
        Statistics {
            total_updates: inner.total_updates,
            total_threshold_triggers: inner.total_threshold_triggers,
            total_requests: inner.total_requests,
            current_threshold: inner.threshold,
            last_update_time: inner.last_update_time,
        }
    }

    async fn history(&self, n: usize) -> Vec<SentinelState> {
        self.inner
            .lock()
            .expect("state store lock poisoned")
            .history
            .iter()
            .rev()
            .take(n)
            .cloned()
            .collect()
    }

    async fn history_len(&self) -> usize {
        self.inner
            .lock()
            .expect("state store lock poisoned")
            .history
            .len()
    }

    async fn time_until_next_update(&self) -> Duration {
        let last = self
            .inner
            .lock()
            .expect("state store lock poisoned")
            .last_update_time;
        if last == 0 {
            return Duration::ZERO;
        }
        let open_at = last + self.min_update_interval.as_millis() as i64;
        let remaining = open_at - Utc::now().timestamp_millis();
        if remaining <= 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(remaining as u64)
        }
    }
}
