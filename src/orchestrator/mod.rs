//! Orchestrator - drives the request -> compute -> fulfill -> persist cycle
//!
//! A trigger allocates a request id, registers it with the ledger and the
//! store, and runs one decision cycle: fetch every source concurrently
//! under its own timeout, aggregate, score, then persist when the decision
//! calls for it. The request always reaches a terminal state; a write the
//! store refuses inside its rate window is reported in the fulfillment
//! payload, not as a cycle failure.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::DecisionEngine;
use crate::error::SentinelError;
use crate::ledger::{RequestLedger, RequestState};
use crate::oracle::sources::SourceClient;
use crate::oracle::{aggregate, SourceReading};
use crate::persistence::{CycleRecord, CycleRecorder};
use crate::store::{to_fixed_8dp, StateStore, StateUpdate};

/// What a fulfilled request carries back to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FulfillmentPayload {
    pub price_eth_8dp: u64,
    pub price_btc_8dp: u64,
    pub score: u8,
    pub triggered: bool,
    pub reason: String,
    /// Comma-joined source ids that backed this cycle
    pub sources: String,
    /// True when the store accepted this cycle's update
    pub persisted: bool,
    /// Why the store declined, when a wanted persist did not happen
    pub persist_skipped: Option<String>,
}

/// Point-in-time answer to "what happened to my request"
#[derive(Debug, Clone)]
pub struct PollStatus {
    pub exists: bool,
    /// Terminal either way; inspect `response` vs `error` for the outcome
    pub fulfilled: bool,
    pub response: Option<String>,
    pub error: Option<String>,
    pub timestamp: i64,
}

pub struct OrchestratorSettings {
    pub threshold: u8,
    /// Per-source fetch budget within one cycle
    pub fetch_timeout: Duration,
    /// Identity stamped on requests and store writes
    pub requester: String,
    pub ledger_capacity: usize,
    pub volatility_factor: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            threshold: 75,
            fetch_timeout: Duration::from_secs(10),
            requester: "sentinel-operator".to_string(),
            ledger_capacity: 256,
            volatility_factor: true,
        }
    }
}

pub struct Orchestrator {
    sources: Vec<Arc<dyn SourceClient>>,
    engine: Mutex<DecisionEngine>,
    ledger: RequestLedger,
    store: Arc<dyn StateStore>,
    recorder: Option<CycleRecorder>,
    threshold: u8,
    fetch_timeout: Duration,
    requester: String,
}

impl Orchestrator {
    pub fn new(
        sources: Vec<Arc<dyn SourceClient>>,
        store: Arc<dyn StateStore>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            sources,
            engine: Mutex::new(DecisionEngine::new(settings.volatility_factor)),
            ledger: RequestLedger::new(settings.ledger_capacity),
            store,
            recorder: None,
            threshold: settings.threshold,
            fetch_timeout: settings.fetch_timeout,
            requester: settings.requester,
        }
    }

    pub fn with_recorder(mut self, recorder: CycleRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Start a cycle in the background and hand back its request id.
    pub async fn trigger(self: &Arc<Self>) -> Result<String, SentinelError> {
        let request_id = self.register_request().await?;

        let orchestrator = Arc::clone(self);
        let id = request_id.clone();
        tokio::spawn(async move {
            let outcome = orchestrator.execute_cycle(&id).await;
            orchestrator.finalize(&id, &outcome);
        });

        Ok(request_id)
    }

    /// Run one cycle to completion on the caller's task.
    pub async fn trigger_and_wait(&self) -> Result<FulfillmentPayload, SentinelError> {
        let request_id = self.register_request().await?;
        let outcome = self.execute_cycle(&request_id).await;
        self.finalize(&request_id, &outcome);
        outcome
    }

    pub fn poll(&self, request_id: &str) -> PollStatus {
        match self.ledger.status(request_id) {
            Ok(request) => PollStatus {
                exists: true,
                fulfilled: request.state != RequestState::Pending,
                response: request.response,
                error: request.error,
                timestamp: request.created_at,
            },
            Err(_) => PollStatus {
                exists: false,
                fulfilled: false,
                response: None,
                error: None,
                timestamp: 0,
            },
        }
    }

    /// Most recent request ids, newest first.
    pub fn recent_requests(&self, n: usize) -> Vec<String> {
        self.ledger.recent(n)
    }

    async fn register_request(&self) -> Result<String, SentinelError> {
        let request_id = Uuid::new_v4().to_string();
        self.ledger.create(&request_id, &self.requester)?;
        self.store.record_request(&request_id).await;
        info!(request_id = %request_id, "request accepted");
        Ok(request_id)
    }

    async fn execute_cycle(&self, request_id: &str) -> Result<FulfillmentPayload, SentinelError> {
        let snapshot = aggregate(self.fetch_all().await)?;
        info!(
            request_id = %request_id,
            eth = snapshot.eth_price,
            btc = snapshot.btc_price,
            sources = ?snapshot.sources_used,
            "snapshot ready"
        );

        let decision = {
            let mut engine = self.engine.lock().await;
            engine.decide(&snapshot, self.threshold)
        };
        info!(
            request_id = %request_id,
            score = decision.score,
            triggered = decision.threshold_triggered,
            reason = %decision.reason(),
            "decision computed"
        );

        let mut payload = FulfillmentPayload {
            price_eth_8dp: to_fixed_8dp(decision.eth_price),
            price_btc_8dp: to_fixed_8dp(decision.btc_price),
            score: decision.score,
            triggered: decision.threshold_triggered,
            reason: decision.reason(),
            sources: snapshot.sources_used.join(","),
            persisted: false,
            persist_skipped: None,
        };

        if decision.should_persist {
            let update = StateUpdate {
                caller: self.requester.clone(),
                request_id: request_id.to_string(),
                eth_price_8dp: payload.price_eth_8dp,
                btc_price_8dp: payload.price_btc_8dp,
                score: decision.score,
                triggered: decision.threshold_triggered,
                reason: payload.reason.clone(),
                sources: payload.sources.clone(),
            };
            match self.store.write(update).await {
                Ok(()) => {
                    payload.persisted = true;
                    info!(request_id = %request_id, "state persisted ✅");
                }
                Err(e @ SentinelError::RateLimited { .. }) => {
                    payload.persist_skipped = Some(e.to_string());
                    info!(request_id = %request_id, reason = %e, "persist skipped");
                }
                Err(e) => {
                    payload.persist_skipped = Some(e.to_string());
                    warn!(request_id = %request_id, error = %e, "state write rejected");
                }
            }
        }

        if let Some(recorder) = &self.recorder {
            let record = CycleRecord {
                timestamp: snapshot.timestamp,
                request_id: request_id.to_string(),
                score: decision.score,
                triggered: decision.threshold_triggered,
                eth_price: decision.eth_price,
                btc_price: decision.btc_price,
                eth_deviation_pct: snapshot.eth_deviation_pct,
                btc_deviation_pct: snapshot.btc_deviation_pct,
                reason: payload.reason.clone(),
                persisted: payload.persisted,
            };
            if let Err(e) = recorder.save_cycle(record).await {
                warn!(request_id = %request_id, error = %e, "failed to record cycle");
            }
        }

        Ok(payload)
    }

    /// Fetch every source concurrently, each under its own timeout.
    async fn fetch_all(&self) -> Vec<Option<SourceReading>> {
        let fetches = self.sources.iter().map(|source| {
            let source = Arc::clone(source);
            let budget = self.fetch_timeout;
            async move {
                match tokio::time::timeout(budget, source.fetch()).await {
                    Ok(reading) => reading,
                    Err(_) => {
                        warn!(
                            source = source.name(),
                            budget_ms = budget.as_millis() as u64,
                            "source fetch timed out"
                        );
                        None
                    }
                }
            }
        });
        join_all(fetches).await
    }

    fn finalize(&self, request_id: &str, outcome: &Result<FulfillmentPayload, SentinelError>) {
        let result = match outcome {
            Ok(payload) => {
                let body = match serde_json::to_string(payload) {
                    Ok(body) => body,
                    Err(e) => {
                        warn!(request_id = %request_id, error = %e, "payload encoding failed");
                        format!("score={} triggered={}", payload.score, payload.triggered)
                    }
                };
                self.ledger.fulfill(request_id, body)
            }
            Err(e) => self.ledger.fail(request_id, e.to_string()),
        };

        // Only possible when the entry was evicted while the cycle ran
        if let Err(e) = result {
            warn!(request_id = %request_id, error = %e, "could not finalize request");
        }
    }
}
