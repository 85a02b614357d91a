//! End-to-end tests for the monitoring flow

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use autosentinel::error::SentinelError;
    use autosentinel::oracle::sources::SourceClient;
    use autosentinel::oracle::SourceReading;
    use autosentinel::orchestrator::{
        FulfillmentPayload, Orchestrator, OrchestratorSettings, PollStatus,
    };
    use autosentinel::store::{to_fixed_8dp, MemoryStateStore, StateStore, StoreSettings};
    use autosentinel::types::Asset;
    use chrono::Utc;
    use std::sync::Arc;
    use std::time::Duration;

    // ============================================================================
    // Fixtures
    // ============================================================================

    struct StaticSource {
        id: &'static str,
        eth: f64,
        btc: f64,
    }

    #[async_trait]
    impl SourceClient for StaticSource {
        fn name(&self) -> &'static str {
            self.id
        }

        async fn fetch(&self) -> Option<SourceReading> {
            Some(SourceReading {
                source_id: self.id.to_string(),
                eth_price: Some(self.eth),
                btc_price: Some(self.btc),
                eth_change_24h: Some(0.3),
                btc_change_24h: Some(-0.2),
                fetched_at: Utc::now().timestamp_millis(),
            })
        }
    }

    struct NoneSource;

    #[async_trait]
    impl SourceClient for NoneSource {
        fn name(&self) -> &'static str {
            "Down"
        }

        async fn fetch(&self) -> Option<SourceReading> {
            None
        }
    }

    struct BtcOnlySource {
        id: &'static str,
    }

    #[async_trait]
    impl SourceClient for BtcOnlySource {
        fn name(&self) -> &'static str {
            self.id
        }

        async fn fetch(&self) -> Option<SourceReading> {
            Some(SourceReading {
                source_id: self.id.to_string(),
                eth_price: None,
                btc_price: Some(45000.0),
                eth_change_24h: None,
                btc_change_24h: Some(0.4),
                fetched_at: Utc::now().timestamp_millis(),
            })
        }
    }

    fn paired_sources(eth_a: f64, eth_b: f64) -> Vec<Arc<dyn SourceClient>> {
        vec![
            Arc::new(StaticSource {
                id: "SourceA",
                eth: eth_a,
                btc: 45000.0,
            }),
            Arc::new(StaticSource {
                id: "SourceB",
                eth: eth_b,
                btc: 45000.0,
            }),
        ]
    }

    fn make_store(threshold: u8, min_interval: Duration) -> Arc<MemoryStateStore> {
        Arc::new(MemoryStateStore::new(StoreSettings {
            owner: "flow-operator".to_string(),
            threshold,
            min_update_interval: min_interval,
            history_capacity: 10,
        }))
    }

    fn make_settings(threshold: u8) -> OrchestratorSettings {
        OrchestratorSettings {
            threshold,
            fetch_timeout: Duration::from_millis(200),
            requester: "flow-operator".to_string(),
            ledger_capacity: 16,
            volatility_factor: true,
        }
    }

    async fn wait_terminal(orchestrator: &Orchestrator, request_id: &str) -> PollStatus {
        for _ in 0..200 {
            let status = orchestrator.poll(request_id);
            if status.fulfilled {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("request {} never reached a terminal state", request_id);
    }

    // ============================================================================
    // Full cycle
    // ============================================================================

    #[tokio::test]
    async fn test_bootstrap_cycle_lands_in_the_store() {
        let store = make_store(75, Duration::from_secs(3600));
        // Sources one percent apart: exactly at the deviation boundary,
        // so only the first-run lift carries the score to the threshold
        let orchestrator = Orchestrator::new(
            paired_sources(3000.0, 3030.0),
            store.clone(),
            make_settings(75),
        );

        let payload = orchestrator.trigger_and_wait().await.unwrap();

        assert_eq!(payload.score, 75);
        assert!(payload.triggered);
        assert!(payload.persisted);
        assert_eq!(payload.reason, "Initial state update");
        assert_eq!(payload.sources, "SourceA,SourceB");
        assert_eq!(payload.price_eth_8dp, to_fixed_8dp(3015.0));
        assert_eq!(payload.price_btc_8dp, to_fixed_8dp(45000.0));

        let request_id = &orchestrator.recent_requests(1)[0];
        let state = store.latest().await.unwrap();
        assert_eq!(&state.request_id, request_id);
        assert_eq!(state.eth_price_8dp, payload.price_eth_8dp);
        assert_eq!(state.score, 75);
        assert_eq!(store.history_len().await, 0);

        let stats = store.statistics().await;
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.total_updates, 1);
        assert_eq!(stats.total_threshold_triggers, 1);
        assert_eq!(stats.current_threshold, 75);
        assert!(stats.last_update_time > 0);

        // The ledger answer round-trips the payload
        let status = orchestrator.poll(request_id);
        assert!(status.exists && status.fulfilled);
        let parsed: FulfillmentPayload = serde_json::from_str(&status.response.unwrap()).unwrap();
        assert_eq!(parsed, payload);
    }

    #[tokio::test]
    async fn test_rate_limited_cycle_still_fulfills() {
        // Threshold 10 so every cycle wants to persist
        let store = make_store(10, Duration::from_secs(3600));
        let orchestrator = Orchestrator::new(
            paired_sources(3000.0, 3000.0),
            store.clone(),
            make_settings(10),
        );

        let first = orchestrator.trigger_and_wait().await.unwrap();
        assert!(first.persisted);

        let second = orchestrator.trigger_and_wait().await.unwrap();
        assert!(second.triggered);
        assert!(!second.persisted);
        assert!(second.persist_skipped.unwrap().contains("retry"));

        // Both requests fulfilled, only the first write landed
        let ids = orchestrator.recent_requests(2);
        assert_eq!(ids.len(), 2);
        assert!(orchestrator.poll(&ids[0]).fulfilled);
        assert!(orchestrator.poll(&ids[1]).fulfilled);
        assert_eq!(store.statistics().await.total_updates, 1);
    }

    #[tokio::test]
    async fn test_concurrent_triggers_persist_exactly_once() {
        let store = make_store(10, Duration::from_secs(3600));
        let orchestrator = Arc::new(Orchestrator::new(
            paired_sources(3000.0, 3030.0),
            store.clone(),
            make_settings(10),
        ));

        let id_a = orchestrator.trigger().await.unwrap();
        let id_b = orchestrator.trigger().await.unwrap();

        let status_a = wait_terminal(&orchestrator, &id_a).await;
        let status_b = wait_terminal(&orchestrator, &id_b).await;

        let payload_a: FulfillmentPayload =
            serde_json::from_str(&status_a.response.unwrap()).unwrap();
        let payload_b: FulfillmentPayload =
            serde_json::from_str(&status_b.response.unwrap()).unwrap();

        let persisted = [&payload_a, &payload_b]
            .iter()
            .filter(|p| p.persisted)
            .count();
        assert_eq!(persisted, 1);

        let stats = store.statistics().await;
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.total_updates, 1);
    }

    // ============================================================================
    // Failure paths
    // ============================================================================

    #[tokio::test]
    async fn test_total_source_outage_errors_the_request() {
        let store = make_store(75, Duration::from_secs(3600));
        let sources: Vec<Arc<dyn SourceClient>> = vec![Arc::new(NoneSource), Arc::new(NoneSource)];
        let orchestrator = Orchestrator::new(sources, store.clone(), make_settings(75));

        let result = orchestrator.trigger_and_wait().await;
        assert!(matches!(result, Err(SentinelError::NoSourcesAvailable)));

        let status = orchestrator.poll(&orchestrator.recent_requests(1)[0]);
        assert!(status.exists && status.fulfilled);
        assert!(status.response.is_none());
        assert_eq!(status.error.as_deref(), Some("no price sources available"));

        // The failed cycle was still counted as a request
        let stats = store.statistics().await;
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.total_updates, 0);
        assert!(store.latest().await.is_none());
    }

    #[tokio::test]
    async fn test_unpriced_asset_errors_instead_of_fulfilling() {
        let store = make_store(75, Duration::from_secs(3600));
        let sources: Vec<Arc<dyn SourceClient>> = vec![
            Arc::new(BtcOnlySource { id: "HalfA" }),
            Arc::new(BtcOnlySource { id: "HalfB" }),
        ];
        let orchestrator = Orchestrator::new(sources, store.clone(), make_settings(75));

        let result = orchestrator.trigger_and_wait().await;
        assert!(matches!(
            result,
            Err(SentinelError::MissingAssetData { asset: Asset::ETH })
        ));

        let status = orchestrator.poll(&orchestrator.recent_requests(1)[0]);
        assert!(status.exists && status.fulfilled);
        assert!(status.response.is_none());
        assert_eq!(status.error.as_deref(), Some("no ETH price from any source"));

        // No zero price ever reached the store, first run or not
        let stats = store.statistics().await;
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.total_updates, 0);
        assert!(store.latest().await.is_none());
    }

    #[tokio::test]
    async fn test_one_source_down_cycle_survives() {
        let store = make_store(75, Duration::from_secs(3600));
        let sources: Vec<Arc<dyn SourceClient>> = vec![
            Arc::new(NoneSource),
            Arc::new(StaticSource {
                id: "Lone",
                eth: 2800.0,
                btc: 44000.0,
            }),
        ];
        let orchestrator = Orchestrator::new(sources, store.clone(), make_settings(75));

        let payload = orchestrator.trigger_and_wait().await.unwrap();
        assert_eq!(payload.sources, "Lone");
        assert_eq!(payload.price_eth_8dp, to_fixed_8dp(2800.0));
        assert!(payload.persisted);
    }

    // ============================================================================
    // Ledger behavior
    // ============================================================================

    #[tokio::test]
    async fn test_full_ledger_evicts_the_oldest_request() {
        let store = make_store(75, Duration::from_secs(3600));
        let mut settings = make_settings(75);
        settings.ledger_capacity = 1;
        let orchestrator = Orchestrator::new(paired_sources(3000.0, 3000.0), store, settings);

        orchestrator.trigger_and_wait().await.unwrap();
        let first_id = orchestrator.recent_requests(1)[0].clone();

        orchestrator.trigger_and_wait().await.unwrap();
        let second_id = orchestrator.recent_requests(1)[0].clone();
        assert_ne!(first_id, second_id);

        // The older entry is gone, only the newer survives
        assert!(!orchestrator.poll(&first_id).exists);
        assert!(orchestrator.poll(&second_id).fulfilled);
        assert_eq!(orchestrator.recent_requests(10), vec![second_id]);
    }
}
