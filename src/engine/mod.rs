//! Decision engine - bounded market-condition scoring
//!
//! Turns one aggregated snapshot into a 0-100 score plus human-readable
//! factor strings. Scoring is additive from a base of 50: +20 for source
//! disagreement above 1%, +20 for movement above 2% since the prior
//! snapshot, +10 for a 24h change above 5%. The very first evaluation has
//! no prior to compare against, so its score is lifted to at least the
//! threshold and the bootstrap write always happens.
//!
//! The engine is the only component that carries state between cycles: the
//! prior snapshot is replaced after every evaluation, persisted or not, so
//! movement is always measured against the last thing the engine saw.

use tracing::debug;

use crate::oracle::PriceSnapshot;

const BASE_SCORE: u32 = 50;
const DEVIATION_BONUS: u32 = 20;
const MOVEMENT_BONUS: u32 = 20;
const VOLATILITY_BONUS: u32 = 10;

const DEVIATION_TRIGGER_PCT: f64 = 1.0;
const MOVEMENT_TRIGGER_PCT: f64 = 2.0;
const VOLATILITY_TRIGGER_PCT: f64 = 5.0;

/// Prices the engine carries forward for movement comparison
#[derive(Debug, Clone, Copy)]
struct PriorSnapshot {
    eth_price: f64,
    btc_price: f64,
}

/// Outcome of one evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionResult {
    /// Final score, always within 0-100
    pub score: u8,
    /// Whether `score >= threshold`
    pub threshold_triggered: bool,
    /// One string per contributing factor, in evaluation order
    pub reasons: Vec<String>,
    pub eth_price: f64,
    pub btc_price: f64,
    /// True when the engine had no prior snapshot
    pub is_first_run: bool,
    /// Persist on trigger or on the bootstrap run
    pub should_persist: bool,
}

impl DecisionResult {
    /// Factor strings joined for display, or the quiet-market fallback
    pub fn reason(&self) -> String {
        if self.reasons.is_empty() {
            "Normal market conditions".to_string()
        } else {
            self.reasons.join("; ")
        }
    }
}

pub struct DecisionEngine {
    prior: Option<PriorSnapshot>,
    volatility_factor_enabled: bool,
}

impl DecisionEngine {
    pub fn new(volatility_factor_enabled: bool) -> Self {
        Self {
            prior: None,
            volatility_factor_enabled,
        }
    }

    /// Score one snapshot against the threshold and advance the prior.
    pub fn decide(&mut self, snapshot: &PriceSnapshot, threshold: u8) -> DecisionResult {
        let mut score = BASE_SCORE;
        let mut reasons = Vec::new();

        let max_deviation = snapshot.eth_deviation_pct.max(snapshot.btc_deviation_pct);
        if max_deviation > DEVIATION_TRIGGER_PCT {
            score += DEVIATION_BONUS;
            reasons.push(format!(
                "High source deviation (ETH: {:.2}%, BTC: {:.2}%)",
                snapshot.eth_deviation_pct, snapshot.btc_deviation_pct
            ));
        }

        if let Some(prior) = self.prior {
            let movement = pct_change(snapshot.eth_price, prior.eth_price)
                .max(pct_change(snapshot.btc_price, prior.btc_price));
            if movement > MOVEMENT_TRIGGER_PCT {
                score += MOVEMENT_BONUS;
                reasons.push(format!(
                    "Significant price movement ({:.2}% since last update)",
                    movement
                ));
            }
        }

        if self.volatility_factor_enabled && snapshot.max_change_24h_pct > VOLATILITY_TRIGGER_PCT {
            score += VOLATILITY_BONUS;
            reasons.push(format!(
                "High 24h volatility ({:.2}%)",
                snapshot.max_change_24h_pct
            ));
        }

        let is_first_run = self.prior.is_none();
        if is_first_run {
            // Bootstrap: guarantee the very first state write goes through
            score = score.max(threshold as u32);
            reasons.push("Initial state update".to_string());
        }

        let score = score.min(100) as u8;
        let threshold_triggered = score >= threshold;

        self.prior = Some(PriorSnapshot {
            eth_price: snapshot.eth_price,
            btc_price: snapshot.btc_price,
        });

        debug!(
            score,
            threshold, threshold_triggered, is_first_run, "decision computed"
        );

        DecisionResult {
            score,
            threshold_triggered,
            reasons,
            eth_price: snapshot.eth_price,
            btc_price: snapshot.btc_price,
            is_first_run,
            should_persist: threshold_triggered || is_first_run,
        }
    }

    /// Drop the carried prior; the next evaluation runs as a bootstrap.
    pub fn reset(&mut self) {
        self.prior = None;
    }
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self::new(true)
    }
}

fn pct_change(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        return 0.0;
    }
    (current - previous).abs() / previous * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_snapshot(eth: f64, btc: f64, eth_dev: f64, btc_dev: f64, change_24h: f64) -> PriceSnapshot {
        PriceSnapshot {
            readings: Vec::new(),
            eth_price: eth,
            btc_price: btc,
            eth_deviation_pct: eth_dev,
            btc_deviation_pct: btc_dev,
            max_change_24h_pct: change_24h,
            sources_used: vec!["test".to_string()],
            timestamp: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_first_run_always_persists() {
        let mut engine = DecisionEngine::new(true);
        let result = engine.decide(&make_snapshot(3000.0, 45000.0, 0.0, 0.0, 0.0), 75);

        assert!(result.is_first_run);
        assert_eq!(result.score, 75);
        assert!(result.threshold_triggered);
        assert!(result.should_persist);
        assert!(result.reasons.contains(&"Initial state update".to_string()));
    }

    #[test]
    fn test_quiet_market_after_bootstrap() {
        let mut engine = DecisionEngine::new(true);
        engine.decide(&make_snapshot(3000.0, 45000.0, 0.0, 0.0, 0.0), 75);

        let result = engine.decide(&make_snapshot(3000.0, 45000.0, 0.0, 0.0, 0.0), 75);
        assert_eq!(result.score, 50);
        assert!(!result.threshold_triggered);
        assert!(!result.should_persist);
        assert!(result.reasons.is_empty());
        assert_eq!(result.reason(), "Normal market conditions");
    }

    #[test]
    fn test_deviation_boundary_is_exclusive() {
        let mut engine = DecisionEngine::new(true);
        engine.decide(&make_snapshot(3000.0, 45000.0, 0.0, 0.0, 0.0), 75);

        // Exactly 1% does not count as disagreement
        let at_boundary = engine.decide(&make_snapshot(3000.0, 45000.0, 1.0, 0.0, 0.0), 75);
        assert_eq!(at_boundary.score, 50);

        let above = engine.decide(&make_snapshot(3000.0, 45000.0, 1.01, 0.0, 0.0), 75);
        assert_eq!(above.score, 70);
        assert_eq!(
            above.reasons,
            vec!["High source deviation (ETH: 1.01%, BTC: 0.00%)".to_string()]
        );
    }

    #[test]
    fn test_deviation_alone_meets_lower_threshold() {
        let mut engine = DecisionEngine::new(true);
        engine.decide(&make_snapshot(2550.0, 43000.0, 0.0, 0.0, 0.0), 70);

        // Sources at 2500/2600 aggregate to 2550 with a 4% disagreement;
        // no movement against the prior, so deviation is the only factor.
        let result = engine.decide(&make_snapshot(2550.0, 43000.0, 4.0, 0.0, 0.0), 70);
        assert_eq!(result.score, 70);
        assert!(result.threshold_triggered);
        assert!(result.should_persist);
        assert!(!result.is_first_run);
        assert_eq!(
            result.reasons,
            vec!["High source deviation (ETH: 4.00%, BTC: 0.00%)".to_string()]
        );
    }

    #[test]
    fn test_movement_measured_against_prior() {
        let mut engine = DecisionEngine::new(true);
        engine.decide(&make_snapshot(3000.0, 45000.0, 0.0, 0.0, 0.0), 75);

        // 3% ETH move since the bootstrap snapshot
        let result = engine.decide(&make_snapshot(3090.0, 45000.0, 0.0, 0.0, 0.0), 75);
        assert_eq!(result.score, 70);
        assert_eq!(
            result.reasons,
            vec!["Significant price movement (3.00% since last update)".to_string()]
        );
    }

    #[test]
    fn test_prior_advances_even_without_persist() {
        let mut engine = DecisionEngine::new(true);
        engine.decide(&make_snapshot(2000.0, 45000.0, 0.0, 0.0, 0.0), 75);

        // 5% move scores 70, below threshold, nothing persisted
        let skipped = engine.decide(&make_snapshot(2100.0, 45000.0, 0.0, 0.0, 0.0), 75);
        assert!(!skipped.should_persist);

        // Same prices again: movement is now zero, proving the prior moved
        // to 2100 rather than staying at 2000
        let result = engine.decide(&make_snapshot(2100.0, 45000.0, 0.0, 0.0, 0.0), 75);
        assert_eq!(result.score, 50);
    }

    #[test]
    fn test_all_factors_reach_exactly_one_hundred() {
        let mut engine = DecisionEngine::new(true);
        engine.decide(&make_snapshot(2000.0, 45000.0, 0.0, 0.0, 0.0), 75);

        let result = engine.decide(&make_snapshot(3000.0, 45000.0, 5.0, 0.0, 10.0), 75);
        assert_eq!(result.score, 100);
        assert!(result.threshold_triggered);
        assert_eq!(result.reasons.len(), 3);
        assert_eq!(
            result.reason(),
            "High source deviation (ETH: 5.00%, BTC: 0.00%); \
             Significant price movement (50.00% since last update); \
             High 24h volatility (10.00%)"
        );
    }

    #[test]
    fn test_score_never_exceeds_one_hundred() {
        // Threshold above the additive ceiling: first run lifts to the
        // threshold but the cap still wins
        let mut engine = DecisionEngine::new(true);
        let result = engine.decide(&make_snapshot(3000.0, 45000.0, 5.0, 5.0, 10.0), 120);
        assert_eq!(result.score, 100);
        assert!(!result.threshold_triggered);
        assert!(result.should_persist);
    }

    #[test]
    fn test_volatility_factor_can_be_disabled() {
        let mut enabled = DecisionEngine::new(true);
        enabled.decide(&make_snapshot(3000.0, 45000.0, 0.0, 0.0, 0.0), 75);
        assert_eq!(
            enabled.decide(&make_snapshot(3000.0, 45000.0, 0.0, 0.0, 8.0), 75).score,
            60
        );

        let mut disabled = DecisionEngine::new(false);
        disabled.decide(&make_snapshot(3000.0, 45000.0, 0.0, 0.0, 0.0), 75);
        assert_eq!(
            disabled.decide(&make_snapshot(3000.0, 45000.0, 0.0, 0.0, 8.0), 75).score,
            50
        );
    }

    #[test]
    fn test_volatility_boundary_is_exclusive() {
        let mut engine = DecisionEngine::new(true);
        engine.decide(&make_snapshot(3000.0, 45000.0, 0.0, 0.0, 0.0), 75);

        assert_eq!(
            engine.decide(&make_snapshot(3000.0, 45000.0, 0.0, 0.0, 5.0), 75).score,
            50
        );
        assert_eq!(
            engine.decide(&make_snapshot(3000.0, 45000.0, 0.0, 0.0, 5.01), 75).score,
            60
        );
    }

    #[test]
    fn test_reset_restores_bootstrap_behavior() {
        let mut engine = DecisionEngine::new(true);
        let snapshot = make_snapshot(3000.0, 45000.0, 0.5, 0.2, 1.0);

        let first = engine.decide(&snapshot, 75);
        engine.reset();
        let second = engine.decide(&snapshot, 75);

        assert_eq!(first, second);
        assert!(second.is_first_run);
    }

    #[test]
    fn test_zero_prior_price_yields_no_movement() {
        let mut engine = DecisionEngine::new(true);
        // Degenerate bootstrap where no source reported ETH
        engine.decide(&make_snapshot(0.0, 45000.0, 0.0, 0.0, 0.0), 75);

        let result = engine.decide(&make_snapshot(3000.0, 45000.0, 0.0, 0.0, 0.0), 75);
        assert_eq!(result.score, 50);
    }
}
