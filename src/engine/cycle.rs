//! Trading cycle — one full read → decide → execute → record →
//! reflect iteration.
//!
//! Steps are strictly sequential within a cycle. Every collaborator
//! call carries an explicit timeout; a timeout is a collaborator
//! failure, never a hang. Failures before the execution step abort the
//! cycle with no side effects; a persistence failure after execution
//! is surfaced loudly (the order already happened and must not be
//! silently lost) but is never compensated by reversing the trade.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::TradingConfig;
use crate::engine::executor::ExecutionEngine;
use crate::exchange::{Exchange, MarketFeed};
use crate::oracle::DecisionOracle;
use crate::reflection::ReflectionEngine;
use crate::storage::LedgerStore;
use crate::types::{ActionTaken, Decision, LedgerEntry, Outcome, SageError};

/// Summary of one completed cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle_number: u64,
    pub timestamp: DateTime<Utc>,
    pub action: ActionTaken,
    pub outcome: Outcome,
    pub fallback_decision: bool,
    pub ledger_entry_id: i64,
    /// Absent when the immediate reflection failed (logged, non-fatal).
    pub performance_score: Option<f64>,
}

pub struct CycleRunner {
    exchange: Arc<dyn Exchange>,
    feed: Arc<dyn MarketFeed>,
    oracle: Arc<dyn DecisionOracle>,
    executor: ExecutionEngine,
    store: Arc<dyn LedgerStore>,
    reflection: ReflectionEngine,
    timeout: Duration,
}

impl CycleRunner {
    pub fn new(
        exchange: Arc<dyn Exchange>,
        feed: Arc<dyn MarketFeed>,
        oracle: Arc<dyn DecisionOracle>,
        store: Arc<dyn LedgerStore>,
        cfg: &TradingConfig,
    ) -> Self {
        Self {
            executor: ExecutionEngine::new(exchange.clone(), cfg.clone()),
            reflection: ReflectionEngine::new(store.clone()),
            exchange,
            feed,
            oracle,
            store,
            timeout: Duration::from_secs(cfg.collaborator_timeout_secs),
        }
    }

    /// Run one full cycle.
    ///
    /// Errors returned here abort the cycle; the scheduler logs them
    /// and re-arms after its cooldown. No error crosses the execution
    /// boundary as a panic.
    pub async fn run_cycle(&self, cycle_number: u64) -> Result<CycleReport, SageError> {
        info!(cycle = cycle_number, "Starting cycle");

        // 1. Account state — the only balance read this cycle.
        let account = self
            .with_timeout("exchange", self.exchange.account_snapshot())
            .await?;
        info!(%account, "Account snapshot captured");

        // 2. Market context for the oracle.
        let context = self
            .with_timeout("market-feed", self.feed.market_context())
            .await?;
        let trend = context.trend();

        // 3. Oracle recommendation; a malformed one degrades to hold,
        //    an unreachable oracle aborts the cycle.
        let decision = self
            .with_timeout("oracle", self.oracle.request_decision(&context))
            .await?;
        let decision = match decision.validate() {
            Ok(()) => decision,
            Err(e) => {
                warn!(error = %e, "Oracle decision rejected, falling back to hold");
                Decision::fallback_hold(&e.to_string())
            }
        };
        let fallback_decision = decision.is_fallback();
        info!(%decision, fallback = fallback_decision, "Decision for this cycle");

        // 4. Execute. Infallible: the result records what happened.
        let result = self.executor.execute(&decision, &account).await;

        // 5. Durable record — one atomic row.
        let mut entry = LedgerEntry {
            id: 0,
            timestamp: Utc::now(),
            decision,
            result,
            account_before: account,
            trend: Some(trend),
        };
        entry.id = match self.store.append_entry(&entry).await {
            Ok(id) => id,
            Err(e) => {
                // The order (if any) already executed. This needs manual
                // reconciliation, never an automatic reversal.
                error!(
                    error = %e,
                    outcome = %entry.result.outcome,
                    order_id = ?entry.result.order_id,
                    "LEDGER WRITE FAILED — executed action may be unrecorded"
                );
                return Err(e);
            }
        };

        // 6. Immediate reflection for executed-or-held entries; skips
        //    and failures stay observable through the ledger alone. A
        //    reflection failure is logged, not fatal.
        let performance_score = if entry.result.outcome == Outcome::Executed {
            match self.reflection.reflect(&entry).await {
                Ok(reflection) => Some(reflection.performance_score),
                Err(e) => {
                    warn!(error = %e, entry_id = entry.id, "Immediate reflection failed");
                    None
                }
            }
        } else {
            None
        };

        let report = CycleReport {
            cycle_number,
            timestamp: entry.timestamp,
            action: entry.result.action,
            outcome: entry.result.outcome,
            fallback_decision,
            ledger_entry_id: entry.id,
            performance_score,
        };

        info!(
            cycle = report.cycle_number,
            action = %report.action,
            outcome = %report.outcome,
            entry_id = report.ledger_entry_id,
            score = ?report.performance_score,
            "Cycle complete"
        );
        Ok(report)
    }

    async fn with_timeout<T>(
        &self,
        collaborator: &str,
        fut: impl std::future::Future<Output = Result<T, SageError>>,
    ) -> Result<T, SageError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(SageError::timeout(collaborator)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::paper::PaperExchange;
    use crate::storage::memory::MemoryStore;
    use crate::types::{Action, ExpectedRange, MarketContext, RiskTier};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    /// Scripted oracle: pops pre-loaded responses in order.
    struct ScriptedOracle {
        responses: Mutex<Vec<Result<Decision, SageError>>>,
    }

    impl ScriptedOracle {
        fn with(responses: Vec<Result<Decision, SageError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
            })
        }
    }

    #[async_trait]
    impl DecisionOracle for ScriptedOracle {
        async fn request_decision(
            &self,
            _context: &MarketContext,
        ) -> Result<Decision, SageError> {
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(Decision::fallback_hold("script exhausted")))
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn decision(action: Action, confidence: f64) -> Decision {
        Decision {
            action,
            confidence,
            risk_tier: RiskTier::Medium,
            rationale: "test".into(),
            expected_range: ExpectedRange {
                min: dec!(48000000),
                max: dec!(52000000),
            },
            key_indicators: None,
            chart_analysis: None,
        }
    }

    fn make_runner(
        paper: Arc<PaperExchange>,
        oracle: Arc<ScriptedOracle>,
        store: Arc<MemoryStore>,
    ) -> CycleRunner {
        CycleRunner::new(
            paper.clone(),
            paper,
            oracle,
            store,
            &TradingConfig::default(),
        )
    }

    fn paper() -> Arc<PaperExchange> {
        Arc::new(PaperExchange::new(dec!(100000), dec!(50000000), dec!(0.0005)))
    }

    #[tokio::test]
    async fn test_buy_cycle_records_and_reflects() {
        let paper = paper();
        let store = Arc::new(MemoryStore::new());
        let oracle = ScriptedOracle::with(vec![Ok(decision(Action::Buy, 0.8))]);
        let runner = make_runner(paper.clone(), oracle, store.clone());

        let report = runner.run_cycle(1).await.unwrap();

        assert_eq!(report.action, ActionTaken::Buy);
        assert_eq!(report.outcome, Outcome::Executed);
        assert!(!report.fallback_decision);
        assert!(report.performance_score.is_some());
        assert_eq!(store.entry_count(), 1);
        assert_eq!(store.reflection_count(), 1);
        assert_eq!(paper.fill_count(), 1);

        // The recorded snapshot is the pre-trade account state.
        let entries = store.recent_entries(1).await.unwrap();
        assert_eq!(entries[0].account_before.cash_balance, dec!(100000));
        assert_eq!(entries[0].result.notional_value, dec!(95000));
    }

    #[tokio::test]
    async fn test_invalid_decision_cycle_holds() {
        let paper = paper();
        let store = Arc::new(MemoryStore::new());
        let oracle = ScriptedOracle::with(vec![Ok(decision(Action::Buy, 1.7))]);
        let runner = make_runner(paper.clone(), oracle, store.clone());

        let report = runner.run_cycle(1).await.unwrap();

        assert_eq!(report.action, ActionTaken::Hold);
        assert!(report.fallback_decision);
        assert_eq!(paper.fill_count(), 0);

        // The ledger trail shows why the cycle held.
        let entries = store.recent_entries(1).await.unwrap();
        assert!(entries[0].decision.rationale.contains("confidence 1.7"));
    }

    #[tokio::test]
    async fn test_oracle_failure_aborts_cycle_before_side_effects() {
        let paper = paper();
        let store = Arc::new(MemoryStore::new());
        let oracle = ScriptedOracle::with(vec![Err(SageError::Oracle {
            model: "scripted".into(),
            message: "503".into(),
        })]);
        let runner = make_runner(paper.clone(), oracle, store.clone());

        let err = runner.run_cycle(1).await.unwrap_err();
        assert!(matches!(err, SageError::Oracle { .. }));
        assert_eq!(store.entry_count(), 0);
        assert_eq!(paper.fill_count(), 0);
    }

    #[tokio::test]
    async fn test_persistence_failure_surfaces_after_execution() {
        let paper = paper();
        let store = Arc::new(MemoryStore::new());
        store.set_error("disk full");
        let oracle = ScriptedOracle::with(vec![Ok(decision(Action::Buy, 0.8))]);
        let runner = make_runner(paper.clone(), oracle, store.clone());

        let err = runner.run_cycle(1).await.unwrap_err();

        // The order filled but the record failed — surfaced, not hidden.
        assert!(matches!(err, SageError::Persistence(_)));
        assert_eq!(paper.fill_count(), 1);
        assert_eq!(store.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_hold_cycle_is_still_recorded() {
        let paper = paper();
        let store = Arc::new(MemoryStore::new());
        let oracle = ScriptedOracle::with(vec![Ok(decision(Action::Hold, 0.6))]);
        let runner = make_runner(paper.clone(), oracle, store.clone());

        let report = runner.run_cycle(1).await.unwrap();

        assert_eq!(report.action, ActionTaken::Hold);
        assert_eq!(report.outcome, Outcome::Executed);
        // No silent cycles: the hold is a ledger row with a reflection.
        assert_eq!(store.entry_count(), 1);
        assert_eq!(store.reflection_count(), 1);
    }

    #[tokio::test]
    async fn test_insufficient_funds_cycle_recorded_with_reason() {
        let paper = paper();
        paper.set_cash(dec!(4999));
        let store = Arc::new(MemoryStore::new());
        let oracle = ScriptedOracle::with(vec![Ok(decision(Action::Buy, 0.8))]);
        let runner = make_runner(paper.clone(), oracle, store.clone());

        let report = runner.run_cycle(1).await.unwrap();

        assert_eq!(report.outcome, Outcome::SkippedInsufficientFunds);
        assert_eq!(paper.fill_count(), 0);
        assert_eq!(store.entry_count(), 1);
        // Skips are observable through the ledger; only executed-or-held
        // entries get an immediate reflection.
        assert!(report.performance_score.is_none());
        assert_eq!(store.reflection_count(), 0);
    }

    #[tokio::test]
    async fn test_trend_label_captured_on_entry() {
        let paper = paper();
        paper.set_change_24h(0.04);
        let store = Arc::new(MemoryStore::new());
        let oracle = ScriptedOracle::with(vec![Ok(decision(Action::Buy, 0.8))]);
        let runner = make_runner(paper, oracle, store.clone());

        runner.run_cycle(1).await.unwrap();

        let entries = store.recent_entries(1).await.unwrap();
        assert_eq!(entries[0].trend, Some(crate::types::MarketTrend::Bullish));
    }
}
