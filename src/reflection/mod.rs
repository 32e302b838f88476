//! Reflection engine — post-hoc evaluation of ledger entries.
//!
//! Two operating modes:
//! - **Immediate**: one scored reflection per completed ledger write,
//!   idempotent per entry (re-running deterministically overwrites).
//! - **Periodic**: aggregate a half-open `[start, end)` window of
//!   entries into a performance window, fan one reflection row out per
//!   entry (all sharing the window's aggregate scores), and derive
//!   advisory insights and improvement proposals from the totals.
//!
//! The engine only reads the ledger — it never mutates an entry, and
//! nothing it writes feeds back into execution.

pub mod insights;
pub mod scoring;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use crate::storage::LedgerStore;
use crate::types::{LedgerEntry, PerformanceWindow, PeriodKind, Reflection, SageError};

pub struct ReflectionEngine {
    store: Arc<dyn LedgerStore>,
}

impl ReflectionEngine {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Immediate mode: score one ledger entry and persist the result.
    ///
    /// Keyed on (entry, immediate, entry.timestamp) in the store, so a
    /// second call for the same entry supersedes the first instead of
    /// duplicating it.
    pub async fn reflect(&self, entry: &LedgerEntry) -> Result<Reflection, SageError> {
        let pnl = scoring::entry_pnl(entry);
        let mut reflection = Reflection {
            id: 0,
            ledger_entry_id: entry.id,
            kind: crate::types::ReflectionKind::Immediate,
            performance_score: scoring::performance_score(pnl, entry.decision.confidence),
            pnl,
            pnl_percent: scoring::entry_pnl_percent(entry, pnl),
            decision_quality_score: scoring::decision_quality_score(
                entry.decision.action,
                entry.trend,
            ),
            timing_score: scoring::timing_score(entry),
            risk_management_score: scoring::risk_management_score(entry),
            narrative: insights::entry_narrative(entry, pnl),
            suggestions: insights::entry_suggestions(entry, pnl),
            period_start: entry.timestamp,
            period_end: entry.timestamp,
        };

        reflection.id = self.store.append_reflection(&reflection).await?;
        debug!(
            entry_id = entry.id,
            performance = reflection.performance_score,
            quality = reflection.decision_quality_score,
            "Immediate reflection stored"
        );
        Ok(reflection)
    }

    /// Periodic mode: aggregate `[start, end)` and fan out one
    /// reflection per entry in the window.
    ///
    /// An empty window completes as a no-op: the zeroed window is
    /// returned but nothing is persisted.
    pub async fn run_periodic(
        &self,
        kind: PeriodKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<PerformanceWindow, SageError> {
        let entries = self.store.entries_between(start, end).await?;
        let mut window = scoring::compute_window(kind, start, end, &entries);

        if entries.is_empty() {
            info!(%kind, %start, %end, "Periodic reflection: no entries in window");
            return Ok(window);
        }

        self.fan_out(&window, &entries).await?;
        window.id = self.store.append_window(&window).await?;

        for insight in insights::derive_insights(&window, &entries) {
            self.store.append_insight(&insight).await?;
        }
        for improvement in insights::derive_improvements(&window) {
            self.store.append_improvement(&improvement).await?;
        }

        info!(
            %kind,
            trades = window.total_trades,
            win_rate = format!("{:.0}%", window.win_rate * 100.0),
            pnl = %window.total_pnl,
            entries = entries.len(),
            "Periodic reflection complete"
        );
        Ok(window)
    }

    /// One reflection row per entry, all sharing the window's
    /// aggregate scores but each keeping its own entry reference, so
    /// per-trade detail and period summary stay queryable side by side.
    async fn fan_out(
        &self,
        window: &PerformanceWindow,
        entries: &[LedgerEntry],
    ) -> Result<(), SageError> {
        let narrative = insights::window_narrative(window);
        let suggestions = insights::window_suggestions(window);

        for entry in entries {
            let reflection = Reflection {
                id: 0,
                ledger_entry_id: entry.id,
                kind: window.period_kind.reflection_kind(),
                performance_score: window.win_rate,
                pnl: window.total_pnl,
                pnl_percent: window.total_pnl_percent,
                decision_quality_score: window.win_rate,
                timing_score: scoring::NEUTRAL_SCORE,
                risk_management_score: (1.0 - window.max_drawdown.abs()).clamp(0.0, 1.0),
                narrative: narrative.clone(),
                suggestions: suggestions.clone(),
                period_start: window.period_start,
                period_end: window.period_end,
            };
            self.store.append_reflection(&reflection).await?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;
    use crate::types::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn make_engine() -> (ReflectionEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (ReflectionEngine::new(store.clone()), store)
    }

    fn trade_entry(id: i64, ts: DateTime<Utc>, avg_price: Decimal) -> LedgerEntry {
        LedgerEntry {
            id,
            timestamp: ts,
            decision: Decision {
                action: Action::Sell,
                confidence: 0.7,
                risk_tier: RiskTier::Medium,
                rationale: "take profit".into(),
                expected_range: ExpectedRange {
                    min: dec!(48000000),
                    max: dec!(52000000),
                },
                key_indicators: None,
                chart_analysis: None,
            },
            result: ExecutionResult {
                action: ActionTaken::Sell,
                price: dec!(50000000),
                quantity: dec!(0.001),
                notional_value: dec!(50000),
                fee: dec!(25),
                order_id: Some("ord".into()),
                outcome: Outcome::Executed,
            },
            account_before: AccountSnapshot {
                cash_balance: dec!(100000),
                asset_balance: dec!(0.001),
                asset_average_price: avg_price,
                mark_price: dec!(50000000),
            },
            trend: Some(MarketTrend::Bearish),
        }
    }

    fn hold_entry(id: i64, ts: DateTime<Utc>) -> LedgerEntry {
        let mut entry = trade_entry(id, ts, dec!(45000000));
        entry.decision.action = Action::Hold;
        entry.result.action = ActionTaken::Hold;
        entry.result.quantity = Decimal::ZERO;
        entry.result.notional_value = Decimal::ZERO;
        entry.result.fee = Decimal::ZERO;
        entry.result.order_id = None;
        entry
    }

    #[tokio::test]
    async fn test_immediate_reflection_scores_and_persists() {
        let (engine, store) = make_engine();
        let entry = trade_entry(1, Utc::now(), dec!(45000000));

        let reflection = engine.reflect(&entry).await.unwrap();

        // (50m - 45m) * 0.001 - 25 = 4975
        assert_eq!(reflection.pnl, dec!(4975));
        // profitable + confidence 0.7: 0.5 + 0.3 + 0.04 = 0.84
        assert!((reflection.performance_score - 0.84).abs() < 1e-10);
        // sell into bearish trend agrees
        assert!((reflection.decision_quality_score - scoring::AGREEMENT_SCORE).abs() < 1e-10);
        assert_eq!(store.reflection_count(), 1);
    }

    #[tokio::test]
    async fn test_immediate_reflection_idempotent() {
        let (engine, store) = make_engine();
        let entry = trade_entry(1, Utc::now(), dec!(45000000));

        let first = engine.reflect(&entry).await.unwrap();
        let second = engine.reflect(&entry).await.unwrap();

        // Re-running never produces two distinct scores for one entry.
        assert_eq!(store.reflections_for_entry(1).await.unwrap().len(), 1);
        assert!((first.performance_score - second.performance_score).abs() < 1e-10);
    }

    #[tokio::test]
    async fn test_periodic_empty_window_is_noop() {
        let (engine, store) = make_engine();
        let start = Utc::now() - chrono::Duration::days(1);
        let end = Utc::now();

        let window = engine
            .run_periodic(PeriodKind::Daily, start, end)
            .await
            .unwrap();

        assert_eq!(window.total_trades, 0);
        assert_eq!(window.win_rate, 0.0);
        assert_eq!(store.reflection_count(), 0);
        assert!(store
            .windows_by_kind(PeriodKind::Daily, 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_periodic_fans_out_one_row_per_entry() {
        let (engine, store) = make_engine();
        let start = Utc::now() - chrono::Duration::days(1);
        let end = Utc::now();
        let inside = start + chrono::Duration::hours(2);

        store
            .append_entry(&trade_entry(0, inside, dec!(45000000)))
            .await
            .unwrap();
        store
            .append_entry(&trade_entry(0, inside + chrono::Duration::hours(1), dec!(55000000)))
            .await
            .unwrap();
        store.append_entry(&hold_entry(0, inside + chrono::Duration::hours(2))).await.unwrap();

        let window = engine
            .run_periodic(PeriodKind::Daily, start, end)
            .await
            .unwrap();

        // Two trades (one win, one loss) plus a hold that stays out of
        // the trade totals but still gets a fan-out row.
        assert_eq!(window.total_trades, 2);
        assert_eq!(window.winning_trades, 1);
        assert_eq!(window.losing_trades, 1);
        assert!((window.win_rate - 0.5).abs() < 1e-10);
        assert_eq!(store.reflection_count(), 3);

        let windows = store.windows_by_kind(PeriodKind::Daily, 10).await.unwrap();
        assert_eq!(windows.len(), 1);
    }

    #[tokio::test]
    async fn test_periodic_rows_share_aggregate_scores() {
        let (engine, store) = make_engine();
        let start = Utc::now() - chrono::Duration::days(1);
        let end = Utc::now();
        let inside = start + chrono::Duration::hours(1);

        let a = store
            .append_entry(&trade_entry(0, inside, dec!(45000000)))
            .await
            .unwrap();
        let b = store
            .append_entry(&trade_entry(0, inside + chrono::Duration::hours(1), dec!(45000000)))
            .await
            .unwrap();

        engine
            .run_periodic(PeriodKind::Weekly, start, end)
            .await
            .unwrap();

        let ra = store.reflections_for_entry(a).await.unwrap();
        let rb = store.reflections_for_entry(b).await.unwrap();
        assert_eq!(ra.len(), 1);
        assert_eq!(rb.len(), 1);
        assert_eq!(ra[0].kind, ReflectionKind::Weekly);
        assert!((ra[0].performance_score - rb[0].performance_score).abs() < 1e-10);
        assert_eq!(ra[0].pnl, rb[0].pnl);
        assert_ne!(ra[0].ledger_entry_id, rb[0].ledger_entry_id);
    }

    #[tokio::test]
    async fn test_periodic_generates_insights_and_improvements() {
        let (engine, store) = make_engine();
        let start = Utc::now() - chrono::Duration::days(1);
        let end = Utc::now();
        let inside = start + chrono::Duration::hours(1);

        // A losing trade: bought at 55m, now 50m
        store
            .append_entry(&trade_entry(0, inside, dec!(55000000)))
            .await
            .unwrap();

        engine
            .run_periodic(PeriodKind::Daily, start, end)
            .await
            .unwrap();

        let insights = store.recent_insights(10).await.unwrap();
        assert!(!insights.is_empty());
        let improvements = store.recent_improvements(10).await.unwrap();
        // 0% win rate and net loss both trip thresholds
        assert!(improvements.len() >= 2);
    }

    #[tokio::test]
    async fn test_periodic_recompute_supersedes() {
        let (engine, store) = make_engine();
        let start = Utc::now() - chrono::Duration::days(1);
        let end = Utc::now();
        let inside = start + chrono::Duration::hours(1);

        store
            .append_entry(&trade_entry(0, inside, dec!(45000000)))
            .await
            .unwrap();

        engine
            .run_periodic(PeriodKind::Daily, start, end)
            .await
            .unwrap();
        engine
            .run_periodic(PeriodKind::Daily, start, end)
            .await
            .unwrap();

        // Window superseded, fan-out rows superseded — no duplicates.
        assert_eq!(
            store.windows_by_kind(PeriodKind::Daily, 10).await.unwrap().len(),
            1
        );
        assert_eq!(store.reflection_count(), 1);
    }
}
