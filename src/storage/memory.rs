//! In-memory `LedgerStore`.
//!
//! Backs tests and storeless dry runs. Mirrors the SQLite store's
//! supersede semantics for reflections and windows so tests exercise
//! the same contract the durable store provides.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;

use super::LedgerStore;
use crate::types::{
    LearningInsight, LedgerEntry, PerformanceWindow, PeriodKind, Reflection, SageError,
    StrategyImprovement,
};

#[derive(Default)]
struct Inner {
    entries: Vec<LedgerEntry>,
    reflections: Vec<Reflection>,
    windows: Vec<PerformanceWindow>,
    insights: Vec<LearningInsight>,
    improvements: Vec<StrategyImprovement>,
    next_id: i64,
}

impl Inner {
    fn assign_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    /// When set, every operation fails with this message (for testing
    /// the persistence-failure path).
    force_error: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force all subsequent operations to fail.
    pub fn set_error(&self, message: &str) {
        *self.force_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    pub fn entry_count(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn reflection_count(&self) -> usize {
        self.inner.lock().unwrap().reflections.len()
    }

    fn check_error(&self) -> Result<(), SageError> {
        if let Some(message) = self.force_error.lock().unwrap().as_ref() {
            return Err(SageError::Persistence(message.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn append_entry(&self, entry: &LedgerEntry) -> Result<i64, SageError> {
        self.check_error()?;
        let mut inner = self.inner.lock().unwrap();
        let id = inner.assign_id();
        let mut stored = entry.clone();
        stored.id = id;
        inner.entries.push(stored);
        Ok(id)
    }

    async fn entries_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>, SageError> {
        self.check_error()?;
        let inner = self.inner.lock().unwrap();
        let mut entries: Vec<LedgerEntry> = inner
            .entries
            .iter()
            .filter(|e| e.timestamp >= start && e.timestamp < end)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.timestamp);
        Ok(entries)
    }

    async fn recent_entries(&self, limit: u32) -> Result<Vec<LedgerEntry>, SageError> {
        self.check_error()?;
        let inner = self.inner.lock().unwrap();
        let mut entries = inner.entries.clone();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(limit as usize);
        Ok(entries)
    }

    async fn append_reflection(&self, reflection: &Reflection) -> Result<i64, SageError> {
        self.check_error()?;
        let mut inner = self.inner.lock().unwrap();
        // Supersede on the idempotency key.
        inner.reflections.retain(|r| {
            !(r.ledger_entry_id == reflection.ledger_entry_id
                && r.kind == reflection.kind
                && r.period_start == reflection.period_start)
        });
        let id = inner.assign_id();
        let mut stored = reflection.clone();
        stored.id = id;
        inner.reflections.push(stored);
        Ok(id)
    }

    async fn recent_reflections(&self, limit: u32) -> Result<Vec<Reflection>, SageError> {
        self.check_error()?;
        let inner = self.inner.lock().unwrap();
        let mut reflections = inner.reflections.clone();
        reflections.sort_by(|a, b| b.id.cmp(&a.id));
        reflections.truncate(limit as usize);
        Ok(reflections)
    }

    async fn reflections_for_entry(&self, entry_id: i64) -> Result<Vec<Reflection>, SageError> {
        self.check_error()?;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .reflections
            .iter()
            .filter(|r| r.ledger_entry_id == entry_id)
            .cloned()
            .collect())
    }

    async fn append_window(&self, window: &PerformanceWindow) -> Result<i64, SageError> {
        self.check_error()?;
        let mut inner = self.inner.lock().unwrap();
        inner.windows.retain(|w| {
            !(w.period_kind == window.period_kind
                && w.period_start == window.period_start
                && w.period_end == window.period_end)
        });
        let id = inner.assign_id();
        let mut stored = window.clone();
        stored.id = id;
        inner.windows.push(stored);
        Ok(id)
    }

    async fn windows_by_kind(
        &self,
        kind: PeriodKind,
        limit: u32,
    ) -> Result<Vec<PerformanceWindow>, SageError> {
        self.check_error()?;
        let inner = self.inner.lock().unwrap();
        let mut windows: Vec<PerformanceWindow> = inner
            .windows
            .iter()
            .filter(|w| w.period_kind == kind)
            .cloned()
            .collect();
        windows.sort_by(|a, b| b.period_start.cmp(&a.period_start));
        windows.truncate(limit as usize);
        Ok(windows)
    }

    async fn append_insight(&self, insight: &LearningInsight) -> Result<i64, SageError> {
        self.check_error()?;
        let mut inner = self.inner.lock().unwrap();
        let id = inner.assign_id();
        let mut stored = insight.clone();
        stored.id = id;
        inner.insights.push(stored);
        Ok(id)
    }

    async fn recent_insights(&self, limit: u32) -> Result<Vec<LearningInsight>, SageError> {
        self.check_error()?;
        let inner = self.inner.lock().unwrap();
        let mut insights = inner.insights.clone();
        insights.sort_by(|a, b| b.id.cmp(&a.id));
        insights.truncate(limit as usize);
        Ok(insights)
    }

    async fn append_improvement(
        &self,
        improvement: &StrategyImprovement,
    ) -> Result<i64, SageError> {
        self.check_error()?;
        let mut inner = self.inner.lock().unwrap();
        let id = inner.assign_id();
        let mut stored = improvement.clone();
        stored.id = id;
        inner.improvements.push(stored);
        Ok(id)
    }

    async fn recent_improvements(
        &self,
        limit: u32,
    ) -> Result<Vec<StrategyImprovement>, SageError> {
        self.check_error()?;
        let inner = self.inner.lock().unwrap();
        let mut improvements = inner.improvements.clone();
        improvements.sort_by(|a, b| b.id.cmp(&a.id));
        improvements.truncate(limit as usize);
        Ok(improvements)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;
    use rust_decimal_macros::dec;

    fn make_entry(ts: DateTime<Utc>) -> LedgerEntry {
        LedgerEntry {
            id: 0,
            timestamp: ts,
            decision: Decision::fallback_hold("test"),
            result: ExecutionResult {
                action: ActionTaken::Hold,
                price: dec!(50000000),
                quantity: rust_decimal::Decimal::ZERO,
                notional_value: rust_decimal::Decimal::ZERO,
                fee: rust_decimal::Decimal::ZERO,
                order_id: None,
                outcome: Outcome::Executed,
            },
            account_before: AccountSnapshot {
                cash_balance: dec!(100000),
                asset_balance: rust_decimal::Decimal::ZERO,
                asset_average_price: rust_decimal::Decimal::ZERO,
                mark_price: dec!(50000000),
            },
            trend: Some(MarketTrend::Neutral),
        }
    }

    fn make_reflection(entry_id: i64, period_start: DateTime<Utc>, score: f64) -> Reflection {
        Reflection {
            id: 0,
            ledger_entry_id: entry_id,
            kind: ReflectionKind::Immediate,
            performance_score: score,
            pnl: rust_decimal::Decimal::ZERO,
            pnl_percent: 0.0,
            decision_quality_score: 0.5,
            timing_score: 0.5,
            risk_management_score: 0.5,
            narrative: "test".into(),
            suggestions: "test".into(),
            period_start,
            period_end: period_start,
        }
    }

    #[tokio::test]
    async fn test_append_assigns_increasing_ids() {
        let store = MemoryStore::new();
        let a = store.append_entry(&make_entry(Utc::now())).await.unwrap();
        let b = store.append_entry(&make_entry(Utc::now())).await.unwrap();
        assert!(b > a);
        assert_eq!(store.entry_count(), 2);
    }

    #[tokio::test]
    async fn test_entries_between_is_half_open() {
        let store = MemoryStore::new();
        let base = Utc::now();
        let inside = base + chrono::Duration::hours(1);
        let at_end = base + chrono::Duration::hours(2);

        store.append_entry(&make_entry(base)).await.unwrap();
        store.append_entry(&make_entry(inside)).await.unwrap();
        store.append_entry(&make_entry(at_end)).await.unwrap();

        let found = store.entries_between(base, at_end).await.unwrap();
        // start inclusive, end exclusive
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn test_reflection_supersede_on_same_key() {
        let store = MemoryStore::new();
        let ts = Utc::now();
        store
            .append_reflection(&make_reflection(1, ts, 0.5))
            .await
            .unwrap();
        store
            .append_reflection(&make_reflection(1, ts, 0.7))
            .await
            .unwrap();

        let rows = store.reflections_for_entry(1).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!((rows[0].performance_score - 0.7).abs() < 1e-10);
    }

    #[tokio::test]
    async fn test_reflection_distinct_kinds_coexist() {
        let store = MemoryStore::new();
        let ts = Utc::now();
        let mut daily = make_reflection(1, ts, 0.5);
        daily.kind = ReflectionKind::Daily;
        store
            .append_reflection(&make_reflection(1, ts, 0.5))
            .await
            .unwrap();
        store.append_reflection(&daily).await.unwrap();
        assert_eq!(store.reflections_for_entry(1).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_window_supersede() {
        let store = MemoryStore::new();
        let start = Utc::now();
        let end = start + chrono::Duration::days(1);
        let mut w = PerformanceWindow::empty(PeriodKind::Daily, start, end);
        w.total_trades = 3;
        store.append_window(&w).await.unwrap();
        w.total_trades = 5;
        store.append_window(&w).await.unwrap();

        let found = store.windows_by_kind(PeriodKind::Daily, 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].total_trades, 5);
    }

    #[tokio::test]
    async fn test_forced_error_propagates() {
        let store = MemoryStore::new();
        store.set_error("disk full");
        let err = store.append_entry(&make_entry(Utc::now())).await.unwrap_err();
        assert!(matches!(err, SageError::Persistence(_)));

        store.clear_error();
        assert!(store.append_entry(&make_entry(Utc::now())).await.is_ok());
    }

    #[tokio::test]
    async fn test_recent_entries_newest_first() {
        let store = MemoryStore::new();
        let base = Utc::now();
        store.append_entry(&make_entry(base)).await.unwrap();
        store
            .append_entry(&make_entry(base + chrono::Duration::minutes(5)))
            .await
            .unwrap();

        let recent = store.recent_entries(1).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].timestamp, base + chrono::Duration::minutes(5));
    }
}
