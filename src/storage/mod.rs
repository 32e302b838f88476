//! Persistence layer.
//!
//! Defines the `LedgerStore` trait — the injected persistence port the
//! engine, reflection, and API modules write and read through — and
//! provides:
//! - SQLite (sqlx) — the durable store
//! - Memory — in-process fake for tests and storeless dry runs
//!
//! The ledger is append-only: entries are never updated or deleted.
//! Reflections and performance windows are "append with supersede":
//! rewriting the same logical key replaces the previous row instead of
//! duplicating it, which is what makes immediate reflection idempotent
//! and window recomputation a clean supersede.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{
    LearningInsight, LedgerEntry, PerformanceWindow, PeriodKind, Reflection, SageError,
    StrategyImprovement,
};

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Append one ledger entry as a single atomic insert.
    /// Returns the assigned id.
    async fn append_entry(&self, entry: &LedgerEntry) -> Result<i64, SageError>;

    /// Entries with `start <= timestamp < end`, ordered by timestamp.
    async fn entries_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>, SageError>;

    /// Most recent entries, newest first.
    async fn recent_entries(&self, limit: u32) -> Result<Vec<LedgerEntry>, SageError>;

    /// Append a reflection. A row with the same
    /// (ledger_entry_id, kind, period_start) is superseded, not
    /// duplicated.
    async fn append_reflection(&self, reflection: &Reflection) -> Result<i64, SageError>;

    /// Most recent reflections, newest first.
    async fn recent_reflections(&self, limit: u32) -> Result<Vec<Reflection>, SageError>;

    /// All reflections referencing one ledger entry.
    async fn reflections_for_entry(&self, entry_id: i64) -> Result<Vec<Reflection>, SageError>;

    /// Append a performance window. A row for the same
    /// (kind, start, end) is superseded, not merged.
    async fn append_window(&self, window: &PerformanceWindow) -> Result<i64, SageError>;

    /// Windows of one cadence, newest first.
    async fn windows_by_kind(
        &self,
        kind: PeriodKind,
        limit: u32,
    ) -> Result<Vec<PerformanceWindow>, SageError>;

    async fn append_insight(&self, insight: &LearningInsight) -> Result<i64, SageError>;

    async fn recent_insights(&self, limit: u32) -> Result<Vec<LearningInsight>, SageError>;

    async fn append_improvement(
        &self,
        improvement: &StrategyImprovement,
    ) -> Result<i64, SageError>;

    async fn recent_improvements(
        &self,
        limit: u32,
    ) -> Result<Vec<StrategyImprovement>, SageError>;
}
