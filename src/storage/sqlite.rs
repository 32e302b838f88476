//! SQLite `LedgerStore` backed by sqlx.
//!
//! Every record is written with a single INSERT, so the four logical
//! fields of a ledger entry (decision, result, pre-trade snapshot,
//! timestamp) land atomically — a partial write is not possible.
//! Reflections and windows carry UNIQUE keys with ON CONFLICT REPLACE,
//! giving the supersede semantics the trait documents.
//!
//! Money columns are TEXT: sqlx's SQLite driver has no native decimal
//! type and exact round-trips matter more than in-database arithmetic.
//! Timestamps are fixed-width RFC 3339 UTC strings so lexicographic
//! range scans match chronological order.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::info;

use super::LedgerStore;
use crate::types::{
    LearningInsight, LedgerEntry, PerformanceWindow, PeriodKind, Reflection, SageError,
    StrategyImprovement,
};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS ledger_entries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        action TEXT NOT NULL,
        confidence REAL NOT NULL,
        risk_tier TEXT NOT NULL,
        rationale TEXT NOT NULL,
        expected_min TEXT NOT NULL,
        expected_max TEXT NOT NULL,
        key_indicators TEXT,
        chart_analysis TEXT,
        action_taken TEXT NOT NULL,
        price TEXT NOT NULL,
        quantity TEXT NOT NULL,
        notional_value TEXT NOT NULL,
        fee TEXT NOT NULL,
        order_id TEXT,
        outcome TEXT NOT NULL,
        cash_balance TEXT NOT NULL,
        asset_balance TEXT NOT NULL,
        asset_average_price TEXT NOT NULL,
        mark_price TEXT NOT NULL,
        trend TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_ledger_timestamp ON ledger_entries(timestamp)",
    "CREATE TABLE IF NOT EXISTS reflections (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        ledger_entry_id INTEGER NOT NULL,
        kind TEXT NOT NULL,
        performance_score REAL NOT NULL,
        pnl TEXT NOT NULL,
        pnl_percent REAL NOT NULL,
        decision_quality_score REAL NOT NULL,
        timing_score REAL NOT NULL,
        risk_management_score REAL NOT NULL,
        narrative TEXT NOT NULL,
        suggestions TEXT NOT NULL,
        period_start TEXT NOT NULL,
        period_end TEXT NOT NULL,
        UNIQUE(ledger_entry_id, kind, period_start) ON CONFLICT REPLACE
    )",
    "CREATE TABLE IF NOT EXISTS performance_windows (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        period_kind TEXT NOT NULL,
        period_start TEXT NOT NULL,
        period_end TEXT NOT NULL,
        total_trades INTEGER NOT NULL,
        winning_trades INTEGER NOT NULL,
        losing_trades INTEGER NOT NULL,
        win_rate REAL NOT NULL,
        total_pnl TEXT NOT NULL,
        total_pnl_percent REAL NOT NULL,
        max_drawdown REAL NOT NULL,
        sharpe_ratio REAL NOT NULL,
        UNIQUE(period_kind, period_start, period_end) ON CONFLICT REPLACE
    )",
    "CREATE TABLE IF NOT EXISTS learning_insights (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        kind TEXT NOT NULL,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        confidence REAL NOT NULL,
        priority TEXT NOT NULL,
        status TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS strategy_improvements (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        kind TEXT NOT NULL,
        old_value TEXT NOT NULL,
        new_value TEXT NOT NULL,
        reason TEXT NOT NULL,
        expected_impact TEXT NOT NULL,
        status TEXT NOT NULL
    )",
];

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect and ensure the schema exists.
    ///
    /// A single connection: writes are serialized anyway at this
    /// cadence, and `sqlite::memory:` databases are per-connection.
    pub async fn connect(url: &str) -> Result<Self, SageError> {
        let pool: SqlitePool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await
            .map_err(|e| SageError::Persistence(format!("connect {url}: {e}")))?;

        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(|e| SageError::Persistence(format!("schema init: {e}")))?;
        }

        info!(url, "SQLite ledger store ready");
        Ok(Self { pool })
    }
}

// ---------------------------------------------------------------------------
// Column codecs
// ---------------------------------------------------------------------------

fn ts_to_db(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn ts_from_db(raw: &str) -> Result<DateTime<Utc>, SageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| SageError::Persistence(format!("bad timestamp {raw:?}: {e}")))
}

fn dec_from_db(raw: &str, field: &str) -> Result<Decimal, SageError> {
    raw.parse::<Decimal>()
        .map_err(|e| SageError::Persistence(format!("bad {field} value {raw:?}: {e}")))
}

fn parse_enum<T: std::str::FromStr<Err = anyhow::Error>>(
    raw: &str,
    field: &str,
) -> Result<T, SageError> {
    raw.parse::<T>()
        .map_err(|e| SageError::Persistence(format!("bad {field} value {raw:?}: {e}")))
}

fn db_err(e: sqlx::Error) -> SageError {
    SageError::Persistence(e.to_string())
}

fn json_to_db(value: &Option<serde_json::Value>) -> Option<String> {
    value.as_ref().map(|v| v.to_string())
}

fn json_from_db(raw: Option<String>) -> Option<serde_json::Value> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
}

// ---------------------------------------------------------------------------
// Row mappers
// ---------------------------------------------------------------------------

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<LedgerEntry, SageError> {
    use crate::types::{
        AccountSnapshot, Decision, ExecutionResult, ExpectedRange,
    };

    let trend: Option<String> = row.try_get("trend").map_err(db_err)?;
    let order_id: Option<String> = row.try_get("order_id").map_err(db_err)?;

    Ok(LedgerEntry {
        id: row.try_get("id").map_err(db_err)?,
        timestamp: ts_from_db(&row.try_get::<String, _>("timestamp").map_err(db_err)?)?,
        decision: Decision {
            action: parse_enum(
                &row.try_get::<String, _>("action").map_err(db_err)?,
                "action",
            )?,
            confidence: row.try_get("confidence").map_err(db_err)?,
            risk_tier: parse_enum(
                &row.try_get::<String, _>("risk_tier").map_err(db_err)?,
                "risk_tier",
            )?,
            rationale: row.try_get("rationale").map_err(db_err)?,
            expected_range: ExpectedRange {
                min: dec_from_db(
                    &row.try_get::<String, _>("expected_min").map_err(db_err)?,
                    "expected_min",
                )?,
                max: dec_from_db(
                    &row.try_get::<String, _>("expected_max").map_err(db_err)?,
                    "expected_max",
                )?,
            },
            key_indicators: json_from_db(row.try_get("key_indicators").map_err(db_err)?),
            chart_analysis: json_from_db(row.try_get("chart_analysis").map_err(db_err)?),
        },
        result: ExecutionResult {
            action: parse_enum(
                &row.try_get::<String, _>("action_taken").map_err(db_err)?,
                "action_taken",
            )?,
            price: dec_from_db(&row.try_get::<String, _>("price").map_err(db_err)?, "price")?,
            quantity: dec_from_db(
                &row.try_get::<String, _>("quantity").map_err(db_err)?,
                "quantity",
            )?,
            notional_value: dec_from_db(
                &row.try_get::<String, _>("notional_value").map_err(db_err)?,
                "notional_value",
            )?,
            fee: dec_from_db(&row.try_get::<String, _>("fee").map_err(db_err)?, "fee")?,
            order_id,
            outcome: parse_enum(
                &row.try_get::<String, _>("outcome").map_err(db_err)?,
                "outcome",
            )?,
        },
        account_before: AccountSnapshot {
            cash_balance: dec_from_db(
                &row.try_get::<String, _>("cash_balance").map_err(db_err)?,
                "cash_balance",
            )?,
            asset_balance: dec_from_db(
                &row.try_get::<String, _>("asset_balance").map_err(db_err)?,
                "asset_balance",
            )?,
            asset_average_price: dec_from_db(
                &row.try_get::<String, _>("asset_average_price")
                    .map_err(db_err)?,
                "asset_average_price",
            )?,
            mark_price: dec_from_db(
                &row.try_get::<String, _>("mark_price").map_err(db_err)?,
                "mark_price",
            )?,
        },
        trend: trend.map(|t| parse_enum(&t, "trend")).transpose()?,
    })
}

fn row_to_reflection(row: &sqlx::sqlite::SqliteRow) -> Result<Reflection, SageError> {
    Ok(Reflection {
        id: row.try_get("id").map_err(db_err)?,
        ledger_entry_id: row.try_get("ledger_entry_id").map_err(db_err)?,
        kind: parse_enum(&row.try_get::<String, _>("kind").map_err(db_err)?, "kind")?,
        performance_score: row.try_get("performance_score").map_err(db_err)?,
        pnl: dec_from_db(&row.try_get::<String, _>("pnl").map_err(db_err)?, "pnl")?,
        pnl_percent: row.try_get("pnl_percent").map_err(db_err)?,
        decision_quality_score: row.try_get("decision_quality_score").map_err(db_err)?,
        timing_score: row.try_get("timing_score").map_err(db_err)?,
        risk_management_score: row.try_get("risk_management_score").map_err(db_err)?,
        narrative: row.try_get("narrative").map_err(db_err)?,
        suggestions: row.try_get("suggestions").map_err(db_err)?,
        period_start: ts_from_db(&row.try_get::<String, _>("period_start").map_err(db_err)?)?,
        period_end: ts_from_db(&row.try_get::<String, _>("period_end").map_err(db_err)?)?,
    })
}

fn row_to_window(row: &sqlx::sqlite::SqliteRow) -> Result<PerformanceWindow, SageError> {
    Ok(PerformanceWindow {
        id: row.try_get("id").map_err(db_err)?,
        period_kind: parse_enum(
            &row.try_get::<String, _>("period_kind").map_err(db_err)?,
            "period_kind",
        )?,
        period_start: ts_from_db(&row.try_get::<String, _>("period_start").map_err(db_err)?)?,
        period_end: ts_from_db(&row.try_get::<String, _>("period_end").map_err(db_err)?)?,
        total_trades: row.try_get::<i64, _>("total_trades").map_err(db_err)? as u32,
        winning_trades: row.try_get::<i64, _>("winning_trades").map_err(db_err)? as u32,
        losing_trades: row.try_get::<i64, _>("losing_trades").map_err(db_err)? as u32,
        win_rate: row.try_get("win_rate").map_err(db_err)?,
        total_pnl: dec_from_db(
            &row.try_get::<String, _>("total_pnl").map_err(db_err)?,
            "total_pnl",
        )?,
        total_pnl_percent: row.try_get("total_pnl_percent").map_err(db_err)?,
        max_drawdown: row.try_get("max_drawdown").map_err(db_err)?,
        sharpe_ratio: row.try_get("sharpe_ratio").map_err(db_err)?,
    })
}

// ---------------------------------------------------------------------------
// LedgerStore impl
// ---------------------------------------------------------------------------

#[async_trait]
impl LedgerStore for SqliteStore {
    async fn append_entry(&self, entry: &LedgerEntry) -> Result<i64, SageError> {
        let result = sqlx::query(
            "INSERT INTO ledger_entries (
                timestamp, action, confidence, risk_tier, rationale,
                expected_min, expected_max, key_indicators, chart_analysis,
                action_taken, price, quantity, notional_value, fee,
                order_id, outcome, cash_balance, asset_balance,
                asset_average_price, mark_price, trend
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(ts_to_db(&entry.timestamp))
        .bind(entry.decision.action.to_string())
        .bind(entry.decision.confidence)
        .bind(entry.decision.risk_tier.to_string())
        .bind(&entry.decision.rationale)
        .bind(entry.decision.expected_range.min.to_string())
        .bind(entry.decision.expected_range.max.to_string())
        .bind(json_to_db(&entry.decision.key_indicators))
        .bind(json_to_db(&entry.decision.chart_analysis))
        .bind(entry.result.action.to_string())
        .bind(entry.result.price.to_string())
        .bind(entry.result.quantity.to_string())
        .bind(entry.result.notional_value.to_string())
        .bind(entry.result.fee.to_string())
        .bind(entry.result.order_id.as_deref())
        .bind(entry.result.outcome.to_string())
        .bind(entry.account_before.cash_balance.to_string())
        .bind(entry.account_before.asset_balance.to_string())
        .bind(entry.account_before.asset_average_price.to_string())
        .bind(entry.account_before.mark_price.to_string())
        .bind(entry.trend.map(|t| t.to_string()))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.last_insert_rowid())
    }

    async fn entries_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>, SageError> {
        let rows = sqlx::query(
            "SELECT * FROM ledger_entries
             WHERE timestamp >= ? AND timestamp < ?
             ORDER BY timestamp ASC",
        )
        .bind(ts_to_db(&start))
        .bind(ts_to_db(&end))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_entry).collect()
    }

    async fn recent_entries(&self, limit: u32) -> Result<Vec<LedgerEntry>, SageError> {
        let rows = sqlx::query(
            "SELECT * FROM ledger_entries ORDER BY timestamp DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_entry).collect()
    }

    async fn append_reflection(&self, reflection: &Reflection) -> Result<i64, SageError> {
        let result = sqlx::query(
            "INSERT INTO reflections (
                ledger_entry_id, kind, performance_score, pnl, pnl_percent,
                decision_quality_score, timing_score, risk_management_score,
                narrative, suggestions, period_start, period_end
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(reflection.ledger_entry_id)
        .bind(reflection.kind.to_string())
        .bind(reflection.performance_score)
        .bind(reflection.pnl.to_string())
        .bind(reflection.pnl_percent)
        .bind(reflection.decision_quality_score)
        .bind(reflection.timing_score)
        .bind(reflection.risk_management_score)
        .bind(&reflection.narrative)
        .bind(&reflection.suggestions)
        .bind(ts_to_db(&reflection.period_start))
        .bind(ts_to_db(&reflection.period_end))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.last_insert_rowid())
    }

    async fn recent_reflections(&self, limit: u32) -> Result<Vec<Reflection>, SageError> {
        let rows = sqlx::query("SELECT * FROM reflections ORDER BY id DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.iter().map(row_to_reflection).collect()
    }

    async fn reflections_for_entry(&self, entry_id: i64) -> Result<Vec<Reflection>, SageError> {
        let rows = sqlx::query(
            "SELECT * FROM reflections WHERE ledger_entry_id = ? ORDER BY id ASC",
        )
        .bind(entry_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_reflection).collect()
    }

    async fn append_window(&self, window: &PerformanceWindow) -> Result<i64, SageError> {
        let result = sqlx::query(
            "INSERT INTO performance_windows (
                period_kind, period_start, period_end, total_trades,
                winning_trades, losing_trades, win_rate, total_pnl,
                total_pnl_percent, max_drawdown, sharpe_ratio
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(window.period_kind.to_string())
        .bind(ts_to_db(&window.period_start))
        .bind(ts_to_db(&window.period_end))
        .bind(window.total_trades as i64)
        .bind(window.winning_trades as i64)
        .bind(window.losing_trades as i64)
        .bind(window.win_rate)
        .bind(window.total_pnl.to_string())
        .bind(window.total_pnl_percent)
        .bind(window.max_drawdown)
        .bind(window.sharpe_ratio)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.last_insert_rowid())
    }

    async fn windows_by_kind(
        &self,
        kind: PeriodKind,
        limit: u32,
    ) -> Result<Vec<PerformanceWindow>, SageError> {
        let rows = sqlx::query(
            "SELECT * FROM performance_windows
             WHERE period_kind = ? ORDER BY period_start DESC LIMIT ?",
        )
        .bind(kind.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_window).collect()
    }

    async fn append_insight(&self, insight: &LearningInsight) -> Result<i64, SageError> {
        let result = sqlx::query(
            "INSERT INTO learning_insights (
                kind, title, description, confidence, priority, status
            ) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(insight.kind.to_string())
        .bind(&insight.title)
        .bind(&insight.description)
        .bind(insight.confidence)
        .bind(insight.priority.to_string())
        .bind(insight.status.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.last_insert_rowid())
    }

    async fn recent_insights(&self, limit: u32) -> Result<Vec<LearningInsight>, SageError> {
        let rows = sqlx::query("SELECT * FROM learning_insights ORDER BY id DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                Ok(LearningInsight {
                    id: row.try_get("id").map_err(db_err)?,
                    kind: serde_str(&row.try_get::<String, _>("kind").map_err(db_err)?)?,
                    title: row.try_get("title").map_err(db_err)?,
                    description: row.try_get("description").map_err(db_err)?,
                    confidence: row.try_get("confidence").map_err(db_err)?,
                    priority: serde_str(&row.try_get::<String, _>("priority").map_err(db_err)?)?,
                    status: serde_str(&row.try_get::<String, _>("status").map_err(db_err)?)?,
                })
            })
            .collect()
    }

    async fn append_improvement(
        &self,
        improvement: &StrategyImprovement,
    ) -> Result<i64, SageError> {
        let result = sqlx::query(
            "INSERT INTO strategy_improvements (
                kind, old_value, new_value, reason, expected_impact, status
            ) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(improvement.kind.to_string())
        .bind(&improvement.old_value)
        .bind(&improvement.new_value)
        .bind(&improvement.reason)
        .bind(&improvement.expected_impact)
        .bind(improvement.status.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.last_insert_rowid())
    }

    async fn recent_improvements(
        &self,
        limit: u32,
    ) -> Result<Vec<StrategyImprovement>, SageError> {
        let rows = sqlx::query("SELECT * FROM strategy_improvements ORDER BY id DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                Ok(StrategyImprovement {
                    id: row.try_get("id").map_err(db_err)?,
                    kind: serde_str(&row.try_get::<String, _>("kind").map_err(db_err)?)?,
                    old_value: row.try_get("old_value").map_err(db_err)?,
                    new_value: row.try_get("new_value").map_err(db_err)?,
                    reason: row.try_get("reason").map_err(db_err)?,
                    expected_impact: row.try_get("expected_impact").map_err(db_err)?,
                    status: serde_str(&row.try_get::<String, _>("status").map_err(db_err)?)?,
                })
            })
            .collect()
    }
}

/// Parse a lowercase serde token stored as TEXT back into its enum.
fn serde_str<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, SageError> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|e| SageError::Persistence(format!("bad enum value {raw:?}: {e}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
