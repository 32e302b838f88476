//! API route handlers.
//!
//! All endpoints return JSON read from the ledger store. State is
//! shared via `Arc`.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;

use crate::storage::LedgerStore;
use crate::types::{
    LearningInsight, LedgerEntry, PerformanceWindow, PeriodKind, Reflection, SageError,
    StrategyImprovement,
};

/// Shared state accessible by all route handlers.
pub struct ApiState {
    pub store: Arc<dyn LedgerStore>,
}

pub type AppState = Arc<ApiState>;

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 500;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct LedgerParams {
    limit: Option<u32>,
    /// RFC 3339 range bounds; when both are present the response is
    /// the half-open `[start, end)` slice instead of the recent list.
    start: Option<chrono::DateTime<chrono::Utc>>,
    end: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct WindowParams {
    kind: Option<String>,
    limit: Option<u32>,
}

fn clamp_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT)
}

fn internal(e: SageError) -> StatusCode {
    error!(error = %e, "Query failed");
    StatusCode::INTERNAL_SERVER_ERROR
}

/// GET /api/ledger?limit=N or ?start=..&end=..
pub async fn get_ledger(
    State(state): State<AppState>,
    Query(params): Query<LedgerParams>,
) -> Result<Json<Vec<LedgerEntry>>, StatusCode> {
    match (params.start, params.end) {
        (Some(start), Some(end)) => {
            if start >= end {
                return Err(StatusCode::BAD_REQUEST);
            }
            state
                .store
                .entries_between(start, end)
                .await
                .map(Json)
                .map_err(internal)
        }
        (None, None) => state
            .store
            .recent_entries(clamp_limit(params.limit))
            .await
            .map(Json)
            .map_err(internal),
        _ => Err(StatusCode::BAD_REQUEST),
    }
}

/// GET /api/reflections?limit=N
pub async fn get_reflections(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Reflection>>, StatusCode> {
    state
        .store
        .recent_reflections(clamp_limit(params.limit))
        .await
        .map(Json)
        .map_err(internal)
}

/// GET /api/windows?kind=daily&limit=N
pub async fn get_windows(
    State(state): State<AppState>,
    Query(params): Query<WindowParams>,
) -> Result<Json<Vec<PerformanceWindow>>, StatusCode> {
    let limit = clamp_limit(params.limit);

    match params.kind.as_deref() {
        Some(raw) => {
            let kind: PeriodKind = raw.parse().map_err(|_| StatusCode::BAD_REQUEST)?;
            state
                .store
                .windows_by_kind(kind, limit)
                .await
                .map(Json)
                .map_err(internal)
        }
        None => {
            // All cadences interleaved, newest windows first.
            let mut all = Vec::new();
            for kind in PeriodKind::ALL {
                let mut windows = state
                    .store
                    .windows_by_kind(*kind, limit)
                    .await
                    .map_err(internal)?;
                all.append(&mut windows);
            }
            all.sort_by(|a, b| b.period_start.cmp(&a.period_start));
            all.truncate(limit as usize);
            Ok(Json(all))
        }
    }
}

/// GET /api/insights?limit=N
pub async fn get_insights(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<LearningInsight>>, StatusCode> {
    state
        .store
        .recent_insights(clamp_limit(params.limit))
        .await
        .map(Json)
        .map_err(internal)
}

/// GET /api/improvements?limit=N
pub async fn get_improvements(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<StrategyImprovement>>, StatusCode> {
    state
        .store
        .recent_improvements(clamp_limit(params.limit))
        .await
        .map(Json)
        .map_err(internal)
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;
    use crate::types::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn make_state(store: Arc<MemoryStore>) -> AppState {
        Arc::new(ApiState { store })
    }

    fn make_entry() -> LedgerEntry {
        LedgerEntry {
            id: 0,
            timestamp: Utc::now(),
            decision: Decision::fallback_hold("test"),
            result: ExecutionResult {
                action: ActionTaken::Hold,
                price: dec!(50000000),
                quantity: Decimal::ZERO,
                notional_value: Decimal::ZERO,
                fee: Decimal::ZERO,
                order_id: None,
                outcome: Outcome::Executed,
            },
            account_before: AccountSnapshot {
                cash_balance: dec!(100000),
                asset_balance: Decimal::ZERO,
                asset_average_price: Decimal::ZERO,
                mark_price: dec!(50000000),
            },
            trend: None,
        }
    }

    fn ledger_params(limit: Option<u32>) -> LedgerParams {
        LedgerParams {
            limit,
            start: None,
            end: None,
        }
    }

    #[tokio::test]
    async fn test_get_ledger_returns_entries() {
        let store = Arc::new(MemoryStore::new());
        store.append_entry(&make_entry()).await.unwrap();
        let state = make_state(store);

        let Json(entries) = get_ledger(State(state), Query(ledger_params(None)))
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_get_ledger_respects_limit() {
        let store = Arc::new(MemoryStore::new());
        for _ in 0..5 {
            store.append_entry(&make_entry()).await.unwrap();
        }
        let state = make_state(store);

        let Json(entries) = get_ledger(State(state), Query(ledger_params(Some(2))))
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn test_get_ledger_range_query() {
        let store = Arc::new(MemoryStore::new());
        store.append_entry(&make_entry()).await.unwrap();
        let state = make_state(store);

        let now = Utc::now();
        let Json(entries) = get_ledger(
            State(state.clone()),
            Query(LedgerParams {
                limit: None,
                start: Some(now - chrono::Duration::hours(1)),
                end: Some(now + chrono::Duration::hours(1)),
            }),
        )
        .await
        .unwrap();
        assert_eq!(entries.len(), 1);

        // Inverted bounds are rejected.
        let result = get_ledger(
            State(state),
            Query(LedgerParams {
                limit: None,
                start: Some(now),
                end: Some(now - chrono::Duration::hours(1)),
            }),
        )
        .await;
        assert_eq!(result.unwrap_err(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_windows_bad_kind_is_400() {
        let state = make_state(Arc::new(MemoryStore::new()));
        let result = get_windows(
            State(state),
            Query(WindowParams {
                kind: Some("hourly".into()),
                limit: None,
            }),
        )
        .await;
        assert_eq!(result.unwrap_err(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_windows_by_kind() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        store
            .append_window(&PerformanceWindow::empty(
                PeriodKind::Daily,
                now - chrono::Duration::days(1),
                now,
            ))
            .await
            .unwrap();
        let state = make_state(store);

        let Json(windows) = get_windows(
            State(state.clone()),
            Query(WindowParams {
                kind: Some("daily".into()),
                limit: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(windows.len(), 1);

        let Json(none) = get_windows(
            State(state),
            Query(WindowParams {
                kind: Some("weekly".into()),
                limit: None,
            }),
        )
        .await
        .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_maps_to_500() {
        let store = Arc::new(MemoryStore::new());
        store.set_error("backend down");
        let state = make_state(store);

        let result = get_ledger(State(state), Query(ledger_params(None))).await;
        assert_eq!(result.unwrap_err(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_health() {
        assert_eq!(health().await, StatusCode::OK);
    }
}
