//! End-to-end cycle simulations.
//!
//! Drive full read -> decide -> execute -> record -> reflect cycles
//! against the paper exchange and scripted oracle, then check the
//! ledger trail, the solvency invariant, and the periodic reflection
//! aggregates.

use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use sage::config::TradingConfig;
use sage::engine::cycle::CycleRunner;
use sage::exchange::paper::PaperExchange;
use sage::exchange::Exchange;
use sage::reflection::ReflectionEngine;
use sage::scheduler::Scheduler;
use sage::storage::memory::MemoryStore;
use sage::storage::sqlite::SqliteStore;
use sage::storage::LedgerStore;
use sage::types::{Action, ActionTaken, Outcome, PeriodKind, SageError};

use super::mock::{make_decision, MockOracle};

fn make_paper(cash: Decimal) -> Arc<PaperExchange> {
    Arc::new(PaperExchange::new(cash, dec!(50000000), dec!(0.0005)))
}

fn make_runner(
    paper: Arc<PaperExchange>,
    oracle: Arc<MockOracle>,
    store: Arc<dyn LedgerStore>,
) -> CycleRunner {
    CycleRunner::new(paper.clone(), paper, oracle, store, &TradingConfig::default())
}

#[tokio::test]
async fn test_buy_hold_sell_round_trip() {
    let paper = make_paper(dec!(1000000));
    let store = Arc::new(MemoryStore::new());
    let oracle = MockOracle::new();
    oracle.push(Ok(make_decision(Action::Buy, 0.8)));
    oracle.push(Ok(make_decision(Action::Hold, 0.6)));
    oracle.push(Ok(make_decision(Action::Sell, 0.7)));
    let runner = make_runner(paper.clone(), oracle.clone(), store.clone());

    for cycle in 1..=3 {
        runner.run_cycle(cycle).await.unwrap();
    }

    assert_eq!(oracle.call_count(), 3);
    assert_eq!(store.entry_count(), 3);
    assert_eq!(store.reflection_count(), 3);

    let entries = store.recent_entries(10).await.unwrap();
    let actions: Vec<ActionTaken> = entries.iter().rev().map(|e| e.result.action).collect();
    assert_eq!(
        actions,
        vec![ActionTaken::Buy, ActionTaken::Hold, ActionTaken::Sell]
    );

    // Solvency invariant: no execution path produced a negative balance.
    let after = paper.account_snapshot().await.unwrap();
    assert!(after.cash_balance >= Decimal::ZERO);
    assert!(after.asset_balance >= Decimal::ZERO);

    // Every cycle left an observable outcome — no silent cycles.
    assert!(entries.iter().all(|e| e.result.outcome == Outcome::Executed));
}

#[tokio::test]
async fn test_each_cycle_reads_fresh_account_state() {
    let paper = make_paper(dec!(1000000));
    let store = Arc::new(MemoryStore::new());
    let oracle = MockOracle::new();
    oracle.push(Ok(make_decision(Action::Buy, 0.8)));
    oracle.push(Ok(make_decision(Action::Buy, 0.8)));
    let runner = make_runner(paper.clone(), oracle, store.clone());

    runner.run_cycle(1).await.unwrap();
    runner.run_cycle(2).await.unwrap();

    let entries = store.recent_entries(10).await.unwrap();
    // Cycle 2's snapshot reflects cycle 1's spend (record happens-before
    // the next account read).
    let first_cash = entries[1].account_before.cash_balance;
    let second_cash = entries[0].account_before.cash_balance;
    assert_eq!(first_cash, dec!(1000000));
    assert!(second_cash < first_cash);
}

#[tokio::test]
async fn test_rejected_decision_falls_back_to_hold() {
    let paper = make_paper(dec!(1000000));
    let store = Arc::new(MemoryStore::new());
    let oracle = MockOracle::new();
    oracle.push(Ok(make_decision(Action::Buy, 1.7))); // out of range
    let runner = make_runner(paper.clone(), oracle, store.clone());

    let report = runner.run_cycle(1).await.unwrap();

    assert_eq!(report.action, ActionTaken::Hold);
    assert!(report.fallback_decision);
    assert_eq!(paper.fill_count(), 0);

    let entries = store.recent_entries(1).await.unwrap();
    assert_eq!(entries[0].decision.action, Action::Hold);
    assert!(entries[0].decision.rationale.contains("fallback hold"));
}

#[tokio::test]
async fn test_exchange_rejection_recorded_without_reflection() {
    let paper = make_paper(dec!(1000000));
    paper.force_reject("market suspended");
    let store = Arc::new(MemoryStore::new());
    let oracle = MockOracle::new();
    oracle.push(Ok(make_decision(Action::Buy, 0.8)));
    let runner = make_runner(paper, oracle, store.clone());

    let report = runner.run_cycle(1).await.unwrap();

    // The rejection is terminal for the cycle: it lands in the ledger
    // with its reason, and only executed-or-held entries reflect.
    assert_eq!(report.outcome, Outcome::RejectedByExchange);
    assert!(report.performance_score.is_none());
    assert_eq!(store.entry_count(), 1);
    assert_eq!(store.reflection_count(), 0);
}

#[tokio::test]
async fn test_periodic_reflection_over_simulated_history() {
    let paper = make_paper(dec!(1000000));
    let store = Arc::new(MemoryStore::new());
    let oracle = MockOracle::new();
    oracle.push(Ok(make_decision(Action::Buy, 0.8)));
    oracle.push(Ok(make_decision(Action::Sell, 0.7)));
    let runner = make_runner(paper.clone(), oracle, store.clone());

    runner.run_cycle(1).await.unwrap();
    // Let the position appreciate before the sell.
    paper.set_mark_price(dec!(55000000));
    runner.run_cycle(2).await.unwrap();

    let engine = ReflectionEngine::new(store.clone());
    let start = Utc::now() - ChronoDuration::hours(1);
    let end = Utc::now() + ChronoDuration::hours(1);
    let window = engine
        .run_periodic(PeriodKind::Daily, start, end)
        .await
        .unwrap();

    // The buy opens flat and pays its fee (a small loss); the sell
    // realizes the appreciation (a win).
    assert_eq!(window.total_trades, 2);
    assert_eq!(window.winning_trades, 1);
    assert_eq!(window.losing_trades, 1);
    assert!((window.win_rate - 0.5).abs() < 1e-10);
    assert!(window.total_pnl > Decimal::ZERO);

    // Fan-out: immediate rows from the cycles plus one periodic row
    // per entry.
    assert_eq!(store.reflection_count(), 4);
}

#[tokio::test]
async fn test_periodic_window_without_entries_is_noop() {
    let store = Arc::new(MemoryStore::new());
    let engine = ReflectionEngine::new(store.clone());

    let start = Utc::now() - ChronoDuration::days(2);
    let end = start + ChronoDuration::days(1);
    let window = engine
        .run_periodic(PeriodKind::Daily, start, end)
        .await
        .unwrap();

    assert_eq!(window.total_trades, 0);
    assert_eq!(window.win_rate, 0.0);
    assert_eq!(store.reflection_count(), 0);
}

#[tokio::test]
async fn test_full_cycle_against_sqlite() {
    let paper = make_paper(dec!(1000000));
    let store = Arc::new(SqliteStore::connect("sqlite::memory:").await.unwrap());
    let oracle = MockOracle::new();
    oracle.push(Ok(make_decision(Action::Buy, 0.8)));
    let runner = make_runner(paper, oracle, store.clone());

    let report = runner.run_cycle(1).await.unwrap();
    assert_eq!(report.outcome, Outcome::Executed);

    let entries = store.recent_entries(10).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].result.action, ActionTaken::Buy);

    let reflections = store.reflections_for_entry(entries[0].id).await.unwrap();
    assert_eq!(reflections.len(), 1);
    assert!(reflections[0].performance_score >= 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_runs_cycles_on_interval() {
    let paper = make_paper(dec!(1000000));
    let store = Arc::new(MemoryStore::new());
    let oracle = MockOracle::new();
    // Script exhausts into holds — every cycle succeeds.
    let runner = make_runner(paper, oracle, store.clone());
    let scheduler = Scheduler::new(runner, TradingConfig::default());

    // Default interval 300s; the first cycle fires immediately, then
    // at t=300 and t=600. Shutdown lands at t=650.
    let cycles = scheduler
        .run(tokio::time::sleep(std::time::Duration::from_secs(650)))
        .await;

    assert_eq!(cycles, 3);
    assert_eq!(store.entry_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_survives_cycle_failure_with_cooldown() {
    let paper = make_paper(dec!(1000000));
    let store = Arc::new(MemoryStore::new());
    let oracle = MockOracle::new();
    oracle.push(Err(SageError::Oracle {
        model: "mock".into(),
        message: "503".into(),
    }));
    let runner = make_runner(paper, oracle.clone(), store.clone());
    let scheduler = Scheduler::new(runner, TradingConfig::default());

    // Cycle 1 fails at t=0 (cooldown 60s), cycle 2 holds at t=300.
    let cycles = scheduler
        .run(tokio::time::sleep(std::time::Duration::from_secs(350)))
        .await;

    assert_eq!(cycles, 2);
    // Only the successful cycle reached the ledger; the failure was
    // contained by the scheduler.
    assert_eq!(store.entry_count(), 1);
    assert_eq!(oracle.call_count(), 2);
}

#[tokio::test]
async fn test_shutdown_waits_for_in_flight_ledger_write() {
    let paper = make_paper(dec!(1000000));
    let store = Arc::new(MemoryStore::new());
    let oracle = MockOracle::new();
    oracle.push(Ok(make_decision(Action::Buy, 0.8)));
    let runner = make_runner(paper, oracle, store.clone());
    let scheduler = Scheduler::new(runner, TradingConfig::default());

    // Shutdown is already resolved when the loop starts; the first
    // tick still races it. Whichever way the race goes, a counted
    // cycle is a recorded cycle — never an executed-but-unrecorded one.
    let cycles = scheduler.run(async {}).await;
    assert_eq!(store.entry_count() as u64, cycles);
}
