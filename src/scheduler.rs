//! Cycle scheduler.
//!
//! Two independent timer sets that never block each other:
//! - the trading-cycle loop, firing every `analysis_interval_secs` and
//!   running exactly one cycle to completion before re-arming (a failed
//!   cycle is logged and followed by a shorter cooldown — a single
//!   cycle's failure never takes the process down);
//! - one task per reflection cadence (daily / weekly / monthly), each
//!   computing its own half-open `[start, end)` window relative to the
//!   moment it fires.
//!
//! Shutdown is observed between cycles only, so an in-flight cycle's
//! ledger write always completes before the loop exits. Triggers
//! missed while the process was down are not backfilled.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::{ReflectionConfig, TradingConfig};
use crate::engine::cycle::CycleRunner;
use crate::reflection::ReflectionEngine;
use crate::storage::LedgerStore;
use crate::types::PeriodKind;

// ---------------------------------------------------------------------------
// Calendar windows
// ---------------------------------------------------------------------------

/// The previous calendar day as a half-open `[start, end)` window.
pub fn daily_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let today = now.date_naive().and_time(NaiveTime::MIN).and_utc();
    (today - ChronoDuration::days(1), today)
}

/// The previous Monday-to-Sunday week as a half-open window ending on
/// the most recent Monday midnight.
pub fn weekly_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let days_from_monday = now.weekday().num_days_from_monday() as i64;
    let this_monday = (now.date_naive() - ChronoDuration::days(days_from_monday))
        .and_time(NaiveTime::MIN)
        .and_utc();
    (this_monday - ChronoDuration::weeks(1), this_monday)
}

/// The previous calendar month as a half-open window.
pub fn monthly_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let first_of_this = now
        .date_naive()
        .with_day(1)
        .expect("day 1 is always valid")
        .and_time(NaiveTime::MIN)
        .and_utc();
    let first_of_previous = if now.month() == 1 {
        first_of_this
            .date_naive()
            .with_year(now.year() - 1)
            .and_then(|d| d.with_month(12))
            .expect("december 1 is always valid")
    } else {
        first_of_this
            .date_naive()
            .with_month(now.month() - 1)
            .expect("day 1 of any month is valid")
    }
    .and_time(NaiveTime::MIN)
    .and_utc();
    (first_of_previous, first_of_this)
}

/// Window for a cadence, relative to the moment the trigger fired.
pub fn window_for(kind: PeriodKind, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    match kind {
        PeriodKind::Daily => daily_window(now),
        PeriodKind::Weekly => weekly_window(now),
        PeriodKind::Monthly => monthly_window(now),
    }
}

// ---------------------------------------------------------------------------
// Trigger times
// ---------------------------------------------------------------------------

/// Next daily trigger at `hour`:00 UTC, strictly after `now`.
pub fn next_daily_trigger(now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let candidate = now
        .date_naive()
        .and_hms_opt(hour, 0, 0)
        .expect("validated trigger hour")
        .and_utc();
    if candidate > now {
        candidate
    } else {
        candidate + ChronoDuration::days(1)
    }
}

/// Next Monday at `hour`:00 UTC, strictly after `now`.
pub fn next_weekly_trigger(now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let days_from_monday = now.weekday().num_days_from_monday() as i64;
    let candidate = (now.date_naive() - ChronoDuration::days(days_from_monday))
        .and_hms_opt(hour, 0, 0)
        .expect("validated trigger hour")
        .and_utc();
    if candidate > now {
        candidate
    } else {
        candidate + ChronoDuration::weeks(1)
    }
}

/// Next first-of-month at `hour`:00 UTC, strictly after `now`.
pub fn next_monthly_trigger(now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let first_of_this = now
        .date_naive()
        .with_day(1)
        .expect("day 1 is always valid")
        .and_hms_opt(hour, 0, 0)
        .expect("validated trigger hour")
        .and_utc();
    if first_of_this > now {
        return first_of_this;
    }
    let next = if now.month() == 12 {
        first_of_this
            .date_naive()
            .with_year(now.year() + 1)
            .and_then(|d| d.with_month(1))
    } else {
        first_of_this.date_naive().with_month(now.month() + 1)
    };
    next.expect("day 1 of any month is valid")
        .and_hms_opt(hour, 0, 0)
        .expect("validated trigger hour")
        .and_utc()
}

pub fn next_trigger(kind: PeriodKind, now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    match kind {
        PeriodKind::Daily => next_daily_trigger(now, hour),
        PeriodKind::Weekly => next_weekly_trigger(now, hour),
        PeriodKind::Monthly => next_monthly_trigger(now, hour),
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub struct Scheduler {
    runner: CycleRunner,
    trading: TradingConfig,
}

impl Scheduler {
    pub fn new(runner: CycleRunner, trading: TradingConfig) -> Self {
        Self { runner, trading }
    }

    /// Drive the trading loop until `shutdown` resolves.
    ///
    /// The first cycle fires immediately; after that the loop re-arms
    /// every `analysis_interval_secs`. A failed cycle adds the shorter
    /// cooldown before the next arm. Returns the number of cycles run.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> u64 {
        let interval = Duration::from_secs(self.trading.analysis_interval_secs);
        let cooldown = Duration::from_secs(self.trading.cycle_cooldown_secs);
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut cycle_count: u64 = 0;
        tokio::pin!(shutdown);

        info!(
            interval_secs = self.trading.analysis_interval_secs,
            cooldown_secs = self.trading.cycle_cooldown_secs,
            "Trading scheduler armed"
        );

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    cycle_count += 1;
                    if let Err(e) = self.runner.run_cycle(cycle_count).await {
                        error!(
                            cycle = cycle_count,
                            error = %e,
                            cooldown_secs = self.trading.cycle_cooldown_secs,
                            "Cycle failed — cooling down before next attempt"
                        );
                        tokio::time::sleep(cooldown).await;
                    }
                }
                _ = &mut shutdown => {
                    info!(cycles = cycle_count, "Shutdown observed between cycles");
                    break;
                }
            }
        }

        cycle_count
    }
}

/// Spawn one independent timer task per enabled reflection cadence.
///
/// Each task sleeps until its next calendar trigger, aggregates the
/// just-closed window, and re-arms. Failures are logged; the task keeps
/// running. Triggers missed while the process was down are not
/// backfilled.
pub fn spawn_reflection_timers(
    store: Arc<dyn LedgerStore>,
    cfg: &ReflectionConfig,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();
    let enabled: Vec<PeriodKind> = PeriodKind::ALL
        .iter()
        .copied()
        .filter(|kind| match kind {
            PeriodKind::Daily => cfg.daily,
            PeriodKind::Weekly => cfg.weekly,
            PeriodKind::Monthly => cfg.monthly,
        })
        .collect();

    for kind in enabled {
        let engine = ReflectionEngine::new(store.clone());
        let hour = cfg.trigger_hour;

        info!(%kind, hour, "Reflection timer armed (missed triggers are not backfilled)");

        handles.push(tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let next = next_trigger(kind, now, hour);
                let wait = (next - now)
                    .to_std()
                    .unwrap_or_else(|_| Duration::from_secs(0));
                tokio::time::sleep(wait).await;

                let fired_at = Utc::now();
                let (start, end) = window_for(kind, fired_at);
                match engine.run_periodic(kind, start, end).await {
                    Ok(window) => {
                        info!(%kind, %window, "Periodic reflection run finished");
                    }
                    Err(e) => {
                        warn!(%kind, error = %e, "Periodic reflection run failed");
                    }
                }
            }
        }));
    }

    handles
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
