//! Reflection scoring.
//!
//! Pure functions: per-entry P&L attribution, the four reflection
//! scores, and window-level aggregate metrics. All scoring weights are
//! named constants — they are heuristics, tunable, not calibrated
//! truths.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::types::{
    Action, ActionTaken, LedgerEntry, MarketTrend, PerformanceWindow, PeriodKind,
};
use chrono::{DateTime, Utc};

// ---------------------------------------------------------------------------
// Tunable weights
// ---------------------------------------------------------------------------

/// Starting point of the performance score.
pub const BASE_SCORE: f64 = 0.5;
/// Added when the cycle's P&L is positive.
pub const PROFIT_BONUS: f64 = 0.3;
/// Subtracted when the cycle's P&L is negative.
pub const LOSS_PENALTY: f64 = 0.2;
/// How strongly the oracle's stated confidence shifts the score.
pub const CONFIDENCE_WEIGHT: f64 = 0.2;

/// Decision quality when action and trend agree.
pub const AGREEMENT_SCORE: f64 = 0.8;
/// Decision quality when action and trend directly disagree.
pub const DISAGREEMENT_SCORE: f64 = 0.2;
/// Decision quality when the comparison is indeterminate.
pub const NEUTRAL_SCORE: f64 = 0.5;

/// Scales how hard exposure x volatility drags the risk score down.
pub const RISK_SCALE: f64 = 5.0;

// ---------------------------------------------------------------------------
// Per-entry P&L
// ---------------------------------------------------------------------------

/// P&L attributed to one ledger entry.
///
/// A sell realizes against the average entry price; a buy or hold is
/// marked against the pre-existing position (minus any fee paid this
/// cycle). Skips and rejections carry zero.
pub fn entry_pnl(entry: &LedgerEntry) -> Decimal {
    let account = &entry.account_before;
    match (entry.result.action, entry.result.outcome) {
        (ActionTaken::Sell, crate::types::Outcome::Executed) => {
            if account.asset_average_price > Decimal::ZERO {
                (entry.result.price - account.asset_average_price) * entry.result.quantity
                    - entry.result.fee
            } else {
                -entry.result.fee
            }
        }
        (ActionTaken::Buy, crate::types::Outcome::Executed) => {
            account.unrealized_pnl() - entry.result.fee
        }
        (ActionTaken::Hold, _) => account.unrealized_pnl(),
        _ => Decimal::ZERO,
    }
}

/// P&L as a percentage of the invested basis; 0 when there is no basis.
pub fn entry_pnl_percent(entry: &LedgerEntry, pnl: Decimal) -> f64 {
    let account = &entry.account_before;
    let basis = match entry.result.action {
        ActionTaken::Sell => account.asset_average_price * entry.result.quantity,
        _ => account.asset_average_price * account.asset_balance,
    };
    if basis <= Decimal::ZERO {
        return 0.0;
    }
    (pnl / basis).to_f64().unwrap_or(0.0) * 100.0
}

// ---------------------------------------------------------------------------
// Scores
// ---------------------------------------------------------------------------

/// Weighted blend of P&L sign and the oracle's stated confidence,
/// bounded to [0, 1].
pub fn performance_score(pnl: Decimal, confidence: f64) -> f64 {
    let mut score = BASE_SCORE;
    if pnl > Decimal::ZERO {
        score += PROFIT_BONUS;
    } else if pnl < Decimal::ZERO {
        score -= LOSS_PENALTY;
    }
    score += (confidence - 0.5) * CONFIDENCE_WEIGHT;
    score.clamp(0.0, 1.0)
}

/// Agreement between the decided action and the independently derived
/// market-trend label.
pub fn decision_quality_score(action: Action, trend: Option<MarketTrend>) -> f64 {
    let Some(trend) = trend else {
        return NEUTRAL_SCORE;
    };
    match (action, trend) {
        (Action::Buy, MarketTrend::Bullish)
        | (Action::Sell, MarketTrend::Bearish)
        | (Action::Hold, MarketTrend::Neutral) => AGREEMENT_SCORE,
        (Action::Buy, MarketTrend::Bearish) | (Action::Sell, MarketTrend::Bullish) => {
            DISAGREEMENT_SCORE
        }
        _ => NEUTRAL_SCORE,
    }
}

/// Where the entry price sat inside the oracle's expected range:
/// buying near the bottom of the range scores high, selling near the
/// top scores high. Indeterminate (hold, degenerate range) is neutral.
pub fn timing_score(entry: &LedgerEntry) -> f64 {
    let position = entry
        .decision
        .expected_range
        .position_of(entry.result.price);
    match (entry.decision.action, position) {
        (Action::Buy, Some(pos)) => 1.0 - pos,
        (Action::Sell, Some(pos)) => pos,
        _ => NEUTRAL_SCORE,
    }
}

/// Committed exposure scaled by the expected-range width (a volatility
/// proxy): committing most of the account into a wide-ranging market
/// scores low, idle or small commitments score high.
pub fn risk_management_score(entry: &LedgerEntry) -> f64 {
    let equity = entry.account_before.total_equity();
    if equity <= Decimal::ZERO {
        return NEUTRAL_SCORE;
    }
    let exposure = (entry.result.notional_value / equity)
        .to_f64()
        .unwrap_or(0.0);

    let mark = entry.account_before.mark_price;
    let volatility = if mark > Decimal::ZERO {
        (entry.decision.expected_range.width() / mark)
            .to_f64()
            .unwrap_or(0.0)
    } else {
        0.0
    };

    (1.0 - exposure * volatility * RISK_SCALE).clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Window metrics
// ---------------------------------------------------------------------------

/// Aggregate the ordered entries of one half-open window.
pub fn compute_window(
    kind: PeriodKind,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    entries: &[LedgerEntry],
) -> PerformanceWindow {
    let trades: Vec<&LedgerEntry> = entries.iter().filter(|e| e.result.is_trade()).collect();
    if trades.is_empty() {
        return PerformanceWindow::empty(kind, start, end);
    }

    let pnls: Vec<Decimal> = trades.iter().map(|e| entry_pnl(e)).collect();
    let total_trades = trades.len() as u32;
    let winning_trades = pnls.iter().filter(|p| **p > Decimal::ZERO).count() as u32;
    let losing_trades = pnls.iter().filter(|p| **p < Decimal::ZERO).count() as u32;
    let win_rate = winning_trades as f64 / total_trades as f64;

    let total_pnl: Decimal = pnls.iter().sum();
    let total_notional: Decimal = trades.iter().map(|e| e.result.notional_value).sum();
    let total_pnl_percent = if total_notional > Decimal::ZERO {
        (total_pnl / total_notional).to_f64().unwrap_or(0.0) * 100.0
    } else {
        0.0
    };

    PerformanceWindow {
        id: 0,
        period_kind: kind,
        period_start: start,
        period_end: end,
        total_trades,
        winning_trades,
        losing_trades,
        win_rate,
        total_pnl,
        total_pnl_percent,
        max_drawdown: max_drawdown(&pnls, total_notional),
        sharpe_ratio: sharpe_ratio(&pnls),
    }
}

/// Largest peak-to-trough drop of the cumulative P&L curve, as a
/// fraction of the total notional invested. Zero without notional.
pub fn max_drawdown(pnls: &[Decimal], total_notional: Decimal) -> f64 {
    if total_notional <= Decimal::ZERO {
        return 0.0;
    }
    let mut cumulative = Decimal::ZERO;
    let mut peak = Decimal::ZERO;
    let mut worst = Decimal::ZERO;
    for pnl in pnls {
        cumulative += *pnl;
        if cumulative > peak {
            peak = cumulative;
        }
        let drawdown = peak - cumulative;
        if drawdown > worst {
            worst = drawdown;
        }
    }
    (worst / total_notional).to_f64().unwrap_or(0.0)
}

/// Mean over population standard deviation of the per-trade P&L
/// sequence. Zero with fewer than two trades or no variance.
pub fn sharpe_ratio(pnls: &[Decimal]) -> f64 {
    if pnls.len() < 2 {
        return 0.0;
    }
    let values: Vec<f64> = pnls.iter().filter_map(|p| p.to_f64()).collect();
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();
    if std_dev == 0.0 {
        return 0.0;
    }
    mean / std_dev
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
