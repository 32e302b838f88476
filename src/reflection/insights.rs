//! Insight and improvement generation.
//!
//! Pure functions of a performance window (plus the underlying ledger
//! entries): threshold checks trigger canned recommendation templates
//! with an associated priority. Everything produced here is advisory —
//! the execution engine never reads these records.

use crate::types::{
    ImprovementKind, ImprovementStatus, InsightKind, InsightStatus, LearningInsight, LedgerEntry,
    PerformanceWindow, Priority, StrategyImprovement,
};
use rust_decimal::Decimal;

/// Win rate below this proposes tighter entry conditions.
pub const WIN_RATE_FLOOR: f64 = 0.5;
/// Max drawdown above this proposes stronger risk management.
pub const DRAWDOWN_CEILING: f64 = 0.1;

// ---------------------------------------------------------------------------
// Narrative templates
// ---------------------------------------------------------------------------

/// One-paragraph narrative for an immediate reflection.
pub fn entry_narrative(entry: &LedgerEntry, pnl: Decimal) -> String {
    let direction = if pnl > Decimal::ZERO {
        "profitable"
    } else if pnl < Decimal::ZERO {
        "losing"
    } else {
        "flat"
    };
    format!(
        "Cycle decided {} (confidence {:.0}%) and resolved as {}; position was {} at evaluation time.",
        entry.decision.action,
        entry.decision.confidence * 100.0,
        entry.result.outcome,
        direction,
    )
}

/// Suggestions for an immediate reflection, keyed on what the cycle did.
pub fn entry_suggestions(entry: &LedgerEntry, pnl: Decimal) -> String {
    let mut lines = Vec::new();
    if pnl < Decimal::ZERO {
        lines.push("Review entry conditions against the trend label before committing size.");
    }
    if entry.result.is_trade() {
        lines.push("Track the fill against the expected range to validate timing.");
    }
    if lines.is_empty() {
        lines.push("Maintain monitoring and wait for the next opportunity.");
    }
    lines.join("\n")
}

/// Narrative shared by every reflection row of a periodic run.
pub fn window_narrative(window: &PerformanceWindow) -> String {
    format!(
        "{} review: {} trades, win rate {:.0}%, P&L {} ({:+.2}%), max drawdown {:.1}%, Sharpe {:.2}.",
        window.period_kind,
        window.total_trades,
        window.win_rate * 100.0,
        window.total_pnl,
        window.total_pnl_percent,
        window.max_drawdown * 100.0,
        window.sharpe_ratio,
    )
}

/// Threshold-driven suggestion list shared by a periodic run's rows.
pub fn window_suggestions(window: &PerformanceWindow) -> String {
    let mut lines = Vec::new();
    if window.win_rate < WIN_RATE_FLOOR {
        lines.push("Tighten entry conditions to improve the win rate.");
    }
    if window.max_drawdown > DRAWDOWN_CEILING {
        lines.push("Strengthen risk management to reduce drawdown.");
    }
    if window.total_pnl < Decimal::ZERO {
        lines.push("Adjust the exit strategy to improve the profit/loss ratio.");
    }
    if lines.is_empty() {
        lines.push("Current strategy is performing adequately.");
    }
    lines.join("\n")
}

// ---------------------------------------------------------------------------
// Learning insights
// ---------------------------------------------------------------------------

/// Extract pattern observations from a window and its entries.
pub fn derive_insights(
    window: &PerformanceWindow,
    entries: &[LedgerEntry],
) -> Vec<LearningInsight> {
    let mut insights = Vec::new();
    if window.is_empty() {
        return insights;
    }

    if window.winning_trades > 0 {
        insights.push(LearningInsight {
            id: 0,
            kind: InsightKind::Pattern,
            title: "Winning trade pattern".to_string(),
            description: format!(
                "{} of {} trades in the {} window closed positive; the shared entry conditions are worth reinforcing.",
                window.winning_trades, window.total_trades, window.period_kind,
            ),
            confidence: 0.7,
            priority: Priority::High,
            status: InsightStatus::Discovered,
        });
    }

    if window.losing_trades > 0 {
        insights.push(LearningInsight {
            id: 0,
            kind: InsightKind::Pattern,
            title: "Losing trade pattern".to_string(),
            description: format!(
                "{} of {} trades in the {} window closed negative; their entry conditions should gain a filter.",
                window.losing_trades, window.total_trades, window.period_kind,
            ),
            confidence: 0.6,
            priority: Priority::High,
            status: InsightStatus::Discovered,
        });
    }

    let labeled = entries.iter().filter(|e| e.trend.is_some()).count();
    if labeled > 0 {
        insights.push(LearningInsight {
            id: 0,
            kind: InsightKind::Market,
            title: "Market condition performance".to_string(),
            description: format!(
                "{} of {} entries carried a trend label; per-condition performance is queryable for strategy tuning.",
                labeled,
                entries.len(),
            ),
            confidence: 0.5,
            priority: Priority::Medium,
            status: InsightStatus::Discovered,
        });
    }

    insights
}

// ---------------------------------------------------------------------------
// Strategy improvements
// ---------------------------------------------------------------------------

/// Propose adjustments when window metrics cross their thresholds.
pub fn derive_improvements(window: &PerformanceWindow) -> Vec<StrategyImprovement> {
    let mut improvements = Vec::new();
    if window.is_empty() {
        return improvements;
    }

    if window.win_rate < WIN_RATE_FLOOR {
        improvements.push(StrategyImprovement {
            id: 0,
            kind: ImprovementKind::Condition,
            old_value: "current entry conditions".to_string(),
            new_value: "entry conditions requiring indicator confirmation".to_string(),
            reason: format!(
                "win rate {:.0}% below the {:.0}% floor",
                window.win_rate * 100.0,
                WIN_RATE_FLOOR * 100.0,
            ),
            expected_impact: "higher share of winning trades".to_string(),
            status: ImprovementStatus::Proposed,
        });
    }

    if window.max_drawdown > DRAWDOWN_CEILING {
        improvements.push(StrategyImprovement {
            id: 0,
            kind: ImprovementKind::Risk,
            old_value: "current position sizing".to_string(),
            new_value: "reduced trade ratio during volatile periods".to_string(),
            reason: format!(
                "max drawdown {:.1}% above the {:.0}% ceiling",
                window.max_drawdown * 100.0,
                DRAWDOWN_CEILING * 100.0,
            ),
            expected_impact: "smaller peak-to-trough swings".to_string(),
            status: ImprovementStatus::Proposed,
        });
    }

    if window.total_pnl < Decimal::ZERO {
        improvements.push(StrategyImprovement {
            id: 0,
            kind: ImprovementKind::Parameter,
            old_value: "current exit parameters".to_string(),
            new_value: "earlier exits on adverse trend flips".to_string(),
            reason: "window closed with a net loss".to_string(),
            expected_impact: "improved profit/loss ratio".to_string(),
            status: ImprovementStatus::Proposed,
        });
    }

    improvements
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PeriodKind;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn window(
        total: u32,
        winning: u32,
        win_rate: f64,
        pnl: Decimal,
        drawdown: f64,
    ) -> PerformanceWindow {
        let now = Utc::now();
        PerformanceWindow {
            id: 0,
            period_kind: PeriodKind::Daily,
            period_start: now - chrono::Duration::days(1),
            period_end: now,
            total_trades: total,
            winning_trades: winning,
            losing_trades: total - winning,
            win_rate,
            total_pnl: pnl,
            total_pnl_percent: 0.0,
            max_drawdown: drawdown,
            sharpe_ratio: 0.0,
        }
    }

    #[test]
    fn test_empty_window_yields_nothing() {
        let w = window(0, 0, 0.0, Decimal::ZERO, 0.0);
        assert!(derive_insights(&w, &[]).is_empty());
        assert!(derive_improvements(&w).is_empty());
    }

    #[test]
    fn test_low_win_rate_proposes_condition_change() {
        let w = window(10, 3, 0.3, dec!(100), 0.05);
        let improvements = derive_improvements(&w);
        assert!(improvements
            .iter()
            .any(|i| i.kind == ImprovementKind::Condition));
        assert!(improvements
            .iter()
            .all(|i| i.status == ImprovementStatus::Proposed));
    }

    #[test]
    fn test_high_drawdown_proposes_risk_change() {
        let w = window(10, 6, 0.6, dec!(100), 0.15);
        let improvements = derive_improvements(&w);
        assert_eq!(improvements.len(), 1);
        assert_eq!(improvements[0].kind, ImprovementKind::Risk);
        assert!(improvements[0].reason.contains("drawdown"));
    }

    #[test]
    fn test_net_loss_proposes_exit_change() {
        let w = window(10, 6, 0.6, dec!(-500), 0.05);
        let improvements = derive_improvements(&w);
        assert_eq!(improvements.len(), 1);
        assert_eq!(improvements[0].kind, ImprovementKind::Parameter);
    }

    #[test]
    fn test_healthy_window_proposes_nothing() {
        let w = window(10, 6, 0.6, dec!(500), 0.05);
        assert!(derive_improvements(&w).is_empty());
        assert_eq!(
            window_suggestions(&w),
            "Current strategy is performing adequately."
        );
    }

    #[test]
    fn test_all_thresholds_stack() {
        let w = window(10, 2, 0.2, dec!(-500), 0.2);
        assert_eq!(derive_improvements(&w).len(), 3);
        let suggestions = window_suggestions(&w);
        assert!(suggestions.contains("entry conditions"));
        assert!(suggestions.contains("risk management"));
        assert!(suggestions.contains("exit strategy"));
    }

    #[test]
    fn test_insights_from_mixed_window() {
        let w = window(5, 3, 0.6, dec!(100), 0.02);
        let insights = derive_insights(&w, &[]);
        // winning + losing patterns, no trend-labeled entries
        assert_eq!(insights.len(), 2);
        assert!(insights.iter().all(|i| i.status == InsightStatus::Discovered));
        let winning = insights
            .iter()
            .find(|i| i.title.contains("Winning"))
            .unwrap();
        assert!((winning.confidence - 0.7).abs() < 1e-10);
    }

    #[test]
    fn test_window_narrative_mentions_metrics() {
        let w = window(7, 4, 0.571, dec!(1234), 0.08);
        let narrative = window_narrative(&w);
        assert!(narrative.contains("7 trades"));
        assert!(narrative.contains("57%"));
    }
}
