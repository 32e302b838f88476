//! Shared types for the SAGE agent.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that exchange, engine, and
//! reflection modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Account snapshot
// ---------------------------------------------------------------------------

/// A point-in-time view of the trading account, captured once per cycle
/// before any order is placed. Immutable once captured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// Available cash (quote currency, e.g. KRW).
    pub cash_balance: Decimal,
    /// Held asset quantity (base currency, e.g. BTC).
    pub asset_balance: Decimal,
    /// Volume-weighted average entry price of the held asset.
    pub asset_average_price: Decimal,
    /// Current market price. Zero means "unknown" and blocks sizing.
    pub mark_price: Decimal,
}

impl fmt::Display for AccountSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cash={} asset={} avg={} mark={}",
            self.cash_balance, self.asset_balance, self.asset_average_price, self.mark_price,
        )
    }
}

impl AccountSnapshot {
    /// Whether the mark price is known. An unknown mark price blocks
    /// all sizing decisions.
    pub fn is_mark_known(&self) -> bool {
        self.mark_price > Decimal::ZERO
    }

    /// Current value of the held asset at the mark price.
    pub fn asset_value(&self) -> Decimal {
        self.asset_balance * self.mark_price
    }

    /// Cash plus asset value.
    pub fn total_equity(&self) -> Decimal {
        self.cash_balance + self.asset_value()
    }

    /// Whether the account holds any of the asset.
    pub fn has_position(&self) -> bool {
        self.asset_balance > Decimal::ZERO
    }

    /// Unrealized P&L of the open position at the mark price.
    /// Zero when there is no position or no cost basis.
    pub fn unrealized_pnl(&self) -> Decimal {
        if self.asset_balance <= Decimal::ZERO || self.asset_average_price <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        (self.mark_price - self.asset_average_price) * self.asset_balance
    }

    /// Helper to build a test snapshot with sensible defaults.
    #[cfg(test)]
    pub fn sample() -> Self {
        use rust_decimal_macros::dec;
        AccountSnapshot {
            cash_balance: dec!(100000),
            asset_balance: Decimal::ZERO,
            asset_average_price: Decimal::ZERO,
            mark_price: dec!(50000000),
        }
    }
}

// ---------------------------------------------------------------------------
// Decision contract
// ---------------------------------------------------------------------------

/// The recommended action from the decision oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Buy => write!(f, "buy"),
            Action::Sell => write!(f, "sell"),
            Action::Hold => write!(f, "hold"),
        }
    }
}

impl std::str::FromStr for Action {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buy" => Ok(Action::Buy),
            "sell" => Ok(Action::Sell),
            "hold" => Ok(Action::Hold),
            _ => Err(anyhow::anyhow!("Unknown action: {s}")),
        }
    }
}

/// Oracle-reported risk level of the recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskTier::Low => write!(f, "low"),
            RiskTier::Medium => write!(f, "medium"),
            RiskTier::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for RiskTier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(RiskTier::Low),
            "medium" => Ok(RiskTier::Medium),
            "high" => Ok(RiskTier::High),
            _ => Err(anyhow::anyhow!("Unknown risk tier: {s}")),
        }
    }
}

/// The oracle's expected price range over the decision horizon.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExpectedRange {
    pub min: Decimal,
    pub max: Decimal,
}

impl fmt::Display for ExpectedRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} .. {}]", self.min, self.max)
    }
}

impl ExpectedRange {
    pub fn is_valid(&self) -> bool {
        self.min <= self.max
    }

    pub fn width(&self) -> Decimal {
        self.max - self.min
    }

    /// Where a price sits inside the range, 0.0 at `min` and 1.0 at
    /// `max`, clamped. None when the range is degenerate.
    pub fn position_of(&self, price: Decimal) -> Option<f64> {
        use rust_decimal::prelude::ToPrimitive;
        let width = self.width();
        if width <= Decimal::ZERO {
            return None;
        }
        let pos = ((price - self.min) / width).to_f64()?;
        Some(pos.clamp(0.0, 1.0))
    }
}

/// A structured recommendation from the decision oracle.
///
/// Treated as untrusted input — every field is validated with
/// [`Decision::validate`] before any sizing logic runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    /// Oracle self-reported confidence (0.0–1.0).
    pub confidence: f64,
    pub risk_tier: RiskTier,
    /// Oracle reasoning summary.
    pub rationale: String,
    pub expected_range: ExpectedRange,
    /// Optional indicator signals accompanying the decision.
    #[serde(default)]
    pub key_indicators: Option<serde_json::Value>,
    /// Optional chart analysis (present when the oracle saw an image).
    #[serde(default)]
    pub chart_analysis: Option<serde_json::Value>,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} conf={:.0}% risk={} range={}",
            self.action,
            self.confidence * 100.0,
            self.risk_tier,
            self.expected_range,
        )
    }
}

impl Decision {
    /// Validate the oracle payload. An invalid decision is rejected and
    /// the cycle falls back to `hold`.
    pub fn validate(&self) -> Result<(), SageError> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(SageError::Validation(format!(
                "confidence {} outside [0.0, 1.0]",
                self.confidence
            )));
        }
        if !self.expected_range.is_valid() {
            return Err(SageError::Validation(format!(
                "expected range min {} > max {}",
                self.expected_range.min, self.expected_range.max
            )));
        }
        Ok(())
    }

    /// Synthetic hold decision used when the oracle's output was
    /// rejected or unavailable. The rationale records why, so the
    /// ledger trail shows the reason for holding.
    pub fn fallback_hold(reason: &str) -> Self {
        Decision {
            action: Action::Hold,
            confidence: 0.0,
            risk_tier: RiskTier::Low,
            rationale: format!("fallback hold: {reason}"),
            expected_range: ExpectedRange {
                min: Decimal::ZERO,
                max: Decimal::ZERO,
            },
            key_indicators: None,
            chart_analysis: None,
        }
    }

    /// Whether this decision was produced by the fallback path.
    pub fn is_fallback(&self) -> bool {
        self.rationale.starts_with("fallback hold:")
    }
}

// ---------------------------------------------------------------------------
// Execution result
// ---------------------------------------------------------------------------

/// The action that was actually carried out. `None` means no position
/// change happened (skips, rejections, errors).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionTaken {
    Buy,
    Sell,
    Hold,
    None,
}

impl fmt::Display for ActionTaken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionTaken::Buy => write!(f, "buy"),
            ActionTaken::Sell => write!(f, "sell"),
            ActionTaken::Hold => write!(f, "hold"),
            ActionTaken::None => write!(f, "none"),
        }
    }
}

impl std::str::FromStr for ActionTaken {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buy" => Ok(ActionTaken::Buy),
            "sell" => Ok(ActionTaken::Sell),
            "hold" => Ok(ActionTaken::Hold),
            "none" => Ok(ActionTaken::None),
            _ => Err(anyhow::anyhow!("Unknown action taken: {s}")),
        }
    }
}

/// Terminal classification of one cycle's execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Executed,
    SkippedInsufficientFunds,
    SkippedBelowMinimum,
    RejectedByExchange,
    Error,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Executed => write!(f, "executed"),
            Outcome::SkippedInsufficientFunds => write!(f, "skipped_insufficient_funds"),
            Outcome::SkippedBelowMinimum => write!(f, "skipped_below_minimum"),
            Outcome::RejectedByExchange => write!(f, "rejected_by_exchange"),
            Outcome::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for Outcome {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "executed" => Ok(Outcome::Executed),
            "skipped_insufficient_funds" => Ok(Outcome::SkippedInsufficientFunds),
            "skipped_below_minimum" => Ok(Outcome::SkippedBelowMinimum),
            "rejected_by_exchange" => Ok(Outcome::RejectedByExchange),
            "error" => Ok(Outcome::Error),
            _ => Err(anyhow::anyhow!("Unknown outcome: {s}")),
        }
    }
}

/// What one cycle actually did. Created exactly once per cycle and
/// immutable after creation — a `hold` or a skip is still a result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub action: ActionTaken,
    /// Mark price at execution time.
    pub price: Decimal,
    /// Asset quantity bought/sold (zero for holds and skips).
    pub quantity: Decimal,
    /// Quote-currency value committed to the order.
    pub notional_value: Decimal,
    pub fee: Decimal,
    /// Exchange order id; absent when no order was submitted.
    pub order_id: Option<String>,
    pub outcome: Outcome,
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} @ {} (qty={} notional={} fee={})",
            self.action, self.outcome, self.price, self.quantity, self.notional_value, self.fee,
        )
    }
}

impl ExecutionResult {
    /// Whether an order actually filled on the exchange.
    pub fn is_trade(&self) -> bool {
        self.outcome == Outcome::Executed
            && matches!(self.action, ActionTaken::Buy | ActionTaken::Sell)
    }
}

/// Receipt returned by the exchange after order submission.
/// The order id is opaque to the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub order_id: String,
}

// ---------------------------------------------------------------------------
// Market trend
// ---------------------------------------------------------------------------

/// Coarse market direction label captured at cycle time, used by the
/// reflection engine to grade decision quality independently of the
/// oracle's own reasoning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketTrend {
    Bullish,
    Bearish,
    Neutral,
}

impl MarketTrend {
    /// Band (fraction) inside which a 24h change counts as neutral.
    pub const NEUTRAL_BAND: f64 = 0.01;

    /// Label a 24h fractional change: above +1% bullish, below -1%
    /// bearish, otherwise neutral.
    pub fn from_daily_change(change: f64) -> Self {
        if change > Self::NEUTRAL_BAND {
            MarketTrend::Bullish
        } else if change < -Self::NEUTRAL_BAND {
            MarketTrend::Bearish
        } else {
            MarketTrend::Neutral
        }
    }
}

impl fmt::Display for MarketTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketTrend::Bullish => write!(f, "bullish"),
            MarketTrend::Bearish => write!(f, "bearish"),
            MarketTrend::Neutral => write!(f, "neutral"),
        }
    }
}

impl std::str::FromStr for MarketTrend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bullish" => Ok(MarketTrend::Bullish),
            "bearish" => Ok(MarketTrend::Bearish),
            "neutral" => Ok(MarketTrend::Neutral),
            _ => Err(anyhow::anyhow!("Unknown market trend: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Market context
// ---------------------------------------------------------------------------

/// The market snapshot handed to the decision oracle. The payload is
/// assembled by the market-data collaborator and treated as opaque by
/// the core — only the mark price and the 24h change are interpreted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketContext {
    /// Full context payload forwarded to the oracle (candles,
    /// indicators, order book, whatever the feed provides).
    pub payload: serde_json::Value,
    pub mark_price: Decimal,
    /// 24h price change as a fraction (0.05 = +5%).
    pub change_24h: f64,
    pub captured_at: DateTime<Utc>,
}

impl MarketContext {
    /// Coarse direction label for this context.
    pub fn trend(&self) -> MarketTrend {
        MarketTrend::from_daily_change(self.change_24h)
    }
}

// ---------------------------------------------------------------------------
// Ledger entry
// ---------------------------------------------------------------------------

/// The durable record of one cycle: the decision, what was done about
/// it, and the account as it stood beforehand. Append-only; never
/// updated in place. This is the single source of truth the reflection
/// engine reads from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Store-assigned id; zero until persisted.
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub decision: Decision,
    pub result: ExecutionResult,
    /// Account state captured before the cycle acted.
    pub account_before: AccountSnapshot,
    /// Market direction label at cycle time, if known.
    pub trend: Option<MarketTrend>,
}

impl fmt::Display for LedgerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} {} -> {}",
            self.id, self.timestamp, self.decision.action, self.result,
        )
    }
}

// ---------------------------------------------------------------------------
// Reflections
// ---------------------------------------------------------------------------

/// Which pass produced a reflection row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReflectionKind {
    Immediate,
    Daily,
    Weekly,
    Monthly,
}

impl fmt::Display for ReflectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReflectionKind::Immediate => write!(f, "immediate"),
            ReflectionKind::Daily => write!(f, "daily"),
            ReflectionKind::Weekly => write!(f, "weekly"),
            ReflectionKind::Monthly => write!(f, "monthly"),
        }
    }
}

impl std::str::FromStr for ReflectionKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "immediate" => Ok(ReflectionKind::Immediate),
            "daily" => Ok(ReflectionKind::Daily),
            "weekly" => Ok(ReflectionKind::Weekly),
            "monthly" => Ok(ReflectionKind::Monthly),
            _ => Err(anyhow::anyhow!("Unknown reflection kind: {s}")),
        }
    }
}

/// A scored post-hoc evaluation of one ledger entry. Reflections are
/// keyed on (entry, kind, period_start), so re-running one is a
/// deterministic overwrite rather than a silent duplicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reflection {
    pub id: i64,
    pub ledger_entry_id: i64,
    pub kind: ReflectionKind,
    /// Composite 0–1 score of the cycle's outcome.
    pub performance_score: f64,
    pub pnl: Decimal,
    pub pnl_percent: f64,
    pub decision_quality_score: f64,
    pub timing_score: f64,
    pub risk_management_score: f64,
    pub narrative: String,
    pub suggestions: String,
    /// Window start; for immediate reflections this is the entry's own
    /// timestamp (keeps the idempotency key deterministic).
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Performance windows
// ---------------------------------------------------------------------------

/// Aggregation cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodKind {
    Daily,
    Weekly,
    Monthly,
}

impl PeriodKind {
    pub const ALL: &'static [PeriodKind] =
        &[PeriodKind::Daily, PeriodKind::Weekly, PeriodKind::Monthly];

    pub fn reflection_kind(&self) -> ReflectionKind {
        match self {
            PeriodKind::Daily => ReflectionKind::Daily,
            PeriodKind::Weekly => ReflectionKind::Weekly,
            PeriodKind::Monthly => ReflectionKind::Monthly,
        }
    }
}

impl fmt::Display for PeriodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodKind::Daily => write!(f, "daily"),
            PeriodKind::Weekly => write!(f, "weekly"),
            PeriodKind::Monthly => write!(f, "monthly"),
        }
    }
}

impl std::str::FromStr for PeriodKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(PeriodKind::Daily),
            "weekly" => Ok(PeriodKind::Weekly),
            "monthly" => Ok(PeriodKind::Monthly),
            _ => Err(anyhow::anyhow!("Unknown period kind: {s}")),
        }
    }
}

/// Aggregate statistics over the ledger entries in one half-open
/// `[start, end)` window. Recomputing a window supersedes the previous
/// row rather than merging with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceWindow {
    pub id: i64,
    pub period_kind: PeriodKind,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub total_trades: u32,
    pub winning_trades: u32,
    pub losing_trades: u32,
    /// winning / total; 0.0 when there were no trades.
    pub win_rate: f64,
    pub total_pnl: Decimal,
    /// Total P&L normalized against total notional invested in the
    /// window, as a percentage.
    pub total_pnl_percent: f64,
    /// Peak-to-trough drop of the cumulative per-trade P&L curve,
    /// as a fraction of total notional invested.
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
}

impl PerformanceWindow {
    /// A zeroed window for a period that contained no trades.
    pub fn empty(kind: PeriodKind, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        PerformanceWindow {
            id: 0,
            period_kind: kind,
            period_start: start,
            period_end: end,
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            win_rate: 0.0,
            total_pnl: Decimal::ZERO,
            total_pnl_percent: 0.0,
            max_drawdown: 0.0,
            sharpe_ratio: 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_trades == 0
    }
}

impl fmt::Display for PerformanceWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{} .. {}) trades={} win_rate={:.0}% pnl={} dd={:.1}% sharpe={:.2}",
            self.period_kind,
            self.period_start,
            self.period_end,
            self.total_trades,
            self.win_rate * 100.0,
            self.total_pnl,
            self.max_drawdown * 100.0,
            self.sharpe_ratio,
        )
    }
}

// ---------------------------------------------------------------------------
// Insights & improvements
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
        }
    }
}

/// Lifecycle of a learning insight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightStatus {
    Discovered,
    Implemented,
    Validated,
}

impl fmt::Display for InsightStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsightStatus::Discovered => write!(f, "discovered"),
            InsightStatus::Implemented => write!(f, "implemented"),
            InsightStatus::Validated => write!(f, "validated"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightKind {
    Pattern,
    Market,
    Timing,
}

impl fmt::Display for InsightKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsightKind::Pattern => write!(f, "pattern"),
            InsightKind::Market => write!(f, "market"),
            InsightKind::Timing => write!(f, "timing"),
        }
    }
}

/// An append-only observation derived from a performance window plus
/// the ledger entries beneath it. Advisory only — never fed back into
/// the execution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningInsight {
    pub id: i64,
    pub kind: InsightKind,
    pub title: String,
    pub description: String,
    pub confidence: f64,
    pub priority: Priority,
    pub status: InsightStatus,
}

/// Lifecycle of a strategy improvement proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImprovementStatus {
    Proposed,
    Implemented,
    Validated,
    Reverted,
}

impl fmt::Display for ImprovementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImprovementStatus::Proposed => write!(f, "proposed"),
            ImprovementStatus::Implemented => write!(f, "implemented"),
            ImprovementStatus::Validated => write!(f, "validated"),
            ImprovementStatus::Reverted => write!(f, "reverted"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImprovementKind {
    Condition,
    Parameter,
    Risk,
}

impl fmt::Display for ImprovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImprovementKind::Condition => write!(f, "condition"),
            ImprovementKind::Parameter => write!(f, "parameter"),
            ImprovementKind::Risk => write!(f, "risk"),
        }
    }
}

/// A proposed strategy adjustment derived from a performance window.
/// Advisory only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyImprovement {
    pub id: i64,
    pub kind: ImprovementKind,
    pub old_value: String,
    pub new_value: String,
    pub reason: String,
    pub expected_impact: String,
    pub status: ImprovementStatus,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for SAGE.
#[derive(Debug, thiserror::Error)]
pub enum SageError {
    /// Malformed oracle decision — recovered locally as a `hold`.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Network/timeout failure talking to an external collaborator.
    #[error("Collaborator error ({collaborator}): {message}")]
    Collaborator {
        collaborator: String,
        message: String,
    },

    /// Exchange-side business rejection of a submitted order.
    #[error("Order rejected by exchange: {0}")]
    OrderRejected(String),

    /// Ledger/reflection write failure. Surfaced loudly since it risks
    /// an unrecorded trade.
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Oracle error ({model}): {message}")]
    Oracle { model: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SageError {
    /// Shorthand for a collaborator failure.
    pub fn collaborator(name: &str, message: impl fmt::Display) -> Self {
        SageError::Collaborator {
            collaborator: name.to_string(),
            message: message.to_string(),
        }
    }

    /// Shorthand for a collaborator timeout. A timeout is a collaborator
    /// failure, never a hang.
    pub fn timeout(name: &str) -> Self {
        SageError::Collaborator {
            collaborator: name.to_string(),
            message: "timed out".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
