//! Execution engine.
//!
//! Turns a validated decision plus the current account snapshot into
//! exactly one order intent, applies fee and minimum-size constraints,
//! submits it, and classifies the result.
//!
//! `execute` never fails: every error path resolves to an outcome
//! value, so the caller always receives exactly one `ExecutionResult`
//! per cycle. Submitted orders are never retried — the order state
//! after a transport error is ambiguous, and only the next scheduled
//! cycle may act again.

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::TradingConfig;
use crate::exchange::Exchange;
use crate::types::{
    AccountSnapshot, Action, ActionTaken, Decision, ExecutionResult, Outcome, SageError,
};

/// A sized buy order: the quote notional to commit, the fee inside it,
/// and the asset quantity that notional is expected to yield.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BuyOrder {
    notional: Decimal,
    fee: Decimal,
    quantity: Decimal,
}

/// A sized sell order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SellOrder {
    quantity: Decimal,
    notional: Decimal,
    fee: Decimal,
}

/// Size a buy: commit `trade_ratio` of available cash, floored at the
/// venue minimum; the fee comes out of the committed notional before
/// the expected quantity is computed.
fn size_buy(cash: Decimal, mark: Decimal, cfg: &TradingConfig) -> BuyOrder {
    let mut notional = cash * cfg.trade_ratio;
    if notional < cfg.minimum_trade_amount {
        notional = cfg.minimum_trade_amount;
    }
    let fee = notional * cfg.fee_rate;
    let quantity = (notional - fee) / mark;
    BuyOrder {
        notional,
        fee,
        quantity,
    }
}

/// Size a sell: `trade_ratio` of the position — unless the resulting
/// notional would fall below the venue minimum, in which case the
/// entire balance goes (a ratio-sized sell would strand an un-sellable
/// dust position).
fn size_sell(asset: Decimal, mark: Decimal, cfg: &TradingConfig) -> SellOrder {
    let mut quantity = asset * cfg.trade_ratio;
    if quantity * mark < cfg.minimum_trade_amount {
        quantity = asset;
    }
    let notional = quantity * mark;
    let fee = notional * cfg.fee_rate;
    SellOrder {
        quantity,
        notional,
        fee,
    }
}

pub struct ExecutionEngine {
    exchange: Arc<dyn Exchange>,
    cfg: TradingConfig,
}

impl ExecutionEngine {
    pub fn new(exchange: Arc<dyn Exchange>, cfg: TradingConfig) -> Self {
        Self { exchange, cfg }
    }

    /// Execute one decision against one account snapshot.
    ///
    /// State machine:
    /// `{not_executed} -> {executed | skipped_insufficient_funds |
    /// skipped_below_minimum | rejected_by_exchange | error}`,
    /// terminal per cycle.
    pub async fn execute(
        &self,
        decision: &Decision,
        account: &AccountSnapshot,
    ) -> ExecutionResult {
        // Step 1: reject malformed decisions, treat as hold.
        if let Err(e) = decision.validate() {
            warn!(error = %e, "Decision rejected, treating as hold");
            return self.held(account);
        }

        match decision.action {
            Action::Hold => {
                info!(price = %account.mark_price, "Hold — no order submitted");
                self.held(account)
            }
            Action::Buy => self.execute_buy(account).await,
            Action::Sell => self.execute_sell(account).await,
        }
    }

    async fn execute_buy(&self, account: &AccountSnapshot) -> ExecutionResult {
        if !account.is_mark_known() {
            warn!("Mark price unknown — buy sizing blocked");
            return self.no_action(account, Outcome::Error);
        }

        if account.cash_balance < self.cfg.minimum_trade_amount {
            info!(
                cash = %account.cash_balance,
                minimum = %self.cfg.minimum_trade_amount,
                "Buy skipped — cash below venue minimum"
            );
            return self.no_action(account, Outcome::SkippedInsufficientFunds);
        }

        let order = size_buy(account.cash_balance, account.mark_price, &self.cfg);
        info!(
            notional = %order.notional,
            fee = %order.fee,
            quantity = %order.quantity,
            "Submitting market buy"
        );

        match self.submit(self.exchange.submit_market_buy(order.notional)).await {
            Ok(receipt) => {
                info!(order_id = %receipt.order_id, "Buy executed");
                ExecutionResult {
                    action: ActionTaken::Buy,
                    price: account.mark_price,
                    quantity: order.quantity,
                    notional_value: order.notional,
                    fee: order.fee,
                    order_id: Some(receipt.order_id),
                    outcome: Outcome::Executed,
                }
            }
            Err(outcome) => self.no_action(account, outcome),
        }
    }

    async fn execute_sell(&self, account: &AccountSnapshot) -> ExecutionResult {
        if !account.is_mark_known() {
            warn!("Mark price unknown — sell sizing blocked");
            return self.no_action(account, Outcome::Error);
        }

        if account.asset_value() < self.cfg.minimum_trade_amount {
            info!(
                position_value = %account.asset_value(),
                minimum = %self.cfg.minimum_trade_amount,
                "Sell skipped — position value below venue minimum"
            );
            return self.no_action(account, Outcome::SkippedBelowMinimum);
        }

        let order = size_sell(account.asset_balance, account.mark_price, &self.cfg);
        info!(
            quantity = %order.quantity,
            notional = %order.notional,
            full_balance = order.quantity == account.asset_balance,
            "Submitting market sell"
        );

        match self.submit(self.exchange.submit_market_sell(order.quantity)).await {
            Ok(receipt) => {
                info!(order_id = %receipt.order_id, "Sell executed");
                ExecutionResult {
                    action: ActionTaken::Sell,
                    price: account.mark_price,
                    quantity: order.quantity,
                    notional_value: order.notional,
                    fee: order.fee,
                    order_id: Some(receipt.order_id),
                    outcome: Outcome::Executed,
                }
            }
            Err(outcome) => self.no_action(account, outcome),
        }
    }

    /// Submit with a hard timeout, folding every failure into the
    /// terminal outcome it maps to.
    async fn submit<F>(&self, fut: F) -> Result<crate::types::OrderReceipt, Outcome>
    where
        F: std::future::Future<Output = Result<crate::types::OrderReceipt, SageError>>,
    {
        let timeout = Duration::from_secs(self.cfg.collaborator_timeout_secs);
        match tokio::time::timeout(timeout, fut).await {
            Ok(Ok(receipt)) => Ok(receipt),
            Ok(Err(SageError::OrderRejected(message))) => {
                warn!(%message, "Order rejected by exchange");
                Err(Outcome::RejectedByExchange)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Order submission failed");
                Err(Outcome::Error)
            }
            Err(_) => {
                warn!(timeout_secs = self.cfg.collaborator_timeout_secs, "Order submission timed out");
                Err(Outcome::Error)
            }
        }
    }

    /// A completed hold: no order, but the mark price is still recorded
    /// for downstream reflection.
    fn held(&self, account: &AccountSnapshot) -> ExecutionResult {
        ExecutionResult {
            action: ActionTaken::Hold,
            price: account.mark_price,
            quantity: Decimal::ZERO,
            notional_value: Decimal::ZERO,
            fee: Decimal::ZERO,
            order_id: None,
            outcome: Outcome::Executed,
        }
    }

    /// No position change happened; the outcome records why.
    fn no_action(&self, account: &AccountSnapshot, outcome: Outcome) -> ExecutionResult {
        ExecutionResult {
            action: ActionTaken::None,
            price: account.mark_price,
            quantity: Decimal::ZERO,
            notional_value: Decimal::ZERO,
            fee: Decimal::ZERO,
            order_id: None,
            outcome,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
