//! Paper exchange — in-memory fill simulator.
//!
//! Lets the agent run end-to-end without credentials: balances live in
//! memory, market orders fill instantly at the configured mark price,
//! and fees are deducted at the configured rate. Tests also use it to
//! drive deterministic solvency scenarios; `force_error` /
//! `force_reject` flip the next call into the corresponding failure.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Mutex;
use tracing::info;

use super::{Exchange, MarketFeed};
use crate::types::{AccountSnapshot, MarketContext, OrderReceipt, SageError};

#[derive(Debug, Clone)]
struct PaperBook {
    cash: Decimal,
    asset: Decimal,
    avg_price: Decimal,
    mark_price: Decimal,
    change_24h: f64,
    fills: u64,
    force_error: Option<String>,
    force_reject: Option<String>,
}

pub struct PaperExchange {
    book: Mutex<PaperBook>,
    fee_rate: Decimal,
}

impl PaperExchange {
    pub fn new(initial_cash: Decimal, mark_price: Decimal, fee_rate: Decimal) -> Self {
        Self {
            book: Mutex::new(PaperBook {
                cash: initial_cash,
                asset: Decimal::ZERO,
                avg_price: Decimal::ZERO,
                mark_price,
                change_24h: 0.0,
                fills: 0,
                force_error: None,
                force_reject: None,
            }),
            fee_rate,
        }
    }

    /// Move the simulated market.
    pub fn set_mark_price(&self, price: Decimal) {
        self.book.lock().unwrap().mark_price = price;
    }

    pub fn set_change_24h(&self, change: f64) {
        self.book.lock().unwrap().change_24h = change;
    }

    /// Seed an existing position.
    pub fn set_position(&self, asset: Decimal, avg_price: Decimal) {
        let mut book = self.book.lock().unwrap();
        book.asset = asset;
        book.avg_price = avg_price;
    }

    pub fn set_cash(&self, cash: Decimal) {
        self.book.lock().unwrap().cash = cash;
    }

    /// Fail the next order as a transport error.
    pub fn force_error(&self, message: &str) {
        self.book.lock().unwrap().force_error = Some(message.to_string());
    }

    /// Fail the next order as a venue-side rejection.
    pub fn force_reject(&self, message: &str) {
        self.book.lock().unwrap().force_reject = Some(message.to_string());
    }

    pub fn fill_count(&self) -> u64 {
        self.book.lock().unwrap().fills
    }

    fn take_forced_failure(book: &mut PaperBook) -> Result<(), SageError> {
        if let Some(message) = book.force_error.take() {
            return Err(SageError::collaborator("exchange", message));
        }
        if let Some(message) = book.force_reject.take() {
            return Err(SageError::OrderRejected(message));
        }
        Ok(())
    }
}

#[async_trait]
impl Exchange for PaperExchange {
    async fn account_snapshot(&self) -> Result<AccountSnapshot, SageError> {
        let book = self.book.lock().unwrap();
        Ok(AccountSnapshot {
            cash_balance: book.cash,
            asset_balance: book.asset,
            asset_average_price: book.avg_price,
            mark_price: book.mark_price,
        })
    }

    async fn submit_market_buy(&self, notional: Decimal) -> Result<OrderReceipt, SageError> {
        let mut book = self.book.lock().unwrap();
        Self::take_forced_failure(&mut book)?;

        if notional > book.cash {
            return Err(SageError::OrderRejected(format!(
                "notional {} exceeds cash {}",
                notional, book.cash
            )));
        }
        if book.mark_price <= Decimal::ZERO {
            return Err(SageError::OrderRejected("no market price".to_string()));
        }

        let fee = notional * self.fee_rate;
        let quantity = (notional - fee) / book.mark_price;

        // Weighted-average entry price over the combined position.
        let prev_cost = book.asset * book.avg_price;
        let new_asset = book.asset + quantity;
        if new_asset > Decimal::ZERO {
            book.avg_price = (prev_cost + (notional - fee)) / new_asset;
        }
        book.cash -= notional;
        book.asset = new_asset;
        book.fills += 1;

        let receipt = OrderReceipt {
            order_id: format!("paper-{}", uuid::Uuid::new_v4()),
        };
        info!(%notional, %quantity, order_id = %receipt.order_id, "[PAPER] buy filled");
        Ok(receipt)
    }

    async fn submit_market_sell(&self, quantity: Decimal) -> Result<OrderReceipt, SageError> {
        let mut book = self.book.lock().unwrap();
        Self::take_forced_failure(&mut book)?;

        if quantity > book.asset {
            return Err(SageError::OrderRejected(format!(
                "quantity {} exceeds position {}",
                quantity, book.asset
            )));
        }
        if book.mark_price <= Decimal::ZERO {
            return Err(SageError::OrderRejected("no market price".to_string()));
        }

        let proceeds = quantity * book.mark_price;
        let fee = proceeds * self.fee_rate;
        book.cash += proceeds - fee;
        book.asset -= quantity;
        if book.asset == Decimal::ZERO {
            book.avg_price = Decimal::ZERO;
        }
        book.fills += 1;

        let receipt = OrderReceipt {
            order_id: format!("paper-{}", uuid::Uuid::new_v4()),
        };
        info!(%quantity, %proceeds, order_id = %receipt.order_id, "[PAPER] sell filled");
        Ok(receipt)
    }

    fn name(&self) -> &str {
        "paper"
    }
}

#[async_trait]
impl MarketFeed for PaperExchange {
    async fn mark_price(&self) -> Result<Decimal, SageError> {
        Ok(self.book.lock().unwrap().mark_price)
    }

    async fn market_context(&self) -> Result<MarketContext, SageError> {
        let book = self.book.lock().unwrap();
        Ok(MarketContext {
            payload: serde_json::json!({
                "current_price": book.mark_price.to_f64(),
                "change_24h": book.change_24h,
                "source": "paper",
            }),
            mark_price: book.mark_price,
            change_24h: book.change_24h,
            captured_at: Utc::now(),
        })
    }

    fn name(&self) -> &str {
        "paper"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
