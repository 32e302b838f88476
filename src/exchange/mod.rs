//! Exchange integrations.
//!
//! Defines the `Exchange` and `MarketFeed` traits and provides:
//! - Upbit — real-money REST client (JWT-authenticated)
//! - Paper — in-memory fill simulator for credential-less runs

pub mod paper;
pub mod upbit;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::types::{AccountSnapshot, MarketContext, OrderReceipt, SageError};

/// Abstraction over the account/order side of a trading venue.
///
/// Submission failures distinguish a venue-side business rejection
/// (`SageError::OrderRejected`) from transport failures
/// (`SageError::Collaborator`); the execution engine maps them to
/// different terminal outcomes.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Read balances and the current mark price into one snapshot.
    async fn account_snapshot(&self) -> Result<AccountSnapshot, SageError>;

    /// Submit a market buy for the given quote-currency notional.
    async fn submit_market_buy(&self, notional: Decimal) -> Result<OrderReceipt, SageError>;

    /// Submit a market sell for the given asset quantity.
    async fn submit_market_sell(&self, quantity: Decimal) -> Result<OrderReceipt, SageError>;

    /// Venue name for logging and identification.
    fn name(&self) -> &str;
}

/// Abstraction over public market data. The context payload is opaque
/// to the core — it is assembled here and forwarded to the oracle.
#[async_trait]
pub trait MarketFeed: Send + Sync {
    /// Current traded price of the configured pair.
    async fn mark_price(&self) -> Result<Decimal, SageError>;

    /// Assemble the full market context handed to the decision oracle.
    async fn market_context(&self) -> Result<MarketContext, SageError>;

    fn name(&self) -> &str;
}
