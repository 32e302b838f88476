//! Decision oracle integration.
//!
//! Defines the `DecisionOracle` trait and provides the OpenAI-backed
//! implementation. The oracle receives the opaque market context and
//! returns a structured buy/sell/hold recommendation; its output is
//! untrusted and validated by the caller before use.

pub mod openai;

use async_trait::async_trait;

use crate::types::{Decision, MarketContext, SageError};

/// Abstraction over the natural-language decision service.
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    /// Request one structured recommendation for the given context.
    async fn request_decision(&self, context: &MarketContext) -> Result<Decision, SageError>;

    /// Model identifier string.
    fn model_name(&self) -> &str;
}
