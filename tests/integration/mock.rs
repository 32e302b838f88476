//! Mock collaborators for integration testing.
//!
//! Provides a deterministic `DecisionOracle` whose responses are
//! scripted from test code, plus decision builders. The paper exchange
//! and the in-memory store already live in the library (they back dry
//! runs), so tests compose those directly.

use async_trait::async_trait;
use rust_decimal_macros::dec;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use sage::oracle::DecisionOracle;
use sage::types::{Action, Decision, ExpectedRange, MarketContext, RiskTier, SageError};

/// A scripted decision oracle.
///
/// Responses are consumed in push order; once the script is exhausted
/// the oracle keeps answering with a low-confidence hold, so long
/// simulations don't need exhaustive scripts.
pub struct MockOracle {
    script: Mutex<VecDeque<Result<Decision, SageError>>>,
    calls: Mutex<u64>,
}

impl MockOracle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(0),
        })
    }

    pub fn push(&self, response: Result<Decision, SageError>) {
        self.script.lock().unwrap().push_back(response);
    }

    pub fn call_count(&self) -> u64 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl DecisionOracle for MockOracle {
    async fn request_decision(&self, _context: &MarketContext) -> Result<Decision, SageError> {
        *self.calls.lock().unwrap() += 1;
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(make_decision(Action::Hold, 0.5)))
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

/// A well-formed decision around a 50m mark price.
pub fn make_decision(action: Action, confidence: f64) -> Decision {
    Decision {
        action,
        confidence,
        risk_tier: RiskTier::Medium,
        rationale: format!("scripted {action} decision"),
        expected_range: ExpectedRange {
            min: dec!(48000000),
            max: dec!(52000000),
        },
        key_indicators: None,
        chart_analysis: None,
    }
}
