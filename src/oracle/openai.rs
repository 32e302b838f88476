//! OpenAI decision oracle.
//!
//! Implements the `DecisionOracle` trait using the Chat Completions
//! API with a forced function call, so the recommendation comes back
//! as machine-parseable JSON instead of free text. Handles prompt
//! construction, response parsing, and rate limiting with exponential
//! backoff.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::DecisionOracle;
use crate::types::{Decision, MarketContext, SageError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Maximum retries on rate limit / server errors.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (ms).
const BASE_BACKOFF_MS: u64 = 1000;

/// Name of the forced function the model must call.
const DECISION_TOOL: &str = "get_trading_decision";

const SYSTEM_PROMPT: &str = "\
You are a cryptocurrency trading advisor with deep knowledge of technical \
analysis and market psychology. Analyze the provided market data (current \
price, 24h change, volume, daily candles and any indicator summaries) and \
recommend exactly one action: buy, sell, or hold.

Be conservative and consider risk management. Confirm signals across \
multiple indicators rather than relying on a single one. Report your \
self-assessed confidence between 0.0 and 1.0 and an expected price range \
for the next analysis interval.

Respond only through the structured output function.";

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    temperature: f64,
    messages: Vec<Message>,
    tools: Vec<Tool>,
    tool_choice: ToolChoice,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct Tool {
    #[serde(rename = "type")]
    tool_type: String,
    function: ToolFunction,
}

#[derive(Debug, Serialize)]
struct ToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ToolChoice {
    #[serde(rename = "type")]
    choice_type: String,
    function: ToolChoiceFunction,
}

#[derive(Debug, Serialize)]
struct ToolChoiceFunction {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    function: ToolCallFunction,
}

#[derive(Debug, Deserialize)]
struct ToolCallFunction {
    arguments: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct OpenAiOracle {
    http: Client,
    api_key: SecretString,
    model: String,
    max_tokens: u32,
    temperature: f64,
}

impl OpenAiOracle {
    pub fn new(
        api_key: SecretString,
        model: Option<String>,
        max_tokens: Option<u32>,
        temperature: f64,
    ) -> Result<Self, SageError> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| SageError::collaborator("oracle", e))?;

        Ok(Self {
            http,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature,
        })
    }

    /// JSON schema of the decision payload the model must produce.
    /// Mirrors the `Decision` contract so the arguments deserialize
    /// directly.
    fn decision_schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["buy", "sell", "hold"],
                    "description": "Recommended trading action"
                },
                "confidence": {
                    "type": "number",
                    "description": "Self-assessed confidence, 0.0-1.0"
                },
                "risk_tier": {
                    "type": "string",
                    "enum": ["low", "medium", "high"],
                    "description": "Risk level of acting on this recommendation"
                },
                "rationale": {
                    "type": "string",
                    "description": "Detailed technical analysis explanation"
                },
                "expected_range": {
                    "type": "object",
                    "properties": {
                        "min": {"type": "number", "description": "Expected minimum price"},
                        "max": {"type": "number", "description": "Expected maximum price"}
                    },
                    "required": ["min", "max"]
                },
                "key_indicators": {
                    "type": "object",
                    "description": "Optional indicator signal summary"
                }
            },
            "required": ["action", "confidence", "risk_tier", "rationale", "expected_range"]
        })
    }

    fn build_request(&self, context: &MarketContext) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: format!(
                        "Analyze this market data and provide a trading decision: {}",
                        context.payload
                    ),
                },
            ],
            tools: vec![Tool {
                tool_type: "function".to_string(),
                function: ToolFunction {
                    name: DECISION_TOOL.to_string(),
                    description: "Structured output for the trading decision".to_string(),
                    parameters: Self::decision_schema(),
                },
            }],
            tool_choice: ToolChoice {
                choice_type: "function".to_string(),
                function: ToolChoiceFunction {
                    name: DECISION_TOOL.to_string(),
                },
            },
        }
    }

    /// Extract the forced tool call's arguments from a response body.
    fn parse_decision(&self, body: &str) -> Result<Decision, SageError> {
        let response: ChatResponse =
            serde_json::from_str(body).map_err(|e| SageError::Oracle {
                model: self.model.clone(),
                message: format!("unparseable response: {e}"),
            })?;

        let arguments = response
            .choices
            .first()
            .and_then(|c| c.message.tool_calls.first())
            .map(|t| t.function.arguments.as_str())
            .ok_or_else(|| SageError::Oracle {
                model: self.model.clone(),
                message: "response contained no tool call".to_string(),
            })?;

        serde_json::from_str(arguments).map_err(|e| SageError::Oracle {
            model: self.model.clone(),
            message: format!("malformed decision arguments: {e}"),
        })
    }
}

#[async_trait]
impl DecisionOracle for OpenAiOracle {
    async fn request_decision(&self, context: &MarketContext) -> Result<Decision, SageError> {
        let request = self.build_request(context);
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_BACKOFF_MS * 2u64.pow(attempt - 1);
                debug!(attempt, delay_ms = delay, "Retrying OpenAI call");
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }

            let resp = match self
                .http
                .post(OPENAI_API_URL)
                .header(
                    "Authorization",
                    format!("Bearer {}", self.api_key.expose_secret()),
                )
                .json(&request)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, attempt, "OpenAI request failed");
                    last_error = Some(SageError::collaborator("oracle", e));
                    continue;
                }
            };

            let status = resp.status();
            let body = resp
                .text()
                .await
                .map_err(|e| SageError::collaborator("oracle", e))?;

            if status.as_u16() == 429 || status.is_server_error() {
                warn!(%status, attempt, "OpenAI transient error");
                last_error = Some(SageError::Oracle {
                    model: self.model.clone(),
                    message: format!("HTTP {status}"),
                });
                continue;
            }

            if !status.is_success() {
                return Err(SageError::Oracle {
                    model: self.model.clone(),
                    message: format!("HTTP {status}: {body}"),
                });
            }

            let decision = self.parse_decision(&body)?;
            debug!(%decision, "Oracle decision received");
            return Ok(decision);
        }

        Err(last_error.unwrap_or_else(|| SageError::Oracle {
            model: self.model.clone(),
            message: "retries exhausted".to_string(),
        }))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
