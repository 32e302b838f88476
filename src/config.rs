//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::fs;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub trading: TradingConfig,
    pub oracle: OracleConfig,
    pub exchange: ExchangeConfig,
    pub database: DatabaseConfig,
    pub reflection: ReflectionConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    /// Traded pair, e.g. "KRW-BTC".
    pub pair: String,
    /// Quote currency symbol, e.g. "KRW".
    pub currency: String,
}

/// Sizing and cadence parameters for the trading cycle.
#[derive(Debug, Deserialize, Clone)]
pub struct TradingConfig {
    /// Smallest notional the venue permits per order (quote units).
    #[serde(default = "default_minimum_trade_amount")]
    pub minimum_trade_amount: Decimal,
    /// Fraction of the available balance committed per order, leaving
    /// headroom for fees and slippage.
    #[serde(default = "default_trade_ratio")]
    pub trade_ratio: Decimal,
    #[serde(default = "default_fee_rate")]
    pub fee_rate: Decimal,
    /// Seconds between trading cycles.
    #[serde(default = "default_analysis_interval")]
    pub analysis_interval_secs: u64,
    /// Cooldown after a failed cycle, shorter than the interval.
    #[serde(default = "default_cycle_cooldown")]
    pub cycle_cooldown_secs: u64,
    /// Per-call timeout for every external collaborator.
    #[serde(default = "default_collaborator_timeout")]
    pub collaborator_timeout_secs: u64,
}

fn default_minimum_trade_amount() -> Decimal {
    dec!(5000)
}
fn default_trade_ratio() -> Decimal {
    dec!(0.95)
}
fn default_fee_rate() -> Decimal {
    dec!(0.0005)
}
fn default_analysis_interval() -> u64 {
    300
}
fn default_cycle_cooldown() -> u64 {
    60
}
fn default_collaborator_timeout() -> u64 {
    30
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            minimum_trade_amount: default_minimum_trade_amount(),
            trade_ratio: default_trade_ratio(),
            fee_rate: default_fee_rate(),
            analysis_interval_secs: default_analysis_interval(),
            cycle_cooldown_secs: default_cycle_cooldown(),
            collaborator_timeout_secs: default_collaborator_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OracleConfig {
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    pub max_tokens: u32,
    /// Lower temperature keeps the decision conservative.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

fn default_temperature() -> f64 {
    0.3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExchangeConfig {
    pub access_key_env: String,
    pub secret_key_env: String,
    /// Paper mode simulates fills in memory — no credentials needed.
    #[serde(default)]
    pub paper: bool,
    /// Initial cash for paper mode.
    #[serde(default = "default_paper_cash")]
    pub paper_initial_cash: Decimal,
    /// Simulated mark price for paper mode.
    #[serde(default = "default_paper_mark")]
    pub paper_mark_price: Decimal,
}

fn default_paper_cash() -> Decimal {
    dec!(1000000)
}

fn default_paper_mark() -> Decimal {
    dec!(50000000)
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// sqlite URL, or "memory" for the in-process store.
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReflectionConfig {
    #[serde(default = "default_true")]
    pub daily: bool,
    #[serde(default = "default_true")]
    pub weekly: bool,
    #[serde(default = "default_true")]
    pub monthly: bool,
    /// UTC hour at which periodic reflection triggers fire.
    #[serde(default)]
    pub trigger_hour: u32,
}

fn default_true() -> bool {
    true
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            daily: true,
            weekly: true,
            monthly: true,
            trigger_hour: 0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub enabled: bool,
    pub port: u16,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Sanity-check parameter ranges before anything runs with them.
    pub fn validate(&self) -> Result<()> {
        if self.trading.trade_ratio <= Decimal::ZERO || self.trading.trade_ratio > Decimal::ONE {
            anyhow::bail!(
                "trade_ratio must be in (0, 1], got {}",
                self.trading.trade_ratio
            );
        }
        if self.trading.fee_rate < Decimal::ZERO || self.trading.fee_rate >= Decimal::ONE {
            anyhow::bail!("fee_rate must be in [0, 1), got {}", self.trading.fee_rate);
        }
        if self.trading.minimum_trade_amount <= Decimal::ZERO {
            anyhow::bail!("minimum_trade_amount must be positive");
        }
        if self.reflection.trigger_hour > 23 {
            anyhow::bail!(
                "reflection trigger_hour must be 0-23, got {}",
                self.reflection.trigger_hour
            );
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
