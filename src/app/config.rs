//! Application configuration loading and validation.
//!
//! Configuration is loaded from a TOML file, with the exchange API secret
//! overridden from an environment variable so it never has to live in the
//! config file on disk.

use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};

use crate::core::domain::TradingMode;
use crate::error::{ConfigError, Result};

/// Hard ceiling on simultaneously open orders. A compile-time constant per
/// the risk manager design — not user-configurable, so a misconfigured
/// `risk.toml` can never raise it.
pub const MAX_OPEN_ORDERS: usize = 50;

/// Top-level configuration, loaded once at startup from a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mode: TradingMode,
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub paper: PaperConfig,
    #[serde(default)]
    pub strategies: StrategiesConfig,
    #[serde(default)]
    pub reconnection: ReconnectionConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
}

impl Default for TradingMode {
    fn default() -> Self {
        Self::Paper
    }
}

/// Exchange connection details. `api_secret` is always taken from the
/// `EXCHANGE_API_SECRET` environment variable at load time, never from the
/// file, regardless of what (if anything) is present here.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    pub ws_url: String,
    pub rest_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(skip, default)]
    pub api_secret: String,
    #[serde(default)]
    pub pairs: Vec<String>,
}

/// Risk parameters. Every field here maps directly onto a signal-path or
/// price-monitor rule in the risk manager; `max_open_orders` intentionally
/// is not a field — see [`MAX_OPEN_ORDERS`].
#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: Decimal,
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: Decimal,
    #[serde(default = "default_max_exposure_per_trade")]
    pub max_exposure_per_trade: Decimal,
    #[serde(default = "default_max_drawdown_pct")]
    pub max_drawdown_pct: Decimal,
}

fn default_stop_loss_pct() -> Decimal {
    Decimal::new(2, 2) // 0.02
}

fn default_take_profit_pct() -> Decimal {
    Decimal::new(4, 2) // 0.04
}

fn default_max_exposure_per_trade() -> Decimal {
    Decimal::new(1000, 0) // 1000 USD
}

fn default_max_drawdown_pct() -> Decimal {
    Decimal::new(20, 2) // 0.20
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            stop_loss_pct: default_stop_loss_pct(),
            take_profit_pct: default_take_profit_pct(),
            max_exposure_per_trade: default_max_exposure_per_trade(),
            max_drawdown_pct: default_max_drawdown_pct(),
        }
    }
}

/// Paper-trading fill simulation parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct PaperConfig {
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: Decimal,
    #[serde(default = "default_starting_value")]
    pub starting_value: Decimal,
}

fn default_slippage_bps() -> Decimal {
    Decimal::new(10, 0)
}

fn default_starting_value() -> Decimal {
    Decimal::new(10_000, 0)
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            slippage_bps: default_slippage_bps(),
            starting_value: default_starting_value(),
        }
    }
}

/// Which strategies are active, per pair. `enabled` names must match a
/// registered [`crate::core::strategy::Strategy::name`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StrategiesConfig {
    #[serde(default = "default_enabled_strategies")]
    pub enabled: Vec<String>,
    #[serde(default)]
    pub rsi: RsiConfig,
    #[serde(default)]
    pub macd: MacdConfig,
}

fn default_enabled_strategies() -> Vec<String> {
    vec!["rsi".to_string()]
}

#[derive(Debug, Clone, Deserialize)]
pub struct RsiConfig {
    #[serde(default = "default_rsi_period")]
    pub period: usize,
    #[serde(default = "default_rsi_overbought")]
    pub overbought: Decimal,
    #[serde(default = "default_rsi_oversold")]
    pub oversold: Decimal,
    #[serde(default = "default_strategy_quantity")]
    pub quantity: Decimal,
}

const fn default_rsi_period() -> usize {
    14
}

fn default_rsi_overbought() -> Decimal {
    Decimal::new(70, 0)
}

fn default_rsi_oversold() -> Decimal {
    Decimal::new(30, 0)
}

fn default_strategy_quantity() -> Decimal {
    Decimal::new(1, 2) // 0.01
}

impl Default for RsiConfig {
    fn default() -> Self {
        Self {
            period: default_rsi_period(),
            overbought: default_rsi_overbought(),
            oversold: default_rsi_oversold(),
            quantity: default_strategy_quantity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MacdConfig {
    #[serde(default = "default_macd_fast")]
    pub fast: usize,
    #[serde(default = "default_macd_slow")]
    pub slow: usize,
    #[serde(default = "default_macd_signal")]
    pub signal: usize,
    #[serde(default = "default_strategy_quantity")]
    pub quantity: Decimal,
}

const fn default_macd_fast() -> usize {
    12
}

const fn default_macd_slow() -> usize {
    26
}

const fn default_macd_signal() -> usize {
    9
}

impl Default for MacdConfig {
    fn default() -> Self {
        Self {
            fast: default_macd_fast(),
            slow: default_macd_slow(),
            signal: default_macd_signal(),
            quantity: default_strategy_quantity(),
        }
    }
}

/// Market-data reconnect policy, shared by every [`crate::core::exchange::MarketDataStream`].
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectionConfig {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
}

const fn default_initial_delay_ms() -> u64 {
    1_000
}

const fn default_max_delay_ms() -> u64 {
    60_000
}

const fn default_backoff_multiplier() -> f64 {
    2.0
}

const fn default_max_consecutive_failures() -> u32 {
    10
}

impl Default for ReconnectionConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_consecutive_failures: default_max_consecutive_failures(),
        }
    }
}

/// Persistence location for the position ledger.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
}

fn default_database_url() -> String {
    "tradecore.sqlite3".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Telegram bot settings. `bot_token` comes from `TELEGRAM_BOT_TOKEN`, never
/// the file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(skip, default)]
    pub bot_token: String,
    #[serde(default)]
    pub allowed_chat_ids: Vec<i64>,
}

impl Config {
    /// Loads `path`, overlays secrets from the environment, and validates
    /// the result.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(e.to_string()))?;
        let mut config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.exchange.api_secret = std::env::var("EXCHANGE_API_SECRET").unwrap_or_default();
        config.telegram.bot_token = std::env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default();

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.exchange.ws_url.is_empty() {
            return Err(ConfigError::MissingField { field: "exchange.ws_url" }.into());
        }
        if self.exchange.rest_url.is_empty() {
            return Err(ConfigError::MissingField { field: "exchange.rest_url" }.into());
        }
        if self.exchange.pairs.is_empty() {
            return Err(ConfigError::MissingField { field: "exchange.pairs" }.into());
        }
        if matches!(self.mode, TradingMode::Live) && self.exchange.api_secret.is_empty() {
            return Err(ConfigError::MissingField { field: "EXCHANGE_API_SECRET" }.into());
        }
        Ok(())
    }

    /// Initializes the global tracing subscriber from the logging config.
    /// `RUST_LOG` takes precedence over `logging.level` when set.
    pub fn init_logging(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.logging.level));

        match self.logging.format.as_str() {
            "json" => {
                fmt().json().with_env_filter(filter).init();
            }
            _ => {
                fmt().with_env_filter(filter).init();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_risk_config_matches_spec_defaults() {
        let risk = RiskConfig::default();
        assert_eq!(risk.stop_loss_pct, Decimal::new(2, 2));
        assert_eq!(risk.take_profit_pct, Decimal::new(4, 2));
    }

    #[test]
    fn validate_rejects_missing_pairs() {
        let config = Config {
            mode: TradingMode::Paper,
            exchange: ExchangeConfig {
                ws_url: "wss://example".to_string(),
                rest_url: "https://example".to_string(),
                api_key: String::new(),
                api_secret: String::new(),
                pairs: vec![],
            },
            risk: RiskConfig::default(),
            paper: PaperConfig::default(),
            strategies: StrategiesConfig::default(),
            reconnection: ReconnectionConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            telegram: TelegramConfig::default(),
        };
        assert!(config.validate().is_err());
    }
}
