//! Crate-wide error taxonomy.
//!
//! Each subsystem gets its own `thiserror` enum; [`Error`] aggregates them so
//! call sites can propagate with `?` regardless of which layer failed.

use thiserror::Error;

use crate::core::domain::RejectionReason;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("domain invariant violated: {0}")]
    Domain(#[from] DomainError),

    #[error("risk check failed: {0}")]
    Risk(#[from] RiskError),

    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("channel closed: {0}")]
    ChannelClosed(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Startup/configuration failures. Each variant maps to a non-zero process
/// exit with a descriptive message, per the error handling design.
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    ReadFile(String),

    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("missing required configuration field `{field}`")]
    MissingField { field: &'static str },

    #[error("invalid trading mode `{0}` (expected `live` or `paper`)")]
    InvalidTradingMode(String),

    #[error("unknown strategy type `{0}`")]
    UnknownStrategyType(String),
}

/// Domain invariant violations raised by type constructors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("quantity must be positive, got {quantity}")]
    NonPositiveQuantity { quantity: rust_decimal::Decimal },

    #[error("entry price must be positive, got {price}")]
    NonPositivePrice { price: rust_decimal::Decimal },

    #[error("quantity is not a finite number")]
    NonFiniteQuantity,

    #[error("duplicate open position for pair {pair} side {side:?} mode {mode:?}")]
    DuplicatePosition {
        pair: String,
        side: crate::core::domain::Side,
        mode: crate::core::domain::TradingMode,
    },
}

/// Risk-gateway rejections. Carries the same shape as [`RejectionReason`] so
/// a [`RiskError`] can be turned directly into an event payload.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskError {
    #[error("exposure limit exceeded: notional {notional} > max {max}")]
    ExposureLimitExceeded {
        notional: rust_decimal::Decimal,
        max: rust_decimal::Decimal,
    },

    #[error("entry would already be within the stop-loss band")]
    StopLossProximity,

    #[error("hard ceiling of {max} open orders reached")]
    HardCeilingReached { max: usize },

    #[error("drawdown circuit breaker is halted")]
    DrawdownHalted,

    #[error("unknown pair `{0}`")]
    UnknownPair(String),

    #[error("invalid quantity: {0}")]
    InvalidQuantity(rust_decimal::Decimal),
}

impl RiskError {
    /// Closed-set classification used when emitting `RejectionEvent`.
    #[must_use]
    pub const fn reason(&self) -> RejectionReason {
        match self {
            Self::ExposureLimitExceeded { .. } => RejectionReason::ExposureLimitExceeded,
            Self::StopLossProximity => RejectionReason::StopLossProximity,
            Self::HardCeilingReached { .. } => RejectionReason::HardCeilingReached,
            Self::DrawdownHalted => RejectionReason::DrawdownHalted,
            Self::UnknownPair(_) => RejectionReason::UnknownPair,
            Self::InvalidQuantity(_) => RejectionReason::InvalidQuantity,
        }
    }
}

/// Failures from the order-submission path.
#[derive(Error, Debug, Clone)]
pub enum ExecutionError {
    #[error("order rejected by exchange: {reason}")]
    Rejected { reason: String },

    #[error("transport failure (retryable={retryable})")]
    Transport { retryable: bool },

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("order submission timed out")]
    Timeout,

    /// The market data stream did not establish within the startup window.
    #[error("market data stream unavailable: did not connect within {timeout_secs}s")]
    StreamUnavailable { timeout_secs: u64 },
}

/// Persistence-layer failures.
#[derive(Error, Debug, Clone)]
pub enum PersistenceError {
    #[error("connection pool error: {0}")]
    Connection(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("serialization error: {0}")]
    Serialize(String),
}
