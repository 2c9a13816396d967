//! Pure domain types shared by every subsystem.
//!
//! Nothing in this module performs I/O. Construction goes through validating
//! constructors where an invariant exists (see [`DomainError`]); plain data
//! carriers (e.g. [`MarketEvent`]) are built with `new`.

pub mod event;
mod fill;
mod market;
mod order;
mod position;
mod rejection;
mod signal;
mod trade;

pub use event::{Event, TriggerKind};
pub use fill::Fill;
pub use market::MarketEvent;
pub use order::{Order, OrderKind, OrderOrigin};
pub use position::{Position, PositionId};
pub use rejection::RejectionReason;
pub use signal::Signal;
pub use trade::Trade;

use std::fmt;

pub use crate::error::DomainError;

/// An exchange trading symbol, e.g. `BTC/USDT`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Pair(String);

impl Pair {
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Pair {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Pair {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// +1 for `Buy`, -1 for `Sell`, used to sign `pnl_usd`.
    #[must_use]
    pub fn sign(self) -> rust_decimal::Decimal {
        match self {
            Self::Buy => rust_decimal::Decimal::ONE,
            Self::Sell => -rust_decimal::Decimal::ONE,
        }
    }

    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Which capability backs the exchange client for this process lifetime.
/// Fixed per process (no in-flight mode switching).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Live,
    Paper,
}

impl fmt::Display for TradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Paper => write!(f, "paper"),
        }
    }
}
