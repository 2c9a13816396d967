//! Open positions held by the position ledger.

use rust_decimal::Decimal;
use uuid::Uuid;

use super::{DomainError, Pair, Side, TradingMode};

/// Unique identifier for a [`Position`], also used as the primary key in the
/// persisted row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct PositionId(Uuid);

impl PositionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for PositionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PositionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single open position. The ledger enforces at most one open position per
/// `(pair, side, mode)` triple; see [`DomainError::DuplicatePosition`].
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    id: PositionId,
    pair: Pair,
    side: Side,
    entry_price: Decimal,
    quantity: Decimal,
    mode: TradingMode,
    opened_at: i64,
}

impl Position {
    /// # Errors
    /// Returns [`DomainError::NonPositiveQuantity`] or
    /// [`DomainError::NonPositivePrice`] if either value is not strictly
    /// positive.
    pub fn try_new(
        pair: Pair,
        side: Side,
        entry_price: Decimal,
        quantity: Decimal,
        mode: TradingMode,
        opened_at: i64,
    ) -> Result<Self, DomainError> {
        if quantity <= Decimal::ZERO {
            return Err(DomainError::NonPositiveQuantity { quantity });
        }
        if entry_price <= Decimal::ZERO {
            return Err(DomainError::NonPositivePrice { price: entry_price });
        }
        Ok(Self {
            id: PositionId::new(),
            pair,
            side,
            entry_price,
            quantity,
            mode,
            opened_at,
        })
    }

    #[must_use]
    pub const fn id(&self) -> PositionId {
        self.id
    }

    #[must_use]
    pub const fn pair(&self) -> &Pair {
        &self.pair
    }

    #[must_use]
    pub const fn side(&self) -> Side {
        self.side
    }

    #[must_use]
    pub const fn entry_price(&self) -> Decimal {
        self.entry_price
    }

    #[must_use]
    pub const fn quantity(&self) -> Decimal {
        self.quantity
    }

    #[must_use]
    pub const fn mode(&self) -> TradingMode {
        self.mode
    }

    #[must_use]
    pub const fn opened_at(&self) -> i64 {
        self.opened_at
    }

    /// Notional value at entry.
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.entry_price * self.quantity
    }

    /// Unrealized PnL at the given mark price, signed by side.
    #[must_use]
    pub fn unrealized_pnl(&self, mark_price: Decimal) -> Decimal {
        (mark_price - self.entry_price) * self.quantity * self.side.sign()
    }
}
