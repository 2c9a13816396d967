//! Exchange fill confirmations returned from the executor's submission path.

use rust_decimal::Decimal;

/// What the exchange actually did with an [`super::Order`]. The executed
/// price can differ from the order's reference price (slippage); the
/// exchange's own identifier is kept for reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    executed_price: Decimal,
    executed_quantity: Decimal,
    executed_at: i64,
    exchange_id: String,
}

impl Fill {
    #[must_use]
    pub const fn new(
        executed_price: Decimal,
        executed_quantity: Decimal,
        executed_at: i64,
        exchange_id: String,
    ) -> Self {
        Self {
            executed_price,
            executed_quantity,
            executed_at,
            exchange_id,
        }
    }

    #[must_use]
    pub const fn executed_price(&self) -> Decimal {
        self.executed_price
    }

    #[must_use]
    pub const fn executed_quantity(&self) -> Decimal {
        self.executed_quantity
    }

    #[must_use]
    pub const fn executed_at(&self) -> i64 {
        self.executed_at
    }

    #[must_use]
    pub fn exchange_id(&self) -> &str {
        &self.exchange_id
    }
}
