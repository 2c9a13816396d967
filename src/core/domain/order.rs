//! Orders: the only thing the executor is ever handed.
//!
//! An `Order` only exists after the risk manager has approved a [`Signal`]
//! (or generated one itself, for a triggered close) — there is no
//! constructor that skips the risk path; see [`OrderOrigin`].

use rust_decimal::Decimal;

use super::{DomainError, Pair, Side};

/// How an order should be worked at the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum OrderKind {
    Market,
    Limit,
}

/// What produced this order. Carried through to the trade record for audit;
/// the executor itself treats every origin identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum OrderOrigin {
    /// A strategy signal that passed every risk rule.
    Strategy,
    /// Generated by the risk manager's price monitor, stop-loss side.
    StopLoss,
    /// Generated by the risk manager's price monitor, take-profit side.
    TakeProfit,
    /// Generated by the drawdown circuit breaker to flatten a position.
    DrawdownLiquidation,
}

/// An approved instruction to trade, handed to the [`crate::core::exchange::ExchangeClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pair: Pair,
    side: Side,
    quantity: Decimal,
    reference_price: Decimal,
    kind: OrderKind,
    origin: OrderOrigin,
}

impl Order {
    /// # Errors
    /// Returns [`DomainError::NonPositiveQuantity`] or
    /// [`DomainError::NonPositivePrice`] if either value is not strictly
    /// positive.
    pub fn try_new(
        pair: Pair,
        side: Side,
        quantity: Decimal,
        reference_price: Decimal,
        kind: OrderKind,
        origin: OrderOrigin,
    ) -> Result<Self, DomainError> {
        if quantity <= Decimal::ZERO {
            return Err(DomainError::NonPositiveQuantity { quantity });
        }
        if reference_price <= Decimal::ZERO {
            return Err(DomainError::NonPositivePrice { price: reference_price });
        }
        Ok(Self {
            pair,
            side,
            quantity,
            reference_price,
            kind,
            origin,
        })
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
    pub const fn quantity(&self) -> Decimal {
        self.quantity
    }

    #[must_use]
    pub const fn reference_price(&self) -> Decimal {
        self.reference_price
    }

    #[must_use]
    pub const fn kind(&self) -> OrderKind {
        self.kind
    }

    #[must_use]
    pub const fn origin(&self) -> OrderOrigin {
        self.origin
    }

    /// Notional value at the reference price, used by the exposure-limit check.
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.quantity * self.reference_price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rejects_non_positive_quantity() {
        let err = Order::try_new(
            Pair::from("BTC/USDT"),
            Side::Buy,
            dec!(0),
            dec!(20000),
            OrderKind::Market,
            OrderOrigin::Strategy,
        )
        .unwrap_err();
        assert_eq!(err, DomainError::NonPositiveQuantity { quantity: dec!(0) });
    }

    #[test]
    fn rejects_non_positive_price() {
        let err = Order::try_new(
            Pair::from("BTC/USDT"),
            Side::Buy,
            dec!(1),
            dec!(-1),
            OrderKind::Market,
            OrderOrigin::Strategy,
        )
        .unwrap_err();
        assert_eq!(err, DomainError::NonPositivePrice { price: dec!(-1) });
    }

    #[test]
    fn notional_is_quantity_times_price() {
        let order = Order::try_new(
            Pair::from("BTC/USDT"),
            Side::Buy,
            dec!(0.5),
            dec!(20000),
            OrderKind::Market,
            OrderOrigin::Strategy,
        )
        .unwrap();
        assert_eq!(order.notional(), dec!(10000));
    }
}
