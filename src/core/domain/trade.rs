//! Closed positions, persisted as the realized trade history.

use rust_decimal::Decimal;

use super::{Pair, Position, PositionId, Side, TradingMode};

/// A [`Position`] that has been fully closed. Realized PnL is computed once,
/// at construction, from the entry and exit legs.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    position_id: PositionId,
    pair: Pair,
    side: Side,
    entry_price: Decimal,
    exit_price: Decimal,
    quantity: Decimal,
    mode: TradingMode,
    opened_at: i64,
    closed_at: i64,
    pnl_usd: Decimal,
}

impl Trade {
    #[must_use]
    pub fn close(position: &Position, exit_price: Decimal, closed_at: i64) -> Self {
        let pnl_usd = (exit_price - position.entry_price()) * position.quantity() * position.side().sign();
        Self {
            position_id: position.id(),
            pair: position.pair().clone(),
            side: position.side(),
            entry_price: position.entry_price(),
            exit_price,
            quantity: position.quantity(),
            mode: position.mode(),
            opened_at: position.opened_at(),
            closed_at,
            pnl_usd,
        }
    }

    #[must_use]
    pub const fn position_id(&self) -> PositionId {
        self.position_id
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
    pub const fn exit_price(&self) -> Decimal {
        self.exit_price
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

    #[must_use]
    pub const fn closed_at(&self) -> i64 {
        self.closed_at
    }

    #[must_use]
    pub const fn pnl_usd(&self) -> Decimal {
        self.pnl_usd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn pnl_positive_for_profitable_long() {
        let position = Position::try_new(
            Pair::from("BTC/USDT"),
            Side::Buy,
            dec!(20000),
            dec!(0.5),
            TradingMode::Paper,
            1,
        )
        .unwrap();
        let trade = Trade::close(&position, dec!(21000), 2);
        assert_eq!(trade.pnl_usd(), dec!(500));
    }

    #[test]
    fn pnl_positive_for_profitable_short() {
        let position = Position::try_new(
            Pair::from("BTC/USDT"),
            Side::Sell,
            dec!(20000),
            dec!(0.5),
            TradingMode::Paper,
            1,
        )
        .unwrap();
        let trade = Trade::close(&position, dec!(19000), 2);
        assert_eq!(trade.pnl_usd(), dec!(500));
    }

    #[test]
    fn round_trip_at_entry_price_is_zero() {
        let position = Position::try_new(
            Pair::from("BTC/USDT"),
            Side::Buy,
            dec!(20000),
            dec!(0.5),
            TradingMode::Paper,
            1,
        )
        .unwrap();
        let trade = Trade::close(&position, dec!(20000), 2);
        assert_eq!(trade.pnl_usd(), dec!(0));
    }
}
