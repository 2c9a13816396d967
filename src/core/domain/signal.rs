//! Strategy proposals consumed once by the risk manager.

use rust_decimal::Decimal;

use super::{Pair, Side};

/// A strategy's proposal to buy or sell. Not yet an order — carries the
/// originating strategy name for audit, and is dropped after the risk
/// manager consumes it (approved or rejected).
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pair: Pair,
    side: Side,
    quantity: Decimal,
    strategy: &'static str,
}

impl Signal {
    #[must_use]
    pub const fn buy(pair: Pair, quantity: Decimal, strategy: &'static str) -> Self {
        Self {
            pair,
            side: Side::Buy,
            quantity,
            strategy,
        }
    }

    #[must_use]
    pub const fn sell(pair: Pair, quantity: Decimal, strategy: &'static str) -> Self {
        Self {
            pair,
            side: Side::Sell,
            quantity,
            strategy,
        }
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
    pub const fn strategy(&self) -> &'static str {
        self.strategy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn buy_signal_accessors() {
        let signal = Signal::buy(Pair::from("BTC/USDT"), dec!(0.04), "rsi");
        assert_eq!(signal.side(), Side::Buy);
        assert_eq!(signal.quantity(), dec!(0.04));
        assert_eq!(signal.strategy(), "rsi");
    }

    #[test]
    fn sell_signal_accessors() {
        let signal = Signal::sell(Pair::from("ETH/USDT"), dec!(1.5), "macd");
        assert_eq!(signal.side(), Side::Sell);
    }
}
