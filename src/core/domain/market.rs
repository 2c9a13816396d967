//! Market event snapshots published by the ingestor.

use rust_decimal::Decimal;

use super::Pair;

/// A snapshot of a single pair at a single instant. Immutable once produced.
///
/// `timestamp` is source-stamped (the exchange's own event time), not the
/// time we observed it locally.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketEvent {
    pair: Pair,
    timestamp: i64,
    bid: Decimal,
    ask: Decimal,
    last: Decimal,
    volume: Option<Decimal>,
}

impl MarketEvent {
    #[must_use]
    pub const fn new(
        pair: Pair,
        timestamp: i64,
        bid: Decimal,
        ask: Decimal,
        last: Decimal,
        volume: Option<Decimal>,
    ) -> Self {
        Self {
            pair,
            timestamp,
            bid,
            ask,
            last,
            volume,
        }
    }

    #[must_use]
    pub const fn pair(&self) -> &Pair {
        &self.pair
    }

    #[must_use]
    pub const fn timestamp(&self) -> i64 {
        self.timestamp
    }

    #[must_use]
    pub const fn bid(&self) -> Decimal {
        self.bid
    }

    #[must_use]
    pub const fn ask(&self) -> Decimal {
        self.ask
    }

    #[must_use]
    pub const fn last(&self) -> Decimal {
        self.last
    }

    #[must_use]
    pub const fn volume(&self) -> Option<Decimal> {
        self.volume
    }

    /// `ask - bid`, used by the risk manager's stop-loss proximity check.
    #[must_use]
    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }
}
