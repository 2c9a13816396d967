//! Paper-trading exchange client: fills synchronously against the latest
//! observed market event, simulating slippage with a configurable basis-point
//! offset. Never fails transport.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::Decimal;

use crate::core::domain::{Fill, MarketEvent, Order, Pair, Position, Side};
use crate::core::exchange::{ExchangeClient, SubmissionError};

/// A paper exchange client. Holds the most recently observed [`MarketEvent`]
/// per pair so a fill can be simulated without any network round trip.
pub struct PaperClient {
    slippage_bps: Decimal,
    last_seen: RwLock<HashMap<Pair, MarketEvent>>,
}

impl PaperClient {
    #[must_use]
    pub fn new(slippage_bps: Decimal) -> Self {
        Self {
            slippage_bps,
            last_seen: RwLock::new(HashMap::new()),
        }
    }

    /// Feeds the client a market event so subsequent fills can reference it.
    /// Called by the ingestor on every tick when running in paper mode.
    pub fn observe(&self, event: MarketEvent) {
        self.last_seen.write().insert(event.pair().clone(), event);
    }
}

#[async_trait]
impl ExchangeClient for PaperClient {
    async fn submit_order(&self, order: &Order) -> Result<Fill, SubmissionError> {
        let market = self
            .last_seen
            .read()
            .get(order.pair())
            .cloned()
            .ok_or_else(|| SubmissionError::Rejected {
                reason: format!("no market data observed yet for {}", order.pair()),
            })?;

        let bps_fraction = self.slippage_bps / Decimal::from(10_000);
        let executed_price = match order.side() {
            Side::Buy => market.ask() * (Decimal::ONE + bps_fraction),
            Side::Sell => market.bid() * (Decimal::ONE - bps_fraction),
        };

        Ok(Fill::new(
            executed_price,
            order.quantity(),
            market.timestamp(),
            "paper".to_string(),
        ))
    }

    async fn open_positions(&self) -> Result<Vec<Position>, SubmissionError> {
        // The paper exchange has no state of its own; the ledger is the
        // source of truth for paper-mode positions.
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    use crate::core::domain::OrderKind;
    use crate::core::domain::OrderOrigin;

    fn sample_market() -> MarketEvent {
        MarketEvent::new(Pair::from("BTC/USDT"), 1, dec!(19990), dec!(20000), dec!(19995), None)
    }

    #[tokio::test]
    async fn buy_fills_above_ask_by_slippage() {
        let client = PaperClient::new(dec!(10));
        client.observe(sample_market());
        let order = Order::try_new(
            Pair::from("BTC/USDT"),
            Side::Buy,
            dec!(0.1),
            dec!(20000),
            OrderKind::Market,
            OrderOrigin::Strategy,
        )
        .unwrap();
        let fill = client.submit_order(&order).await.unwrap();
        assert_eq!(fill.executed_price(), dec!(20000) * (Decimal::ONE + dec!(10) / dec!(10000)));
    }

    #[tokio::test]
    async fn sell_fills_below_bid_by_slippage() {
        let client = PaperClient::new(dec!(10));
        client.observe(sample_market());
        let order = Order::try_new(
            Pair::from("BTC/USDT"),
            Side::Sell,
            dec!(0.1),
            dec!(19990),
            OrderKind::Market,
            OrderOrigin::Strategy,
        )
        .unwrap();
        let fill = client.submit_order(&order).await.unwrap();
        assert_eq!(fill.executed_price(), dec!(19990) * (Decimal::ONE - dec!(10) / dec!(10000)));
    }

    #[tokio::test]
    async fn rejects_when_no_market_data_observed() {
        let client = PaperClient::new(dec!(10));
        let order = Order::try_new(
            Pair::from("ETH/USDT"),
            Side::Buy,
            dec!(1),
            dec!(3000),
            OrderKind::Market,
            OrderOrigin::Strategy,
        )
        .unwrap();
        assert!(client.submit_order(&order).await.is_err());
    }
}
