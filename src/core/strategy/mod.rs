//! Strategy Engine (C4): a registry of pluggable strategies, each fed a
//! per-pair slice of [`MarketEvent`]s, each producing at most one [`Signal`].

mod macd;
mod rsi;

pub use macd::MacdStrategy;
pub use rsi::RsiStrategy;

use std::collections::HashMap;

use crate::core::domain::{MarketEvent, Pair, Signal};

/// A pluggable trading strategy. Implementations must be pure with respect
/// to their own interior state — no I/O, no side effects observable outside
/// the strategy — though they may keep bounded rolling state keyed by pair.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Evaluates the latest event for one pair, returning a proposal if the
    /// strategy's rule fires. `events_for_pair` is the rolling window this
    /// strategy has been configured to retain — the slice is the strategy's
    /// own buffer, appended to before each call.
    fn evaluate(&mut self, pair: &Pair, events_for_pair: &[MarketEvent]) -> Option<Signal>;
}

/// Which strategies are active for which pairs, and the rolling per-pair
/// event buffers each strategy reads from. Fan-out delivers each
/// [`MarketEvent`] to the set of strategies configured for its pair;
/// strategies configured for disjoint pair sets see disjoint streams.
pub struct StrategyRegistry {
    /// `pair -> strategies subscribed to it`.
    assignments: HashMap<Pair, Vec<Box<dyn Strategy>>>,
    /// `pair -> rolling window of recent events`, bounded per pair.
    windows: HashMap<Pair, Vec<MarketEvent>>,
    window_capacity: usize,
}

impl StrategyRegistry {
    #[must_use]
    pub fn new(window_capacity: usize) -> Self {
        Self {
            assignments: HashMap::new(),
            windows: HashMap::new(),
            window_capacity,
        }
    }

    /// Registers `strategy` to receive events for `pair`.
    pub fn register(&mut self, pair: Pair, strategy: Box<dyn Strategy>) {
        self.assignments.entry(pair).or_default().push(strategy);
    }

    /// Feeds one [`MarketEvent`] through every strategy registered for its
    /// pair, returning the signals (if any) they produced, in registration
    /// order.
    pub fn dispatch(&mut self, event: MarketEvent) -> Vec<Signal> {
        let pair = event.pair().clone();
        let window = self.windows.entry(pair.clone()).or_default();
        window.push(event.clone());
        if window.len() > self.window_capacity {
            let overflow = window.len() - self.window_capacity;
            window.drain(0..overflow);
        }
        let window_snapshot = window.clone();

        let Some(strategies) = self.assignments.get_mut(&pair) else {
            return Vec::new();
        };

        strategies
            .iter_mut()
            .filter_map(|strategy| strategy.evaluate(&pair, &window_snapshot))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    struct AlwaysBuy;
    impl Strategy for AlwaysBuy {
        fn name(&self) -> &'static str {
            "always_buy"
        }
        fn evaluate(&mut self, pair: &Pair, events: &[MarketEvent]) -> Option<Signal> {
            events.last().map(|_| Signal::buy(pair.clone(), dec!(1), "always_buy"))
        }
    }

    #[test]
    fn dispatch_routes_only_to_registered_pair() {
        let mut registry = StrategyRegistry::new(10);
        registry.register(Pair::from("BTC/USDT"), Box::new(AlwaysBuy));

        let btc_event = MarketEvent::new(Pair::from("BTC/USDT"), 1, dec!(1), dec!(2), dec!(1.5), None);
        let eth_event = MarketEvent::new(Pair::from("ETH/USDT"), 1, dec!(1), dec!(2), dec!(1.5), None);

        assert_eq!(registry.dispatch(btc_event).len(), 1);
        assert_eq!(registry.dispatch(eth_event).len(), 0);
    }

    #[test]
    fn window_is_bounded() {
        let mut registry = StrategyRegistry::new(3);
        registry.register(Pair::from("BTC/USDT"), Box::new(AlwaysBuy));
        for i in 0..10 {
            let event = MarketEvent::new(Pair::from("BTC/USDT"), i, dec!(1), dec!(2), dec!(1.5), None);
            registry.dispatch(event);
        }
        assert_eq!(registry.windows.get(&Pair::from("BTC/USDT")).unwrap().len(), 3);
    }
}
