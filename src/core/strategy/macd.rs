//! Classical EMA-difference MACD indicator and the strategy built on it.

use rust_decimal::Decimal;

use crate::app::config::MacdConfig;
use crate::core::domain::{MarketEvent, Pair, Signal};
use crate::core::strategy::Strategy;

/// Edge-triggered crossing of the MACD line over its signal line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MacdCrossing {
    Bullish,
    Bearish,
}

fn ema_alpha(period: usize) -> Decimal {
    Decimal::from(2) / Decimal::from(period + 1)
}

/// Classical EMA-difference MACD. `None` until both EMAs and the signal line
/// have stabilized (`>= slow + signal` samples), per the spec.
struct Macd {
    fast_alpha: Decimal,
    slow_alpha: Decimal,
    signal_alpha: Decimal,
    stabilize_after: usize,
    ema_fast: Option<Decimal>,
    ema_slow: Option<Decimal>,
    signal_line: Option<Decimal>,
    prev_diff: Option<Decimal>,
    samples: usize,
}

impl Macd {
    fn new(fast: usize, slow: usize, signal: usize) -> Self {
        Self {
            fast_alpha: ema_alpha(fast),
            slow_alpha: ema_alpha(slow),
            signal_alpha: ema_alpha(signal),
            stabilize_after: slow + signal,
            ema_fast: None,
            ema_slow: None,
            signal_line: None,
            prev_diff: None,
            samples: 0,
        }
    }

    fn update(&mut self, price: Decimal) -> Option<MacdCrossing> {
        self.samples += 1;

        self.ema_fast = Some(match self.ema_fast {
            Some(prev) => prev + self.fast_alpha * (price - prev),
            None => price,
        });
        self.ema_slow = Some(match self.ema_slow {
            Some(prev) => prev + self.slow_alpha * (price - prev),
            None => price,
        });

        let macd_line = self.ema_fast.unwrap() - self.ema_slow.unwrap();
        self.signal_line = Some(match self.signal_line {
            Some(prev) => prev + self.signal_alpha * (macd_line - prev),
            None => macd_line,
        });

        let diff = macd_line - self.signal_line.unwrap();

        if self.samples < self.stabilize_after {
            self.prev_diff = Some(diff);
            return None;
        }

        let crossing = self.prev_diff.and_then(|prev| {
            if prev <= Decimal::ZERO && diff > Decimal::ZERO {
                Some(MacdCrossing::Bullish)
            } else if prev >= Decimal::ZERO && diff < Decimal::ZERO {
                Some(MacdCrossing::Bearish)
            } else {
                None
            }
        });
        self.prev_diff = Some(diff);
        crossing
    }
}

/// Trend-following strategy: buys on a bullish MACD crossing, sells on a
/// bearish one. One instance per configured pair.
pub struct MacdStrategy {
    indicator: Macd,
    quantity: Decimal,
}

impl MacdStrategy {
    #[must_use]
    pub fn new(config: &MacdConfig) -> Self {
        Self {
            indicator: Macd::new(config.fast, config.slow, config.signal),
            quantity: config.quantity,
        }
    }
}

impl Strategy for MacdStrategy {
    fn name(&self) -> &'static str {
        "macd"
    }

    fn evaluate(&mut self, pair: &Pair, events_for_pair: &[MarketEvent]) -> Option<Signal> {
        let event = events_for_pair.last()?;
        match self.indicator.update(event.last()) {
            Some(MacdCrossing::Bullish) => Some(Signal::buy(pair.clone(), self.quantity, "macd")),
            Some(MacdCrossing::Bearish) => Some(Signal::sell(pair.clone(), self.quantity, "macd")),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn returns_none_before_stabilization() {
        let mut macd = Macd::new(3, 6, 2);
        for i in 0..5 {
            assert!(macd.update(Decimal::from(100 + i)).is_none());
        }
    }

    #[test]
    fn detects_bullish_crossing_on_reversal() {
        let mut macd = Macd::new(3, 6, 2);
        // Decline to stabilize with a negative macd-signal diff, then rally.
        let decline: Vec<i64> = (0..10).map(|i| 100 - i).collect();
        for p in &decline {
            macd.update(Decimal::from(*p));
        }
        let rally: Vec<i64> = (0..10).map(|i| 90 + i * 3).collect();
        let mut saw_bullish = false;
        for p in &rally {
            if macd.update(Decimal::from(*p)) == Some(MacdCrossing::Bullish) {
                saw_bullish = true;
            }
        }
        assert!(saw_bullish);
    }

    #[test]
    fn strategy_quantity_matches_config() {
        let config = MacdConfig {
            fast: 3,
            slow: 6,
            signal: 2,
            quantity: dec!(0.02),
        };
        let strategy = MacdStrategy::new(&config);
        assert_eq!(strategy.quantity, dec!(0.02));
    }
}
