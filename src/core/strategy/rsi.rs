//! Wilder-smoothed RSI indicator and the strategy built on top of it.

use rust_decimal::Decimal;

use crate::app::config::RsiConfig;
use crate::core::domain::{MarketEvent, Pair, Signal};
use crate::core::strategy::Strategy;

/// Edge-triggered crossing this tick produced, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RsiCrossing {
    Oversold,
    Overbought,
}

/// Standard Wilder-smoothed RSI. `None` until the rolling buffer holds at
/// least `period` samples; crossings (not level predicates) are what get
/// reported, to avoid flapping signals on noisy series.
struct Rsi {
    period: usize,
    overbought: Decimal,
    oversold: Decimal,
    last_price: Option<Decimal>,
    avg_gain: Option<Decimal>,
    avg_loss: Option<Decimal>,
    sum_gain: Decimal,
    sum_loss: Decimal,
    samples: usize,
    prev_rsi: Option<Decimal>,
}

impl Rsi {
    fn new(period: usize, overbought: Decimal, oversold: Decimal) -> Self {
        Self {
            period,
            overbought,
            oversold,
            last_price: None,
            avg_gain: None,
            avg_loss: None,
            sum_gain: Decimal::ZERO,
            sum_loss: Decimal::ZERO,
            samples: 0,
            prev_rsi: None,
        }
    }

    fn update(&mut self, price: Decimal) -> Option<RsiCrossing> {
        let Some(last_price) = self.last_price else {
            self.last_price = Some(price);
            return None;
        };
        self.last_price = Some(price);

        let change = price - last_price;
        let gain = change.max(Decimal::ZERO);
        let loss = (-change).max(Decimal::ZERO);

        let (avg_gain, avg_loss) = match (self.avg_gain, self.avg_loss) {
            (Some(prev_gain), Some(prev_loss)) => {
                let period = Decimal::from(self.period);
                let gain = (prev_gain * (period - Decimal::ONE) + gain) / period;
                let loss = (prev_loss * (period - Decimal::ONE) + loss) / period;
                (gain, loss)
            }
            _ => {
                self.sum_gain += gain;
                self.sum_loss += loss;
                self.samples += 1;
                if self.samples < self.period {
                    return None;
                }
                let period = Decimal::from(self.period);
                (self.sum_gain / period, self.sum_loss / period)
            }
        };
        self.avg_gain = Some(avg_gain);
        self.avg_loss = Some(avg_loss);

        let rsi = if avg_loss == Decimal::ZERO {
            Decimal::from(100)
        } else {
            let rs = avg_gain / avg_loss;
            Decimal::from(100) - Decimal::from(100) / (Decimal::ONE + rs)
        };

        let crossing = self.prev_rsi.and_then(|prev| {
            if prev >= self.oversold && rsi < self.oversold {
                Some(RsiCrossing::Oversold)
            } else if prev < self.overbought && rsi >= self.overbought {
                Some(RsiCrossing::Overbought)
            } else {
                None
            }
        });
        self.prev_rsi = Some(rsi);
        crossing
    }
}

/// Mean-reversion strategy: buys on an oversold crossing, sells on an
/// overbought crossing. Registered once per pair by the engine wiring, so
/// its rolling state never mixes across pairs.
pub struct RsiStrategy {
    indicator: Rsi,
    quantity: Decimal,
}

impl RsiStrategy {
    #[must_use]
    pub fn new(config: &RsiConfig) -> Self {
        Self {
            indicator: Rsi::new(config.period, config.overbought, config.oversold),
            quantity: config.quantity,
        }
    }
}

impl Strategy for RsiStrategy {
    fn name(&self) -> &'static str {
        "rsi"
    }

    fn evaluate(&mut self, pair: &Pair, events_for_pair: &[MarketEvent]) -> Option<Signal> {
        let event = events_for_pair.last()?;
        match self.indicator.update(event.last()) {
            Some(RsiCrossing::Oversold) => Some(Signal::buy(pair.clone(), self.quantity, "rsi")),
            Some(RsiCrossing::Overbought) => Some(Signal::sell(pair.clone(), self.quantity, "rsi")),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn feed(rsi: &mut Rsi, prices: &[i64]) -> Vec<Option<RsiCrossing>> {
        prices.iter().map(|p| rsi.update(Decimal::from(*p))).collect()
    }

    #[test]
    fn returns_none_until_period_samples_seen() {
        let mut rsi = Rsi::new(5, dec!(70), dec!(30));
        // 5 prices => 4 changes, not yet enough for period=5 changes.
        let results = feed(&mut rsi, &[100, 101, 102, 103, 104]);
        assert!(results.iter().all(Option::is_none));
    }

    #[test]
    fn detects_oversold_crossing_on_sustained_decline() {
        let mut rsi = Rsi::new(3, dec!(70), dec!(30));
        // Warm up, then a long decline should eventually cross below 30.
        let prices: Vec<i64> = vec![
            100, 101, 102, 101, 100, 98, 96, 94, 92, 90, 88, 86, 84, 82, 80, 78, 76, 74,
        ];
        let results = feed(&mut rsi, &prices);
        assert!(results.iter().any(|c| *c == Some(RsiCrossing::Oversold)));
    }

    #[test]
    fn strategy_emits_buy_signal_on_oversold() {
        let config = RsiConfig {
            period: 3,
            overbought: dec!(70),
            oversold: dec!(30),
            quantity: dec!(0.01),
        };
        let mut strategy = RsiStrategy::new(&config);
        let pair = Pair::from("BTC/USDT");
        let prices: Vec<i64> = vec![100, 101, 102, 101, 100, 98, 96, 94, 92, 90, 88, 86, 84];

        let mut last_signal = None;
        for (i, price) in prices.iter().enumerate() {
            let event = MarketEvent::new(
                pair.clone(),
                i as i64,
                Decimal::from(*price),
                Decimal::from(*price),
                Decimal::from(*price),
                None,
            );
            if let Some(signal) = strategy.evaluate(&pair, std::slice::from_ref(&event)) {
                last_signal = Some(signal);
            }
        }
        assert!(last_signal.is_some());
    }
}
