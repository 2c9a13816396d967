//! Risk Manager (C5) — the mandatory, non-bypassable gateway.
//!
//! Every [`Order`] in the system was constructed here. Strategies never
//! build orders; the executor never builds orders; this is the only
//! constructor path, which is the structural invariant the rest of the
//! crate relies on (see the design notes on the non-bypassable gateway).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::app::config::{RiskConfig, MAX_OPEN_ORDERS};
use crate::app::state::{EngineState, EngineStateCell, PortfolioAccounting};
use crate::core::domain::event::TriggerKind;
use crate::core::domain::{MarketEvent, Order, OrderKind, OrderOrigin, Pair, Position, Side, Signal};
use crate::core::ledger::PositionLedger;
use crate::error::RiskError;

/// Internal substate distinct from the engine-level `EngineState`: gates
/// *new exposure* only. Price-monitor closes remain permitted while
/// `Halted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Substate {
    Normal,
    Halted,
}

/// One triggered close the price monitor wants the executor to submit,
/// paired with the trigger kind for the accompanying event.
pub struct TriggeredOrder {
    pub order: Order,
    pub kind: TriggerKind,
}

/// Outcome of [`RiskManager::evaluate_signal`]: `None` means the signal was
/// silently dropped (engine not `Running`, substate `Normal`) rather than
/// explicitly rejected — matching rule 1's two distinct behaviors.
pub type SignalOutcome = Option<Result<Order, RiskError>>;

pub struct RiskManager {
    config: RiskConfig,
    engine_state: Arc<EngineStateCell>,
    ledger: Arc<PositionLedger>,
    accounting: RwLock<PortfolioAccounting>,
    substate: Mutex<Substate>,
    last_market: RwLock<HashMap<Pair, MarketEvent>>,
}

impl RiskManager {
    #[must_use]
    pub fn new(
        config: RiskConfig,
        engine_state: Arc<EngineStateCell>,
        ledger: Arc<PositionLedger>,
        starting_portfolio_value: Decimal,
    ) -> Self {
        Self {
            config,
            engine_state,
            ledger,
            accounting: RwLock::new(PortfolioAccounting::new(starting_portfolio_value)),
            substate: Mutex::new(Substate::Normal),
            last_market: RwLock::new(HashMap::new()),
        }
    }

    /// Records the latest bid/ask for a pair. Called on every `MarketEvent`
    /// before [`Self::evaluate_signal`] or [`Self::monitor_pair`] runs.
    pub fn observe_market(&self, event: &MarketEvent) {
        self.last_market.write().insert(event.pair().clone(), event.clone());
    }

    #[must_use]
    pub fn drawdown_ratio(&self) -> Decimal {
        self.accounting.read().drawdown()
    }

    #[must_use]
    pub fn open_order_count(&self) -> usize {
        self.accounting.read().open_order_count()
    }

    fn is_halted(&self) -> bool {
        *self.substate.lock() == Substate::Halted
    }

    /// §4.5.1 — the five signal-path rules, evaluated in order, first
    /// failure wins.
    pub fn evaluate_signal(&self, signal: &Signal) -> SignalOutcome {
        // Rule 1: engine state gate. A `Halted` engine state (entered via a
        // `PersistenceDivergence`) and the risk manager's own `Halted`
        // substate (the drawdown breaker) both reject explicitly; `Paused`
        // and `Stopped` drop the signal silently instead.
        let engine_state = self.engine_state.get();
        if self.is_halted() || engine_state == EngineState::Halted {
            return Some(Err(RiskError::DrawdownHalted));
        }
        if !engine_state.is_running() {
            return None;
        }

        // Rule 2: hard ceiling.
        if self.accounting.read().open_order_count() >= MAX_OPEN_ORDERS {
            return Some(Err(RiskError::HardCeilingReached { max: MAX_OPEN_ORDERS }));
        }

        // Rule 3: quantity validity.
        if signal.quantity() <= Decimal::ZERO {
            return Some(Err(RiskError::InvalidQuantity(signal.quantity())));
        }

        // Positions are opened on buy fills only (§3: "created on buy fill,
        // removed on sell fill"); a strategy's sell signal only makes sense
        // as a close of an existing long. With nothing open to close there
        // is no order to build, so drop it silently rather than let it reach
        // the executor and fail at the ledger.
        if signal.side() == Side::Sell && self.ledger.open_positions_for(signal.pair()).is_empty() {
            return None;
        }

        // Reference price: latest ask (buy) or bid (sell).
        let Some(market) = self.last_market.read().get(signal.pair()).cloned() else {
            return Some(Err(RiskError::UnknownPair(signal.pair().to_string())));
        };
        let reference_price = match signal.side() {
            Side::Buy => market.ask(),
            Side::Sell => market.bid(),
        };

        // Rule 4: exposure.
        let notional = signal.quantity() * reference_price;
        if notional > self.config.max_exposure_per_trade {
            return Some(Err(RiskError::ExposureLimitExceeded {
                notional,
                max: self.config.max_exposure_per_trade,
            }));
        }

        // Rule 5: stop-loss proximity (buys only).
        if signal.side() == Side::Buy {
            let band_price = reference_price * (Decimal::ONE - self.config.stop_loss_pct);
            if band_price >= reference_price - market.spread() {
                return Some(Err(RiskError::StopLossProximity));
            }
        }

        match Order::try_new(
            signal.pair().clone(),
            signal.side(),
            signal.quantity(),
            reference_price,
            OrderKind::Market,
            OrderOrigin::Strategy,
        ) {
            Ok(order) => {
                self.accounting.write().increment_open_orders();
                info!(pair = %order.pair(), side = ?order.side(), "order approved");
                Some(Ok(order))
            }
            Err(e) => Some(Err(e.into())),
        }
    }

    /// §4.5.2 — price-monitor rules, run on every `MarketEvent` for pairs
    /// with open positions. Bypasses rules 3/4 (unconditional closes) but
    /// not rule 2 (ceiling, never bypassed per the resolved open question)
    /// and not the engine-running half of rule 1. The drawdown-halted
    /// substate never blocks these: it halts new exposure only.
    pub fn monitor_pair(&self, event: &MarketEvent) -> Vec<TriggeredOrder> {
        if !self.engine_state.get().is_running() {
            return Vec::new();
        }

        let positions = self.ledger.open_positions_for(event.pair());
        let mut triggered = Vec::new();

        for position in positions {
            let Some((closing_side, kind)) = self.check_position(&position, event) else {
                continue;
            };

            if self.accounting.read().open_order_count() >= MAX_OPEN_ORDERS {
                warn!(pair = %event.pair(), "triggered close suppressed: hard ceiling reached");
                continue;
            }

            let reference_price = match closing_side {
                Side::Buy => event.ask(),
                Side::Sell => event.bid(),
            };

            let origin = match kind {
                TriggerKind::StopLoss => OrderOrigin::StopLoss,
                TriggerKind::TakeProfit => OrderOrigin::TakeProfit,
                TriggerKind::DrawdownHalt => OrderOrigin::DrawdownLiquidation,
            };

            if let Ok(order) = Order::try_new(
                position.pair().clone(),
                closing_side,
                position.quantity(),
                reference_price,
                OrderKind::Market,
                origin,
            ) {
                self.accounting.write().increment_open_orders();
                triggered.push(TriggeredOrder { order, kind });
            }
        }

        triggered
    }

    /// Returns the closing side and trigger kind if `position` has crossed
    /// its stop-loss or take-profit band against `event`. Positions are
    /// always long (opened on a buy fill, per §3), so the close is always a
    /// sell at the current bid.
    fn check_position(&self, position: &Position, event: &MarketEvent) -> Option<(Side, TriggerKind)> {
        let loss_pct = (position.entry_price() - event.bid()) / position.entry_price();
        if loss_pct >= self.config.stop_loss_pct {
            return Some((Side::Sell, TriggerKind::StopLoss));
        }
        let gain_pct = (event.bid() - position.entry_price()) / position.entry_price();
        if gain_pct >= self.config.take_profit_pct {
            return Some((Side::Sell, TriggerKind::TakeProfit));
        }
        None
    }

    /// §4.5.3 — the drawdown circuit breaker. Called on every portfolio
    /// valuation update. Returns `true` exactly when this call transitioned
    /// `Normal -> Halted`.
    pub fn mark_portfolio_value(&self, value: Decimal) -> bool {
        self.accounting.write().mark(value);
        let drawdown = self.accounting.read().drawdown();
        if drawdown >= self.config.max_drawdown_pct {
            let mut substate = self.substate.lock();
            if *substate == Substate::Normal {
                *substate = Substate::Halted;
                warn!(%drawdown, "drawdown circuit breaker tripped");
                return true;
            }
        }
        false
    }

    /// Operator `ResetDrawdown` command: clears the halted substate and
    /// reseeds `peak_value` to the current value.
    pub fn reset_drawdown(&self) {
        *self.substate.lock() = Substate::Normal;
        self.accounting.write().reset_peak();
        info!("drawdown circuit breaker reset");
    }

    pub fn decrement_open_orders(&self) {
        self.accounting.write().decrement_open_orders();
    }

    /// Builds an unconditional market close for every open position, for the
    /// supervisor's `Stopping` drain. These bypass the hard ceiling the same
    /// way price-monitor closes do not (closing exposure is never the thing
    /// the ceiling exists to bound), and reuse `DrawdownLiquidation` as the
    /// closest-fit origin in the closed set — see DESIGN.md.
    pub fn close_all_positions(&self) -> Vec<Order> {
        self.ledger
            .all_open_positions()
            .into_iter()
            .filter_map(|position| {
                let closing_side = position.side().opposite();
                let reference_price = self
                    .last_market
                    .read()
                    .get(position.pair())
                    .map(|m| match closing_side {
                        Side::Buy => m.ask(),
                        Side::Sell => m.bid(),
                    })
                    .unwrap_or(position.entry_price());
                let order = Order::try_new(
                    position.pair().clone(),
                    closing_side,
                    position.quantity(),
                    reference_price,
                    OrderKind::Market,
                    OrderOrigin::DrawdownLiquidation,
                )
                .ok()?;
                self.accounting.write().increment_open_orders();
                Some(order)
            })
            .collect()
    }
}

/// A [`crate::error::DomainError`] surfaced while building an order from an
/// already-validated signal folds into [`RiskError::InvalidQuantity`]; this
/// path should be unreachable since rule 3 validates quantity and the
/// reference price always comes from an observed market event.
impl From<crate::error::DomainError> for RiskError {
    fn from(_: crate::error::DomainError) -> Self {
        RiskError::InvalidQuantity(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::state::EngineState;
    use crate::core::db::{create_pool, run_migrations};
    use crate::core::domain::{Fill, TradingMode};
    use rust_decimal_macros::dec;

    fn risk_manager(config: RiskConfig) -> RiskManager {
        let pool = create_pool(":memory:").unwrap();
        run_migrations(&pool).unwrap();
        let ledger = Arc::new(PositionLedger::open(pool, TradingMode::Paper).unwrap());
        let state = Arc::new(EngineStateCell::new(EngineState::Running));
        RiskManager::new(config, state, ledger, dec!(10_000))
    }

    fn market(pair: &str, bid: Decimal, ask: Decimal) -> MarketEvent {
        MarketEvent::new(Pair::from(pair), 1, bid, ask, (bid + ask) / dec!(2), None)
    }

    fn default_config() -> RiskConfig {
        RiskConfig {
            stop_loss_pct: dec!(0.05),
            take_profit_pct: dec!(0.10),
            max_exposure_per_trade: dec!(1000),
            max_drawdown_pct: dec!(0.20),
        }
    }

    #[test]
    fn happy_buy_passes_all_rules() {
        let risk = risk_manager(default_config());
        risk.observe_market(&market("BTC/USDT", dec!(19990), dec!(20000)));
        let signal = Signal::buy(Pair::from("BTC/USDT"), dec!(0.04), "rsi");
        let outcome = risk.evaluate_signal(&signal);
        assert!(matches!(outcome, Some(Ok(_))));
    }

    #[test]
    fn exposure_limit_rejects_oversized_signal() {
        let risk = risk_manager(default_config());
        risk.observe_market(&market("BTC/USDT", dec!(19990), dec!(20000)));
        let signal = Signal::buy(Pair::from("BTC/USDT"), dec!(0.06), "rsi");
        let outcome = risk.evaluate_signal(&signal);
        assert!(matches!(
            outcome,
            Some(Err(RiskError::ExposureLimitExceeded { .. }))
        ));
    }

    #[test]
    fn hard_ceiling_rejects_once_reached() {
        let mut config = default_config();
        config.max_exposure_per_trade = dec!(1_000_000);
        let risk = risk_manager(config);
        risk.observe_market(&market("BTC/USDT", dec!(19990), dec!(20000)));

        for _ in 0..MAX_OPEN_ORDERS {
            let signal = Signal::buy(Pair::from("BTC/USDT"), dec!(0.001), "rsi");
            assert!(matches!(risk.evaluate_signal(&signal), Some(Ok(_))));
        }

        let signal = Signal::buy(Pair::from("BTC/USDT"), dec!(0.001), "rsi");
        assert!(matches!(
            risk.evaluate_signal(&signal),
            Some(Err(RiskError::HardCeilingReached { .. }))
        ));
    }

    #[test]
    fn drawdown_halts_then_resets() {
        let risk = risk_manager(default_config());
        risk.observe_market(&market("BTC/USDT", dec!(19990), dec!(20000)));
        risk.mark_portfolio_value(dec!(10_000));
        let tripped = risk.mark_portfolio_value(dec!(7_999));
        assert!(tripped);

        let signal = Signal::buy(Pair::from("BTC/USDT"), dec!(0.01), "rsi");
        assert!(matches!(
            risk.evaluate_signal(&signal),
            Some(Err(RiskError::DrawdownHalted))
        ));

        risk.reset_drawdown();
        let signal = Signal::buy(Pair::from("BTC/USDT"), dec!(0.01), "rsi");
        assert!(matches!(risk.evaluate_signal(&signal), Some(Ok(_))));
    }

    #[test]
    fn paused_engine_silently_drops_signal() {
        let risk = risk_manager(default_config());
        risk.observe_market(&market("BTC/USDT", dec!(19990), dec!(20000)));
        // Simulate pause by constructing a fresh manager whose engine state
        // is not Running.
        let pool = create_pool(":memory:").unwrap();
        run_migrations(&pool).unwrap();
        let ledger = Arc::new(PositionLedger::open(pool, TradingMode::Paper).unwrap());
        let state = Arc::new(EngineStateCell::new(EngineState::Paused));
        let paused_risk = RiskManager::new(default_config(), state, ledger, dec!(10_000));
        paused_risk.observe_market(&market("BTC/USDT", dec!(19990), dec!(20000)));
        let signal = Signal::buy(Pair::from("BTC/USDT"), dec!(0.01), "rsi");
        assert_eq!(paused_risk.evaluate_signal(&signal), None);
    }

    #[test]
    fn sell_signal_with_no_open_position_is_a_noop() {
        let risk = risk_manager(default_config());
        risk.observe_market(&market("BTC/USDT", dec!(19990), dec!(20000)));
        let signal = Signal::sell(Pair::from("BTC/USDT"), dec!(0.01), "rsi");
        assert_eq!(risk.evaluate_signal(&signal), None);
    }

    #[test]
    fn sell_signal_closing_an_open_position_passes() {
        let risk = risk_manager(default_config());
        risk.observe_market(&market("BTC/USDT", dec!(19990), dec!(20000)));
        let buy = Signal::buy(Pair::from("BTC/USDT"), dec!(0.01), "rsi");
        let order = risk.evaluate_signal(&buy).unwrap().unwrap();
        risk.ledger
            .upsert_on_buy(&order, &Fill::new(dec!(20000), dec!(0.01), 1, "x1".to_string()))
            .unwrap();

        let sell = Signal::sell(Pair::from("BTC/USDT"), dec!(0.01), "rsi");
        assert!(matches!(risk.evaluate_signal(&sell), Some(Ok(_))));
    }
}
