//! Shared process state: the engine's lifecycle state machine and the
//! portfolio accounting the drawdown circuit breaker watches.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use rust_decimal::Decimal;

/// The lifecycle supervisor's state machine. Every subsystem consults this
/// before acting: the strategy engine only evaluates signals while
/// `Running`, the executor only submits orders while `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Stopped,
    Running,
    Paused,
    Halted,
}

impl EngineState {
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }

    const fn as_u8(self) -> u8 {
        match self {
            Self::Stopped => 0,
            Self::Running => 1,
            Self::Paused => 2,
            Self::Halted => 3,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Paused,
            3 => Self::Halted,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Halted => "halted",
        };
        write!(f, "{label}")
    }
}

/// Lock-free handle to the current [`EngineState`], shared between the
/// supervisor (writer) and every other subsystem (readers). Swapped with a
/// single atomic store rather than a `parking_lot::RwLock` since the value
/// is a single byte and readers are on every hot-path tick.
#[derive(Debug)]
pub struct EngineStateCell(AtomicU8);

impl EngineStateCell {
    #[must_use]
    pub fn new(initial: EngineState) -> Self {
        Self(AtomicU8::new(initial.as_u8()))
    }

    #[must_use]
    pub fn get(&self) -> EngineState {
        EngineState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: EngineState) {
        self.0.store(state.as_u8(), Ordering::Release);
    }
}

impl Default for EngineStateCell {
    fn default() -> Self {
        Self::new(EngineState::Stopped)
    }
}

/// Portfolio-level accounting the drawdown circuit breaker and exposure
/// checks read on every signal. `peak_value` persists across restarts (see
/// the design notes on the drawdown-reset open question) and only resets via
/// an explicit `ResetDrawdown` command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortfolioAccounting {
    current_value: Decimal,
    peak_value: Decimal,
    open_order_count: usize,
}

impl PortfolioAccounting {
    #[must_use]
    pub const fn new(starting_value: Decimal) -> Self {
        Self {
            current_value: starting_value,
            peak_value: starting_value,
            open_order_count: 0,
        }
    }

    #[must_use]
    pub const fn current_value(&self) -> Decimal {
        self.current_value
    }

    #[must_use]
    pub const fn peak_value(&self) -> Decimal {
        self.peak_value
    }

    #[must_use]
    pub const fn open_order_count(&self) -> usize {
        self.open_order_count
    }

    /// Records a new mark-to-market value, lifting `peak_value` if this is a
    /// new high.
    pub fn mark(&mut self, value: Decimal) {
        self.current_value = value;
        if value > self.peak_value {
            self.peak_value = value;
        }
    }

    /// Current drawdown as a fraction of peak, `0` if at or above peak.
    #[must_use]
    pub fn drawdown(&self) -> Decimal {
        if self.peak_value <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let dd = (self.peak_value - self.current_value) / self.peak_value;
        dd.max(Decimal::ZERO)
    }

    /// Resets `peak_value` to the current value. Only the supervisor's
    /// `ResetDrawdown` command may call this.
    pub fn reset_peak(&mut self) {
        self.peak_value = self.current_value;
    }

    pub fn increment_open_orders(&mut self) {
        self.open_order_count += 1;
    }

    pub fn decrement_open_orders(&mut self) {
        self.open_order_count = self.open_order_count.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn state_cell_roundtrip() {
        let cell = EngineStateCell::new(EngineState::Stopped);
        assert_eq!(cell.get(), EngineState::Stopped);
        cell.set(EngineState::Running);
        assert_eq!(cell.get(), EngineState::Running);
        assert!(cell.get().is_running());
    }

    #[test]
    fn drawdown_tracks_peak() {
        let mut accounting = PortfolioAccounting::new(dec!(1000));
        accounting.mark(dec!(1200));
        assert_eq!(accounting.peak_value(), dec!(1200));
        accounting.mark(dec!(900));
        assert_eq!(accounting.drawdown(), dec!(0.25));
    }

    #[test]
    fn reset_peak_clears_drawdown() {
        let mut accounting = PortfolioAccounting::new(dec!(1000));
        accounting.mark(dec!(1200));
        accounting.mark(dec!(600));
        accounting.reset_peak();
        assert_eq!(accounting.drawdown(), dec!(0));
        assert_eq!(accounting.peak_value(), dec!(600));
    }

    #[test]
    fn open_order_count_does_not_underflow() {
        let mut accounting = PortfolioAccounting::new(dec!(1000));
        accounting.decrement_open_orders();
        assert_eq!(accounting.open_order_count(), 0);
    }
}
