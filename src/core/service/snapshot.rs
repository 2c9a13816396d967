//! Read-model composition for external consumers (chat-bot `/status`, the
//! CLI `status` subcommand, and future dashboards).
//!
//! Nothing here touches engine internals directly; it composes the three
//! read surfaces the rest of the crate already exposes: the ledger's
//! snapshot, the risk manager's drawdown ratio, and the supervisor's
//! lifecycle state.

use rust_decimal::Decimal;

use crate::app::state::EngineState;
use crate::core::domain::Position;

/// A point-in-time view of engine health.
#[derive(Debug, Clone)]
pub struct EngineSnapshot {
    pub state: EngineState,
    pub open_positions: Vec<Position>,
    pub unrealized_pnl: Decimal,
    pub realized_pnl_24h: Decimal,
    pub drawdown_ratio: Decimal,
    pub open_order_count: usize,
}

impl EngineSnapshot {
    #[must_use]
    pub fn new(
        state: EngineState,
        open_positions: Vec<Position>,
        unrealized_pnl: Decimal,
        realized_pnl_24h: Decimal,
        drawdown_ratio: Decimal,
        open_order_count: usize,
    ) -> Self {
        Self {
            state,
            open_positions,
            unrealized_pnl,
            realized_pnl_24h,
            drawdown_ratio,
            open_order_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn carries_every_composed_field() {
        let snapshot = EngineSnapshot::new(EngineState::Running, Vec::new(), dec!(10), dec!(5), dec!(0.1), 2);
        assert_eq!(snapshot.state, EngineState::Running);
        assert_eq!(snapshot.unrealized_pnl, dec!(10));
        assert_eq!(snapshot.realized_pnl_24h, dec!(5));
        assert_eq!(snapshot.drawdown_ratio, dec!(0.1));
        assert_eq!(snapshot.open_order_count, 2);
    }
}
