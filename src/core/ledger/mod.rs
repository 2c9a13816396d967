//! Position Ledger (C3): the authoritative set of open positions and
//! completed trades, in memory and write-through to SQLite.
//!
//! Writers are the order executor (fills) and the reconnect-audit path
//! (reconcile); readers are the risk manager, the snapshot service, and the
//! chat-bot/dashboard collaborators. See the concurrency design: exclusive
//! writer / many-reader discipline via [`parking_lot::RwLock`].

use std::collections::HashMap;

use chrono::Utc;
use diesel::prelude::*;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::core::db::model::{NewTradeRow, PositionRow, TradeRow};
use crate::core::db::schema::{positions, trades};
use crate::core::db::DbPool;
use crate::core::domain::{
    DomainError, Fill, Order, Pair, Position, PositionId, Side, Trade, TradingMode,
};
use crate::error::{PersistenceError, Result};

type PositionKey = (Pair, Side, TradingMode);

/// Read model returned by [`PositionLedger::snapshot`], e.g. for the
/// dashboard or the chat-bot `/status` command.
#[derive(Debug, Clone)]
pub struct LedgerSnapshot {
    pub positions: Vec<Position>,
    pub unrealized_pnl: Decimal,
    pub realized_pnl_24h: Decimal,
}

#[derive(Default)]
struct LedgerState {
    open: HashMap<PositionKey, Position>,
}

/// Single source of truth for open positions and completed trades.
pub struct PositionLedger {
    state: RwLock<LedgerState>,
    pool: DbPool,
    mode: TradingMode,
}

impl PositionLedger {
    /// Opens the ledger against `pool`, loading any positions already
    /// persisted for `mode` into memory.
    ///
    /// # Errors
    /// Returns a [`PersistenceError`] if the initial load fails.
    pub fn open(pool: DbPool, mode: TradingMode) -> Result<Self> {
        let mut conn = pool
            .get()
            .map_err(|e| PersistenceError::Connection(e.to_string()))?;

        let mode_str = mode.to_string();
        let rows: Vec<PositionRow> = positions::table
            .filter(positions::mode.eq(&mode_str))
            .load(&mut conn)
            .map_err(|e| PersistenceError::Database(e.to_string()))?;

        let mut open = HashMap::new();
        for row in rows {
            let position = row_to_position(&row)?;
            open.insert((position.pair().clone(), position.side(), position.mode()), position);
        }

        Ok(Self {
            state: RwLock::new(LedgerState { open }),
            pool,
            mode,
        })
    }

    /// Applies a buy fill: opens a new (long) position and persists it.
    /// Positions are opened on buy fills only and closed on sell fills, per
    /// §3 — the risk manager rejects a sell signal with nothing open to
    /// close before it ever reaches an order, so every buy fill reaching
    /// here is an open.
    ///
    /// # Errors
    /// Returns [`DomainError::DuplicatePosition`] if one is already open for
    /// this `(pair, side, mode)`, or a [`PersistenceError`] on write failure.
    pub fn upsert_on_buy(&self, order: &Order, fill: &Fill) -> Result<PositionId> {
        let position = Position::try_new(
            order.pair().clone(),
            order.side(),
            fill.executed_price(),
            fill.executed_quantity(),
            self.mode,
            fill.executed_at(),
        )
        .map_err(crate::error::Error::Domain)?;

        let key = (position.pair().clone(), position.side(), position.mode());
        {
            let guard = self.state.read();
            if guard.open.contains_key(&key) {
                return Err(DomainError::DuplicatePosition {
                    pair: position.pair().to_string(),
                    side: position.side(),
                    mode: position.mode(),
                }
                .into());
            }
        }

        let row = position_to_row(&position);
        let mut conn = self
            .pool
            .get()
            .map_err(|e| PersistenceError::Connection(e.to_string()))?;
        diesel::insert_into(positions::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(|e| PersistenceError::Database(e.to_string()))?;

        let id = position.id();
        self.state.write().open.insert(key, position);
        info!(pair = %row.pair, %id, "position opened");
        Ok(id)
    }

    /// Closes the open position matching `(order.pair(), closing_side,
    /// mode)` against `fill`, computing PnL and atomically removing the
    /// position while appending the trade — single transaction, per the
    /// atomicity requirement in §4.3.
    ///
    /// `closing_side` is the side of the *position being closed*, the
    /// opposite of `order.side()` — positions are always long, so this is
    /// always `Side::Buy` for a closing `order.side() == Side::Sell`.
    ///
    /// # Errors
    /// Returns an [`crate::error::Error::ChannelClosed`]-free domain error if
    /// no matching position is open, or a [`PersistenceError`] if the
    /// transaction fails (the in-memory state is retained in that case —
    /// see the `PersistenceDivergence` handling in the supervisor).
    pub fn close_on_sell(&self, order: &Order, fill: &Fill) -> Result<Trade> {
        let closing_side = order.side().opposite();
        let key = (order.pair().clone(), closing_side, self.mode);

        let position = {
            let guard = self.state.read();
            guard
                .open
                .get(&key)
                .cloned()
                .ok_or_else(|| PersistenceError::Database(format!("no open position for {key:?}")))?
        };

        let trade = Trade::close(&position, fill.executed_price(), fill.executed_at());
        let trade_row = trade_to_row(&trade);
        let position_id = position.id().to_string();

        let mut conn = self
            .pool
            .get()
            .map_err(|e| PersistenceError::Connection(e.to_string()))?;

        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            diesel::delete(positions::table.find(&position_id)).execute(conn)?;
            diesel::insert_into(trades::table)
                .values(&trade_row)
                .execute(conn)?;
            Ok(())
        })
        .map_err(|e| PersistenceError::Database(e.to_string()))?;

        self.state.write().open.remove(&key);
        info!(pair = %order.pair(), pnl = %trade.pnl_usd(), "position closed");
        Ok(trade)
    }

    /// Lock-light read for dashboards and the risk manager: current open
    /// positions, total unrealized PnL against `mark_price`, and realized
    /// PnL over the trailing 24h.
    ///
    /// # Errors
    /// Returns a [`PersistenceError`] if the trailing-24h trade query fails.
    pub fn snapshot(&self, mark_price: impl Fn(&Pair) -> Option<Decimal>) -> Result<LedgerSnapshot> {
        let positions: Vec<Position> = self.state.read().open.values().cloned().collect();
        let unrealized_pnl = positions
            .iter()
            .filter_map(|p| mark_price(p.pair()).map(|mark| p.unrealized_pnl(mark)))
            .sum();

        let cutoff = (Utc::now() - chrono::Duration::hours(24)).timestamp();
        let mode_str = self.mode.to_string();
        let mut conn = self
            .pool
            .get()
            .map_err(|e| PersistenceError::Connection(e.to_string()))?;
        let rows: Vec<TradeRow> = trades::table
            .filter(trades::mode.eq(&mode_str))
            .filter(trades::closed_at.ge(cutoff))
            .load(&mut conn)
            .map_err(|e| PersistenceError::Database(e.to_string()))?;

        let realized_pnl_24h = rows
            .iter()
            .filter_map(|r| r.pnl_usd.parse::<Decimal>().ok())
            .sum();

        Ok(LedgerSnapshot {
            positions,
            unrealized_pnl,
            realized_pnl_24h,
        })
    }

    /// In-memory-only read of currently open positions for `pair`, used by
    /// the risk manager's price-monitor pass. Cheap: no DB round trip.
    #[must_use]
    pub fn open_positions_for(&self, pair: &Pair) -> Vec<Position> {
        self.state
            .read()
            .open
            .values()
            .filter(|p| p.pair() == pair)
            .cloned()
            .collect()
    }

    /// Every open position in this mode, used by the supervisor's stop-drain
    /// to flatten the whole book before the engine settles into `Stopped`.
    #[must_use]
    pub fn all_open_positions(&self) -> Vec<Position> {
        self.state.read().open.values().cloned().collect()
    }

    /// Idempotent merge against the exchange's reported open positions,
    /// invoked by the ingestor after every reconnect. Never deletes a
    /// position without an explicit close fill: a ledger entry absent from
    /// `exchange_positions` is logged, not removed.
    ///
    /// Returns the pairs that were found only at the exchange (and have now
    /// been adopted into the ledger) so the caller can emit `OrphanedPosition`.
    ///
    /// # Errors
    /// Returns a [`PersistenceError`] if adopting a new position fails to persist.
    pub fn reconcile(&self, exchange_positions: &[Position]) -> Result<Vec<Position>> {
        let mut adopted = Vec::new();
        for exchange_position in exchange_positions {
            let key = (
                exchange_position.pair().clone(),
                exchange_position.side(),
                exchange_position.mode(),
            );
            let already_known = self.state.read().open.contains_key(&key);
            if already_known {
                continue;
            }

            let row = position_to_row(exchange_position);
            let mut conn = self
                .pool
                .get()
                .map_err(|e| PersistenceError::Connection(e.to_string()))?;
            diesel::insert_or_ignore_into(positions::table)
                .values(&row)
                .execute(&mut conn)
                .map_err(|e| PersistenceError::Database(e.to_string()))?;

            self.state.write().open.insert(key, exchange_position.clone());
            warn!(pair = %exchange_position.pair(), "orphaned position adopted from exchange");
            adopted.push(exchange_position.clone());
        }

        let exchange_keys: std::collections::HashSet<PositionKey> = exchange_positions
            .iter()
            .map(|p| (p.pair().clone(), p.side(), p.mode()))
            .collect();
        for (key, _) in self.state.read().open.iter() {
            if key.2 == self.mode && !exchange_keys.contains(key) {
                warn!(pair = %key.0, side = ?key.1, "ledger position absent at exchange");
            }
        }

        Ok(adopted)
    }
}

fn position_to_row(position: &Position) -> PositionRow {
    PositionRow {
        id: position.id().to_string(),
        pair: position.pair().to_string(),
        side: position.side().to_string(),
        entry_price: position.entry_price().to_string(),
        quantity: position.quantity().to_string(),
        mode: position.mode().to_string(),
        opened_at: position.opened_at(),
    }
}

fn trade_to_row(trade: &Trade) -> NewTradeRow {
    NewTradeRow {
        position_id: trade.position_id().to_string(),
        pair: trade.pair().to_string(),
        side: trade.side().to_string(),
        entry_price: trade.entry_price().to_string(),
        exit_price: trade.exit_price().to_string(),
        quantity: trade.quantity().to_string(),
        pnl_usd: trade.pnl_usd().to_string(),
        mode: trade.mode().to_string(),
        opened_at: trade.opened_at(),
        closed_at: trade.closed_at(),
    }
}

fn row_to_position(row: &PositionRow) -> Result<Position> {
    let side = parse_side(&row.side)?;
    let mode = parse_mode(&row.mode)?;
    let entry_price = row
        .entry_price
        .parse()
        .map_err(|_| PersistenceError::Serialize(format!("bad entry_price `{}`", row.entry_price)))?;
    let quantity = row
        .quantity
        .parse()
        .map_err(|_| PersistenceError::Serialize(format!("bad quantity `{}`", row.quantity)))?;

    Position::try_new(Pair::from(row.pair.clone()), side, entry_price, quantity, mode, row.opened_at)
        .map_err(crate::error::Error::Domain)
}

fn parse_side(raw: &str) -> Result<Side> {
    match raw {
        "buy" => Ok(Side::Buy),
        "sell" => Ok(Side::Sell),
        other => Err(PersistenceError::Serialize(format!("unknown side `{other}`")).into()),
    }
}

fn parse_mode(raw: &str) -> Result<TradingMode> {
    match raw {
        "live" => Ok(TradingMode::Live),
        "paper" => Ok(TradingMode::Paper),
        other => Err(PersistenceError::Serialize(format!("unknown mode `{other}`")).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::{create_pool, run_migrations};
    use crate::core::domain::{OrderKind, OrderOrigin};
    use rust_decimal_macros::dec;

    fn test_ledger() -> PositionLedger {
        let pool = create_pool(":memory:").unwrap();
        run_migrations(&pool).unwrap();
        PositionLedger::open(pool, TradingMode::Paper).unwrap()
    }

    fn buy_order(pair: &str, qty: Decimal, price: Decimal) -> Order {
        Order::try_new(Pair::from(pair), Side::Buy, qty, price, OrderKind::Market, OrderOrigin::Strategy).unwrap()
    }

    fn sell_order(pair: &str, qty: Decimal, price: Decimal) -> Order {
        Order::try_new(Pair::from(pair), Side::Sell, qty, price, OrderKind::Market, OrderOrigin::Strategy).unwrap()
    }

    #[test]
    fn buy_fill_opens_then_sell_fill_closes() {
        let ledger = test_ledger();
        let order = buy_order("BTC/USDT", dec!(0.04), dec!(20020));
        let fill = Fill::new(dec!(20020), dec!(0.04), 1, "x1".to_string());
        ledger.upsert_on_buy(&order, &fill).unwrap();

        let snap = ledger.snapshot(|_| Some(dec!(20020))).unwrap();
        assert_eq!(snap.positions.len(), 1);

        let close_order = sell_order("BTC/USDT", dec!(0.04), dec!(20020));
        let close_fill = Fill::new(dec!(20020), dec!(0.04), 2, "x2".to_string());
        let trade = ledger.close_on_sell(&close_order, &close_fill).unwrap();
        assert_eq!(trade.pnl_usd(), dec!(0));

        let snap = ledger.snapshot(|_| Some(dec!(20020))).unwrap();
        assert_eq!(snap.positions.len(), 0);
    }

    #[test]
    fn duplicate_buy_is_rejected() {
        let ledger = test_ledger();
        let order = buy_order("BTC/USDT", dec!(0.04), dec!(20020));
        let fill = Fill::new(dec!(20020), dec!(0.04), 1, "x1".to_string());
        ledger.upsert_on_buy(&order, &fill).unwrap();
        let err = ledger.upsert_on_buy(&order, &fill);
        assert!(err.is_err());
    }

    #[test]
    fn reconcile_is_idempotent() {
        let ledger = test_ledger();
        let exchange_position =
            Position::try_new(Pair::from("ETH/USDT"), Side::Buy, dec!(3000), dec!(0.5), TradingMode::Paper, 1)
                .unwrap();

        let first = ledger.reconcile(&[exchange_position.clone()]).unwrap();
        assert_eq!(first.len(), 1);
        let second = ledger.reconcile(&[exchange_position]).unwrap();
        assert_eq!(second.len(), 0);
    }
}
