//! Events published on the external event bus (see `core::messaging`).
//!
//! This is the observable surface of the engine: every consumer outside the
//! hot path (Telegram notifier, the CLI `status` command, future dashboards)
//! learns about engine activity exclusively through [`Event`], never by
//! reaching into engine internals.

use rust_decimal::Decimal;

use super::{Fill, MarketEvent, Order, Pair, RejectionReason};
use crate::app::state::EngineState;

/// A trigger the risk manager's price monitor fired on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    StopLoss,
    TakeProfit,
    DrawdownHalt,
}

/// Everything the engine can publish. `Clone` so a lagging consumer on the
/// broadcast channel never blocks the producer; see the concurrency design.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A market tick, re-broadcast for external subscribers (the dashboard,
    /// the Telegram notifier) that want raw price data without subscribing
    /// to the ingestor's internal stream directly.
    Market(MarketEvent),

    /// A signal (or an order the executor attempted) was turned away.
    Rejection { pair: Pair, reason: RejectionReason },

    /// A price-monitor rule fired and generated an order.
    Trigger {
        kind: TriggerKind,
        pair: Pair,
        detail: String,
    },

    /// An order was filled by the exchange client.
    OrderFilled { order: Order, fill: Fill },

    /// An order failed at the exchange (transport error, rejection,
    /// timeout) after exhausting whatever retry policy applies.
    OrderFailed { order: Order, reason: String },

    /// The lifecycle supervisor transitioned [`EngineState`].
    StateChanged { from: EngineState, to: EngineState },

    /// The position ledger's in-memory view diverged from the persisted
    /// store and was corrected by a reconcile pass.
    PersistenceDivergence { detail: String },

    /// A position exists at the exchange with no corresponding ledger
    /// entry, discovered during a reconnect audit.
    OrphanedPosition { pair: Pair, quantity: Decimal },

    /// A broadcast consumer fell behind and missed events (`tokio::sync`
    /// broadcast lag). Carries the subscriber's name and how many events it
    /// skipped.
    LaggedConsumer { subscriber: String, skipped: u64 },
}
