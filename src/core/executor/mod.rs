//! Order Executor (C6) — the sole consumer of risk-approved orders.
//!
//! Holds the only [`ExchangeClient`] reference in the crate. Sharded by
//! [`Pair`] so fills for one pair can never reorder relative to each other,
//! while different pairs submit concurrently; each shard is a single worker
//! task reading its own bounded channel, spawned lazily on that pair's first
//! order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{error, info, warn};

use crate::app::state::{EngineState, EngineStateCell};
use crate::core::domain::{Event, Order, Pair, Side};
use crate::core::exchange::ExchangeClient;
use crate::core::ledger::PositionLedger;
use crate::core::risk::RiskManager;

/// How long a single order submission is allowed to take before the
/// executor gives up and reports [`Event::OrderFailed`]. Never retried here
/// — retry policy, if any, lives upstream.
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-pair channel capacity. Small: a shard backing up means the exchange
/// is slow, and the risk manager's open-order ceiling bounds how much can
/// ever be in flight crate-wide.
const SHARD_CHANNEL_CAPACITY: usize = 32;

/// Consumes approved orders and shards them by pair onto independent worker
/// tasks, each serializing submissions for that pair against the exchange.
pub struct OrderExecutor {
    exchange: Arc<dyn ExchangeClient>,
    ledger: Arc<PositionLedger>,
    risk: Arc<RiskManager>,
    engine_state: Arc<EngineStateCell>,
    events: broadcast::Sender<Event>,
    shards: Mutex<HashMap<Pair, mpsc::Sender<Order>>>,
}

impl OrderExecutor {
    #[must_use]
    pub fn new(
        exchange: Arc<dyn ExchangeClient>,
        ledger: Arc<PositionLedger>,
        risk: Arc<RiskManager>,
        engine_state: Arc<EngineStateCell>,
        events: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            exchange,
            ledger,
            risk,
            engine_state,
            events,
            shards: Mutex::new(HashMap::new()),
        }
    }

    /// Exposed so the supervisor's reconnect-audit path can reach the
    /// exchange client's `open_positions` without holding its own reference
    /// to the capability (only the executor is ever given one).
    #[must_use]
    pub fn exchange_client(&self) -> &Arc<dyn ExchangeClient> {
        &self.exchange
    }

    /// Drains `orders`, routing each to its pair's shard. Returns once
    /// `orders` is closed and every shard has drained — used by the
    /// supervisor's bounded shutdown drain.
    pub async fn run(self: Arc<Self>, mut orders: mpsc::Receiver<Order>) {
        while let Some(order) = orders.recv().await {
            self.route(order).await;
        }
    }

    async fn route(self: &Arc<Self>, order: Order) {
        let pair = order.pair().clone();
        let sender = {
            let mut shards = self.shards.lock().await;
            if let Some(sender) = shards.get(&pair) {
                sender.clone()
            } else {
                let (tx, rx) = mpsc::channel(SHARD_CHANNEL_CAPACITY);
                let worker = Arc::clone(self);
                let shard_pair = pair.clone();
                tokio::spawn(async move { worker.run_shard(shard_pair, rx).await });
                shards.insert(pair.clone(), tx.clone());
                tx
            }
        };

        if sender.send(order).await.is_err() {
            error!(%pair, "order shard worker gone, order dropped");
        }
    }

    async fn run_shard(self: Arc<Self>, pair: Pair, mut orders: mpsc::Receiver<Order>) {
        info!(%pair, "order shard started");
        while let Some(order) = orders.recv().await {
            self.submit_one(order).await;
        }
        info!(%pair, "order shard drained");
    }

    async fn submit_one(&self, order: Order) {
        let result = tokio::time::timeout(SUBMIT_TIMEOUT, self.exchange.submit_order(&order)).await;

        match result {
            Ok(Ok(fill)) => {
                let ledger_result = match order.side() {
                    Side::Buy => self.ledger.upsert_on_buy(&order, &fill).map(|_| ()),
                    Side::Sell => self.ledger.close_on_sell(&order, &fill).map(|_| ()),
                };
                if let Err(e) = ledger_result {
                    // The exchange already executed this fill; there is no
                    // undo. The in-memory fill is kept and new exposure is
                    // halted crate-wide until an operator resolves the
                    // divergence — see the consistency-error policy.
                    error!(error = %e, pair = %order.pair(), "fill succeeded but ledger write failed, halting");
                    self.engine_state.set(EngineState::Halted);
                    let _ = self.events.send(Event::PersistenceDivergence { detail: e.to_string() });
                }
                let _ = self.events.send(Event::OrderFilled { order: order.clone(), fill });
            }
            Ok(Err(submission_error)) => {
                let _ = self.events.send(Event::OrderFailed {
                    order: order.clone(),
                    reason: submission_error.to_string(),
                });
            }
            Err(_elapsed) => {
                let _ = self.events.send(Event::OrderFailed {
                    order: order.clone(),
                    reason: "order submission timed out".to_string(),
                });
            }
        }

        self.risk.decrement_open_orders();
    }
}
