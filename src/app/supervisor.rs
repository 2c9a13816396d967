//! Lifecycle Supervisor (C7): owns the engine state machine, bootstraps
//! every other component, and runs the single event loop that ties the
//! ingestor, strategy engine, risk manager, and executor together.
//!
//! Modeled on the teacher's `Orchestrator::run_with_shutdown`: one ordered
//! bootstrap sequence, then one `tokio::select!` loop reading straight off
//! the market data stream and dispatching inline, rather than routing
//! through an extra internal channel hop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use rust_decimal::Decimal;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{info, warn};

use crate::app::config::Config;
use crate::app::state::{EngineState, EngineStateCell};
use crate::core::db;
use crate::core::domain::{Event, MarketEvent, Pair, TradingMode};
use crate::core::exchange::{ExchangeClient, ExchangeFactory, MarketDataStream, PaperClient, ReconnectingStream};
use crate::core::executor::OrderExecutor;
use crate::core::ledger::PositionLedger;
use crate::core::risk::RiskManager;
use crate::core::service::snapshot::EngineSnapshot;
use crate::core::strategy::{MacdStrategy, RsiStrategy, Strategy, StrategyRegistry};
use crate::error::Result;

/// How long [`Supervisor::stop_with_drain`] waits for in-flight orders to
/// settle before giving up and logging the remainder as orphaned.
const STOP_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// How long the initial stream connection attempt gets before bootstrap
/// gives up and surfaces `StreamUnavailable`.
const STREAM_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-pair rolling window size handed to every registered strategy.
const STRATEGY_WINDOW_CAPACITY: usize = 256;

/// Operator-issued lifecycle commands, delivered over a bounded,
/// back-pressured channel. The Telegram command interface and any future
/// CLI control surface both produce these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Pause,
    Resume,
    ResetDrawdown,
}

/// Why a [`Command`] was refused: the requested transition does not exist
/// in the table in the supervisor's design notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot {command:?} while {from}")]
pub struct DenialReason {
    pub from: EngineState,
    pub command: Command,
}

/// A command plus the channel its sender expects the outcome on.
pub struct CommandRequest {
    pub command: Command,
    pub ack: oneshot::Sender<std::result::Result<(), DenialReason>>,
}

/// Owns every long-lived component and runs the engine's single event loop.
pub struct Supervisor {
    engine_state: Arc<EngineStateCell>,
    risk: Arc<RiskManager>,
    ledger: Arc<PositionLedger>,
    executor: Arc<OrderExecutor>,
    paper_client: Option<Arc<PaperClient>>,
    stream: ReconnectingStream<Box<dyn MarketDataStream>>,
    strategies: StrategyRegistry,
    order_tx: mpsc::Sender<crate::core::domain::Order>,
    events: broadcast::Sender<Event>,
    commands: mpsc::Receiver<CommandRequest>,
    command_tx: mpsc::Sender<CommandRequest>,
    starting_value: Decimal,
    last_price: Arc<RwLock<HashMap<Pair, Decimal>>>,
}

/// A read-only handle to engine state plus a command sender, cloneable and
/// independent of the supervisor's own lifetime — `run()` consumes `self`,
/// so external collaborators that need both command access and a live
/// snapshot (the Telegram adapter's `/status` and `/positions`) take this
/// instead of borrowing the supervisor directly.
#[derive(Clone)]
pub struct EngineHandle {
    engine_state: Arc<EngineStateCell>,
    risk: Arc<RiskManager>,
    ledger: Arc<PositionLedger>,
    last_price: Arc<RwLock<HashMap<Pair, Decimal>>>,
    command_tx: mpsc::Sender<CommandRequest>,
}

impl EngineHandle {
    #[must_use]
    pub fn command_sender(&self) -> mpsc::Sender<CommandRequest> {
        self.command_tx.clone()
    }

    /// Composes the current [`EngineSnapshot`], same composition the
    /// supervisor itself uses.
    ///
    /// # Errors
    /// Returns an error if the ledger snapshot fails to read.
    pub fn snapshot(&self) -> Result<EngineSnapshot> {
        compose_snapshot(&self.engine_state, &self.risk, &self.ledger, &self.last_price)
    }
}

fn compose_snapshot(
    engine_state: &EngineStateCell,
    risk: &RiskManager,
    ledger: &PositionLedger,
    last_price: &RwLock<HashMap<Pair, Decimal>>,
) -> Result<EngineSnapshot> {
    let prices = last_price.read();
    let ledger_snapshot = ledger.snapshot(|pair| prices.get(pair).copied())?;
    Ok(EngineSnapshot::new(
        engine_state.get(),
        ledger_snapshot.positions,
        ledger_snapshot.unrealized_pnl,
        ledger_snapshot.realized_pnl_24h,
        risk.drawdown_ratio(),
        risk.open_order_count(),
    ))
}

impl Supervisor {
    /// The ordered startup sequence: load config (already done by the
    /// caller) → open the ledger's DB pool and run migrations → build the
    /// risk manager → instantiate the exchange client and stream for the
    /// configured mode → connect and subscribe → run an initial position
    /// audit → return, ready for `run()`, still in `Stopped` until an
    /// explicit `Start` command arrives.
    pub async fn bootstrap(config: &Config) -> Result<Self> {
        let pool = db::create_pool(&config.database.url)?;
        db::run_migrations(&pool)?;

        let ledger = Arc::new(PositionLedger::open(pool, config.mode)?);
        let engine_state = Arc::new(EngineStateCell::default());
        let risk = Arc::new(RiskManager::new(
            config.risk.clone(),
            Arc::clone(&engine_state),
            Arc::clone(&ledger),
            config.paper.starting_value,
        ));

        let paper_client = match config.mode {
            TradingMode::Paper => Some(Arc::new(PaperClient::new(config.paper.slippage_bps))),
            TradingMode::Live => None,
        };
        let exchange: Arc<dyn ExchangeClient> =
            ExchangeFactory::create_client(config, paper_client.as_ref()).into();
        let mut stream = ReconnectingStream::new(ExchangeFactory::create_stream(config), config.reconnection.clone());

        let pairs: Vec<Pair> = config.exchange.pairs.iter().map(Pair::from).collect();
        tokio::time::timeout(STREAM_CONNECT_TIMEOUT, stream.connect())
            .await
            .map_err(|_| {
                crate::error::Error::Execution(crate::error::ExecutionError::StreamUnavailable {
                    timeout_secs: STREAM_CONNECT_TIMEOUT.as_secs(),
                })
            })??;
        stream.subscribe(&pairs).await?;

        if let Ok(exchange_positions) = exchange.open_positions().await {
            if let Err(e) = ledger.reconcile(&exchange_positions) {
                warn!(error = %e, "initial position audit failed to persist");
            }
        }

        let strategies = build_strategy_registry(config, &pairs);

        let (events, _) = broadcast::channel(1024);
        let order_capacity = crate::app::config::MAX_OPEN_ORDERS * 2;
        let (order_tx, order_rx) = mpsc::channel(order_capacity);
        let executor = Arc::new(OrderExecutor::new(
            Arc::clone(&exchange),
            Arc::clone(&ledger),
            Arc::clone(&risk),
            Arc::clone(&engine_state),
            events.clone(),
        ));
        tokio::spawn(Arc::clone(&executor).run(order_rx));

        let (command_tx, commands) = mpsc::channel(32);

        Ok(Self {
            engine_state,
            risk,
            ledger,
            executor,
            paper_client,
            stream,
            strategies,
            order_tx,
            events,
            commands,
            command_tx,
            starting_value: config.paper.starting_value,
            last_price: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// A cloneable, supervisor-independent handle for external collaborators
    /// (the Telegram adapter) that need both to issue commands and to read a
    /// live snapshot, taken before `run()` consumes `self`.
    #[must_use]
    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            engine_state: Arc::clone(&self.engine_state),
            risk: Arc::clone(&self.risk),
            ledger: Arc::clone(&self.ledger),
            last_price: Arc::clone(&self.last_price),
            command_tx: self.command_tx.clone(),
        }
    }

    /// A cloneable handle external collaborators (the Telegram adapter, a
    /// future CLI) use to issue commands.
    #[must_use]
    pub fn command_sender(&self) -> mpsc::Sender<CommandRequest> {
        self.command_tx.clone()
    }

    /// Subscribes to the external event bus.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// A cloneable handle to the event bus's sending half, for subscribers
    /// (the Telegram notifier) that also need to re-publish onto the bus,
    /// e.g. a `LaggedConsumer` warning for other subscribers to observe.
    #[must_use]
    pub fn event_sender(&self) -> broadcast::Sender<Event> {
        self.events.clone()
    }

    #[must_use]
    pub fn engine_state(&self) -> Arc<EngineStateCell> {
        Arc::clone(&self.engine_state)
    }

    /// Composes the current [`EngineSnapshot`] for external consumers.
    ///
    /// # Errors
    /// Returns an error if the ledger snapshot fails to read.
    pub fn snapshot(&self) -> Result<EngineSnapshot> {
        compose_snapshot(&self.engine_state, &self.risk, &self.ledger, &self.last_price)
    }

    /// Runs until the market data stream ends for good or a fatal error
    /// occurs. Commands and market events are handled as they arrive; the
    /// risk manager itself gates all but the lifecycle transitions on
    /// `EngineState`, so this loop stays simple and unconditional.
    pub async fn run(mut self) -> Result<()> {
        loop {
            tokio::select! {
                request = self.commands.recv() => {
                    let Some(request) = request else {
                        // No command senders remain; keep serving market data.
                        continue;
                    };
                    let result = self.handle_command(request.command).await;
                    let _ = request.ack.send(result);
                }
                event = self.stream.next_event() => {
                    match event {
                        Some(event) => self.handle_market_event(event).await,
                        None => {
                            warn!("market data stream ended for good");
                            break;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn handle_command(&mut self, command: Command) -> std::result::Result<(), DenialReason> {
        let from = self.engine_state.get();
        let to = match (from, command) {
            (EngineState::Stopped, Command::Start) => EngineState::Running,
            (EngineState::Paused, Command::Resume) => EngineState::Running,
            (EngineState::Halted, Command::ResetDrawdown) => {
                self.risk.reset_drawdown();
                EngineState::Running
            }
            // The drawdown breaker trips the risk manager's own substate
            // without moving `EngineState` out of `Running` (see
            // `RiskManager::mark_portfolio_value`), so `ResetDrawdown` must
            // also be accepted while still `Running` — otherwise it can
            // never be cleared through the command interface. A no-op when
            // the substate is already `Normal`.
            (EngineState::Running, Command::ResetDrawdown) => {
                self.risk.reset_drawdown();
                EngineState::Running
            }
            (EngineState::Running, Command::Pause) => EngineState::Paused,
            (EngineState::Running, Command::Stop) | (EngineState::Paused, Command::Stop) => {
                self.stop_with_drain(from).await;
                return Ok(());
            }
            _ => return Err(DenialReason { from, command }),
        };
        self.transition(from, to);
        Ok(())
    }

    fn transition(&self, from: EngineState, to: EngineState) {
        self.engine_state.set(to);
        info!(?from, ?to, "engine state transition");
        let _ = self.events.send(Event::StateChanged { from, to });
    }

    /// `Stop`: transitions to `Stopped` immediately (so the risk manager
    /// rejects all new exposure), instructs the risk manager to emit a
    /// market close for every open position, then waits up to 30s for
    /// those and any already-in-flight orders to settle before giving up.
    async fn stop_with_drain(&mut self, from: EngineState) {
        self.transition(from, EngineState::Stopped);

        for order in self.risk.close_all_positions() {
            self.submit_order(order).await;
        }

        let deadline = tokio::time::Instant::now() + STOP_DRAIN_TIMEOUT;
        while self.risk.open_order_count() > 0 {
            if tokio::time::Instant::now() >= deadline {
                warn!(
                    remaining = self.risk.open_order_count(),
                    "stop drain timed out, remaining orders orphaned"
                );
                break;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    async fn handle_market_event(&mut self, event: MarketEvent) {
        if self.stream.take_reconnect_flag() {
            self.audit_positions().await;
        }

        self.last_price.write().insert(event.pair().clone(), event.last());
        self.risk.observe_market(&event);
        if let Some(paper) = &self.paper_client {
            paper.observe(event.clone());
        }
        let _ = self.events.send(Event::Market(event.clone()));

        for triggered in self.risk.monitor_pair(&event) {
            let _ = self.events.send(Event::Trigger {
                kind: triggered.kind,
                pair: triggered.order.pair().clone(),
                detail: format!("{} qty {}", triggered.order.side(), triggered.order.quantity()),
            });
            self.submit_order(triggered.order).await;
        }

        for signal in self.strategies.dispatch(event.clone()) {
            match self.risk.evaluate_signal(&signal) {
                Some(Ok(order)) => self.submit_order(order).await,
                Some(Err(err)) => {
                    let _ = self.events.send(Event::Rejection {
                        pair: signal.pair().clone(),
                        reason: err.reason(),
                    });
                }
                None => {}
            }
        }

        self.mark_portfolio(&event);
    }

    async fn submit_order(&self, order: crate::core::domain::Order) {
        if self.order_tx.send(order).await.is_err() {
            warn!("order executor channel closed, order dropped");
        }
    }

    /// Current equity = starting capital + 24h realized PnL + unrealized
    /// PnL on open positions, marked on every event so the drawdown circuit
    /// breaker always sees a fresh high-water mark.
    fn mark_portfolio(&self, event: &MarketEvent) {
        let prices = self.last_price.read();
        let Ok(snapshot) = self.ledger.snapshot(|pair| prices.get(pair).copied()) else {
            return;
        };
        let value = self.starting_value + snapshot.realized_pnl_24h + snapshot.unrealized_pnl;
        if self.risk.mark_portfolio_value(value) {
            let _ = self.events.send(Event::Trigger {
                kind: crate::core::domain::event::TriggerKind::DrawdownHalt,
                pair: event.pair().clone(),
                detail: format!("portfolio value {value} breached drawdown ceiling"),
            });
        }
    }

    async fn audit_positions(&self) {
        let Ok(exchange_positions) = self.executor_exchange_positions().await else {
            warn!("reconnect audit: failed to fetch exchange positions");
            return;
        };
        match self.ledger.reconcile(&exchange_positions) {
            Ok(adopted) => {
                for position in adopted {
                    let _ = self.events.send(Event::OrphanedPosition {
                        pair: position.pair().clone(),
                        quantity: position.quantity(),
                    });
                }
            }
            Err(e) => {
                let _ = self.events.send(Event::PersistenceDivergence { detail: e.to_string() });
            }
        }
    }

    async fn executor_exchange_positions(&self) -> std::result::Result<Vec<crate::core::domain::Position>, ()> {
        self.executor.exchange_client().open_positions().await.map_err(|_| ())
    }
}

fn build_strategy_registry(config: &Config, pairs: &[Pair]) -> StrategyRegistry {
    let mut registry = StrategyRegistry::new(STRATEGY_WINDOW_CAPACITY);
    for pair in pairs {
        for name in &config.strategies.enabled {
            let strategy: Box<dyn Strategy> = match name.as_str() {
                "rsi" => Box::new(RsiStrategy::new(&config.strategies.rsi)),
                "macd" => Box::new(MacdStrategy::new(&config.strategies.macd)),
                _ => continue,
            };
            registry.register(pair.clone(), strategy);
        }
    }
    registry
}
