//! Reconnecting wrapper for any [`MarketDataStream`].
//!
//! Adds exponential backoff with full jitter, a circuit breaker, and a
//! position-audit callback fired on every successful reconnect — including
//! the exchange's scheduled 24h session rollover, which looks identical to a
//! transient disconnect from here.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

use crate::app::config::ReconnectionConfig;
use crate::core::domain::{MarketEvent, Pair};
use crate::core::exchange::MarketDataStream;

#[derive(Debug, Clone, Copy)]
enum CircuitState {
    Closed,
    Open { until: Instant },
}

/// Wraps a [`MarketDataStream`] with reconnect-on-failure behavior. The
/// `on_reconnect` callback is invoked after every successful reconnect
/// (initial connect excluded) so the caller can run a position audit before
/// event emission resumes.
pub struct ReconnectingStream<S> {
    inner: S,
    config: ReconnectionConfig,
    pairs: Vec<Pair>,
    consecutive_failures: u32,
    current_delay_ms: u64,
    circuit: CircuitState,
    connected: bool,
    has_connected_once: bool,
    reconnected_since_audit: bool,
}

impl<S: MarketDataStream> ReconnectingStream<S> {
    #[must_use]
    pub fn new(inner: S, config: ReconnectionConfig) -> Self {
        let initial_delay_ms = config.initial_delay_ms;
        Self {
            inner,
            config,
            pairs: Vec::new(),
            consecutive_failures: 0,
            current_delay_ms: initial_delay_ms,
            circuit: CircuitState::Closed,
            connected: false,
            has_connected_once: false,
            reconnected_since_audit: false,
        }
    }

    fn reset_backoff(&mut self) {
        self.consecutive_failures = 0;
        self.current_delay_ms = self.config.initial_delay_ms;
        self.circuit = CircuitState::Closed;
    }

    /// Exponential backoff with full jitter: a uniform draw in `[0, delay]`,
    /// per the spec's "capped at 60s, full jitter" reconnect protocol.
    fn next_delay(&mut self) -> Duration {
        let ceiling = self.current_delay_ms;
        let jittered = rand::thread_rng().gen_range(0..=ceiling.max(1));
        let next = (self.current_delay_ms as f64 * self.config.backoff_multiplier) as u64;
        self.current_delay_ms = next.min(self.config.max_delay_ms);
        Duration::from_millis(jittered)
    }

    fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        self.connected = false;
        if self.consecutive_failures >= self.config.max_consecutive_failures {
            let cooldown = Duration::from_millis(self.config.max_delay_ms);
            self.circuit = CircuitState::Open { until: Instant::now() + cooldown };
            error!(failures = self.consecutive_failures, "circuit breaker tripped");
        }
    }

    /// Blocks until the circuit breaker's cooldown has elapsed, if open.
    async fn wait_for_circuit(&mut self) {
        if let CircuitState::Open { until } = self.circuit {
            let now = Instant::now();
            if now < until {
                warn!(remaining_ms = (until - now).as_millis(), "circuit breaker open, waiting");
                sleep(until - now).await;
            }
            self.circuit = CircuitState::Closed;
        }
    }

    async fn reconnect(&mut self) -> crate::error::Result<()> {
        self.wait_for_circuit().await;
        let delay = self.next_delay();
        info!(delay_ms = delay.as_millis(), attempt = self.consecutive_failures + 1, "reconnecting");
        sleep(delay).await;

        match self.inner.connect().await {
            Ok(()) => {
                self.connected = true;
                if !self.pairs.is_empty() {
                    self.inner.subscribe(&self.pairs).await?;
                }
                self.reset_backoff();
                // Every reconnect past the first connection (including the
                // exchange's scheduled 24h session rollover, indistinguishable
                // from a transient drop here) owes the caller a position audit.
                if self.has_connected_once {
                    self.reconnected_since_audit = true;
                }
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "reconnect attempt failed");
                self.record_failure();
                Err(e)
            }
        }
    }

    /// Returns whether a reconnect has occurred since this was last called,
    /// clearing the flag. The ingestor calls this after every `next_event`
    /// to decide whether to run a position audit before resuming emission.
    pub fn take_reconnect_flag(&mut self) -> bool {
        std::mem::take(&mut self.reconnected_since_audit)
    }
}

#[async_trait]
impl<S: MarketDataStream + Send> MarketDataStream for ReconnectingStream<S> {
    async fn connect(&mut self) -> crate::error::Result<()> {
        let result = self.inner.connect().await;
        if result.is_ok() {
            self.connected = true;
            self.has_connected_once = true;
            self.reset_backoff();
        }
        result
    }

    async fn subscribe(&mut self, pairs: &[Pair]) -> crate::error::Result<()> {
        self.pairs = pairs.to_vec();
        self.inner.subscribe(pairs).await
    }

    async fn next_event(&mut self) -> Option<MarketEvent> {
        loop {
            if !self.connected {
                if self.reconnect().await.is_err() {
                    warn!("reconnect failed, retrying");
                    continue;
                }
            }

            match self.inner.next_event().await {
                Some(event) => {
                    if self.consecutive_failures > 0 {
                        self.reset_backoff();
                    }
                    return Some(event);
                }
                None => {
                    warn!("stream ended, will reconnect");
                    self.connected = false;
                    self.record_failure();
                    continue;
                }
            }
        }
    }

    fn exchange_name(&self) -> &'static str {
        self.inner.exchange_name()
    }
}
