//! Mock [`MarketDataStream`] implementations for testing.
//!
//! - [`ScriptedStream`] — pre-loaded connect/subscribe results and a fixed
//!   event queue. Best for: error handling, reconnection logic.
//! - [`CyclingStream`] — infinite event loop with configurable delay. Best
//!   for: timing-based tests (reconnect backoff, circuit breaker).
//! - [`ChannelStream`] — channel-backed stream with an external control
//!   handle. Best for: integration tests needing on-demand event delivery.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::domain::{MarketEvent, Pair};
use crate::core::exchange::MarketDataStream;
use crate::error::Result;

/// A mock stream with scripted connect/subscribe results and a fixed event
/// queue. Each call pops the next result; defaults to `Ok(())` once
/// exhausted.
#[derive(Default)]
pub struct ScriptedStream {
    connect_results: VecDeque<Result<()>>,
    subscribe_results: VecDeque<Result<()>>,
    events: VecDeque<Option<MarketEvent>>,
    connect_count: Arc<AtomicU32>,
    subscribe_count: Arc<AtomicU32>,
}

impl ScriptedStream {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_connect_results(mut self, results: Vec<Result<()>>) -> Self {
        self.connect_results = results.into();
        self
    }

    #[must_use]
    pub fn with_subscribe_results(mut self, results: Vec<Result<()>>) -> Self {
        self.subscribe_results = results.into();
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: Vec<Option<MarketEvent>>) -> Self {
        self.events = events.into();
        self
    }

    #[must_use]
    pub fn connect_count(&self) -> u32 {
        self.connect_count.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn subscribe_count(&self) -> u32 {
        self.subscribe_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketDataStream for ScriptedStream {
    async fn connect(&mut self) -> Result<()> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        self.connect_results.pop_front().unwrap_or(Ok(()))
    }

    async fn subscribe(&mut self, _pairs: &[Pair]) -> Result<()> {
        self.subscribe_count.fetch_add(1, Ordering::SeqCst);
        self.subscribe_results.pop_front().unwrap_or(Ok(()))
    }

    async fn next_event(&mut self) -> Option<MarketEvent> {
        self.events.pop_front().flatten()
    }

    fn exchange_name(&self) -> &'static str {
        "mock"
    }
}

/// Yields events from a fixed list in an infinite loop, sleeping `delay`
/// between each. An empty list blocks forever (simulates a quiet market).
pub struct CyclingStream {
    events: Vec<MarketEvent>,
    index: usize,
    delay: Duration,
    connect_count: Arc<AtomicU32>,
}

impl CyclingStream {
    pub fn new(events: Vec<MarketEvent>, delay: Duration, connect_count: Arc<AtomicU32>) -> Self {
        Self {
            events,
            index: 0,
            delay,
            connect_count,
        }
    }
}

#[async_trait]
impl MarketDataStream for CyclingStream {
    async fn connect(&mut self) -> Result<()> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(&mut self, _pairs: &[Pair]) -> Result<()> {
        Ok(())
    }

    async fn next_event(&mut self) -> Option<MarketEvent> {
        if self.events.is_empty() {
            return std::future::pending().await;
        }
        tokio::time::sleep(self.delay).await;
        let event = self.events[self.index % self.events.len()].clone();
        self.index += 1;
        Some(event)
    }

    fn exchange_name(&self) -> &'static str {
        "mock"
    }
}

/// A mock stream controlled externally via a [`ChannelStreamHandle`]. No
/// real network I/O; events are pushed in and read back out in order.
pub struct ChannelStream {
    event_rx: tokio::sync::mpsc::Receiver<Option<MarketEvent>>,
    connect_count: Arc<AtomicU32>,
    subscribe_count: Arc<AtomicU32>,
    subscribed_pairs: Arc<parking_lot::Mutex<Vec<Pair>>>,
}

pub struct ChannelStreamHandle {
    event_tx: tokio::sync::mpsc::Sender<Option<MarketEvent>>,
    connect_count: Arc<AtomicU32>,
    subscribe_count: Arc<AtomicU32>,
    subscribed_pairs: Arc<parking_lot::Mutex<Vec<Pair>>>,
}

impl ChannelStreamHandle {
    pub async fn send(&self, event: MarketEvent) {
        let _ = self.event_tx.send(Some(event)).await;
    }

    #[must_use]
    pub fn sender(&self) -> tokio::sync::mpsc::Sender<Option<MarketEvent>> {
        self.event_tx.clone()
    }

    /// Signals end-of-stream: the next `next_event()` call returns `None`.
    pub async fn close(&self) {
        let _ = self.event_tx.send(None).await;
    }

    #[must_use]
    pub fn connect_count(&self) -> u32 {
        self.connect_count.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn subscribe_count(&self) -> u32 {
        self.subscribe_count.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn subscribed_pairs(&self) -> Vec<Pair> {
        self.subscribed_pairs.lock().clone()
    }
}

#[must_use]
pub fn channel_stream(buffer: usize) -> (ChannelStream, ChannelStreamHandle) {
    let (tx, rx) = tokio::sync::mpsc::channel(buffer);
    let connect_count = Arc::new(AtomicU32::new(0));
    let subscribe_count = Arc::new(AtomicU32::new(0));
    let subscribed_pairs = Arc::new(parking_lot::Mutex::new(Vec::new()));
    (
        ChannelStream {
            event_rx: rx,
            connect_count: connect_count.clone(),
            subscribe_count: subscribe_count.clone(),
            subscribed_pairs: subscribed_pairs.clone(),
        },
        ChannelStreamHandle {
            event_tx: tx,
            connect_count,
            subscribe_count,
            subscribed_pairs,
        },
    )
}

#[async_trait]
impl MarketDataStream for ChannelStream {
    async fn connect(&mut self) -> Result<()> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(&mut self, pairs: &[Pair]) -> Result<()> {
        self.subscribe_count.fetch_add(1, Ordering::SeqCst);
        *self.subscribed_pairs.lock() = pairs.to_vec();
        Ok(())
    }

    async fn next_event(&mut self) -> Option<MarketEvent> {
        match self.event_rx.recv().await {
            Some(Some(event)) => Some(event),
            Some(None) | None => None,
        }
    }

    fn exchange_name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_event() -> MarketEvent {
        MarketEvent::new(Pair::from("BTC/USDT"), 1, dec!(100), dec!(101), dec!(100.5), None)
    }

    #[tokio::test]
    async fn scripted_stream_replays_events_in_order() {
        let mut stream = ScriptedStream::new().with_events(vec![Some(sample_event()), None]);
        assert!(stream.next_event().await.is_some());
        assert!(stream.next_event().await.is_none());
    }

    #[tokio::test]
    async fn scripted_stream_replays_connect_results() {
        let mut stream = ScriptedStream::new().with_connect_results(vec![Err(crate::error::Error::ChannelClosed("boom".into()))]);
        assert!(stream.connect().await.is_err());
        assert_eq!(stream.connect_count(), 1);
        assert!(stream.connect().await.is_ok());
    }

    #[tokio::test]
    async fn channel_stream_delivers_sent_events() {
        let (mut stream, handle) = channel_stream(4);
        handle.send(sample_event()).await;
        handle.close().await;
        assert!(stream.next_event().await.is_some());
        assert!(stream.next_event().await.is_none());
    }

    #[tokio::test]
    async fn channel_stream_records_subscribed_pairs() {
        let (mut stream, handle) = channel_stream(4);
        stream.subscribe(&[Pair::from("BTC/USDT")]).await.unwrap();
        assert_eq!(handle.subscribed_pairs(), vec![Pair::from("BTC/USDT")]);
        assert_eq!(handle.subscribe_count(), 1);
    }
}
