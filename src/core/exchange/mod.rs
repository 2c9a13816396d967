//! The exchange capability boundary (C1).
//!
//! [`ExchangeClient`] is the only way to submit an order or ask what
//! positions exist at the exchange. The concrete instance is held
//! exclusively by the executor ([`crate::core::executor`]); nothing else in
//! the crate is given a reference to one, which is the structural guarantee
//! that the risk manager cannot be bypassed.

pub mod factory;
pub mod live;
pub mod paper;
pub mod reconnecting;

use async_trait::async_trait;

use crate::core::domain::{Fill, MarketEvent, Order, Pair, Position};

pub use factory::ExchangeFactory;
pub use paper::PaperClient;
pub use reconnecting::ReconnectingStream;

/// Failure returned by [`ExchangeClient::submit_order`]. Never retried
/// automatically by the client itself — retrying is upstream policy.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SubmissionError {
    #[error("rejected by exchange: {reason}")]
    Rejected { reason: String },
    #[error("transport failure (retryable={retryable})")]
    Transport { retryable: bool },
    #[error("insufficient funds")]
    InsufficientFunds,
}

/// The only component allowed to move money. Implemented once for the live
/// exchange (WebSocket + REST) and once for paper trading.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn submit_order(&self, order: &Order) -> Result<Fill, SubmissionError>;

    /// Positions currently open at the exchange, used on startup and after
    /// every stream reconnect to reconcile against the ledger.
    async fn open_positions(&self) -> Result<Vec<Position>, SubmissionError>;
}

/// The streaming half of the market data connection, owned by the ingestor
/// (C2). Decodes exchange frames into [`MarketEvent`]s.
#[async_trait]
pub trait MarketDataStream: Send {
    async fn connect(&mut self) -> crate::error::Result<()>;

    async fn subscribe(&mut self, pairs: &[Pair]) -> crate::error::Result<()>;

    /// Returns the next event, or `None` if the stream has ended for good
    /// (not on a transient disconnect — those are handled internally by
    /// [`ReconnectingStream`]).
    async fn next_event(&mut self) -> Option<MarketEvent>;

    fn exchange_name(&self) -> &'static str;
}

#[async_trait]
impl MarketDataStream for Box<dyn MarketDataStream> {
    async fn connect(&mut self) -> crate::error::Result<()> {
        (**self).connect().await
    }

    async fn subscribe(&mut self, pairs: &[Pair]) -> crate::error::Result<()> {
        (**self).subscribe(pairs).await
    }

    async fn next_event(&mut self) -> Option<MarketEvent> {
        (**self).next_event().await
    }

    fn exchange_name(&self) -> &'static str {
        (**self).exchange_name()
    }
}
