//! Exchange component factory.
//!
//! Selects between the live and paper implementations by [`TradingMode`],
//! the one place in the crate that knows both concrete types exist.

use crate::app::config::Config;
use crate::core::domain::TradingMode;
use crate::core::exchange::live::{LiveExchangeClient, LiveMarketDataStream};
use crate::core::exchange::paper::PaperClient;
use crate::core::exchange::{ExchangeClient, MarketDataStream};

/// Factory for creating the exchange client and market data stream matching
/// the configured [`TradingMode`].
pub struct ExchangeFactory;

impl ExchangeFactory {
    /// Creates the [`ExchangeClient`] for `config.mode`. In paper mode the
    /// returned client shares `paper_client` with the caller so the ingestor
    /// can keep feeding it market data via [`PaperClient::observe`].
    #[must_use]
    pub fn create_client(config: &Config, paper_client: Option<&std::sync::Arc<PaperClient>>) -> Box<dyn ExchangeClient> {
        match config.mode {
            TradingMode::Live => Box::new(LiveExchangeClient::new(
                config.exchange.rest_url.clone(),
                config.exchange.api_key.clone(),
                config.exchange.api_secret.clone(),
            )),
            TradingMode::Paper => {
                let client = paper_client
                    .cloned()
                    .unwrap_or_else(|| std::sync::Arc::new(PaperClient::new(config.paper.slippage_bps)));
                Box::new(ArcPaperClient(client))
            }
        }
    }

    /// Creates the [`MarketDataStream`] for `config.mode`.
    #[must_use]
    pub fn create_stream(config: &Config) -> Box<dyn MarketDataStream> {
        Box::new(LiveMarketDataStream::new(config.exchange.ws_url.clone()))
    }
}

/// Adapts a shared `Arc<PaperClient>` to the owned-trait-object shape
/// `create_client` returns, so the same paper client instance can be handed
/// both to the executor (as an `ExchangeClient`) and to the ingestor (to call
/// `observe` directly).
struct ArcPaperClient(std::sync::Arc<PaperClient>);

#[async_trait::async_trait]
impl ExchangeClient for ArcPaperClient {
    async fn submit_order(
        &self,
        order: &crate::core::domain::Order,
    ) -> Result<crate::core::domain::Fill, crate::core::exchange::SubmissionError> {
        self.0.submit_order(order).await
    }

    async fn open_positions(
        &self,
    ) -> Result<Vec<crate::core::domain::Position>, crate::core::exchange::SubmissionError> {
        self.0.open_positions().await
    }
}
