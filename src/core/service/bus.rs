//! Lag-aware helper for reading the external event broadcast bus.
//!
//! Every subscriber (the Telegram notifier, a future dashboard push) should
//! go through [`recv_or_lag`] rather than calling [`broadcast::Receiver::recv`]
//! directly: a subscriber that falls behind the bounded ring loses its
//! oldest events, and the spec requires that loss be surfaced as a
//! `LaggedConsumer` event rather than silently swallowed.

use tokio::sync::broadcast;
use tracing::warn;

use crate::core::domain::Event;

/// Reads the next event for `subscriber`, or `None` once the bus is closed
/// (every sender dropped). On a lag, logs a warning, re-publishes
/// `Event::LaggedConsumer` onto `tx` for other subscribers to observe, and
/// keeps reading rather than returning the gap as an error to the caller.
pub async fn recv_or_lag(
    subscriber: &str,
    rx: &mut broadcast::Receiver<Event>,
    tx: &broadcast::Sender<Event>,
) -> Option<Event> {
    loop {
        match rx.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(subscriber, skipped, "subscriber lagged, oldest events dropped");
                let _ = tx.send(Event::LaggedConsumer {
                    subscriber: subscriber.to_string(),
                    skipped,
                });
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}
