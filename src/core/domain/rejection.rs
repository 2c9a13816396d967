//! Closed set of reasons a signal or order can be turned away.

use std::fmt;

/// Why the risk manager (or, for [`Self::HardCeilingReached`], the executor)
/// refused to act on a signal. Closed set — new reasons require a new
/// variant, never a free-text fallback, so downstream consumers (the
/// Telegram notifier, the event log) can match exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    ExposureLimitExceeded,
    StopLossProximity,
    HardCeilingReached,
    DrawdownHalted,
    UnknownPair,
    InvalidQuantity,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::ExposureLimitExceeded => "exposure limit exceeded",
            Self::StopLossProximity => "within stop-loss band",
            Self::HardCeilingReached => "hard order ceiling reached",
            Self::DrawdownHalted => "drawdown circuit breaker halted",
            Self::UnknownPair => "unknown pair",
            Self::InvalidQuantity => "invalid quantity",
        };
        write!(f, "{label}")
    }
}
