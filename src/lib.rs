//! tradecore: an exchange-agnostic crypto trading kernel.
//!
//! See `app` for configuration and lifecycle wiring, `core` for the four
//! pipeline stages (ingestor, strategy engine, risk manager, executor) and
//! the position ledger they share.

pub mod app;
pub mod cli;
pub mod core;
pub mod error;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
