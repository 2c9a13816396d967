//! Core trading kernel: pure domain types plus the four pipeline stages
//! (ingestor, strategy engine, risk manager, executor) and the position
//! ledger they all read or write.

pub mod db;
pub mod domain;
pub mod executor;
pub mod exchange;
pub mod ledger;
pub mod risk;
pub mod service;
pub mod strategy;
