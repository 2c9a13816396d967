//! Application wiring: configuration, shared state, and the lifecycle
//! supervisor that bootstraps and runs the engine.

pub mod config;
pub mod state;
pub mod supervisor;

pub use config::Config;
pub use state::{EngineState, EngineStateCell, PortfolioAccounting};
pub use supervisor::{Command, EngineHandle, Supervisor};
