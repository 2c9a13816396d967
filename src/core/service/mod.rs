//! Services external collaborators use to observe or control the engine:
//! a read-model snapshot and the Telegram command/notification adapter.

pub mod bus;
pub mod messaging;
pub mod snapshot;

pub use snapshot::EngineSnapshot;
