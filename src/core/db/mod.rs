//! Database layer for the position ledger, using Diesel over SQLite.
//!
//! Every write the ledger performs against this pool goes through
//! [`crate::core::ledger::PositionLedger`]; nothing else touches these
//! tables directly.

pub mod model;
pub mod schema;

use diesel::r2d2::{ConnectionManager, Pool};
use diesel::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use crate::error::{PersistenceError, Result};

/// Embedded migrations compiled from the `migrations/` directory, run once
/// at startup before the engine may leave `Stopped`.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Connection pool type shared by every persistence-layer consumer.
pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

/// Creates a connection pool for `database_url` (a file path, or `:memory:`
/// for tests).
///
/// # Errors
/// Returns [`PersistenceError::Connection`] if the pool cannot be built.
pub fn create_pool(database_url: &str) -> Result<DbPool> {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    Pool::builder()
        .max_size(5)
        .build(manager)
        .map_err(|e| PersistenceError::Connection(e.to_string()).into())
}

/// Runs all pending migrations. Part of the supervisor's bootstrap sequence,
/// before the config-opened ledger is handed to any other subsystem.
///
/// # Errors
/// Returns [`PersistenceError::Migration`] if a migration fails to apply.
pub fn run_migrations(pool: &DbPool) -> Result<()> {
    let mut conn = pool
        .get()
        .map_err(|e| PersistenceError::Connection(e.to_string()))?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| PersistenceError::Migration(e.to_string()))?;
    Ok(())
}
