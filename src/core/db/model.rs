//! Diesel row types for the `positions` and `trades` tables.
//!
//! Decimal fields are stored as their canonical string representation —
//! SQLite has no native decimal type and `rust_decimal` round-trips exactly
//! through `to_string`/`parse`, unlike a lossy `f64` column.

use diesel::prelude::*;

use super::schema::{positions, trades};

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = positions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PositionRow {
    pub id: String,
    pub pair: String,
    pub side: String,
    pub entry_price: String,
    pub quantity: String,
    pub mode: String,
    pub opened_at: i64,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = trades)]
pub struct NewTradeRow {
    pub position_id: String,
    pub pair: String,
    pub side: String,
    pub entry_price: String,
    pub exit_price: String,
    pub quantity: String,
    pub pnl_usd: String,
    pub mode: String,
    pub opened_at: i64,
    pub closed_at: i64,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = trades)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TradeRow {
    pub id: i32,
    pub position_id: String,
    pub pair: String,
    pub side: String,
    pub entry_price: String,
    pub exit_price: String,
    pub quantity: String,
    pub pnl_usd: String,
    pub mode: String,
    pub opened_at: i64,
    pub closed_at: i64,
}
