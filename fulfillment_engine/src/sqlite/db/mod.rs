//! # SQLite Database methods
//!
//! This module contains "low-level" SQLite database interactions.
//!
//! All these interactions are simple functions (rather than stateful structs) that accept a `&mut SqliteConnection`
//! argument. Callers can obtain a connection from a pool, or open a transaction and pass `&mut tx` when several calls
//! must commit together.
use log::info;
use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, Error as SqlxError, Sqlite, SqlitePool};

pub mod follow_ups;
pub mod order_events;
pub mod order_items;
pub mod orders;

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}

/// Creates the database file if it does not exist yet.
pub async fn ensure_database_exists(url: &str) -> Result<(), SqlxError> {
    if !Sqlite::database_exists(url).await? {
        info!("🗃️ Creating new database at {url}");
        Sqlite::create_database(url).await?;
    }
    Ok(())
}
