//! Throwaway SQLite databases for tests.
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};

use crate::SqliteDatabase;

/// Loads `.env.test`, starts logging and returns a connection to a freshly migrated database at `url`. Whatever was
/// at `url` before is discarded.
pub async fn prepare_test_env(url: &str) -> SqliteDatabase {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    debug!("🚀️ Logging initialised");
    reset_database(url).await;
    let db = SqliteDatabase::new_with_url(url, 5).await.expect("Error connecting to the test database");
    db.run_migrations().await.expect("Error running migrations on the test database");
    db
}

/// A fresh database file in the system temp directory.
pub fn random_db_path() -> String {
    let dir = std::env::temp_dir();
    format!("sqlite://{}/pod_test_store_{}.db", dir.display(), rand::random::<u64>())
}

/// Replaces any database at `url` with an empty one.
pub async fn reset_database(url: &str) {
    if Sqlite::database_exists(url).await.unwrap_or(false) {
        debug!("🚀️ Removing stale test database {url}");
        Sqlite::drop_database(url).await.expect("Error removing the stale test database");
    }
    Sqlite::create_database(url).await.expect("Error creating the test database");
    info!("🚀️ Created test database {url}");
}
