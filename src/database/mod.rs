//! Database module for the trainer.
//!
//! Provides SQLite connection management and migrations for score
//! persistence. The database is stored at `~/.hebrew-trainer/trainer.db`.

pub mod migrations;
pub mod schema;
pub mod scores;

use rusqlite::Connection;
use std::path::{Path, PathBuf};

use crate::database::migrations::run_migrations;

pub use scores::{MemoryScoreStore, RunRecord, ScoreStore, SqliteScoreStore};

/// Database error types.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Failed to create database directory: {0}")]
    DirectoryCreation(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Score store unavailable: {0}")]
    Unavailable(String),
}

/// Returns the path to the database file (~/.hebrew-trainer/trainer.db).
pub fn get_database_path() -> PathBuf {
    crate::config::get_config_dir().join("trainer.db")
}

fn ensure_parent_directory(db_path: &Path) -> Result<(), DatabaseError> {
    if let Some(dir) = db_path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            std::fs::create_dir_all(dir)?;
            tracing::info!("Created data directory at {:?}", dir);
        }
    }
    Ok(())
}

/// Opens a connection to the database at `db_path`, creating its directory.
pub fn open_connection(db_path: &Path) -> Result<Connection, DatabaseError> {
    ensure_parent_directory(db_path)?;

    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    Ok(conn)
}

/// Opens the database at `db_path` and runs pending migrations.
pub fn initialise_database(db_path: &Path) -> Result<Connection, DatabaseError> {
    tracing::info!("Initialising database at {:?}", db_path);

    let mut conn = open_connection(db_path)?;
    run_migrations(&mut conn)?;

    tracing::info!("Database initialised successfully");
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_database_path_format() {
        let path = get_database_path();
        assert!(path.to_string_lossy().contains(".hebrew-trainer"));
        assert!(path.to_string_lossy().ends_with("trainer.db"));
    }

    #[test]
    fn test_initialise_creates_directory() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("nested").join("trainer.db");

        let conn = initialise_database(&db_path).unwrap();
        assert!(db_path.exists());
        assert_eq!(
            migrations::get_current_version(&conn).unwrap(),
            migrations::latest_version()
        );
    }
}
