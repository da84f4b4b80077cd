//! Best score and run history persistence.

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::database::{initialise_database, migrations::run_migrations, DatabaseError};
use crate::trainer::RunSummary;

/// Storage for the best completion time
///
/// Callers in the state machine log and swallow every error; a broken store
/// never interrupts a run.
pub trait ScoreStore: Send {
    /// Best completion time in whole seconds, if any run has completed
    fn get_best_score(&self) -> Result<Option<u64>, DatabaseError>;

    fn set_best_score(&mut self, seconds: u64) -> Result<(), DatabaseError>;

    /// Forget the best score
    fn clear_best_score(&mut self) -> Result<(), DatabaseError>;

    /// Append a completed run to the history, if the store keeps one
    fn record_run(&mut self, _summary: &RunSummary) -> Result<(), DatabaseError> {
        Ok(())
    }
}

/// A run history row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Unique identifier (UUID).
    pub id: String,
    /// When the run completed (RFC 3339).
    pub completed_at: String,
    pub elapsed_seconds: u64,
    pub word_count: usize,
    pub hebrew_only: bool,
    pub is_new_best: bool,
}

impl RunRecord {
    /// Creates a record for `summary` with a generated UUID.
    pub fn from_summary(summary: &RunSummary) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            completed_at: summary.completed_at.clone(),
            elapsed_seconds: summary.elapsed_seconds,
            word_count: summary.word_count,
            hebrew_only: summary.hebrew_only,
            is_new_best: summary.is_new_best,
        }
    }
}

fn row_to_run(row: &rusqlite::Row) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        completed_at: row.get(1)?,
        elapsed_seconds: row.get::<_, i64>(2)?.max(0) as u64,
        word_count: row.get::<_, i64>(3)?.max(0) as usize,
        hebrew_only: row.get::<_, i32>(4)? != 0,
        is_new_best: row.get::<_, i32>(5)? != 0,
    })
}

/// SQLite-backed [`ScoreStore`]
pub struct SqliteScoreStore {
    conn: Connection,
}

impl SqliteScoreStore {
    /// Open (and migrate) the database at `db_path`
    pub fn open(db_path: &Path) -> Result<Self, DatabaseError> {
        Ok(Self {
            conn: initialise_database(db_path)?,
        })
    }

    /// Open the database at its default location
    pub fn open_default() -> Result<Self, DatabaseError> {
        Self::open(&super::get_database_path())
    }

    /// Non-persistent store for tests
    pub fn in_memory() -> Result<Self, DatabaseError> {
        let mut conn = Connection::open_in_memory()?;
        run_migrations(&mut conn)?;
        Ok(Self { conn })
    }

    /// Most recent runs, newest first
    pub fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, completed_at, elapsed_seconds, word_count, hebrew_only, is_new_best
            FROM runs
            ORDER BY completed_at DESC
            LIMIT ?1
            "#,
        )?;
        let runs = stmt
            .query_map([limit as i64], row_to_run)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    pub fn count_runs(&self) -> Result<u64, DatabaseError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}

impl ScoreStore for SqliteScoreStore {
    fn get_best_score(&self) -> Result<Option<u64>, DatabaseError> {
        let seconds: Option<i64> = self
            .conn
            .query_row("SELECT seconds FROM best_score WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(seconds.map(|s| s.max(0) as u64))
    }

    fn set_best_score(&mut self, seconds: u64) -> Result<(), DatabaseError> {
        self.conn.execute(
            r#"
            INSERT INTO best_score (id, seconds, updated_at) VALUES (1, ?1, ?2)
            ON CONFLICT(id) DO UPDATE SET seconds = excluded.seconds, updated_at = excluded.updated_at
            "#,
            params![seconds as i64, Utc::now().to_rfc3339()],
        )?;
        tracing::debug!("Best score set to {}s", seconds);
        Ok(())
    }

    fn clear_best_score(&mut self) -> Result<(), DatabaseError> {
        self.conn.execute("DELETE FROM best_score", [])?;
        tracing::info!("Best score cleared");
        Ok(())
    }

    fn record_run(&mut self, summary: &RunSummary) -> Result<(), DatabaseError> {
        let record = RunRecord::from_summary(summary);
        self.conn.execute(
            r#"
            INSERT INTO runs (id, completed_at, elapsed_seconds, word_count, hebrew_only, is_new_best)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                record.id,
                record.completed_at,
                record.elapsed_seconds as i64,
                record.word_count as i64,
                record.hebrew_only as i32,
                record.is_new_best as i32,
            ],
        )?;
        tracing::debug!("Recorded run {}", record.id);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryScores {
    best: Option<u64>,
    runs: Vec<RunSummary>,
    failing: bool,
}

/// In-memory [`ScoreStore`]; clones share the same scores
#[derive(Debug, Clone, Default)]
pub struct MemoryScoreStore {
    inner: Arc<Mutex<MemoryScores>>,
}

impl MemoryScoreStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_best(seconds: u64) -> Self {
        let store = Self::new();
        store.inner.lock().best = Some(seconds);
        store
    }

    /// A store whose every operation fails
    pub fn failing() -> Self {
        let store = Self::new();
        store.inner.lock().failing = true;
        store
    }

    pub fn best(&self) -> Option<u64> {
        self.inner.lock().best
    }

    pub fn runs(&self) -> Vec<RunSummary> {
        self.inner.lock().runs.clone()
    }

    fn check(&self) -> Result<(), DatabaseError> {
        if self.inner.lock().failing {
            return Err(DatabaseError::Unavailable("memory store set to fail".into()));
        }
        Ok(())
    }
}

impl ScoreStore for MemoryScoreStore {
    fn get_best_score(&self) -> Result<Option<u64>, DatabaseError> {
        self.check()?;
        Ok(self.inner.lock().best)
    }

    fn set_best_score(&mut self, seconds: u64) -> Result<(), DatabaseError> {
        self.check()?;
        self.inner.lock().best = Some(seconds);
        Ok(())
    }

    fn clear_best_score(&mut self) -> Result<(), DatabaseError> {
        self.check()?;
        self.inner.lock().best = None;
        Ok(())
    }

    fn record_run(&mut self, summary: &RunSummary) -> Result<(), DatabaseError> {
        self.check()?;
        self.inner.lock().runs.push(summary.clone());
        Ok(())
    }
}
