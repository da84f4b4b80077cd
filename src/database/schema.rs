//! Database schema definitions for the trainer.
//!
//! Contains SQL statements for creating and managing database tables.

/// SQL statement to create the migrations tracking table.
pub const CREATE_MIGRATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// SQL statement to create the single-row best score table.
pub const CREATE_BEST_SCORE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS best_score (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    seconds INTEGER NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// SQL statement to create the run history table (v2 migration).
pub const CREATE_RUNS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS runs (
    id TEXT PRIMARY KEY,
    completed_at TEXT NOT NULL,
    elapsed_seconds INTEGER NOT NULL,
    word_count INTEGER NOT NULL,
    hebrew_only INTEGER NOT NULL DEFAULT 0,
    is_new_best INTEGER NOT NULL DEFAULT 0
);
"#;

/// SQL statement to create an index on completed_at for recent-run queries.
pub const CREATE_RUNS_COMPLETED_AT_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_runs_completed_at ON runs(completed_at);
"#;
