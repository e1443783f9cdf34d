//! Versioned schema changes for the job database.
//!
//! Applied versions are recorded in `_migrations`. Every step commits in one
//! transaction together with its bookkeeping row, so a crash mid-step leaves
//! the previous version intact. Column-adding steps are recorded without
//! running when the column is already there (databases patched by hand).

use rusqlite::{params, Connection};

use super::error::DatabaseError;

const TRACKING_TABLE: &str = "CREATE TABLE IF NOT EXISTS _migrations (
    version INTEGER PRIMARY KEY,
    description TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);";

/// When a step's SQL actually needs to execute.
enum Guard {
    Always,
    MissingColumn {
        table: &'static str,
        column: &'static str,
    },
}

struct Step {
    version: u32,
    description: &'static str,
    sql: &'static str,
    guard: Guard,
}

const STEPS: &[Step] = &[
    Step {
        version: 1,
        description: "tailoring_jobs table",
        sql: include_str!("sql/001_create_tailoring_jobs.sql"),
        guard: Guard::Always,
    },
    Step {
        version: 2,
        description: "optimistic lock version column",
        sql: include_str!("sql/002_add_version.sql"),
        guard: Guard::MissingColumn {
            table: "tailoring_jobs",
            column: "version",
        },
    },
    Step {
        version: 3,
        description: "error_kind column",
        sql: include_str!("sql/003_add_error_kind.sql"),
        guard: Guard::MissingColumn {
            table: "tailoring_jobs",
            column: "error_kind",
        },
    },
];

/// Schema version this build writes.
pub fn latest_version() -> u32 {
    STEPS.last().map_or(0, |step| step.version)
}

/// Brings the schema up to date. Returns how many steps were applied.
///
/// Refuses to touch a database written by a newer build.
pub fn run_all(conn: &Connection) -> Result<usize, DatabaseError> {
    conn.execute_batch(TRACKING_TABLE)?;

    let found = current_version(conn)?;
    let supported = latest_version();
    if found > supported {
        return Err(DatabaseError::SchemaTooNew { found, supported });
    }

    let pending: Vec<&Step> = STEPS.iter().filter(|step| step.version > found).collect();
    for step in &pending {
        apply(conn, step)?;
    }
    Ok(pending.len())
}

/// Highest version recorded in `_migrations`, 0 for a blank database.
pub fn current_version(conn: &Connection) -> Result<u32, DatabaseError> {
    Ok(conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?)
}

fn apply(conn: &Connection, step: &Step) -> Result<(), DatabaseError> {
    let failed = |source: rusqlite::Error| DatabaseError::Migration {
        version: step.version,
        description: step.description,
        source,
    };

    let tx = conn.unchecked_transaction().map_err(failed)?;

    let needed = match step.guard {
        Guard::Always => true,
        Guard::MissingColumn { table, column } => !has_column(&tx, table, column).map_err(failed)?,
    };

    if needed {
        tx.execute_batch(step.sql).map_err(failed)?;
        log::info!("Schema v{}: {}", step.version, step.description);
    } else {
        log::info!(
            "Schema v{} already present, recording only: {}",
            step.version,
            step.description
        );
    }

    tx.execute(
        "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
        params![step.version, step.description],
    )
    .map_err(failed)?;
    tx.commit().map_err(failed)
}

fn has_column(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM pragma_table_info(?1) WHERE name = ?2)",
        params![table, column],
        |r| r.get(0),
    )
}
