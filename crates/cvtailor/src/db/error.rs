use std::path::PathBuf;

use thiserror::Error;

/// Failures of the SQLite layer beneath the job store.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Cannot create database directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot open job database '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Schema migration v{version} ({description}) failed: {source}")]
    Migration {
        version: u32,
        description: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Job database is at schema v{found}, newer than v{supported} supported by this build")]
    SchemaTooNew { found: u32, supported: u32 },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Job database connection poisoned by a panicked writer")]
    LockPoisoned,
}
