pub mod blob;
pub mod config;
pub mod db;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod processor;
pub mod sanitize;
pub mod secrets;
pub mod tailor;
pub mod telemetry;
pub mod worker;

pub use blob::{BlobError, BlobStore};
pub use config::{load_config, Config};
pub use db::{Database, DatabaseError};
pub use error::{ConfigError, CvTailorError, ExtractionError, Result, WorkerError};
pub use job::{FailureKind, Job, JobStatus, JobStore, JobUpdate, NewJob, SqliteJobStore};
pub use pipeline::{AttemptOutcome, JobProcessor, StageTimeouts};
pub use processor::{DocumentFormat, TextExtractor};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use tailor::{JobContext, TailoringEngine};
pub use worker::{Dispatch, DispatchError, Dispatcher, WorkerPool};
