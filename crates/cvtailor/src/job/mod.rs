//! Tailoring jobs and the store that persists them.

pub mod model;
pub mod store;

pub use model::{FailureKind, Job, JobStatus, JobUpdate, NewJob, DEFAULT_MAX_RETRIES};
pub use store::{JobStore, SqliteJobStore, StoreError};
