//! Drives one claimed job through fetch, extraction and tailoring and
//! records the resulting state transition.

pub mod error;
pub mod processor;
pub mod progress;

pub use error::{Stage, StageError};
pub use processor::{AttemptOutcome, JobProcessor, StageTimeouts};
