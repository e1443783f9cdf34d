use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::blob::BlobError;
use crate::error::ExtractionError;
use crate::job::{FailureKind, StoreError};
use crate::tailor::TailorError;

/// The stages of an attempt that can time out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Extract,
    Tailor,
}

impl Stage {
    /// The stage a job with this persisted progress was in.
    pub fn at_progress(progress: u8) -> Self {
        if progress >= super::progress::EXTRACTED {
            Stage::Tailor
        } else {
            Stage::Extract
        }
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Stage::Fetch => FailureKind::BlobFetchFailed,
            Stage::Extract => FailureKind::ExtractionFailed,
            Stage::Tailor => FailureKind::TailoringFailed,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Fetch => "Resume download",
            Stage::Extract => "Text extraction",
            Stage::Tailor => "Resume tailoring",
        })
    }
}

/// Why an attempt failed. Every variant becomes a persisted transition.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("Failed to fetch resume: {0}")]
    BlobFetch(#[from] BlobError),

    #[error("Text extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Text extraction failed: worker task aborted: {0}")]
    ExtractionTask(String),

    #[error("Tailoring failed: {0}")]
    Tailoring(#[from] TailorError),

    #[error("Failed to save job progress: {0}")]
    Storage(#[from] StoreError),

    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: Stage, after: Duration },

    #[error("{stage} panicked: {message}")]
    Panicked { stage: Stage, message: String },
}

impl StageError {
    pub fn kind(&self) -> FailureKind {
        match self {
            StageError::BlobFetch(_) => FailureKind::BlobFetchFailed,
            StageError::Extraction(_) | StageError::ExtractionTask(_) => {
                FailureKind::ExtractionFailed
            }
            StageError::Tailoring(_) => FailureKind::TailoringFailed,
            StageError::Storage(_) => FailureKind::StorageFailed,
            StageError::Timeout { stage, .. } | StageError::Panicked { stage, .. } => {
                stage.failure_kind()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tailor::CompletionError;

    #[test]
    fn test_kinds_stay_distinct() {
        let extraction = StageError::from(ExtractionError::TextTooShort { chars: 3, min: 100 });
        let tailoring = StageError::from(TailorError::from(CompletionError::EmptyCompletion));
        let blob = StageError::from(BlobError::NotFound {
            path: "cv.pdf".to_string(),
        });

        assert_eq!(extraction.kind(), FailureKind::ExtractionFailed);
        assert_eq!(tailoring.kind(), FailureKind::TailoringFailed);
        assert_eq!(blob.kind(), FailureKind::BlobFetchFailed);
    }

    #[test]
    fn test_timeout_kind_follows_stage() {
        let err = StageError::Timeout {
            stage: Stage::Tailor,
            after: Duration::from_secs(90),
        };
        assert_eq!(err.kind(), FailureKind::TailoringFailed);
        assert_eq!(err.to_string(), "Resume tailoring timed out after 90s");
    }

    #[test]
    fn test_sub_second_timeout_keeps_its_unit() {
        let err = StageError::Timeout {
            stage: Stage::Fetch,
            after: Duration::from_millis(50),
        };
        assert_eq!(err.to_string(), "Resume download timed out after 50ms");
    }

    #[test]
    fn test_panic_stage_follows_progress() {
        assert_eq!(Stage::at_progress(10), Stage::Extract);
        assert_eq!(Stage::at_progress(50), Stage::Tailor);

        let err = StageError::Panicked {
            stage: Stage::at_progress(80),
            message: "index out of bounds".to_string(),
        };
        assert_eq!(err.kind(), FailureKind::TailoringFailed);
        assert_eq!(err.to_string(), "Resume tailoring panicked: index out of bounds");
    }

    #[test]
    fn test_extraction_message_mentions_extraction() {
        let err = StageError::from(ExtractionError::EmptyInput {
            file_name: "cv.txt".to_string(),
        });
        assert!(err.to_string().starts_with("Text extraction failed"));
    }
}
