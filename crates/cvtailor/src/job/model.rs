use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::progress;

/// Retry budget given to jobs created without an explicit one.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// Class of the failure recorded by the last unsuccessful attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    BlobFetchFailed,
    ExtractionFailed,
    TailoringFailed,
    StorageFailed,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::BlobFetchFailed => "blob_fetch_failed",
            FailureKind::ExtractionFailed => "extraction_failed",
            FailureKind::TailoringFailed => "tailoring_failed",
            FailureKind::StorageFailed => "storage_failed",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blob_fetch_failed" => Ok(FailureKind::BlobFetchFailed),
            "extraction_failed" => Ok(FailureKind::ExtractionFailed),
            "tailoring_failed" => Ok(FailureKind::TailoringFailed),
            "storage_failed" => Ok(FailureKind::StorageFailed),
            other => Err(format!("unknown failure kind '{}'", other)),
        }
    }
}

/// A persisted tailoring job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub file_path: String,
    pub file_name: String,
    pub job_title: Option<String>,
    pub company_name: Option<String>,
    pub job_description: Option<String>,
    pub status: JobStatus,
    pub progress: u8,
    pub retry_count: u32,
    pub max_retries: u32,
    pub extracted_text: Option<String>,
    pub tailored_content: Option<String>,
    pub error_message: Option<String>,
    pub error_kind: Option<FailureKind>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processing_completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Job {
    /// Whether a failed attempt may put the job back in the queue.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }
}

/// Input for creating a job in the `queued` state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewJob {
    pub file_path: String,
    pub file_name: String,
    pub job_title: Option<String>,
    pub company_name: Option<String>,
    pub job_description: Option<String>,
    pub max_retries: Option<u32>,
}

impl NewJob {
    pub fn new(file_path: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            file_name: file_name.into(),
            ..Default::default()
        }
    }

    pub fn with_job_title(mut self, title: impl Into<String>) -> Self {
        self.job_title = Some(title.into());
        self
    }

    pub fn with_company_name(mut self, company: impl Into<String>) -> Self {
        self.company_name = Some(company.into());
        self
    }

    pub fn with_job_description(mut self, description: impl Into<String>) -> Self {
        self.job_description = Some(description.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// A partial update. `None` leaves a field untouched; `Some(None)` clears a
/// nullable field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub retry_count: Option<u32>,
    pub extracted_text: Option<Option<String>>,
    pub tailored_content: Option<Option<String>>,
    pub error_message: Option<Option<String>>,
    pub error_kind: Option<Option<FailureKind>>,
    pub processing_started_at: Option<Option<DateTime<Utc>>>,
    pub processing_completed_at: Option<Option<DateTime<Utc>>>,
}

impl JobUpdate {
    pub fn is_empty(&self) -> bool {
        *self == JobUpdate::default()
    }

    /// Extraction finished: the text is stored and progress moves to 50.
    pub fn extracted(text: String) -> Self {
        Self {
            progress: Some(progress::EXTRACTED),
            extracted_text: Some(Some(text)),
            ..Default::default()
        }
    }

    /// The tailored document arrived and is about to be stored.
    pub fn tailored() -> Self {
        Self {
            progress: Some(progress::TAILORED),
            ..Default::default()
        }
    }

    pub fn completed(tailored_content: String, now: DateTime<Utc>) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            progress: Some(progress::COMPLETED),
            tailored_content: Some(Some(tailored_content)),
            error_message: Some(None),
            error_kind: Some(None),
            processing_completed_at: Some(Some(now)),
            ..Default::default()
        }
    }

    pub fn requeued(
        retry_count: u32,
        message: String,
        kind: FailureKind,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            status: Some(JobStatus::Queued),
            progress: Some(progress::QUEUED),
            retry_count: Some(retry_count),
            tailored_content: Some(None),
            error_message: Some(Some(message)),
            error_kind: Some(Some(kind)),
            processing_completed_at: Some(Some(now)),
            ..Default::default()
        }
    }

    pub fn failed(message: String, kind: FailureKind, now: DateTime<Utc>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            tailored_content: Some(None),
            error_message: Some(Some(message)),
            error_kind: Some(Some(kind)),
            processing_completed_at: Some(Some(now)),
            ..Default::default()
        }
    }

    /// Undoes a claim whose job never reached a worker. The retry budget is
    /// untouched.
    pub fn released() -> Self {
        Self {
            status: Some(JobStatus::Queued),
            progress: Some(progress::QUEUED),
            ..Default::default()
        }
    }
}
