use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::timeout;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::blob::BlobStore;
use crate::config::schema::TimeoutsConfig;
use crate::job::{FailureKind, Job, JobStatus, JobStore, JobUpdate, StoreError};
use crate::processor::TextExtractor;
use crate::sanitize::redact_path;
use crate::tailor::{JobContext, TailoringEngine};

use super::error::{Stage, StageError};

/// Attempts at a version-checked failure write before it is forced.
const FAILURE_WRITE_ATTEMPTS: usize = 3;

/// Times `claim_next` re-selects after another caller won the claim.
const CLAIM_ATTEMPTS: usize = 5;

/// Upper bounds for the suspending stages of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimeouts {
    pub blob_fetch: Duration,
    pub extraction: Duration,
    pub tailoring: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            blob_fetch: Duration::from_secs(30),
            extraction: Duration::from_secs(120),
            tailoring: Duration::from_secs(180),
        }
    }
}

impl From<&TimeoutsConfig> for StageTimeouts {
    fn from(config: &TimeoutsConfig) -> Self {
        Self {
            blob_fetch: Duration::from_secs(config.blob_fetch_secs),
            extraction: Duration::from_secs(config.extraction_secs),
            tailoring: Duration::from_secs(config.tailoring_secs),
        }
    }
}

/// How an attempt ended, as recorded in the job row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Completed,
    Requeued { retry_count: u32, kind: FailureKind },
    Failed { kind: FailureKind },
    /// Even the failure could not be written; the row still says `processing`.
    Unrecorded,
}

/// Runs attempts for claimed jobs. Stage errors never escape: each attempt
/// ends in a persisted transition and an [`AttemptOutcome`].
#[derive(Clone)]
pub struct JobProcessor {
    store: Arc<dyn JobStore>,
    blobs: Arc<dyn BlobStore>,
    extractor: Arc<TextExtractor>,
    tailor: TailoringEngine,
    timeouts: StageTimeouts,
}

impl JobProcessor {
    pub fn new(
        store: Arc<dyn JobStore>,
        blobs: Arc<dyn BlobStore>,
        extractor: TextExtractor,
        tailor: TailoringEngine,
    ) -> Self {
        Self {
            store,
            blobs,
            extractor: Arc::new(extractor),
            tailor,
            timeouts: StageTimeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: StageTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Step 1: moves a queued job to `processing` with progress 10.
    pub fn claim(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        let claimed = self.store.claim(job_id, Utc::now())?;
        if claimed.is_some() {
            debug!(job_id, "Claimed job");
        }
        Ok(claimed)
    }

    /// Claims the oldest queued job, selecting again if another caller
    /// claims the candidate first.
    pub fn claim_next(&self) -> Result<Option<Job>, StoreError> {
        for _ in 0..CLAIM_ATTEMPTS {
            let Some(candidate) = self.store.select_oldest_queued()? else {
                return Ok(None);
            };
            if let Some(job) = self.claim(&candidate.id)? {
                return Ok(Some(job));
            }
            debug!(job_id = %candidate.id, "Lost claim race, selecting again");
        }
        Ok(None)
    }

    /// Puts a claimed job that never started back in the queue without
    /// spending a retry.
    pub fn release(&self, job: &Job) -> Result<(), StoreError> {
        self.store
            .update_if_version(&job.id, job.version, &JobUpdate::released())?;
        info!(job_id = %job.id, "Released claim on job");
        Ok(())
    }

    /// Claims and runs a job inline. `None` means the job was not queued.
    pub async fn process(&self, job_id: &str) -> Result<Option<AttemptOutcome>, StoreError> {
        match self.claim(job_id)? {
            Some(job) => Ok(Some(self.run(job).await)),
            None => Ok(None),
        }
    }

    /// Steps 2 to 5 for a job this caller has claimed.
    pub async fn run(&self, job: Job) -> AttemptOutcome {
        let span = info_span!(
            "pipeline.attempt",
            job_id = %job.id,
            file = %redact_path(Path::new(&job.file_name)),
            retry_count = job.retry_count,
        );

        async {
            let started = std::time::Instant::now();
            let outcome = match self.run_stages(&job).await {
                Ok(()) => AttemptOutcome::Completed,
                Err(e) => self.record_failure(&job.id, &e),
            };
            info!(
                outcome = ?outcome,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Attempt finished"
            );
            outcome
        }
        .instrument(span)
        .await
    }

    async fn run_stages(&self, job: &Job) -> Result<(), StageError> {
        let bytes = self.fetch(job).await?;

        let text = self.extract(job, bytes).await?;
        self.store
            .update_by_id(&job.id, &JobUpdate::extracted(text.clone()))?;

        let tailored = self.tailor(job, &text).await?;
        self.store.update_by_id(&job.id, &JobUpdate::tailored())?;
        self.store
            .update_by_id(&job.id, &JobUpdate::completed(tailored, Utc::now()))?;

        Ok(())
    }

    async fn fetch(&self, job: &Job) -> Result<Vec<u8>, StageError> {
        let limit = self.timeouts.blob_fetch;
        let bytes = timeout(limit, self.blobs.fetch(&job.file_path))
            .instrument(info_span!("stage.fetch"))
            .await
            .map_err(|_| StageError::Timeout {
                stage: Stage::Fetch,
                after: limit,
            })??;
        debug!(bytes = bytes.len(), "Fetched resume");
        Ok(bytes)
    }

    /// Extraction is CPU bound and may shell out, so it runs on the
    /// blocking pool. A timed-out task keeps running until it returns.
    async fn extract(&self, job: &Job, bytes: Vec<u8>) -> Result<String, StageError> {
        let span = info_span!("stage.extract");
        let limit = self.timeouts.extraction;
        let extractor = Arc::clone(&self.extractor);
        let file_name = job.file_name.clone();

        let task_span = span.clone();
        let task = tokio::task::spawn_blocking(move || {
            let _entered = task_span.enter();
            extractor.extract(&bytes, &file_name)
        });

        let joined = timeout(limit, task)
            .instrument(span)
            .await
            .map_err(|_| StageError::Timeout {
                stage: Stage::Extract,
                after: limit,
            })?;
        let extraction = joined.map_err(|e| StageError::ExtractionTask(e.to_string()))??;

        debug!(
            method = ?extraction.method,
            chars = extraction.text.chars().count(),
            "Extracted text"
        );
        Ok(extraction.text)
    }

    async fn tailor(&self, job: &Job, text: &str) -> Result<String, StageError> {
        let limit = self.timeouts.tailoring;
        let context = JobContext::from_job(job);
        let tailored = timeout(limit, self.tailor.tailor(text, &context))
            .instrument(info_span!("stage.tailor"))
            .await
            .map_err(|_| StageError::Timeout {
                stage: Stage::Tailor,
                after: limit,
            })??;
        Ok(tailored)
    }

    /// Records an attempt that panicked instead of returning. The stage is
    /// read off the persisted progress. Rows no longer in `processing` are
    /// left as they are.
    pub fn record_panic(&self, job_id: &str, message: &str) -> AttemptOutcome {
        let current = match self.read_current(job_id) {
            Ok(job) => job,
            Err(e) => {
                error!(job_id, "Could not read job after a panicked attempt: {}", e);
                return AttemptOutcome::Unrecorded;
            }
        };

        match current.status {
            JobStatus::Processing => {
                let error = StageError::Panicked {
                    stage: Stage::at_progress(current.progress),
                    message: message.to_string(),
                };
                self.record_failure(job_id, &error)
            }
            JobStatus::Completed => AttemptOutcome::Completed,
            status => {
                warn!(job_id, status = %status, "Panicked attempt left job outside processing");
                AttemptOutcome::Unrecorded
            }
        }
    }

    fn record_failure(&self, job_id: &str, error: &StageError) -> AttemptOutcome {
        warn!(kind = %error.kind(), "Attempt failed: {}", error);

        match self.write_failure(job_id, error) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    job_id,
                    "Could not record failed attempt, job left in processing: {}", e
                );
                AttemptOutcome::Unrecorded
            }
        }
    }

    /// Step 5. The retry budget is read at failure time and the write is
    /// version-checked, falling back to an unconditional write.
    fn write_failure(&self, job_id: &str, error: &StageError) -> Result<AttemptOutcome, StoreError> {
        let kind = error.kind();
        let message = error.to_string();

        for attempt in 1..FAILURE_WRITE_ATTEMPTS {
            let current = self.read_current(job_id)?;
            let (update, outcome) = failure_transition(&current, &message, kind, Utc::now());
            match self
                .store
                .update_if_version(job_id, current.version, &update)
            {
                Ok(_) => return Ok(outcome),
                Err(StoreError::Conflict { .. }) => {
                    debug!(attempt, "Failure write lost a version race, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        warn!(job_id, "Forcing failure write after repeated version conflicts");
        let current = self.read_current(job_id)?;
        let (update, outcome) = failure_transition(&current, &message, kind, Utc::now());
        self.store.update_by_id(job_id, &update)?;
        Ok(outcome)
    }

    fn read_current(&self, job_id: &str) -> Result<Job, StoreError> {
        self.store
            .read_by_id(job_id)?
            .ok_or_else(|| StoreError::NotFound {
                id: job_id.to_string(),
            })
    }
}

/// Re-queues while the budget lasts, otherwise fails the job.
fn failure_transition(
    current: &Job,
    message: &str,
    kind: FailureKind,
    now: DateTime<Utc>,
) -> (JobUpdate, AttemptOutcome) {
    if current.can_retry() {
        let retry_count = current.retry_count + 1;
        (
            JobUpdate::requeued(retry_count, message.to_string(), kind, now),
            AttemptOutcome::Requeued { retry_count, kind },
        )
    } else {
        (
            JobUpdate::failed(message.to_string(), kind, now),
            AttemptOutcome::Failed { kind },
        )
    }
}
