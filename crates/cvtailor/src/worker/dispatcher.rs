use thiserror::Error;
use tracing::{error, info};

use crate::error::WorkerError;
use crate::job::{Job, JobStatus, StoreError};
use crate::pipeline::JobProcessor;
use crate::worker::pool::WorkerPool;

/// Acknowledgement returned by a dispatch call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The job was claimed and handed to a worker.
    Started { job_id: String },
    /// No queued job exists.
    NoWork,
    /// The job exists but is not queued.
    NotEligible { job_id: String, status: JobStatus },
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Job '{job_id}' not found")]
    JobNotFound { job_id: String },

    #[error("Job store error: {0}")]
    Store(#[from] StoreError),

    #[error("Worker queue is full; job '{job_id}' was returned to the queue")]
    QueueFull { job_id: String },

    #[error("Worker pool is shut down; job '{job_id}' was returned to the queue")]
    PoolClosed { job_id: String },
}

/// Selects jobs, claims them and hands them to the worker pool.
///
/// Both entry points return as soon as the job is queued on a worker.
pub struct Dispatcher<'a> {
    processor: JobProcessor,
    pool: &'a WorkerPool,
}

impl<'a> Dispatcher<'a> {
    pub fn new(processor: JobProcessor, pool: &'a WorkerPool) -> Self {
        Self { processor, pool }
    }

    /// Claims the oldest queued job.
    pub fn process_next(&self) -> Result<Dispatch, DispatchError> {
        match self.processor.claim_next()? {
            Some(job) => self.hand_off(job),
            None => Ok(Dispatch::NoWork),
        }
    }

    /// Claims the given job if it is queued.
    pub fn process_specific(&self, job_id: &str) -> Result<Dispatch, DispatchError> {
        let job = self
            .processor
            .store()
            .read_by_id(job_id)?
            .ok_or_else(|| DispatchError::JobNotFound {
                job_id: job_id.to_string(),
            })?;

        if job.status != JobStatus::Queued {
            return Ok(Dispatch::NotEligible {
                job_id: job.id,
                status: job.status,
            });
        }

        match self.processor.claim(job_id)? {
            Some(claimed) => self.hand_off(claimed),
            // Another caller claimed it between the read and the claim.
            None => Ok(Dispatch::NotEligible {
                job_id: job.id,
                status: JobStatus::Processing,
            }),
        }
    }

    fn hand_off(&self, job: Job) -> Result<Dispatch, DispatchError> {
        let job_id = job.id.clone();
        let claimed = job.clone();

        match self.pool.submit(job) {
            Ok(()) => {
                info!(job_id = %job_id, "Dispatched job");
                Ok(Dispatch::Started { job_id })
            }
            Err(e) => {
                if let Err(release_err) = self.processor.release(&claimed) {
                    error!(
                        job_id = %job_id,
                        "Failed to release claim after hand-off failure: {}", release_err
                    );
                }
                Err(match e {
                    WorkerError::QueueFull => DispatchError::QueueFull { job_id },
                    _ => DispatchError::PoolClosed { job_id },
                })
            }
        }
    }
}
