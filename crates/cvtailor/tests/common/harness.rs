//! Test harness for isolated pipeline runs.
//!
//! Every harness owns a fresh in-memory database, so tests never share rows.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use cvtailor::job::{Job, JobStatus, JobStore, JobUpdate, NewJob, SqliteJobStore, StoreError};
use cvtailor::processor::{OcrEngine, TextExtractor};
use cvtailor::tailor::{CompletionClient, TailoringEngine};
use cvtailor::{Database, JobProcessor};

use super::fakes::{CountingOcr, MemoryBlobStore, ScriptedCompletion};

/// Wraps the SQLite store and records every status and progress value the
/// job moves through.
pub struct RecordingStore {
    inner: SqliteJobStore,
    transitions: Mutex<Vec<(String, JobStatus)>>,
    progress: Mutex<Vec<(String, u8)>>,
}

impl RecordingStore {
    pub fn new(inner: SqliteJobStore) -> Self {
        Self {
            inner,
            transitions: Mutex::new(Vec::new()),
            progress: Mutex::new(Vec::new()),
        }
    }

    /// Progress values written for `job_id`, in order, excluding the insert.
    pub fn progress(&self, job_id: &str) -> Vec<u8> {
        self.progress
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == job_id)
            .map(|(_, progress)| *progress)
            .collect()
    }

    /// Statuses written for `job_id`, in order, excluding the initial insert.
    pub fn transitions(&self, job_id: &str) -> Vec<JobStatus> {
        self.transitions
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == job_id)
            .map(|(_, status)| *status)
            .collect()
    }

    fn record(&self, job_id: &str, status: Option<JobStatus>, progress: Option<u8>) {
        if let Some(status) = status {
            self.transitions
                .lock()
                .unwrap()
                .push((job_id.to_string(), status));
        }
        if let Some(progress) = progress {
            self.progress
                .lock()
                .unwrap()
                .push((job_id.to_string(), progress));
        }
    }
}

impl JobStore for RecordingStore {
    fn insert(&self, job: NewJob) -> Result<Job, StoreError> {
        self.inner.insert(job)
    }

    fn read_by_id(&self, id: &str) -> Result<Option<Job>, StoreError> {
        self.inner.read_by_id(id)
    }

    fn update_by_id(&self, id: &str, update: &JobUpdate) -> Result<Job, StoreError> {
        let job = self.inner.update_by_id(id, update)?;
        self.record(id, update.status, update.progress);
        Ok(job)
    }

    fn update_if_version(
        &self,
        id: &str,
        expected_version: u64,
        update: &JobUpdate,
    ) -> Result<Job, StoreError> {
        let job = self.inner.update_if_version(id, expected_version, update)?;
        self.record(id, update.status, update.progress);
        Ok(job)
    }

    fn select_oldest_queued(&self) -> Result<Option<Job>, StoreError> {
        self.inner.select_oldest_queued()
    }

    fn claim(&self, id: &str, now: DateTime<Utc>) -> Result<Option<Job>, StoreError> {
        let claimed = self.inner.claim(id, now)?;
        if let Some(job) = &claimed {
            self.record(id, Some(JobStatus::Processing), Some(job.progress));
        }
        Ok(claimed)
    }
}

/// An in-memory pipeline with fake collaborators.
pub struct TestHarness {
    pub store: Arc<RecordingStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub completion: Arc<ScriptedCompletion>,
    pub ocr: Arc<CountingOcr>,
}

impl TestHarness {
    /// Creates a harness whose OCR engine recognises `ocr_text`.
    pub fn with_ocr_text(ocr_text: &str) -> Self {
        let database = Database::open_in_memory().expect("Failed to open in-memory database");
        Self {
            store: Arc::new(RecordingStore::new(SqliteJobStore::new(database))),
            blobs: Arc::new(MemoryBlobStore::default()),
            completion: Arc::new(ScriptedCompletion::default()),
            ocr: Arc::new(CountingOcr::new(ocr_text)),
        }
    }

    pub fn new() -> Self {
        Self::with_ocr_text(super::JANE_DOE_RESUME)
    }

    pub fn processor(&self) -> JobProcessor {
        let completion: Arc<dyn CompletionClient> = self.completion.clone();
        self.processor_with(completion)
    }

    /// A processor using a different completion client.
    pub fn processor_with(&self, completion: Arc<dyn CompletionClient>) -> JobProcessor {
        let ocr: Arc<dyn OcrEngine> = self.ocr.clone();
        JobProcessor::new(
            self.store.clone(),
            self.blobs.clone(),
            TextExtractor::new(Some(ocr), 100),
            TailoringEngine::new(completion),
        )
    }

    /// Uploads `bytes` and inserts a queued job pointing at them.
    pub fn enqueue(&self, file_name: &str, bytes: &[u8], max_retries: u32) -> Job {
        let path = format!("uploads/{}", file_name);
        self.blobs.put(&path, bytes.to_vec());
        self.store
            .insert(
                NewJob::new(path, file_name)
                    .with_job_title("Staff Engineer")
                    .with_company_name("Globex")
                    .with_job_description(super::JOB_DESCRIPTION)
                    .with_max_retries(max_retries),
            )
            .expect("Failed to insert job")
    }

    pub fn read(&self, job_id: &str) -> Job {
        self.store
            .read_by_id(job_id)
            .expect("Failed to read job")
            .expect("Job should exist")
    }
}
