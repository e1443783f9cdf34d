use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use crate::db::job_repo::{self, Assignments, JobRow, UpdateOutcome};
use crate::db::{Database, DatabaseError};
use crate::job::model::{FailureKind, Job, JobStatus, JobUpdate, NewJob, DEFAULT_MAX_RETRIES};
use crate::pipeline::progress;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Job '{id}' not found")]
    NotFound { id: String },

    #[error("Job '{id}' was modified concurrently (expected version {expected}, found {current})")]
    Conflict {
        id: String,
        expected: u64,
        current: u64,
    },

    #[error("Job '{id}' has an unreadable row: {reason}")]
    Corrupt { id: String, reason: String },
}

/// Persistence for tailoring jobs.
///
/// Every write bumps the row version. `claim` is the only way a job enters
/// `processing`, and it succeeds for at most one caller.
pub trait JobStore: Send + Sync {
    fn insert(&self, job: NewJob) -> Result<Job, StoreError>;

    fn read_by_id(&self, id: &str) -> Result<Option<Job>, StoreError>;

    fn update_by_id(&self, id: &str, update: &JobUpdate) -> Result<Job, StoreError>;

    /// Writes only if the stored version still equals `expected_version`.
    fn update_if_version(
        &self,
        id: &str,
        expected_version: u64,
        update: &JobUpdate,
    ) -> Result<Job, StoreError>;

    fn select_oldest_queued(&self) -> Result<Option<Job>, StoreError>;

    /// Moves a queued job to `processing`. Returns `None` if the job is
    /// missing or was not queued.
    fn claim(&self, id: &str, now: DateTime<Utc>) -> Result<Option<Job>, StoreError>;
}

/// [`JobStore`] backed by the `tailoring_jobs` SQLite table.
#[derive(Clone)]
pub struct SqliteJobStore {
    db: Database,
    default_max_retries: u32,
}

impl SqliteJobStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            default_max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_default_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = max_retries;
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn count_by_status(&self, status: JobStatus) -> Result<u64, StoreError> {
        Ok(job_repo::count_by_status(&self.db, status.as_str())?)
    }

    fn write(
        &self,
        id: &str,
        update: &JobUpdate,
        expected_version: Option<u64>,
    ) -> Result<Job, StoreError> {
        let assignments = to_assignments(update);
        let now = format_timestamp(Utc::now());

        let outcome = job_repo::update_fields(
            &self.db,
            id,
            &assignments,
            expected_version.map(|v| v as i64),
            &now,
        )?;

        match outcome {
            UpdateOutcome::Updated { .. } => self.read_by_id(id)?.ok_or_else(|| StoreError::NotFound {
                id: id.to_string(),
            }),
            UpdateOutcome::NotFound => Err(StoreError::NotFound { id: id.to_string() }),
            UpdateOutcome::VersionMismatch { current } => Err(StoreError::Conflict {
                id: id.to_string(),
                expected: expected_version.unwrap_or_default(),
                current: current.max(0) as u64,
            }),
        }
    }
}

impl JobStore for SqliteJobStore {
    fn insert(&self, job: NewJob) -> Result<Job, StoreError> {
        let now = format_timestamp(Utc::now());
        let row = JobRow {
            id: uuid::Uuid::new_v4().to_string(),
            file_path: job.file_path,
            file_name: job.file_name,
            job_title: job.job_title,
            company_name: job.company_name,
            job_description: job.job_description,
            status: JobStatus::Queued.as_str().to_string(),
            progress: progress::QUEUED as i64,
            retry_count: 0,
            max_retries: job.max_retries.unwrap_or(self.default_max_retries) as i64,
            extracted_text: None,
            tailored_content: None,
            error_message: None,
            error_kind: None,
            processing_started_at: None,
            processing_completed_at: None,
            created_at: now.clone(),
            updated_at: now,
            version: 0,
        };

        job_repo::insert(&self.db, &row)?;
        log::debug!("Inserted job {}", row.id);
        row_to_job(row)
    }

    fn read_by_id(&self, id: &str) -> Result<Option<Job>, StoreError> {
        job_repo::find_by_id(&self.db, id)?
            .map(row_to_job)
            .transpose()
    }

    fn update_by_id(&self, id: &str, update: &JobUpdate) -> Result<Job, StoreError> {
        self.write(id, update, None)
    }

    fn update_if_version(
        &self,
        id: &str,
        expected_version: u64,
        update: &JobUpdate,
    ) -> Result<Job, StoreError> {
        self.write(id, update, Some(expected_version))
    }

    fn select_oldest_queued(&self) -> Result<Option<Job>, StoreError> {
        job_repo::find_oldest_queued(&self.db)?
            .map(row_to_job)
            .transpose()
    }

    fn claim(&self, id: &str, now: DateTime<Utc>) -> Result<Option<Job>, StoreError> {
        job_repo::claim(
            &self.db,
            id,
            progress::CLAIMED as i64,
            &format_timestamp(now),
        )?
        .map(row_to_job)
        .transpose()
    }
}

// ─── Row conversion ─────────────────────────────────────────────────────────

/// Fixed-width UTC timestamps so that text ordering matches time ordering.
fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str, id: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            id: id.to_string(),
            reason: format!("bad timestamp '{}': {}", s, e),
        })
}

fn parse_optional_timestamp(
    s: Option<&str>,
    id: &str,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    s.map(|s| parse_timestamp(s, id)).transpose()
}

fn to_unsigned<T: TryFrom<i64>>(value: i64, field: &str, id: &str) -> Result<T, StoreError> {
    T::try_from(value).map_err(|_| StoreError::Corrupt {
        id: id.to_string(),
        reason: format!("{} out of range: {}", field, value),
    })
}

fn row_to_job(row: JobRow) -> Result<Job, StoreError> {
    let id = row.id.as_str();
    let corrupt = |reason: String| StoreError::Corrupt {
        id: id.to_string(),
        reason,
    };

    let status = row.status.parse::<JobStatus>().map_err(corrupt)?;
    let error_kind = row
        .error_kind
        .as_deref()
        .map(str::parse::<FailureKind>)
        .transpose()
        .map_err(corrupt)?;

    Ok(Job {
        status,
        error_kind,
        progress: to_unsigned(row.progress, "progress", id)?,
        retry_count: to_unsigned(row.retry_count, "retry_count", id)?,
        max_retries: to_unsigned(row.max_retries, "max_retries", id)?,
        version: to_unsigned(row.version, "version", id)?,
        processing_started_at: parse_optional_timestamp(row.processing_started_at.as_deref(), id)?,
        processing_completed_at: parse_optional_timestamp(
            row.processing_completed_at.as_deref(),
            id,
        )?,
        created_at: parse_timestamp(&row.created_at, id)?,
        updated_at: parse_timestamp(&row.updated_at, id)?,
        file_path: row.file_path.clone(),
        file_name: row.file_name.clone(),
        job_title: row.job_title.clone(),
        company_name: row.company_name.clone(),
        job_description: row.job_description.clone(),
        extracted_text: row.extracted_text.clone(),
        tailored_content: row.tailored_content.clone(),
        error_message: row.error_message.clone(),
        id: row.id.clone(),
    })
}

fn to_assignments(update: &JobUpdate) -> Assignments {
    let mut a = Assignments::new();

    if let Some(status) = update.status {
        a.set_text("status", Some(status.as_str().to_string()));
    }
    if let Some(progress) = update.progress {
        a.set_int("progress", progress as i64);
    }
    if let Some(retry_count) = update.retry_count {
        a.set_int("retry_count", retry_count as i64);
    }
    if let Some(ref text) = update.extracted_text {
        a.set_text("extracted_text", text.clone());
    }
    if let Some(ref content) = update.tailored_content {
        a.set_text("tailored_content", content.clone());
    }
    if let Some(ref message) = update.error_message {
        a.set_text("error_message", message.clone());
    }
    if let Some(kind) = update.error_kind {
        a.set_text("error_kind", kind.map(|k| k.as_str().to_string()));
    }
    if let Some(started) = update.processing_started_at {
        a.set_text("processing_started_at", started.map(format_timestamp));
    }
    if let Some(completed) = update.processing_completed_at {
        a.set_text("processing_completed_at", completed.map(format_timestamp));
    }

    a
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> SqliteJobStore {
        SqliteJobStore::new(Database::open_in_memory().expect("Failed to create test database"))
    }

    #[test]
    fn test_insert_defaults() {
        let store = test_store();
        let job = store
            .insert(NewJob::new("uploads/u1/cv.pdf", "cv.pdf").with_job_title("SRE"))
            .unwrap();

        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress, 0);
        assert_eq!(job.retry_count, 0);
        assert_eq!(job.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(job.version, 0);
        assert!(uuid::Uuid::parse_str(&job.id).is_ok());
    }

    #[test]
    fn test_configured_default_max_retries() {
        let store = test_store().with_default_max_retries(7);
        let job = store.insert(NewJob::new("p", "cv.txt")).unwrap();
        assert_eq!(job.max_retries, 7);

        let explicit = store
            .insert(NewJob::new("p", "cv.txt").with_max_retries(1))
            .unwrap();
        assert_eq!(explicit.max_retries, 1);
    }

    #[test]
    fn test_update_then_read_round_trip() {
        let store = test_store();
        let job = store.insert(NewJob::new("p", "cv.txt")).unwrap();
        let now = Utc::now();

        let update = JobUpdate {
            status: Some(JobStatus::Failed),
            progress: Some(50),
            retry_count: Some(2),
            extracted_text: Some(Some("Jane Doe".to_string())),
            error_message: Some(Some("model unavailable".to_string())),
            error_kind: Some(Some(FailureKind::TailoringFailed)),
            processing_completed_at: Some(Some(now)),
            ..Default::default()
        };
        let written = store.update_by_id(&job.id, &update).unwrap();
        let read = store.read_by_id(&job.id).unwrap().unwrap();

        assert_eq!(written, read);
        assert_eq!(read.status, JobStatus::Failed);
        assert_eq!(read.progress, 50);
        assert_eq!(read.retry_count, 2);
        assert_eq!(read.extracted_text.as_deref(), Some("Jane Doe"));
        assert_eq!(read.error_message.as_deref(), Some("model unavailable"));
        assert_eq!(read.error_kind, Some(FailureKind::TailoringFailed));
        assert_eq!(
            read.processing_completed_at.map(|t| t.timestamp_micros()),
            Some(now.timestamp_micros())
        );
        assert_eq!(read.version, 1);
    }

    #[test]
    fn test_clearing_nullable_fields() {
        let store = test_store();
        let job = store.insert(NewJob::new("p", "cv.txt")).unwrap();
        store
            .update_by_id(
                &job.id,
                &JobUpdate {
                    error_message: Some(Some("x".to_string())),
                    ..Default::default()
                },
            )
            .unwrap();

        let cleared = store
            .update_by_id(
                &job.id,
                &JobUpdate {
                    error_message: Some(None),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(cleared.error_message, None);
    }

    #[test]
    fn test_update_missing_job() {
        let store = test_store();
        let result = store.update_by_id("ghost", &JobUpdate::released());
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn test_stale_version_conflicts() {
        let store = test_store();
        let job = store.insert(NewJob::new("p", "cv.txt")).unwrap();

        store
            .update_if_version(&job.id, job.version, &JobUpdate::tailored())
            .unwrap();

        match store.update_if_version(&job.id, job.version, &JobUpdate::released()) {
            Err(StoreError::Conflict {
                expected, current, ..
            }) => {
                assert_eq!(expected, 0);
                assert_eq!(current, 1);
            }
            other => panic!("Expected Conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_claim_sets_pickup_fields() {
        let store = test_store();
        let job = store.insert(NewJob::new("p", "cv.txt")).unwrap();
        let now = Utc::now();

        let claimed = store.claim(&job.id, now).unwrap().unwrap();
        assert_eq!(claimed.status, JobStatus::Processing);
        assert_eq!(claimed.progress, 10);
        assert!(claimed.processing_started_at.is_some());
        assert_eq!(claimed.version, job.version + 1);

        assert!(store.claim(&job.id, now).unwrap().is_none());
    }

    #[test]
    fn test_select_oldest_queued_skips_claimed() {
        let store = test_store();
        let first = store.insert(NewJob::new("a", "a.txt")).unwrap();
        let second = store.insert(NewJob::new("b", "b.txt")).unwrap();

        assert_eq!(store.select_oldest_queued().unwrap().unwrap().id, first.id);
        store.claim(&first.id, Utc::now()).unwrap();
        assert_eq!(store.select_oldest_queued().unwrap().unwrap().id, second.id);
        store.claim(&second.id, Utc::now()).unwrap();
        assert!(store.select_oldest_queued().unwrap().is_none());
    }

    #[test]
    fn test_count_by_status() {
        let store = test_store();
        store.insert(NewJob::new("a", "a.txt")).unwrap();
        store.insert(NewJob::new("b", "b.txt")).unwrap();
        assert_eq!(store.count_by_status(JobStatus::Queued).unwrap(), 2);
        assert_eq!(store.count_by_status(JobStatus::Completed).unwrap(), 0);
    }

    #[test]
    fn test_corrupt_status_is_reported() {
        let store = test_store();
        let job = store.insert(NewJob::new("a", "a.txt")).unwrap();
        store
            .database()
            .with_conn(|conn| {
                conn.execute_batch("PRAGMA ignore_check_constraints = ON;")?;
                conn.execute(
                    "UPDATE tailoring_jobs SET status = 'paused' WHERE id = ?1",
                    [&job.id],
                )?;
                Ok(())
            })
            .unwrap();

        assert!(matches!(
            store.read_by_id(&job.id),
            Err(StoreError::Corrupt { .. })
        ));
    }
}
