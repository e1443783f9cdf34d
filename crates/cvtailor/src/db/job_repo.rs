//! Raw row access for the `tailoring_jobs` table.

use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A raw job row from the database.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub file_path: String,
    pub file_name: String,
    pub job_title: Option<String>,
    pub company_name: Option<String>,
    pub job_description: Option<String>,
    pub status: String,
    pub progress: i64,
    pub retry_count: i64,
    pub max_retries: i64,
    pub extracted_text: Option<String>,
    pub tailored_content: Option<String>,
    pub error_message: Option<String>,
    pub error_kind: Option<String>,
    pub processing_started_at: Option<String>,
    pub processing_completed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub version: i64,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            file_path: row.get("file_path")?,
            file_name: row.get("file_name")?,
            job_title: row.get("job_title")?,
            company_name: row.get("company_name")?,
            job_description: row.get("job_description")?,
            status: row.get("status")?,
            progress: row.get("progress")?,
            retry_count: row.get("retry_count")?,
            max_retries: row.get("max_retries")?,
            extracted_text: row.get("extracted_text")?,
            tailored_content: row.get("tailored_content")?,
            error_message: row.get("error_message")?,
            error_kind: row.get("error_kind")?,
            processing_started_at: row.get("processing_started_at")?,
            processing_completed_at: row.get("processing_completed_at")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            version: row.get("version")?,
        })
    }
}

/// Columns a partial update may touch. `version` and `updated_at` are
/// maintained by [`update_fields`] itself.
const UPDATABLE_COLUMNS: &[&str] = &[
    "status",
    "progress",
    "retry_count",
    "max_retries",
    "extracted_text",
    "tailored_content",
    "error_message",
    "error_kind",
    "processing_started_at",
    "processing_completed_at",
];

/// An ordered list of `column = value` assignments for a partial update.
#[derive(Debug, Default, Clone)]
pub struct Assignments {
    values: Vec<(&'static str, Value)>,
}

impl Assignments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, column: &'static str, value: Value) -> &mut Self {
        self.values.push((column, value));
        self
    }

    pub fn set_text(&mut self, column: &'static str, value: Option<String>) -> &mut Self {
        self.set(column, value.map(Value::Text).unwrap_or(Value::Null))
    }

    pub fn set_int(&mut self, column: &'static str, value: i64) -> &mut Self {
        self.set(column, Value::Integer(value))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.values.iter().map(|(c, _)| *c)
    }
}

/// Result of a partial update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated { version: i64 },
    NotFound,
    VersionMismatch { current: i64 },
}

/// Inserts a new job row.
pub fn insert(db: &Database, job: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO tailoring_jobs (id, file_path, file_name, job_title, company_name,
             job_description, status, progress, retry_count, max_retries, extracted_text,
             tailored_content, error_message, error_kind, processing_started_at,
             processing_completed_at, created_at, updated_at, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
             ?17, ?18, ?19)",
            params![
                job.id,
                job.file_path,
                job.file_name,
                job.job_title,
                job.company_name,
                job.job_description,
                job.status,
                job.progress,
                job.retry_count,
                job.max_retries,
                job.extracted_text,
                job.tailored_content,
                job.error_message,
                job.error_kind,
                job.processing_started_at,
                job.processing_completed_at,
                job.created_at,
                job.updated_at,
                job.version,
            ],
        )?;
        Ok(())
    })
}

fn select_by_id(conn: &Connection, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM tailoring_jobs WHERE id = ?1",
            params![id],
            JobRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| select_by_id(conn, id))
}

/// Returns the oldest queued job, ties broken by insertion order.
pub fn find_oldest_queued(db: &Database) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM tailoring_jobs WHERE status = 'queued'
                 ORDER BY created_at ASC, rowid ASC LIMIT 1",
                [],
                JobRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Atomically moves a job from `queued` to `processing`.
///
/// Returns the claimed row, or `None` when the job does not exist or is no
/// longer queued.
pub fn claim(
    db: &Database,
    id: &str,
    progress: i64,
    now: &str,
) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE tailoring_jobs
             SET status = 'processing', progress = ?2, processing_started_at = ?3,
                 updated_at = ?3, version = version + 1
             WHERE id = ?1 AND status = 'queued'",
            params![id, progress, now],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        select_by_id(conn, id)
    })
}

/// Applies a partial update and bumps the row version.
///
/// With `expected_version` the write only happens if the stored version
/// still matches.
pub fn update_fields(
    db: &Database,
    id: &str,
    assignments: &Assignments,
    expected_version: Option<i64>,
    now: &str,
) -> Result<UpdateOutcome, DatabaseError> {
    if let Some(column) = assignments
        .columns()
        .find(|c| !UPDATABLE_COLUMNS.contains(c))
    {
        return Err(DatabaseError::Sqlite(rusqlite::Error::InvalidColumnName(
            column.to_string(),
        )));
    }

    db.with_conn(|conn| {
        let mut set_clauses = Vec::new();
        let mut param_values: Vec<&dyn rusqlite::types::ToSql> = Vec::new();

        for (column, value) in &assignments.values {
            param_values.push(value);
            set_clauses.push(format!("{} = ?{}", column, param_values.len()));
        }

        param_values.push(&now);
        set_clauses.push(format!("updated_at = ?{}", param_values.len()));
        set_clauses.push("version = version + 1".to_string());

        param_values.push(&id);
        let mut sql = format!(
            "UPDATE tailoring_jobs SET {} WHERE id = ?{}",
            set_clauses.join(", "),
            param_values.len()
        );

        if let Some(ref expected) = expected_version {
            param_values.push(expected);
            sql.push_str(&format!(" AND version = ?{}", param_values.len()));
        }

        let changed = conn.execute(&sql, param_values.as_slice())?;

        let current: Option<i64> = conn
            .query_row(
                "SELECT version FROM tailoring_jobs WHERE id = ?1",
                params![id],
                |r| r.get(0),
            )
            .optional()?;

        Ok(match (changed, current) {
            (_, None) => UpdateOutcome::NotFound,
            (0, Some(current)) => UpdateOutcome::VersionMismatch { current },
            (_, Some(version)) => UpdateOutcome::Updated { version },
        })
    })
}

/// Counts jobs with the given status.
pub fn count_by_status(db: &Database, status: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM tailoring_jobs WHERE status = ?1",
            params![status],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn sample_job(id: &str, created_at: &str) -> JobRow {
        JobRow {
            id: id.to_string(),
            file_path: format!("uploads/{}.txt", id),
            file_name: "resume.txt".to_string(),
            job_title: Some("Backend Engineer".to_string()),
            company_name: None,
            job_description: None,
            status: "queued".to_string(),
            progress: 0,
            retry_count: 0,
            max_retries: 3,
            extracted_text: None,
            tailored_content: None,
            error_message: None,
            error_kind: None,
            processing_started_at: None,
            processing_completed_at: None,
            created_at: created_at.to_string(),
            updated_at: created_at.to_string(),
            version: 0,
        }
    }

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        insert(&db, &sample_job("job-1", "2026-01-01T00:00:00.000000Z")).unwrap();

        let found = find_by_id(&db, "job-1").unwrap().unwrap();
        assert_eq!(found.file_name, "resume.txt");
        assert_eq!(found.status, "queued");
        assert_eq!(found.job_title.as_deref(), Some("Backend Engineer"));
        assert_eq!(found.version, 0);
    }

    #[test]
    fn test_find_nonexistent() {
        let db = test_db();
        assert!(find_by_id(&db, "nonexistent").unwrap().is_none());
    }

    #[test]
    fn test_oldest_queued_is_fifo() {
        let db = test_db();
        insert(&db, &sample_job("late", "2026-01-01T00:00:02.000000Z")).unwrap();
        insert(&db, &sample_job("early", "2026-01-01T00:00:01.000000Z")).unwrap();

        let mut done = sample_job("done", "2026-01-01T00:00:00.000000Z");
        done.status = "completed".to_string();
        insert(&db, &done).unwrap();

        let oldest = find_oldest_queued(&db).unwrap().unwrap();
        assert_eq!(oldest.id, "early");
    }

    #[test]
    fn test_oldest_queued_ties_use_insertion_order() {
        let db = test_db();
        let ts = "2026-01-01T00:00:00.000000Z";
        insert(&db, &sample_job("first", ts)).unwrap();
        insert(&db, &sample_job("second", ts)).unwrap();

        assert_eq!(find_oldest_queued(&db).unwrap().unwrap().id, "first");
    }

    #[test]
    fn test_claim_only_once() {
        let db = test_db();
        insert(&db, &sample_job("c1", "2026-01-01T00:00:00.000000Z")).unwrap();

        let claimed = claim(&db, "c1", 10, "2026-01-01T00:01:00.000000Z")
            .unwrap()
            .unwrap();
        assert_eq!(claimed.status, "processing");
        assert_eq!(claimed.progress, 10);
        assert_eq!(claimed.version, 1);
        assert_eq!(
            claimed.processing_started_at.as_deref(),
            Some("2026-01-01T00:01:00.000000Z")
        );

        assert!(claim(&db, "c1", 10, "2026-01-01T00:02:00.000000Z")
            .unwrap()
            .is_none());
        assert!(claim(&db, "missing", 10, "2026-01-01T00:02:00.000000Z")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_update_fields_bumps_version() {
        let db = test_db();
        insert(&db, &sample_job("u1", "2026-01-01T00:00:00.000000Z")).unwrap();

        let mut changes = Assignments::new();
        changes
            .set_int("progress", 50)
            .set_text("extracted_text", Some("Jane Doe".to_string()));

        let outcome =
            update_fields(&db, "u1", &changes, None, "2026-01-01T00:05:00.000000Z").unwrap();
        assert_eq!(outcome, UpdateOutcome::Updated { version: 1 });

        let row = find_by_id(&db, "u1").unwrap().unwrap();
        assert_eq!(row.progress, 50);
        assert_eq!(row.extracted_text.as_deref(), Some("Jane Doe"));
        assert_eq!(row.updated_at, "2026-01-01T00:05:00.000000Z");
    }

    #[test]
    fn test_update_fields_version_mismatch() {
        let db = test_db();
        insert(&db, &sample_job("v1", "2026-01-01T00:00:00.000000Z")).unwrap();

        let mut changes = Assignments::new();
        changes.set_text("error_message", None);
        update_fields(&db, "v1", &changes, Some(0), "2026-01-01T00:00:01.000000Z").unwrap();

        let stale =
            update_fields(&db, "v1", &changes, Some(0), "2026-01-01T00:00:02.000000Z").unwrap();
        assert_eq!(stale, UpdateOutcome::VersionMismatch { current: 1 });
    }

    #[test]
    fn test_update_fields_not_found() {
        let db = test_db();
        let mut changes = Assignments::new();
        changes.set_int("progress", 10);
        let outcome =
            update_fields(&db, "ghost", &changes, None, "2026-01-01T00:00:00.000000Z").unwrap();
        assert_eq!(outcome, UpdateOutcome::NotFound);
    }

    #[test]
    fn test_update_fields_rejects_unknown_column() {
        let db = test_db();
        let mut changes = Assignments::new();
        changes.set_text("id", Some("other".to_string()));
        assert!(update_fields(&db, "x", &changes, None, "2026-01-01T00:00:00Z").is_err());
    }

    #[test]
    fn test_count_by_status() {
        let db = test_db();
        insert(&db, &sample_job("a", "2026-01-01T00:00:00.000000Z")).unwrap();
        insert(&db, &sample_job("b", "2026-01-01T00:00:01.000000Z")).unwrap();
        claim(&db, "a", 10, "2026-01-01T00:00:02.000000Z").unwrap();

        assert_eq!(count_by_status(&db, "queued").unwrap(), 1);
        assert_eq!(count_by_status(&db, "processing").unwrap(), 1);
        assert_eq!(count_by_status(&db, "failed").unwrap(), 0);
    }
}
