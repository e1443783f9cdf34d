use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CvTailorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Blob store error: {0}")]
    Blob(#[from] crate::blob::BlobError),

    #[error("Tailoring error: {0}")]
    Tailor(#[from] crate::tailor::TailorError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] crate::worker::DispatchError),

    #[error("Job store error: {0}")]
    Store(#[from] crate::job::StoreError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Failed to resolve secret for '{field}': {source}")]
    Secret {
        field: &'static str,
        #[source]
        source: crate::secrets::SecretError,
    },
}

/// Failure of the text extraction stage.
///
/// Every variant is an `ExtractionFailed` condition from the job's point of
/// view; the variants only exist to keep the error message precise.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Document '{file_name}' is empty")]
    EmptyInput { file_name: String },

    #[error("Failed to process PDF: {0}")]
    PdfProcessing(String),

    #[error("Failed to process DOCX: {0}")]
    DocxProcessing(String),

    #[error("OCR failed: {0}")]
    OcrFailed(String),

    #[error("OCR is not available: {0}")]
    OcrUnavailable(String),

    #[error("Extracted text is too short ({chars} characters, need at least {min})")]
    TextTooShort { chars: usize, min: usize },

    #[error("Text extraction failed: {direct}; OCR fallback failed: {ocr}")]
    BothPathsFailed { direct: String, ocr: String },
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Worker queue is full")]
    QueueFull,
}

pub type Result<T> = std::result::Result<T, CvTailorError>;
