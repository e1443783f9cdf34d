use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlobError {
    #[error("Blob '{path}' not found")]
    NotFound { path: String },

    #[error("Blob '{path}' is empty")]
    Empty { path: String },

    #[error("Invalid blob path '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("Blob store returned HTTP {status} for '{path}'")]
    Status { path: String, status: u16 },

    #[error("Failed to read blob '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid blob store URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Blob request failed: {0}")]
    Http(#[from] reqwest::Error),
}
