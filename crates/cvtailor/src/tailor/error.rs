use thiserror::Error;

/// Failure of a single chat completion request.
#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Malformed completion response: {0}")]
    Malformed(String),

    #[error("Model returned an empty completion")]
    EmptyCompletion,
}

#[derive(Error, Debug)]
pub enum TailorError {
    #[error("Resume text is empty")]
    EmptyResume,

    #[error(transparent)]
    Completion(#[from] CompletionError),
}
