//! Access to uploaded resume files.

pub mod error;
pub mod filesystem;
pub mod http;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::schema::BlobConfig;
use crate::error::{ConfigError, Result};
use crate::secrets::resolve_secret_optional;

pub use error::BlobError;
pub use filesystem::FilesystemBlobStore;
pub use http::HttpBlobStore;

/// Read-only view of the store that holds uploaded documents.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Returns the full contents of the object at `path`.
    async fn fetch(&self, path: &str) -> std::result::Result<Vec<u8>, BlobError>;
}

/// Builds the blob store selected in the configuration.
pub fn from_config(config: &BlobConfig) -> Result<Arc<dyn BlobStore>> {
    match config {
        BlobConfig::Filesystem { root } => Ok(Arc::new(FilesystemBlobStore::new(root))),
        BlobConfig::Http {
            base_url,
            bucket,
            api_key,
            api_key_file,
            api_key_env,
        } => {
            let key = resolve_secret_optional(
                api_key.as_deref(),
                api_key_file.as_deref(),
                api_key_env.as_deref(),
            )
            .map_err(|source| ConfigError::Secret {
                field: "blob.api_key",
                source,
            })?;
            Ok(Arc::new(HttpBlobStore::new(base_url, bucket, key)?))
        }
    }
}

/// Rejects paths that could escape the store's namespace.
pub(crate) fn validate_path(path: &str) -> std::result::Result<(), BlobError> {
    let invalid = |reason| BlobError::InvalidPath {
        path: path.to_string(),
        reason,
    };

    if path.trim().is_empty() {
        return Err(invalid("path is empty"));
    }
    if path.starts_with('/') || path.starts_with('\\') || std::path::Path::new(path).is_absolute()
    {
        return Err(invalid("absolute paths are not allowed"));
    }
    if path.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(invalid("parent directory segments are not allowed"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_path_accepts_relative() {
        assert!(validate_path("uploads/u1/resume.pdf").is_ok());
        assert!(validate_path("resume..final.pdf").is_ok());
    }

    #[test]
    fn test_validate_path_rejects_escape() {
        assert!(validate_path("../etc/passwd").is_err());
        assert!(validate_path("uploads/../../secret").is_err());
        assert!(validate_path("uploads\\..\\secret").is_err());
        assert!(validate_path("/etc/passwd").is_err());
        assert!(validate_path("  ").is_err());
    }
}
