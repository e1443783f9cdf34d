use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};

use super::{validate_path, BlobError, BlobStore};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Fetches blobs from an object storage HTTP endpoint laid out as
/// `{base_url}/{bucket}/{path}`.
pub struct HttpBlobStore {
    client: Client,
    base_url: Url,
    bucket: String,
    api_key: Option<SecretString>,
}

impl HttpBlobStore {
    pub fn new(
        base_url: &str,
        bucket: &str,
        api_key: Option<SecretString>,
    ) -> Result<Self, BlobError> {
        let invalid = |reason: String| BlobError::InvalidUrl {
            url: base_url.to_string(),
            reason,
        };

        let parsed = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        if parsed.cannot_be_a_base() {
            return Err(invalid("URL cannot be used as a base".to_string()));
        }

        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: parsed,
            bucket: bucket.to_string(),
            api_key,
        })
    }

    fn object_url(&self, path: &str) -> Result<Url, BlobError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| BlobError::InvalidUrl {
                url: self.base_url.to_string(),
                reason: "URL cannot be used as a base".to_string(),
            })?
            .pop_if_empty()
            .push(&self.bucket)
            .extend(path.split('/').filter(|s| !s.is_empty()));
        Ok(url)
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, BlobError> {
        validate_path(path)?;
        let url = self.object_url(path)?;

        let mut request = self.client.get(url);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(BlobError::NotFound {
                path: path.to_string(),
            });
        }
        if !status.is_success() {
            return Err(BlobError::Status {
                path: path.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(BlobError::Empty {
                path: path.to_string(),
            });
        }

        tracing::debug!(bytes = bytes.len(), "Fetched blob over HTTP");
        Ok(bytes.to_vec())
    }
}
