use async_trait::async_trait;
use reqwest::{header, Client};
use std::sync::Arc;
use tracing::{debug, error, info};

use super::ensure_success;
use super::gcp_auth::AccessTokenProvider;
use crate::error::RevealError;
use crate::reveal::providers::BlobStore;

pub const STORAGE_ENDPOINT: &str = "https://storage.googleapis.com/storage/v1";

/// Google Cloud Storage JSON API, media downloads only.
pub struct CloudStorageService {
    client: Client,
    auth: Arc<AccessTokenProvider>,
    endpoint: String,
}

impl CloudStorageService {
    pub fn new(client: Client, auth: Arc<AccessTokenProvider>) -> Self {
        Self {
            client,
            auth,
            endpoint: STORAGE_ENDPOINT.to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn media_url(&self, bucket: &str, object: &str) -> String {
        // Object names may contain '/', which must be escaped in the path.
        format!(
            "{}/b/{}/o/{}?alt=media",
            self.endpoint.trim_end_matches('/'),
            urlencoding::encode(bucket),
            urlencoding::encode(object)
        )
    }
}

#[async_trait]
impl BlobStore for CloudStorageService {
    async fn fetch(&self, bucket: &str, object: &str) -> Result<Vec<u8>, RevealError> {
        let url = self.media_url(bucket, object);
        debug!("Downloading gs://{}/{}", bucket, object);

        let token = self.auth.token().await?;
        let response = self
            .client
            .get(&url)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .send()
            .await
            .map_err(|e| RevealError::StorageFetch(format!("gs://{}/{}: {}", bucket, object, e)))?;

        let response = ensure_success(response).await.map_err(|e| {
            error!("Cloud Storage error for gs://{}/{}: {}", bucket, object, e);
            RevealError::StorageFetch(format!("gs://{}/{}: {}", bucket, object, e))
        })?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RevealError::StorageFetch(format!("gs://{}/{}: {}", bucket, object, e)))?;

        info!("Downloaded gs://{}/{} ({} bytes)", bucket, object, bytes.len());
        Ok(bytes.to_vec())
    }
}
