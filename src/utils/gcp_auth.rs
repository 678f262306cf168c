use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::ensure_success;
use crate::error::RevealError;

pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

// Refresh a little before Google says the token expires.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct MetadataTokenResponse {
    access_token: String,
    expires_in: u64,
    #[allow(dead_code)]
    token_type: Option<String>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self, now: Instant) -> bool {
        now + EXPIRY_MARGIN < self.expires_at
    }
}

enum TokenSource {
    Static(String),
    Metadata { url: String },
}

/// OAuth access tokens for Google APIs.
///
/// Either a fixed token handed in at startup, or tokens minted by the
/// metadata server of the instance the service runs on (Cloud Run, GCE).
pub struct AccessTokenProvider {
    client: Client,
    source: TokenSource,
    cache: Mutex<Option<CachedToken>>,
}

impl AccessTokenProvider {
    pub fn from_static(client: Client, token: String) -> Self {
        Self {
            client,
            source: TokenSource::Static(token),
            cache: Mutex::new(None),
        }
    }

    pub fn metadata(client: Client) -> Self {
        Self::metadata_at(client, METADATA_TOKEN_URL.to_string())
    }

    pub fn metadata_at(client: Client, url: String) -> Self {
        Self {
            client,
            source: TokenSource::Metadata { url },
            cache: Mutex::new(None),
        }
    }

    pub async fn token(&self) -> Result<String, RevealError> {
        let url = match &self.source {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::Metadata { url } => url,
        };

        // Held across the fetch so concurrent requests share one refresh.
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if cached.is_fresh(Instant::now()) {
                return Ok(cached.value.clone());
            }
        }

        debug!("Requesting access token from metadata server: {}", url);

        let response = self
            .client
            .get(url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| RevealError::Credential(format!("metadata server unreachable: {}", e)))?;
        let response = ensure_success(response)
            .await
            .map_err(|e| RevealError::Credential(format!("metadata server: {}", e)))?;
        let token = response
            .json::<MetadataTokenResponse>()
            .await
            .map_err(|e| RevealError::Credential(format!("invalid metadata token response: {}", e)))?;

        info!("Obtained access token valid for {}s", token.expires_in);

        let fresh = CachedToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        };
        let value = fresh.value.clone();
        *cache = Some(fresh);
        Ok(value)
    }
}
