use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{header, Client};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error};

use super::ensure_success;
use super::gcp_auth::AccessTokenProvider;
use crate::error::RevealError;
use crate::reveal::providers::SecretStore;

pub const SECRET_MANAGER_ENDPOINT: &str = "https://secretmanager.googleapis.com/v1";

#[derive(Debug, Deserialize)]
struct AccessSecretVersionResponse {
    #[allow(dead_code)]
    name: Option<String>,
    payload: SecretPayload,
}

#[derive(Debug, Deserialize)]
struct SecretPayload {
    data: String,
}

/// Google Secret Manager over REST.
pub struct SecretManagerService {
    client: Client,
    auth: Arc<AccessTokenProvider>,
    project_id: String,
    endpoint: String,
}

impl SecretManagerService {
    pub fn new(client: Client, auth: Arc<AccessTokenProvider>, project_id: String) -> Self {
        Self {
            client,
            auth,
            project_id,
            endpoint: SECRET_MANAGER_ENDPOINT.to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn latest_version_url(&self, name: &str) -> String {
        format!(
            "{}/projects/{}/secrets/{}/versions/latest:access",
            self.endpoint.trim_end_matches('/'),
            self.project_id,
            urlencoding::encode(name)
        )
    }
}

fn decode_payload(name: &str, data: &str) -> Result<String, RevealError> {
    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| RevealError::Credential(format!("secret {} is not valid base64: {}", name, e)))?;
    String::from_utf8(bytes)
        .map_err(|_| RevealError::Credential(format!("secret {} is not UTF-8", name)))
}

#[async_trait]
impl SecretStore for SecretManagerService {
    async fn access(&self, name: &str) -> Result<String, RevealError> {
        let url = self.latest_version_url(name);
        debug!("Accessing secret version: {}", url);

        let token = self.auth.token().await?;
        let response = self
            .client
            .get(&url)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| RevealError::Credential(format!("secret {}: {}", name, e)))?;

        let response = ensure_success(response).await.map_err(|e| {
            error!("Secret Manager error for {}: {}", name, e);
            RevealError::Credential(format!("secret {}: {}", name, e))
        })?;

        let body = response
            .json::<AccessSecretVersionResponse>()
            .await
            .map_err(|e| RevealError::Credential(format!("secret {}: invalid response: {}", name, e)))?;

        decode_payload(name, &body.payload.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_server::serve;
    use axum::{
        http::{HeaderMap, StatusCode, Uri},
        Json, Router,
    };
    use serde_json::json;

    fn service(base: &str) -> SecretManagerService {
        let auth = Arc::new(AccessTokenProvider::from_static(
            Client::new(),
            "test-token".to_string(),
        ));
        SecretManagerService::new(Client::new(), auth, "personal-website-35".to_string())
            .with_endpoint(base)
    }

    #[test]
    fn builds_latest_version_url() {
        let svc = service("https://secretmanager.googleapis.com/v1/");
        assert_eq!(
            svc.latest_version_url("open-ai-gender-reveal-key"),
            "https://secretmanager.googleapis.com/v1/projects/personal-website-35/secrets/open-ai-gender-reveal-key/versions/latest:access"
        );
    }

    #[test]
    fn decodes_base64_payload() {
        assert_eq!(decode_payload("k", "c2stdGVzdA==").unwrap(), "sk-test");
        assert!(matches!(
            decode_payload("k", "%%%"),
            Err(RevealError::Credential(_))
        ));
        assert!(matches!(
            decode_payload("k", &STANDARD.encode([0xff, 0xfe])),
            Err(RevealError::Credential(_))
        ));
    }

    #[tokio::test]
    async fn accesses_secret_with_bearer_token() {
        let router = Router::new().fallback(|uri: Uri, headers: HeaderMap| async move {
            assert_eq!(headers["authorization"], "Bearer test-token");
            match uri.path() {
                "/projects/personal-website-35/secrets/open-ai-gender-reveal-key/versions/latest:access" => {
                    Ok(Json(json!({
                        "name": "projects/1/secrets/open-ai-gender-reveal-key/versions/3",
                        "payload": { "data": STANDARD.encode("sk-live"), "dataCrc32c": "1" }
                    })))
                }
                _ => Err((StatusCode::NOT_FOUND, "Secret [missing-secret] not found")),
            }
        });
        let base = serve(router).await;
        let svc = service(&base);

        assert_eq!(
            svc.access("open-ai-gender-reveal-key").await.unwrap(),
            "sk-live"
        );

        let err = svc.access("missing-secret").await.unwrap_err();
        assert!(matches!(err, RevealError::Credential(_)));
        assert!(err.to_string().contains("404"), "{}", err);
    }
}
