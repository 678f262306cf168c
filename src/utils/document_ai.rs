use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info};

use super::ensure_success;
use super::gcp_auth::AccessTokenProvider;
use crate::document::Document;
use crate::error::RevealError;
use crate::reveal::providers::DocumentParser;

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub project_id: String,
    pub location: String,
    pub processor_id: String,
}

impl ProcessorConfig {
    /// Full resource name, `projects/{p}/locations/{l}/processors/{id}`.
    pub fn processor_path(&self) -> String {
        format!(
            "projects/{}/locations/{}/processors/{}",
            self.project_id, self.location, self.processor_id
        )
    }

    /// Regional endpoint; Document AI processors are only served from their own location.
    pub fn regional_endpoint(&self) -> String {
        format!("https://{}-documentai.googleapis.com/v1", self.location)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessRequest<'a> {
    raw_document: RawDocument<'a>,
    skip_human_review: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument<'a> {
    content: String,
    mime_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct ProcessResponse {
    document: Option<Document>,
}

/// Document AI `processors.process` over REST.
pub struct DocumentAiService {
    client: Client,
    auth: Arc<AccessTokenProvider>,
    processor: ProcessorConfig,
    endpoint: String,
}

impl DocumentAiService {
    pub fn new(client: Client, auth: Arc<AccessTokenProvider>, processor: ProcessorConfig) -> Self {
        let endpoint = processor.regional_endpoint();
        Self {
            client,
            auth,
            processor,
            endpoint,
        }
    }

    #[cfg(test)]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn process_url(&self) -> String {
        format!(
            "{}/{}:process",
            self.endpoint.trim_end_matches('/'),
            self.processor.processor_path()
        )
    }
}

#[async_trait]
impl DocumentParser for DocumentAiService {
    async fn process(&self, content: &[u8], mime_type: &str) -> Result<Document, RevealError> {
        let url = self.process_url();
        let request_body = ProcessRequest {
            raw_document: RawDocument {
                content: STANDARD.encode(content),
                mime_type,
            },
            skip_human_review: true,
        };

        debug!(
            "Sending {} bytes ({}) to Document AI: {}",
            content.len(),
            mime_type,
            url
        );

        let token = self.auth.token().await?;
        let response = self
            .client
            .post(&url)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| RevealError::Parse(format!("Document AI request failed: {}", e)))?;

        let response = ensure_success(response).await.map_err(|e| {
            error!("Document AI error: {}", e);
            RevealError::Parse(format!("Document AI: {}", e))
        })?;

        let body = response
            .json::<ProcessResponse>()
            .await
            .map_err(|e| RevealError::Parse(format!("invalid Document AI response: {}", e)))?;

        let document = body
            .document
            .ok_or_else(|| RevealError::Parse("Document AI response has no document".to_string()))?;

        info!(
            "Document AI returned {} pages, {} characters",
            document.pages.len(),
            document.text.chars().count()
        );
        Ok(document)
    }
}
