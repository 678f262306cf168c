pub mod cloud_storage;
pub mod content_guard;
pub mod document_ai;
pub mod gcp_auth;
pub mod openai_chat;
pub mod pdf;
pub mod secret_manager;

use reqwest::{Client, Response};
use std::time::Duration;

use content_guard::body_excerpt;

const ERROR_BODY_EXCERPT: usize = 300;

/// One client for every outbound call; reqwest pools connections per client.
pub fn build_http_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Passes 2xx responses through; otherwise describes the status and the start of the body.
pub async fn ensure_success(response: Response) -> Result<Response, String> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(format!(
        "HTTP Status: {} - {}",
        status,
        body_excerpt(&body, ERROR_BODY_EXCERPT)
    ))
}
