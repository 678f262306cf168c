use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::ensure_success;
use crate::error::RevealError;
use crate::reveal::prompt::reveal_conversation;
use crate::reveal::providers::Classifier;

pub const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4-turbo-preview";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[allow(dead_code)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[allow(dead_code)]
    total_tokens: Option<u32>,
}

/// OpenAI chat completions endpoint.
pub struct OpenAiChatService {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiChatService {
    pub fn new(client: Client, api_key: String, model: String) -> Self {
        Self {
            client,
            api_key,
            model,
            endpoint: OPENAI_ENDPOINT.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Returns the content of the first choice.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String, RevealError> {
        let url = format!("{}/chat/completions", self.endpoint.trim_end_matches('/'));
        let request_body = ChatCompletionRequest {
            model: &self.model,
            messages,
        };

        debug!(
            "Sending {} messages to {} ({})",
            messages.len(),
            url,
            self.model
        );

        let response = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&request_body)
            .send()
            .await
            .map_err(|e| RevealError::Classification(format!("chat completion request failed: {}", e)))?;

        let response = ensure_success(response).await.map_err(|e| {
            error!("OpenAI API error: {}", e);
            RevealError::Classification(format!("OpenAI API: {}", e))
        })?;

        let completion = response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| RevealError::Classification(format!("invalid chat completion: {}", e)))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| RevealError::Classification("chat completion has no content".to_string()))
    }
}

#[async_trait]
impl Classifier for OpenAiChatService {
    async fn classify(&self, context: &str) -> Result<String, RevealError> {
        let messages = reveal_conversation(context);
        let answer = self.complete(&messages).await?;
        info!("Model {} answered {:?}", self.model, answer);
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_server::serve;
    use axum::{
        http::{HeaderMap, StatusCode},
        routing::post,
        Json, Router,
    };
    use serde_json::{json, Value};

    fn service(base: &str) -> OpenAiChatService {
        OpenAiChatService::new(Client::new(), "sk-test".to_string(), DEFAULT_MODEL.to_string())
            .with_endpoint(base)
    }

    #[test]
    fn serializes_roles_lowercase() {
        let message = ChatMessage::new(Role::Assistant, "Sure.");
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({ "role": "assistant", "content": "Sure." })
        );
    }

    #[tokio::test]
    async fn classify_sends_conversation_and_returns_first_choice() {
        let router = Router::new().route(
            "/chat/completions",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(headers["authorization"], "Bearer sk-test");
                assert_eq!(body["model"], DEFAULT_MODEL);
                let messages = body["messages"].as_array().unwrap();
                let roles: Vec<&str> = messages
                    .iter()
                    .map(|m| m["role"].as_str().unwrap())
                    .collect();
                assert_eq!(roles, ["system", "user", "assistant", "user"]);
                assert!(messages[3]["content"]
                    .as_str()
                    .unwrap()
                    .contains("Fetal sex: XX"));
                Json(json!({
                    "id": "chatcmpl-1",
                    "object": "chat.completion",
                    "choices": [
                        { "index": 0, "message": { "role": "assistant", "content": "female" }, "finish_reason": "stop" }
                    ],
                    "usage": { "prompt_tokens": 200, "completion_tokens": 1, "total_tokens": 201 }
                }))
            }),
        );
        let base = serve(router).await;

        let answer = service(&base).classify("Fetal sex: XX").await.unwrap();
        assert_eq!(answer, "female");
    }

    #[tokio::test]
    async fn empty_choices_is_classification_error() {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async { Json(json!({ "choices": [] })) }),
        );
        let base = serve(router).await;

        let err = service(&base).classify("anything").await.unwrap_err();
        assert!(matches!(err, RevealError::Classification(_)));
    }

    #[tokio::test]
    async fn api_error_is_classification_error() {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "error": { "message": "Incorrect API key provided", "type": "invalid_request_error" } })),
                )
            }),
        );
        let base = serve(router).await;

        let err = service(&base).classify("anything").await.unwrap_err();
        assert!(matches!(err, RevealError::Classification(_)));
        assert!(err.to_string().contains("401"), "{}", err);
    }
}
