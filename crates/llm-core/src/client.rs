//! Chat-completion client for OpenAI-compatible endpoints

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ModelConfig;

/// Conversation role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One message of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A model that turns a conversation into the next assistant message.
///
/// `Ok` carries the raw response text, which may be empty or malformed;
/// `Err` means no response could be obtained at all.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Identifier shown in logs
    fn model_name(&self) -> &str;

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for `POST {endpoint}/chat/completions`
#[derive(Debug, Clone)]
pub struct ChatClient {
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    json_mode: bool,
    client: reqwest::Client,
}

impl ChatClient {
    /// Create a client from the model section of the configuration
    pub fn new(config: &ModelConfig, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        if api_key.is_none() {
            warn!(env = %config.api_key_env, "No API key configured; requests are sent without authorization");
        }

        Ok(Self {
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            json_mode: config.json_mode,
            client,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl ChatModel for ChatClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let req = CompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            response_format: self.json_mode.then_some(ResponseFormat {
                format_type: "json_object",
            }),
        };

        let mut builder = self.client.post(self.completions_url()).json(&req);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        debug!(model = %self.model, messages = messages.len(), "Sending completion request");
        let resp = builder
            .send()
            .await
            .context("Failed to reach model endpoint")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Model endpoint returned {}: {}", status, body);
        }

        let parsed: CompletionResponse = resp
            .json()
            .await
            .context("Failed to parse completion response")?;

        extract_content(parsed)
    }
}

fn extract_content(resp: CompletionResponse) -> Result<String> {
    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Completion response contained no choices"))?;

    choice
        .message
        .content
        .ok_or_else(|| anyhow::anyhow!("Completion response had no message content"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let messages = vec![ChatMessage::system("sys"), ChatMessage::user("hi")];
        let req = CompletionRequest {
            model: "m",
            messages: &messages,
            temperature: 0.2,
            response_format: Some(ResponseFormat {
                format_type: "json_object",
            }),
        };

        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "hi");
        assert_eq!(value["response_format"]["type"], "json_object");
    }

    #[test]
    fn test_request_without_json_mode() {
        let req = CompletionRequest {
            model: "m",
            messages: &[],
            temperature: 0.0,
            response_format: None,
        };
        let value = serde_json::to_value(&req).unwrap();
        assert!(value.get("response_format").is_none());
    }

    #[test]
    fn test_extract_content() {
        let resp: CompletionResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"{\"thought\":\"x\"}"}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_content(resp).unwrap(), r#"{"thought":"x"}"#);
    }

    #[test]
    fn test_extract_content_empty_string_is_a_response() {
        let resp: CompletionResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":""}}]}"#).unwrap();
        assert_eq!(extract_content(resp).unwrap(), "");
    }

    #[test]
    fn test_extract_content_missing() {
        let resp: CompletionResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(extract_content(resp).is_err());

        let resp: CompletionResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":null}}]}"#).unwrap();
        assert!(extract_content(resp).is_err());
    }

    #[test]
    fn test_client_url() {
        let config = ModelConfig {
            endpoint: "https://example.test/v1/".to_string(),
            ..Default::default()
        };
        let client = ChatClient::new(&config, Some("k".to_string())).unwrap();
        assert_eq!(client.completions_url(), "https://example.test/v1/chat/completions");
        assert_eq!(client.model_name(), "gpt-4o-mini");
    }
}
