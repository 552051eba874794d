//! Ollama chat completion client.
//!
//! Sends the rendered system and user messages to `POST {url}/api/chat`
//! with `stream: false`. A single attempt per call, bounded by the
//! configured timeout; a failed query is retried by the user, not here.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rulebook_rag_core::completion::{Completion, Prompt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::LlmConfig;
use crate::prompts;

#[derive(Clone)]
pub struct OllamaCompletion {
    base_url: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl OllamaCompletion {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            client,
        })
    }

    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            stream: false,
            options: ChatOptions {
                temperature: self.temperature,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to send request to Ollama at {}", self.base_url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama request failed: {} {}", status, body);
        }

        let chat: ChatResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;
        Ok(chat.message.content)
    }
}

#[async_trait]
impl Completion for OllamaCompletion {
    async fn complete(&self, prompt: &Prompt<'_>) -> Result<String> {
        let (system, user) = prompts::render(prompt);
        debug!(template = prompt.template().as_str(), model = %self.model, "calling completion");
        self.chat(&system, &user).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let request = ChatRequest {
            model: "gemma3:4b",
            messages: vec![ChatMessage {
                role: "user",
                content: "hi",
            }],
            stream: false,
            options: ChatOptions { temperature: 0.0 },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["stream"], false);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["options"]["temperature"], 0.0);
    }

    #[test]
    fn test_response_parsing() {
        let chat: ChatResponse = serde_json::from_str(
            r#"{"model":"gemma3:4b","message":{"role":"assistant","content":"Yes."},"done":true}"#,
        )
        .unwrap();
        assert_eq!(chat.message.content, "Yes.");
    }

    #[tokio::test]
    async fn test_unreachable_server_fails() {
        let config = LlmConfig {
            url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 2,
            ..LlmConfig::default()
        };
        let llm = OllamaCompletion::new(&config).unwrap();
        let result = llm
            .complete(&Prompt::Decompose { question: "q" })
            .await;
        assert!(result.is_err());
    }
}
