use std::time::Instant;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::config::{ApiFlavor, LlmConfig};
use crate::error::{ConfigError, LlmError};
use crate::llm::{ChatMessage, ChatRole, LlmClient};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const ERROR_BODY_EXCERPT_CHARS: usize = 200;

/// reqwest-backed client with a fixed per-request deadline.
pub struct HttpLlmClient {
    http: reqwest::Client,
    config: LlmConfig,
    api_key: SecretString,
}

impl std::fmt::Debug for HttpLlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpLlmClient")
            .field("flavor", &self.config.flavor)
            .field("endpoint", &self.config.endpoint.as_str())
            .field("model", &self.config.model)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    choices: Vec<ChatCompletionsChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsChoice {
    message: ChatCompletionsMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl HttpLlmClient {
    pub fn new(mut config: LlmConfig) -> Result<Self, ConfigError> {
        let api_key = config
            .api_key
            .take()
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "LLM_API_KEY".to_string(),
                hint: "set LLM_API_KEY (or CLAUDE_API_KEY) to call the model".to_string(),
            })?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                key: "LLM_ENDPOINT".to_string(),
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            http,
            config,
            api_key,
        })
    }

    fn request_body(&self, messages: &[ChatMessage]) -> serde_json::Value {
        match self.config.flavor {
            ApiFlavor::ChatCompletions => chat_completions_body(&self.config, messages),
            ApiFlavor::Anthropic => anthropic_body(&self.config, messages),
        }
    }

    fn map_transport_error(&self, err: reqwest::Error) -> LlmError {
        if err.is_timeout() {
            LlmError::Timeout {
                timeout: self.config.timeout,
            }
        } else {
            LlmError::RequestFailed {
                status: err.status().map(|s| s.as_u16()),
                reason: err.to_string(),
            }
        }
    }
}

fn chat_completions_body(config: &LlmConfig, messages: &[ChatMessage]) -> serde_json::Value {
    serde_json::json!({
        "model": config.model,
        "messages": messages,
        "max_tokens": config.max_tokens,
        "temperature": config.temperature,
    })
}

fn anthropic_body(config: &LlmConfig, messages: &[ChatMessage]) -> serde_json::Value {
    let system = messages
        .iter()
        .filter(|m| m.role == ChatRole::System)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    let turns: Vec<serde_json::Value> = messages
        .iter()
        .filter(|m| m.role != ChatRole::System)
        .map(|m| serde_json::json!({"role": m.role.as_str(), "content": m.content}))
        .collect();

    let mut body = serde_json::json!({
        "model": config.model,
        "messages": turns,
        "max_tokens": config.max_tokens,
        "temperature": config.temperature,
    });
    if !system.is_empty() {
        body["system"] = serde_json::Value::String(system);
    }
    body
}

fn extract_chat_completions_text(raw: &str) -> Result<String, LlmError> {
    let parsed: ChatCompletionsResponse =
        serde_json::from_str(raw).map_err(|e| LlmError::MalformedResponse {
            reason: format!("invalid chat completion body: {e}"),
        })?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|text| text.trim().to_string())
        .ok_or_else(|| LlmError::MalformedResponse {
            reason: "missing choices[0].message.content".to_string(),
        })
}

fn extract_anthropic_text(raw: &str) -> Result<String, LlmError> {
    let parsed: AnthropicResponse =
        serde_json::from_str(raw).map_err(|e| LlmError::MalformedResponse {
            reason: format!("invalid messages body: {e}"),
        })?;
    parsed
        .content
        .into_iter()
        .find(|block| block.kind == "text")
        .and_then(|block| block.text)
        .map(|text| text.trim().to_string())
        .ok_or_else(|| LlmError::MalformedResponse {
            reason: "missing text block in content".to_string(),
        })
}

fn excerpt(body: &str) -> String {
    let mut out: String = body.chars().take(ERROR_BODY_EXCERPT_CHARS).collect();
    if body.chars().count() > ERROR_BODY_EXCERPT_CHARS {
        out.push_str("...");
    }
    out
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let started = Instant::now();
        let body = self.request_body(messages);

        let mut request = self.http.post(self.config.endpoint.clone()).json(&body);
        request = match self.config.flavor {
            ApiFlavor::ChatCompletions => request.bearer_auth(self.api_key.expose_secret()),
            ApiFlavor::Anthropic => request
                .header("x-api-key", self.api_key.expose_secret())
                .header("anthropic-version", ANTHROPIC_VERSION),
        };

        let response = request
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;
        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !status.is_success() {
            tracing::warn!(
                status = status.as_u16(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Model endpoint returned an error status"
            );
            return Err(LlmError::RequestFailed {
                status: Some(status.as_u16()),
                reason: format!("HTTP {}: {}", status, excerpt(&raw)),
            });
        }

        let text = match self.config.flavor {
            ApiFlavor::ChatCompletions => extract_chat_completions_text(&raw)?,
            ApiFlavor::Anthropic => extract_anthropic_text(&raw)?,
        };
        tracing::info!(
            model = %self.config.model,
            flavor = self.config.flavor.as_str(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            chars = text.len(),
            "Model request completed"
        );
        Ok(text)
    }
}
