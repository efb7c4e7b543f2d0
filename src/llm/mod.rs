//! Remote text generation.
//!
//! [`LlmClient`] is the seam between the advisor pipeline and a model
//! provider. [`HttpLlmClient`] speaks either a chat-completions style API or
//! the Anthropic Messages API over HTTPS.

mod http;

pub use http::HttpLlmClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
}

impl ChatRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
        }
    }
}

/// One message of a chat request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// A model that turns an ordered list of chat messages into text.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Identifier of the model answering requests, for logs and audit.
    fn model_name(&self) -> &str;

    /// Send one request. Implementations must not retry.
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;
}
