use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::config::helpers::{optional_env, parse_env, parse_string_env, require_positive};
use crate::error::ConfigError;
use crate::settings::Settings;

/// Wire format spoken by the generation endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFlavor {
    /// `choices[0].message.content` style chat-completions API.
    ChatCompletions,
    /// Anthropic Messages API (`content[].text`).
    Anthropic,
}

impl ApiFlavor {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "chat_completions" | "chat-completions" | "openai" => Ok(Self::ChatCompletions),
            "anthropic" | "messages" => Ok(Self::Anthropic),
            other => Err(ConfigError::InvalidValue {
                key: "LLM_API_FLAVOR".to_string(),
                message: format!("unsupported flavor '{other}'"),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChatCompletions => "chat_completions",
            Self::Anthropic => "anthropic",
        }
    }
    /// Endpoint used when neither `LLM_ENDPOINT` nor `llm.endpoint` is set.
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Self::ChatCompletions => "https://api.claude.ai/v1/chat/completions",
            Self::Anthropic => "https://api.anthropic.com/v1/messages",
        }
    }
}

/// Remote generation endpoint settings.
#[derive(Debug)]
pub struct LlmConfig {
    pub flavor: ApiFlavor,
    pub endpoint: Url,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
    /// Only required once a model call is made.
    pub api_key: Option<SecretString>,
}

fn validate_endpoint(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidValue {
        key: "LLM_ENDPOINT".to_string(),
        message: format!("'{}' is not a valid URL: {}", raw.trim(), e),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidValue {
            key: "LLM_ENDPOINT".to_string(),
            message: format!("unsupported scheme '{other}', expected http or https"),
        }),
    }
}

fn resolve_endpoint(flavor: ApiFlavor, configured: Option<String>) -> Result<Url, ConfigError> {
    match configured {
        Some(raw) => validate_endpoint(&raw),
        None => validate_endpoint(flavor.default_endpoint()),
    }
}

/// `LLM_API_KEY`, else the legacy `CLAUDE_API_KEY`. Lookup errors on either
/// key are reported rather than treated as unset.
fn resolve_api_key<F>(lookup: F) -> Result<Option<SecretString>, ConfigError>
where
    F: Fn(&str) -> Result<Option<String>, ConfigError>,
{
    let key = match lookup("LLM_API_KEY")? {
        Some(key) => Some(key),
        None => lookup("CLAUDE_API_KEY")?,
    };
    Ok(key.map(|key| SecretString::from(key.trim().to_string())))
}

fn validate_temperature(value: f32) -> Result<f32, ConfigError> {
    if !(0.0..=2.0).contains(&value) {
        return Err(ConfigError::InvalidValue {
            key: "LLM_TEMPERATURE".to_string(),
            message: format!("{value} is outside [0, 2]"),
        });
    }
    Ok(value)
}

impl LlmConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let s = &settings.llm;
        let flavor = ApiFlavor::from_str(&parse_string_env("LLM_API_FLAVOR", s.flavor.clone())?)?;
        let configured = optional_env("LLM_ENDPOINT")?.or_else(|| s.endpoint.clone());
        let endpoint = resolve_endpoint(flavor, configured)?;
        let model = parse_string_env("LLM_MODEL", s.model.clone())?
            .trim()
            .to_string();
        if model.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "LLM_MODEL".to_string(),
                message: "model identifier must not be empty".to_string(),
            });
        }

        let max_tokens = parse_env("LLM_MAX_TOKENS", s.max_tokens)?;
        require_positive("LLM_MAX_TOKENS", max_tokens as usize)?;
        let timeout_secs = parse_env("LLM_TIMEOUT_SECS", s.timeout_secs)?;
        require_positive("LLM_TIMEOUT_SECS", timeout_secs as usize)?;

        let api_key = resolve_api_key(optional_env)?;

        Ok(Self {
            flavor,
            endpoint,
            model,
            max_tokens,
            temperature: validate_temperature(parse_env("LLM_TEMPERATURE", s.temperature)?)?,
            timeout: Duration::from_secs(timeout_secs),
            api_key,
        })
    }
}
