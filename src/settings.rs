//! File-backed settings.
//!
//! `Settings` carries the defaults for every tunable. A TOML file can
//! override any subset of them; environment variables are applied on top
//! when the settings are resolved into a [`crate::config::Config`].

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub dataset: DatasetSettings,
    pub retrieval: RetrievalSettings,
    pub llm: LlmSettings,
    pub audit: AuditSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetSettings {
    pub path: String,
    pub delimiter: String,
}

impl Default for DatasetSettings {
    fn default() -> Self {
        Self {
            path: "data/matters.csv".to_string(),
            delimiter: ",".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub query_tail_tokens: usize,
    pub max_context_rows: usize,
    pub max_field_chars: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 10,
            query_tail_tokens: 3,
            max_context_rows: 10,
            max_field_chars: 400,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub flavor: String,
    /// Defaults to the flavor's public endpoint when unset.
    pub endpoint: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            flavor: "chat_completions".to_string(),
            endpoint: None,
            model: "claude-v1".to_string(),
            max_tokens: 150,
            temperature: 0.9,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSettings {
    pub enabled: bool,
    pub path: String,
    pub hash_chain: bool,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            path: "logs/matterscope_audit.jsonl".to_string(),
            hash_chain: true,
        }
    }
}

impl Settings {
    /// Parse settings from TOML text. Missing sections keep their defaults.
    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Load settings from a TOML file on disk.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Settings {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&raw).map_err(|e| ConfigError::Settings {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}
