use std::path::{Component, Path, PathBuf};

use crate::config::helpers::{
    optional_env, parse_bool_env, parse_env, parse_string_env, require_positive,
};
use crate::error::ConfigError;
use crate::settings::Settings;

/// Where the matters dataset lives and how it is delimited.
#[derive(Debug, Clone)]
pub struct DatasetConfig {
    pub path: PathBuf,
    pub delimiter: u8,
}

/// Retrieval and prompt-size controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Number of trailing query tokens that are vectorized.
    pub query_tail_tokens: usize,
    pub max_context_rows: usize,
    pub max_field_chars: usize,
}

/// Request audit controls.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub enabled: bool,
    pub path: PathBuf,
    pub hash_chain: bool,
}

fn parse_delimiter(raw: &str) -> Result<u8, ConfigError> {
    let value = match raw {
        "\\t" | "tab" => "\t",
        other => other,
    };
    let bytes = value.as_bytes();
    if bytes.len() != 1 || !bytes[0].is_ascii() {
        return Err(ConfigError::InvalidValue {
            key: "MATTERS_DATASET_DELIMITER".to_string(),
            message: format!("delimiter must be a single ASCII character, got '{raw}'"),
        });
    }
    Ok(bytes[0])
}

fn audit_path_error(message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: "AUDIT_PATH".to_string(),
        message: message.to_string(),
    }
}

/// Normalize the audit log location. It must be a relative file path inside
/// `logs/`, with no parent-directory hops.
fn validate_audit_path(raw: &str) -> Result<PathBuf, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(audit_path_error("audit log path must not be empty"));
    }

    let mut normalized = PathBuf::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(segment) => normalized.push(segment),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(audit_path_error(
                    "audit log path must not contain '..' components",
                ));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(audit_path_error(
                    "audit log path must be relative to the working directory",
                ));
            }
        }
    }

    let mut parts = normalized.components();
    let in_logs = parts.next().is_some_and(|first| first.as_os_str() == "logs");
    if !in_logs || parts.next().is_none() {
        return Err(audit_path_error(
            "audit log path must name a file under 'logs/'",
        ));
    }

    Ok(normalized)
}

impl DatasetConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let path = parse_string_env("MATTERS_DATASET_PATH", settings.dataset.path.clone())?;
        if path.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "MATTERS_DATASET_PATH".to_string(),
                message: "dataset path must not be empty".to_string(),
            });
        }
        let delimiter = match optional_env("MATTERS_DATASET_DELIMITER")? {
            // Blank values are dropped by optional_env, so a raw tab needs the escape form.
            Some(raw) => parse_delimiter(raw.trim())?,
            None => parse_delimiter(&settings.dataset.delimiter)?,
        };
        Ok(Self {
            path: PathBuf::from(path.trim()),
            delimiter,
        })
    }
}

impl RetrievalConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let s = &settings.retrieval;
        Ok(Self {
            top_k: require_positive(
                "RETRIEVAL_TOP_K",
                parse_env("RETRIEVAL_TOP_K", s.top_k)?,
            )?,
            query_tail_tokens: require_positive(
                "RETRIEVAL_QUERY_TAIL_TOKENS",
                parse_env("RETRIEVAL_QUERY_TAIL_TOKENS", s.query_tail_tokens)?,
            )?,
            max_context_rows: require_positive(
                "RETRIEVAL_MAX_CONTEXT_ROWS",
                parse_env("RETRIEVAL_MAX_CONTEXT_ROWS", s.max_context_rows)?,
            )?,
            max_field_chars: require_positive(
                "RETRIEVAL_MAX_FIELD_CHARS",
                parse_env("RETRIEVAL_MAX_FIELD_CHARS", s.max_field_chars)?,
            )?,
        })
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        let s = crate::settings::RetrievalSettings::default();
        Self {
            top_k: s.top_k,
            query_tail_tokens: s.query_tail_tokens,
            max_context_rows: s.max_context_rows,
            max_field_chars: s.max_field_chars,
        }
    }
}

impl AuditConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            enabled: parse_bool_env("AUDIT_ENABLED", settings.audit.enabled)?,
            path: {
                let raw = parse_string_env("AUDIT_PATH", settings.audit.path.clone())?;
                validate_audit_path(&raw)?
            },
            hash_chain: parse_bool_env("AUDIT_HASH_CHAIN", settings.audit.hash_chain)?,
        })
    }
}
