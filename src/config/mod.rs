//! Typed configuration resolved from [`Settings`] plus environment overrides.

mod helpers;
mod legal;
mod llm;

pub use legal::{AuditConfig, DatasetConfig, RetrievalConfig};
pub use llm::{ApiFlavor, LlmConfig};

use crate::error::ConfigError;
use crate::settings::Settings;

/// Everything the harness needs to construct an advisor.
#[derive(Debug)]
pub struct Config {
    pub dataset: DatasetConfig,
    pub retrieval: RetrievalConfig,
    pub llm: LlmConfig,
    pub audit: AuditConfig,
}

impl Config {
    /// Apply environment overrides on top of `settings` and validate.
    pub fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            dataset: DatasetConfig::resolve(settings)?,
            retrieval: RetrievalConfig::resolve(settings)?,
            llm: LlmConfig::resolve(settings)?,
            audit: AuditConfig::resolve(settings)?,
        })
    }
}
