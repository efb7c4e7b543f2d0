//! Matter-aware counsel recommendations and conflict checks.

pub mod config;
pub mod error;
pub mod legal;
pub mod llm;
pub mod pipeline;
pub mod settings;
