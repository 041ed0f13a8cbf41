//! Shared types, error model, and configuration for Docent.
//!
//! This crate is the foundation depended on by all other Docent crates.
//! It provides:
//! - [`DocentError`], the unified error type
//! - Domain types ([`DocumentHandle`], [`StageKind`], [`AnalysisRecord`], [`QaExchange`])
//! - Configuration ([`AppConfig`], [`PipelineOptions`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, LlmConfig, PipelineConfig, PipelineOptions, config_dir,
    config_file_path, init_config, load_config, load_config_from, validate_api_key,
};
pub use error::{DocentError, Result};
pub use types::{AnalysisRecord, DocumentHandle, DocumentKind, QaExchange, StageKind};
