//! `warden-config`: Warden runtime configuration management.
//!
//! Provides:
//! - Typed schema for the global, static-analysis, and DAC documents
//! - YAML read/write with atomic replacement
//! - Default value application
//! - Validation reports (never fatal)

pub mod defaults;
pub mod io;
pub mod schema;
pub mod validation;

pub use defaults::{apply_all_defaults, DEFAULT_CACHE_EXPIRY_DAYS, DEFAULT_WORKING_SUBDIR};
pub use io::{config_dir, load_all, load_document, write_all, write_document};
pub use schema::{
    DacConfig, FailurePolicy, GlobalConfig, OperationConfig, ScannerConfig, StaticAnalysisConfig,
    WardenConfig,
};
pub use validation::{validate, ConfigValidationError, ValidationReport};

use anyhow::Result;
use std::path::Path;

/// Load every document from `dir`, apply defaults, and log validation findings.
///
/// This is the main entry point for loading config at runtime.
pub async fn load_and_prepare(dir: &Path) -> Result<WardenConfig> {
    let config = load_all(dir).await?;
    let config = apply_all_defaults(config, dir);
    validate(&config).log();
    Ok(config)
}
