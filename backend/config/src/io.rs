//! Config document read/write.

use crate::schema::{DacConfig, GlobalConfig, StaticAnalysisConfig, WardenConfig};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

pub const GLOBAL_FILE_NAME: &str = "config.yml";
pub const STATIC_ANALYSIS_FILE_NAME: &str = "static-analysis.yml";
pub const DAC_FILE_NAME: &str = "dac.yml";

/// Resolve the Warden config directory.
/// Priority: `WARDEN_CONFIG_DIR` env > `~/.warden/`
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("WARDEN_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    match dirs::home_dir() {
        Some(home) => home.join(".warden"),
        None => PathBuf::from(".warden"),
    }
}

/// Load and parse one YAML document.
///
/// Returns `Ok(Default::default())` if the file doesn't exist (first run).
/// An empty file is also treated as defaults.
pub async fn load_document<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if !fs::try_exists(path).await.unwrap_or(false) {
        debug!(path = %path.display(), "Config file does not exist; using defaults");
        return Ok(T::default());
    }

    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(T::default());
    }

    let doc: T = serde_yaml::from_str(&raw)
        .with_context(|| format!("Failed to parse config YAML at: {}", path.display()))?;

    info!(path = %path.display(), "Loaded config");
    Ok(doc)
}

/// Write a document atomically (write to temp file, rename).
pub async fn write_document<T: Serialize>(doc: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.with_context(|| {
            format!("Failed to create config directory: {}", parent.display())
        })?;
    }

    let yaml = serde_yaml::to_string(doc).context("Failed to serialize config to YAML")?;

    let tmp_path = path.with_extension("yml.tmp");
    fs::write(&tmp_path, yaml.as_bytes())
        .await
        .with_context(|| format!("Failed to write temp config: {}", tmp_path.display()))?;

    fs::rename(&tmp_path, path).await.with_context(|| {
        format!("Failed to rename temp config to: {}", path.display())
    })?;

    info!(path = %path.display(), "Wrote config");
    Ok(())
}

/// Load all three documents from `dir` without applying defaults.
pub async fn load_all(dir: &Path) -> Result<WardenConfig> {
    let global: GlobalConfig = load_document(&dir.join(GLOBAL_FILE_NAME)).await?;
    let static_analysis: StaticAnalysisConfig =
        load_document(&dir.join(STATIC_ANALYSIS_FILE_NAME)).await?;
    let dac: DacConfig = load_document(&dir.join(DAC_FILE_NAME)).await?;
    Ok(WardenConfig {
        global,
        static_analysis,
        dac,
    })
}

/// Write all three documents into `dir`.
pub async fn write_all(config: &WardenConfig, dir: &Path) -> Result<()> {
    write_document(&config.global, &dir.join(GLOBAL_FILE_NAME)).await?;
    write_document(&config.static_analysis, &dir.join(STATIC_ANALYSIS_FILE_NAME)).await?;
    write_document(&config.dac, &dir.join(DAC_FILE_NAME)).await?;
    Ok(())
}
