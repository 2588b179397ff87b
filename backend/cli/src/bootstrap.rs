//! Shared startup for every subcommand: configuration, logging, and the
//! plugin index behind the `WardenContext`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use warden_config::{config_dir, load_and_prepare, FailurePolicy, WardenConfig, DEFAULT_WORKING_SUBDIR};
use warden_core::{WardenContext, TOOL_VERSION};
use warden_plugins::PluginIndex;

pub struct Bootstrap {
    pub config_dir: PathBuf,
    pub config: WardenConfig,
}

impl Bootstrap {
    /// Load configuration from `dir` (or the default location) and start
    /// logging.
    pub async fn load(dir: Option<PathBuf>) -> Result<Self> {
        let config_dir = dir.unwrap_or_else(config_dir);
        let config = load_and_prepare(&config_dir)
            .await
            .with_context(|| format!("load configuration from {}", config_dir.display()))?;

        let bootstrap = Self { config_dir, config };
        warden_logging::init_logger(bootstrap.log_dir(), bootstrap.log_level());
        info!(
            version = TOOL_VERSION,
            config_dir = %bootstrap.config_dir.display(),
            working_dir = %bootstrap.working_dir().display(),
            "[Warden] Configuration loaded"
        );
        Ok(bootstrap)
    }

    pub fn working_dir(&self) -> PathBuf {
        self.config
            .global
            .working_dir
            .clone()
            .unwrap_or_else(|| self.config_dir.join(DEFAULT_WORKING_SUBDIR))
    }

    pub fn log_dir(&self) -> PathBuf {
        self.config
            .global
            .log_dir
            .clone()
            .unwrap_or_else(|| self.working_dir().join("logs"))
    }

    pub fn log_level(&self) -> &str {
        self.config.global.log_level.as_deref().unwrap_or("info")
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.config.global.failure_policy.unwrap_or_default()
    }

    pub fn self_defense(&self) -> bool {
        self.config.global.self_defense.unwrap_or(true)
    }

    pub fn plugins_dir(&self, flag: Option<&Path>) -> PathBuf {
        match (flag, &self.config.global.plugins_dir) {
            (Some(dir), _) => dir.to_path_buf(),
            (None, Some(dir)) => dir.clone(),
            (None, None) => self.config_dir.join("plugins"),
        }
    }

    /// Index the plugins directory and bind it into a context.
    pub fn context(&self, plugins_dir: &Path) -> Result<(Arc<PluginIndex>, WardenContext)> {
        let index = Arc::new(
            PluginIndex::discover(plugins_dir)
                .with_context(|| format!("index plugins in {}", plugins_dir.display()))?,
        );
        let mut ctx = WardenContext::new(index.clone(), absolute(&self.working_dir())?);
        if let Some(host) = &self.config.global.host_plugin_name {
            ctx = ctx.with_host_plugin(host.as_str());
        }
        Ok((index, ctx))
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir().context("read current directory")?.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check_cmd::{decide, Decision};
    use std::collections::BTreeSet;
    use tempfile::TempDir;
    use warden_core::{Frame, IndexedPlugin, StaticLookup};
    use warden_dac::{Argument, Operation};

    #[tokio::test]
    async fn test_first_run_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let boot = Bootstrap::load(Some(dir.path().to_path_buf())).await.unwrap();
        assert_eq!(boot.working_dir(), dir.path().join("data"));
        assert_eq!(boot.plugins_dir(None), dir.path().join("plugins"));
        assert_eq!(boot.plugins_dir(Some(Path::new("/srv/p"))), PathBuf::from("/srv/p"));
        assert!(boot.self_defense());
        assert_eq!(boot.failure_policy(), FailurePolicy::Continue);

        let (index, ctx) = boot.context(&boot.plugins_dir(None)).unwrap();
        assert!(index.is_empty());
        assert_eq!(ctx.quarantine_dir(), dir.path().join("data").join("quarantine"));
    }

    #[tokio::test]
    async fn test_default_layout_lets_plugins_write_their_own_folder() {
        let dir = TempDir::new().unwrap();
        let boot = Bootstrap::load(Some(dir.path().to_path_buf())).await.unwrap();
        let plugins = boot.plugins_dir(None);
        let lookup = Arc::new(StaticLookup::new(vec![IndexedPlugin {
            jar_file: plugins.join("good.jar"),
            class_names: BTreeSet::from(["good.Main".to_string()]),
            display_name: "Good".into(),
            content_hash: "00".into(),
        }]));
        let ctx = || WardenContext::new(lookup.clone(), boot.working_dir());
        let frames = [Frame::new("good.Main", "onEnable")];

        let own = Argument::Path(plugins.join("Good").join("config.yml"));
        assert_eq!(decide(&boot, ctx(), Operation::FileWrite, &own, &frames), Decision::Allowed);

        let cache = Argument::Path(boot.working_dir().join("cache").join("x.json"));
        assert!(matches!(
            decide(&boot, ctx(), Operation::FileWrite, &cache, &frames),
            Decision::Denied(_)
        ));
    }
}
