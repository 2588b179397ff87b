//! The startup pass: scan every indexed plugin, then decide whether the host
//! may start. Every plugin is scanned before the decision so a single run
//! surfaces every problem.

use std::path::{Path, PathBuf};

use tracing::{error, info};
use warden_core::IndexedPlugin;

use crate::archive::PluginArchive;
use crate::countermeasure::{enforce, Enforcement};
use crate::engine::{ScannerOutcome, StaticAnalysis};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct PluginReport {
    pub plugin: String,
    pub jar_file: PathBuf,
    pub outcomes: Vec<ScannerOutcome>,
    pub enforcement: Enforcement,
}

#[derive(Debug, Clone, Default)]
pub struct StartupReport {
    pub plugins: Vec<PluginReport>,
    /// Archives skipped because they are listed as exclusions.
    pub excluded: Vec<PathBuf>,
    /// Archives that could not be opened, with the reason. Each one blocks
    /// startup since nothing in it could be scanned.
    pub unreadable: Vec<(PathBuf, String)>,
}

impl StartupReport {
    /// True when any plugin's countermeasure blocks host startup, or some
    /// archive could not be scanned at all.
    pub fn should_abort(&self) -> bool {
        !self.unreadable.is_empty() || self.plugins.iter().any(|p| p.enforcement.blocks_startup())
    }

    pub fn blocking_plugins(&self) -> impl Iterator<Item = &PluginReport> {
        self.plugins.iter().filter(|p| p.enforcement.blocks_startup())
    }
}

pub struct StartupScan<'a> {
    engine: &'a StaticAnalysis,
    quarantine_dir: PathBuf,
    /// Archives that already failed to open before the pass started.
    known_unreadable: Vec<(PathBuf, String)>,
}

impl<'a> StartupScan<'a> {
    pub fn new(engine: &'a StaticAnalysis, quarantine_dir: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            quarantine_dir: quarantine_dir.into(),
            known_unreadable: Vec::new(),
        }
    }

    /// Carry archives that discovery could not open into the report.
    pub fn with_unreadable(mut self, unreadable: impl IntoIterator<Item = (PathBuf, String)>) -> Self {
        self.known_unreadable.extend(unreadable);
        self
    }

    fn is_excluded(&self, path: &Path) -> bool {
        self.engine
            .settings()
            .exclusions
            .iter()
            .any(|excluded| excluded.as_path() == path)
    }

    /// Scan each plugin in order.
    ///
    /// A scanner failure under the `shutdown` policy ends the pass with an
    /// error; everything else, including archives that cannot be opened and
    /// countermeasures that cannot be carried out, is collected into the
    /// report.
    pub fn run<'p>(&self, plugins: impl IntoIterator<Item = &'p IndexedPlugin>) -> Result<StartupReport> {
        let mut report = StartupReport::default();
        if !self.engine.is_enabled() {
            info!("[StartupScan] Static analysis disabled");
            return Ok(report);
        }

        for (path, reason) in &self.known_unreadable {
            if self.is_excluded(path) {
                report.excluded.push(path.clone());
                continue;
            }
            error!(path = %path.display(), error = %reason, "[StartupScan] Cannot open plugin");
            report.unreadable.push((path.clone(), reason.clone()));
        }

        for plugin in plugins {
            if self.is_excluded(&plugin.jar_file) {
                info!(plugin = %plugin.display_name, path = %plugin.jar_file.display(), "[StartupScan] Excluded");
                report.excluded.push(plugin.jar_file.clone());
                continue;
            }

            let archive = match PluginArchive::open(&plugin.jar_file) {
                Ok(archive) => archive,
                Err(e) => {
                    error!(path = %plugin.jar_file.display(), error = %e, "[StartupScan] Cannot open plugin");
                    report.unreadable.push((plugin.jar_file.clone(), e.to_string()));
                    continue;
                }
            };

            let outcomes = self.engine.analyze(&archive)?;
            let enforcement = enforce(&archive, &outcomes, &self.quarantine_dir);
            report.plugins.push(PluginReport {
                plugin: archive.display_name(),
                jar_file: plugin.jar_file.clone(),
                outcomes,
                enforcement,
            });
        }

        let blocking = report.blocking_plugins().count();
        info!(
            scanned = report.plugins.len(),
            excluded = report.excluded.len(),
            unreadable = report.unreadable.len(),
            blocking,
            "[StartupScan] Complete"
        );
        Ok(report)
    }
}
