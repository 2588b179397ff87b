//! The static analysis driver.
//!
//! For each registered scanner: reuse a valid cached result for the plugin's
//! content hash, or run the scanner and persist the cache before moving on to
//! the next scanner. Classes are parsed at most once per call, and only if
//! some scanner actually has to run.

use std::panic::{catch_unwind, AssertUnwindSafe};

use chrono::Utc;
use tracing::{error, info, warn};
use warden_config::{FailurePolicy, StaticAnalysisConfig};
use warden_logging::{SecurityEvent, SecurityEventLogger};

use crate::archive::PluginArchive;
use crate::cache::{CacheMiss, CacheStore};
use crate::error::{AnalysisError, Result};
use crate::scanner::{run_scanner, ScanContext, Scanner};
use crate::scanners::{builtin_scanners, is_builtin};
use crate::verdict::{Countermeasure, ScanResult, Verdict};

/// One scanner's result for one plugin, with the countermeasure in force.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerOutcome {
    pub scanner: String,
    pub result: ScanResult,
    pub from_cache: bool,
    /// Operator override if configured, else the scanner's recommendation.
    pub countermeasure: Option<Countermeasure>,
}

pub struct StaticAnalysis {
    scanners: Vec<Box<dyn Scanner>>,
    cache: CacheStore,
    settings: StaticAnalysisConfig,
    failure_policy: FailurePolicy,
}

impl StaticAnalysis {
    /// Engine with every built-in scanner.
    pub fn new(cache: CacheStore, settings: StaticAnalysisConfig, failure_policy: FailurePolicy) -> Self {
        for name in settings.scanners.keys() {
            if !is_builtin(name) {
                warn!(scanner = %name, "[StaticAnalysis] Settings name an unknown scanner; ignored");
            }
        }
        Self::with_scanners(builtin_scanners(), cache, settings, failure_policy)
    }

    pub fn with_scanners(
        scanners: Vec<Box<dyn Scanner>>,
        cache: CacheStore,
        settings: StaticAnalysisConfig,
        failure_policy: FailurePolicy,
    ) -> Self {
        Self {
            scanners,
            cache,
            settings,
            failure_policy,
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn settings(&self) -> &StaticAnalysisConfig {
        &self.settings
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled.unwrap_or(true)
    }

    fn override_for(&self, scanner: &str) -> Option<Countermeasure> {
        let raw = self.settings.countermeasure_for(scanner)?;
        match raw.parse() {
            Ok(cm) => Some(cm),
            Err(e) => {
                warn!(scanner = %scanner, error = %e, "[StaticAnalysis] Ignoring countermeasure override");
                None
            }
        }
    }

    /// Run every enabled scanner over one plugin.
    ///
    /// Scanner failures are isolated: under `continue` they are logged and the
    /// scanner contributes no outcome; under `shutdown` the first failure is
    /// returned as `AnalysisError::ScannerFailed`. That is the only error;
    /// a cache that cannot be written only costs the next run a rescan.
    pub fn analyze(&self, archive: &PluginArchive) -> Result<Vec<ScannerOutcome>> {
        let plugin = archive.display_name();
        let hash = archive.content_hash.as_str();
        let (mut cache, miss) = self.cache.load(hash, Utc::now());
        if let Some(miss) = &miss {
            if *miss != CacheMiss::Absent {
                info!(plugin = %plugin, reason = ?miss, "[StaticAnalysis] Recomputing results");
            }
        }

        let mut context: Option<ScanContext> = None;
        let mut outcomes = Vec::with_capacity(self.scanners.len());
        let mut cache_writable = true;

        for scanner in &self.scanners {
            let name = scanner.name();
            if !self.settings.scanner_enabled(name) {
                continue;
            }

            let (result, from_cache) = match cache.results.get(name) {
                Some(cached) => (cached.clone(), true),
                None => {
                    let ctx = context.get_or_insert_with(|| ScanContext::from_archive(archive));
                    match catch_unwind(AssertUnwindSafe(|| run_scanner(scanner.as_ref(), ctx))) {
                        Ok(result) => {
                            cache.results.insert(name.to_string(), result.clone());
                            if cache_writable {
                                // The result stands even if it cannot be kept.
                                if let Err(e) = self.cache.persist(&cache) {
                                    warn!(plugin = %plugin, error = %e, "[StaticAnalysis] Cache not persisted");
                                    cache_writable = false;
                                }
                            }
                            (result, false)
                        }
                        Err(panic) => {
                            let message = panic_message(panic.as_ref());
                            self.scanner_failed(&plugin, name, &message)?;
                            continue;
                        }
                    }
                }
            };

            let countermeasure = if result.verdict == Verdict::Clean {
                None
            } else {
                self.override_for(name).or(result.recommended_countermeasure)
            };

            if result.verdict != Verdict::Clean || !from_cache {
                SecurityEventLogger::log(SecurityEvent::ScannerVerdict {
                    plugin: plugin.clone(),
                    content_hash: hash.to_string(),
                    scanner: name.to_string(),
                    verdict: result.verdict.to_string(),
                    confidence: result.confidence,
                    countermeasure: countermeasure.map(|c| c.to_string()),
                });
            }

            outcomes.push(ScannerOutcome {
                scanner: name.to_string(),
                result,
                from_cache,
                countermeasure,
            });
        }

        Ok(outcomes)
    }

    fn scanner_failed(&self, plugin: &str, scanner: &str, message: &str) -> Result<()> {
        error!(plugin = %plugin, scanner = %scanner, error = %message, "[StaticAnalysis] Scanner failed");
        SecurityEventLogger::log(SecurityEvent::ScannerFailure {
            plugin: plugin.to_string(),
            scanner: scanner.to_string(),
            error: message.to_string(),
        });
        match self.failure_policy {
            FailurePolicy::Continue => Ok(()),
            FailurePolicy::Shutdown => Err(AnalysisError::ScannerFailed {
                scanner: scanner.to_string(),
                plugin: plugin.to_string(),
                message: message.to_string(),
            }),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "scanner panicked".to_string()
    }
}
