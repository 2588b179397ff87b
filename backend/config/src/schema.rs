//! Warden configuration schema.
//!
//! Three documents live in the config directory, one per subsystem:
//! `config.yml` (global), `static-analysis.yml`, and `dac.yml`. Every field
//! is optional on disk; `defaults::apply_all_defaults` fills the gaps.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Global settings (config.yml)
// ---------------------------------------------------------------------------

/// What to do when a scanner itself fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log the failure and keep going with the remaining scanners.
    #[default]
    Continue,
    /// Log the failure and stop the host.
    Shutdown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalConfig {
    /// Root for the inspection cache and quarantine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_policy: Option<FailurePolicy>,

    /// Deny writes and deletes inside the working directory regardless of rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_defense: Option<bool>,

    /// Plugin whose frames are never attributed (the host itself).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_plugin_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugins_dir: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Static analysis (static-analysis.yml)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Overrides the scanner's own countermeasures (`warn`, `abort`, `quarantine`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub countermeasure: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticAnalysisConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_expiry_days: Option<u32>,

    /// Per-scanner settings keyed by scanner name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scanners: BTreeMap<String, ScannerConfig>,

    /// Absolute archive paths that are never scanned.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclusions: Vec<PathBuf>,

    /// Override applied to every scanner without its own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub countermeasure: Option<String>,
}

impl StaticAnalysisConfig {
    pub fn scanner_enabled(&self, name: &str) -> bool {
        self.scanners
            .get(name)
            .and_then(|s| s.enabled)
            .unwrap_or(true)
    }

    /// Countermeasure override for one scanner, falling back to the global one.
    pub fn countermeasure_for(&self, name: &str) -> Option<&str> {
        self.scanners
            .get(name)
            .and_then(|s| s.countermeasure.as_deref())
            .or(self.countermeasure.as_deref())
    }
}

// ---------------------------------------------------------------------------
// Domain access control (dac.yml)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationConfig {
    /// `ALLOW` or `DENY`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    /// Rule lines, evaluated in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<String>,
}

/// Operation name (`file-read`, `process-exec`, ...) to its policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DacConfig {
    pub operations: BTreeMap<String, OperationConfig>,
}

// ---------------------------------------------------------------------------
// All documents
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WardenConfig {
    pub global: GlobalConfig,
    pub static_analysis: StaticAnalysisConfig,
    pub dac: DacConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_parses_camel_case() {
        let yaml = "workingDir: /srv/warden\nfailurePolicy: shutdown\nselfDefense: true\n";
        let cfg: GlobalConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.working_dir, Some(PathBuf::from("/srv/warden")));
        assert_eq!(cfg.failure_policy, Some(FailurePolicy::Shutdown));
        assert_eq!(cfg.self_defense, Some(true));
    }

    #[test]
    fn test_scanner_override_falls_back_to_global() {
        let yaml = r#"
countermeasure: warn
scanners:
  process-exec:
    countermeasure: quarantine
  obfuscation:
    enabled: false
"#;
        let cfg: StaticAnalysisConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.countermeasure_for("process-exec"), Some("quarantine"));
        assert_eq!(cfg.countermeasure_for("native-code"), Some("warn"));
        assert!(!cfg.scanner_enabled("obfuscation"));
        assert!(cfg.scanner_enabled("native-code"));
    }

    #[test]
    fn test_dac_document_is_keyed_by_operation() {
        let yaml = r#"
file-read:
  default: ALLOW
  rules:
    - "DENY PLUGIN=Evil /secret/*"
process-exec:
  default: DENY
"#;
        let cfg: DacConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.operations.len(), 2);
        assert_eq!(cfg.operations["file-read"].rules.len(), 1);
        assert_eq!(cfg.operations["process-exec"].default.as_deref(), Some("DENY"));
    }
}
