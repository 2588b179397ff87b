//! Config validation with field paths. Nothing here is fatal: callers log
//! the report and carry on with whatever parsed.

use crate::schema::WardenConfig;
use thiserror::Error;

/// A config validation finding with field path and message.
#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    /// Emit every finding through `tracing`.
    pub fn log(&self) {
        for warning in &self.warnings {
            tracing::warn!(path = %warning.path, message = %warning.message, "Config warning");
        }
        for error in &self.errors {
            tracing::error!(path = %error.path, message = %error.message, "Config error");
        }
    }
}

const COUNTERMEASURES: &[&str] = &["warn", "abort", "quarantine"];
const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

pub fn validate(config: &WardenConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_global(config, &mut report);
    validate_static_analysis(config, &mut report);
    validate_dac(config, &mut report);
    report
}

fn is_countermeasure(name: &str) -> bool {
    COUNTERMEASURES.iter().any(|c| c.eq_ignore_ascii_case(name))
}

fn validate_global(config: &WardenConfig, report: &mut ValidationReport) {
    if let Some(level) = &config.global.log_level {
        if !LOG_LEVELS.iter().any(|l| l.eq_ignore_ascii_case(level)) {
            report.warn(
                "config.logLevel",
                format!("Unknown log level '{level}'; RUST_LOG-style directives are passed through"),
            );
        }
    }
    if let (Some(working), Some(plugins)) = (&config.global.working_dir, &config.global.plugins_dir) {
        if plugins.starts_with(working) {
            report.error(
                "config.pluginsDir",
                format!(
                    "'{}' lies inside workingDir '{}'; self-defense would deny every plugin write under it",
                    plugins.display(),
                    working.display()
                ),
            );
        }
    }
    if let Some(name) = &config.global.host_plugin_name {
        if name.trim().is_empty() {
            report.error("config.hostPluginName", "hostPluginName cannot be empty");
        }
    }
}

fn validate_static_analysis(config: &WardenConfig, report: &mut ValidationReport) {
    let sa = &config.static_analysis;
    if sa.cache_expiry_days == Some(0) {
        report.warn(
            "static-analysis.cacheExpiryDays",
            "cacheExpiryDays is 0; every scan recomputes",
        );
    }
    if let Some(cm) = &sa.countermeasure {
        if !is_countermeasure(cm) {
            report.error(
                "static-analysis.countermeasure",
                format!("Unknown countermeasure '{cm}'. Use 'warn', 'abort', or 'quarantine'"),
            );
        }
    }
    for (name, scanner) in &sa.scanners {
        if let Some(cm) = &scanner.countermeasure {
            if !is_countermeasure(cm) {
                report.error(
                    format!("static-analysis.scanners.{name}.countermeasure"),
                    format!("Unknown countermeasure '{cm}'"),
                );
            }
        }
    }
    for (i, path) in sa.exclusions.iter().enumerate() {
        if path.is_relative() {
            report.warn(
                format!("static-analysis.exclusions[{i}]"),
                format!("'{}' is relative and will never match an absolute path", path.display()),
            );
        }
    }
}

fn validate_dac(config: &WardenConfig, report: &mut ValidationReport) {
    for (op, policy) in &config.dac.operations {
        if let Some(default) = &policy.default {
            if !default.eq_ignore_ascii_case("allow") && !default.eq_ignore_ascii_case("deny") {
                report.error(
                    format!("dac.{op}.default"),
                    format!("Default must be ALLOW or DENY, got '{default}'"),
                );
            }
        }
        for (i, rule) in policy.rules.iter().enumerate() {
            if rule.trim().is_empty() {
                report.warn(format!("dac.{op}.rules[{i}]"), "Empty rule line is ignored");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{OperationConfig, ScannerConfig};

    #[test]
    fn empty_config_is_valid() {
        let report = validate(&WardenConfig::default());
        assert!(report.is_valid(), "errors: {:?}", report.errors);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn unknown_countermeasure_is_error() {
        let mut cfg = WardenConfig::default();
        cfg.static_analysis.scanners.insert(
            "process-exec".into(),
            ScannerConfig {
                enabled: None,
                countermeasure: Some("nuke".into()),
            },
        );
        let report = validate(&cfg);
        assert!(!report.is_valid());
        assert!(report.errors[0].path.contains("process-exec"));
    }

    #[test]
    fn countermeasure_is_case_insensitive() {
        let mut cfg = WardenConfig::default();
        cfg.static_analysis.countermeasure = Some("QUARANTINE".into());
        assert!(validate(&cfg).is_valid());
    }

    #[test]
    fn plugins_inside_working_dir_is_error() {
        let mut cfg = WardenConfig::default();
        cfg.global.working_dir = Some("/srv/warden".into());
        cfg.global.plugins_dir = Some("/srv/warden/plugins".into());
        let report = validate(&cfg);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].path, "config.pluginsDir");

        cfg.global.working_dir = Some("/srv/warden/data".into());
        assert!(validate(&cfg).is_valid());
    }

    #[test]
    fn defaults_keep_plugins_out_of_working_dir() {
        let cfg = crate::defaults::apply_all_defaults(WardenConfig::default(), std::path::Path::new("/etc/warden"));
        assert!(validate(&cfg).is_valid());
    }

    #[test]
    fn bad_dac_default_is_error() {
        let mut cfg = WardenConfig::default();
        cfg.dac.operations.insert(
            "file-read".into(),
            OperationConfig {
                default: Some("MAYBE".into()),
                rules: vec![],
            },
        );
        let report = validate(&cfg);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].path, "dac.file-read.default");
    }
}
