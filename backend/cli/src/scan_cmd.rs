//! `warden scan`: the startup pass over every indexed plugin.

use std::path::Path;

use anyhow::Result;
use tracing::error;
use warden_analysis::{CacheStore, StartupReport, StartupScan, StaticAnalysis, Verdict};
use warden_core::{PluginLookup, TOOL_VERSION};
use warden_config::DEFAULT_CACHE_EXPIRY_DAYS;

use crate::bootstrap::Bootstrap;
use crate::terminal_output::{note_error, note_info, note_success, note_warn, paint, render_table, GREEN, RED, YELLOW};

/// Outcome of a scan run, mapped to the process exit code by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Passed,
    Aborted,
}

pub fn run(boot: &Bootstrap, plugins_dir: Option<&Path>) -> Result<ScanStatus> {
    let plugins_dir = boot.plugins_dir(plugins_dir);
    let (index, ctx) = boot.context(&plugins_dir)?;
    note_info(&format!("Scanning {} plugin(s) in {}", index.len(), plugins_dir.display()));

    let settings = boot.config.static_analysis.clone();
    let cache = CacheStore::new(
        ctx.cache_dir(),
        settings.cache_expiry_days.unwrap_or(DEFAULT_CACHE_EXPIRY_DAYS),
        TOOL_VERSION,
    );
    let engine = StaticAnalysis::new(cache, settings, boot.failure_policy());

    let report = match StartupScan::new(&engine, ctx.quarantine_dir())
        .with_unreadable(index.unreadable().iter().cloned())
        .run(index.plugins())
    {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "[Scan] Static analysis aborted");
            note_error(&format!("Static analysis aborted: {e}"));
            return Ok(ScanStatus::Aborted);
        }
    };

    print_report(&report);
    Ok(status(&report))
}

fn status(report: &StartupReport) -> ScanStatus {
    if report.should_abort() {
        ScanStatus::Aborted
    } else {
        ScanStatus::Passed
    }
}

fn verdict_cell(verdict: Verdict) -> String {
    match verdict {
        Verdict::Clean => paint("CLEAN", GREEN),
        Verdict::Suspicious => paint("SUSPICIOUS", YELLOW),
        Verdict::Malicious => paint("MALICIOUS", RED),
    }
}

pub fn report_rows(report: &StartupReport) -> Vec<Vec<String>> {
    report
        .plugins
        .iter()
        .flat_map(|plugin| {
            plugin.outcomes.iter().map(move |outcome| {
                vec![
                    plugin.plugin.clone(),
                    outcome.scanner.clone(),
                    verdict_cell(outcome.result.verdict),
                    outcome.result.confidence.to_string(),
                    if outcome.from_cache { "cached" } else { "fresh" }.to_string(),
                    outcome
                        .countermeasure
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                ]
            })
        })
        .collect()
}

fn print_report(report: &StartupReport) {
    let rows = report_rows(report);
    if !rows.is_empty() {
        print!(
            "{}",
            render_table(
                &["Plugin", "Scanner", "Verdict", "Confidence", "Result", "Countermeasure"],
                &rows
            )
        );
    }

    for path in &report.excluded {
        note_info(&format!("Excluded {}", path.display()));
    }
    for (path, reason) in &report.unreadable {
        note_warn(&format!("Could not read {}: {reason}", path.display()));
    }
    for plugin in &report.plugins {
        if let Some(to) = &plugin.enforcement.quarantined_to {
            note_warn(&format!("{} quarantined to {}", plugin.plugin, to.display()));
        }
        if let Some(failure) = &plugin.enforcement.failure {
            note_error(&format!("{}: countermeasure failed: {failure}", plugin.plugin));
        }
    }

    let mut blocking: Vec<String> = report.blocking_plugins().map(|p| p.plugin.clone()).collect();
    blocking.extend(report.unreadable.iter().map(|(path, _)| path.display().to_string()));
    if blocking.is_empty() {
        note_success(&format!("{} plugin(s) scanned, startup may proceed", report.plugins.len()));
    } else {
        note_error(&format!("Startup blocked by: {}", blocking.join(", ")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use warden_analysis::archive::write_test_jar;
    use warden_classfile::opcodes::{ACONST_NULL, INVOKEVIRTUAL, POP, RETURN};
    use warden_classfile::{ClassBuilder, Code, Instruction, ACC_PUBLIC, ACC_STATIC};

    fn exec_class() -> Vec<u8> {
        let mut b = ClassBuilder::new("evil/Main");
        let exec = b
            .pool()
            .intern_method_ref("java/lang/Runtime", "exec", "(Ljava/lang/String;)Ljava/lang/Process;")
            .unwrap();
        let cmd = b.pool().intern_string("/bin/sh -c whoami").unwrap();
        b.method(
            ACC_PUBLIC | ACC_STATIC,
            "onEnable",
            "()V",
            Code::new(
                2,
                0,
                vec![
                    Instruction::simple(ACONST_NULL),
                    Instruction::ldc(cmd),
                    Instruction::with_constant(INVOKEVIRTUAL, exec),
                    Instruction::simple(POP),
                    Instruction::simple(RETURN),
                ],
            ),
        )
        .unwrap();
        b.build().unwrap()
    }

    #[tokio::test]
    async fn test_malicious_plugin_blocks_startup() {
        let dir = TempDir::new().unwrap();
        let plugins = dir.path().join("plugins");
        std::fs::create_dir_all(&plugins).unwrap();
        write_test_jar(
            &plugins.join("evil.jar"),
            &[("plugin.yml", b"name: Evil\nmain: evil.Main\n"), ("evil/Main.class", &exec_class())],
        )
        .unwrap();

        let boot = Bootstrap::load(Some(dir.path().to_path_buf())).await.unwrap();
        assert_eq!(run(&boot, None).unwrap(), ScanStatus::Aborted);

        // The second pass is served from the inspection cache.
        let (index, ctx) = boot.context(&plugins).unwrap();
        let engine = StaticAnalysis::new(
            CacheStore::new(ctx.cache_dir(), 30, TOOL_VERSION),
            boot.config.static_analysis.clone(),
            boot.failure_policy(),
        );
        let report = StartupScan::new(&engine, ctx.quarantine_dir())
            .run(index.plugins())
            .unwrap();
        let rows = report_rows(&report);
        assert!(!rows.is_empty());
        assert!(rows.iter().all(|row| row[0] == "Evil" && row[4] == "cached"));
    }

    #[tokio::test]
    async fn test_unopenable_jar_blocks_startup() {
        let dir = TempDir::new().unwrap();
        let plugins = dir.path().join("plugins");
        std::fs::create_dir_all(&plugins).unwrap();
        std::fs::write(plugins.join("crafted.jar"), b"PK\x03\x04 not really").unwrap();

        let boot = Bootstrap::load(Some(dir.path().to_path_buf())).await.unwrap();
        assert_eq!(run(&boot, None).unwrap(), ScanStatus::Aborted);

        let (index, ctx) = boot.context(&plugins).unwrap();
        assert!(index.is_empty());
        let engine = StaticAnalysis::new(
            CacheStore::new(ctx.cache_dir(), 30, TOOL_VERSION),
            boot.config.static_analysis.clone(),
            boot.failure_policy(),
        );
        let report = StartupScan::new(&engine, ctx.quarantine_dir())
            .with_unreadable(index.unreadable().iter().cloned())
            .run(index.plugins())
            .unwrap();
        assert_eq!(report.unreadable.len(), 1);
        assert_eq!(report.unreadable[0].0, plugins.join("crafted.jar"));
    }

    #[tokio::test]
    async fn test_empty_plugins_dir_passes() {
        let dir = TempDir::new().unwrap();
        let boot = Bootstrap::load(Some(dir.path().to_path_buf())).await.unwrap();
        assert_eq!(run(&boot, None).unwrap(), ScanStatus::Passed);
    }
}
