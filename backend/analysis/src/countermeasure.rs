//! Applying countermeasures to a plugin's scan outcomes.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;
use warden_logging::{SecurityEvent, SecurityEventLogger};

use crate::archive::PluginArchive;
use crate::engine::ScannerOutcome;
use crate::error::{AnalysisError, Result};
use crate::verdict::{Countermeasure, Verdict};

/// Sidecar written next to a quarantined archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuarantineRecord {
    pub id: Uuid,
    pub plugin: String,
    pub content_hash: String,
    pub scanner: String,
    pub verdict: Verdict,
    pub details: Vec<String>,
    pub quarantined_at: DateTime<Utc>,
    pub original_path: PathBuf,
}

/// What happened to one plugin after its outcomes were evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enforcement {
    pub plugin: String,
    /// Strongest countermeasure in force, if any scanner raised one.
    pub countermeasure: Option<Countermeasure>,
    /// Scanners whose outcome carried that countermeasure.
    pub triggered_by: Vec<String>,
    /// Where the archive now lives, if it was quarantined.
    pub quarantined_to: Option<PathBuf>,
    /// Why the countermeasure could not be carried out. It stays in force.
    pub failure: Option<String>,
}

impl Enforcement {
    pub fn blocks_startup(&self) -> bool {
        self.countermeasure.is_some_and(Countermeasure::blocks_startup)
    }
}

/// Apply the strongest countermeasure among `outcomes`.
///
/// Every non-clean outcome is logged. Quarantine moves the archive into
/// `quarantine_dir` and writes a sidecar naming the first scanner that asked
/// for it. A quarantine that fails is recorded in `failure` and still blocks
/// startup.
pub fn enforce(archive: &PluginArchive, outcomes: &[ScannerOutcome], quarantine_dir: &Path) -> Enforcement {
    let plugin = archive.display_name();

    for outcome in outcomes.iter().filter(|o| o.result.verdict != Verdict::Clean) {
        warn!(
            plugin = %plugin,
            scanner = %outcome.scanner,
            verdict = %outcome.result.verdict,
            confidence = outcome.result.confidence,
            countermeasure = ?outcome.countermeasure,
            "[Countermeasure] {}",
            outcome.result.details.join("; ")
        );
    }

    let strongest = outcomes.iter().filter_map(|o| o.countermeasure).max();
    let triggered_by: Vec<String> = outcomes
        .iter()
        .filter(|o| strongest.is_some() && o.countermeasure == strongest)
        .map(|o| o.scanner.clone())
        .collect();

    let mut quarantined_to = None;
    let mut failure = None;
    match strongest {
        Some(Countermeasure::Quarantine) => {
            let culprit = outcomes
                .iter()
                .find(|o| o.countermeasure == Some(Countermeasure::Quarantine));
            if let Some(outcome) = culprit {
                match quarantine(archive, outcome, quarantine_dir) {
                    Ok(target) => quarantined_to = Some(target),
                    Err(e) => {
                        error!(plugin = %plugin, error = %e, "[Countermeasure] Quarantine failed; plugin still blocks startup");
                        failure = Some(e.to_string());
                    }
                }
            }
        }
        Some(Countermeasure::Abort) => {
            error!(plugin = %plugin, scanners = ?triggered_by, "[Countermeasure] Plugin blocks startup");
        }
        _ => {}
    }

    Enforcement {
        plugin,
        countermeasure: strongest,
        triggered_by,
        quarantined_to,
        failure,
    }
}

/// Move an archive into quarantine and record why.
pub fn quarantine(archive: &PluginArchive, outcome: &ScannerOutcome, quarantine_dir: &Path) -> Result<PathBuf> {
    let file_name = archive
        .path
        .file_name()
        .map(|n| n.to_os_string())
        .ok_or_else(|| {
            AnalysisError::io(
                &archive.path,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "archive path has no file name"),
            )
        })?;
    fs::create_dir_all(quarantine_dir).map_err(|e| AnalysisError::io(quarantine_dir, e))?;

    let id = Uuid::new_v4();
    let file_name = free_name(quarantine_dir, &file_name, &archive.content_hash, &id);
    let target = quarantine_dir.join(&file_name);
    move_file(&archive.path, &target)?;

    let record = QuarantineRecord {
        id,
        plugin: archive.display_name(),
        content_hash: archive.content_hash.clone(),
        scanner: outcome.scanner.clone(),
        verdict: outcome.result.verdict,
        details: outcome.result.details.clone(),
        quarantined_at: Utc::now(),
        original_path: archive.path.clone(),
    };
    let mut sidecar_name = file_name;
    sidecar_name.push(".quarantine.json");
    let sidecar = quarantine_dir.join(sidecar_name);
    let json = serde_json::to_vec_pretty(&record).map_err(|source| AnalysisError::Serialize {
        what: "quarantine record",
        source,
    })?;
    fs::write(&sidecar, json).map_err(|e| AnalysisError::io(&sidecar, e))?;

    info!(
        plugin = %record.plugin,
        from = %archive.path.display(),
        to = %target.display(),
        "[Countermeasure] Plugin quarantined"
    );
    SecurityEventLogger::log(SecurityEvent::Quarantine {
        plugin: record.plugin,
        scanner: record.scanner,
        from: archive.path.display().to_string(),
        to: target.display().to_string(),
    });
    Ok(target)
}

/// `name` if neither it nor its sidecar is taken, else the name tagged with
/// the content hash, then with the record id as well.
fn free_name(dir: &Path, name: &OsStr, content_hash: &str, id: &Uuid) -> OsString {
    let path = Path::new(name);
    let stem = path.file_stem().unwrap_or(name).to_os_string();
    let ext = path.extension().map(|e| e.to_os_string());
    let tagged = |tag: &str| {
        let mut n = stem.clone();
        n.push("-");
        n.push(tag);
        if let Some(ext) = &ext {
            n.push(".");
            n.push(ext);
        }
        n
    };
    let hash_tag: String = content_hash.chars().take(12).collect();
    let id_tag = id.simple().to_string();
    let taken = |n: &OsString| {
        let mut sidecar = n.clone();
        sidecar.push(".quarantine.json");
        dir.join(n).exists() || dir.join(sidecar).exists()
    };
    [name.to_os_string(), tagged(&hash_tag)]
        .into_iter()
        .find(|n| !taken(n))
        .unwrap_or_else(|| tagged(&format!("{hash_tag}-{}", &id_tag[..8])))
}

/// Rename, falling back to copy + remove across filesystems.
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to).map_err(|e| AnalysisError::io(to, e))?;
    fs::remove_file(from).map_err(|e| AnalysisError::io(from, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::write_test_jar;
    use crate::verdict::ScanResult;
    use tempfile::TempDir;

    fn outcome(scanner: &str, verdict: Verdict, countermeasure: Option<Countermeasure>) -> ScannerOutcome {
        ScannerOutcome {
            scanner: scanner.into(),
            result: ScanResult {
                verdict,
                confidence: 70,
                details: vec![format!("{scanner} hit")],
                recommended_countermeasure: countermeasure,
            },
            from_cache: false,
            countermeasure,
        }
    }

    fn archive(dir: &TempDir) -> PluginArchive {
        let jar = dir.path().join("plugins").join("shady.jar");
        fs::create_dir_all(jar.parent().unwrap()).unwrap();
        write_test_jar(&jar, &[("plugin.yml", b"name: Shady\n")]).unwrap();
        PluginArchive::open(&jar).unwrap()
    }

    #[test]
    fn test_warn_only_does_not_block() {
        let dir = TempDir::new().unwrap();
        let archive = archive(&dir);
        let outcomes = vec![
            outcome("a", Verdict::Clean, None),
            outcome("b", Verdict::Suspicious, Some(Countermeasure::Warn)),
        ];
        let e = enforce(&archive, &outcomes, &dir.path().join("q"));
        assert_eq!(e.countermeasure, Some(Countermeasure::Warn));
        assert!(!e.blocks_startup());
        assert!(archive.path.exists());
    }

    #[test]
    fn test_abort_names_every_trigger() {
        let dir = TempDir::new().unwrap();
        let archive = archive(&dir);
        let outcomes = vec![
            outcome("a", Verdict::Malicious, Some(Countermeasure::Abort)),
            outcome("b", Verdict::Suspicious, Some(Countermeasure::Warn)),
            outcome("c", Verdict::Malicious, Some(Countermeasure::Abort)),
        ];
        let e = enforce(&archive, &outcomes, &dir.path().join("q"));
        assert!(e.blocks_startup());
        assert_eq!(e.triggered_by, vec!["a", "c"]);
        assert_eq!(e.quarantined_to, None);
    }

    #[test]
    fn test_quarantine_moves_archive_and_writes_sidecar() {
        let dir = TempDir::new().unwrap();
        let archive = archive(&dir);
        let qdir = dir.path().join("quarantine");
        let outcomes = vec![outcome("security-manager-tamper", Verdict::Malicious, Some(Countermeasure::Quarantine))];

        let e = enforce(&archive, &outcomes, &qdir);
        let moved = e.quarantined_to.clone().unwrap();
        assert!(e.blocks_startup());
        assert_eq!(moved, qdir.join("shady.jar"));
        assert!(moved.exists());
        assert!(!archive.path.exists());

        let raw = fs::read(qdir.join("shady.jar.quarantine.json")).unwrap();
        let record: QuarantineRecord = serde_json::from_slice(&raw).unwrap();
        assert_eq!(record.plugin, "Shady");
        assert_eq!(record.scanner, "security-manager-tamper");
        assert_eq!(record.content_hash, archive.content_hash);
        assert_eq!(record.original_path, archive.path);
        assert_eq!(e.failure, None);
    }

    #[test]
    fn test_same_name_quarantine_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let qdir = dir.path().join("quarantine");
        let outcomes = vec![outcome("process-exec", Verdict::Malicious, Some(Countermeasure::Quarantine))];

        let first = archive(&dir);
        let first_to = enforce(&first, &outcomes, &qdir).quarantined_to.unwrap();

        let jar = dir.path().join("plugins").join("shady.jar");
        write_test_jar(&jar, &[("plugin.yml", b"name: Shady2\n")]).unwrap();
        let second = PluginArchive::open(&jar).unwrap();
        let second_to = enforce(&second, &outcomes, &qdir).quarantined_to.unwrap();

        assert_eq!(first_to, qdir.join("shady.jar"));
        let expected = format!("shady-{}.jar", &second.content_hash[..12]);
        assert_eq!(second_to, qdir.join(expected));
        assert!(first_to.exists() && second_to.exists());

        let raw = fs::read(qdir.join("shady.jar.quarantine.json")).unwrap();
        let record: QuarantineRecord = serde_json::from_slice(&raw).unwrap();
        assert_eq!(record.plugin, "Shady");
    }

    #[test]
    fn test_failed_quarantine_still_blocks() {
        let dir = TempDir::new().unwrap();
        let archive = archive(&dir);
        // A regular file where the quarantine directory should be.
        let qdir = dir.path().join("quarantine");
        fs::write(&qdir, b"in the way").unwrap();
        let outcomes = vec![outcome("process-exec", Verdict::Malicious, Some(Countermeasure::Quarantine))];

        let e = enforce(&archive, &outcomes, &qdir);
        assert!(e.blocks_startup());
        assert_eq!(e.quarantined_to, None);
        assert!(e.failure.is_some());
        assert!(archive.path.exists());
    }
}
