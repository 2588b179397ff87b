//! Plugin archives: the compiled classes and descriptor inside a jar.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};
use warden_core::content_hash_file;

use crate::error::{AnalysisError, Result};

/// Descriptor file naming the plugin.
pub const DESCRIPTOR_NAME: &str = "plugin.yml";

/// Entries larger than this are not inflated.
pub const MAX_ENTRY_SIZE: u64 = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassEntry {
    /// Entry path inside the archive (`com/example/Main.class`).
    pub entry_name: String,
    pub bytes: Vec<u8>,
}

impl ClassEntry {
    /// Dotted binary name derived from the entry path.
    pub fn class_name(&self) -> String {
        self.entry_name
            .trim_end_matches(".class")
            .replace('/', ".")
    }
}

#[derive(Debug, Deserialize)]
struct Descriptor {
    name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PluginArchive {
    pub path: PathBuf,
    /// `name` from the descriptor, if present and readable.
    pub name: Option<String>,
    /// Raw descriptor text, for callers that want more than the name.
    pub descriptor: Option<String>,
    /// Class entries sorted by entry name.
    pub classes: Vec<ClassEntry>,
    /// Entries that could not be read, with the reason.
    pub unreadable: Vec<(String, String)>,
    pub content_hash: String,
}

impl PluginArchive {
    pub fn open(path: &Path) -> Result<Self> {
        let content_hash = content_hash_file(path).map_err(|e| AnalysisError::io(path, e))?;
        let file = File::open(path).map_err(|e| AnalysisError::io(path, e))?;
        let mut zip = zip::ZipArchive::new(BufReader::new(file)).map_err(|source| {
            AnalysisError::Archive {
                path: path.to_path_buf(),
                source,
            }
        })?;

        let mut classes = Vec::new();
        let mut unreadable = Vec::new();
        let mut name = None;
        let mut descriptor = None;

        for i in 0..zip.len() {
            let entry = match zip.by_index(i) {
                Ok(entry) => entry,
                Err(e) => {
                    unreadable.push((format!("#{i}"), e.to_string()));
                    continue;
                }
            };
            if entry.is_dir() {
                continue;
            }
            let entry_name = entry.name().to_string();
            let is_class = entry_name.ends_with(".class");
            let is_descriptor = entry_name == DESCRIPTOR_NAME;
            if !is_class && !is_descriptor {
                continue;
            }

            let mut bytes = Vec::new();
            if let Err(e) = entry.take(MAX_ENTRY_SIZE + 1).read_to_end(&mut bytes) {
                unreadable.push((entry_name, e.to_string()));
                continue;
            }
            if bytes.len() as u64 > MAX_ENTRY_SIZE {
                unreadable.push((entry_name, format!("larger than {MAX_ENTRY_SIZE} bytes")));
                continue;
            }

            if is_class {
                classes.push(ClassEntry { entry_name, bytes });
            } else {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                name = parse_descriptor_name(path, &text);
                descriptor = Some(text);
            }
        }

        classes.sort_by(|a, b| a.entry_name.cmp(&b.entry_name));
        unreadable.sort();
        debug!(
            path = %path.display(),
            classes = classes.len(),
            unreadable = unreadable.len(),
            "[Archive] Opened plugin archive"
        );

        Ok(Self {
            path: path.to_path_buf(),
            name,
            descriptor,
            classes,
            unreadable,
            content_hash,
        })
    }

    /// Descriptor name, else the file stem.
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            self.path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
    }
}

fn parse_descriptor_name(path: &Path, text: &str) -> Option<String> {
    match serde_yaml::from_str::<Descriptor>(text) {
        Ok(d) => d.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "[Archive] Unreadable plugin descriptor");
            None
        }
    }
}

/// Write a jar with the given entries. Test fixture helper shared across crates.
#[doc(hidden)]
pub fn write_test_jar(path: &Path, entries: &[(&str, &[u8])]) -> std::io::Result<()> {
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    let file = File::create(path)?;
    let mut zip = zip::ZipWriter::new(file);
    for (name, bytes) in entries {
        zip.start_file(*name, SimpleFileOptions::default())
            .map_err(std::io::Error::other)?;
        zip.write_all(bytes)?;
    }
    zip.finish().map_err(std::io::Error::other)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_reads_classes_and_descriptor() {
        let dir = TempDir::new().unwrap();
        let jar = dir.path().join("demo.jar");
        write_test_jar(
            &jar,
            &[
                ("plugin.yml", b"name: Demo\nmain: demo.Main\n"),
                ("demo/Zeta.class", b"zz"),
                ("demo/Alpha.class", b"aa"),
                ("README.md", b"ignored"),
            ],
        )
        .unwrap();

        let archive = PluginArchive::open(&jar).unwrap();
        assert_eq!(archive.name.as_deref(), Some("Demo"));
        let names: Vec<_> = archive.classes.iter().map(|c| c.class_name()).collect();
        assert_eq!(names, vec!["demo.Alpha", "demo.Zeta"]);
        assert_eq!(archive.content_hash.len(), 64);
    }

    #[test]
    fn test_missing_descriptor_falls_back_to_file_stem() {
        let dir = TempDir::new().unwrap();
        let jar = dir.path().join("nameless.jar");
        write_test_jar(&jar, &[("a/B.class", b"x")]).unwrap();
        let archive = PluginArchive::open(&jar).unwrap();
        assert_eq!(archive.name, None);
        assert_eq!(archive.display_name(), "nameless");
    }

    #[test]
    fn test_not_a_zip_is_an_error() {
        let dir = TempDir::new().unwrap();
        let jar = dir.path().join("bad.jar");
        std::fs::write(&jar, b"definitely not a zip").unwrap();
        assert!(matches!(
            PluginArchive::open(&jar),
            Err(AnalysisError::Archive { .. })
        ));
    }
}
