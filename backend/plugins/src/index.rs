/// Plugin index: discovers plugin archives and answers ownership lookups.
///
/// Built once at startup from the plugins directory and never mutated
/// afterwards; a rebuild means a new index.
use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use warden_analysis::PluginArchive;
use warden_core::{IndexedPlugin, PluginLookup};

use crate::descriptor::PluginDescriptor;

#[derive(Debug, Default)]
pub struct PluginIndex {
    plugins_dir: PathBuf,
    plugins: Vec<IndexedPlugin>,
    descriptors: BTreeMap<String, PluginDescriptor>,
    by_class: HashMap<String, usize>,
    /// Jars that could not be opened, with the reason.
    unreadable: Vec<(PathBuf, String)>,
}

impl PluginIndex {
    /// Index every `*.jar` directly inside `plugins_dir`, in file-name order.
    ///
    /// A missing directory is an empty index. Archives that cannot be read are
    /// left out of the lookup and kept in `unreadable` for the startup report.
    pub fn discover(plugins_dir: impl Into<PathBuf>) -> Result<Self> {
        let plugins_dir = plugins_dir.into();
        let mut index = Self {
            plugins_dir: plugins_dir.clone(),
            ..Default::default()
        };
        if !plugins_dir.exists() {
            return Ok(index);
        }

        let mut jars = Vec::new();
        for entry in std::fs::read_dir(&plugins_dir).context("read plugins dir")? {
            let path = entry?.path();
            let is_jar = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("jar"));
            if path.is_file() && is_jar {
                jars.push(path);
            }
        }
        jars.sort();

        for path in jars {
            match PluginArchive::open(&path) {
                Ok(archive) => index.add(archive),
                Err(e) => {
                    warn!("[Plugins] Failed to index {:?}: {}", path.file_name(), e);
                    index.unreadable.push((path, e.to_string()));
                }
            }
        }
        info!(count = index.plugins.len(), dir = %plugins_dir.display(), "[Plugins] Indexed plugins");
        Ok(index)
    }

    /// Index an already opened archive.
    pub fn add(&mut self, archive: PluginArchive) {
        let descriptor = archive.descriptor.as_deref().map(PluginDescriptor::parse);
        let display_name = match descriptor {
            Some(Ok(descriptor)) => {
                let name = descriptor.name.clone();
                self.descriptors.insert(name.clone(), descriptor);
                name
            }
            Some(Err(e)) => {
                warn!("[Plugins] Invalid descriptor in {:?}: {}", archive.path.file_name(), e);
                archive.display_name()
            }
            None => archive.display_name(),
        };
        if self.plugin_by_name(&display_name).is_some() {
            warn!(plugin = %display_name, path = %archive.path.display(), "[Plugins] Duplicate plugin name");
        }

        let class_names: BTreeSet<String> = archive.classes.iter().map(|c| c.class_name()).collect();
        let idx = self.plugins.len();
        for class in &class_names {
            // First archive wins when two ship the same class.
            self.by_class.entry(class.clone()).or_insert(idx);
        }
        info!("[Plugins] Indexed: {} ({} classes)", display_name, class_names.len());
        self.plugins.push(IndexedPlugin {
            jar_file: archive.path,
            class_names,
            display_name,
            content_hash: archive.content_hash,
        });
    }

    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    pub fn unreadable(&self) -> &[(PathBuf, String)] {
        &self.unreadable
    }

    pub fn descriptor(&self, name: &str) -> Option<&PluginDescriptor> {
        self.descriptors.get(name)
    }

    /// Valid descriptors, by plugin name.
    pub fn descriptors(&self) -> impl Iterator<Item = &PluginDescriptor> {
        self.descriptors.values()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl PluginLookup for PluginIndex {
    fn plugin_for_class(&self, class_name: &str) -> Option<&IndexedPlugin> {
        self.by_class.get(class_name).and_then(|&idx| self.plugins.get(idx))
    }

    fn plugin_for_file(&self, path: &Path) -> Option<&IndexedPlugin> {
        self.plugins.iter().find(|p| p.jar_file == path)
    }

    fn plugin_by_name(&self, name: &str) -> Option<&IndexedPlugin> {
        self.plugins.iter().find(|p| p.display_name == name)
    }

    fn plugins(&self) -> Vec<&IndexedPlugin> {
        self.plugins.iter().collect()
    }
}
