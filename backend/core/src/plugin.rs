/// Indexed plugins and the lookup seam onto the plugin registry.
///
/// The registry itself (discovery, descriptor parsing) lives outside the core;
/// the core only asks it "which plugin owns this class / this file".
use std::collections::{BTreeSet, HashMap};
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A plugin artifact as seen at discovery time. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedPlugin {
    pub jar_file: PathBuf,
    /// Binary class names with `.` separators (`com.example.Main`).
    pub class_names: BTreeSet<String>,
    pub display_name: String,
    /// Hex SHA-256 of the artifact bytes.
    pub content_hash: String,
}

impl IndexedPlugin {
    pub fn owns_class(&self, class_name: &str) -> bool {
        self.class_names.contains(class_name)
    }
}

/// Read-only view of the plugin registry.
pub trait PluginLookup: Send + Sync {
    /// The plugin whose artifact contains `class_name`, if any.
    fn plugin_for_class(&self, class_name: &str) -> Option<&IndexedPlugin>;

    /// The plugin built from the artifact at `path`, if any.
    fn plugin_for_file(&self, path: &Path) -> Option<&IndexedPlugin>;

    /// The plugin with the given display name, if any.
    fn plugin_by_name(&self, name: &str) -> Option<&IndexedPlugin>;

    /// Every indexed plugin, in a stable order.
    fn plugins(&self) -> Vec<&IndexedPlugin>;
}

/// In-memory lookup over a fixed set of plugins.
#[derive(Debug, Default)]
pub struct StaticLookup {
    plugins: Vec<IndexedPlugin>,
    by_class: HashMap<String, usize>,
}

impl StaticLookup {
    pub fn new(plugins: Vec<IndexedPlugin>) -> Self {
        let mut by_class = HashMap::new();
        for (idx, plugin) in plugins.iter().enumerate() {
            for class in &plugin.class_names {
                // First registration wins when two artifacts ship the same class.
                by_class.entry(class.clone()).or_insert(idx);
            }
        }
        Self { plugins, by_class }
    }
}

impl PluginLookup for StaticLookup {
    fn plugin_for_class(&self, class_name: &str) -> Option<&IndexedPlugin> {
        self.by_class.get(class_name).map(|&idx| &self.plugins[idx])
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

/// Hex SHA-256 of a byte slice.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hex SHA-256 of a file, streamed.
pub fn content_hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
