use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::clock::{Clock, MonotonicClock};
use crate::plugin::PluginLookup;
use crate::resolver::IdentityResolver;

/// Explicitly constructed bundle handed to every component that needs
/// registry lookups, caller resolution, time, or the working directory.
#[derive(Clone)]
pub struct WardenContext {
    pub resolver: IdentityResolver,
    pub clock: Arc<dyn Clock>,
    /// Root of the tool's own storage (caches, quarantine).
    pub working_dir: PathBuf,
}

impl WardenContext {
    pub fn new(lookup: Arc<dyn PluginLookup>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            resolver: IdentityResolver::new(lookup),
            clock: Arc::new(MonotonicClock),
            working_dir: working_dir.into(),
        }
    }

    pub fn with_host_plugin(mut self, name: impl Into<String>) -> Self {
        self.resolver = self.resolver.with_host_plugin(name);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn lookup(&self) -> &Arc<dyn PluginLookup> {
        self.resolver.lookup()
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.working_dir.join("cache")
    }

    pub fn quarantine_dir(&self) -> PathBuf {
        self.working_dir.join("quarantine")
    }

    /// True if `path` lies inside the tool's own working storage.
    pub fn is_own_storage(&self, path: &Path) -> bool {
        path.starts_with(&self.working_dir)
    }
}
