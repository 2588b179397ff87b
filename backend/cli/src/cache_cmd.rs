//! `warden cache`: inspection cache maintenance.

use anyhow::{Context, Result};
use warden_analysis::CacheStore;
use warden_config::DEFAULT_CACHE_EXPIRY_DAYS;
use warden_core::TOOL_VERSION;

use crate::bootstrap::Bootstrap;
use crate::terminal_output::note_success;

/// Delete every persisted inspection cache. Returns how many were removed.
pub fn clear(boot: &Bootstrap) -> Result<usize> {
    let expiry = boot
        .config
        .static_analysis
        .cache_expiry_days
        .unwrap_or(DEFAULT_CACHE_EXPIRY_DAYS);
    let store = CacheStore::new(boot.working_dir().join("cache"), expiry, TOOL_VERSION);
    let removed = store
        .clear()
        .with_context(|| format!("clear {}", store.dir().display()))?;
    note_success(&format!("Removed {removed} cached inspection(s) from {}", store.dir().display()));
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use warden_analysis::InspectionCache;

    #[tokio::test]
    async fn test_clear_removes_persisted_caches() {
        let dir = TempDir::new().unwrap();
        let boot = Bootstrap::load(Some(dir.path().to_path_buf())).await.unwrap();
        let store = CacheStore::new(boot.working_dir().join("cache"), 30, TOOL_VERSION);
        for hash in ["aa", "bb"] {
            store
                .persist(&InspectionCache::new(hash, TOOL_VERSION, chrono::Utc::now()))
                .unwrap();
        }

        assert_eq!(clear(&boot).unwrap(), 2);
        assert_eq!(clear(&boot).unwrap(), 0);
    }
}
