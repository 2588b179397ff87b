//! Config defaults: fills unset fields of freshly loaded documents.

use crate::schema::{FailurePolicy, WardenConfig};
use std::path::Path;

/// Days before a cached inspection result is recomputed.
pub const DEFAULT_CACHE_EXPIRY_DAYS: u32 = 30;

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Working storage under the config directory. Kept apart from `plugins`
/// so self-defense never covers plugin data folders.
pub const DEFAULT_WORKING_SUBDIR: &str = "data";

/// Apply all defaults. Relative paths are anchored at the config directory.
pub fn apply_all_defaults(config: WardenConfig, config_dir: &Path) -> WardenConfig {
    let config = apply_global_defaults(config, config_dir);
    apply_analysis_defaults(config)
}

fn apply_global_defaults(mut config: WardenConfig, config_dir: &Path) -> WardenConfig {
    let global = &mut config.global;
    let working_dir = match global.working_dir.take() {
        Some(dir) if dir.is_relative() => config_dir.join(dir),
        Some(dir) => dir,
        None => config_dir.join(DEFAULT_WORKING_SUBDIR),
    };
    if global.log_dir.is_none() {
        global.log_dir = Some(working_dir.join("logs"));
    }
    if global.plugins_dir.is_none() {
        global.plugins_dir = Some(config_dir.join("plugins"));
    }
    global.working_dir = Some(working_dir);
    global.log_level.get_or_insert_with(|| DEFAULT_LOG_LEVEL.to_string());
    global.failure_policy.get_or_insert(FailurePolicy::Continue);
    global.self_defense.get_or_insert(true);
    config
}

fn apply_analysis_defaults(mut config: WardenConfig) -> WardenConfig {
    let analysis = &mut config.static_analysis;
    analysis.enabled.get_or_insert(true);
    analysis.cache_expiry_days.get_or_insert(DEFAULT_CACHE_EXPIRY_DAYS);
    config
}
