//! `warden-core`: types shared by every Warden component.
//!
//! Provides:
//! - `Identity` (concrete call sites and filter patterns)
//! - Wildcard matching used by identity filters and DAC arguments
//! - `IndexedPlugin` and the `PluginLookup` seam onto the plugin registry
//! - `IdentityResolver`, which attributes a call stack to a plugin
//! - `WardenContext`, the dependency-injected bundle passed to components

pub mod clock;
pub mod context;
pub mod error;
pub mod identity;
pub mod plugin;
pub mod resolver;
pub mod wildcard;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use context::WardenContext;
pub use error::WardenError;
pub use identity::{FilterBuilder, Identity, IdentityFlavor};
pub use plugin::{content_hash, content_hash_file, IndexedPlugin, PluginLookup, StaticLookup};
pub use resolver::{CallStack, Frame, IdentityResolver};
pub use wildcard::wildcard_match;

/// Version string persisted in inspection caches; bumping it invalidates them.
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");
