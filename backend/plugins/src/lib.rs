//! `warden-plugins`: the plugin registry collaborator and the runtime
//! event layer.
//!
//! - `PluginIndex`: discovers plugin archives and implements `PluginLookup`
//! - `EventBus`: synchronous, fixed-subscription event delivery
//! - Heuristics that correlate events and submit `Report`s to a `ReportSink`

pub mod descriptor;
pub mod event_bus;
pub mod heuristics;
pub mod index;
pub mod report;

pub use descriptor::PluginDescriptor;
pub use event_bus::{Event, EventBus, EventBusBuilder, EventKind, Listener};
pub use heuristics::{builtin_heuristics, ForcePrivilegeHeuristic, BUILTIN_HEURISTICS, DEFAULT_WINDOW};
pub use index::PluginIndex;
pub use report::{Report, ReportSink, Severity};
