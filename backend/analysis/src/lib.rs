//! `warden-analysis`: static analysis of plugin archives.
//!
//! Opens a plugin archive, runs the registered scanners over its classes,
//! caches each scanner's result under the archive's content hash, and applies
//! the resulting countermeasures (warn, abort startup, quarantine).

pub mod archive;
pub mod cache;
pub mod countermeasure;
pub mod engine;
pub mod error;
pub mod scanner;
pub mod scanners;
pub mod startup;
pub mod verdict;

pub use archive::{ClassEntry, PluginArchive};
pub use cache::{CacheMiss, CacheStore, InspectionCache};
pub use countermeasure::{enforce, quarantine, Enforcement, QuarantineRecord};
pub use engine::{ScannerOutcome, StaticAnalysis};
pub use error::{AnalysisError, Result};
pub use scanner::{run_scanner, ParsedClass, ParsedField, ParsedMethod, ScanContext, Scanner, Visit};
pub use scanners::{builtin_scanners, is_builtin, BUILTIN_SCANNERS};
pub use startup::{PluginReport, StartupReport, StartupScan};
pub use verdict::{Countermeasure, DefaultCountermeasures, Findings, ScanResult, Verdict};
