//! Domain access control for Warden.
//!
//! Sensitive operations are checked against per-operation policies before
//! they run. The caller is attributed through the identity resolver; host
//! code is never restricted.

pub mod engine;
pub mod error;
pub mod operation;
pub mod policy;
pub mod rule;

pub use engine::DacEngine;
pub use error::{DacError, Result};
pub use operation::{normalize, Argument, ArgumentKind, Operation};
pub use policy::{DacPolicy, OperationPolicy};
pub use rule::{ArgumentPattern, ExitPattern, IdentityFilter, PortPattern, Rule, RuleType, TextPattern};
