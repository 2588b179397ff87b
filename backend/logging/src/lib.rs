//! Telemetry and structured logging components for Warden.
//!
//! Handles logger setup with file rotation, credential redaction, and the
//! dedicated security-event stream.

pub mod event_logger;
pub mod logger;
pub mod redact;

pub use event_logger::{SecurityEvent, SecurityEventLogger, SecurityLogEntry, SECURITY_TARGET};
pub use logger::init_logger;
pub use redact::redact_sensitive_data;
