//! Security Event Logger
//!
//! Security-relevant occurrences (denials, verdicts, alerts, cache tampering,
//! quarantine) serialized onto the `security_events` tracing target, which
//! `init_logger` routes to its own NDJSON stream.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::redact::redact_sensitive_data;

pub const SECURITY_TARGET: &str = "security_events";

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SecurityEvent {
    AccessDenied {
        operation: String,
        identity: String,
        argument: String,
    },
    ScannerVerdict {
        plugin: String,
        content_hash: String,
        scanner: String,
        verdict: String,
        confidence: u8,
        countermeasure: Option<String>,
    },
    ScannerFailure {
        plugin: String,
        scanner: String,
        error: String,
    },
    HeuristicAlert {
        report_id: String,
        heuristic: String,
        severity: String,
        identity: String,
        message: String,
    },
    CacheCorruption {
        content_hash: String,
        path: String,
        reason: String,
    },
    Quarantine {
        plugin: String,
        scanner: String,
        from: String,
        to: String,
    },
}

impl SecurityEvent {
    fn is_alarming(&self) -> bool {
        matches!(
            self,
            SecurityEvent::AccessDenied { .. }
                | SecurityEvent::HeuristicAlert { .. }
                | SecurityEvent::CacheCorruption { .. }
        )
    }
}

#[derive(Debug, Serialize)]
pub struct SecurityLogEntry {
    pub timestamp: DateTime<Utc>,
    pub event: SecurityEvent,
}

pub struct SecurityEventLogger;

impl SecurityEventLogger {
    /// Record a security event. Free-text arguments are redacted first.
    pub fn log(mut event: SecurityEvent) -> SecurityLogEntry {
        match &mut event {
            SecurityEvent::AccessDenied { argument, .. } => {
                *argument = redact_sensitive_data(argument);
            }
            SecurityEvent::ScannerFailure { error, .. } => {
                *error = redact_sensitive_data(error);
            }
            _ => {}
        }

        let entry = SecurityLogEntry {
            timestamp: Utc::now(),
            event,
        };

        let record = serde_json::to_string(&entry).unwrap_or_else(|e| format!("{entry:?} ({e})"));
        if entry.event.is_alarming() {
            warn!(target: SECURITY_TARGET, record = %record, "Security event");
        } else {
            info!(target: SECURITY_TARGET, record = %record, "Security event");
        }
        entry
    }
}
