//! Heuristic reports and where they go.
//!
//! Reports are logged, recorded as security events, and broadcast to any
//! subscriber (CLI printer, tests).

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{error, warn};
use uuid::Uuid;
use warden_core::Identity;
use warden_logging::{SecurityEvent, SecurityEventLogger};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub id: Uuid,
    pub severity: Severity,
    pub heuristic: String,
    pub plugin: String,
    pub class_name: String,
    pub method_name: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Report {
    /// A report about a concrete call site.
    pub fn new(heuristic: &str, severity: Severity, caller: &Identity, message: impl Into<String>) -> Self {
        let field = |v: Option<&str>| v.unwrap_or_default().to_string();
        Self {
            id: Uuid::new_v4(),
            severity,
            heuristic: heuristic.to_string(),
            plugin: field(caller.plugin_name()),
            class_name: field(caller.class_name()),
            method_name: field(caller.method_name()),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Clone)]
pub struct ReportSink {
    sender: broadcast::Sender<Report>,
}

impl ReportSink {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { sender: tx }
    }

    pub fn submit(&self, report: Report) {
        let identity = format!("{} {}#{}", report.plugin, report.class_name, report.method_name);
        match report.severity {
            Severity::High => error!(
                heuristic = %report.heuristic,
                plugin = %report.plugin,
                "[Heuristics] {}",
                report.message
            ),
            _ => warn!(
                heuristic = %report.heuristic,
                plugin = %report.plugin,
                "[Heuristics] {}",
                report.message
            ),
        }
        SecurityEventLogger::log(SecurityEvent::HeuristicAlert {
            report_id: report.id.to_string(),
            heuristic: report.heuristic.clone(),
            severity: report.severity.to_string(),
            identity,
            message: report.message.clone(),
        });
        // No receivers is fine; the log above is the durable record.
        let _ = self.sender.send(report);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Report> {
        self.sender.subscribe()
    }
}

impl Default for ReportSink {
    fn default() -> Self {
        Self::new()
    }
}
