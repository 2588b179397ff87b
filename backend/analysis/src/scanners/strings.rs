//! String constants pointing at exfiltration endpoints, reverse shells,
//! miners, or large encoded payloads.

use std::ops::ControlFlow;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::scanner::{ParsedClass, Scanner, Visit};
use crate::verdict::Findings;

pub const NAME: &str = "suspicious-strings";

#[derive(Clone, Copy, PartialEq, Eq)]
enum Severity {
    Suspicious,
    Malicious,
}

struct Pattern {
    regex: Regex,
    severity: Severity,
    label: &'static str,
}

static PATTERNS: Lazy<Vec<Pattern>> = Lazy::new(|| {
    let table: &[(&str, Severity, &str)] = &[
        (r"(?i)discord(app)?\.com/api/webhooks/", Severity::Malicious, "Discord webhook"),
        (r"/dev/tcp/", Severity::Malicious, "reverse shell"),
        (r"(?i)stratum\+(tcp|ssl)://", Severity::Malicious, "mining pool"),
        (r"(?i)https?://(pastebin\.com|hastebin\.com|transfer\.sh|[a-z0-9-]+\.ngrok\.io)", Severity::Suspicious, "paste or tunnel host"),
        (r"https?://\d{1,3}(\.\d{1,3}){3}", Severity::Suspicious, "raw IP URL"),
        (r"^[A-Za-z0-9+/]{200,}={0,2}$", Severity::Suspicious, "large base64 blob"),
    ];
    table
        .iter()
        .map(|(re, severity, label)| Pattern {
            regex: Regex::new(re).expect("static regex"),
            severity: *severity,
            label: *label,
        })
        .collect()
});

fn preview(s: &str) -> String {
    const MAX: usize = 60;
    if s.chars().count() <= MAX {
        return s.to_string();
    }
    let cut: String = s.chars().take(MAX).collect();
    format!("{cut}...")
}

pub struct SuspiciousStringsScanner;

pub fn create() -> Box<dyn Scanner> {
    Box::new(SuspiciousStringsScanner)
}

impl Scanner for SuspiciousStringsScanner {
    fn name(&self) -> &'static str {
        NAME
    }

    fn visit_class(&self, class: &ParsedClass, findings: &mut Findings) -> Visit {
        for s in class.strings() {
            let Some(p) = PATTERNS.iter().find(|p| p.regex.is_match(s)) else {
                continue;
            };
            let detail = format!("{}: {} {:?}", class.name, p.label, preview(s));
            match p.severity {
                Severity::Malicious => findings.malicious(detail),
                Severity::Suspicious => findings.suspicious(detail),
            }
        }
        ControlFlow::Continue(())
    }
}
