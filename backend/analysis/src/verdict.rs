//! Verdicts, results, countermeasures, and the per-run findings accumulator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Clean,
    Suspicious,
    Malicious,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::Clean => "CLEAN",
            Verdict::Suspicious => "SUSPICIOUS",
            Verdict::Malicious => "MALICIOUS",
        };
        f.write_str(s)
    }
}

/// Escalating response to a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Countermeasure {
    /// Log only.
    Warn,
    /// Block host startup once every plugin has been scanned.
    Abort,
    /// Abort, and move the archive into quarantine.
    Quarantine,
}

impl Countermeasure {
    pub fn blocks_startup(self) -> bool {
        matches!(self, Countermeasure::Abort | Countermeasure::Quarantine)
    }
}

impl fmt::Display for Countermeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Countermeasure::Warn => "WARN",
            Countermeasure::Abort => "ABORT",
            Countermeasure::Quarantine => "QUARANTINE",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCountermeasure(pub String);

impl fmt::Display for UnknownCountermeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown countermeasure '{}'", self.0)
    }
}

impl std::error::Error for UnknownCountermeasure {}

impl FromStr for Countermeasure {
    type Err = UnknownCountermeasure;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warn" => Ok(Countermeasure::Warn),
            "abort" => Ok(Countermeasure::Abort),
            "quarantine" => Ok(Countermeasure::Quarantine),
            _ => Err(UnknownCountermeasure(s.to_string())),
        }
    }
}

/// What a scanner recommends for each non-clean verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultCountermeasures {
    pub suspicious: Countermeasure,
    pub malicious: Countermeasure,
}

impl Default for DefaultCountermeasures {
    fn default() -> Self {
        Self {
            suspicious: Countermeasure::Warn,
            malicious: Countermeasure::Abort,
        }
    }
}

impl DefaultCountermeasures {
    pub fn for_verdict(&self, verdict: Verdict) -> Option<Countermeasure> {
        match verdict {
            Verdict::Clean => None,
            Verdict::Suspicious => Some(self.suspicious),
            Verdict::Malicious => Some(self.malicious),
        }
    }
}

/// One scanner's result for one plugin content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub verdict: Verdict,
    /// 0-100: how strongly the evidence supports `verdict`.
    pub confidence: u8,
    pub details: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_countermeasure: Option<Countermeasure>,
}

impl ScanResult {
    pub fn clean() -> Self {
        Self {
            verdict: Verdict::Clean,
            confidence: 100,
            details: Vec::new(),
            recommended_countermeasure: None,
        }
    }
}

/// Detail lines kept per result; the remainder is summarized.
pub const MAX_DETAILS: usize = 64;

/// Evidence collected while a scanner walks a plugin.
#[derive(Debug, Default)]
pub struct Findings {
    details: Vec<String>,
    omitted: usize,
    suspicious: u32,
    malicious: u32,
    counters: BTreeMap<&'static str, u64>,
}

impl Findings {
    fn push(&mut self, detail: String) {
        if self.details.len() < MAX_DETAILS {
            self.details.push(detail);
        } else {
            self.omitted += 1;
        }
    }

    /// Informational detail that does not affect the verdict.
    pub fn note(&mut self, detail: impl Into<String>) {
        self.push(detail.into());
    }

    pub fn suspicious(&mut self, detail: impl Into<String>) {
        self.suspicious += 1;
        self.push(detail.into());
    }

    pub fn malicious(&mut self, detail: impl Into<String>) {
        self.malicious += 1;
        self.push(detail.into());
    }

    pub fn malicious_count(&self) -> u32 {
        self.malicious
    }

    pub fn suspicious_count(&self) -> u32 {
        self.suspicious
    }

    /// Scratch counters for scanners that decide at the end of a run.
    pub fn bump(&mut self, key: &'static str, by: u64) {
        *self.counters.entry(key).or_insert(0) += by;
    }

    pub fn counter(&self, key: &str) -> u64 {
        self.counters.get(key).copied().unwrap_or(0)
    }

    pub fn into_result(mut self, defaults: DefaultCountermeasures) -> ScanResult {
        if self.omitted > 0 {
            self.details.push(format!("... and {} more", self.omitted));
        }
        let (verdict, confidence) = if self.malicious > 0 {
            let score = 70 + 10 * self.malicious.saturating_sub(1) + 5 * self.suspicious;
            (Verdict::Malicious, score.min(100))
        } else if self.suspicious > 0 {
            (Verdict::Suspicious, (25 + 15 * self.suspicious).min(95))
        } else {
            (Verdict::Clean, 100)
        };
        ScanResult {
            verdict,
            confidence: confidence as u8,
            details: self.details,
            recommended_countermeasure: defaults.for_verdict(verdict),
        }
    }
}
