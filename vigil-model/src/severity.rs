use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Vulnerability severity tier.
///
/// Ordered `Critical > High > Medium > Low > Info`, so sorting a slice in
/// descending order puts the most severe findings first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    /// All tiers, most severe first.
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];

    fn rank(self) -> u8 {
        match self {
            Severity::Critical => 4,
            Severity::High => 3,
            Severity::Medium => 2,
            Severity::Low => 1,
            Severity::Info => 0,
        }
    }

    /// Lower-case key used by the remote `summary` object.
    pub fn summary_key(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }
}

impl PartialOrd for Severity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Severity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Critical => write!(f, "Critical"),
            Severity::High => write!(f, "High"),
            Severity::Medium => write!(f, "Medium"),
            Severity::Low => write!(f, "Low"),
            Severity::Info => write!(f, "Info"),
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            "info" | "informational" => Ok(Severity::Info),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

/// Count of findings per severity tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeveritySummary {
    pub critical: u64,
    pub high: u64,
    pub medium: u64,
    pub low: u64,
    pub info: u64,
}

impl SeveritySummary {
    pub fn count(&self, severity: Severity) -> u64 {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
            Severity::Info => self.info,
        }
    }

    pub fn record(&mut self, severity: Severity) {
        let slot = match severity {
            Severity::Critical => &mut self.critical,
            Severity::High => &mut self.high,
            Severity::Medium => &mut self.medium,
            Severity::Low => &mut self.low,
            Severity::Info => &mut self.info,
        };
        *slot += 1;
    }

    pub fn total(&self) -> u64 {
        Severity::ALL.iter().map(|s| self.count(*s)).sum()
    }

    /// Build a summary from the remote `{critical, high, ...}` map.
    ///
    /// Keys are matched case-insensitively; unknown keys are ignored and
    /// negative counts are clamped to zero.
    pub fn from_reported(reported: &BTreeMap<String, i64>) -> Self {
        let mut summary = Self::default();
        for (key, value) in reported {
            let Ok(severity) = key.parse::<Severity>() else {
                continue;
            };
            let count = u64::try_from(*value).unwrap_or(0);
            match severity {
                Severity::Critical => summary.critical = count,
                Severity::High => summary.high = count,
                Severity::Medium => summary.medium = count,
                Severity::Low => summary.low = count,
                Severity::Info => summary.info = count,
            }
        }
        summary
    }
}

impl FromIterator<Severity> for SeveritySummary {
    fn from_iter<I: IntoIterator<Item = Severity>>(iter: I) -> Self {
        let mut summary = Self::default();
        for severity in iter {
            summary.record(severity);
        }
        summary
    }
}
