use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::severity::Severity;

/// Remediation guidance as it arrives on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawRemediation {
    pub summary: Option<String>,
    #[serde(deserialize_with = "crate::lenient::null_as_default")]
    pub steps: Vec<String>,
}

/// A finding exactly as reported by the scan service.
///
/// Every field is optional, and a record that does not decode at all is kept
/// with [`decode_error`](Self::decode_error) set, so one bad record cannot
/// make the whole snapshot undecodable. Validation happens in the report
/// aggregator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawVulnerability {
    #[serde(rename = "type")]
    pub vuln_type: Option<String>,
    pub subtype: Option<String>,
    pub severity: Option<String>,
    pub url: Option<String>,
    pub method: Option<String>,
    pub parameter: Option<String>,
    pub payload: Option<String>,
    pub evidence: Option<String>,
    pub description: Option<String>,
    pub cvss_score: Option<f64>,
    pub cwe: Option<String>,
    pub owasp: Option<String>,
    pub remediation: Option<RawRemediation>,
    /// Why the record could not be decoded, if it could not.
    #[serde(skip)]
    pub decode_error: Option<String>,
}

impl RawVulnerability {
    /// Decode one finding, keeping a placeholder when the JSON does not fit.
    pub fn from_value(value: Value) -> Self {
        serde_json::from_value(value)
            .unwrap_or_else(|err| Self::undecodable(err.to_string()))
    }

    pub fn undecodable(reason: impl Into<String>) -> Self {
        Self {
            decode_error: Some(reason.into()),
            ..Self::default()
        }
    }
}

/// Remediation guidance attached to a validated finding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Remediation {
    pub summary: String,
    pub steps: Vec<String>,
}

/// A validated finding. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    #[serde(rename = "type")]
    pub vuln_type: String,
    pub subtype: String,
    pub severity: Severity,
    pub url: String,
    pub method: String,
    pub parameter: String,
    pub payload: String,
    pub evidence: String,
    pub description: String,
    pub cvss_score: f64,
    pub cwe: String,
    pub owasp: String,
    pub remediation: Remediation,
}
