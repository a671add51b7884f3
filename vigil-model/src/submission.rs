//! Local validation of a scan request.
//!
//! Everything here runs before any network call. A [`ScanSubmission`] can only
//! be built from input that passes every check, so holding one is proof the
//! request is fit to send.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::scan::StartScanRequest;

/// Crawl depth used when the caller does not pick one.
pub const DEFAULT_MAX_DEPTH: u8 = 2;

/// Errors raised by local input validation. These never reach the network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter a valid URL starting with http:// or https://")]
    InvalidUrl { input: String, reason: String },

    #[error("Unsupported URL scheme '{scheme}': only http and https can be scanned")]
    UnsupportedScheme { scheme: String },

    #[error("Target URL must include a host")]
    MissingHost,

    #[error("Maximum crawl depth must be between {min} and {max}, got {value}", min = MaxDepth::MIN, max = MaxDepth::MAX)]
    DepthOutOfRange { value: i64 },

    #[error("You must confirm you have permission to test this application")]
    ConsentRequired,
}

/// Crawl depth, guaranteed to lie in `[1, 5]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct MaxDepth(u8);

impl MaxDepth {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: i64) -> Result<Self, ValidationError> {
        if (i64::from(Self::MIN)..=i64::from(Self::MAX)).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(ValidationError::DepthOutOfRange { value })
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for MaxDepth {
    fn default() -> Self {
        Self(DEFAULT_MAX_DEPTH)
    }
}

impl TryFrom<i64> for MaxDepth {
    type Error = ValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MaxDepth> for u8 {
    fn from(depth: MaxDepth) -> Self {
        depth.0
    }
}

impl fmt::Display for MaxDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Explicit acknowledgment that the user may test the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Consent {
    Granted,
    #[default]
    Missing,
}

impl From<bool> for Consent {
    fn from(granted: bool) -> Self {
        if granted {
            Consent::Granted
        } else {
            Consent::Missing
        }
    }
}

/// A validated scan request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSubmission {
    target: String,
    parsed: Url,
    max_depth: MaxDepth,
}

impl ScanSubmission {
    /// Validate user input. The URL is checked first, then depth, then consent.
    pub fn new(
        target_url: &str,
        max_depth: i64,
        consent: Consent,
    ) -> Result<Self, ValidationError> {
        let target = target_url.trim();
        let parsed =
            Url::parse(target).map_err(|err| ValidationError::InvalidUrl {
                input: target.to_string(),
                reason: err.to_string(),
            })?;

        match parsed.scheme() {
            "http" | "https" => {}
            other => {
                return Err(ValidationError::UnsupportedScheme {
                    scheme: other.to_string(),
                });
            }
        }

        if parsed.host_str().is_none_or(str::is_empty) {
            return Err(ValidationError::MissingHost);
        }

        let max_depth = MaxDepth::new(max_depth)?;

        if consent != Consent::Granted {
            return Err(ValidationError::ConsentRequired);
        }

        Ok(Self {
            target: target.to_string(),
            parsed,
            max_depth,
        })
    }

    /// The target exactly as the user typed it (trimmed).
    pub fn target_url(&self) -> &str {
        &self.target
    }

    pub fn parsed_url(&self) -> &Url {
        &self.parsed
    }

    pub fn max_depth(&self) -> MaxDepth {
        self.max_depth
    }

    pub fn to_request(&self) -> StartScanRequest {
        StartScanRequest {
            target_url: self.target.clone(),
            max_depth: Some(self.max_depth.get()),
        }
    }
}
