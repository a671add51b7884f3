use thiserror::Error;
use url::Url;

use crate::models::ClientConfig;

/// Settings that would make the client misbehave; loading stops on these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigGuardRailError {
    #[error("server base URL '{url}' is invalid: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("server base URL must use http or https, got '{scheme}'")]
    UnsupportedScheme { scheme: String },

    #[error("{field} must be greater than zero")]
    ZeroValue { field: &'static str },

    #[error(
        "settle delay ({settle_ms} ms) must be shorter than the maximum poll duration ({max_ms} ms)"
    )]
    SettleExceedsCeiling { settle_ms: u64, max_ms: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(
        &mut self,
        message: S,
        hint: H,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigWarning> {
        self.items.iter()
    }
}

/// Polls faster than this are allowed but flagged.
const AGGRESSIVE_POLL_MS: u64 = 500;

pub fn apply_guard_rails(
    config: &ClientConfig,
) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();

    validate_base_url(&config.server.base_url, &mut warnings)?;

    if config.server.request_timeout_ms == 0 {
        return Err(ConfigGuardRailError::ZeroValue {
            field: "server.request_timeout_ms",
        });
    }

    let tracker = &config.tracker;
    if tracker.poll_interval_ms == 0 {
        return Err(ConfigGuardRailError::ZeroValue {
            field: "tracker.poll_interval_ms",
        });
    }
    if tracker.max_poll_ticks == Some(0) {
        return Err(ConfigGuardRailError::ZeroValue {
            field: "tracker.max_poll_ticks",
        });
    }

    match tracker.max_poll_duration_ms {
        Some(max_ms) if tracker.settle_delay_ms >= max_ms => {
            return Err(ConfigGuardRailError::SettleExceedsCeiling {
                settle_ms: tracker.settle_delay_ms,
                max_ms,
            });
        }
        None if tracker.max_poll_ticks.is_none() => {
            warnings.push_with_hint(
                "Polling has no upper bound; a stuck scan is tracked forever",
                "Set VIGIL_MAX_POLL_DURATION (e.g. 30m) or tracker.max_poll_ticks",
            );
        }
        _ => {}
    }

    if tracker.poll_interval_ms < AGGRESSIVE_POLL_MS {
        warnings.push(format!(
            "Poll interval of {} ms is aggressive and may load the scan service",
            tracker.poll_interval_ms
        ));
    }

    Ok(warnings)
}

fn validate_base_url(
    raw: &str,
    warnings: &mut ConfigWarnings,
) -> Result<(), ConfigGuardRailError> {
    let trimmed = raw.trim();
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        warnings.push_with_hint(
            format!("Server URL '{trimmed}' has no scheme; assuming http://"),
            "Write the URL in full, e.g. http://localhost:8000",
        );
        format!("http://{trimmed}")
    };

    let url = Url::parse(&candidate).map_err(|err| {
        ConfigGuardRailError::InvalidBaseUrl {
            url: raw.to_string(),
            reason: err.to_string(),
        }
    })?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ConfigGuardRailError::UnsupportedScheme {
                scheme: other.to_string(),
            });
        }
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(ConfigGuardRailError::InvalidBaseUrl {
            url: raw.to_string(),
            reason: "missing host".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_cleanly() {
        let warnings = apply_guard_rails(&ClientConfig::default()).unwrap();
        assert!(warnings.is_empty(), "{warnings:?}");
    }

    #[test]
    fn scheme_less_url_is_a_warning_not_an_error() {
        let mut config = ClientConfig::default();
        config.server.base_url = "localhost:8000".into();
        let warnings = apply_guard_rails(&config).unwrap();
        assert_eq!(warnings.items.len(), 1);
    }

    #[test]
    fn non_http_schemes_are_rejected() {
        let mut config = ClientConfig::default();
        config.server.base_url = "ftp://scanner".into();
        assert_eq!(
            apply_guard_rails(&config),
            Err(ConfigGuardRailError::UnsupportedScheme {
                scheme: "ftp".into()
            })
        );
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let mut config = ClientConfig::default();
        config.tracker.poll_interval_ms = 0;
        assert!(matches!(
            apply_guard_rails(&config),
            Err(ConfigGuardRailError::ZeroValue {
                field: "tracker.poll_interval_ms"
            })
        ));
    }

    #[test]
    fn settle_delay_must_fit_under_the_ceiling() {
        let mut config = ClientConfig::default();
        config.tracker.settle_delay_ms = 5_000;
        config.tracker.max_poll_duration_ms = Some(5_000);
        assert!(matches!(
            apply_guard_rails(&config),
            Err(ConfigGuardRailError::SettleExceedsCeiling { .. })
        ));
    }

    #[test]
    fn unbounded_polling_is_flagged() {
        let mut config = ClientConfig::default();
        config.tracker.max_poll_duration_ms = None;
        let warnings = apply_guard_rails(&config).unwrap();
        assert!(warnings.iter().any(|w| w.message.contains("no upper bound")));
    }
}
