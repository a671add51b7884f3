use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use vigil_core::{GatewayConfig, TrackerConfig};

/// Where the file-level configuration came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    #[default]
    Default,
    /// Path passed on the command line.
    Explicit(PathBuf),
    /// `$VIGIL_CONFIG_PATH`.
    EnvPath(PathBuf),
    /// `$VIGIL_CONFIG_JSON`.
    EnvInline,
    /// One of the default locations, e.g. `vigil.toml`.
    File(PathBuf),
}

/// Everything the client needs to reach the service and track scans.
///
/// ```toml
/// [server]
/// base_url = "http://localhost:8000"
/// request_timeout_ms = 10000
///
/// [tracker]
/// poll_interval_ms = 2000
/// settle_delay_ms = 1000
/// max_poll_duration_ms = 1800000
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Service address and request timeout.
    pub server: GatewayConfig,
    /// Poll cadence, settle delay and polling ceilings.
    pub tracker: TrackerConfig,
}

impl ClientConfig {
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path).with_context(|| {
            format!("failed to read client config from {}", path.display())
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::parse_json(&contents).with_context(|| {
                format!("invalid client config {}", path.display())
            }),
            Some("toml") => toml::from_str(&contents).map_err(|err| {
                anyhow!("invalid client config {}: {}", path.display(), err)
            }),
            _ => Self::parse_from_str(&contents, &path.display().to_string()),
        }
    }

    /// Parse TOML, falling back to JSON.
    pub fn parse_from_str(contents: &str, origin: &str) -> anyhow::Result<Self> {
        toml::from_str(contents).or_else(|toml_err| {
            serde_json::from_str(contents).map_err(|json_err| {
                anyhow!(
                    "failed to parse client config {}: toml error: {}; json error: {}",
                    origin,
                    toml_err,
                    json_err
                )
            })
        })
    }

    pub fn parse_json(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw)
            .map_err(|err| anyhow!("invalid client config json: {err}"))
    }

    /// Render as TOML, e.g. for `vigilctl config`.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("failed to render config as TOML")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = ClientConfig::parse_from_str(
            "[server]\nbase_url = \"http://scanner:8000\"\n",
            "inline",
        )
        .unwrap();
        assert_eq!(config.server.base_url, "http://scanner:8000");
        assert_eq!(config.server.request_timeout_ms, 10_000);
        assert_eq!(config.tracker, TrackerConfig::default());
    }

    #[test]
    fn json_is_accepted_when_toml_fails() {
        let config = ClientConfig::parse_from_str(
            r#"{"tracker": {"poll_interval_ms": 500}}"#,
            "inline",
        )
        .unwrap();
        assert_eq!(config.tracker.poll_interval_ms, 500);
    }

    #[test]
    fn garbage_reports_both_parsers() {
        let err = ClientConfig::parse_from_str("{{nope", "inline").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("toml error"), "{message}");
        assert!(message.contains("json error"), "{message}");
    }
}
