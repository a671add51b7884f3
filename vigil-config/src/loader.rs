use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::ConfigLoadError;
use crate::models::{ClientConfig, ConfigSource};
use crate::util::{duration_ms, parse_duration, parse_optional_duration};
use crate::validation::{ConfigWarnings, apply_guard_rails};

pub const ENV_CONFIG_PATH: &str = "VIGIL_CONFIG_PATH";
pub const ENV_CONFIG_JSON: &str = "VIGIL_CONFIG_JSON";
pub const ENV_API_URL: &str = "VIGIL_API_URL";
pub const ENV_REQUEST_TIMEOUT: &str = "VIGIL_REQUEST_TIMEOUT";
pub const ENV_POLL_INTERVAL: &str = "VIGIL_POLL_INTERVAL";
pub const ENV_MAX_POLL_DURATION: &str = "VIGIL_MAX_POLL_DURATION";

const DEFAULT_CONFIG_LOCATIONS: &[&str] = &[
    "vigil.toml",
    "vigil.json",
    "config/vigil.toml",
    "config/vigil.json",
];

/// The `VIGIL_*` variables visible to the loader.
///
/// Captured once so resolution is a pure function of its inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
}

impl EnvSnapshot {
    /// Capture the relevant variables from the process environment.
    pub fn capture() -> Self {
        let vars = [
            ENV_CONFIG_PATH,
            ENV_CONFIG_JSON,
            ENV_API_URL,
            ENV_REQUEST_TIMEOUT,
            ENV_POLL_INTERVAL,
            ENV_MAX_POLL_DURATION,
        ]
        .into_iter()
        .filter_map(|name| {
            std::env::var(name).ok().map(|value| (name.to_string(), value))
        })
        .collect();
        Self { vars }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Non-blank value of `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }
}

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    /// Config file given on the command line; must exist.
    pub config_path: Option<PathBuf>,
    /// `.env` file to load instead of the one in the working directory.
    pub env_file: Option<PathBuf>,
    /// Base URL given on the command line; beats every other source.
    pub server_override: Option<String>,
    /// Directory searched for default config files. Defaults to the working
    /// directory.
    pub search_dir: Option<PathBuf>,
}

/// Resolved configuration plus how it was obtained.
#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: ClientConfig,
    pub source: ConfigSource,
    pub warnings: ConfigWarnings,
    pub env_file_loaded: bool,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    pub fn with_server_override(mut self, base_url: impl Into<String>) -> Self {
        self.options.server_override = Some(base_url.into());
        self
    }

    pub fn with_search_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.options.search_dir = Some(dir.into());
        self
    }

    /// Load `.env`, read the process environment and resolve.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = self.load_env_file()?;
        let mut load = self.resolve(&EnvSnapshot::capture())?;
        load.env_file_loaded = env_file_loaded;
        Ok(load)
    }

    /// Resolve against an explicit environment snapshot.
    ///
    /// Order: file (explicit path, `$VIGIL_CONFIG_PATH`, `$VIGIL_CONFIG_JSON`,
    /// default locations), then `VIGIL_*` overrides, then the command-line
    /// server override. Guard rails run last.
    pub fn resolve(&self, env: &EnvSnapshot) -> Result<ConfigLoad, ConfigLoadError> {
        let (mut config, source) = self.load_base(env)?;
        apply_env_overrides(&mut config, env)?;

        if let Some(server) = self
            .options
            .server_override
            .as_deref()
            .filter(|s| !s.trim().is_empty())
        {
            debug!(server, "base URL overridden from command line");
            config.server.base_url = server.trim().to_string();
        }

        let warnings = apply_guard_rails(&config)?;
        info!(
            source = ?source,
            base_url = %config.server.base_url,
            poll_interval_ms = config.tracker.poll_interval_ms,
            "client configuration resolved"
        );

        Ok(ConfigLoad {
            config,
            source,
            warnings,
            env_file_loaded: false,
        })
    }

    fn load_env_file(&self) -> Result<bool, ConfigLoadError> {
        let loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true),
            None => dotenvy::dotenv().map(|_| true),
        };
        loaded.or_else(|err| match err {
            dotenvy::Error::Io(_) => Ok(false),
            other => Err(ConfigLoadError::EnvFile(other)),
        })
    }

    fn load_base(
        &self,
        env: &EnvSnapshot,
    ) -> Result<(ClientConfig, ConfigSource), ConfigLoadError> {
        if let Some(path) = &self.options.config_path {
            let config = read_file(path)?;
            return Ok((config, ConfigSource::Explicit(path.clone())));
        }

        if let Some(raw) = env.get(ENV_CONFIG_PATH) {
            let path = PathBuf::from(raw);
            let config = read_file(&path)?;
            return Ok((config, ConfigSource::EnvPath(path)));
        }

        if let Some(raw) = env.get(ENV_CONFIG_JSON) {
            let config = ClientConfig::parse_json(raw).map_err(|err| {
                ConfigLoadError::Parse(err.context("failed to parse VIGIL_CONFIG_JSON"))
            })?;
            return Ok((config, ConfigSource::EnvInline));
        }

        if let Some(path) = self.find_default_file() {
            let config = read_file(&path)?;
            return Ok((config, ConfigSource::File(path)));
        }

        Ok((ClientConfig::default(), ConfigSource::Default))
    }

    fn find_default_file(&self) -> Option<PathBuf> {
        let base = self
            .options
            .search_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        DEFAULT_CONFIG_LOCATIONS
            .iter()
            .map(|candidate| base.join(candidate))
            .find(|path| path.is_file())
    }
}

fn read_file(path: &Path) -> Result<ClientConfig, ConfigLoadError> {
    if !path.exists() {
        return Err(ConfigLoadError::MissingConfig {
            path: path.to_path_buf(),
        });
    }
    ClientConfig::load_from_file(path).map_err(ConfigLoadError::Parse)
}

fn apply_env_overrides(
    config: &mut ClientConfig,
    env: &EnvSnapshot,
) -> Result<(), ConfigLoadError> {
    if let Some(url) = env.get(ENV_API_URL) {
        config.server.base_url = url.trim().to_string();
    }

    if let Some(raw) = env.get(ENV_REQUEST_TIMEOUT) {
        let timeout = parse_duration(raw).map_err(|reason| invalid(ENV_REQUEST_TIMEOUT, raw, reason))?;
        config.server.request_timeout_ms = duration_ms(timeout);
    }

    if let Some(raw) = env.get(ENV_POLL_INTERVAL) {
        let interval = parse_duration(raw).map_err(|reason| invalid(ENV_POLL_INTERVAL, raw, reason))?;
        config.tracker.poll_interval_ms = duration_ms(interval);
    }

    if let Some(raw) = env.get(ENV_MAX_POLL_DURATION) {
        let limit = parse_optional_duration(raw)
            .map_err(|reason| invalid(ENV_MAX_POLL_DURATION, raw, reason))?;
        config.tracker.max_poll_duration_ms = limit.map(duration_ms);
    }

    Ok(())
}

fn invalid(name: &'static str, value: &str, reason: String) -> ConfigLoadError {
    ConfigLoadError::InvalidEnv {
        name,
        value: value.to_string(),
        reason,
    }
}
