use std::path::PathBuf;

use thiserror::Error;

use crate::validation::ConfigGuardRailError;

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("config file {} does not exist", .path.display())]
    MissingConfig { path: PathBuf },

    #[error("failed to read config file {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[source] anyhow::Error),

    #[error("invalid value for {name}: '{value}' ({reason})")]
    InvalidEnv {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    GuardRail(#[from] ConfigGuardRailError),

    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}
