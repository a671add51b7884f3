//! Configuration for the Vigil scan client.
//!
//! Settings come from (lowest to highest precedence) built-in defaults, a
//! TOML or JSON file, `VIGIL_*` environment variables and finally explicit
//! overrides from the command line. The result is checked by guard rails
//! before anything talks to the network.
#![allow(missing_docs)]

pub mod error;
pub mod loader;
pub mod models;
pub mod util;
pub mod validation;

pub use error::ConfigLoadError;
pub use loader::{ConfigLoad, ConfigLoader, ConfigLoaderOptions, EnvSnapshot};
pub use models::{ClientConfig, ConfigSource};
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings};
