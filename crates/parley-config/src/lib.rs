//! parley configuration system.
//!
//! TOML-based configuration with full validation. All sections use
//! sensible defaults so partial configs work out of the box.
//!
//! ```rust,no_run
//! let config = parley_config::load_config(None).expect("failed to load config");
//! println!("listening on {}", config.server.port);
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{ParleyConfig, CONFIG_SCHEMA_VERSION};

use parley_common::ConfigError;
use std::path::Path;

/// Load config from an explicit path, or from the platform default location.
///
/// An explicit path must exist. The default location is created with
/// commented defaults on first run.
pub fn load_config(path: Option<&Path>) -> Result<ParleyConfig, ConfigError> {
    match path {
        Some(path) => toml_loader::load_from_path(path),
        None => toml_loader::load_default(),
    }
}
