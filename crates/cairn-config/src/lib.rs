//! Configuration system for the Cairn knowledge-graph memory.
//!
//! Provides TOML-based configuration with:
//! - Per-relationship-kind decay tables (`[memory.decay.kinds.<kind>]`)
//! - Inference thresholds and MOC defaults
//! - Logging filter settings
//! - Config file layering (XDG user config + project-local overrides)

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    load_config, load_config_file, load_config_with_options, user_config_dir, user_config_path,
    ConfigLayer, LayerScope, LoadedConfig,
};
pub use error::{ConfigError, Result};
pub use types::*;
