//! Locating and layering `cairn.toml` files.
//!
//! Two layers are read, the later one winning section by section:
//! 1. the user layer, `$CAIRN_CONFIG_DIR/config.toml` or the platform config
//!    dir (`~/.config/cairn/config.toml` on Linux)
//! 2. the project layer, `<project>/cairn.toml`
//!
//! A relative `memory.snapshot` is anchored to the directory of the file
//! that set it, so `snapshot = "graph.db"` in a project file always points
//! next to that file regardless of the process working directory.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::{CairnConfig, ConfigError, Result};

const PROJECT_CONFIG_FILE: &str = "cairn.toml";
const USER_CONFIG_FILE: &str = "config.toml";
const APP_NAME: &str = "cairn";
const CONFIG_DIR_ENV: &str = "CAIRN_CONFIG_DIR";

/// Which layer a config file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerScope {
    User,
    Project,
}

impl fmt::Display for LayerScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Project => f.write_str("project"),
        }
    }
}

/// One config file that discovery looked at.
#[derive(Debug, Clone)]
pub struct ConfigLayer {
    pub scope: LayerScope,
    pub path: PathBuf,
    /// Set when the file existed and parsed.
    pub loaded: bool,
}

/// Outcome of discovery: the merged config plus how it was assembled.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: CairnConfig,
    /// Layers in precedence order, lowest first.
    pub layers: Vec<ConfigLayer>,
    /// Problems that were skipped over: unreadable layers, out-of-range values.
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Paths of the layers that contributed.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.layers
            .iter()
            .filter(|l| l.loaded)
            .map(|l| l.path.as_path())
            .collect()
    }
}

/// Discover and merge the user and project layers.
///
/// `project_dir` defaults to the current directory.
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(project_dir, None)
}

/// Like [`load_config`], with the user config directory given explicitly.
///
/// `config_dir` takes precedence over `CAIRN_CONFIG_DIR` and the platform
/// default.
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
) -> Result<LoadedConfig> {
    let mut config = CairnConfig::new();
    let mut layers = Vec::new();
    let mut warnings = Vec::new();

    let user_path = match config_dir {
        Some(dir) => Some(dir.join(USER_CONFIG_FILE)),
        None => user_config_path(),
    };
    if let Some(path) = user_path {
        layers.push(merge_layer(&mut config, LayerScope::User, path, &mut warnings));
    }

    let project_path = project_dir
        .map(|d| d.join(PROJECT_CONFIG_FILE))
        .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));
    layers.push(merge_layer(
        &mut config,
        LayerScope::Project,
        project_path,
        &mut warnings,
    ));

    if let Err(e) = config.validate() {
        warnings.push(format!("merged config is invalid, using defaults: {}", e));
        config = CairnConfig::new();
    }

    Ok(LoadedConfig {
        config,
        layers,
        warnings,
    })
}

/// Read one config file without discovery.
///
/// A relative snapshot path is anchored to the file's directory.
pub fn load_config_file(path: &Path) -> Result<CairnConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    let mut config = CairnConfig::from_toml(&contents)?;
    if let Some(dir) = path.parent() {
        anchor_snapshot(&mut config, dir);
    }
    Ok(config)
}

/// The user config file, `<user config dir>/config.toml`.
pub fn user_config_path() -> Option<PathBuf> {
    user_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// `CAIRN_CONFIG_DIR` when set and non-empty, else `<platform config dir>/cairn`.
pub fn user_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

fn merge_layer(
    config: &mut CairnConfig,
    scope: LayerScope,
    path: PathBuf,
    warnings: &mut Vec<String>,
) -> ConfigLayer {
    let loaded = path.is_file()
        && match load_config_file(&path) {
            Ok(layer) => {
                config.merge(layer);
                true
            }
            Err(e) => {
                warnings.push(format!("skipping {} config {}: {}", scope, path.display(), e));
                false
            }
        };
    ConfigLayer {
        scope,
        path,
        loaded,
    }
}

fn anchor_snapshot(config: &mut CairnConfig, dir: &Path) {
    if let Some(memory) = config.memory.as_mut()
        && let Some(snapshot) = memory.snapshot.as_mut()
        && snapshot.is_relative()
    {
        *snapshot = dir.join(&*snapshot);
    }
}
