//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/nestset/nestset.toml`
//! 3. Local config: `./.nestset.toml`, or the file given with `--config`
//! 4. Environment variables: `NESTSET_*` prefix, `__` between sections

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::application::ApplicationError;

/// Repair pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RepairSettings {
    /// Rows fetched per cursor page while streaming a group
    pub page_size: usize,
    /// Tokens per chunk when re-nesting
    pub chunk_size: usize,
    /// Reparent extra roots under the first root instead of failing
    pub adopt_extra_roots: bool,
}

impl Default for RepairSettings {
    fn default() -> Self {
        Self {
            page_size: 1000,
            chunk_size: 100,
            adopt_extra_roots: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InspectSettings {
    pub page_size: usize,
    /// Groups with more rows than this are checked through the token codec
    pub codec_threshold: usize,
}

impl Default for InspectSettings {
    fn default() -> Self {
        Self {
            page_size: 1000,
            codec_threshold: 10_000,
        }
    }
}

/// Raw settings for intermediate parsing (`None` means "not specified").
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub database: Option<PathBuf>,
    pub entity: Option<String>,
    pub repair: RawRepairSettings,
    pub inspect: RawInspectSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawRepairSettings {
    pub page_size: Option<usize>,
    pub chunk_size: Option<usize>,
    pub adopt_extra_roots: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawInspectSettings {
    pub page_size: Option<usize>,
    pub codec_threshold: Option<usize>,
}

/// Unified configuration for nestset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// SQLite database file
    pub database: PathBuf,
    /// Table holding the tree rows
    pub entity: String,
    pub repair: RepairSettings,
    pub inspect: InspectSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: default_database_path(),
            entity: "nodes".to_string(),
            repair: RepairSettings::default(),
            inspect: InspectSettings::default(),
        }
    }
}

fn default_database_path() -> PathBuf {
    ProjectDirs::from("", "", "nestset")
        .map(|dirs| dirs.data_dir().join("nestset.db"))
        .unwrap_or_else(|| PathBuf::from("nestset.db"))
}

/// Get the XDG config directory for nestset.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "nestset").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("nestset.toml"))
}

/// Get the path to the local config file in a directory.
pub fn local_config_path(dir: &Path) -> PathBuf {
    dir.join(".nestset.toml")
}

/// Expand `~`, `$VAR` and `${VAR}`; unresolvable input is kept verbatim.
pub fn expand_env_vars(path: &str) -> String {
    shellexpand::full(path)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| path.to_string())
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

impl Settings {
    fn expand_paths(&mut self) {
        let expanded = expand_env_vars(self.database.to_string_lossy().as_ref());
        self.database = PathBuf::from(expanded);
    }

    /// Overlay wins wherever it specifies a value.
    fn merge_with(&self, overlay: &RawSettings) -> Self {
        Self {
            database: overlay
                .database
                .clone()
                .unwrap_or_else(|| self.database.clone()),
            entity: overlay
                .entity
                .clone()
                .unwrap_or_else(|| self.entity.clone()),
            repair: RepairSettings {
                page_size: overlay.repair.page_size.unwrap_or(self.repair.page_size),
                chunk_size: overlay.repair.chunk_size.unwrap_or(self.repair.chunk_size),
                adopt_extra_roots: overlay
                    .repair
                    .adopt_extra_roots
                    .unwrap_or(self.repair.adopt_extra_roots),
            },
            inspect: InspectSettings {
                page_size: overlay.inspect.page_size.unwrap_or(self.inspect.page_size),
                codec_threshold: overlay
                    .inspect
                    .codec_threshold
                    .unwrap_or(self.inspect.codec_threshold),
            },
        }
    }

    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `config_file` - Explicit local config; must exist when given.
    ///   Without it `./.nestset.toml` is used if present.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ApplicationError> {
        // 1. Start with defaults
        let mut current = Self::default();

        // 2. Global config
        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                current = current.merge_with(&load_raw_settings(&global_path)?);
            }
        }

        // 3. Local config
        match config_file {
            Some(path) => {
                if !path.exists() {
                    return Err(ApplicationError::Config {
                        message: format!("config file not found: {}", path.display()),
                    });
                }
                current = current.merge_with(&load_raw_settings(path)?);
            }
            None => {
                let local_path = local_config_path(Path::new("."));
                if local_path.exists() {
                    current = current.merge_with(&load_raw_settings(&local_path)?);
                }
            }
        }

        // 4. Environment variables
        current = Self::apply_env_overrides(current, None)?;

        current.expand_paths();
        current.validate()?;
        Ok(current)
    }

    /// Apply NESTSET_* environment variables as explicit overrides.
    ///
    /// `source` replaces the process environment (used by tests).
    pub fn apply_env_overrides(
        mut settings: Self,
        source: Option<HashMap<String, String>>,
    ) -> Result<Self, ApplicationError> {
        let config = Config::builder()
            .add_source(
                Environment::with_prefix("NESTSET")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(source),
            )
            .build()
            .map_err(config_err)?;

        if let Ok(val) = config.get_string("database") {
            settings.database = PathBuf::from(val);
        }
        if let Ok(val) = config.get_string("entity") {
            settings.entity = val;
        }
        if let Some(val) = get_opt::<usize>(&config, "repair.page_size")? {
            settings.repair.page_size = val;
        }
        if let Some(val) = get_opt::<usize>(&config, "repair.chunk_size")? {
            settings.repair.chunk_size = val;
        }
        if let Some(val) = get_opt::<bool>(&config, "repair.adopt_extra_roots")? {
            settings.repair.adopt_extra_roots = val;
        }
        if let Some(val) = get_opt::<usize>(&config, "inspect.page_size")? {
            settings.inspect.page_size = val;
        }
        if let Some(val) = get_opt::<usize>(&config, "inspect.codec_threshold")? {
            settings.inspect.codec_threshold = val;
        }
        Ok(settings)
    }

    /// Reject values the services cannot run with.
    pub fn validate(&self) -> Result<(), ApplicationError> {
        let sizes = [
            ("repair.page_size", self.repair.page_size),
            ("repair.chunk_size", self.repair.chunk_size),
            ("inspect.page_size", self.inspect.page_size),
        ];
        for (key, value) in sizes {
            if value == 0 {
                return Err(ApplicationError::Config {
                    message: format!("{key} must be greater than 0"),
                });
            }
        }
        if self.entity.trim().is_empty() {
            return Err(ApplicationError::Config {
                message: "entity must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# nestset configuration
#
# Locations (by precedence, lowest to highest):
#   Global: ~/.config/nestset/nestset.toml
#   Local:  ./.nestset.toml (or --config <file>)
#   Env:    NESTSET_* environment variables, e.g. NESTSET_REPAIR__CHUNK_SIZE=50

# SQLite database file
# database = "~/.local/share/nestset/nestset.db"

# Table holding the tree rows
# entity = "nodes"

[repair]
# page_size = 1000
# chunk_size = 100
# adopt_extra_roots = false

[inspect]
# page_size = 1000
# codec_threshold = 10000
"#
        .to_string()
    }
}

/// Missing keys are `None`; present but malformed values are errors.
fn get_opt<T: serde::de::DeserializeOwned>(
    config: &Config,
    key: &str,
) -> Result<Option<T>, ApplicationError> {
    match config.get::<T>(key) {
        Ok(value) => Ok(Some(value)),
        Err(ConfigError::NotFound(_)) => Ok(None),
        Err(e) => Err(ApplicationError::Config {
            message: format!("{key}: {e}"),
        }),
    }
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}
