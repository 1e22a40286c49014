//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/bomroute/bomroute.toml`
//! 3. Local config: `<project_dir>/.bomroute.toml`
//! 4. Environment variables: `BOMROUTE_*` prefix

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::application::ApplicationError;
use crate::domain::DependencyGate;

/// Feedback settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NotifyConfig {
    /// Only report failures
    pub quiet: bool,
}

/// Application settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// TOML document holding BOM and routes
    pub store_path: PathBuf,
    /// Unit of measure used when `bom add` is given none
    pub default_uom: String,
    /// Gate applied to new steps when none is given
    pub default_gate: DependencyGate,
    #[serde(default)]
    pub notify: NotifyConfig,
}

/// Settings as read from one file; `None` means "not specified here".
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub store_path: Option<PathBuf>,
    pub default_uom: Option<String>,
    pub default_gate: Option<DependencyGate>,
    pub notify: RawNotifyConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawNotifyConfig {
    pub quiet: Option<bool>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("bomroute.toml"),
            default_uom: "ea".into(),
            default_gate: DependencyGate::Completed,
            notify: NotifyConfig::default(),
        }
    }
}

/// Get the XDG config directory for bomroute.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "bomroute").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("bomroute.toml"))
}

/// Get the path to the local config file in a project directory.
pub fn local_config_path(project_dir: &Path) -> PathBuf {
    project_dir.join(".bomroute.toml")
}

fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

/// Expand `~`, `$VAR` and `${VAR}`; unknown variables leave the input as is.
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match shellexpand::full(raw.as_ref()) {
        Ok(expanded) => PathBuf::from(expanded.into_owned()),
        Err(_) => path.to_path_buf(),
    }
}

impl Settings {
    fn expand_paths(&mut self) {
        self.store_path = expand_path(&self.store_path);
    }

    /// Overlay wins wherever it specifies a value.
    fn merge_with(&self, overlay: &RawSettings) -> Self {
        Self {
            store_path: overlay
                .store_path
                .clone()
                .unwrap_or_else(|| self.store_path.clone()),
            default_uom: overlay
                .default_uom
                .clone()
                .unwrap_or_else(|| self.default_uom.clone()),
            default_gate: overlay.default_gate.unwrap_or(self.default_gate),
            notify: NotifyConfig {
                quiet: overlay.notify.quiet.unwrap_or(self.notify.quiet),
            },
        }
    }

    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `project_dir` - Optional project directory for local config
    ///
    /// A relative `store_path` from the local config is taken relative to
    /// `project_dir`.
    pub fn load(project_dir: Option<&Path>) -> Result<Self, ApplicationError> {
        let mut current = Self::default();

        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                let raw = load_raw_settings(&global_path)?;
                current = current.merge_with(&raw);
            }
        }

        if let Some(dir) = project_dir {
            let local_path = local_config_path(dir);
            if local_path.exists() {
                let mut raw = load_raw_settings(&local_path)?;
                raw.store_path = raw.store_path.map(|p| {
                    let p = expand_path(&p);
                    if p.is_relative() {
                        dir.join(p)
                    } else {
                        p
                    }
                });
                current = current.merge_with(&raw);
            }
        }

        current = Self::apply_env_overrides(current)?;
        current.expand_paths();
        Ok(current)
    }

    /// Apply BOMROUTE_* environment variables as explicit overrides.
    fn apply_env_overrides(mut settings: Self) -> Result<Self, ApplicationError> {
        let config = Config::builder()
            .add_source(
                Environment::with_prefix("BOMROUTE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(config_err)?;

        if let Ok(val) = config.get_string("store_path") {
            settings.store_path = PathBuf::from(val);
        }
        if let Ok(val) = config.get_string("default_uom") {
            settings.default_uom = val;
        }
        if let Ok(val) = config.get_string("default_gate") {
            settings.default_gate = parse_gate(&val)?;
        }
        if let Ok(val) = config.get_bool("notify.quiet") {
            settings.notify.quiet = val;
        }
        Ok(settings)
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# bomroute configuration
#
# Locations (by precedence, lowest to highest):
#   Global: ~/.config/bomroute/bomroute.toml
#   Local:  <project_dir>/.bomroute.toml
#   Env:    BOMROUTE_* environment variables (e.g. BOMROUTE_STORE_PATH)

# TOML document holding the BOM and all routes
# store_path = "bomroute.toml"

# Unit of measure for new BOM items
# default_uom = "ea"

# When a new step may start: "completed" or "in_progress"
# default_gate = "completed"

[notify]
# Only report failures
# quiet = false
"#
        .to_string()
    }
}

fn parse_gate(value: &str) -> Result<DependencyGate, ApplicationError> {
    match value {
        "completed" => Ok(DependencyGate::Completed),
        "in_progress" => Ok(DependencyGate::InProgress),
        other => Err(ApplicationError::Config {
            message: format!("default_gate must be completed or in_progress, got {other}"),
        }),
    }
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}
