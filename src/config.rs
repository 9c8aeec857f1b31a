//! Application configuration management.
//!
//! Settings are layered, later layers winning:
//!
//! 1. Built-in defaults
//! 2. The JSON config file (`config.json` in the platform config directory,
//!    or the file given with `--config`)
//! 3. `NMDEDUPE_*` environment variables (e.g. `NMDEDUPE_CONCURRENT_OPS=8`)
//! 4. Command-line flags
//!
//! ```json
//! {
//!   "refsFile": "/home/user/.local/share/nmdedupe/refs.json",
//!   "concurrentOps": 4,
//!   "minSize": 0,
//!   "treeDepth": 0,
//!   "consoleWidth": 80,
//!   "linkType": "hardlink"
//! }
//! ```

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::providers::{Env, Format, Json, Serialized};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::actions::LinkPolicy;

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "NMDEDUPE_";

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config file given explicitly does not exist.
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// A layer could not be parsed.
    #[error("Invalid configuration: {0}")]
    Extract(#[from] Box<figment::Error>),

    /// A value is out of range.
    #[error("Invalid value for {field}: {reason}")]
    Invalid {
        /// Offending setting
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// No home directory to derive default paths from.
    #[error("Failed to determine project directories")]
    NoProjectDirs,
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Reference store location; the platform data directory when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refs_file: Option<PathBuf>,
    /// Concurrent filesystem operations
    pub concurrent_ops: usize,
    /// Minimum package size in bytes for a group to be linked
    pub min_size: u64,
    /// Directory levels below each root to read (`0` = unlimited)
    pub tree_depth: usize,
    /// Width used to truncate progress messages
    pub console_width: usize,
    /// Kind of link to create
    pub link_type: LinkPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refs_file: None,
            concurrent_ops: 4,
            min_size: 0,
            tree_depth: 0,
            console_width: 80,
            link_type: LinkPolicy::Hardlink,
        }
    }
}

impl Config {
    /// Load configuration from `path` (or the default location) and the
    /// environment.
    ///
    /// A missing default config file is not an error; a missing explicit one
    /// is.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a layer cannot be parsed or a value is
    /// invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(p) if !p.exists() => return Err(ConfigError::NotFound(p.to_path_buf())),
            Some(p) => Some(p.to_path_buf()),
            None => default_config_file().ok().filter(|p| p.exists()),
        };

        let mut config = match &file {
            Some(p) => {
                log::debug!("Loading config from {}", p.display());
                Self::load_from_path(p)?
            }
            None => Self::default(),
        };

        ConfigOverrides::from_env()?.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Defaults merged with a single JSON file, without the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Extract`] if the file is not valid JSON or has
    /// values of the wrong type.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Json::file(path))
            .extract()
            .map_err(|e| ConfigError::Extract(Box::new(e)))
    }

    /// Reject values the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrent_ops == 0 {
            return Err(ConfigError::Invalid {
                field: "concurrentOps",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.console_width == 0 {
            return Err(ConfigError::Invalid {
                field: "consoleWidth",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// The reference store path: `refsFile`, or `refs.json` in the platform
    /// data directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoProjectDirs`] if no default can be derived.
    pub fn refs_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.refs_file {
            Some(path) => Ok(path.clone()),
            None => default_refs_file(),
        }
    }
}

/// Optional per-field overrides, from the environment or the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    /// Overrides `refsFile`
    pub refs_file: Option<PathBuf>,
    /// Overrides `concurrentOps`
    pub concurrent_ops: Option<usize>,
    /// Overrides `minSize`
    pub min_size: Option<u64>,
    /// Overrides `treeDepth`
    pub tree_depth: Option<usize>,
    /// Overrides `consoleWidth`
    pub console_width: Option<usize>,
    /// Overrides `linkType`
    pub link_type: Option<LinkPolicy>,
}

impl ConfigOverrides {
    /// Read `NMDEDUPE_*` variables, e.g. `NMDEDUPE_MIN_SIZE=1048576`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Extract`] if a variable has the wrong type.
    pub fn from_env() -> Result<Self, ConfigError> {
        Figment::from(Env::prefixed(ENV_PREFIX))
            .extract()
            .map_err(|e| ConfigError::Extract(Box::new(e)))
    }

    /// Overwrite every field of `config` that is set here.
    pub fn apply(&self, config: &mut Config) {
        if let Some(path) = &self.refs_file {
            config.refs_file = Some(path.clone());
        }
        if let Some(ops) = self.concurrent_ops {
            config.concurrent_ops = ops;
        }
        if let Some(size) = self.min_size {
            config.min_size = size;
        }
        if let Some(depth) = self.tree_depth {
            config.tree_depth = depth;
        }
        if let Some(width) = self.console_width {
            config.console_width = width;
        }
        if let Some(link_type) = self.link_type {
            config.link_type = link_type;
        }
    }
}

fn project_dirs() -> Result<ProjectDirs, ConfigError> {
    ProjectDirs::from("com", "nmdedupe", "nmdedupe").ok_or(ConfigError::NoProjectDirs)
}

/// Default config file location.
///
/// # Errors
///
/// Returns [`ConfigError::NoProjectDirs`] without a home directory.
pub fn default_config_file() -> Result<PathBuf, ConfigError> {
    Ok(project_dirs()?.config_dir().join("config.json"))
}

/// Default reference store location.
///
/// # Errors
///
/// Returns [`ConfigError::NoProjectDirs`] without a home directory.
pub fn default_refs_file() -> Result<PathBuf, ConfigError> {
    Ok(project_dirs()?.data_dir().join("refs.json"))
}
