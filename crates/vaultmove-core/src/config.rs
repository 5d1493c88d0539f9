//! Move configuration types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

impl From<MoveConfigBuilderError> for ConfigError {
    fn from(err: MoveConfigBuilderError) -> Self {
        Self::Invalid {
            message: err.to_string(),
        }
    }
}

/// Configuration for verified moves.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
#[serde(default)]
pub struct MoveConfig {
    /// Transfer tool executable.
    #[builder(default = "PathBuf::from(\"rclone\")")]
    pub program: PathBuf,

    /// Arguments placed before every subcommand (e.g. `--config <file>`).
    #[builder(default)]
    pub global_args: Vec<String>,

    /// Name of the configured remote, without the trailing `:`.
    #[builder(default = "\"gdrive\".to_string()")]
    pub remote_name: String,

    /// Folder on the remote that receives moved folders.
    #[builder(default = "\"archived\".to_string()")]
    pub archive_folder: String,

    /// Parallel file transfers within one copy.
    #[builder(default = "4")]
    pub transfers: u32,

    /// Interval between status lines from the transfer tool.
    #[builder(default = "\"2s\".to_string()")]
    pub stats_interval: String,

    /// Extra tuning flags appended to every copy.
    #[builder(default)]
    pub copy_flags: Vec<String>,

    /// Report deletion progress every this many files.
    #[builder(default = "100")]
    pub delete_progress_interval: usize,

    /// Ignore file to load at batch start (None = default location).
    #[builder(default, setter(into, strip_option))]
    pub ignore_file: Option<PathBuf>,

    /// Check the transfer tool configuration before a batch starts.
    #[builder(default = "true")]
    pub preflight: bool,

    /// Upper bound for each configuration-check command.
    #[builder(default = "30")]
    pub preflight_timeout_secs: u64,
}

impl MoveConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        check_fields(
            self.program.as_deref(),
            self.remote_name.as_deref(),
            self.transfers,
            self.delete_progress_interval,
        )
    }
}

fn check_fields(
    program: Option<&Path>,
    remote_name: Option<&str>,
    transfers: Option<u32>,
    delete_progress_interval: Option<usize>,
) -> Result<(), String> {
    if program.is_some_and(|p| p.as_os_str().is_empty()) {
        return Err("Transfer tool program cannot be empty".to_string());
    }
    if remote_name.is_some_and(|r| r.trim_end_matches(':').is_empty()) {
        return Err("Remote name cannot be empty".to_string());
    }
    if transfers == Some(0) {
        return Err("transfers must be at least 1".to_string());
    }
    if delete_progress_interval == Some(0) {
        return Err("delete_progress_interval must be at least 1".to_string());
    }
    Ok(())
}

impl MoveConfig {
    /// Create a new config builder.
    pub fn builder() -> MoveConfigBuilder {
        MoveConfigBuilder::default()
    }

    /// Default location of the config file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("vaultmove").join("config.toml"))
    }

    /// Default location of the ignore file.
    pub fn default_ignore_file() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("vaultmove").join(".rcloneignore"))
    }

    /// Load a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load an explicit config file, or the default one if it exists.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    /// Check field values of a deserialised config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_fields(
            Some(&self.program),
            Some(&self.remote_name),
            Some(self.transfers),
            Some(self.delete_progress_interval),
        )
        .map_err(|message| ConfigError::Invalid { message })
    }

    /// The remote root, e.g. `gdrive:`.
    pub fn remote_root(&self) -> String {
        format!("{}:", self.remote_name.trim_end_matches(':'))
    }

    /// Remote destination for a local folder: `<remote>:<archive>/<basename>`.
    ///
    /// Returns None for paths without a base name (e.g. `/`).
    pub fn destination_for(&self, folder: &Path) -> Option<String> {
        let name = folder.file_name()?.to_string_lossy();
        let archive = self.archive_folder.trim_matches('/');
        if archive.is_empty() {
            Some(format!("{}{name}", self.remote_root()))
        } else {
            Some(format!("{}{archive}/{name}", self.remote_root()))
        }
    }

    /// The ignore file to use for a batch.
    pub fn ignore_file_path(&self) -> Option<PathBuf> {
        self.ignore_file.clone().or_else(Self::default_ignore_file)
    }

    pub fn preflight_timeout(&self) -> Duration {
        Duration::from_secs(self.preflight_timeout_secs)
    }
}

impl Default for MoveConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("rclone"),
            global_args: Vec::new(),
            remote_name: "gdrive".to_string(),
            archive_folder: "archived".to_string(),
            transfers: 4,
            stats_interval: "2s".to_string(),
            copy_flags: Vec::new(),
            delete_progress_interval: 100,
            ignore_file: None,
            preflight: true,
            preflight_timeout_secs: 30,
        }
    }
}
