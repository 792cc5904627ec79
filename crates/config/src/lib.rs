//! Layered configuration for shelf.
//!
//! Values come from, in increasing priority: built-in defaults rooted in the
//! platform data directory, a TOML file, and `SHELF_`-prefixed environment
//! variables using `__` to reach nested keys (`SHELF_COVERS__CONCURRENCY=8`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "SHELF_";
const CONFIG_FILE_NAME: &str = "config.toml";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "shelf")
}

fn data_dir() -> PathBuf {
    project_dirs().map(|dirs| dirs.data_dir().to_path_buf()).unwrap_or_else(|| PathBuf::from(".shelf"))
}

/// Where a config file is looked for when none is given explicitly.
pub fn default_config_file() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub covers: CoverConfig,
    pub export: ExportConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// The live library database (`SHELF_STORE__PATH`).
    pub path: PathBuf,
    /// The single trash slot a reset moves the store into (`SHELF_STORE__TRASH`).
    pub trash: PathBuf,
}
impl Default for StoreConfig {
    fn default() -> Self {
        let data = data_dir();
        Self { path: data.join("library.db"), trash: data.join("trash").join("library.db") }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CoverConfig {
    /// Directory holding cached cover images.
    pub directory: PathBuf,
    /// Pause before the single retry of failed downloads.
    pub retry_delay_ms: u64,
    /// Downloads in flight at once.
    pub concurrency: usize,
    pub user_agent: String,
}
impl Default for CoverConfig {
    fn default() -> Self {
        Self {
            directory: data_dir().join("covers"),
            retry_delay_ms: 1500,
            concurrency: 4,
            user_agent: concat!("shelf/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}
impl CoverConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Name given to snapshots when the caller doesn't pick one.
    pub file_name: String,
    /// Defaults to the system temporary directory.
    pub staging_dir: Option<PathBuf>,
}
impl Default for ExportConfig {
    fn default() -> Self {
        Self { file_name: "library_backup.db".to_string(), staging_dir: None }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// An `EnvFilter` directive, used when `RUST_LOG` isn't set.
    pub level: String,
}
impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

impl Config {
    /// Build the provider stack without extracting it.
    ///
    /// An explicit `file` must exist; the default location is optional.
    pub fn figment(file: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        match file {
            Some(path) => {
                if !path.is_file() {
                    exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
                }
                figment = figment.merge(Toml::file_exact(path));
            },
            None => {
                if let Some(path) = default_config_file() {
                    figment = figment.merge(Toml::file(path));
                }
            },
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Load, resolve and validate the configuration.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let config: Self = Self::figment(file)?.extract().or_raise(|| ErrorKind::Load)?;
        let config = config.resolve()?;
        config.validate()?;
        tracing::debug!(store = %config.store.path.display(), covers = %config.covers.directory.display(), "Configuration loaded");
        Ok(config)
    }

    /// Make every path absolute against the working directory.
    fn resolve(mut self) -> Result<Self> {
        for path in [&mut self.store.path, &mut self.store.trash, &mut self.covers.directory] {
            *path = absolute(path)?;
        }
        if let Some(dir) = self.export.staging_dir.as_mut() {
            *dir = absolute(dir)?;
        }
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        if self.covers.concurrency == 0 {
            exn::bail!(ErrorKind::Invalid("covers.concurrency must be at least 1".into()));
        }
        if self.store.trash == self.store.path {
            exn::bail!(ErrorKind::Invalid("store.trash must differ from store.path".into()));
        }
        if self.export.file_name.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid("export.file_name must not be empty".into()));
        }
        Ok(())
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).or_raise(|| ErrorKind::Invalid(format!("can't resolve path {}", path.display())))
}
