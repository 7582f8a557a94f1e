//! Layered runtime configuration.
//!
//! Values resolve in order: built-in defaults, an optional JSON file, then
//! `DOCMIRROR_*` environment variables. Command-line overrides are applied
//! last by the caller through [`MirrorConfig::with_overrides`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sync::{SyncOptions, DEFAULT_BATCH_SIZE, DEFAULT_SAMPLE_SIZE};
use crate::util::normalize_text_option;

const APP_DIR_NAME: &str = "docmirror";
/// File name looked up in the platform config directory
pub const CONFIG_FILE_NAME: &str = "docmirror.json";
const DB_FILE_NAME: &str = "mirror.db";
const DEFAULT_SOURCE_DIR: &str = "dump";

pub const ENV_DB_PATH: &str = "DOCMIRROR_DB_PATH";
pub const ENV_SOURCE_DIR: &str = "DOCMIRROR_SOURCE_DIR";
pub const ENV_COLLECTIONS: &str = "DOCMIRROR_COLLECTIONS";
pub const ENV_SAMPLE_SIZE: &str = "DOCMIRROR_SAMPLE_SIZE";
pub const ENV_BATCH_SIZE: &str = "DOCMIRROR_BATCH_SIZE";

/// Where the mirror lives, what it backs up and how
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct MirrorConfig {
    pub mirror_db_path: PathBuf,
    /// Directory of `<collection>.jsonl` exports
    pub source_dir: PathBuf,
    /// Collections synced by `docmirror sync`, in order
    pub collections: Vec<String>,
    pub sample_size: usize,
    pub batch_size: usize,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            mirror_db_path: default_db_path(),
            source_dir: PathBuf::from(DEFAULT_SOURCE_DIR),
            collections: Vec::new(),
            sample_size: DEFAULT_SAMPLE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// `docmirror.json` in the platform config directory
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// `mirror.db` in the platform data directory, or the working directory
pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .map_or_else(|| PathBuf::from("."), |dir| dir.join(APP_DIR_NAME))
        .join(DB_FILE_NAME)
}

impl MirrorConfig {
    /// Resolve defaults, file and process environment.
    ///
    /// An explicit `config_path` must exist; the default location is optional.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => Self::load_from_path(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::load_from_path(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file; keys it omits keep their defaults
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|error| {
            Error::Config(format!(
                "failed to read config at {}: {error}",
                path.display()
            ))
        })?;
        let mut config = serde_json::from_str::<Self>(&raw).map_err(|error| {
            Error::Config(format!(
                "failed to parse config at {}: {error}",
                path.display()
            ))
        })?;
        config.normalize();
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Layer environment values over the current ones
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| normalize_text_option(lookup(key));

        if let Some(path) = read(ENV_DB_PATH) {
            self.mirror_db_path = PathBuf::from(path);
        }
        if let Some(dir) = read(ENV_SOURCE_DIR) {
            self.source_dir = PathBuf::from(dir);
        }
        if let Some(list) = read(ENV_COLLECTIONS) {
            self.collections = list.split(',').map(str::to_string).collect();
        }
        if let Some(raw) = read(ENV_SAMPLE_SIZE) {
            self.sample_size = parse_size(ENV_SAMPLE_SIZE, &raw)?;
        }
        if let Some(raw) = read(ENV_BATCH_SIZE) {
            self.batch_size = parse_size(ENV_BATCH_SIZE, &raw)?;
        }

        self.normalize();
        Ok(())
    }

    /// Apply command-line overrides
    #[must_use]
    pub fn with_overrides(mut self, db_path: Option<PathBuf>, source_dir: Option<PathBuf>) -> Self {
        if let Some(path) = db_path {
            self.mirror_db_path = path;
        }
        if let Some(dir) = source_dir {
            self.source_dir = dir;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_size == 0 {
            return Err(Error::Config("sample_size must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".into()));
        }
        if self.mirror_db_path.as_os_str().is_empty() {
            return Err(Error::Config("mirror_db_path cannot be empty".into()));
        }
        Ok(())
    }

    pub const fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            sample_size: self.sample_size,
            batch_size: self.batch_size,
        }
    }

    fn normalize(&mut self) {
        let mut collections: Vec<String> = Vec::with_capacity(self.collections.len());
        for name in self.collections.drain(..) {
            let name = name.trim();
            if !name.is_empty() && !collections.iter().any(|seen| seen == name) {
                collections.push(name.to_string());
            }
        }
        self.collections = collections;
    }
}

fn parse_size(key: &str, raw: &str) -> Result<usize> {
    raw.parse()
        .map_err(|_| Error::Config(format!("{key} must be a positive integer, got '{raw}'")))
}
