//! Configuration file (`~/.shinystats.toml`)
//!
//! Only `root` reaches the core; the rest describes where the source
//! enumerator looks and how long the dashboard keeps its dataset.

use std::fs;
use std::path::{Path, PathBuf};

use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::services::{Consolidator, DataLoaderService, SourceEnumerator, StatsService};
use crate::types::{Result, StatsError};

const CONFIG_FILE: &str = ".shinystats.toml";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Directory holding the staging area and the canonical store
    pub root: PathBuf,
    /// Parent of the owners' home directories
    pub home_root: PathBuf,
    /// Per-owner directory containing one subdirectory per application
    pub apps_dir: String,
    /// Log store path relative to an application directory
    pub log_path: PathBuf,
    /// Owners whose applications are scraped
    pub owners: Vec<String>,
    /// How long a loaded dataset is reused, in seconds
    pub cache_ttl_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            home_root: PathBuf::from("/home"),
            apps_dir: "ShinyApps".to_string(),
            log_path: PathBuf::from("logs").join("shinylogs.sqlite"),
            owners: Vec::new(),
            cache_ttl_secs: 3600,
        }
    }
}

impl Config {
    /// Default location: `~/.shinystats.toml`
    pub fn default_path() -> Result<PathBuf> {
        let base_dirs = BaseDirs::new()
            .ok_or_else(|| StatsError::Config("Cannot determine home directory".into()))?;
        Ok(base_dirs.home_dir().join(CONFIG_FILE))
    }

    /// Parse a config file; a missing file yields `None`.
    pub fn load_from(path: &Path) -> Result<Option<Config>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content).map_err(|e| {
            StatsError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        Ok(Some(config))
    }

    /// Load `path` (or the default location), falling back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };
        Ok(Self::load_from(&path)?.unwrap_or_default())
    }

    pub fn consolidator(&self) -> Consolidator {
        Consolidator::new(self.root.clone())
    }

    pub fn enumerator(&self) -> SourceEnumerator {
        SourceEnumerator::new(
            self.home_root.clone(),
            self.apps_dir.clone(),
            self.log_path.clone(),
        )
    }

    pub fn stats_service(&self) -> StatsService {
        let ttl = chrono::Duration::seconds(i64::try_from(self.cache_ttl_secs).unwrap_or(i64::MAX));
        StatsService::new(
            DataLoaderService::new(self.consolidator().canonical_path()),
            ttl,
        )
    }
}
