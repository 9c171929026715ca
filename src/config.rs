//! Runtime configuration loaded from environment variables.
//!
//! - `POLYTIER_OWNER_ID`: owner whose hierarchy is served (required UUID)
//! - `POLYTIER_BACKEND`: `sqlite` (default) or `local`
//! - `POLYTIER_DATA_DIR`: where the database or JSON collections live
//! - `POLYTIER_ATTRIBUTE_COUNT`: attribute count for an empty hierarchy (default 5)
//! - `POLYTIER_AUTOSAVE_MS`: quiet period before attribute edits are saved (default 500)

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::clamp_count;
use crate::store::{LocalStore, SqliteStore, TierStore};

pub const DEFAULT_ATTRIBUTE_COUNT: usize = 5;
pub const DEFAULT_AUTOSAVE_MS: u64 = 500;
const DATABASE_FILE: &str = "polytier.db";

/// Which persistence adapter backs the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Sqlite,
    Local,
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "local" => Ok(Self::Local),
            _ => Err(Error::Config(format!(
                "POLYTIER_BACKEND must be 'sqlite' or 'local', got '{}'",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub owner_id: Uuid,
    pub backend: Backend,
    pub data_dir: PathBuf,
    pub attribute_count: usize,
    pub autosave_window: Duration,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let owner_raw = lookup("POLYTIER_OWNER_ID")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| Error::Config("POLYTIER_OWNER_ID is not set".to_string()))?;
        let owner_id = Uuid::parse_str(owner_raw.trim()).map_err(|e| {
            Error::Config(format!("POLYTIER_OWNER_ID is not a UUID: {}", e))
        })?;

        let backend = match lookup("POLYTIER_BACKEND") {
            Some(raw) => raw.parse::<Backend>()?,
            None => Backend::Sqlite,
        };

        let data_dir = match lookup("POLYTIER_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => default_data_dir()?,
        };

        let attribute_count = match lookup("POLYTIER_ATTRIBUTE_COUNT") {
            Some(raw) => clamp_count(raw.trim().parse::<usize>().map_err(|e| {
                Error::Config(format!("POLYTIER_ATTRIBUTE_COUNT is not a number: {}", e))
            })?),
            None => DEFAULT_ATTRIBUTE_COUNT,
        };

        let autosave_ms = match lookup("POLYTIER_AUTOSAVE_MS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|e| {
                Error::Config(format!("POLYTIER_AUTOSAVE_MS is not a number: {}", e))
            })?,
            None => DEFAULT_AUTOSAVE_MS,
        };

        Ok(Self {
            owner_id,
            backend,
            data_dir,
            attribute_count,
            autosave_window: Duration::from_millis(autosave_ms),
        })
    }

    /// Open the configured store, running migrations where the backend has them.
    pub fn open_store(&self) -> anyhow::Result<Arc<dyn TierStore>> {
        match self.backend {
            Backend::Sqlite => {
                let store = SqliteStore::open(self.data_dir.join(DATABASE_FILE))?;
                store.migrate()?;
                Ok(Arc::new(store))
            }
            Backend::Local => Ok(Arc::new(LocalStore::open(&self.data_dir)?)),
        }
    }
}

fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "polytier")
        .ok_or_else(|| Error::Config("Could not determine data directory".to_string()))?;
    Ok(dirs.data_dir().to_path_buf())
}
