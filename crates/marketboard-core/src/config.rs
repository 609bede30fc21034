//! ============================================================================
//! Tracker Configuration
//! ============================================================================
//! Retention capacities, database location and the world table source,
//! read from MARKETBOARD_* environment variables.
//! ============================================================================

use std::path::PathBuf;

use crate::types::{MarketError, Result};

pub const DEFAULT_RECENT_HISTORY_LEN: usize = 20;
pub const DEFAULT_EXTENDED_HISTORY_LEN: usize = 1800;
pub const DEFAULT_RECENTLY_UPDATED_LEN: usize = 20;
pub const DEFAULT_DAILY_STATS_DAYS: usize = 30;

/// Where the world → data center table comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldSource {
    File(PathBuf),
    Url(String),
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Database file; None falls back to MARKETBOARD_DB_PATH / home directory
    pub db_path: Option<PathBuf>,
    pub world_source: Option<WorldSource>,
    /// Entries kept in the embedded recent history tail
    pub recent_history_len: usize,
    /// Entries kept in the extended history ledger
    pub extended_history_len: usize,
    /// Items kept in the recently updated ledger
    pub recently_updated_len: usize,
    /// Days of upload counters kept
    pub daily_stats_days: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            world_source: None,
            recent_history_len: DEFAULT_RECENT_HISTORY_LEN,
            extended_history_len: DEFAULT_EXTENDED_HISTORY_LEN,
            recently_updated_len: DEFAULT_RECENTLY_UPDATED_LEN,
            daily_stats_days: DEFAULT_DAILY_STATS_DAYS,
        }
    }
}

impl TrackerConfig {
    /// Build the configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        // The file wins when both sources are set
        let world_source = match (
            lookup("MARKETBOARD_WORLDS_FILE"),
            lookup("MARKETBOARD_WORLDS_URL"),
        ) {
            (Some(file), _) => Some(WorldSource::File(PathBuf::from(file))),
            (None, Some(url)) => Some(WorldSource::Url(url)),
            (None, None) => None,
        };

        let config = Self {
            db_path: lookup(crate::db::DB_PATH_ENV).map(PathBuf::from),
            world_source,
            recent_history_len: capacity(
                &lookup,
                "MARKETBOARD_RECENT_HISTORY_LEN",
                defaults.recent_history_len,
            )?,
            extended_history_len: capacity(
                &lookup,
                "MARKETBOARD_EXTENDED_HISTORY_LEN",
                defaults.extended_history_len,
            )?,
            recently_updated_len: capacity(
                &lookup,
                "MARKETBOARD_RECENTLY_UPDATED_LEN",
                defaults.recently_updated_len,
            )?,
            daily_stats_days: capacity(
                &lookup,
                "MARKETBOARD_DAILY_STATS_DAYS",
                defaults.daily_stats_days,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = Some(path.into());
        self
    }

    pub fn with_worlds_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.world_source = Some(WorldSource::File(path.into()));
        self
    }

    pub fn with_worlds_url(mut self, url: impl Into<String>) -> Self {
        self.world_source = Some(WorldSource::Url(url.into()));
        self
    }

    /// Reject zero capacities
    pub fn validate(&self) -> Result<()> {
        let capacities = [
            ("recent_history_len", self.recent_history_len),
            ("extended_history_len", self.extended_history_len),
            ("recently_updated_len", self.recently_updated_len),
            ("daily_stats_days", self.daily_stats_days),
        ];
        for (name, value) in capacities {
            if value == 0 {
                return Err(MarketError::Config(format!("{} must be positive", name)));
            }
        }
        Ok(())
    }
}

fn capacity<F>(lookup: &F, key: &str, default: usize) -> Result<usize>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<usize>()
            .map_err(|_| MarketError::Config(format!("{} is not a number: '{}'", key, raw))),
    }
}
