// ============================================================================
// MarketDb - Embedded Database (redb)
// ============================================================================
// Persistent storage for market states, sale ledgers, data-center rollups,
// content IDs, the uploader blacklist and usage counters.
// Default path: ~/.marketboard/market.redb (override via MARKETBOARD_DB_PATH)
// ============================================================================

pub mod types;

pub use types::{
    AggregateHeader, AggregateProperty, ContentEntry, ContentKind, DailyUploadCount,
    DailyUploadStatistics, DataCenterAggregate, DbStats, ExtendedHistory, Listing, MarketState,
    Materia, RecentlyUpdatedItems, RetainerCity, SaleRecord, WorldSlice, line_total,
};

use redb::{
    Database, ReadTransaction, ReadableTable, Table, TableDefinition, WriteTransaction,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::types::{MarketError, Result};

// Table definitions
pub(crate) const RECENT_DATA: TableDefinition<&str, &[u8]> = TableDefinition::new("recent_data");
pub(crate) const EXTENDED_HISTORY: TableDefinition<&str, &[u8]> =
    TableDefinition::new("extended_history");
pub(crate) const DC_AGGREGATES: TableDefinition<&str, &[u8]> =
    TableDefinition::new("dc_aggregates");
pub(crate) const DC_SLICES: TableDefinition<&str, &[u8]> = TableDefinition::new("dc_slices");
pub(crate) const CONTENT: TableDefinition<&str, &[u8]> = TableDefinition::new("content");
pub(crate) const BLACKLIST: TableDefinition<&str, u8> = TableDefinition::new("blacklist");
pub(crate) const DAILY_UPLOADS: TableDefinition<&str, u64> = TableDefinition::new("daily_uploads");
pub(crate) const EXTRA_DATA: TableDefinition<&str, &[u8]> = TableDefinition::new("extra_data");

/// Environment variable overriding the database location
pub const DB_PATH_ENV: &str = "MARKETBOARD_DB_PATH";

/// Embedded database holding every market collection
pub struct MarketDb {
    db: Database,
    path: PathBuf,
}

impl MarketDb {
    /// Open (or create) the database at the given path.
    /// If `path` is None, uses MARKETBOARD_DB_PATH or ~/.marketboard/market.redb
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let db_path = match path {
            Some(p) => p.to_path_buf(),
            None => default_db_path()?,
        };

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    MarketError::StoreUnavailable(format!(
                        "Failed to create {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        info!("Opening market database at: {}", db_path.display());

        let db = Database::create(&db_path)?;

        // Ensure tables exist by doing a write transaction
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(RECENT_DATA)?;
            let _ = write_txn.open_table(EXTENDED_HISTORY)?;
            let _ = write_txn.open_table(DC_AGGREGATES)?;
            let _ = write_txn.open_table(DC_SLICES)?;
            let _ = write_txn.open_table(CONTENT)?;
            let _ = write_txn.open_table(BLACKLIST)?;
            let _ = write_txn.open_table(DAILY_UPLOADS)?;
            let _ = write_txn.open_table(EXTRA_DATA)?;
        }
        write_txn.commit()?;

        info!("Market database ready");

        Ok(Self { db, path: db_path })
    }

    /// Get the database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Exclusive write transaction. redb admits one writer at a time, which
    /// is what serializes read-merge-write sequences on the same key.
    pub(crate) fn begin_write(&self) -> Result<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    pub(crate) fn begin_read(&self) -> Result<ReadTransaction> {
        Ok(self.db.begin_read()?)
    }

    // ========================================================================
    // Single-document reads
    // ========================================================================

    pub fn get_market_state(&self, item_id: u32, world_id: u32) -> Result<Option<MarketState>> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(RECENT_DATA)?;
        read_doc(&table, &market_key(item_id, world_id))
    }

    pub fn get_extended_history(
        &self,
        item_id: u32,
        world_id: u32,
    ) -> Result<Option<ExtendedHistory>> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(EXTENDED_HISTORY)?;
        read_doc(&table, &market_key(item_id, world_id))
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    pub fn stats(&self) -> Result<DbStats> {
        let read_txn = self.begin_read()?;

        Ok(DbStats {
            market_states: read_txn.open_table(RECENT_DATA)?.range::<&str>(..)?.count(),
            extended_histories: read_txn.open_table(EXTENDED_HISTORY)?.range::<&str>(..)?.count(),
            aggregates: read_txn.open_table(DC_AGGREGATES)?.range::<&str>(..)?.count(),
            aggregate_slices: read_txn.open_table(DC_SLICES)?.range::<&str>(..)?.count(),
            content_entries: read_txn.open_table(CONTENT)?.range::<&str>(..)?.count(),
            blacklisted: read_txn.open_table(BLACKLIST)?.range::<&str>(..)?.count(),
            upload_days: read_txn.open_table(DAILY_UPLOADS)?.range::<&str>(..)?.count(),
        })
    }
}

fn default_db_path() -> Result<PathBuf> {
    if let Ok(env_path) = std::env::var(DB_PATH_ENV) {
        return Ok(PathBuf::from(env_path));
    }
    let home = dirs::home_dir()
        .ok_or_else(|| MarketError::Config("Cannot determine home directory".to_string()))?;
    Ok(home.join(".marketboard").join("market.redb"))
}

// ============================================================================
// Keys
// ============================================================================
// Numeric parts are zero-padded so lexicographic order equals numeric order.

/// Key of a MarketState / ExtendedHistory document
pub(crate) fn market_key(item_id: u32, world_id: u32) -> String {
    format!("{:010}:{:05}", item_id, world_id)
}

/// Key of an aggregate header document
pub(crate) fn aggregate_key(item_id: u32, dc_name: &str) -> String {
    format!("{:010}:{}", item_id, dc_name)
}

/// Prefix shared by every slice of one aggregated property
pub(crate) fn slice_prefix(item_id: u32, dc_name: &str, property: AggregateProperty) -> String {
    format!("{:010}:{}:{}:", item_id, dc_name, property.as_str())
}

/// Composite key addressing one world's slice of an aggregated property
pub(crate) fn slice_key(
    item_id: u32,
    dc_name: &str,
    property: AggregateProperty,
    world_id: u32,
) -> String {
    format!("{}{:05}", slice_prefix(item_id, dc_name, property), world_id)
}

// ============================================================================
// Document helpers
// ============================================================================

pub(crate) fn read_doc<T, R>(table: &R, key: &str) -> Result<Option<T>>
where
    T: DeserializeOwned,
    R: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(key)? {
        Some(value) => Ok(Some(bincode::deserialize(value.value())?)),
        None => Ok(None),
    }
}

/// Upsert a document. Returns true when an existing document was replaced.
pub(crate) fn write_doc<T: Serialize>(
    table: &mut Table<&'static str, &'static [u8]>,
    key: &str,
    doc: &T,
) -> Result<bool> {
    let value = bincode::serialize(doc)?;
    let replaced = table.insert(key, value.as_slice())?.is_some();
    Ok(replaced)
}

/// All documents whose key starts with `prefix`, in key order.
pub(crate) fn scan_prefix<T, R>(table: &R, prefix: &str) -> Result<Vec<(String, T)>>
where
    T: DeserializeOwned,
    R: ReadableTable<&'static str, &'static [u8]>,
{
    let mut results = Vec::new();
    for entry in table.range::<&str>(prefix..)? {
        let (key, value) = entry?;
        let key = key.value();
        if !key.starts_with(prefix) {
            break;
        }
        results.push((key.to_string(), bincode::deserialize(value.value())?));
    }
    Ok(results)
}
