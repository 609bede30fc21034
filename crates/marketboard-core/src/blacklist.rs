//! ============================================================================
//! Uploader Filter - blacklist of hashed uploader tokens
//! ============================================================================
//! Presence-only set. The ingestion path only calls `has`; `add` / `remove`
//! exist for the admin CLI.
//! ============================================================================

use std::sync::Arc;
use tracing::info;

use crate::db::{MarketDb, BLACKLIST};
use crate::hashing::token_prefix;
use crate::types::Result;

const PRESENT: u8 = 1;

#[derive(Clone)]
pub struct UploaderFilter {
    db: Arc<MarketDb>,
}

impl UploaderFilter {
    pub fn new(db: Arc<MarketDb>) -> Self {
        Self { db }
    }

    /// True when the hashed uploader token is blacklisted
    pub fn has(&self, token: &str) -> Result<bool> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(BLACKLIST)?;
        let present = table.get(token)?.is_some();
        Ok(present)
    }

    /// Returns true when the token was newly added
    pub fn add(&self, token: &str) -> Result<bool> {
        let write_txn = self.db.begin_write()?;
        let added;
        {
            let mut table = write_txn.open_table(BLACKLIST)?;
            added = table.insert(token, PRESENT)?.is_none();
        }
        write_txn.commit()?;

        if added {
            info!("Blacklisted uploader {}", token_prefix(token));
        }
        Ok(added)
    }

    /// Returns true when the token was present
    pub fn remove(&self, token: &str) -> Result<bool> {
        let write_txn = self.db.begin_write()?;
        let removed;
        {
            let mut table = write_txn.open_table(BLACKLIST)?;
            removed = table.remove(token)?.is_some();
        }
        write_txn.commit()?;

        if removed {
            info!("Removed uploader {} from blacklist", token_prefix(token));
        }
        Ok(removed)
    }

    pub fn list(&self) -> Result<Vec<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(BLACKLIST)?;

        let mut tokens = Vec::new();
        for entry in table.range::<&str>(..)? {
            let (key, _) = entry?;
            tokens.push(key.value().to_string());
        }
        Ok(tokens)
    }
}
