//! Content directory: hashed player/retainer token → public display record.

use std::sync::Arc;
use tracing::debug;

use crate::db::{read_doc, write_doc, ContentEntry, ContentKind, MarketDb, CONTENT};
use crate::hashing::token_prefix;
use crate::types::Result;

/// Fields stored alongside a content token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFields {
    pub character_name: String,
}

impl ContentFields {
    pub fn named(character_name: impl Into<String>) -> Self {
        Self {
            character_name: character_name.into(),
        }
    }
}

#[derive(Clone)]
pub struct ContentDirectory {
    db: Arc<MarketDb>,
}

impl ContentDirectory {
    pub fn new(db: Arc<MarketDb>) -> Self {
        Self { db }
    }

    pub fn get(&self, token: &str) -> Result<Option<ContentEntry>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CONTENT)?;
        read_doc(&table, token)
    }

    /// Upsert keyed by `token`; a repeated set refreshes kind and name.
    pub fn set(&self, token: &str, kind: ContentKind, fields: ContentFields) -> Result<()> {
        let entry = ContentEntry {
            content_id: token.to_string(),
            kind,
            character_name: fields.character_name,
        };

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(CONTENT)?;
            let existing: Option<ContentEntry> = read_doc(&table, token)?;
            if existing.as_ref() == Some(&entry) {
                return Ok(());
            }
            write_doc(&mut table, token, &entry)?;
        }
        write_txn.commit()?;

        debug!(
            "Stored {} content {}",
            kind.as_str(),
            token_prefix(token)
        );
        Ok(())
    }
}
