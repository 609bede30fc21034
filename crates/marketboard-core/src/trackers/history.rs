//! ============================================================================
//! Sale History Tracker - recent tail and extended ledger per (item, world)
//! ============================================================================
//! Two destinations per upload:
//! - `recentHistory` embedded in MarketState: incoming ∪ existing, exact
//!   duplicates removed, newest first, truncated to the tail length
//! - ExtendedHistory: unseen incoming entries prepended, newest first,
//!   truncated to the ledger capacity so the oldest entries fall off
//! ============================================================================

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use super::aggregate::WorldAggregator;
use crate::db::{
    market_key, read_doc, write_doc, AggregateProperty, ExtendedHistory, MarketDb, MarketState,
    SaleRecord, EXTENDED_HISTORY, RECENT_DATA,
};
use crate::hashing::token_prefix;
use crate::types::{now_millis, Result};

#[derive(Clone)]
pub struct SaleHistoryTracker {
    db: Arc<MarketDb>,
    aggregator: WorldAggregator,
    recent_capacity: usize,
    extended_capacity: usize,
}

impl SaleHistoryTracker {
    pub fn new(
        db: Arc<MarketDb>,
        aggregator: WorldAggregator,
        recent_capacity: usize,
        extended_capacity: usize,
    ) -> Self {
        Self {
            db,
            aggregator,
            recent_capacity,
            extended_capacity,
        }
    }

    /// Merge anonymized sale entries into both history destinations.
    ///
    /// Listings already stored for the key are carried forward untouched.
    pub fn set(
        &self,
        uploader_id: &str,
        item_id: u32,
        world_id: u32,
        entries: Vec<SaleRecord>,
    ) -> Result<()> {
        let now = now_millis();
        let key = market_key(item_id, world_id);
        let incoming = entries.len();

        let write_txn = self.db.begin_write()?;
        let (replaced, ledger_len) = {
            let mut recent = write_txn.open_table(RECENT_DATA)?;
            let (listings, prior_history, replaced) =
                match read_doc::<MarketState, _>(&recent, &key)? {
                    Some(state) => (state.listings, state.recent_history, true),
                    None => (Vec::new(), Vec::new(), false),
                };
            let recent_history = merge_recent(&entries, prior_history, self.recent_capacity);

            self.aggregator.update_data_center_property(
                &write_txn,
                uploader_id,
                AggregateProperty::History,
                item_id,
                world_id,
                &recent_history,
                now,
            )?;

            let state = MarketState {
                item_id,
                world_id,
                uploader_id: uploader_id.to_string(),
                last_upload_time: now,
                listings,
                recent_history,
            };
            write_doc(&mut recent, &key, &state)?;

            let mut extended = write_txn.open_table(EXTENDED_HISTORY)?;
            let ledger = read_doc::<ExtendedHistory, _>(&extended, &key)?
                .map(|history| history.entries)
                .unwrap_or_default();
            let history = ExtendedHistory {
                item_id,
                world_id,
                last_upload_time: now,
                entries: extend_ledger(ledger, &entries, self.extended_capacity),
            };
            write_doc(&mut extended, &key, &history)?;

            (replaced, history.entries.len())
        };
        write_txn.commit()?;

        if replaced {
            debug!(
                item_id,
                world_id,
                incoming,
                ledger = ledger_len,
                uploader = token_prefix(uploader_id),
                "Merged sale history"
            );
        } else {
            info!(item_id, world_id, incoming, "Created market state from sale history");
        }
        Ok(())
    }
}

/// Incoming ∪ existing without exact duplicates, newest first, truncated.
pub(crate) fn merge_recent(
    incoming: &[SaleRecord],
    existing: Vec<SaleRecord>,
    capacity: usize,
) -> Vec<SaleRecord> {
    let mut merged: Vec<SaleRecord> = {
        let mut seen: HashSet<&SaleRecord> = HashSet::with_capacity(incoming.len() + existing.len());
        incoming
            .iter()
            .chain(&existing)
            .filter(|record| seen.insert(*record))
            .cloned()
            .collect()
    };
    // Stable: ties keep incoming before existing
    merged.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    merged.truncate(capacity);
    merged
}

/// Prepend entries the ledger has not seen yet, keep newest first, and drop
/// the oldest entries beyond `capacity`.
pub(crate) fn extend_ledger(
    ledger: Vec<SaleRecord>,
    incoming: &[SaleRecord],
    capacity: usize,
) -> Vec<SaleRecord> {
    let mut fresh: Vec<SaleRecord> = {
        let mut seen: HashSet<&SaleRecord> = ledger.iter().collect();
        incoming
            .iter()
            .filter(|record| seen.insert(*record))
            .cloned()
            .collect()
    };

    fresh.extend(ledger);
    fresh.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    fresh.truncate(capacity);
    fresh
}
