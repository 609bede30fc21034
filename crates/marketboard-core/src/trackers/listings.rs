//! Listings tracker: authoritative current listings per (item, world).
//!
//! Each upload fully replaces the stored listings. The recent history tail is
//! carried forward from the prior document; this path never writes it.

use std::sync::Arc;
use tracing::{debug, info};

use super::aggregate::WorldAggregator;
use crate::db::{
    market_key, read_doc, write_doc, AggregateProperty, Listing, MarketDb, MarketState,
    RECENT_DATA,
};
use crate::hashing::token_prefix;
use crate::types::{now_millis, Result};

#[derive(Clone)]
pub struct ListingsTracker {
    db: Arc<MarketDb>,
    aggregator: WorldAggregator,
}

impl ListingsTracker {
    pub fn new(db: Arc<MarketDb>, aggregator: WorldAggregator) -> Self {
        Self { db, aggregator }
    }

    /// Store a full listings snapshot for one (item, world).
    ///
    /// `listings` must already be anonymized. The read of the prior document,
    /// the data-center slice update and the write all happen in one write
    /// transaction, so concurrent uploads for the same key cannot drop each
    /// other's recent history.
    pub fn set(
        &self,
        uploader_id: &str,
        item_id: u32,
        world_id: u32,
        listings: Vec<Listing>,
    ) -> Result<()> {
        let now = now_millis();
        let key = market_key(item_id, world_id);
        let count = listings.len();

        let write_txn = self.db.begin_write()?;
        let replaced = {
            let mut table = write_txn.open_table(RECENT_DATA)?;
            let existing: Option<MarketState> = read_doc(&table, &key)?;
            let recent_history = existing
                .map(|state| state.recent_history)
                .unwrap_or_default();

            self.aggregator.update_data_center_property(
                &write_txn,
                uploader_id,
                AggregateProperty::Listings,
                item_id,
                world_id,
                &listings,
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
            write_doc(&mut table, &key, &state)?
        };
        write_txn.commit()?;

        if replaced {
            debug!(
                item_id,
                world_id,
                listings = count,
                uploader = token_prefix(uploader_id),
                "Replaced listings"
            );
        } else {
            info!(
                item_id,
                world_id,
                listings = count,
                "Created market state"
            );
        }
        Ok(())
    }
}
