//! ============================================================================
//! World Aggregator - per data center rollups of world market data
//! ============================================================================
//! Each (item, data center) rollup is a header document plus one slice per
//! (property, world), addressed by a composite key. Writing a world's slice
//! is a single-key insert, so sibling worlds are never rewritten.
//! ============================================================================

use redb::WriteTransaction;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::db::{
    aggregate_key, read_doc, scan_prefix, slice_key, slice_prefix, write_doc, AggregateHeader,
    AggregateProperty, DataCenterAggregate, Listing, MarketDb, SaleRecord, WorldSlice,
    DC_AGGREGATES, DC_SLICES,
};
use crate::hashing::token_prefix;
use crate::types::{MarketError, Result};
use crate::worlds::WorldTable;

/// Maintains DataCenterAggregate documents. Shared by both trackers.
#[derive(Clone)]
pub struct WorldAggregator {
    db: Arc<MarketDb>,
    worlds: Arc<WorldTable>,
}

impl WorldAggregator {
    pub fn new(db: Arc<MarketDb>, worlds: Arc<WorldTable>) -> Self {
        Self { db, worlds }
    }

    /// Data center a world rolls up into
    pub fn data_center_for(&self, world_id: u32) -> Result<&str> {
        self.worlds
            .data_center_of(world_id)
            .ok_or(MarketError::UnknownWorld(world_id))
    }

    /// Replace `world_id`'s slice of `property` inside the caller's write
    /// transaction, creating the aggregate header on first write.
    #[allow(clippy::too_many_arguments)]
    pub fn update_data_center_property<T>(
        &self,
        txn: &WriteTransaction,
        uploader_id: &str,
        property: AggregateProperty,
        item_id: u32,
        world_id: u32,
        value: &[T],
        now: i64,
    ) -> Result<()>
    where
        T: Serialize + Clone,
    {
        let dc_name = self.data_center_for(world_id)?;

        {
            let mut headers = txn.open_table(DC_AGGREGATES)?;
            let key = aggregate_key(item_id, dc_name);
            let header = match read_doc::<AggregateHeader, _>(&headers, &key)? {
                Some(mut header) => {
                    header.last_upload_time = now;
                    header
                }
                None => {
                    info!("Creating {} aggregate for item {}", dc_name, item_id);
                    AggregateHeader {
                        item_id,
                        dc_name: dc_name.to_string(),
                        created_at: now,
                        last_upload_time: now,
                    }
                }
            };
            write_doc(&mut headers, &key, &header)?;
        }

        let mut slices = txn.open_table(DC_SLICES)?;
        let slice = WorldSlice {
            world_id,
            uploader_id: uploader_id.to_string(),
            last_upload_time: now,
            entries: value.to_vec(),
        };
        write_doc(
            &mut slices,
            &slice_key(item_id, dc_name, property, world_id),
            &slice,
        )?;

        debug!(
            item_id,
            world_id,
            dc = dc_name,
            property = property.as_str(),
            uploader = token_prefix(uploader_id),
            "Updated data center slice"
        );
        Ok(())
    }

    /// Assemble the rollup of one item across a data center's worlds.
    pub fn get(&self, item_id: u32, dc_name: &str) -> Result<Option<DataCenterAggregate>> {
        let dc_name = self.worlds.data_center_named(dc_name).unwrap_or(dc_name);

        let read_txn = self.db.begin_read()?;
        let headers = read_txn.open_table(DC_AGGREGATES)?;
        let Some(header) = read_doc::<AggregateHeader, _>(&headers, &aggregate_key(item_id, dc_name))?
        else {
            return Ok(None);
        };

        let slices = read_txn.open_table(DC_SLICES)?;
        let listings: Vec<(String, WorldSlice<Listing>)> = scan_prefix(
            &slices,
            &slice_prefix(item_id, dc_name, AggregateProperty::Listings),
        )?;
        let history: Vec<(String, WorldSlice<SaleRecord>)> = scan_prefix(
            &slices,
            &slice_prefix(item_id, dc_name, AggregateProperty::History),
        )?;

        Ok(Some(DataCenterAggregate {
            item_id,
            dc_name: header.dc_name,
            last_upload_time: header.last_upload_time,
            listings: listings
                .into_iter()
                .map(|(_, slice)| (slice.world_id, slice.entries))
                .collect(),
            history: history
                .into_iter()
                .map(|(_, slice)| (slice.world_id, slice.entries))
                .collect(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{listing, sale, temp_db, worlds};

    fn write_listings(agg: &WorldAggregator, world_id: u32, listings: &[Listing], now: i64) {
        let txn = agg.db.begin_write().unwrap();
        agg.update_data_center_property(
            &txn,
            "uploader",
            AggregateProperty::Listings,
            5,
            world_id,
            listings,
            now,
        )
        .unwrap();
        txn.commit().unwrap();
    }

    #[test]
    fn test_first_write_creates_aggregate() {
        let (_dir, db) = temp_db();
        let agg = WorldAggregator::new(db, worlds());

        assert!(agg.get(5, "Materia").unwrap().is_none());
        write_listings(&agg, 21, &[listing(100, 3)], 1_000);

        let aggregate = agg.get(5, "materia").unwrap().unwrap();
        assert_eq!(aggregate.dc_name, "Materia");
        assert_eq!(aggregate.last_upload_time, 1_000);
        assert_eq!(aggregate.listings[&21], vec![listing(100, 3)]);
        assert!(aggregate.history.is_empty());
    }

    #[test]
    fn test_sibling_world_slice_untouched() {
        let (_dir, db) = temp_db();
        let agg = WorldAggregator::new(db, worlds());

        write_listings(&agg, 22, &[listing(50, 1), listing(60, 2)], 1_000);
        write_listings(&agg, 21, &[listing(100, 3)], 2_000);
        write_listings(&agg, 21, &[], 3_000);

        let aggregate = agg.get(5, "Materia").unwrap().unwrap();
        assert_eq!(aggregate.listings[&22], vec![listing(50, 1), listing(60, 2)]);
        assert!(aggregate.listings[&21].is_empty());
        assert_eq!(aggregate.last_upload_time, 3_000);
    }

    #[test]
    fn test_header_created_once() {
        let (_dir, db) = temp_db();
        let agg = WorldAggregator::new(db.clone(), worlds());

        write_listings(&agg, 21, &[listing(1, 1)], 1_000);
        write_listings(&agg, 86, &[listing(2, 1)], 2_000);

        let read_txn = db.begin_read().unwrap();
        let headers = read_txn.open_table(DC_AGGREGATES).unwrap();
        let header: AggregateHeader = read_doc(&headers, &aggregate_key(5, "Materia"))
            .unwrap()
            .unwrap();
        assert_eq!(header.created_at, 1_000);
        assert_eq!(header.last_upload_time, 2_000);
        assert_eq!(db.stats().unwrap().aggregates, 1);
    }

    #[test]
    fn test_properties_are_separate() {
        let (_dir, db) = temp_db();
        let agg = WorldAggregator::new(db, worlds());

        write_listings(&agg, 33, &[listing(10, 1)], 1_000);
        let txn = agg.db.begin_write().unwrap();
        agg.update_data_center_property(
            &txn,
            "uploader",
            AggregateProperty::History,
            5,
            33,
            &[sale(9, 1, 500)],
            1_500,
        )
        .unwrap();
        txn.commit().unwrap();

        let aggregate = agg.get(5, "Light").unwrap().unwrap();
        assert_eq!(aggregate.listings[&33], vec![listing(10, 1)]);
        assert_eq!(aggregate.history[&33], vec![sale(9, 1, 500)]);
        assert!(agg.get(5, "Materia").unwrap().is_none());
    }

    #[test]
    fn test_unknown_world_rejected() {
        let (_dir, db) = temp_db();
        let agg = WorldAggregator::new(db, worlds());

        let txn = agg.db.begin_write().unwrap();
        let err = agg
            .update_data_center_property(
                &txn,
                "uploader",
                AggregateProperty::Listings,
                5,
                999,
                &[listing(1, 1)],
                1,
            )
            .unwrap_err();
        assert_eq!(err, MarketError::UnknownWorld(999));
    }
}
