//! ============================================================================
//! Ingestor - validation, anonymization and fan-out of one upload
//! ============================================================================
//! Flow:
//!   validate ─► hash uploader ─► blacklist? ─► Rejected (no writes)
//!                                    │
//!                                    └─► normalize ─► try_join!(
//!                                          daily counter,
//!                                          listings tracker,
//!                                          sale history tracker,
//!                                          recently updated,
//!                                          content directory)
//!
//! The store is synchronous; every write runs on the blocking pool.
//! ============================================================================

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::blacklist::UploaderFilter;
use crate::content::{ContentDirectory, ContentFields};
use crate::db::{line_total, ContentKind, Listing, RetainerCity, SaleRecord};
use crate::hashing::{hash_identity, hash_optional, token_prefix};
use crate::stats::UsageCounters;
use crate::trackers::{ListingsTracker, SaleHistoryTracker};
use crate::types::{MarketError, MarketUpload, RawListing, RawSaleEntry, Result, UploadOutcome};
use crate::worlds::WorldTable;

/// One content registration derived from an upload
type ContentWrite = (String, ContentKind, ContentFields);

/// Validated, anonymized upload ready to be written
#[derive(Debug)]
struct UploadPlan {
    item_id: u32,
    world_id: u32,
    listings: Option<Vec<Listing>>,
    entries: Option<Vec<SaleRecord>>,
    content: Vec<ContentWrite>,
}

/// Upload entry point. Cheap to clone; every component shares the store.
#[derive(Clone)]
pub struct Ingestor {
    worlds: Arc<WorldTable>,
    filter: UploaderFilter,
    listings: ListingsTracker,
    history: SaleHistoryTracker,
    content: ContentDirectory,
    counters: UsageCounters,
}

impl Ingestor {
    pub fn new(
        worlds: Arc<WorldTable>,
        filter: UploaderFilter,
        listings: ListingsTracker,
        history: SaleHistoryTracker,
        content: ContentDirectory,
        counters: UsageCounters,
    ) -> Self {
        Self {
            worlds,
            filter,
            listings,
            history,
            content,
            counters,
        }
    }

    /// Validate, anonymize and store one upload.
    ///
    /// A blacklisted uploader yields [`UploadOutcome::Rejected`] and nothing is
    /// written, not even the daily counter. Validation failures surface as
    /// [`MarketError::MalformedPayload`] or [`MarketError::UnknownWorld`]
    /// before any write.
    pub async fn process(&self, upload: MarketUpload) -> Result<UploadOutcome> {
        let plan = self.prepare(&upload)?;

        let uploader = hash_optional(upload.uploader_id.as_ref());
        let filter = self.filter.clone();
        let token = uploader.clone();
        if blocking(move || filter.has(&token)).await? {
            warn!(
                item_id = plan.item_id,
                world_id = plan.world_id,
                uploader = token_prefix(&uploader),
                "Rejected upload from blacklisted uploader"
            );
            return Ok(UploadOutcome::Rejected);
        }

        let outcome = UploadOutcome::Accepted {
            listings: plan.listings.as_ref().map_or(0, Vec::len),
            entries: plan.entries.as_ref().map_or(0, Vec::len),
        };
        let UploadPlan {
            item_id,
            world_id,
            listings,
            entries,
            content,
        } = plan;

        let counters = self.counters.clone();
        let daily = blocking(move || counters.increment_daily_uploads().map(|_| ()));

        let listings_write = async {
            let Some(listings) = listings else {
                return Ok(());
            };
            let tracker = self.listings.clone();
            let uploader = uploader.clone();
            blocking(move || tracker.set(&uploader, item_id, world_id, listings)).await
        };

        let history_write = async {
            let Some(entries) = entries else {
                return Ok(());
            };
            let tracker = self.history.clone();
            let uploader = uploader.clone();
            blocking(move || tracker.set(&uploader, item_id, world_id, entries)).await
        };

        let counters = self.counters.clone();
        let recent = blocking(move || counters.add_recently_updated_item(item_id));

        let directory = self.content.clone();
        let content_write = blocking(move || {
            for (token, kind, fields) in content {
                directory.set(&token, kind, fields)?;
            }
            Ok(())
        });

        tokio::try_join!(daily, listings_write, history_write, recent, content_write)?;

        info!(
            item_id,
            world_id,
            uploader = token_prefix(&uploader),
            "Accepted upload ({:?})",
            outcome
        );
        Ok(outcome)
    }

    /// Validation and anonymization. Pure: touches nothing but the world table.
    fn prepare(&self, upload: &MarketUpload) -> Result<UploadPlan> {
        let item_id = match upload.item_id {
            Some(id) if id > 0 => id,
            _ => return Err(malformed("itemID missing or zero")),
        };
        let world_id = match upload.world_id {
            Some(id) if id > 0 => id,
            _ => return Err(malformed("worldID missing or zero")),
        };
        if !self.worlds.contains(world_id) {
            return Err(MarketError::UnknownWorld(world_id));
        }

        let profile = upload
            .content_id
            .as_ref()
            .zip(upload.character_name.as_ref());
        if upload.listings.is_none() && upload.entries.is_none() && profile.is_none() {
            return Err(malformed(
                "upload carries no listings, entries or character profile",
            ));
        }

        let mut content = Vec::new();

        let listings = match &upload.listings {
            Some(raw) => {
                let mut listings = Vec::with_capacity(raw.len());
                for (index, listing) in raw.iter().enumerate() {
                    listings.push(normalize_listing(index, listing, &mut content)?);
                }
                Some(listings)
            }
            None => None,
        };

        let entries = match &upload.entries {
            Some(raw) => Some(
                raw.iter()
                    .enumerate()
                    .map(|(index, entry)| normalize_entry(index, entry))
                    .collect::<Result<Vec<_>>>()?,
            ),
            None => None,
        };

        if let Some((content_id, character_name)) = profile {
            content.push((
                hash_identity(content_id),
                ContentKind::Player,
                ContentFields::named(character_name.as_str()),
            ));
        }

        debug!(
            item_id,
            world_id,
            content = content.len(),
            "Prepared upload"
        );
        Ok(UploadPlan {
            item_id,
            world_id,
            listings,
            entries,
            content,
        })
    }
}

/// Anonymize one listing, queueing creator and retainer registrations.
fn normalize_listing(
    index: usize,
    raw: &RawListing,
    content: &mut Vec<ContentWrite>,
) -> Result<Listing> {
    let (Some(price_per_unit), Some(quantity)) = (raw.price_per_unit, raw.quantity) else {
        return Err(malformed(format!(
            "listing {} lacks pricePerUnit or quantity",
            index
        )));
    };
    let retainer_city = raw.retainer_city.map(RetainerCity::from);
    if let Some(RetainerCity::Other(code)) = retainer_city {
        debug!("listing {} has unrecognised retainer city {}", index, code);
    }

    let listing = Listing {
        listing_id: hash_optional(raw.listing_id.as_ref()),
        creator_id: hash_optional(raw.creator_id.as_ref()),
        creator_name: raw.creator_name.clone(),
        retainer_id: hash_optional(raw.retainer_id.as_ref()),
        retainer_name: raw.retainer_name.clone(),
        seller_id: hash_optional(raw.seller_id.as_ref()),
        hq: raw.hq,
        price_per_unit,
        quantity,
        total: line_total(price_per_unit, quantity),
        retainer_city,
        materia: raw.materia.clone().unwrap_or_default(),
        stain_id: raw.stain_id.unwrap_or(0),
        on_mannequin: raw.on_mannequin,
        last_review_time: raw.last_review_time.unwrap_or(0),
    };

    if let (Some(_), Some(name)) = (&raw.creator_id, &raw.creator_name) {
        content.push((
            listing.creator_id.clone(),
            ContentKind::Player,
            ContentFields::named(name.as_str()),
        ));
    }
    if let (Some(_), Some(name)) = (&raw.retainer_id, &raw.retainer_name) {
        content.push((
            listing.retainer_id.clone(),
            ContentKind::Retainer,
            ContentFields::named(name.as_str()),
        ));
    }

    Ok(listing)
}

fn normalize_entry(index: usize, raw: &RawSaleEntry) -> Result<SaleRecord> {
    let (Some(price_per_unit), Some(quantity), Some(timestamp)) =
        (raw.price_per_unit, raw.quantity, raw.timestamp)
    else {
        return Err(malformed(format!(
            "entry {} lacks pricePerUnit, quantity or timestamp",
            index
        )));
    };

    Ok(SaleRecord {
        seller_id: hash_optional(raw.seller_id.as_ref()),
        buyer_name: raw.buyer_name.clone(),
        hq: raw.hq,
        price_per_unit,
        quantity,
        total: line_total(price_per_unit, quantity),
        timestamp,
    })
}

fn malformed(reason: impl Into<String>) -> MarketError {
    MarketError::MalformedPayload(reason.into())
}

/// Run synchronous store work on the blocking pool.
async fn blocking<T, F>(task: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| MarketError::Worker(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DailyUploadStatistics, MarketDb};
    use crate::testing::{temp_db, worlds};
    use crate::trackers::WorldAggregator;
    use crate::types::RawId;

    struct Fixture {
        _dir: tempfile::TempDir,
        db: Arc<MarketDb>,
        ingestor: Ingestor,
        filter: UploaderFilter,
        content: ContentDirectory,
        counters: UsageCounters,
    }

    fn fixture() -> Fixture {
        let (dir, db) = temp_db();
        let worlds = worlds();
        let aggregator = WorldAggregator::new(db.clone(), worlds.clone());
        let filter = UploaderFilter::new(db.clone());
        let content = ContentDirectory::new(db.clone());
        let counters = UsageCounters::new(db.clone(), 20, 30);
        let ingestor = Ingestor::new(
            worlds,
            filter.clone(),
            ListingsTracker::new(db.clone(), aggregator.clone()),
            SaleHistoryTracker::new(db.clone(), aggregator, 20, 1800),
            content.clone(),
            counters.clone(),
        );
        Fixture {
            _dir: dir,
            db,
            ingestor,
            filter,
            content,
            counters,
        }
    }

    fn raw_listing(price: u64, qty: u32) -> RawListing {
        RawListing {
            listing_id: Some(RawId::Number(9001)),
            creator_id: Some(RawId::Number(1001)),
            creator_name: Some("Crafter Person".into()),
            retainer_id: Some(RawId::Text("2002".into())),
            retainer_name: Some("Shopkeep".into()),
            seller_id: Some(RawId::Number(3003)),
            price_per_unit: Some(price),
            quantity: Some(qty),
            retainer_city: Some(7),
            ..Default::default()
        }
    }

    fn raw_entry(price: u64, qty: u32, timestamp: i64) -> RawSaleEntry {
        RawSaleEntry {
            seller_id: Some(RawId::Number(4004)),
            buyer_name: Some("Buyer".into()),
            hq: true,
            price_per_unit: Some(price),
            quantity: Some(qty),
            timestamp: Some(timestamp),
        }
    }

    fn upload(uploader: u64) -> MarketUpload {
        MarketUpload {
            uploader_id: Some(RawId::Number(uploader)),
            item_id: Some(5),
            world_id: Some(21),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_listing_is_anonymized_and_totalled() {
        let f = fixture();
        let mut up = upload(42);
        up.listings = Some(vec![raw_listing(100, 3)]);

        let outcome = f.ingestor.process(up).await.unwrap();
        assert_eq!(outcome, UploadOutcome::Accepted { listings: 1, entries: 0 });

        let state = f.db.get_market_state(5, 21).unwrap().unwrap();
        let stored = &state.listings[0];
        assert_eq!(stored.total, 300);
        assert_eq!(stored.creator_id, hash_identity(1001));
        assert_eq!(stored.retainer_id, hash_identity("2002"));
        assert_eq!(stored.listing_id, hash_identity(9001));
        assert_eq!(stored.seller_id, hash_identity(3003));
        assert_eq!(stored.retainer_city, Some(RetainerCity::Kugane));
        assert!(stored.materia.is_empty());
        assert_eq!(state.uploader_id, hash_identity(42));
        assert!(state.recent_history.is_empty());
    }

    #[tokio::test]
    async fn test_registers_creator_and_retainer() {
        let f = fixture();
        let mut up = upload(42);
        up.listings = Some(vec![raw_listing(100, 3)]);
        f.ingestor.process(up).await.unwrap();

        let creator = f.content.get(&hash_identity(1001)).unwrap().unwrap();
        assert_eq!(creator.kind, ContentKind::Player);
        assert_eq!(creator.character_name, "Crafter Person");
        let retainer = f.content.get(&hash_identity(2002)).unwrap().unwrap();
        assert_eq!(retainer.kind, ContentKind::Retainer);
        assert_eq!(retainer.character_name, "Shopkeep");
    }

    #[tokio::test]
    async fn test_blacklisted_uploader_writes_nothing() {
        let f = fixture();
        f.filter.add(&hash_identity(666)).unwrap();

        let mut up = upload(666);
        up.listings = Some(vec![raw_listing(100, 3)]);
        up.entries = Some(vec![raw_entry(90, 1, 1_000)]);
        up.content_id = Some(RawId::Number(77));
        up.character_name = Some("Faker".into());

        let outcome = f.ingestor.process(up).await.unwrap();
        assert_eq!(outcome, UploadOutcome::Rejected);

        let stats = f.db.stats().unwrap();
        assert_eq!(stats.market_states, 0);
        assert_eq!(stats.extended_histories, 0);
        assert_eq!(stats.aggregate_slices, 0);
        assert_eq!(stats.content_entries, 0);
        assert_eq!(stats.upload_days, 0);
        assert_eq!(
            f.counters.get_daily_uploads().unwrap(),
            DailyUploadStatistics::empty()
        );
        assert!(f.counters.get_recently_updated_items().unwrap().items.is_empty());
    }

    #[tokio::test]
    async fn test_full_upload_fans_out() {
        let f = fixture();
        let mut up = upload(42);
        up.listings = Some(vec![raw_listing(100, 3), raw_listing(80, 2)]);
        up.entries = Some(vec![raw_entry(90, 2, 1_000), raw_entry(95, 1, 2_000)]);
        up.content_id = Some(RawId::Text("555".into()));
        up.character_name = Some("Uploader Person".into());

        let outcome = f.ingestor.process(up).await.unwrap();
        assert_eq!(outcome, UploadOutcome::Accepted { listings: 2, entries: 2 });

        let state = f.db.get_market_state(5, 21).unwrap().unwrap();
        assert_eq!(state.listings.len(), 2);
        let stamps: Vec<i64> = state.recent_history.iter().map(|s| s.timestamp).collect();
        assert_eq!(stamps, vec![2_000, 1_000]);
        assert_eq!(state.recent_history[1].total, 180);
        assert_eq!(f.db.get_extended_history(5, 21).unwrap().unwrap().entries.len(), 2);

        assert_eq!(f.counters.get_recently_updated_items().unwrap().items, vec![5]);
        assert_eq!(
            f.counters.get_daily_uploads().unwrap().upload_count_by_day[0].count,
            1
        );
        let profile = f.content.get(&hash_identity(555)).unwrap().unwrap();
        assert_eq!(profile.character_name, "Uploader Person");
    }

    #[tokio::test]
    async fn test_content_only_upload() {
        let f = fixture();
        let mut up = upload(42);
        up.content_id = Some(RawId::Number(10));
        up.character_name = Some("Solo".into());

        let outcome = f.ingestor.process(up).await.unwrap();
        assert_eq!(outcome, UploadOutcome::Accepted { listings: 0, entries: 0 });
        assert!(f.db.get_market_state(5, 21).unwrap().is_none());
        assert!(f.content.get(&hash_identity(10)).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_empty_upload_is_malformed() {
        let f = fixture();
        let err = f.ingestor.process(upload(42)).await.unwrap_err();
        assert!(matches!(err, MarketError::MalformedPayload(_)));

        let mut half = upload(42);
        half.content_id = Some(RawId::Number(10));
        let err = f.ingestor.process(half).await.unwrap_err();
        assert!(matches!(err, MarketError::MalformedPayload(_)));
        assert_eq!(f.db.stats().unwrap().upload_days, 0);
    }

    #[tokio::test]
    async fn test_missing_ids_are_malformed() {
        let f = fixture();
        let mut up = upload(42);
        up.item_id = None;
        up.listings = Some(vec![raw_listing(1, 1)]);
        assert!(matches!(
            f.ingestor.process(up).await.unwrap_err(),
            MarketError::MalformedPayload(_)
        ));

        let mut up = upload(42);
        up.world_id = Some(0);
        up.listings = Some(vec![raw_listing(1, 1)]);
        assert!(matches!(
            f.ingestor.process(up).await.unwrap_err(),
            MarketError::MalformedPayload(_)
        ));
    }

    #[tokio::test]
    async fn test_unknown_world_rejected_before_writes() {
        let f = fixture();
        let mut up = upload(42);
        up.world_id = Some(4242);
        up.listings = Some(vec![raw_listing(1, 1)]);

        let err = f.ingestor.process(up).await.unwrap_err();
        assert_eq!(err, MarketError::UnknownWorld(4242));
        let stats = f.db.stats().unwrap();
        assert_eq!(stats.upload_days, 0);
        assert_eq!(stats.market_states, 0);
    }

    #[tokio::test]
    async fn test_listing_without_price_is_malformed() {
        let f = fixture();
        let mut up = upload(42);
        let mut bad = raw_listing(1, 1);
        bad.price_per_unit = None;
        up.listings = Some(vec![raw_listing(2, 2), bad]);

        let err = f.ingestor.process(up).await.unwrap_err();
        assert!(matches!(err, MarketError::MalformedPayload(_)));
        assert_eq!(f.db.stats().unwrap().market_states, 0);
        assert_eq!(f.db.stats().unwrap().content_entries, 0);
    }

    #[tokio::test]
    async fn test_unrecognised_retainer_city_is_kept() {
        let f = fixture();
        let mut up = upload(42);
        let mut newer_town = raw_listing(1, 1);
        newer_town.retainer_city = Some(99);
        up.listings = Some(vec![newer_town]);
        up.entries = Some(vec![raw_entry(5, 1, 1_000)]);

        let outcome = f.ingestor.process(up).await.unwrap();
        assert_eq!(outcome, UploadOutcome::Accepted { listings: 1, entries: 1 });

        let state = f.db.get_market_state(5, 21).unwrap().unwrap();
        assert_eq!(state.listings[0].retainer_city, Some(RetainerCity::Other(99)));
        assert_eq!(state.recent_history.len(), 1);
        assert!(f.content.get(&hash_identity(2002)).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_uploader_total_is_ignored() {
        let f = fixture();
        let up: MarketUpload = serde_json::from_value(serde_json::json!({
            "uploaderID": "abc",
            "itemID": 5,
            "worldID": 22,
            "listings": [{ "pricePerUnit": 100, "quantity": 3, "total": 1 }]
        }))
        .unwrap();

        f.ingestor.process(up).await.unwrap();
        let state = f.db.get_market_state(5, 22).unwrap().unwrap();
        assert_eq!(state.listings[0].total, 300);
        assert_eq!(state.listings[0].creator_id, "");
    }
}
