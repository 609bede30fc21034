//! ============================================================================
//! Market Query - read-side views over the tracked documents
//! ============================================================================
//! Pure reads. Nothing here touches the usage counters or any other
//! document. Missing data is an empty view, never an error.
//! ============================================================================

use serde::Serialize;
use std::sync::Arc;

use crate::content::ContentDirectory;
use crate::db::{ContentEntry, Listing, MarketDb, SaleRecord};
use crate::hashing::hash_identity;
use crate::trackers::WorldAggregator;
use crate::types::{MarketError, Result};
use crate::worlds::WorldTable;

/// Upper bound on entries returned by one history query
pub const MAX_HISTORY_ENTRIES: usize = 500;

/// Where a query looks: one world, or every world of a data center.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    World(u32),
    DataCenter(String),
}

/// Listing annotated with its world when viewed across a data center
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopedListing {
    #[serde(flatten)]
    pub listing: Listing,
    #[serde(rename = "worldID", skip_serializing_if = "Option::is_none")]
    pub world_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopedSale {
    #[serde(flatten)]
    pub sale: SaleRecord,
    #[serde(rename = "worldID", skip_serializing_if = "Option::is_none")]
    pub world_id: Option<u32>,
}

/// Current market for one item, without the uploader token.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketView {
    #[serde(rename = "itemID")]
    pub item_id: u32,
    #[serde(rename = "worldID", skip_serializing_if = "Option::is_none")]
    pub world_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dc_name: Option<String>,
    pub last_upload_time: i64,
    pub listings: Vec<ScopedListing>,
    pub recent_history: Vec<ScopedSale>,
}

/// Extended sale ledger for one item.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryView {
    #[serde(rename = "itemID")]
    pub item_id: u32,
    #[serde(rename = "worldID", skip_serializing_if = "Option::is_none")]
    pub world_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dc_name: Option<String>,
    pub last_upload_time: i64,
    pub entries: Vec<ScopedSale>,
}

#[derive(Clone)]
pub struct MarketQuery {
    db: Arc<MarketDb>,
    worlds: Arc<WorldTable>,
    aggregator: WorldAggregator,
    content: ContentDirectory,
}

impl MarketQuery {
    pub fn new(
        db: Arc<MarketDb>,
        worlds: Arc<WorldTable>,
        aggregator: WorldAggregator,
        content: ContentDirectory,
    ) -> Self {
        Self {
            db,
            worlds,
            aggregator,
            content,
        }
    }

    /// Numeric world ID, world name, or otherwise a data-center name.
    pub fn resolve_scope(&self, target: &str) -> Scope {
        let target = target.trim();
        if let Ok(world_id) = target.parse::<u32>() {
            return Scope::World(world_id);
        }
        if let Some(world_id) = self.worlds.resolve_world_name(target) {
            return Scope::World(world_id);
        }
        let dc_name = self
            .worlds
            .data_center_named(target)
            .unwrap_or(target)
            .to_string();
        Scope::DataCenter(dc_name)
    }

    /// Current listings and recent history for an item.
    ///
    /// Data-center views tag every row with its world; listings are cheapest
    /// first and history newest first.
    pub fn current(&self, item_id: u32, scope: &Scope) -> Result<MarketView> {
        match scope {
            Scope::World(world_id) => {
                self.check_world(*world_id)?;
                let state = self.db.get_market_state(item_id, *world_id)?;
                Ok(match state {
                    Some(state) => MarketView {
                        item_id,
                        world_id: Some(*world_id),
                        dc_name: None,
                        last_upload_time: state.last_upload_time,
                        listings: state.listings.into_iter().map(untagged_listing).collect(),
                        recent_history: state
                            .recent_history
                            .into_iter()
                            .map(|sale| ScopedSale { sale, world_id: None })
                            .collect(),
                    },
                    None => MarketView {
                        item_id,
                        world_id: Some(*world_id),
                        dc_name: None,
                        last_upload_time: 0,
                        listings: Vec::new(),
                        recent_history: Vec::new(),
                    },
                })
            }
            Scope::DataCenter(dc_name) => {
                let mut view = MarketView {
                    item_id,
                    world_id: None,
                    dc_name: Some(dc_name.clone()),
                    last_upload_time: 0,
                    listings: Vec::new(),
                    recent_history: Vec::new(),
                };
                let Some(aggregate) = self.aggregator.get(item_id, dc_name)? else {
                    return Ok(view);
                };

                view.last_upload_time = aggregate.last_upload_time;
                for (world_id, listings) in aggregate.listings {
                    view.listings.extend(listings.into_iter().map(|listing| ScopedListing {
                        listing,
                        world_id: Some(world_id),
                    }));
                }
                for (world_id, history) in aggregate.history {
                    view.recent_history
                        .extend(history.into_iter().map(|sale| ScopedSale {
                            sale,
                            world_id: Some(world_id),
                        }));
                }
                view.listings
                    .sort_by(|a, b| a.listing.price_per_unit.cmp(&b.listing.price_per_unit));
                view.recent_history
                    .sort_by(|a, b| b.sale.timestamp.cmp(&a.sale.timestamp));
                Ok(view)
            }
        }
    }

    /// Extended history, newest first, capped at `min(500, entries)` when a
    /// limit is requested.
    pub fn history(
        &self,
        item_id: u32,
        scope: &Scope,
        entries: Option<usize>,
    ) -> Result<HistoryView> {
        let limit = entries.map(|n| n.min(MAX_HISTORY_ENTRIES));

        let mut view = match scope {
            Scope::World(world_id) => {
                self.check_world(*world_id)?;
                let ledger = self.db.get_extended_history(item_id, *world_id)?;
                let (last_upload_time, entries) = ledger
                    .map(|h| (h.last_upload_time, h.entries))
                    .unwrap_or_default();
                HistoryView {
                    item_id,
                    world_id: Some(*world_id),
                    dc_name: None,
                    last_upload_time,
                    entries: entries
                        .into_iter()
                        .map(|sale| ScopedSale { sale, world_id: None })
                        .collect(),
                }
            }
            Scope::DataCenter(dc_name) => {
                let mut view = HistoryView {
                    item_id,
                    world_id: None,
                    dc_name: Some(dc_name.clone()),
                    last_upload_time: 0,
                    entries: Vec::new(),
                };
                for &world_id in self.worlds.worlds_in(dc_name) {
                    let Some(ledger) = self.db.get_extended_history(item_id, world_id)? else {
                        continue;
                    };
                    view.last_upload_time = view.last_upload_time.max(ledger.last_upload_time);
                    view.entries
                        .extend(ledger.entries.into_iter().map(|sale| ScopedSale {
                            sale,
                            world_id: Some(world_id),
                        }));
                }
                view.entries
                    .sort_by(|a, b| b.sale.timestamp.cmp(&a.sale.timestamp));
                view
            }
        };

        if let Some(limit) = limit {
            view.entries.truncate(limit);
        }
        Ok(view)
    }

    /// Look up a content record by raw ID, or by its token when `id` is
    /// already a 64-character hex digest.
    pub fn content(&self, id: &str) -> Result<Option<ContentEntry>> {
        let token = if is_token(id) {
            id.to_ascii_lowercase()
        } else {
            hash_identity(id)
        };
        self.content.get(&token)
    }

    fn check_world(&self, world_id: u32) -> Result<()> {
        if self.worlds.contains(world_id) {
            Ok(())
        } else {
            Err(MarketError::UnknownWorld(world_id))
        }
    }
}

fn untagged_listing(listing: Listing) -> ScopedListing {
    ScopedListing {
        listing,
        world_id: None,
    }
}

fn is_token(id: &str) -> bool {
    id.len() == 64 && id.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentFields;
    use crate::db::ContentKind;
    use crate::testing::{listing, sale, temp_db, worlds};
    use crate::trackers::{ListingsTracker, SaleHistoryTracker};

    struct Fixture {
        _dir: tempfile::TempDir,
        query: MarketQuery,
        listings: ListingsTracker,
        history: SaleHistoryTracker,
        content: ContentDirectory,
        db: Arc<MarketDb>,
    }

    fn fixture() -> Fixture {
        let (dir, db) = temp_db();
        let worlds = worlds();
        let aggregator = WorldAggregator::new(db.clone(), worlds.clone());
        let content = ContentDirectory::new(db.clone());
        Fixture {
            _dir: dir,
            query: MarketQuery::new(db.clone(), worlds, aggregator.clone(), content.clone()),
            listings: ListingsTracker::new(db.clone(), aggregator.clone()),
            history: SaleHistoryTracker::new(db.clone(), aggregator, 20, 1800),
            content,
            db,
        }
    }

    #[test]
    fn test_resolve_scope() {
        let f = fixture();
        assert_eq!(f.query.resolve_scope("21"), Scope::World(21));
        assert_eq!(f.query.resolve_scope("ravana"), Scope::World(21));
        assert_eq!(f.query.resolve_scope("Mid-gardsormr"), Scope::World(65));
        assert_eq!(
            f.query.resolve_scope("aether"),
            Scope::DataCenter("Aether".into())
        );
        assert_eq!(
            f.query.resolve_scope("Nowhere"),
            Scope::DataCenter("Nowhere".into())
        );
    }

    #[test]
    fn test_empty_views() {
        let f = fixture();

        let view = f.query.current(5, &Scope::World(21)).unwrap();
        assert_eq!(view.last_upload_time, 0);
        assert!(view.listings.is_empty());
        assert!(view.recent_history.is_empty());

        let view = f.query.current(5, &Scope::DataCenter("Light".into())).unwrap();
        assert_eq!(view.dc_name.as_deref(), Some("Light"));
        assert_eq!(view.last_upload_time, 0);

        let history = f.query.history(5, &Scope::World(21), Some(10)).unwrap();
        assert!(history.entries.is_empty());
        assert_eq!(history.last_upload_time, 0);
    }

    #[test]
    fn test_world_view_hides_uploader() {
        let f = fixture();
        f.listings.set("secret-token", 5, 21, vec![listing(100, 3)]).unwrap();

        let view = f.query.current(5, &Scope::World(21)).unwrap();
        assert_eq!(view.listings.len(), 1);
        assert!(view.last_upload_time > 0);

        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("uploaderID").is_none());
        assert_eq!(json["worldID"], 21);
        assert_eq!(json["listings"][0]["pricePerUnit"], 100);
        assert!(json["listings"][0].get("worldID").is_none());
        assert!(!json.to_string().contains("secret-token"));
    }

    #[test]
    fn test_data_center_view_unions_worlds() {
        let f = fixture();
        f.listings.set("u", 5, 21, vec![listing(300, 1), listing(100, 1)]).unwrap();
        f.listings.set("u", 5, 22, vec![listing(200, 1)]).unwrap();
        f.listings.set("u", 5, 33, vec![listing(1, 1)]).unwrap();
        f.history.set("u", 5, 22, vec![sale(10, 1, 50)]).unwrap();
        f.history.set("u", 5, 86, vec![sale(10, 1, 70)]).unwrap();

        let view = f.query.current(5, &Scope::DataCenter("Materia".into())).unwrap();
        let prices: Vec<u64> = view.listings.iter().map(|l| l.listing.price_per_unit).collect();
        assert_eq!(prices, vec![100, 200, 300]);
        assert_eq!(view.listings[1].world_id, Some(22));

        let worlds: Vec<Option<u32>> = view.recent_history.iter().map(|s| s.world_id).collect();
        assert_eq!(worlds, vec![Some(86), Some(22)]);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["dcName"], "Materia");
        assert_eq!(json["listings"][0]["worldID"], 21);
    }

    #[test]
    fn test_history_limit() {
        let f = fixture();
        let entries: Vec<SaleRecord> = (0..600).map(|i| sale(1, 1, i)).collect();
        f.history.set("u", 5, 21, entries).unwrap();

        let all = f.query.history(5, &Scope::World(21), None).unwrap();
        assert_eq!(all.entries.len(), 600);

        let some = f.query.history(5, &Scope::World(21), Some(3)).unwrap();
        let stamps: Vec<i64> = some.entries.iter().map(|s| s.sale.timestamp).collect();
        assert_eq!(stamps, vec![599, 598, 597]);

        let capped = f.query.history(5, &Scope::World(21), Some(10_000)).unwrap();
        assert_eq!(capped.entries.len(), MAX_HISTORY_ENTRIES);
    }

    #[test]
    fn test_data_center_history_merges_ledgers() {
        let f = fixture();
        f.history.set("u", 5, 33, vec![sale(1, 1, 10), sale(1, 1, 30)]).unwrap();
        f.history.set("u", 5, 36, vec![sale(2, 1, 20)]).unwrap();

        let view = f.query.history(5, &Scope::DataCenter("Light".into()), None).unwrap();
        let rows: Vec<(i64, Option<u32>)> = view
            .entries
            .iter()
            .map(|s| (s.sale.timestamp, s.world_id))
            .collect();
        assert_eq!(rows, vec![(30, Some(33)), (20, Some(36)), (10, Some(33))]);
        assert!(view.last_upload_time > 0);
    }

    #[test]
    fn test_unknown_world_scope() {
        let f = fixture();
        assert_eq!(
            f.query.current(5, &Scope::World(4242)).unwrap_err(),
            MarketError::UnknownWorld(4242)
        );
    }

    #[test]
    fn test_content_lookup_by_raw_or_token() {
        let f = fixture();
        let token = hash_identity(1001);
        f.content
            .set(&token, ContentKind::Player, ContentFields::named("A"))
            .unwrap();

        assert_eq!(f.query.content("1001").unwrap().unwrap().character_name, "A");
        assert!(f.query.content(&token).unwrap().is_some());
        assert!(f.query.content("1002").unwrap().is_none());
    }

    #[test]
    fn test_queries_do_not_touch_counters() {
        let f = fixture();
        f.listings.set("u", 5, 21, vec![listing(1, 1)]).unwrap();
        let before = f.db.stats().unwrap();

        f.query.current(5, &Scope::World(21)).unwrap();
        f.query.history(5, &Scope::DataCenter("Materia".into()), Some(5)).unwrap();
        f.query.content("1").unwrap();

        assert_eq!(f.db.stats().unwrap(), before);
    }
}
