//! ============================================================================
//! Market Service - startup sequence and component wiring
//! ============================================================================
//! Phase 1: load the world table (file or URL)
//! Phase 2: open the store and create tables
//! Phase 3: wire every component with the shared store and world table
//!
//! Components require an `Arc<WorldTable>` to be built, so nothing can read
//! or write before the table is loaded.
//! ============================================================================

use std::sync::Arc;
use tracing::info;

use crate::blacklist::UploaderFilter;
use crate::config::{TrackerConfig, WorldSource};
use crate::content::ContentDirectory;
use crate::db::MarketDb;
use crate::ingest::Ingestor;
use crate::query::MarketQuery;
use crate::stats::UsageCounters;
use crate::trackers::{ListingsTracker, SaleHistoryTracker, WorldAggregator};
use crate::types::{MarketError, Result};
use crate::worlds::WorldTable;

/// Fully wired tracking core
#[derive(Clone)]
pub struct MarketService {
    db: Arc<MarketDb>,
    worlds: Arc<WorldTable>,
    aggregator: WorldAggregator,
    listings: ListingsTracker,
    history: SaleHistoryTracker,
    content: ContentDirectory,
    filter: UploaderFilter,
    counters: UsageCounters,
}

impl MarketService {
    /// Load the world table from the configured source, then open the store.
    pub async fn start(config: TrackerConfig) -> Result<Self> {
        config.validate()?;

        let worlds = match &config.world_source {
            Some(WorldSource::File(path)) => {
                info!("Loading world table from {}", path.display());
                WorldTable::load_file(path)?
            }
            Some(WorldSource::Url(url)) => {
                info!("Fetching world table from {}", url);
                WorldTable::fetch(url).await?
            }
            None => {
                return Err(MarketError::Config(
                    "No world table source configured (MARKETBOARD_WORLDS_FILE or MARKETBOARD_WORLDS_URL)"
                        .to_string(),
                ))
            }
        };
        info!(
            "World table loaded: {} worlds in {} data centers",
            worlds.len(),
            worlds.data_centers().count()
        );

        let worlds = Arc::new(worlds);
        tokio::task::spawn_blocking(move || Self::open(&config, worlds))
            .await
            .map_err(|e| MarketError::Worker(e.to_string()))?
    }

    /// Open the store with an already loaded world table.
    pub fn open(config: &TrackerConfig, worlds: Arc<WorldTable>) -> Result<Self> {
        config.validate()?;
        if worlds.is_empty() {
            return Err(MarketError::WorldTable("World table is empty".to_string()));
        }

        let db = Arc::new(MarketDb::open(config.db_path.as_deref())?);

        let aggregator = WorldAggregator::new(db.clone(), worlds.clone());
        let listings = ListingsTracker::new(db.clone(), aggregator.clone());
        let history = SaleHistoryTracker::new(
            db.clone(),
            aggregator.clone(),
            config.recent_history_len,
            config.extended_history_len,
        );
        let content = ContentDirectory::new(db.clone());
        let filter = UploaderFilter::new(db.clone());
        let counters = UsageCounters::new(
            db.clone(),
            config.recently_updated_len,
            config.daily_stats_days,
        );

        info!("Market service ready at {}", db.path().display());

        Ok(Self {
            db,
            worlds,
            aggregator,
            listings,
            history,
            content,
            filter,
            counters,
        })
    }

    pub fn ingestor(&self) -> Ingestor {
        Ingestor::new(
            self.worlds.clone(),
            self.filter.clone(),
            self.listings.clone(),
            self.history.clone(),
            self.content.clone(),
            self.counters.clone(),
        )
    }

    pub fn query(&self) -> MarketQuery {
        MarketQuery::new(
            self.db.clone(),
            self.worlds.clone(),
            self.aggregator.clone(),
            self.content.clone(),
        )
    }

    pub fn db(&self) -> &Arc<MarketDb> {
        &self.db
    }

    pub fn worlds(&self) -> &Arc<WorldTable> {
        &self.worlds
    }

    pub fn aggregator(&self) -> &WorldAggregator {
        &self.aggregator
    }

    pub fn listings(&self) -> &ListingsTracker {
        &self.listings
    }

    pub fn history(&self) -> &SaleHistoryTracker {
        &self.history
    }

    pub fn content(&self) -> &ContentDirectory {
        &self.content
    }

    /// Blacklist administration
    pub fn uploader_filter(&self) -> &UploaderFilter {
        &self.filter
    }

    pub fn counters(&self) -> &UsageCounters {
        &self.counters
    }
}
