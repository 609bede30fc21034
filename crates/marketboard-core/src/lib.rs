//! ============================================================================
//! MARKETBOARD-CORE: crowd-sourced market tracking
//! ============================================================================
//! This crate handles everything behind an upload:
//! - Identity hashing and the uploader blacklist
//! - Per-world listings and sale history with data-center rollups
//! - Content IDs for players and retainers
//! - Daily upload counters and the recently updated ledger
//! - Read-side views over all of the above
//! ============================================================================

pub mod blacklist;
pub mod config;
pub mod content;
pub mod db;
pub mod hashing;
pub mod ingest;
pub mod query;
pub mod service;
pub mod stats;
pub mod trackers;
pub mod types;
pub mod worlds;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use types::*;
pub use blacklist::UploaderFilter;
pub use config::{TrackerConfig, WorldSource};
pub use content::{ContentDirectory, ContentFields};
pub use db::MarketDb;
pub use hashing::hash_identity;
pub use ingest::Ingestor;
pub use query::{HistoryView, MarketQuery, MarketView, Scope};
pub use service::MarketService;
pub use stats::UsageCounters;
pub use trackers::{ListingsTracker, SaleHistoryTracker, WorldAggregator};
pub use worlds::{World, WorldTable};
