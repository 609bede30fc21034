//! ============================================================================
//! Trackers - read-merge-write of market documents per (item, world)
//! ============================================================================
//! Both trackers compose one shared [`WorldAggregator`] for the data-center
//! rollup instead of extending it.
//!
//! ```text
//!  ListingsTracker ──┐                 ┌─► recent_data (MarketState)
//!                    ├─ write txn ─────┼─► extended_history (history only)
//! SaleHistoryTracker ┘       │         └─► dc_aggregates / dc_slices
//!                            └── WorldAggregator
//! ```
//! ============================================================================

mod aggregate;
mod history;
mod listings;

pub use aggregate::WorldAggregator;
pub use history::SaleHistoryTracker;
pub use listings::ListingsTracker;
