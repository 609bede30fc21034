//! ============================================================================
//! Usage Counters - daily upload counts and recently updated items
//! ============================================================================
//! Side-channel telemetry. Both counters are updated inside a single write
//! transaction each, so concurrent uploads never lose an increment or a
//! move-to-front.
//! ============================================================================

use chrono::{Duration, NaiveDate, Utc};
use redb::ReadableTable;
use std::sync::Arc;
use tracing::debug;

use crate::db::{
    read_doc, write_doc, DailyUploadCount, DailyUploadStatistics, MarketDb,
    RecentlyUpdatedItems, DAILY_UPLOADS, EXTRA_DATA,
};
use crate::types::Result;

const RECENTLY_UPDATED_KEY: &str = "recentlyUpdated";
const DAY_FORMAT: &str = "%Y-%m-%d";

#[derive(Clone)]
pub struct UsageCounters {
    db: Arc<MarketDb>,
    recently_updated_len: usize,
    daily_stats_days: usize,
}

impl UsageCounters {
    pub fn new(db: Arc<MarketDb>, recently_updated_len: usize, daily_stats_days: usize) -> Self {
        Self {
            db,
            recently_updated_len,
            daily_stats_days,
        }
    }

    /// Count one upload in today's UTC bucket. Returns the new count.
    pub fn increment_daily_uploads(&self) -> Result<u64> {
        self.increment_uploads_on(Utc::now().date_naive())
    }

    pub(crate) fn increment_uploads_on(&self, day: NaiveDate) -> Result<u64> {
        let key = day.format(DAY_FORMAT).to_string();

        let write_txn = self.db.begin_write()?;
        let count;
        {
            let mut table = write_txn.open_table(DAILY_UPLOADS)?;
            let previous = table.get(key.as_str())?.map(|v| v.value());
            count = previous.unwrap_or(0) + 1;
            table.insert(key.as_str(), count)?;

            // New day: drop buckets that fell out of the retention window.
            // A window reaching past the calendar's start keeps everything.
            if let (None, Some(oldest)) = (previous, retention_start(day, self.daily_stats_days)) {
                let cutoff = oldest.format(DAY_FORMAT).to_string();
                let mut expired = Vec::new();
                for entry in table.range::<&str>(..cutoff.as_str())? {
                    let (k, _) = entry?;
                    expired.push(k.value().to_string());
                }
                for k in &expired {
                    table.remove(k.as_str())?;
                }
                debug!("Opened upload bucket {} ({} expired)", key, expired.len());
            }
        }
        write_txn.commit()?;

        Ok(count)
    }

    /// Move `item_id` to the front of the recently updated ledger.
    pub fn add_recently_updated_item(&self, item_id: u32) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(EXTRA_DATA)?;
            let mut recent: RecentlyUpdatedItems =
                read_doc(&table, RECENTLY_UPDATED_KEY)?.unwrap_or_else(RecentlyUpdatedItems::empty);
            touch_front(&mut recent.items, item_id, self.recently_updated_len);
            write_doc(&mut table, RECENTLY_UPDATED_KEY, &recent)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Upload counts, most recent day first, or the empty set
    pub fn get_daily_uploads(&self) -> Result<DailyUploadStatistics> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DAILY_UPLOADS)?;

        let mut stats = DailyUploadStatistics::empty();
        for entry in table.range::<&str>(..)?.rev().take(self.daily_stats_days) {
            let (date, count) = entry?;
            stats.upload_count_by_day.push(DailyUploadCount {
                date: date.value().to_string(),
                count: count.value(),
            });
        }
        Ok(stats)
    }

    pub fn get_recently_updated_items(&self) -> Result<RecentlyUpdatedItems> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(EXTRA_DATA)?;
        Ok(read_doc(&table, RECENTLY_UPDATED_KEY)?.unwrap_or_else(RecentlyUpdatedItems::empty))
    }
}

/// Oldest day still inside a `days`-long window ending at `day`
fn retention_start(day: NaiveDate, days: usize) -> Option<NaiveDate> {
    let span = i64::try_from(days).ok()?.checked_sub(1)?;
    day.checked_sub_signed(Duration::try_days(span)?)
}

/// Move-to-front with de-duplication, evicting from the back past `capacity`.
pub(crate) fn touch_front(items: &mut Vec<u32>, item_id: u32, capacity: usize) {
    items.retain(|id| *id != item_id);
    items.insert(0, item_id);
    items.truncate(capacity);
}
