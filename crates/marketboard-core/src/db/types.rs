//! ============================================================================
//! Database Types - Serializable market documents for redb storage
//! ============================================================================
//! Field names follow the public document shapes (`itemID`, `worldID`,
//! `recentHistory`, ...). Every identity field holds a hashed token.
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Town a retainer is registered in. Codes added by later game versions
/// are kept verbatim as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum RetainerCity {
    LimsaLominsa,
    Gridania,
    Uldah,
    Ishgard,
    Kugane,
    Crystarium,
    OldSharlayan,
    Other(u8),
}

impl From<u8> for RetainerCity {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::LimsaLominsa,
            2 => Self::Gridania,
            3 => Self::Uldah,
            4 => Self::Ishgard,
            7 => Self::Kugane,
            10 => Self::Crystarium,
            12 => Self::OldSharlayan,
            other => Self::Other(other),
        }
    }
}

impl From<RetainerCity> for u8 {
    fn from(city: RetainerCity) -> Self {
        match city {
            RetainerCity::LimsaLominsa => 1,
            RetainerCity::Gridania => 2,
            RetainerCity::Uldah => 3,
            RetainerCity::Ishgard => 4,
            RetainerCity::Kugane => 7,
            RetainerCity::Crystarium => 10,
            RetainerCity::OldSharlayan => 12,
            RetainerCity::Other(code) => code,
        }
    }
}

/// Materia melded into a listed item
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Materia {
    #[serde(rename = "slotID")]
    pub slot_id: u32,
    #[serde(rename = "materiaID")]
    pub materia_id: u32,
}

/// One active sell order for an item on one world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    #[serde(rename = "listingID")]
    pub listing_id: String,
    #[serde(rename = "creatorID")]
    pub creator_id: String,
    pub creator_name: Option<String>,
    #[serde(rename = "retainerID")]
    pub retainer_id: String,
    pub retainer_name: Option<String>,
    #[serde(rename = "sellerID")]
    pub seller_id: String,
    pub hq: bool,
    pub price_per_unit: u64,
    pub quantity: u32,
    /// Always `price_per_unit * quantity`, never taken from the uploader
    pub total: u64,
    pub retainer_city: Option<RetainerCity>,
    pub materia: Vec<Materia>,
    #[serde(rename = "stainID")]
    pub stain_id: u32,
    pub on_mannequin: bool,
    pub last_review_time: i64,
}

/// One completed transaction for an item on one world.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleRecord {
    #[serde(rename = "sellerID")]
    pub seller_id: String,
    pub buyer_name: Option<String>,
    pub hq: bool,
    pub price_per_unit: u64,
    pub quantity: u32,
    pub total: u64,
    pub timestamp: i64,
}

/// `price_per_unit * quantity`, saturating instead of wrapping.
pub fn line_total(price_per_unit: u64, quantity: u32) -> u64 {
    price_per_unit.saturating_mul(u64::from(quantity))
}

/// Current state of one (item, world) market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketState {
    #[serde(rename = "itemID")]
    pub item_id: u32,
    #[serde(rename = "worldID")]
    pub world_id: u32,
    /// Hashed token of the last writer
    #[serde(rename = "uploaderID")]
    pub uploader_id: String,
    /// Epoch milliseconds
    pub last_upload_time: i64,
    /// Last full snapshot, upload order
    pub listings: Vec<Listing>,
    /// Most-recent-first, owned by the sale history path
    pub recent_history: Vec<SaleRecord>,
}

/// Long, capacity-bounded sale ledger for one (item, world).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedHistory {
    #[serde(rename = "itemID")]
    pub item_id: u32,
    #[serde(rename = "worldID")]
    pub world_id: u32,
    pub last_upload_time: i64,
    pub entries: Vec<SaleRecord>,
}

/// Property of a market that is rolled up per data center.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateProperty {
    Listings,
    History,
}

impl AggregateProperty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Listings => "listings",
            Self::History => "history",
        }
    }
}

/// Header document created on the first write for an (item, data center).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateHeader {
    #[serde(rename = "itemID")]
    pub item_id: u32,
    pub dc_name: String,
    pub created_at: i64,
    pub last_upload_time: i64,
}

/// One world's slice of an aggregated property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldSlice<T> {
    #[serde(rename = "worldID")]
    pub world_id: u32,
    #[serde(rename = "uploaderID")]
    pub uploader_id: String,
    pub last_upload_time: i64,
    pub entries: Vec<T>,
}

/// Cross-world rollup of one item within a data center.
///
/// Assembled from the header and the per-world slices; never written as a
/// whole.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataCenterAggregate {
    #[serde(rename = "itemID")]
    pub item_id: u32,
    pub dc_name: String,
    pub last_upload_time: i64,
    pub listings: BTreeMap<u32, Vec<Listing>>,
    pub history: BTreeMap<u32, Vec<SaleRecord>>,
}

/// Kind of identity behind a content token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Player,
    Retainer,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Player => "player",
            Self::Retainer => "retainer",
        }
    }
}

/// Public record for a hashed player or retainer identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentEntry {
    #[serde(rename = "contentID")]
    pub content_id: String,
    pub kind: ContentKind,
    pub character_name: String,
}

/// Upload count for one UTC day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyUploadCount {
    pub date: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyUploadStatistics {
    pub set_name: String,
    /// Most recent day first
    pub upload_count_by_day: Vec<DailyUploadCount>,
}

impl DailyUploadStatistics {
    pub const SET_NAME: &'static str = "uploadCountHistory";

    pub fn empty() -> Self {
        Self {
            set_name: Self::SET_NAME.to_string(),
            upload_count_by_day: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentlyUpdatedItems {
    pub set_name: String,
    /// Most recently touched item first, no duplicates
    pub items: Vec<u32>,
}

impl RecentlyUpdatedItems {
    pub const SET_NAME: &'static str = "recentlyUpdated";

    pub fn empty() -> Self {
        Self {
            set_name: Self::SET_NAME.to_string(),
            items: Vec::new(),
        }
    }
}

/// Document counts per table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbStats {
    pub market_states: usize,
    pub extended_histories: usize,
    pub aggregates: usize,
    pub aggregate_slices: usize,
    pub content_entries: usize,
    pub blacklisted: usize,
    pub upload_days: usize,
}
