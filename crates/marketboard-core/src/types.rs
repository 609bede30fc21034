//! ============================================================================
//! Shared types: errors and raw upload payloads
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::types::Materia;

/// Result alias for the tracking core
pub type Result<T> = std::result::Result<T, MarketError>;

/// Error types for the tracking core
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarketError {
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Unknown world: {0}")]
    UnknownWorld(u32),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("World table error: {0}")]
    WorldTable(String),

    #[error("Worker task failed: {0}")]
    Worker(String),
}

macro_rules! store_unavailable_from {
    ($($source:ty),+ $(,)?) => {
        $(
            impl From<$source> for MarketError {
                fn from(e: $source) -> Self {
                    MarketError::StoreUnavailable(e.to_string())
                }
            }
        )+
    };
}

store_unavailable_from!(
    redb::Error,
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
    bincode::Error,
);

/// Raw identifier as sent by clients: JSON number or string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Number(u64),
    Text(String),
}

impl fmt::Display for RawId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Listing as uploaded, before anonymization
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawListing {
    #[serde(rename = "listingID")]
    pub listing_id: Option<RawId>,
    #[serde(rename = "creatorID")]
    pub creator_id: Option<RawId>,
    pub creator_name: Option<String>,
    #[serde(rename = "retainerID")]
    pub retainer_id: Option<RawId>,
    pub retainer_name: Option<String>,
    #[serde(rename = "sellerID")]
    pub seller_id: Option<RawId>,
    #[serde(default)]
    pub hq: bool,
    pub price_per_unit: Option<u64>,
    pub quantity: Option<u32>,
    pub retainer_city: Option<u8>,
    pub materia: Option<Vec<Materia>>,
    #[serde(rename = "stainID")]
    pub stain_id: Option<u32>,
    #[serde(default)]
    pub on_mannequin: bool,
    pub last_review_time: Option<i64>,
}

/// Sale history entry as uploaded, before anonymization
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSaleEntry {
    #[serde(rename = "sellerID")]
    pub seller_id: Option<RawId>,
    pub buyer_name: Option<String>,
    #[serde(default)]
    pub hq: bool,
    pub price_per_unit: Option<u64>,
    pub quantity: Option<u32>,
    pub timestamp: Option<i64>,
}

/// One upload from a client. Any combination of listings, sale entries and
/// a character content ID may be present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketUpload {
    #[serde(rename = "uploaderID")]
    pub uploader_id: Option<RawId>,
    #[serde(rename = "itemID")]
    pub item_id: Option<u32>,
    #[serde(rename = "worldID")]
    pub world_id: Option<u32>,
    pub listings: Option<Vec<RawListing>>,
    pub entries: Option<Vec<RawSaleEntry>>,
    #[serde(rename = "contentID")]
    pub content_id: Option<RawId>,
    pub character_name: Option<String>,
}

/// What happened to an upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadOutcome {
    Accepted { listings: usize, entries: usize },
    /// Uploader is blacklisted; nothing was written
    Rejected,
}

/// Current time in epoch milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
