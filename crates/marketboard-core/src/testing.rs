// Shared fixtures for unit tests

use std::sync::Arc;
use tempfile::TempDir;

use crate::db::{line_total, Listing, MarketDb, SaleRecord};
use crate::worlds::WorldTable;

pub(crate) const WORLDS_CSV: &str = "\
id,name,data_center
21,Ravana,Materia
22,Bismarck,Materia
86,Sephirot,Materia
33,Twintania,Light
36,Lich,Light
65,Midgardsormr,Aether
73,Adamantoise,Aether
79,Cactuar,Aether
";

pub(crate) fn temp_db() -> (TempDir, Arc<MarketDb>) {
    let dir = TempDir::new().unwrap();
    let db = MarketDb::open(Some(&dir.path().join("market.redb"))).unwrap();
    (dir, Arc::new(db))
}

pub(crate) fn worlds() -> Arc<WorldTable> {
    Arc::new(WorldTable::from_csv_str(WORLDS_CSV).unwrap())
}

pub(crate) fn listing(price_per_unit: u64, quantity: u32) -> Listing {
    Listing {
        listing_id: format!("listing-{}-{}", price_per_unit, quantity),
        creator_id: String::new(),
        creator_name: None,
        retainer_id: "retainer".to_string(),
        retainer_name: Some("Shopkeep".to_string()),
        seller_id: "seller".to_string(),
        hq: false,
        price_per_unit,
        quantity,
        total: line_total(price_per_unit, quantity),
        retainer_city: None,
        materia: Vec::new(),
        stain_id: 0,
        on_mannequin: false,
        last_review_time: 0,
    }
}

pub(crate) fn sale(price_per_unit: u64, quantity: u32, timestamp: i64) -> SaleRecord {
    SaleRecord {
        seller_id: "seller".to_string(),
        buyer_name: Some("Buyer Name".to_string()),
        hq: false,
        price_per_unit,
        quantity,
        total: line_total(price_per_unit, quantity),
        timestamp,
    }
}
