//! ============================================================================
//! World Table - world ID → data center reference data
//! ============================================================================
//! Loaded once during startup from a CSV source (`id,name,data_center`) and
//! shared read-only afterwards. Staleness between restarts is acceptable.
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info};

use crate::types::{MarketError, Result};

/// One game world
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct World {
    pub id: u32,
    pub name: String,
    pub data_center: String,
}

/// Immutable world reference table
#[derive(Debug, Clone, Default)]
pub struct WorldTable {
    worlds: HashMap<u32, World>,
    by_name: HashMap<String, u32>,
    /// Canonical data-center name → member world IDs (sorted)
    data_centers: BTreeMap<String, Vec<u32>>,
}

impl WorldTable {
    /// Parse a CSV document with an `id,name,data_center` header.
    pub fn from_csv_str(source: &str) -> Result<Self> {
        let mut table = Self::default();
        let mut header_seen = false;

        for (index, line) in source.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if !header_seen {
                header_seen = true;
                if line.to_ascii_lowercase().starts_with("id,") {
                    continue;
                }
            }

            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            let [id, name, data_center] = fields.as_slice() else {
                return Err(MarketError::WorldTable(format!(
                    "line {}: expected 3 fields, got {}",
                    index + 1,
                    fields.len()
                )));
            };
            let id: u32 = id.parse().map_err(|_| {
                MarketError::WorldTable(format!("line {}: invalid world id '{}'", index + 1, id))
            })?;
            if name.is_empty() || data_center.is_empty() {
                return Err(MarketError::WorldTable(format!(
                    "line {}: empty world or data center name",
                    index + 1
                )));
            }

            table.insert(World {
                id,
                name: name.to_string(),
                data_center: data_center.to_string(),
            });
        }

        if table.worlds.is_empty() {
            return Err(MarketError::WorldTable("no worlds defined".to_string()));
        }

        info!(
            "Loaded {} worlds in {} data centers",
            table.worlds.len(),
            table.data_centers.len()
        );
        Ok(table)
    }

    /// Load the table from a CSV file
    pub fn load_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            MarketError::WorldTable(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_csv_str(&source)
    }

    /// Download the table from a URL serving the same CSV format
    pub async fn fetch(url: &str) -> Result<Self> {
        debug!("Fetching world table from {}", url);

        let response = reqwest::get(url)
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| MarketError::WorldTable(format!("Failed to fetch {}: {}", url, e)))?;
        let body = response
            .text()
            .await
            .map_err(|e| MarketError::WorldTable(format!("Failed to read body: {}", e)))?;

        Self::from_csv_str(&body)
    }

    fn insert(&mut self, world: World) {
        if let Some(previous) = self.worlds.get(&world.id) {
            let dc = previous.data_center.clone();
            if let Some(members) = self.data_centers.get_mut(&dc) {
                members.retain(|id| *id != world.id);
                if members.is_empty() {
                    self.data_centers.remove(&dc);
                }
            }
        }

        self.by_name.insert(normalize_name(&world.name), world.id);
        let members = self.data_centers.entry(world.data_center.clone()).or_default();
        members.push(world.id);
        members.sort_unstable();
        self.worlds.insert(world.id, world);
    }

    pub fn world(&self, world_id: u32) -> Option<&World> {
        self.worlds.get(&world_id)
    }

    pub fn contains(&self, world_id: u32) -> bool {
        self.worlds.contains_key(&world_id)
    }

    /// Data center a world belongs to
    pub fn data_center_of(&self, world_id: u32) -> Option<&str> {
        self.worlds.get(&world_id).map(|w| w.data_center.as_str())
    }

    /// Resolve a world name; case and non-letter characters are ignored.
    pub fn resolve_world_name(&self, name: &str) -> Option<u32> {
        self.by_name.get(&normalize_name(name)).copied()
    }

    /// Canonical spelling of a data-center name, matched case-insensitively
    pub fn data_center_named(&self, name: &str) -> Option<&str> {
        self.data_centers
            .keys()
            .find(|dc| dc.eq_ignore_ascii_case(name))
            .map(String::as_str)
    }

    pub fn is_data_center(&self, name: &str) -> bool {
        self.data_center_named(name).is_some()
    }

    /// Member worlds of a data center, ascending by ID
    pub fn worlds_in(&self, dc_name: &str) -> &[u32] {
        self.data_center_named(dc_name)
            .and_then(|dc| self.data_centers.get(dc))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn data_centers(&self) -> impl Iterator<Item = &str> {
        self.data_centers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.worlds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.worlds.is_empty()
    }
}

fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphabetic())
        .flat_map(char::to_lowercase)
        .collect()
}
