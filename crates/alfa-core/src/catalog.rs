//! Catalog-level helpers: SKU allocation, folding reconciler output, inventory views.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scoring::asset_score;
use crate::{
    Asset, LifecycleStage, MonetizationLink, OwnershipType, PinMetric, Rarity, SourceStatus,
};

/// Next free `SKU-nnnnn`, starting at catalog size + 1.
pub fn next_sku(assets: &[Asset]) -> String {
    let taken: BTreeSet<&str> = assets.iter().map(|a| a.sku_id.as_str()).collect();
    let mut n = assets.len() + 1;
    loop {
        let candidate = format!("SKU-{n:05}");
        if !taken.contains(candidate.as_str()) {
            return candidate;
        }
        n += 1;
    }
}

pub fn new_asset(
    sku_id: impl Into<String>,
    display_name: impl Into<String>,
    parent_artist_ids: BTreeSet<String>,
    ownership_type: OwnershipType,
    now: DateTime<Utc>,
) -> Asset {
    Asset {
        sku_id: sku_id.into(),
        display_name: display_name.into(),
        parent_artist_ids,
        file_path_drive: None,
        source_status: SourceStatus::Raw,
        ownership_type,
        current_rarity: Rarity::Common,
        lifecycle_stage: LifecycleStage::Incubation,
        created_at: now,
        is_collection: false,
        pins: Vec::new(),
    }
}

/// Replaces pins by `pin_id` with refreshed metrics. Pins that were not refreshed are kept;
/// refreshed pins the asset does not hold yet are appended.
pub fn apply_pin_updates(
    assets: &[Asset],
    updated_pins_by_sku: &BTreeMap<String, Vec<PinMetric>>,
) -> Vec<Asset> {
    assets
        .iter()
        .map(|asset| {
            let Some(updates) = updated_pins_by_sku.get(&asset.sku_id) else {
                return asset.clone();
            };
            let mut refreshed = asset.clone();
            for update in updates {
                match refreshed.pins.iter_mut().find(|p| p.pin_id == update.pin_id) {
                    Some(slot) => *slot = update.clone(),
                    None => refreshed.pins.push(update.clone()),
                }
            }
            refreshed
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventorySort {
    #[default]
    Score,
    Outbound,
    Yield,
}

pub fn revenue_for(sku: &str, links: &[MonetizationLink]) -> f64 {
    links
        .iter()
        .filter(|l| l.asset_sku == sku)
        .map(|l| l.revenue_generated)
        .sum()
}

/// Assets ordered descending by the chosen key; ties keep catalog order.
pub fn inventory<'a>(
    assets: &'a [Asset],
    links: &[MonetizationLink],
    sort: InventorySort,
) -> Vec<&'a Asset> {
    let mut keyed: Vec<(f64, &Asset)> = assets
        .iter()
        .map(|a| {
            let key = match sort {
                InventorySort::Score => asset_score(a),
                InventorySort::Outbound => a.total_outbound() as f64,
                InventorySort::Yield => revenue_for(&a.sku_id, links),
            };
            (key, a)
        })
        .collect();
    keyed.sort_by(|a, b| b.0.total_cmp(&a.0));
    keyed.into_iter().map(|(_, a)| a).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuditCounts {
    pub raw: usize,
    pub exported: usize,
    pub zipped: usize,
    pub incubation: usize,
    pub monetization: usize,
    pub domain: usize,
    /// Assets with no pins at all.
    pub unpinned: usize,
}

pub fn audit_counts(assets: &[Asset]) -> AuditCounts {
    let mut counts = AuditCounts::default();
    for asset in assets {
        match asset.source_status {
            SourceStatus::Raw => counts.raw += 1,
            SourceStatus::Exported => counts.exported += 1,
            SourceStatus::Zipped => counts.zipped += 1,
        }
        match asset.lifecycle_stage {
            LifecycleStage::Incubation => counts.incubation += 1,
            LifecycleStage::Monetization => counts.monetization += 1,
            LifecycleStage::Domain => counts.domain += 1,
        }
        if asset.pins.is_empty() {
            counts.unpinned += 1;
        }
    }
    counts
}
