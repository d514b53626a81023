//! Integrity reconciler: matches external engagement records against the pins known assets own.
//!
//! Each external record is either
//! - a refresh of a pin owned by exactly one asset,
//! - an orphan nobody owns (UNMAPPED_RESOURCE mission), or
//! - a pin claimed by several assets, which is an upstream integrity fault (INTEGRITY_AUDIT
//!   mission, no owner is picked and nothing is refreshed).

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::missions::merge_missions;
use crate::scoring::{display_score, orphan_score};
use crate::{
    evidence_entry, Asset, EngagementItem, Mission, MissionType, PinMetric, Priority, UNKNOWN_SKU,
};

/// Orphans scoring above this are HIGH priority, the rest MEDIUM.
pub const ORPHAN_HIGH_PRIORITY_SCORE: f64 = 100.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    pub updated_pins_by_sku: BTreeMap<String, Vec<PinMetric>>,
    pub orphans: Vec<EngagementItem>,
    pub missions: Vec<Mission>,
}

pub fn orphan_mission_id(external_id: &str) -> String {
    format!("ORPHAN-{external_id}")
}

pub fn audit_mission_id(pin_id: &str) -> String {
    format!("AUDIT-{pin_id}")
}

/// `now` only stamps `created_at` on emitted missions.
pub fn reconcile(
    assets: &[Asset],
    items: &[EngagementItem],
    now: DateTime<Utc>,
) -> ReconcileOutcome {
    let owners = registered_owners(assets);
    let mut outcome = ReconcileOutcome::default();
    let mut detected: Vec<Mission> = Vec::new();

    for item in items {
        match owners.get(item.id.as_str()) {
            Some(skus) if skus.len() == 1 => {
                let Some(sku) = skus.iter().next() else {
                    continue;
                };
                let url = existing_url(assets, sku, &item.id);
                let refreshed = PinMetric::from_counters(item.id.clone(), url, &item.counters);
                let pins = outcome.updated_pins_by_sku.entry((*sku).to_string()).or_default();
                match pins.iter_mut().find(|p| p.pin_id == refreshed.pin_id) {
                    Some(slot) => *slot = refreshed,
                    None => pins.push(refreshed),
                }
            }
            Some(skus) => detected.push(duplicate_owner_mission(&item.id, skus, now)),
            None => {
                match outcome.orphans.iter_mut().find(|o| o.id == item.id) {
                    Some(slot) => *slot = item.clone(),
                    None => outcome.orphans.push(item.clone()),
                }
                detected.push(orphan_mission(item, now));
            }
        }
    }

    outcome.missions = merge_missions(&[], &detected);
    outcome
}

fn registered_owners(assets: &[Asset]) -> BTreeMap<&str, BTreeSet<&str>> {
    let mut owners: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for asset in assets {
        for pin in &asset.pins {
            owners
                .entry(pin.pin_id.as_str())
                .or_default()
                .insert(asset.sku_id.as_str());
        }
    }
    owners
}

fn existing_url(assets: &[Asset], sku: &str, pin_id: &str) -> String {
    assets
        .iter()
        .filter(|a| a.sku_id == sku)
        .flat_map(|a| a.pins.iter())
        .find(|p| p.pin_id == pin_id)
        .map(|p| p.url.clone())
        .unwrap_or_default()
}

fn orphan_mission(item: &EngagementItem, now: DateTime<Utc>) -> Mission {
    let score = orphan_score(&item.counters);
    let priority = if score > ORPHAN_HIGH_PRIORITY_SCORE {
        Priority::High
    } else {
        Priority::Medium
    };

    Mission::open(
        orphan_mission_id(&item.id),
        MissionType::UnmappedResource,
        priority,
        Some(UNKNOWN_SKU.to_string()),
        format!(
            "Unmapped resource: external pin {} ({}) is not linked to any asset.",
            item.id, item.title
        ),
        vec![
            evidence_entry("SCORE", display_score(score)),
            evidence_entry("IMP", item.counters.impressions),
            evidence_entry("SAVE", item.counters.saves),
            evidence_entry("OUT", item.counters.outbound_clicks),
        ],
        vec![
            format!("Claim pin {} into an existing SKU", item.id),
            "Or register a new asset for it".to_string(),
        ],
        now,
    )
}

fn duplicate_owner_mission(pin_id: &str, skus: &BTreeSet<&str>, now: DateTime<Utc>) -> Mission {
    let mut evidence = vec![evidence_entry("PIN", pin_id)];
    evidence.extend(skus.iter().map(|sku| evidence_entry("OWNER", sku)));

    Mission::open(
        audit_mission_id(pin_id),
        MissionType::IntegrityAudit,
        Priority::High,
        None,
        format!("Integrity fault: pin {pin_id} is claimed by {} assets.", skus.len()),
        evidence,
        vec![
            format!("Keep pin {pin_id} on exactly one SKU"),
            "Re-run the reconciliation cycle".to_string(),
        ],
        now,
    )
}
