//! Revenue-leak detection: high purchase intent with nowhere to buy, and registered assets
//! with no pin presence at all.

use chrono::{DateTime, Utc};

use crate::{
    evidence_entry, Asset, LifecycleStage, LinkStatus, Mission, MissionType, MonetizationLink,
    Priority,
};

pub const LEAK_OUTBOUND_THRESHOLD: u64 = 10;

pub fn leak_mission_id(sku: &str) -> String {
    format!("LEAK-{sku}")
}

pub fn unpinned_mission_id(sku: &str) -> String {
    format!("UNPINNED-{sku}")
}

pub fn has_active_monetization(sku: &str, links: &[MonetizationLink]) -> bool {
    links
        .iter()
        .any(|l| l.asset_sku == sku && l.status == LinkStatus::Active)
}

/// Emits one URGENT_LEAK_FIX mission per asset whose outbound clicks reach the threshold while
/// no ACTIVE link exists. Assets below the threshold never emit. Never resolves anything.
pub fn detect_leaks(
    assets: &[Asset],
    links: &[MonetizationLink],
    now: DateTime<Utc>,
) -> Vec<Mission> {
    let mut missions: Vec<Mission> = Vec::new();

    for asset in assets {
        let total_outbound = asset.total_outbound();
        if total_outbound < LEAK_OUTBOUND_THRESHOLD
            || has_active_monetization(&asset.sku_id, links)
        {
            continue;
        }

        let mission = Mission::open(
            leak_mission_id(&asset.sku_id),
            MissionType::UrgentLeakFix,
            Priority::High,
            Some(asset.sku_id.clone()),
            format!("Critical leak: {total_outbound} purchase-intent clicks, no active link."),
            vec![
                evidence_entry("OUT", total_outbound),
                evidence_entry("STATUS", "NO_CAPTURED_FLOW"),
            ],
            vec![
                format!("Attach an active monetization link to {}", asset.sku_id),
                "Patch the destination link on the pin board".to_string(),
                format!("Re-verify {}", asset.sku_id),
            ],
            now,
        );

        match missions.iter_mut().find(|m| m.id == mission.id) {
            Some(existing) => *existing = mission,
            None => missions.push(mission),
        }
    }

    missions
}

/// Assets past incubation that own no pins: registered but invisible on the boards.
/// Incubating assets are expected to be unpinned and never emit.
pub fn detect_unpinned(assets: &[Asset], now: DateTime<Utc>) -> Vec<Mission> {
    assets
        .iter()
        .filter(|a| a.pins.is_empty() && a.lifecycle_stage != LifecycleStage::Incubation)
        .map(|asset| {
            Mission::open(
                unpinned_mission_id(&asset.sku_id),
                MissionType::UnmappedResource,
                Priority::Medium,
                Some(asset.sku_id.clone()),
                format!(
                    "Unpinned asset: {} is registered but has no presence on any board.",
                    asset.sku_id
                ),
                vec![
                    evidence_entry("PINS", 0),
                    evidence_entry("STAGE", asset.lifecycle_stage.as_str()),
                ],
                vec![
                    "Generate 3 base pins".to_string(),
                    "Link the pins to the artist board".to_string(),
                ],
                now,
            )
        })
        .collect()
}
