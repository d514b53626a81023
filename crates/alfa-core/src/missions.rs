//! Running mission set: merge-by-id and operator resolution.

use crate::{Mission, MissionStatus};

/// Merges `incoming` into `existing` by id. A re-detected id replaces the stored record in
/// place; unseen ids are appended in arrival order.
pub fn merge_missions(existing: &[Mission], incoming: &[Mission]) -> Vec<Mission> {
    let mut merged = existing.to_vec();
    for mission in incoming {
        match merged.iter_mut().find(|m| m.id == mission.id) {
            Some(slot) => *slot = mission.clone(),
            None => merged.push(mission.clone()),
        }
    }
    merged
}

/// Resolves every OPEN mission targeting `sku`. Returns the new set and how many changed.
pub fn resolve_for_sku(missions: &[Mission], sku: &str) -> (Vec<Mission>, usize) {
    let mut resolved = 0;
    let out = missions
        .iter()
        .map(|m| {
            if m.is_open() && m.asset_sku.as_deref() == Some(sku) {
                resolved += 1;
                Mission {
                    status: MissionStatus::Resolved,
                    ..m.clone()
                }
            } else {
                m.clone()
            }
        })
        .collect();
    (out, resolved)
}

pub fn resolve_by_id(missions: &[Mission], id: &str) -> (Vec<Mission>, bool) {
    let mut found = false;
    let out = missions
        .iter()
        .map(|m| {
            if m.is_open() && m.id == id {
                found = true;
                Mission {
                    status: MissionStatus::Resolved,
                    ..m.clone()
                }
            } else {
                m.clone()
            }
        })
        .collect();
    (out, found)
}

/// OPEN missions, HIGH priority first. Order within a priority is preserved.
pub fn open_missions(missions: &[Mission]) -> Vec<&Mission> {
    let mut open: Vec<&Mission> = missions.iter().filter(|m| m.is_open()).collect();
    open.sort_by_key(|m| m.priority);
    open
}
