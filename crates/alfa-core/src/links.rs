//! Monetization link health. Probing happens elsewhere; this only folds probe results in.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{evidence_entry, LinkStatus, Mission, MissionType, MonetizationLink, Priority};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkHealth {
    Healthy,
    /// `status` is the HTTP status observed, `None` when the request never completed.
    Broken { status: Option<u16> },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkHealthOutcome {
    pub updated_links: Vec<MonetizationLink>,
    pub missions: Vec<Mission>,
}

pub fn sync_error_mission_id(sku: &str) -> String {
    format!("FAIL-{sku}")
}

/// Marks ACTIVE links whose probe came back broken as BROKEN and emits API_SYNC_ERROR.
/// Links with no probe result, or not ACTIVE, are left alone.
pub fn check_link_health(
    links: &[MonetizationLink],
    probes: &BTreeMap<String, LinkHealth>,
    now: DateTime<Utc>,
) -> LinkHealthOutcome {
    let mut outcome = LinkHealthOutcome::default();

    for link in links {
        let broken_status = match probes.get(&link.url) {
            Some(LinkHealth::Broken { status }) if link.status == LinkStatus::Active => *status,
            _ => {
                outcome.updated_links.push(link.clone());
                continue;
            }
        };

        let status_text = broken_status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "UNREACHABLE".to_string());
        let mission = Mission::open(
            sync_error_mission_id(&link.asset_sku),
            MissionType::ApiSyncError,
            Priority::High,
            Some(link.asset_sku.clone()),
            format!(
                "Heartbeat failure on {:?} destination for {}.",
                link.destination_type, link.asset_sku
            ),
            vec![evidence_entry("URL", &link.url), evidence_entry("HTTP", status_text)],
            vec![
                "Verify the storefront link".to_string(),
                "Update the destination metadata".to_string(),
            ],
            now,
        );
        match outcome.missions.iter_mut().find(|m| m.id == mission.id) {
            Some(slot) => *slot = mission,
            None => outcome.missions.push(mission),
        }
        outcome.updated_links.push(MonetizationLink {
            status: LinkStatus::Broken,
            ..link.clone()
        });
    }

    outcome
}
