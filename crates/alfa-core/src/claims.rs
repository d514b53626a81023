//! Claiming orphaned resources into known assets.

use serde::{Deserialize, Serialize};
use strsim::jaro_winkler;

use crate::{Asset, EngagementItem, PinMetric};

pub const TITLE_MATCH_THRESHOLD: f64 = 0.85;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimReason {
    /// The pin title carries a `[SKU-nnnnn]` tag naming a known asset.
    SkuTag,
    TitleSimilarity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimSuggestion {
    pub pin_id: String,
    pub sku_id: String,
    pub confidence: f64,
    pub reason: ClaimReason,
}

/// Returns the first bracketed `SKU-<digits>` tag in `title`, e.g. `"LOGO [SKU-00102]"`.
pub fn extract_sku_tag(title: &str) -> Option<&str> {
    let mut rest = title;
    while let Some(open) = rest.find('[') {
        let after = &rest[open + 1..];
        let Some(close) = after.find(']') else {
            return None;
        };
        let candidate = after[..close].trim();
        if let Some(digits) = candidate.strip_prefix("SKU-") {
            if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
                return Some(candidate);
            }
        }
        rest = &after[close + 1..];
    }
    None
}

pub fn normalize_title(input: &str) -> String {
    let without_tag = match extract_sku_tag(input) {
        Some(tag) => input.replace(&format!("[{tag}]"), " "),
        None => input.to_string(),
    };
    without_tag
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// At most one suggestion per orphan. An exact SKU tag wins; otherwise the most similar
/// display name at or above [`TITLE_MATCH_THRESHOLD`].
pub fn suggest_claims(assets: &[Asset], orphans: &[EngagementItem]) -> Vec<ClaimSuggestion> {
    orphans
        .iter()
        .filter_map(|orphan| suggest_one(assets, orphan))
        .collect()
}

fn suggest_one(assets: &[Asset], orphan: &EngagementItem) -> Option<ClaimSuggestion> {
    if let Some(tag) = extract_sku_tag(&orphan.title) {
        if assets.iter().any(|a| a.sku_id == tag) {
            return Some(ClaimSuggestion {
                pin_id: orphan.id.clone(),
                sku_id: tag.to_string(),
                confidence: 1.0,
                reason: ClaimReason::SkuTag,
            });
        }
    }

    let title = normalize_title(&orphan.title);
    if title.is_empty() {
        return None;
    }

    let mut best: Option<(f64, &Asset)> = None;
    for asset in assets {
        let similarity = jaro_winkler(&title, &normalize_title(&asset.display_name));
        if similarity < TITLE_MATCH_THRESHOLD {
            continue;
        }
        if best.map_or(true, |(top, _)| similarity > top) {
            best = Some((similarity, asset));
        }
    }

    best.map(|(confidence, asset)| ClaimSuggestion {
        pin_id: orphan.id.clone(),
        sku_id: asset.sku_id.clone(),
        confidence,
        reason: ClaimReason::TitleSimilarity,
    })
}

/// Attaches `item` to `asset` as a fresh pin. No-op if the asset already owns that pin id.
pub fn claim_orphan(asset: &Asset, item: &EngagementItem, url: &str) -> Asset {
    if asset.owns_pin(&item.id) {
        return asset.clone();
    }
    let mut claimed = asset.clone();
    claimed
        .pins
        .push(PinMetric::from_counters(item.id.clone(), url, &item.counters));
    claimed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{asset, item, now};
    use crate::LifecycleStage;

    fn named(sku: &str, name: &str) -> Asset {
        let mut a = asset(sku, LifecycleStage::Incubation, now(), vec![]);
        a.display_name = name.to_string();
        a
    }

    fn titled(id: &str, title: &str) -> EngagementItem {
        let mut i = item(id, 10, 0, 0, 0);
        i.title = title.to_string();
        i
    }

    #[test]
    fn extracts_bracketed_sku_tag() {
        assert_eq!(extract_sku_tag("ANUEL TOUR 2025 V1 [SKU-00045]"), Some("SKU-00045"));
        assert_eq!(extract_sku_tag("[draft] LOGO [SKU-00102]"), Some("SKU-00102"));
        assert_eq!(extract_sku_tag("Meteora concept"), None);
        assert_eq!(extract_sku_tag("broken [SKU-"), None);
        assert_eq!(extract_sku_tag("[SKU-abc]"), None);
    }

    #[test]
    fn sku_tag_wins_over_similarity() {
        let assets = vec![
            named("SKU-00045", "ANUEL TOUR 2025 V1"),
            named("SKU-00102", "LINKIN PARK CHROME LOGO"),
        ];
        let out = suggest_claims(&assets, &[titled("PIN-2", "Flyer ANUEL [SKU-00102]")]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].sku_id, "SKU-00102");
        assert_eq!(out[0].reason, ClaimReason::SkuTag);
    }

    #[test]
    fn similar_title_is_suggested() {
        let assets = vec![named("SKU-00102", "LINKIN PARK CHROME LOGO")];
        let out = suggest_claims(&assets, &[titled("PIN-3", "Linkin Park Chrome Logo!")]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].reason, ClaimReason::TitleSimilarity);
        assert!(out[0].confidence >= TITLE_MATCH_THRESHOLD);
    }

    #[test]
    fn unrelated_title_gets_no_suggestion() {
        let assets = vec![named("SKU-00102", "LINKIN PARK CHROME LOGO")];
        let out = suggest_claims(&assets, &[titled("PIN-4", "Meteora 25th anniversary cover")]);
        assert!(out.is_empty());
    }

    #[test]
    fn claiming_attaches_pin_once() {
        let a = named("SKU-1", "x");
        let orphan = item("P2", 5000, 40, 200, 15);
        let claimed = claim_orphan(&a, &orphan, "https://www.pinterest.com/pin/P2/");
        assert_eq!(claimed.pins.len(), 1);
        assert_eq!(claimed.pins[0].velocity_score, 800.0);
        let again = claim_orphan(&claimed, &orphan, "https://www.pinterest.com/pin/P2/");
        assert_eq!(again, claimed);
    }
}
