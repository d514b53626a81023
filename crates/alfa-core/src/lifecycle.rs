//! INCUBATION → MONETIZATION promotion.

use chrono::{DateTime, Utc};

use crate::scoring::asset_score;
use crate::{Asset, LifecycleStage};

/// Score at which an incubating asset is promoted regardless of age.
pub const EXPLOSIVE_SCORE: f64 = 1000.0;
pub const MATURITY_DAYS: f64 = 30.0;
/// Age alone never promotes; a matured asset also needs more than this much signal.
pub const MATURITY_MIN_SCORE: f64 = 100.0;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

pub fn age_days(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - created_at).num_milliseconds() as f64 / MILLIS_PER_DAY
}

/// Returns the stage `asset` should be in at `now`. Never moves backward and never enters DOMAIN.
pub fn next_stage(asset: &Asset, now: DateTime<Utc>) -> LifecycleStage {
    if asset.lifecycle_stage != LifecycleStage::Incubation {
        return asset.lifecycle_stage;
    }

    let score = asset_score(asset);
    if score >= EXPLOSIVE_SCORE {
        return LifecycleStage::Monetization;
    }
    if age_days(asset.created_at, now) >= MATURITY_DAYS && score > MATURITY_MIN_SCORE {
        return LifecycleStage::Monetization;
    }
    LifecycleStage::Incubation
}

pub fn advance_lifecycle(assets: &[Asset], now: DateTime<Utc>) -> Vec<Asset> {
    assets
        .iter()
        .map(|asset| {
            let stage = next_stage(asset, now);
            if stage == asset.lifecycle_stage {
                asset.clone()
            } else {
                Asset {
                    lifecycle_stage: stage,
                    ..asset.clone()
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{asset, days_ago, now, pin};

    #[test]
    fn explosive_score_promotes_at_age_zero() {
        // 20_000 impressions = 1000 points
        let a = asset("SKU-1", LifecycleStage::Incubation, now(), vec![pin("P1", 20_000, 0, 0)]);
        let out = advance_lifecycle(&[a], now());
        assert_eq!(out[0].lifecycle_stage, LifecycleStage::Monetization);
    }

    #[test]
    fn old_asset_with_weak_signal_stays_incubating() {
        let pins = vec![pin("P1", 1000, 0, 0)];
        let a = asset("SKU-1", LifecycleStage::Incubation, days_ago(40), pins);
        let out = advance_lifecycle(&[a], now());
        assert_eq!(out[0].lifecycle_stage, LifecycleStage::Incubation);
    }

    #[test]
    fn matured_asset_with_signal_promotes() {
        let pins = vec![pin("P1", 3000, 0, 0)];
        let a = asset("SKU-1", LifecycleStage::Incubation, days_ago(31), pins);
        let out = advance_lifecycle(&[a], now());
        assert_eq!(out[0].lifecycle_stage, LifecycleStage::Monetization);
    }

    #[test]
    fn young_asset_with_moderate_signal_waits() {
        let pins = vec![pin("P1", 0, 400, 0)];
        let a = asset("SKU-1", LifecycleStage::Incubation, days_ago(29), pins);
        let out = advance_lifecycle(&[a], now());
        assert_eq!(out[0].lifecycle_stage, LifecycleStage::Incubation);
    }

    #[test]
    fn score_of_exactly_one_hundred_does_not_mature() {
        let a = asset("SKU-1", LifecycleStage::Incubation, days_ago(45), vec![pin("P1", 0, 50, 0)]);
        assert_eq!(next_stage(&a, now()), LifecycleStage::Incubation);
    }

    #[test]
    fn later_stages_pass_through() {
        let domain = asset("SKU-D", LifecycleStage::Domain, days_ago(400), vec![]);
        let monetized = asset("SKU-M", LifecycleStage::Monetization, days_ago(1), vec![]);
        let out = advance_lifecycle(&[domain.clone(), monetized.clone()], now());
        assert_eq!(out, vec![domain, monetized]);
    }

    #[test]
    fn applying_twice_is_idempotent() {
        let assets = vec![
            asset("SKU-1", LifecycleStage::Incubation, days_ago(31), vec![pin("P1", 3000, 0, 0)]),
            asset("SKU-2", LifecycleStage::Incubation, days_ago(2), vec![pin("P2", 10, 0, 0)]),
            asset("SKU-3", LifecycleStage::Incubation, now(), vec![pin("P3", 0, 0, 100)]),
        ];
        let once = advance_lifecycle(&assets, now());
        let twice = advance_lifecycle(&once, now());
        assert_eq!(once, twice);
    }
}
