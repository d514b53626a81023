//! Weighted attention score.
//!
//! `score = Σ(impressions × 0.05 + clicks × 2 + outbound × 10) + revenue × 20`

use crate::{Asset, EngagementCounters, PinMetric};

pub const IMPRESSION_WEIGHT: f64 = 0.05;
pub const CLICK_WEIGHT: f64 = 2.0;
pub const OUTBOUND_WEIGHT: f64 = 10.0;
pub const REVENUE_WEIGHT: f64 = 20.0;

// Unclaimed resources are ranked with their own weights; saves count and clicks weigh more.
const ORPHAN_IMPRESSION_WEIGHT: f64 = 0.05;
const ORPHAN_SAVE_WEIGHT: f64 = 2.0;
const ORPHAN_CLICK_WEIGHT: f64 = 5.0;
const ORPHAN_OUTBOUND_WEIGHT: f64 = 10.0;

/// Per-pin term of [`score`]. Saves do not contribute.
pub fn pin_velocity(impressions: u64, clicks: u64, outbound_clicks: u64) -> f64 {
    impressions as f64 * IMPRESSION_WEIGHT
        + clicks as f64 * CLICK_WEIGHT
        + outbound_clicks as f64 * OUTBOUND_WEIGHT
}

pub fn score(pins: &[PinMetric], revenue: f64) -> f64 {
    let traffic: f64 = pins
        .iter()
        .map(|p| pin_velocity(p.impressions, p.clicks, p.outbound_clicks))
        .sum();
    let revenue = if revenue.is_finite() { revenue } else { 0.0 };
    traffic + revenue * REVENUE_WEIGHT
}

pub fn asset_score(asset: &Asset) -> f64 {
    score(&asset.pins, 0.0)
}

/// Candidate score for an external record no asset owns. Drives orphan mission priority.
pub fn orphan_score(counters: &EngagementCounters) -> f64 {
    counters.impressions as f64 * ORPHAN_IMPRESSION_WEIGHT
        + counters.saves as f64 * ORPHAN_SAVE_WEIGHT
        + counters.clicks as f64 * ORPHAN_CLICK_WEIGHT
        + counters.outbound_clicks as f64 * ORPHAN_OUTBOUND_WEIGHT
}

/// Rounds to two decimals for display in evidence strings.
pub fn display_score(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
