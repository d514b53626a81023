//! Core domain model and the pure reconciliation/scoring engine for ALFA.
//!
//! Every function exported from the engine modules takes a snapshot and returns a new value.
//! Nothing here performs I/O, reads the clock, or logs; callers inject `now` and decide what
//! to persist.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub mod catalog;
pub mod claims;
pub mod ledger;
pub mod leaks;
pub mod lifecycle;
pub mod links;
pub mod missions;
pub mod rarity;
pub mod reconcile;
pub mod scoring;

#[cfg(test)]
pub(crate) mod test_support;

pub use catalog::{
    apply_pin_updates, audit_counts, inventory, new_asset, next_sku, AuditCounts, InventorySort,
};
pub use claims::{claim_orphan, extract_sku_tag, suggest_claims, ClaimSuggestion};
pub use ledger::{adjust_credits, append_transaction, consume_credits, inject_capital};
pub use leaks::{detect_leaks, detect_unpinned};
pub use lifecycle::advance_lifecycle;
pub use links::{check_link_health, LinkHealth, LinkHealthOutcome};
pub use missions::{merge_missions, open_missions, resolve_by_id, resolve_for_sku};
pub use rarity::classify_rarity;
pub use reconcile::{reconcile, ReconcileOutcome};
pub use scoring::{asset_score, orphan_score, pin_velocity, score};

pub const CRATE_NAME: &str = "alfa-core";

/// Placeholder SKU carried by missions about resources no asset owns yet.
pub const UNKNOWN_SKU: &str = "UNKNOWN";

/// Raw engagement counters as reported by the external platform.
///
/// Missing or `null` counters deserialize as zero; this is the only place that coercion happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EngagementCounters {
    #[serde(default, deserialize_with = "count_or_zero")]
    pub impressions: u64,
    #[serde(default, deserialize_with = "count_or_zero")]
    pub saves: u64,
    #[serde(default, deserialize_with = "count_or_zero")]
    pub clicks: u64,
    #[serde(default, deserialize_with = "count_or_zero")]
    pub outbound_clicks: u64,
}

/// One externally observed pin with its engagement counters. Read-only input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementItem {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub board_id: String,
    #[serde(default)]
    pub counters: EngagementCounters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinMetric {
    pub pin_id: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, deserialize_with = "count_or_zero")]
    pub impressions: u64,
    #[serde(default, deserialize_with = "count_or_zero")]
    pub clicks: u64,
    #[serde(default, deserialize_with = "count_or_zero")]
    pub outbound_clicks: u64,
    #[serde(default, deserialize_with = "count_or_zero")]
    pub saves: u64,
    /// Cached per-pin term of [`scoring::score`]; recomputed on every refresh.
    #[serde(default)]
    pub velocity_score: f64,
}

impl PinMetric {
    /// Builds a pin from external counters, recomputing the cached velocity.
    pub fn from_counters(
        pin_id: impl Into<String>,
        url: impl Into<String>,
        counters: &EngagementCounters,
    ) -> Self {
        Self {
            pin_id: pin_id.into(),
            url: url.into(),
            impressions: counters.impressions,
            clicks: counters.clicks,
            outbound_clicks: counters.outbound_clicks,
            saves: counters.saves,
            velocity_score: pin_velocity(
                counters.impressions,
                counters.clicks,
                counters.outbound_clicks,
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceStatus {
    Raw,
    Exported,
    Zipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OwnershipType {
    Owned,
    Commissioned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

/// Lifecycle stages in promotion order. Within one asset the stage never decreases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleStage {
    Incubation,
    Monetization,
    Domain,
}

impl LifecycleStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Incubation => "INCUBATION",
            Self::Monetization => "MONETIZATION",
            Self::Domain => "DOMAIN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub sku_id: String,
    pub display_name: String,
    #[serde(default)]
    pub parent_artist_ids: BTreeSet<String>,
    #[serde(default)]
    pub file_path_drive: Option<String>,
    pub source_status: SourceStatus,
    pub ownership_type: OwnershipType,
    pub current_rarity: Rarity,
    pub lifecycle_stage: LifecycleStage,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_collection: bool,
    #[serde(default)]
    pub pins: Vec<PinMetric>,
}

impl Asset {
    pub fn total_outbound(&self) -> u64 {
        self.pins.iter().map(|p| p.outbound_clicks).sum()
    }

    pub fn owns_pin(&self, pin_id: &str) -> bool {
        self.pins.iter().any(|p| p.pin_id == pin_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DestinationType {
    Payhip,
    Fiverr,
    Etsy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkStatus {
    Active,
    Broken,
    Pending,
}

/// A storefront destination an asset is sold through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonetizationLink {
    pub asset_sku: String,
    pub destination_type: DestinationType,
    pub url: String,
    pub status: LinkStatus,
    #[serde(default, deserialize_with = "count_or_zero")]
    pub views: u64,
    #[serde(default, deserialize_with = "count_or_zero")]
    pub sales: u64,
    #[serde(default)]
    pub revenue_generated: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissionType {
    UrgentLeakFix,
    UnmappedResource,
    ApiSyncError,
    IntegrityAudit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissionStatus {
    Open,
    Resolved,
}

/// An actionable anomaly. `id` is derived from type + target so re-detection collapses onto
/// the same record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mission {
    pub id: String,
    #[serde(rename = "type")]
    pub mission_type: MissionType,
    pub priority: Priority,
    pub asset_sku: Option<String>,
    pub message: String,
    pub evidence: Vec<String>,
    pub tasks: Vec<String>,
    pub status: MissionStatus,
    pub created_at: DateTime<Utc>,
}

impl Mission {
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        id: impl Into<String>,
        mission_type: MissionType,
        priority: Priority,
        asset_sku: Option<String>,
        message: impl Into<String>,
        evidence: Vec<String>,
        tasks: Vec<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            mission_type,
            priority,
            asset_sku,
            message: message.into(),
            evidence,
            tasks,
            status: MissionStatus::Open,
            created_at,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == MissionStatus::Open
    }
}

/// Formats one `KEY:value` evidence entry as consumed by the audit view.
pub fn evidence_entry(key: &str, value: impl fmt::Display) -> String {
    format!("{key}:{value}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketTier {
    Global,
    Niche,
    Emerging,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub artist_id: String,
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
    pub market_tier: MarketTier,
    #[serde(default)]
    pub board_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    PayhipSale,
    CapitalInjection,
    CreditConsumption,
    ManualAdjustment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub trans_id: String,
    pub amount: f64,
    pub source_type: TransactionKind,
    pub related_id: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub credits_delta: Option<i64>,
}

fn count_or_zero<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    struct CountVisitor;

    impl<'de> serde::de::Visitor<'de> for CountVisitor {
        type Value = u64;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a non-negative count, null, or nothing")
        }

        fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<u64, E> {
            Ok(v)
        }

        fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<u64, E> {
            Ok(v.max(0) as u64)
        }

        fn visit_f64<E: serde::de::Error>(self, v: f64) -> Result<u64, E> {
            if v.is_finite() && v > 0.0 {
                Ok(v.trunc() as u64)
            } else {
                Ok(0)
            }
        }

        fn visit_unit<E: serde::de::Error>(self) -> Result<u64, E> {
            Ok(0)
        }

        fn visit_none<E: serde::de::Error>(self) -> Result<u64, E> {
            Ok(0)
        }

        fn visit_some<D2: Deserializer<'de>>(self, d: D2) -> Result<u64, D2::Error> {
            d.deserialize_any(CountVisitor)
        }
    }

    deserializer.deserialize_any(CountVisitor)
}
