use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::{
    Asset, EngagementCounters, EngagementItem, LifecycleStage, OwnershipType, PinMetric, Rarity,
    SourceStatus,
};

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 4, 0, 0).single().unwrap()
}

pub fn days_ago(days: i64) -> DateTime<Utc> {
    now() - Duration::days(days)
}

pub fn pin(pin_id: &str, impressions: u64, clicks: u64, outbound_clicks: u64) -> PinMetric {
    PinMetric::from_counters(
        pin_id,
        format!("https://www.pinterest.com/pin/{pin_id}/"),
        &EngagementCounters {
            impressions,
            saves: 0,
            clicks,
            outbound_clicks,
        },
    )
}

pub fn asset(
    sku: &str,
    stage: LifecycleStage,
    created_at: DateTime<Utc>,
    pins: Vec<PinMetric>,
) -> Asset {
    Asset {
        sku_id: sku.to_string(),
        display_name: sku.to_string(),
        parent_artist_ids: Default::default(),
        file_path_drive: None,
        source_status: SourceStatus::Raw,
        ownership_type: OwnershipType::Owned,
        current_rarity: Rarity::Common,
        lifecycle_stage: stage,
        created_at,
        is_collection: false,
        pins,
    }
}

pub fn item(
    id: &str,
    impressions: u64,
    saves: u64,
    clicks: u64,
    outbound_clicks: u64,
) -> EngagementItem {
    EngagementItem {
        id: id.to_string(),
        title: format!("pin {id}"),
        board_id: "board-1".to_string(),
        counters: EngagementCounters {
            impressions,
            saves,
            clicks,
            outbound_clicks,
        },
    }
}
