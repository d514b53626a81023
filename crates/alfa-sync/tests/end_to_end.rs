use std::collections::BTreeSet;
use std::path::Path;

use alfa_core::{
    EngagementCounters, EngagementItem, LifecycleStage, MissionStatus, MissionType, OwnershipType,
    Priority,
};
use alfa_sync::{add_asset, claim_pin, list_open_missions, SyncConfig, SyncPipeline};
use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::tempdir;

fn at(days_after_start: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 20, 4, 0, 0).single().unwrap() + Duration::days(days_after_start)
}

fn config(root: &Path) -> SyncConfig {
    SyncConfig::from_lookup(|key| match key {
        "ALFA_WORKSPACE" => Some(root.display().to_string()),
        "ALFA_SOURCE" => Some("fixture".to_string()),
        _ => None,
    })
    .unwrap()
}

async fn write_fixture(config: &SyncConfig, items: &[EngagementItem]) {
    tokio::fs::create_dir_all(config.fixture_path.parent().unwrap())
        .await
        .unwrap();
    tokio::fs::write(&config.fixture_path, serde_json::to_vec(items).unwrap())
        .await
        .unwrap();
}

fn pin_p1() -> EngagementItem {
    EngagementItem {
        id: "P1".to_string(),
        title: "Sunset tee".to_string(),
        board_id: "B-MERCH".to_string(),
        counters: EngagementCounters {
            impressions: 5000,
            saves: 40,
            clicks: 200,
            outbound_clicks: 15,
        },
    }
}

#[tokio::test]
async fn orphan_claimed_then_promoted_with_leak() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    write_fixture(&config, &[pin_p1()]).await;
    let pipeline = SyncPipeline::new(config).unwrap();
    let store = pipeline.store().clone();

    let sku1 = add_asset(&store, "SUNSET TEE", BTreeSet::new(), OwnershipType::Owned, at(0))
        .await
        .unwrap();
    assert!(sku1.pins.is_empty());

    // Nobody owns P1 yet: it surfaces as an orphan.
    let first = pipeline.run_once(at(1)).await.unwrap();
    assert_eq!(first.orphans, 1);
    assert!(first.promoted.is_empty());
    let open = list_open_missions(&store).await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, "ORPHAN-P1");
    assert_eq!(open[0].mission_type, MissionType::UnmappedResource);
    assert_eq!(open[0].priority, Priority::High);
    assert!(open[0].evidence.contains(&"SCORE:1480".to_string()));

    claim_pin(&store, "P1", &sku1.sku_id).await.unwrap();

    // 40 days old with a score of 800: promoted by age, not by the explosive override.
    let second = pipeline.run_once(at(40)).await.unwrap();
    assert_eq!(second.refreshed_pins, 1);
    assert_eq!(second.orphans, 0);
    assert_eq!(second.promoted, vec![sku1.sku_id.clone()]);

    let catalog = store.load().await.unwrap();
    let asset = catalog.asset(&sku1.sku_id).unwrap();
    assert_eq!(asset.lifecycle_stage, LifecycleStage::Monetization);
    assert_eq!(alfa_core::asset_score(asset), 800.0);

    let leak_id = format!("LEAK-{}", sku1.sku_id);
    let leak = catalog.missions.iter().find(|m| m.id == leak_id).unwrap();
    assert_eq!(leak.status, MissionStatus::Open);
    assert!(leak.evidence.contains(&"OUT:15".to_string()));

    let orphan = catalog.missions.iter().find(|m| m.id == "ORPHAN-P1").unwrap();
    assert_eq!(orphan.status, MissionStatus::Resolved);

    // Unchanged input, later day: stage is not demoted and the leak is not duplicated.
    pipeline.run_once(at(41)).await.unwrap();
    let catalog = store.load().await.unwrap();
    assert_eq!(
        catalog.asset(&sku1.sku_id).unwrap().lifecycle_stage,
        LifecycleStage::Monetization
    );
    assert_eq!(catalog.missions.iter().filter(|m| m.id == leak_id).count(), 1);
}
