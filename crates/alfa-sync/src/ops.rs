//! Operator actions against the catalog store. Each one loads, applies a pure engine
//! function and saves.

use std::collections::BTreeSet;

use alfa_adapters::pinterest_pin_url;
use alfa_core::catalog::revenue_for;
use alfa_core::reconcile::orphan_mission_id;
use alfa_core::scoring::display_score;
use alfa_core::{
    adjust_credits, append_transaction, asset_score, claim_orphan, consume_credits, inject_capital,
    inventory, new_asset, next_sku, open_missions, resolve_by_id, resolve_for_sku, suggest_claims,
    Asset, ClaimSuggestion, InventorySort, LifecycleStage, Mission, OwnershipType, Rarity,
    Transaction,
};
use alfa_storage::{upsert, CatalogStore};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OperatorError {
    #[error("no asset with sku {0}")]
    UnknownSku(String),
    #[error("pin {0} is not an unclaimed resource from the latest cycle")]
    UnknownOrphan(String),
    #[error("pin {pin_id} is already owned by {sku_id}")]
    AlreadyOwned { pin_id: String, sku_id: String },
    #[error("asset name must not be empty")]
    EmptyName,
}

/// Marks every open mission on `sku` resolved. Returns how many changed.
pub async fn verify_sku(store: &CatalogStore, sku: &str) -> Result<usize> {
    let mut catalog = store.load().await?;
    if catalog.asset(sku).is_none() {
        return Err(OperatorError::UnknownSku(sku.to_string()).into());
    }
    let (missions, resolved) = resolve_for_sku(&catalog.missions, sku);
    if resolved > 0 {
        catalog.missions = missions;
        store.save(&catalog).await?;
    }
    info!(sku, resolved, "sku verified");
    Ok(resolved)
}

pub async fn resolve_mission(store: &CatalogStore, mission_id: &str) -> Result<bool> {
    let mut catalog = store.load().await?;
    let (missions, resolved) = resolve_by_id(&catalog.missions, mission_id);
    if resolved {
        catalog.missions = missions;
        store.save(&catalog).await?;
    }
    Ok(resolved)
}

pub async fn list_open_missions(store: &CatalogStore) -> Result<Vec<Mission>> {
    let catalog = store.load().await?;
    Ok(open_missions(&catalog.missions).into_iter().cloned().collect())
}

pub async fn claim_suggestions(store: &CatalogStore) -> Result<Vec<ClaimSuggestion>> {
    let catalog = store.load().await?;
    Ok(suggest_claims(&catalog.assets, &catalog.orphans))
}

/// Attaches an orphan from the latest cycle to `sku` and resolves its UNMAPPED_RESOURCE mission.
pub async fn claim_pin(store: &CatalogStore, pin_id: &str, sku: &str) -> Result<Asset> {
    let mut catalog = store.load().await?;
    if let Some(owner) = catalog.assets.iter().find(|a| a.owns_pin(pin_id)) {
        return Err(OperatorError::AlreadyOwned {
            pin_id: pin_id.to_string(),
            sku_id: owner.sku_id.clone(),
        }
        .into());
    }
    let asset = catalog
        .asset(sku)
        .ok_or_else(|| OperatorError::UnknownSku(sku.to_string()))?;
    let orphan = catalog
        .orphans
        .iter()
        .find(|o| o.id == pin_id)
        .ok_or_else(|| OperatorError::UnknownOrphan(pin_id.to_string()))?;

    let claimed = claim_orphan(asset, orphan, &pinterest_pin_url(pin_id));
    upsert(&mut catalog.assets, claimed.clone());
    catalog.orphans.retain(|o| o.id != pin_id);
    let (missions, _) = resolve_by_id(&catalog.missions, &orphan_mission_id(pin_id));
    catalog.missions = missions;
    store.save(&catalog).await?;

    info!(pin_id, sku, "orphan claimed");
    Ok(claimed)
}

pub async fn add_asset(
    store: &CatalogStore,
    display_name: &str,
    artist_ids: BTreeSet<String>,
    ownership: OwnershipType,
    now: DateTime<Utc>,
) -> Result<Asset> {
    let display_name = display_name.trim();
    if display_name.is_empty() {
        return Err(OperatorError::EmptyName.into());
    }
    let mut catalog = store.load().await?;
    let asset = new_asset(next_sku(&catalog.assets), display_name, artist_ids, ownership, now);
    upsert(&mut catalog.assets, asset.clone());
    store.save(&catalog).await?;
    Ok(asset)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryRow {
    pub sku_id: String,
    pub display_name: String,
    pub lifecycle_stage: LifecycleStage,
    pub rarity: Rarity,
    pub score: f64,
    pub outbound: u64,
    pub revenue: f64,
}

pub async fn list_inventory(
    store: &CatalogStore,
    sort: InventorySort,
) -> Result<Vec<InventoryRow>> {
    let catalog = store.load().await?;
    Ok(inventory(&catalog.assets, &catalog.links, sort)
        .into_iter()
        .map(|a| InventoryRow {
            sku_id: a.sku_id.clone(),
            display_name: a.display_name.clone(),
            lifecycle_stage: a.lifecycle_stage,
            rarity: a.current_rarity,
            score: display_score(asset_score(a)),
            outbound: a.total_outbound(),
            revenue: revenue_for(&a.sku_id, &catalog.links),
        })
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CreditAction {
    /// USD of capital; converted to credits.
    Inject(f64),
    Consume(u64),
    Adjust(i64),
}

/// Records a ledger transaction and returns it with the new balance.
pub async fn apply_credits(
    store: &CatalogStore,
    action: CreditAction,
    now: DateTime<Utc>,
) -> Result<(Transaction, i64)> {
    let mut catalog = store.load().await?;
    let (tx, balance) = match action {
        CreditAction::Inject(usd) => inject_capital(usd, catalog.credits, now),
        CreditAction::Consume(n) => consume_credits(n, catalog.credits, now),
        CreditAction::Adjust(delta) => adjust_credits(delta, catalog.credits, now),
    };
    catalog.credits = balance;
    let tx = append_transaction(&mut catalog.transactions, tx).clone();
    store.save(&catalog).await?;
    Ok((tx, balance))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alfa_core::{
        EngagementCounters, EngagementItem, MissionStatus, MissionType, Priority, TransactionKind,
        UNKNOWN_SKU,
    };
    use alfa_storage::Catalog;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 4, 0, 0).single().unwrap()
    }

    fn orphan(id: &str, title: &str) -> EngagementItem {
        EngagementItem {
            id: id.to_string(),
            title: title.to_string(),
            board_id: "B1".to_string(),
            counters: EngagementCounters {
                impressions: 400,
                saves: 3,
                clicks: 10,
                outbound_clicks: 2,
            },
        }
    }

    async fn seeded(dir: &std::path::Path) -> CatalogStore {
        let store = CatalogStore::new(dir.join("catalog.json"));
        let mut catalog = Catalog::default();
        catalog.assets.push(new_asset(
            "SKU-00001",
            "CHROME LOGO",
            BTreeSet::new(),
            OwnershipType::Owned,
            now(),
        ));
        catalog.orphans.push(orphan("P9", "chrome logo [SKU-00001]"));
        catalog.missions.push(Mission::open(
            orphan_mission_id("P9"),
            MissionType::UnmappedResource,
            Priority::Medium,
            Some(UNKNOWN_SKU.to_string()),
            "unmapped",
            vec![],
            vec![],
            now(),
        ));
        store.save(&catalog).await.unwrap();
        store
    }

    #[tokio::test]
    async fn claiming_attaches_pin_and_resolves_orphan_mission() {
        let dir = tempdir().unwrap();
        let store = seeded(dir.path()).await;

        let suggestions = claim_suggestions(&store).await.unwrap();
        assert_eq!(suggestions[0].sku_id, "SKU-00001");

        let claimed = claim_pin(&store, "P9", "SKU-00001").await.unwrap();
        assert_eq!(claimed.pins.len(), 1);
        assert_eq!(claimed.pins[0].url, "https://www.pinterest.com/pin/P9/");
        assert_eq!(claimed.pins[0].impressions, 400);

        let stored = store.load().await.unwrap();
        assert!(stored.orphans.is_empty());
        assert_eq!(stored.missions[0].status, MissionStatus::Resolved);
        assert!(list_open_missions(&store).await.unwrap().is_empty());

        let again = claim_pin(&store, "P9", "SKU-00001").await.unwrap_err();
        assert_eq!(
            again.downcast_ref::<OperatorError>(),
            Some(&OperatorError::AlreadyOwned {
                pin_id: "P9".to_string(),
                sku_id: "SKU-00001".to_string()
            })
        );
    }

    #[tokio::test]
    async fn claim_rejects_unknown_targets() {
        let dir = tempdir().unwrap();
        let store = seeded(dir.path()).await;
        let err = claim_pin(&store, "P9", "SKU-09999").await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<OperatorError>(),
            Some(&OperatorError::UnknownSku("SKU-09999".to_string()))
        );
        let err = claim_pin(&store, "P404", "SKU-00001").await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<OperatorError>(),
            Some(&OperatorError::UnknownOrphan("P404".to_string()))
        );
    }

    #[tokio::test]
    async fn add_asset_allocates_the_next_sku() {
        let dir = tempdir().unwrap();
        let store = seeded(dir.path()).await;
        let added = add_asset(
            &store,
            " NEON SKULL ",
            BTreeSet::from(["ART-1".to_string()]),
            OwnershipType::Commissioned,
            now(),
        )
        .await
        .unwrap();
        assert_eq!(added.sku_id, "SKU-00002");
        assert_eq!(added.display_name, "NEON SKULL");
        assert_eq!(store.load().await.unwrap().assets.len(), 2);
        let blank = add_asset(&store, "  ", BTreeSet::new(), OwnershipType::Owned, now()).await;
        assert!(blank.is_err());
    }

    #[tokio::test]
    async fn verify_resolves_missions_for_one_sku() {
        let dir = tempdir().unwrap();
        let store = seeded(dir.path()).await;
        let mut catalog = store.load().await.unwrap();
        catalog.missions.push(Mission::open(
            "LEAK-SKU-00001",
            MissionType::UrgentLeakFix,
            Priority::High,
            Some("SKU-00001".to_string()),
            "leak",
            vec![],
            vec![],
            now(),
        ));
        store.save(&catalog).await.unwrap();

        assert_eq!(verify_sku(&store, "SKU-00001").await.unwrap(), 1);
        let open = list_open_missions(&store).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, "ORPHAN-P9");
        assert!(verify_sku(&store, "SKU-00404").await.is_err());
        assert!(resolve_mission(&store, "ORPHAN-P9").await.unwrap());
        assert!(!resolve_mission(&store, "ORPHAN-P9").await.unwrap());
    }

    #[tokio::test]
    async fn credits_accumulate_in_the_ledger() {
        let dir = tempdir().unwrap();
        let store = CatalogStore::new(dir.path().join("catalog.json"));
        let (_, balance) = apply_credits(&store, CreditAction::Inject(45.0), now()).await.unwrap();
        assert_eq!(balance, 22);
        let later = now() + chrono::Duration::seconds(1);
        let (tx, balance) = apply_credits(&store, CreditAction::Consume(5), later).await.unwrap();
        assert_eq!(balance, 17);
        assert_eq!(tx.credits_delta, Some(-5));

        let stored = store.load().await.unwrap();
        assert_eq!(stored.credits, 17);
        assert_eq!(stored.transactions.len(), 2);
    }

    #[tokio::test]
    async fn same_instant_credit_actions_keep_every_transaction() {
        let dir = tempdir().unwrap();
        let store = CatalogStore::new(dir.path().join("catalog.json"));
        apply_credits(&store, CreditAction::Inject(100.0), now()).await.unwrap();
        let (tx, balance) = apply_credits(&store, CreditAction::Consume(5), now()).await.unwrap();
        assert_eq!(balance, 45);
        assert!(tx.trans_id.ends_with("-2"));

        let stored = store.load().await.unwrap();
        assert_eq!(stored.credits, 45);
        let kinds: Vec<_> = stored.transactions.iter().map(|t| t.source_type).collect();
        assert_eq!(
            kinds,
            vec![TransactionKind::CapitalInjection, TransactionKind::CreditConsumption]
        );
    }

    #[tokio::test]
    async fn inventory_rows_carry_rounded_scores() {
        let dir = tempdir().unwrap();
        let store = seeded(dir.path()).await;
        claim_pin(&store, "P9", "SKU-00001").await.unwrap();
        let rows = list_inventory(&store, InventorySort::Score).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].score, 60.0);
        assert_eq!(rows[0].outbound, 2);
    }
}
