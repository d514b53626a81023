//! Catalog persistence, immutable engagement snapshot archive, and the shared HTTP fetcher.

use std::path::{Path, PathBuf};

use alfa_core::{Artist, Asset, EngagementItem, Mission, MonetizationLink, Transaction};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

mod http;

pub use http::{
    classify_reqwest_error, classify_status, BackoffPolicy, Credential, FetchError, FetchedResponse,
    HttpClientConfig, HttpFetcher, RateLimit, RateLimiter, RetryDisposition,
};

pub const CRATE_NAME: &str = "alfa-storage";

/// Everything the catalog store holds, read at cycle start and written at cycle end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub assets: Vec<Asset>,
    #[serde(default)]
    pub artists: Vec<Artist>,
    #[serde(default)]
    pub links: Vec<MonetizationLink>,
    #[serde(default)]
    pub missions: Vec<Mission>,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub credits: i64,
    /// Unclaimed external records from the latest cycle, kept for claiming.
    #[serde(default)]
    pub orphans: Vec<EngagementItem>,
}

/// Identity used by [`upsert`].
pub trait Keyed {
    fn key(&self) -> String;
}

impl Keyed for Asset {
    fn key(&self) -> String {
        self.sku_id.clone()
    }
}

/// Replaces the record with the same key in place, or appends it.
pub fn upsert<T: Keyed>(records: &mut Vec<T>, record: T) {
    let key = record.key();
    match records.iter_mut().find(|r| r.key() == key) {
        Some(slot) => *slot = record,
        None => records.push(record),
    }
}

impl Catalog {
    pub fn asset(&self, sku: &str) -> Option<&Asset> {
        self.assets.iter().find(|a| a.sku_id == sku)
    }
}

/// JSON-file catalog store. Writes go through a temp file and an atomic rename.
#[derive(Debug, Clone)]
pub struct CatalogStore {
    path: PathBuf,
}

impl CatalogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the catalog. A missing file is an empty catalog.
    pub async fn load(&self) -> anyhow::Result<Catalog> {
        if !fs::try_exists(&self.path)
            .await
            .with_context(|| format!("checking catalog {}", self.path.display()))?
        {
            debug!(path = %self.path.display(), "catalog file absent, starting empty");
            return Ok(Catalog::default());
        }
        let text = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading catalog {}", self.path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parsing catalog {}", self.path.display()))
    }

    pub async fn save(&self, catalog: &Catalog) -> anyhow::Result<()> {
        let bytes = serde_json::to_vec_pretty(catalog).context("serializing catalog")?;
        write_atomically(&self.path, &bytes).await
    }
}

#[derive(Debug, Clone)]
pub struct ArchivedSnapshot {
    pub content_hash: String,
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    pub byte_size: usize,
    pub deduplicated: bool,
}

/// Hash-addressed archive of raw engagement batches, one file per distinct payload.
#[derive(Debug, Clone)]
pub struct SnapshotArchive {
    root: PathBuf,
}

impl SnapshotArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    pub fn snapshot_relative_path(
        &self,
        fetched_at: DateTime<Utc>,
        source_id: &str,
        content_hash: &str,
        extension: &str,
    ) -> PathBuf {
        let stamp = fetched_at.format("%Y%m%d_%H%M%S").to_string();
        let ext = extension.trim_start_matches('.').trim();
        let ext = if ext.is_empty() { "bin" } else { ext };
        PathBuf::from(stamp)
            .join(source_id)
            .join(format!("{content_hash}.{ext}"))
    }

    pub async fn archive_bytes(
        &self,
        fetched_at: DateTime<Utc>,
        source_id: &str,
        extension: &str,
        bytes: &[u8],
    ) -> anyhow::Result<ArchivedSnapshot> {
        let content_hash = Self::sha256_hex(bytes);
        let relative_path =
            self.snapshot_relative_path(fetched_at, source_id, &content_hash, extension);
        let absolute_path = self.root.join(&relative_path);

        let deduplicated = fs::try_exists(&absolute_path)
            .await
            .with_context(|| format!("checking snapshot path {}", absolute_path.display()))?;
        if !deduplicated {
            write_atomically(&absolute_path, bytes).await?;
        }

        Ok(ArchivedSnapshot {
            content_hash,
            relative_path,
            absolute_path,
            byte_size: bytes.len(),
            deduplicated,
        })
    }
}

/// Writes `bytes` to a sibling temp file, then renames it over `path`.
pub async fn write_atomically(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("creating directory {}", parent.display()))?;

    let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&temp_path)
        .await
        .with_context(|| format!("opening temp file {}", temp_path.display()))?;
    file.write_all(bytes)
        .await
        .with_context(|| format!("writing temp file {}", temp_path.display()))?;
    file.flush()
        .await
        .with_context(|| format!("flushing temp file {}", temp_path.display()))?;
    drop(file);

    if let Err(err) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(err).with_context(|| {
            format!("atomically renaming {} -> {}", temp_path.display(), path.display())
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alfa_core::{LifecycleStage, MissionType, OwnershipType, Priority, Rarity, SourceStatus};
    use tempfile::tempdir;

    fn ts() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T04:00:00Z")
            .expect("ts")
            .with_timezone(&Utc)
    }

    fn asset(sku: &str, name: &str) -> Asset {
        Asset {
            sku_id: sku.to_string(),
            display_name: name.to_string(),
            parent_artist_ids: Default::default(),
            file_path_drive: None,
            source_status: SourceStatus::Exported,
            ownership_type: OwnershipType::Owned,
            current_rarity: Rarity::Epic,
            lifecycle_stage: LifecycleStage::Incubation,
            created_at: ts(),
            is_collection: false,
            pins: vec![],
        }
    }

    #[test]
    fn snapshot_hashing_is_stable() {
        let hash = SnapshotArchive::sha256_hex(b"hello world");
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[tokio::test]
    async fn identical_batches_deduplicate_by_hash_path() {
        let dir = tempdir().expect("tempdir");
        let archive = SnapshotArchive::new(dir.path());
        let first = archive
            .archive_bytes(ts(), "pinterest", "json", b"[{\"id\":\"P1\"}]")
            .await
            .expect("first");
        let second = archive
            .archive_bytes(ts(), "pinterest", "json", b"[{\"id\":\"P1\"}]")
            .await
            .expect("second");

        assert!(!first.deduplicated);
        assert!(second.deduplicated);
        assert_eq!(first.relative_path, second.relative_path);
        assert!(first.absolute_path.exists());
    }

    #[tokio::test]
    async fn missing_catalog_loads_empty() {
        let dir = tempdir().expect("tempdir");
        let store = CatalogStore::new(dir.path().join("catalog.json"));
        let catalog = store.load().await.expect("load");
        assert_eq!(catalog, Catalog::default());
    }

    #[tokio::test]
    async fn catalog_survives_save_and_load() {
        let dir = tempdir().expect("tempdir");
        let store = CatalogStore::new(dir.path().join("nested").join("catalog.json"));
        let mut catalog = Catalog {
            credits: 40,
            ..Catalog::default()
        };
        catalog.assets.push(asset("SKU-00045", "ANUEL TOUR 2025 V1"));
        catalog.missions.push(Mission::open(
            "LEAK-SKU-00045",
            MissionType::UrgentLeakFix,
            Priority::High,
            Some("SKU-00045".to_string()),
            "leak",
            vec!["OUT:15".to_string()],
            vec![],
            ts(),
        ));
        store.save(&catalog).await.expect("save");
        let loaded = store.load().await.expect("load");
        assert_eq!(loaded, catalog);
    }

    #[test]
    fn upsert_replaces_by_key() {
        let mut assets = vec![asset("SKU-1", "old"), asset("SKU-2", "two")];
        upsert(&mut assets, asset("SKU-1", "new"));
        upsert(&mut assets, asset("SKU-3", "three"));
        let names: Vec<_> = assets.iter().map(|a| a.display_name.as_str()).collect();
        assert_eq!(names, vec!["new", "two", "three"]);
    }
}
