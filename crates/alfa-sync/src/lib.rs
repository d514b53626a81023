//! Cycle orchestration: fetch engagement, run the reconciliation sequence, persist, report.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use alfa_adapters::{
    probe_links, source_for, EngagementSource, FetchContext, PinterestSettings, SourceError,
    SourceSettings,
};
use alfa_core::{
    advance_lifecycle, apply_pin_updates, check_link_health, classify_rarity, detect_leaks,
    detect_unpinned, merge_missions, open_missions, reconcile, EngagementItem, LinkHealth, Mission,
    MissionType, ReconcileOutcome,
};
use alfa_storage::{
    Catalog, CatalogStore, Credential, HttpClientConfig, HttpFetcher, RateLimit, SnapshotArchive,
};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

mod ops;
mod reports;

pub use ops::{
    add_asset, apply_credits, claim_pin, claim_suggestions, list_inventory, list_open_missions,
    resolve_mission, verify_sku, CreditAction, InventoryRow, OperatorError,
};
pub use reports::{
    export_parquet_snapshots, report_daily_markdown, write_reports, CycleRecord, ParquetManifest,
    ParquetManifestFile,
};

pub const CRATE_NAME: &str = "alfa-sync";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Pinterest,
    Fixture,
}

impl SourceKind {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pinterest" => Ok(Self::Pinterest),
            "fixture" => Ok(Self::Fixture),
            other => bail!("unknown ALFA_SOURCE `{other}` (expected `pinterest` or `fixture`)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub workspace_root: PathBuf,
    pub catalog_path: PathBuf,
    pub archive_dir: PathBuf,
    pub source: SourceKind,
    pub fixture_path: PathBuf,
    pub pinterest: PinterestSettings,
    pub probe_links: bool,
    pub scheduler_enabled: bool,
    pub cycle_cron: String,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    /// Budget shared by the engagement sweep and link probes. `None` when the burst is 0.
    pub rate_limit: Option<RateLimit>,
}

impl SyncConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let flag = |key: &str| {
            lookup(key)
                .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(false)
        };

        let workspace_root = lookup("ALFA_WORKSPACE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let catalog_path = lookup("ALFA_CATALOG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| workspace_root.join("catalog.json"));
        let archive_dir = lookup("ALFA_ARCHIVE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| workspace_root.join("archive"));
        let fixture_path = lookup("ALFA_FIXTURE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| workspace_root.join("fixtures").join("engagement.json"));
        let source = match lookup("ALFA_SOURCE") {
            Some(value) => SourceKind::parse(&value)?,
            None => SourceKind::Fixture,
        };

        let defaults = PinterestSettings::default();
        let pinterest = PinterestSettings {
            base_url: lookup("ALFA_PINTEREST_BASE_URL").unwrap_or(defaults.base_url),
            credential: lookup("ALFA_PINTEREST_TOKEN")
                .map(Credential::bearer)
                .filter(|c| !c.is_empty()),
            lookback_days: parsed("ALFA_LOOKBACK_DAYS")
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(defaults.lookback_days),
            page_size: parsed("ALFA_PAGE_SIZE")
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(defaults.page_size),
            safety_limit: parsed("ALFA_SAFETY_LIMIT")
                .and_then(|v| usize::try_from(v).ok())
                .unwrap_or(defaults.safety_limit),
            pin_pacing: parsed("ALFA_PIN_PACING_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.pin_pacing),
        };

        let burst = parsed("ALFA_RATE_LIMIT_BURST")
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(5);
        let rate_limit = (burst > 0).then(|| RateLimit {
            burst,
            interval: Duration::from_millis(parsed("ALFA_RATE_LIMIT_INTERVAL_MS").unwrap_or(200)),
        });

        Ok(Self {
            workspace_root,
            catalog_path,
            archive_dir,
            source,
            fixture_path,
            pinterest,
            probe_links: flag("ALFA_PROBE_LINKS"),
            scheduler_enabled: flag("ALFA_SCHEDULER_ENABLED"),
            cycle_cron: lookup("ALFA_CYCLE_CRON").unwrap_or_else(|| "0 0 4 * * *".to_string()),
            user_agent: lookup("ALFA_USER_AGENT").unwrap_or_else(|| "alfa-bot/0.1".to_string()),
            http_timeout_secs: parsed("ALFA_HTTP_TIMEOUT_SECS").unwrap_or(20),
            rate_limit,
        })
    }

    pub fn source_settings(&self) -> SourceSettings {
        match self.source {
            SourceKind::Pinterest => SourceSettings::Pinterest(self.pinterest.clone()),
            SourceKind::Fixture => SourceSettings::Fixture {
                path: self.fixture_path.clone(),
            },
        }
    }

    pub fn catalog_store(&self) -> CatalogStore {
        CatalogStore::new(self.catalog_path.clone())
    }
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("a reconciliation cycle is already running")]
    AlreadyRunning,
    #[error("the {source_id} credential has expired or is missing; re-authenticate and rerun")]
    CredentialExpired { source_id: String },
}

/// Progress notifications emitted by the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleEvent {
    Started { run_id: Uuid },
    Fetched { source_id: String, items: usize },
    Archived { path: PathBuf, deduplicated: bool },
    Reconciled { refreshed_pins: usize, orphans: usize, missions: usize },
    Promoted { sku_id: String },
    LinkBroken { mission_id: String },
    MissionsMerged { open: usize, total: usize },
    Persisted { path: PathBuf },
    CredentialExpired { source_id: String },
    Finished { run_id: Uuid },
}

pub trait CycleObserver: Send + Sync {
    fn on_event(&self, event: &CycleEvent);
}

/// Forwards cycle events to `tracing`.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl CycleObserver for TracingObserver {
    fn on_event(&self, event: &CycleEvent) {
        match event {
            CycleEvent::Started { run_id } => info!(%run_id, "cycle started"),
            CycleEvent::Fetched { source_id, items } => {
                info!(source_id = %source_id, items, "engagement fetched")
            }
            CycleEvent::Archived { path, deduplicated } => {
                info!(path = %path.display(), deduplicated, "raw batch archived")
            }
            CycleEvent::Reconciled {
                refreshed_pins,
                orphans,
                missions,
            } => info!(refreshed_pins, orphans, missions, "reconciled"),
            CycleEvent::Promoted { sku_id } => {
                info!(sku_id = %sku_id, "asset promoted to monetization")
            }
            CycleEvent::LinkBroken { mission_id } => {
                warn!(mission_id = %mission_id, "monetization link broken")
            }
            CycleEvent::MissionsMerged { open, total } => info!(open, total, "missions merged"),
            CycleEvent::Persisted { path } => info!(path = %path.display(), "catalog persisted"),
            CycleEvent::CredentialExpired { source_id } => {
                warn!(source_id = %source_id, "credential expired; operator must re-authenticate")
            }
            CycleEvent::Finished { run_id } => info!(%run_id, "cycle finished"),
        }
    }
}

/// Result of running the reconciliation sequence over one catalog snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    pub catalog: Catalog,
    pub reconciled: ReconcileOutcome,
    pub promoted: Vec<String>,
    /// Every mission raised this cycle, before merging into the board.
    pub detected: Vec<Mission>,
    pub link_missions: usize,
}

/// Reconcile, fold pin refreshes, advance lifecycle, classify rarity, fold link probes,
/// detect leaks and unpinned assets, merge missions. No I/O.
pub fn run_cycle(
    catalog: &Catalog,
    items: &[EngagementItem],
    probes: &BTreeMap<String, LinkHealth>,
    now: DateTime<Utc>,
) -> CycleOutcome {
    let reconciled = reconcile(&catalog.assets, items, now);
    let refreshed = apply_pin_updates(&catalog.assets, &reconciled.updated_pins_by_sku);
    let advanced = advance_lifecycle(&refreshed, now);
    let promoted = advanced
        .iter()
        .zip(&refreshed)
        .filter(|(after, before)| after.lifecycle_stage != before.lifecycle_stage)
        .map(|(after, _)| after.sku_id.clone())
        .collect();
    let classified = classify_rarity(&advanced);

    // Links broken this cycle no longer count as captured flow.
    let health = check_link_health(&catalog.links, probes, now);
    let leaks = detect_leaks(&classified, &health.updated_links, now);
    let unpinned = detect_unpinned(&classified, now);

    let mut detected = reconciled.missions.clone();
    detected.extend(health.missions.iter().cloned());
    detected.extend(leaks);
    detected.extend(unpinned);
    let missions = merge_missions(&catalog.missions, &detected);

    let next = Catalog {
        assets: classified,
        links: health.updated_links,
        missions,
        orphans: reconciled.orphans.clone(),
        ..catalog.clone()
    };

    CycleOutcome {
        catalog: next,
        reconciled,
        promoted,
        detected,
        link_missions: health.missions.len(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub run_id: Uuid,
    pub source_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub fetched_items: usize,
    pub refreshed_pins: usize,
    pub orphans: usize,
    pub promoted: Vec<String>,
    pub detected_missions: usize,
    pub open_missions: usize,
    pub archived_snapshot: String,
    pub reports_dir: String,
    pub parquet_manifest: String,
}

pub struct SyncPipeline {
    config: SyncConfig,
    store: CatalogStore,
    archive: SnapshotArchive,
    http: HttpFetcher,
    source: Box<dyn EngagementSource>,
    observer: Box<dyn CycleObserver>,
    cycle_lock: Mutex<()>,
}

impl SyncPipeline {
    pub fn new(config: SyncConfig) -> Result<Self> {
        let http = HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(config.http_timeout_secs),
            user_agent: Some(config.user_agent.clone()),
            rate_limit: config.rate_limit,
            ..Default::default()
        })?;
        Ok(Self {
            store: config.catalog_store(),
            archive: SnapshotArchive::new(config.archive_dir.clone()),
            source: source_for(&config.source_settings()),
            http,
            observer: Box::<TracingObserver>::default(),
            cycle_lock: Mutex::new(()),
            config,
        })
    }

    pub fn with_source(mut self, source: Box<dyn EngagementSource>) -> Self {
        self.source = source;
        self
    }

    pub fn with_observer(mut self, observer: Box<dyn CycleObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    /// Runs one cycle. Only one cycle runs at a time; a call made while another is in flight
    /// fails with [`CycleError::AlreadyRunning`].
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<CycleSummary> {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            return Err(CycleError::AlreadyRunning.into());
        };
        let run_id = Uuid::new_v4();
        self.run_locked(run_id, now)
            .instrument(info_span!("cycle", %run_id))
            .await
    }

    async fn run_locked(&self, run_id: Uuid, now: DateTime<Utc>) -> Result<CycleSummary> {
        self.observer.on_event(&CycleEvent::Started { run_id });
        let source_id = self.source.source_id().to_string();

        let catalog = self.store.load().await?;

        let ctx = FetchContext { run_id, now };
        let items = match self.source.fetch_engagement(&self.http, &ctx).await {
            Ok(items) => items,
            Err(SourceError::CredentialExpired) => {
                self.observer.on_event(&CycleEvent::CredentialExpired {
                    source_id: source_id.clone(),
                });
                return Err(CycleError::CredentialExpired { source_id }.into());
            }
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context(format!("fetching engagement from {source_id}")));
            }
        };
        self.observer.on_event(&CycleEvent::Fetched {
            source_id: source_id.clone(),
            items: items.len(),
        });

        let raw = serde_json::to_vec(&items).context("serializing engagement batch")?;
        let archived = self.archive.archive_bytes(now, &source_id, "json", &raw).await?;
        self.observer.on_event(&CycleEvent::Archived {
            path: archived.absolute_path.clone(),
            deduplicated: archived.deduplicated,
        });

        let probes = if self.config.probe_links {
            probe_links(&self.http, run_id, &catalog.links).await
        } else {
            BTreeMap::new()
        };

        let outcome = run_cycle(&catalog, &items, &probes, now);
        let refreshed_pins: usize = outcome
            .reconciled
            .updated_pins_by_sku
            .values()
            .map(Vec::len)
            .sum();
        self.observer.on_event(&CycleEvent::Reconciled {
            refreshed_pins,
            orphans: outcome.reconciled.orphans.len(),
            missions: outcome.reconciled.missions.len(),
        });
        for sku_id in &outcome.promoted {
            self.observer.on_event(&CycleEvent::Promoted { sku_id: sku_id.clone() });
        }
        for mission in outcome
            .detected
            .iter()
            .filter(|m| m.mission_type == MissionType::ApiSyncError)
        {
            self.observer.on_event(&CycleEvent::LinkBroken {
                mission_id: mission.id.clone(),
            });
        }
        let open = open_missions(&outcome.catalog.missions).len();
        self.observer.on_event(&CycleEvent::MissionsMerged {
            open,
            total: outcome.catalog.missions.len(),
        });

        self.store.save(&outcome.catalog).await?;
        self.observer.on_event(&CycleEvent::Persisted {
            path: self.store.path().to_path_buf(),
        });

        let record = CycleRecord {
            run_id,
            source_id: source_id.clone(),
            started_at: now,
            finished_at: Utc::now(),
            status: "completed".to_string(),
        };
        let reports_dir = write_reports(&self.config.workspace_root, &record, &outcome).await?;
        let manifest_path = export_parquet_snapshots(&reports_dir, &outcome.catalog).await?;

        self.observer.on_event(&CycleEvent::Finished { run_id });
        Ok(CycleSummary {
            run_id,
            source_id,
            started_at: record.started_at,
            finished_at: record.finished_at,
            fetched_items: items.len(),
            refreshed_pins,
            orphans: outcome.reconciled.orphans.len(),
            promoted: outcome.promoted,
            detected_missions: outcome.detected.len(),
            open_missions: open,
            archived_snapshot: archived.relative_path.display().to_string(),
            reports_dir: reports_dir.display().to_string(),
            parquet_manifest: manifest_path.display().to_string(),
        })
    }

    /// Registers the daily cycle job when the scheduler is enabled.
    pub async fn maybe_build_scheduler(self: &Arc<Self>) -> Result<Option<JobScheduler>> {
        if !self.config.scheduler_enabled {
            return Ok(None);
        }

        let sched = JobScheduler::new().await.context("creating scheduler")?;
        let cron = self.config.cycle_cron.clone();
        let pipeline = Arc::clone(self);
        let job = Job::new_async(cron.as_str(), move |_uuid, _l| {
            let pipeline = Arc::clone(&pipeline);
            Box::pin(async move {
                match pipeline.run_once(Utc::now()).await {
                    Ok(summary) => info!(
                        run_id = %summary.run_id,
                        open = summary.open_missions,
                        "scheduled cycle complete"
                    ),
                    Err(err) => warn!(error = %format!("{err:#}"), "scheduled cycle failed"),
                }
            })
        })
        .with_context(|| format!("creating scheduler job for cron {cron}"))?;
        sched.add(job).await.context("adding scheduler job")?;
        Ok(Some(sched))
    }
}

/// Starts the scheduler and blocks until Ctrl-C.
pub async fn run_scheduler_until_shutdown(pipeline: Arc<SyncPipeline>) -> Result<()> {
    let Some(mut sched) = pipeline.maybe_build_scheduler().await? else {
        bail!("scheduler disabled; set ALFA_SCHEDULER_ENABLED=true");
    };
    sched.start().await.context("starting scheduler")?;
    info!(cron = %pipeline.config().cycle_cron, "scheduler running");
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    sched.shutdown().await.context("stopping scheduler")?;
    Ok(())
}

pub async fn run_cycle_once_from_env() -> Result<CycleSummary> {
    let pipeline = SyncPipeline::new(SyncConfig::from_env()?)?;
    pipeline.run_once(Utc::now()).await
}
