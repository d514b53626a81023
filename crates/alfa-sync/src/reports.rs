use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use alfa_core::catalog::revenue_for;
use alfa_core::scoring::display_score;
use alfa_core::{asset_score, inventory, open_missions, Asset, InventorySort, Mission};
use alfa_storage::{write_atomically, Catalog, SnapshotArchive};
use anyhow::{Context, Result};
use arrow_array::{Float64Array, RecordBatch, StringArray, UInt32Array, UInt64Array};
use arrow_schema::{DataType, Field as ArrowField, Schema};
use chrono::{DateTime, Utc};
use parquet::arrow::ArrowWriter;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CycleOutcome;

const TOP_ASSETS_IN_BRIEF: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleRecord {
    pub run_id: Uuid,
    pub source_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParquetManifest {
    pub schema_version: u32,
    pub files: Vec<ParquetManifestFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParquetManifestFile {
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

/// SCREAMING_SNAKE_CASE name an enum serializes to.
fn wire_name<T: Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

fn mission_line(mission: &Mission) -> String {
    format!(
        "- [{}] `{}` {} {}: {}",
        wire_name(&mission.priority),
        mission.id,
        wire_name(&mission.mission_type),
        mission.asset_sku.as_deref().unwrap_or("-"),
        mission.message
    )
}

fn asset_line(asset: &Asset, catalog: &Catalog) -> String {
    format!(
        "- `{}` {} | {} | {} | score {} | outbound {} | revenue {:.2}",
        asset.sku_id,
        asset.display_name,
        wire_name(&asset.lifecycle_stage),
        wire_name(&asset.current_rarity),
        display_score(asset_score(asset)),
        asset.total_outbound(),
        revenue_for(&asset.sku_id, &catalog.links)
    )
}

pub fn render_daily_brief(record: &CycleRecord, outcome: &CycleOutcome) -> String {
    let catalog = &outcome.catalog;
    let open = open_missions(&catalog.missions);
    let refreshed: usize = outcome.reconciled.updated_pins_by_sku.values().map(Vec::len).sum();

    let mut lines = vec![
        "# ALFA Daily Brief".to_string(),
        String::new(),
        format!("- Run ID: `{}`", record.run_id),
        format!("- Source: {}", record.source_id),
        format!("- Started: {}", record.started_at),
        format!("- Finished: {}", record.finished_at),
        format!("- Assets: {}", catalog.assets.len()),
        format!("- Refreshed pins: {refreshed}"),
        format!("- Orphans: {}", outcome.reconciled.orphans.len()),
        format!("- Open missions: {}", open.len()),
        format!("- Credits: {}", catalog.credits),
        String::new(),
        "## Open Missions".to_string(),
    ];
    if open.is_empty() {
        lines.push("- none".to_string());
    }
    lines.extend(open.iter().map(|m| mission_line(m)));

    lines.push(String::new());
    lines.push("## Promotions".to_string());
    if outcome.promoted.is_empty() {
        lines.push("- none".to_string());
    }
    lines.extend(outcome.promoted.iter().map(|sku| format!("- `{sku}` -> MONETIZATION")));

    lines.push(String::new());
    lines.push("## Top Assets".to_string());
    lines.extend(
        inventory(&catalog.assets, &catalog.links, InventorySort::Score)
            .into_iter()
            .take(TOP_ASSETS_IN_BRIEF)
            .map(|a| asset_line(a, catalog)),
    );
    lines.push(String::new());
    lines.join("\n")
}

/// Writes `reports/<run_id>/daily_brief.md` and `cycle_delta.json`; returns the run directory.
pub async fn write_reports(
    workspace_root: &Path,
    record: &CycleRecord,
    outcome: &CycleOutcome,
) -> Result<PathBuf> {
    let reports_dir = workspace_root.join("reports").join(record.run_id.to_string());

    let brief = render_daily_brief(record, outcome);
    write_atomically(&reports_dir.join("daily_brief.md"), brief.as_bytes())
        .await
        .context("writing daily_brief.md")?;

    let delta_json = serde_json::to_vec_pretty(&serde_json::json!({
        "cycle": record,
        "refreshed": outcome.reconciled.updated_pins_by_sku,
        "orphans": outcome.reconciled.orphans,
        "promoted": outcome.promoted,
        "missions": outcome.detected,
    }))
    .context("serializing cycle delta")?;
    write_atomically(&reports_dir.join("cycle_delta.json"), &delta_json)
        .await
        .context("writing cycle_delta.json")?;

    Ok(reports_dir)
}

/// Writes `snapshots/assets.parquet` and `snapshots/missions.parquet` under `reports_dir`,
/// plus a SHA-256 manifest. Returns the manifest path.
pub async fn export_parquet_snapshots(reports_dir: &Path, catalog: &Catalog) -> Result<PathBuf> {
    let snapshot_dir = reports_dir.join("snapshots");
    tokio::fs::create_dir_all(&snapshot_dir)
        .await
        .with_context(|| format!("creating {}", snapshot_dir.display()))?;

    let assets_path = snapshot_dir.join("assets.parquet");
    let missions_path = snapshot_dir.join("missions.parquet");
    write_assets_parquet(&assets_path, catalog)?;
    write_missions_parquet(&missions_path, &catalog.missions)?;

    let manifest = ParquetManifest {
        schema_version: 1,
        files: vec![
            manifest_entry("assets", reports_dir, &assets_path)?,
            manifest_entry("missions", reports_dir, &missions_path)?,
        ],
    };

    let manifest_path = snapshot_dir.join("manifest.json");
    let bytes = serde_json::to_vec_pretty(&manifest).context("serializing parquet manifest")?;
    write_atomically(&manifest_path, &bytes)
        .await
        .with_context(|| format!("writing {}", manifest_path.display()))?;
    Ok(manifest_path)
}

/// Markdown index over the most recent `runs` cycle report directories.
pub fn report_daily_markdown(runs: usize, workspace_root: Option<PathBuf>) -> Result<String> {
    let root = workspace_root.unwrap_or_else(|| PathBuf::from("."));
    let reports_root = root.join("reports");
    let mut dirs = std::fs::read_dir(&reports_root)
        .with_context(|| format!("reading {}", reports_root.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
        .collect::<Vec<_>>();
    dirs.sort_by_key(|e| e.metadata().and_then(|m| m.modified()).ok());
    dirs.reverse();
    let dirs = dirs.into_iter().take(runs.max(1)).collect::<Vec<_>>();

    let mut lines = vec!["# ALFA Report Daily".to_string(), String::new()];
    for dir in dirs {
        let run_id = dir.file_name().to_string_lossy().to_string();
        let delta_path = dir.path().join("cycle_delta.json");
        let daily_path = dir.path().join("daily_brief.md");
        let manifest_path = dir.path().join("snapshots").join("manifest.json");

        let delta_text = std::fs::read_to_string(&delta_path)
            .with_context(|| format!("reading {}", delta_path.display()))?;
        let delta_value: serde_json::Value = serde_json::from_str(&delta_text)
            .with_context(|| format!("parsing {}", delta_path.display()))?;
        let count_of = |key: &str| {
            delta_value
                .get(key)
                .and_then(|v| v.as_array())
                .map(|a| a.len())
                .unwrap_or(0)
        };
        let source = delta_value
            .get("cycle")
            .and_then(|v| v.get("source_id"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown-source");

        lines.push(format!("## Run `{run_id}`"));
        lines.push(format!("- source: {source}"));
        lines.push(format!("- missions raised: {}", count_of("missions")));
        lines.push(format!("- orphans: {}", count_of("orphans")));
        lines.push(format!("- promoted: {}", count_of("promoted")));
        lines.push(format!("- delta: `{}`", delta_path.display()));
        if manifest_path.exists() {
            lines.push(format!("- parquet manifest: `{}`", manifest_path.display()));
        }
        if daily_path.exists() {
            lines.push(format!("- daily brief: `{}`", daily_path.display()));
        }
        lines.push(String::new());
    }

    Ok(lines.join("\n"))
}

fn write_parquet(path: &Path, batch: RecordBatch) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)
        .with_context(|| format!("opening parquet writer {}", path.display()))?;
    writer
        .write(&batch)
        .with_context(|| format!("writing record batch {}", path.display()))?;
    writer
        .close()
        .with_context(|| format!("closing parquet writer {}", path.display()))?;
    Ok(())
}

fn write_assets_parquet(path: &Path, catalog: &Catalog) -> Result<()> {
    let assets = &catalog.assets;
    let schema = Arc::new(Schema::new(vec![
        ArrowField::new("sku_id", DataType::Utf8, false),
        ArrowField::new("display_name", DataType::Utf8, false),
        ArrowField::new("lifecycle_stage", DataType::Utf8, false),
        ArrowField::new("rarity", DataType::Utf8, false),
        ArrowField::new("score", DataType::Float64, false),
        ArrowField::new("total_outbound", DataType::UInt64, false),
        ArrowField::new("pin_count", DataType::UInt32, false),
        ArrowField::new("revenue", DataType::Float64, false),
        ArrowField::new("created_at", DataType::Utf8, false),
    ]));

    let sku_ids = StringArray::from(
        assets
            .iter()
            .map(|a| Some(a.sku_id.as_str()))
            .collect::<Vec<_>>(),
    );
    let names = StringArray::from(
        assets
            .iter()
            .map(|a| Some(a.display_name.as_str()))
            .collect::<Vec<_>>(),
    );
    let stages = StringArray::from(
        assets
            .iter()
            .map(|a| Some(wire_name(&a.lifecycle_stage)))
            .collect::<Vec<_>>(),
    );
    let rarities = StringArray::from(
        assets
            .iter()
            .map(|a| Some(wire_name(&a.current_rarity)))
            .collect::<Vec<_>>(),
    );
    let scores = Float64Array::from(assets.iter().map(asset_score).collect::<Vec<_>>());
    let outbound = UInt64Array::from(assets.iter().map(Asset::total_outbound).collect::<Vec<_>>());
    let pin_counts = UInt32Array::from(
        assets
            .iter()
            .map(|a| u32::try_from(a.pins.len()).unwrap_or(u32::MAX))
            .collect::<Vec<_>>(),
    );
    let revenue = Float64Array::from(
        assets
            .iter()
            .map(|a| revenue_for(&a.sku_id, &catalog.links))
            .collect::<Vec<_>>(),
    );
    let created_at = StringArray::from(
        assets
            .iter()
            .map(|a| Some(a.created_at.to_rfc3339()))
            .collect::<Vec<_>>(),
    );

    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(sku_ids),
            Arc::new(names),
            Arc::new(stages),
            Arc::new(rarities),
            Arc::new(scores),
            Arc::new(outbound),
            Arc::new(pin_counts),
            Arc::new(revenue),
            Arc::new(created_at),
        ],
    )
    .context("building assets record batch")?;
    write_parquet(path, batch)
}

fn write_missions_parquet(path: &Path, missions: &[Mission]) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        ArrowField::new("id", DataType::Utf8, false),
        ArrowField::new("type", DataType::Utf8, false),
        ArrowField::new("priority", DataType::Utf8, false),
        ArrowField::new("asset_sku", DataType::Utf8, true),
        ArrowField::new("status", DataType::Utf8, false),
        ArrowField::new("evidence", DataType::Utf8, false),
        ArrowField::new("created_at", DataType::Utf8, false),
    ]));

    let ids = StringArray::from(missions.iter().map(|m| Some(m.id.as_str())).collect::<Vec<_>>());
    let types = StringArray::from(
        missions
            .iter()
            .map(|m| Some(wire_name(&m.mission_type)))
            .collect::<Vec<_>>(),
    );
    let priorities = StringArray::from(
        missions
            .iter()
            .map(|m| Some(wire_name(&m.priority)))
            .collect::<Vec<_>>(),
    );
    let skus = StringArray::from(
        missions
            .iter()
            .map(|m| m.asset_sku.as_deref())
            .collect::<Vec<_>>(),
    );
    let statuses = StringArray::from(
        missions
            .iter()
            .map(|m| Some(wire_name(&m.status)))
            .collect::<Vec<_>>(),
    );
    let evidence = StringArray::from(
        missions
            .iter()
            .map(|m| Some(m.evidence.join(";")))
            .collect::<Vec<_>>(),
    );
    let created_at = StringArray::from(
        missions
            .iter()
            .map(|m| Some(m.created_at.to_rfc3339()))
            .collect::<Vec<_>>(),
    );

    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(ids),
            Arc::new(types),
            Arc::new(priorities),
            Arc::new(skus),
            Arc::new(statuses),
            Arc::new(evidence),
            Arc::new(created_at),
        ],
    )
    .context("building missions record batch")?;
    write_parquet(path, batch)
}

fn manifest_entry(name: &str, reports_dir: &Path, path: &Path) -> Result<ParquetManifestFile> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let rel = path.strip_prefix(reports_dir).unwrap_or(path).display().to_string();
    Ok(ParquetManifestFile {
        name: name.to_string(),
        path: rel,
        sha256: SnapshotArchive::sha256_hex(&bytes),
        bytes: bytes.len() as u64,
    })
}
