use std::collections::BTreeSet;
use std::sync::Arc;

use alfa_core::{InventorySort, OwnershipType};
use alfa_sync::{CreditAction, CycleError, SyncConfig, SyncPipeline};
use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "alfa-cli")]
#[command(about = "ALFA asset reconciliation and scoring")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one reconciliation cycle now.
    Cycle,
    /// Run cycles on the configured cron schedule until Ctrl-C.
    Schedule,
    /// List open missions, highest priority first.
    Missions,
    /// Resolve every open mission on an asset.
    Verify { sku: String },
    /// Resolve a single mission by id.
    Resolve { mission_id: String },
    /// Suggest which asset each unclaimed pin belongs to.
    Claims,
    /// Attach an unclaimed pin to an asset.
    Claim { pin_id: String, sku: String },
    Inventory {
        #[arg(long, value_enum, default_value_t = SortArg::Score)]
        sort: SortArg,
    },
    AddAsset {
        name: String,
        #[arg(long = "artist")]
        artists: Vec<String>,
        #[arg(long)]
        commissioned: bool,
    },
    Credits {
        #[command(subcommand)]
        action: CreditsCommand,
    },
    /// Summarize the most recent cycle reports.
    Report {
        #[arg(long, default_value_t = 1)]
        runs: usize,
    },
}

#[derive(Debug, Subcommand)]
enum CreditsCommand {
    /// Inject capital in USD.
    Inject { usd: f64 },
    Consume { credits: u64 },
    Adjust {
        #[arg(allow_negative_numbers = true)]
        delta: i64,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SortArg {
    Score,
    Outbound,
    Yield,
}

impl From<SortArg> for InventorySort {
    fn from(value: SortArg) -> Self {
        match value {
            SortArg::Score => InventorySort::Score,
            SortArg::Outbound => InventorySort::Outbound,
            SortArg::Yield => InventorySort::Yield,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = SyncConfig::from_env()?;
    let store = config.catalog_store();

    match cli.command.unwrap_or(Commands::Cycle) {
        Commands::Cycle => {
            let pipeline = SyncPipeline::new(config)?;
            match pipeline.run_once(Utc::now()).await {
                Ok(summary) => println!(
                    "cycle complete: run_id={} fetched={} refreshed={} orphans={} promoted={} \
                     open_missions={} reports={}",
                    summary.run_id,
                    summary.fetched_items,
                    summary.refreshed_pins,
                    summary.orphans,
                    summary.promoted.len(),
                    summary.open_missions,
                    summary.reports_dir
                ),
                Err(err) => {
                    if let Some(CycleError::CredentialExpired { .. }) =
                        err.downcast_ref::<CycleError>()
                    {
                        eprintln!(
                            "credential expired: set ALFA_PINTEREST_TOKEN to a fresh token \
                             and rerun `alfa-cli cycle`"
                        );
                    }
                    return Err(err);
                }
            }
        }
        Commands::Schedule => {
            let pipeline = Arc::new(SyncPipeline::new(config)?);
            alfa_sync::run_scheduler_until_shutdown(pipeline).await?;
        }
        Commands::Missions => {
            for m in alfa_sync::list_open_missions(&store).await? {
                println!(
                    "{:<7} {:<24} {:<10} {}",
                    format!("{:?}", m.priority).to_ascii_uppercase(),
                    m.id,
                    m.asset_sku.as_deref().unwrap_or("-"),
                    m.message
                );
                if !m.evidence.is_empty() {
                    println!("        evidence: {}", m.evidence.join(" "));
                }
            }
        }
        Commands::Verify { sku } => {
            let resolved = alfa_sync::verify_sku(&store, &sku).await?;
            println!("{sku}: {resolved} mission(s) resolved");
        }
        Commands::Resolve { mission_id } => {
            if alfa_sync::resolve_mission(&store, &mission_id).await? {
                println!("{mission_id}: resolved");
            } else {
                println!("{mission_id}: no open mission with that id");
            }
        }
        Commands::Claims => {
            for s in alfa_sync::claim_suggestions(&store).await? {
                println!("{} -> {} ({:.2}, {:?})", s.pin_id, s.sku_id, s.confidence, s.reason);
            }
        }
        Commands::Claim { pin_id, sku } => {
            let asset = alfa_sync::claim_pin(&store, &pin_id, &sku).await?;
            println!("{pin_id} claimed into {} ({} pins)", asset.sku_id, asset.pins.len());
        }
        Commands::Inventory { sort } => {
            for row in alfa_sync::list_inventory(&store, sort.into()).await? {
                println!(
                    "{:<10} {:<32} {:<12} {:<9} score={:<10} out={:<6} revenue={:.2}",
                    row.sku_id,
                    row.display_name,
                    format!("{:?}", row.lifecycle_stage),
                    format!("{:?}", row.rarity),
                    row.score,
                    row.outbound,
                    row.revenue
                );
            }
        }
        Commands::AddAsset {
            name,
            artists,
            commissioned,
        } => {
            let ownership = if commissioned {
                OwnershipType::Commissioned
            } else {
                OwnershipType::Owned
            };
            let artist_ids: BTreeSet<String> = artists.into_iter().collect();
            let asset =
                alfa_sync::add_asset(&store, &name, artist_ids, ownership, Utc::now()).await?;
            println!("registered {} {}", asset.sku_id, asset.display_name);
        }
        Commands::Credits { action } => {
            let action = match action {
                CreditsCommand::Inject { usd } => CreditAction::Inject(usd),
                CreditsCommand::Consume { credits } => CreditAction::Consume(credits),
                CreditsCommand::Adjust { delta } => CreditAction::Adjust(delta),
            };
            let (tx, balance) = alfa_sync::apply_credits(&store, action, Utc::now()).await?;
            println!(
                "{} {:?} delta={} balance={balance}",
                tx.trans_id,
                tx.source_type,
                tx.credits_delta.unwrap_or_default()
            );
        }
        Commands::Report { runs } => {
            let markdown =
                alfa_sync::report_daily_markdown(runs, Some(config.workspace_root.clone()))?;
            println!("{markdown}");
        }
    }

    Ok(())
}
