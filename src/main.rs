use std::path::PathBuf;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use oss_activity_pipeline::config::PipelineArgs;
use oss_activity_pipeline::error::PipelineError;
use oss_activity_pipeline::quality::{self, Dataset};
use oss_activity_pipeline::{db, pipeline, report};

#[derive(Parser)]
#[command(name = "oss-activity")]
#[command(about = "Repository trend and contributor network pipeline over GitHub activity", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a deterministic demo event history
    Seed {
        /// Last day of the generated history (defaults to today, UTC)
        #[arg(long)]
        run_date: Option<NaiveDate>,
    },
    /// Import raw events from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Recompute and publish every dataset for a snapshot date
    Run {
        /// Snapshot date stamped on every output row (defaults to today, UTC)
        #[arg(long, env = "RUN_DATE")]
        run_date: Option<NaiveDate>,
        /// Compute every stage without publishing
        #[arg(long)]
        dry_run: bool,
        #[command(flatten)]
        pipeline_args: PipelineArgs,
    },
    /// Print data-quality measurements for a published dataset as JSON
    Check {
        #[arg(long, value_enum)]
        dataset: Dataset,
        /// Column whose null rate is measured
        #[arg(long)]
        column: Option<String>,
        /// Snapshot to measure (defaults to the latest)
        #[arg(long)]
        snapshot_date: Option<NaiveDate>,
    },
    /// Generate a markdown report for a published snapshot
    Report {
        #[arg(long)]
        snapshot_date: Option<NaiveDate>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed { run_date } => {
            let pool = connect().await?;
            let run_date = run_date.unwrap_or_else(today);
            let inserted = db::seed(&pool, run_date).await?;
            println!("Inserted {inserted} seed events ending {run_date}.");
        }
        Commands::Import { csv } => {
            let pool = connect().await?;
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} events from {}.", csv.display());
        }
        Commands::Run {
            run_date,
            dry_run,
            pipeline_args,
        } => {
            let config = pipeline_args.into_config()?;
            let pool = connect().await?;
            let run_date = run_date.unwrap_or_else(today);
            let started_at = Utc::now();

            let raw = db::fetch_raw_events(&pool, config.raw_fetch_since(run_date)).await?;
            let output = pipeline::run(&raw, &config, run_date)?;
            let meta = &output.metadata;

            if dry_run {
                tracing::info!(run_id = %meta.run_id, "dry run, nothing published");
            } else {
                db::publish(&pool, &output, started_at).await?;
                tracing::info!(run_id = %meta.run_id, %run_date, "published snapshot");
            }

            println!(
                "Snapshot {}: {} trend rows, {} edges, {} repositories ({} malformed rows skipped).",
                run_date, meta.trend_rows, meta.edge_rows, meta.snapshot_rows, meta.malformed_skipped
            );
        }
        Commands::Check {
            dataset,
            column,
            snapshot_date,
        } => {
            let pool = connect().await?;
            let Some(snapshot_date) = resolve_snapshot(&pool, dataset, snapshot_date).await? else {
                println!("No published snapshot for {}.", dataset.table());
                return Ok(());
            };
            let previous = db::previous_snapshot_date(&pool, dataset, snapshot_date).await?;
            let column = column.as_deref();

            let report = match dataset {
                Dataset::RepoTrend => {
                    let current = db::fetch_trends(&pool, snapshot_date).await?;
                    let prior = match previous {
                        Some(date) => Some((date, db::fetch_trends(&pool, date).await?)),
                        None => None,
                    };
                    quality::assess(
                        snapshot_date,
                        &current,
                        prior.as_ref().map(|(date, rows)| (*date, rows.as_slice())),
                        column,
                    )?
                }
                Dataset::ContributorEdges => {
                    let current = db::fetch_edges(&pool, snapshot_date).await?;
                    let prior = match previous {
                        Some(date) => Some((date, db::fetch_edges(&pool, date).await?)),
                        None => None,
                    };
                    quality::assess(
                        snapshot_date,
                        &current,
                        prior.as_ref().map(|(date, rows)| (*date, rows.as_slice())),
                        column,
                    )?
                }
                Dataset::RepoPopularitySnapshots => {
                    let current = db::fetch_snapshots(&pool, snapshot_date).await?;
                    let prior = match previous {
                        Some(date) => Some((date, db::fetch_snapshots(&pool, date).await?)),
                        None => None,
                    };
                    quality::assess(
                        snapshot_date,
                        &current,
                        prior.as_ref().map(|(date, rows)| (*date, rows.as_slice())),
                        column,
                    )?
                }
            };

            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Report {
            snapshot_date,
            limit,
            out,
        } => {
            let pool = connect().await?;
            let Some(snapshot_date) =
                resolve_snapshot(&pool, Dataset::RepoTrend, snapshot_date).await?
            else {
                println!("No published snapshot to report on.");
                return Ok(());
            };

            let trends = db::fetch_trends(&pool, snapshot_date).await?;
            let edges = db::fetch_edges(&pool, snapshot_date).await?;
            let snapshots = db::fetch_snapshots(&pool, snapshot_date).await?;
            let report = report::build_report(snapshot_date, &trends, &edges, &snapshots, limit);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL").map_err(|_| {
        PipelineError::Configuration("DATABASE_URL must be set to a Postgres instance".to_string())
    })?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn resolve_snapshot(
    pool: &PgPool,
    dataset: Dataset,
    requested: Option<NaiveDate>,
) -> anyhow::Result<Option<NaiveDate>> {
    match requested {
        Some(date) => Ok(Some(date)),
        None => db::latest_snapshot_date(pool, dataset).await,
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}
