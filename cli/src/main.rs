//! `govsearch`: schema management and indexing runs.
//!
//! ```text
//! govsearch migrate
//! govsearch backfill --days 365 --quarters 8
//! govsearch incremental --hours 24
//! ```
//!
//! The store location comes from `--database-url`, `GOVSEARCH_DATABASE_URL`
//! or `store.database_url` in the configuration, in that order.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use govsearch_core::audit::JsonlRunLedger;
use govsearch_core::config::AppConfig;
use govsearch_core::init_tracing;
use ingestion::normalize::Normalizer;
use ingestion::processor::{IndexingPipeline, RunReport};
use ingestion::sources::build_adapters;
use jobs::window::{DEFAULT_BACKFILL_DAYS, DEFAULT_BACKFILL_QUARTERS, DEFAULT_INCREMENTAL_HOURS};
use jobs::RunMode;
use serde_json::json;
use storage::repo::Repository;

#[derive(Parser, Debug)]
#[command(name = "govsearch")]
#[command(about = "Index government signals into the GovSearch document store")]
struct Cli {
    /// Store connection string (`wal://path`, `file://path` or a bare path)
    #[arg(long, env = "GOVSEARCH_DATABASE_URL", global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the store schema if it does not exist yet
    Migrate,
    /// Full historical load
    Backfill {
        #[arg(long, default_value_t = DEFAULT_BACKFILL_DAYS)]
        days: u32,
        /// Lobbying filings lookback, in quarters
        #[arg(long, default_value_t = DEFAULT_BACKFILL_QUARTERS)]
        quarters: u32,
    },
    /// Recent window only
    Incremental {
        #[arg(long, default_value_t = DEFAULT_INCREMENTAL_HOURS)]
        hours: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::load().context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    init_tracing(config.logging.format);

    let database_url = config.database_url(cli.database_url.as_deref())?;
    let repo = Repository::open_url(&database_url)
        .await
        .with_context(|| format!("failed to open store at {database_url}"))?
        .with_batch_size(config.store.batch_size);
    let repo = Arc::new(repo);

    match cli.command {
        Command::Migrate => {
            let created = repo.ensure_schema().await?;
            tracing::info!(created, database_url = %database_url, "schema ready");
        }
        Command::Backfill { days, quarters } => {
            let report = index(&config, repo, RunMode::backfill(days, quarters)).await?;
            print_report(&report)?;
        }
        Command::Incremental { hours } => {
            let report = index(&config, repo, RunMode::incremental(hours)).await?;
            print_report(&report)?;
        }
    }

    Ok(())
}

async fn index(
    config: &AppConfig,
    repo: Arc<Repository>,
    mode: RunMode,
) -> anyhow::Result<RunReport> {
    repo.ensure_schema().await?;

    let adapters = build_adapters(&config.sources).context("failed to build source adapters")?;
    let normalizer = Normalizer::from_config(&config.scoring);
    let mut pipeline = IndexingPipeline::with_normalizer(repo, adapters, normalizer);
    if let Some(path) = &config.ledger.path {
        let ledger = JsonlRunLedger::open(path)
            .with_context(|| format!("failed to open run ledger at {path}"))?;
        pipeline.set_ledger(Arc::new(ledger));
    }

    let report = pipeline.run(mode).await.context("indexing run failed")?;
    Ok(report)
}

fn print_report(report: &RunReport) -> anyhow::Result<()> {
    let summary = json!({
        "kind": report.kind,
        "window": report.window,
        "fetched": report.fetched,
        "documents": report.documents,
        "failed_sources": report.failed_sources,
        "rejected_rows": report.rejected_rows,
        "duplicate_rows": report.duplicate_rows,
        "attempted": {
            "documents": report.documents_attempted,
            "edges": report.edges_attempted,
        },
        "committed": {
            "documents": report.committed.documents_upserted,
            "edges_inserted": report.committed.edges_inserted,
            "edges_deleted": report.committed.edges_deleted,
            "lsn": report.committed.lsn,
        },
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_windows() {
        let cli = Cli::try_parse_from(["govsearch", "backfill"]).unwrap();
        match cli.command {
            Command::Backfill { days, quarters } => {
                assert_eq!(days, 365);
                assert_eq!(quarters, 8);
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = Cli::try_parse_from(["govsearch", "incremental", "--hours", "6"]).unwrap();
        assert!(matches!(cli.command, Command::Incremental { hours: 6 }));
    }

    #[test]
    fn test_database_url_flag_is_global() {
        let cli =
            Cli::try_parse_from(["govsearch", "migrate", "--database-url", "wal:///tmp/x.wal"])
                .unwrap();
        assert_eq!(cli.database_url.as_deref(), Some("wal:///tmp/x.wal"));
    }
}
