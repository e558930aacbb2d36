use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::error;

use caixa_aberta::cache::GeocodeCache;
use caixa_aberta::config::AppConfig;
use caixa_aberta::errors::AppResult;
use caixa_aberta::pipeline::{self, RunOptions};
use caixa_aberta::{init_tracing, report, store};

#[derive(Parser)]
#[command(version, about = "Caixa real-estate listing history pipeline")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Merge the day's snapshots into the history table
    Run {
        /// Geocode rows that are still missing coordinates
        #[arg(long)]
        geo: bool,
        /// Override the reconciliation date (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        date: Option<NaiveDate>,
    },
    /// Summarize the history table
    Report,
    /// Drop every entry from the geocode cache
    ClearCache,
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let config = AppConfig::from_env();
    if let Err(err) = dispatch(cli.cmd, &config).await {
        error!(%err, "command failed");
        std::process::exit(1);
    }
}

async fn dispatch(cmd: Cmd, config: &AppConfig) -> AppResult<()> {
    match cmd {
        Cmd::Run { geo, date } => {
            let report = pipeline::run(
                config,
                RunOptions {
                    geocode: geo,
                    today: date,
                },
            )
            .await?;
            println!(
                "run {}: {} listings ({} new, {} updated, {} gone, {} back)",
                report.today,
                report.reconcile.total,
                report.reconcile.new,
                report.reconcile.updated,
                report.reconcile.disappeared,
                report.reconcile.reappeared
            );
            if let Some(enrichment) = report.enrichment {
                println!(
                    "geocoding: {} resolved, {} from cache, {} failed, {} blank",
                    enrichment.geocoded,
                    enrichment.cache_hits,
                    enrichment.failed,
                    enrichment.skipped_blank_address
                );
            }
            Ok(())
        }
        Cmd::Report => {
            let history = store::load_history(&config.history_path());
            print!("{}", report::summarize(&history));
            Ok(())
        }
        Cmd::ClearCache => {
            let cache = GeocodeCache::open(config.cache_path())?;
            let removed = cache.clear()?;
            println!("removed {removed} cached addresses");
            Ok(())
        }
    }
}
