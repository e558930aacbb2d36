use chrono::{Local, NaiveDate};
use tracing::info;

use crate::cache::GeocodeCache;
use crate::config::AppConfig;
use crate::enrich::{self, EnrichmentStats};
use crate::errors::AppResult;
use crate::geocoder::Geocoder;
use crate::reconcile::{reconcile, ReconcileStats};
use crate::store;

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Resolve coordinates for new rows. Off by default so a merge-only run
    /// needs no network access.
    pub geocode: bool,
    /// Reconciliation date; defaults to the local calendar date.
    pub today: Option<NaiveDate>,
}

#[derive(Debug)]
pub struct RunReport {
    pub today: NaiveDate,
    pub reconcile: ReconcileStats,
    pub enrichment: Option<EnrichmentStats>,
}

/// One pipeline run: merge the day's snapshots into the history, optionally
/// geocode rows still missing coordinates, and write the table back
/// atomically.
pub async fn run(config: &AppConfig, options: RunOptions) -> AppResult<RunReport> {
    let today = options.today.unwrap_or_else(|| Local::now().date_naive());
    let history_path = config.history_path();

    let history = store::load_history(&history_path);
    let snapshot = store::load_snapshots(&config.data_dir, &config.history_file_name)?;
    info!(
        history_rows = history.len(),
        snapshot_rows = snapshot.len(),
        %today,
        "reconciling"
    );

    let mut outcome = reconcile(history, snapshot, today);
    info!(
        new = outcome.stats.new,
        updated = outcome.stats.updated,
        disappeared = outcome.stats.disappeared,
        reappeared = outcome.stats.reappeared,
        skipped_malformed = outcome.stats.skipped_malformed,
        total = outcome.stats.total,
        "reconcile finished"
    );

    let enrichment = if options.geocode {
        let cache = GeocodeCache::open(config.cache_path())?;
        let geocoder = Geocoder::new(config);
        Some(enrich::enrich(&mut outcome.records, &geocoder, &cache).await)
    } else {
        None
    };

    store::save_history(&history_path, &outcome.records)?;

    Ok(RunReport {
        today,
        reconcile: outcome.stats,
        enrichment,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn config_for(dir: &std::path::Path) -> AppConfig {
        AppConfig {
            data_dir: dir.to_path_buf(),
            history_file_name: "imoveis_BR.csv".into(),
            cache_file_name: "cache.sqlite".into(),
            geocoder_endpoint: "http://127.0.0.1:9".into(),
            geocoder_user_agent: "caixa-aberta/test".into(),
            geocoder_min_delay_ms: 1_000,
            geocoder_timeout_secs: 1,
        }
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    const HEADER: &str =
        "link,endereco,bairro,descricao,preco,avaliacao,desconto,modalidade,foto,cidade,estado";

    #[tokio::test]
    async fn merge_only_run_tracks_lifecycle_across_dates() {
        let dir = tempdir().unwrap();
        let config = config_for(dir.path());
        let snapshot_path = dir.path().join("imoveis_SP.csv");

        fs::write(
            &snapshot_path,
            format!("{HEADER}\nlink1,Rua A,Centro,,100000.0,,,Venda Online,,Campinas,SP\n"),
        )
        .unwrap();
        let first = run(
            &config,
            RunOptions {
                geocode: false,
                today: Some(date("2024-01-01")),
            },
        )
        .await
        .unwrap();
        assert_eq!(first.reconcile.new, 1);

        // next run the listing is gone from the snapshot
        fs::write(&snapshot_path, format!("{HEADER}\n")).unwrap();
        let second = run(
            &config,
            RunOptions {
                geocode: false,
                today: Some(date("2024-02-01")),
            },
        )
        .await
        .unwrap();
        assert_eq!(second.reconcile.disappeared, 1);

        let history = store::load_history(&config.history_path());
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].first_time_seen, Some(date("2024-01-01")));
        assert_eq!(history[0].not_seen_since, Some(date("2024-02-01")));
        assert!(second.enrichment.is_none());
    }

    #[tokio::test]
    async fn corrupt_history_bootstraps_as_empty() {
        let dir = tempdir().unwrap();
        let config = config_for(dir.path());
        fs::write(config.history_path(), "garbage,columns\n1,2\n").unwrap();
        fs::write(
            dir.path().join("imoveis_SP.csv"),
            format!("{HEADER}\nlink1,Rua A,Centro,,100000.0,,,Venda Online,,Campinas,SP\n"),
        )
        .unwrap();

        let report = run(
            &config,
            RunOptions {
                geocode: false,
                today: Some(date("2024-01-01")),
            },
        )
        .await
        .unwrap();
        assert_eq!(report.reconcile.new, 1);

        // the rewritten history is readable again
        let history = store::load_history(&config.history_path());
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].first_time_seen, Some(date("2024-01-01")));
    }

    #[tokio::test]
    async fn empty_data_dir_produces_empty_history() {
        let dir = tempdir().unwrap();
        let config = config_for(dir.path());
        let report = run(&config, RunOptions::default()).await.unwrap();
        assert_eq!(report.reconcile.total, 0);
        assert!(store::load_history(&config.history_path()).is_empty());
    }
}
