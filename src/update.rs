//! One batch update run: load, fetch, parse, merge, recompute, commit.

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{info, warn};

use crate::features::{compute_features, FeatureConfig, FeatureError};
use crate::observability::{log_run_start, log_run_summary};
use crate::scoreboard::{
    fetch_scoreboard, parse_scoreboard, FetchConfig, FetchOutcome, HttpFetcher,
};
use crate::store::{commit_store, load_store, merge_logs, StoreError};

pub const DEFAULT_STORE_PATH: &str = "data/wnba_game_logs.csv";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateConfig {
    pub store_path: PathBuf,
    pub fetch: FetchConfig,
    pub features: FeatureConfig,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            fetch: FetchConfig::default(),
            features: FeatureConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateSummary {
    pub date: NaiveDate,
    pub rows_fetched: usize,
    pub records_skipped: usize,
    pub rows_added: usize,
    pub rows_replaced: usize,
    pub rows_written: usize,
    pub rows_dropped: usize,
    pub store_mutated: bool,
}

impl UpdateSummary {
    fn no_new_data(date: NaiveDate) -> Self {
        Self {
            date,
            rows_fetched: 0,
            records_skipped: 0,
            rows_added: 0,
            rows_replaced: 0,
            rows_written: 0,
            rows_dropped: 0,
            store_mutated: false,
        }
    }
}

/// Fetch and parse problems never surface here; they degrade to a
/// `no new data` summary. Everything below is fatal to the run.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("setup failure: {0}")]
    Setup(StoreError),
    #[error("feature computation failed: {0}")]
    Feature(#[from] FeatureError),
    #[error("commit failed: {0}")]
    Commit(StoreError),
}

/// Runs one pipeline pass for `date`. The commit write is the only durable
/// mutation and the last step, so any earlier failure leaves the previously
/// committed store untouched.
pub fn run_update(
    date: NaiveDate,
    cfg: &UpdateConfig,
    fetcher: &dyn HttpFetcher,
) -> Result<UpdateSummary, UpdateError> {
    // Setup failures abort before any fetch.
    let existing = load_store(&cfg.store_path).map_err(UpdateError::Setup)?;
    log_run_start(date, &cfg.store_path);

    let payload = match fetch_scoreboard(fetcher, date, &cfg.fetch) {
        FetchOutcome::Games(payload) => payload,
        FetchOutcome::Empty => {
            info!(
                component = "update_job",
                event = "update.no_games",
                date = %date
            );
            return Ok(UpdateSummary::no_new_data(date));
        }
        FetchOutcome::Failed(cause) => {
            warn!(
                component = "update_job",
                event = "update.fetch.degraded",
                date = %date,
                cause = %cause
            );
            return Ok(UpdateSummary::no_new_data(date));
        }
    };

    let parsed = parse_scoreboard(&payload);
    if parsed.logs.is_empty() {
        info!(
            component = "update_job",
            event = "update.no_parsed_rows",
            date = %date,
            records_skipped = parsed.skipped_records
        );
        let mut summary = UpdateSummary::no_new_data(date);
        summary.records_skipped = parsed.skipped_records;
        return Ok(summary);
    }

    let rows_fetched = parsed.logs.len();
    let merged = merge_logs(existing, parsed.logs);
    let (schema, scored) = compute_features(&merged.logs, &cfg.features)?;
    let report = commit_store(&cfg.store_path, &schema, &scored).map_err(UpdateError::Commit)?;

    let summary = UpdateSummary {
        date,
        rows_fetched,
        records_skipped: parsed.skipped_records,
        rows_added: merged.rows_added,
        rows_replaced: merged.rows_replaced,
        rows_written: report.rows_written,
        rows_dropped: report.rows_dropped,
        store_mutated: true,
    };
    log_run_summary(
        summary.date,
        summary.rows_fetched,
        summary.rows_added,
        summary.rows_replaced,
        summary.rows_written,
        summary.rows_dropped,
        summary.store_mutated,
    );

    Ok(summary)
}
