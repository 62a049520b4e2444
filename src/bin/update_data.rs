use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{NaiveDate, Utc};
use chrono_tz::America::New_York;
use propcast::{
    init_logging, logging_config_from_env, run_update, ReqwestBlockingFetcher, UpdateConfig,
    UpdateError,
};

fn main() -> ExitCode {
    let logging_cfg = logging_config_from_env();
    if let Err(err) = init_logging(&logging_cfg) {
        eprintln!("failed to initialize logging: {err}");
        return ExitCode::FAILURE;
    }

    let date = match resolve_fetch_date() {
        Ok(date) => date,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::FAILURE;
        }
    };

    let mut cfg = UpdateConfig::default();
    if let Ok(path) = std::env::var("PROPCAST_STORE_PATH") {
        if !path.trim().is_empty() {
            cfg.store_path = PathBuf::from(path);
        }
    }

    let fetcher = match ReqwestBlockingFetcher::new(cfg.fetch.timeout_ms) {
        Ok(fetcher) => fetcher,
        Err(err) => {
            eprintln!("failed to build HTTP client: {err}");
            return ExitCode::FAILURE;
        }
    };

    println!("Updating {} for {date}...", cfg.store_path.display());
    match run_update(date, &cfg, &fetcher) {
        Ok(summary) if summary.store_mutated => {
            println!(
                "Fetched {} player lines ({} skipped) | added {} replaced {} | wrote {} rows, dropped {}",
                summary.rows_fetched,
                summary.records_skipped,
                summary.rows_added,
                summary.rows_replaced,
                summary.rows_written,
                summary.rows_dropped
            );
            ExitCode::SUCCESS
        }
        Ok(_) => {
            println!("No new data for {date}. Store unchanged.");
            ExitCode::SUCCESS
        }
        Err(err @ UpdateError::Setup(_)) => {
            eprintln!("{err}");
            eprintln!("Seed the store file before the first run.");
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("update aborted, store left untouched: {err}");
            ExitCode::FAILURE
        }
    }
}

fn resolve_fetch_date() -> Result<NaiveDate, String> {
    if let Some(raw) = std::env::args().nth(1) {
        return parse_date_arg(&raw);
    }
    if let Ok(raw) = std::env::var("PROPCAST_FETCH_DATE") {
        return parse_date_arg(&raw);
    }

    // Scoreboard days are US-Eastern calendar days; default to yesterday's.
    let today_eastern = Utc::now().with_timezone(&New_York).date_naive();
    today_eastern
        .pred_opt()
        .ok_or_else(|| "no valid yesterday for current date".to_string())
}

fn parse_date_arg(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| format!("invalid date '{raw}', expected YYYY-MM-DD"))
}
