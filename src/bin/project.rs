use std::path::PathBuf;
use std::process::ExitCode;

use propcast::{
    baseline_models, compute_features, init_logging, latest_feature_rows, load_store,
    logging_config_from_env, project_athlete, FeatureConfig, DEFAULT_STORE_PATH,
};

const BASELINE_WINDOW: u32 = 5;

fn main() -> ExitCode {
    let logging_cfg = logging_config_from_env();
    if let Err(err) = init_logging(&logging_cfg) {
        eprintln!("failed to initialize logging: {err}");
        return ExitCode::FAILURE;
    }

    let store_path = std::env::var("PROPCAST_STORE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_STORE_PATH));

    let athlete_filter = match parse_athlete_args() {
        Ok(filter) => filter,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::FAILURE;
        }
    };

    let logs = match load_store(&store_path) {
        Ok(logs) => logs,
        Err(err) => {
            eprintln!("failed to load store: {err}");
            return ExitCode::FAILURE;
        }
    };

    let feature_cfg = FeatureConfig::default();
    let (schema, scored) = match compute_features(&logs, &feature_cfg) {
        Ok(out) => out,
        Err(err) => {
            eprintln!("feature computation failed: {err}");
            return ExitCode::FAILURE;
        }
    };

    let models = match baseline_models(&schema, BASELINE_WINDOW) {
        Ok(models) => models,
        Err(err) => {
            eprintln!("failed to build baseline models: {err}");
            return ExitCode::FAILURE;
        }
    };

    let latest = latest_feature_rows(&scored);
    let mut athlete_ids: Vec<i64> = latest.keys().copied().collect();
    athlete_ids.sort_unstable();

    let mut printed = 0usize;
    for athlete_id in athlete_ids {
        if let Some(filter) = &athlete_filter {
            if !filter.contains(&athlete_id) {
                continue;
            }
        }

        let row = &latest[&athlete_id];
        let projection = project_athlete(row, &models);
        println!(
            "athlete {athlete_id:>8} | last game {} | points {:>5.1} | rebounds {:>5.1} | assists {:>5.1}",
            row.game_date.format("%Y-%m-%d"),
            projection.points,
            projection.rebounds,
            projection.assists
        );
        printed += 1;
    }

    if printed == 0 {
        println!("No athletes with enough history for a projection.");
    }

    ExitCode::SUCCESS
}

fn parse_athlete_args() -> Result<Option<Vec<i64>>, String> {
    let raw: Vec<String> = std::env::args().skip(1).collect();
    if raw.is_empty() {
        return Ok(None);
    }

    let mut ids = Vec::with_capacity(raw.len());
    for arg in raw {
        let id = arg
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("invalid athlete id '{arg}', expected an integer"))?;
        ids.push(id);
    }
    Ok(Some(ids))
}
