//! Historical game-log store: CSV load, keep-last merge, atomic commit.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::features::{FeatureSchema, ScoredRow};

/// Leading columns of the store file, before the derived `avg_*` columns.
pub const BASE_COLUMNS: [&str; 7] = [
    "game_id",
    "athlete_id_1",
    "season",
    "game_date",
    "points",
    "rebounds",
    "assists",
];

/// One athlete's box-score line for one game. `(game_id, athlete_id)` is the
/// dedup key; a re-fetched copy of the same key supersedes the stored one
/// wholesale rather than being patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameLog {
    pub game_id: String,
    pub athlete_id: i64,
    pub season: Option<i32>,
    pub game_date: DateTime<Utc>,
    pub points: f64,
    pub rebounds: f64,
    pub assists: f64,
}

impl GameLog {
    pub fn key(&self) -> (String, i64) {
        (self.game_id.clone(), self.athlete_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub logs: Vec<GameLog>,
    pub rows_added: usize,
    pub rows_replaced: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReport {
    pub rows_written: usize,
    pub rows_dropped: usize,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("historical store not found at {path}")]
    MissingStore { path: PathBuf },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("store is missing required column {column}")]
    MissingColumn { column: &'static str },
    #[error("failed to parse column {column} value '{value}' in store row {row}")]
    ParseColumn {
        column: &'static str,
        value: String,
        row: usize,
    },
    #[error("invalid store path: {path}")]
    InvalidPath { path: PathBuf },
}

/// Reads the committed store. Derived `avg_*` columns in the file are ignored;
/// features are recomputed from scratch on every run. A malformed row is a
/// hard error: unlike the remote payload, the committed store is a trusted
/// artifact and damage to it must not be papered over.
pub fn load_store(path: &Path) -> Result<Vec<GameLog>, StoreError> {
    if !path.exists() {
        return Err(StoreError::MissingStore {
            path: path.to_path_buf(),
        });
    }

    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let mut column_indexes = [0usize; BASE_COLUMNS.len()];
    for (slot, &column) in BASE_COLUMNS.iter().enumerate() {
        column_indexes[slot] = headers
            .iter()
            .position(|header| header == column)
            .ok_or(StoreError::MissingColumn { column })?;
    }

    let mut logs = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        logs.push(parse_store_record(&record, &column_indexes, row)?);
    }

    info!(
        component = "store",
        event = "store.load",
        path = %path.display(),
        rows = logs.len()
    );

    Ok(logs)
}

/// Concatenates existing-then-incoming and deduplicates on
/// `(game_id, athlete_id)`, keeping the last-seen copy per key. That ordering
/// is the system's sole correction mechanism: a re-fetched record for a key
/// already in the store replaces it. Does not sort; ordering for feature
/// computation is the feature engine's job.
pub fn merge_logs(existing: Vec<GameLog>, incoming: Vec<GameLog>) -> MergeOutcome {
    let mut logs: Vec<GameLog> = Vec::with_capacity(existing.len() + incoming.len());
    let mut index: HashMap<(String, i64), usize> = HashMap::new();

    for log in existing {
        match index.get(&log.key()) {
            Some(&slot) => logs[slot] = log,
            None => {
                index.insert(log.key(), logs.len());
                logs.push(log);
            }
        }
    }

    let mut rows_added = 0usize;
    let mut rows_replaced = 0usize;
    for log in incoming {
        match index.get(&log.key()) {
            Some(&slot) => {
                logs[slot] = log;
                rows_replaced += 1;
            }
            None => {
                index.insert(log.key(), logs.len());
                logs.push(log);
                rows_added += 1;
            }
        }
    }

    MergeOutcome {
        logs,
        rows_added,
        rows_replaced,
    }
}

/// The persistence gate. Drops every row with any undefined feature value,
/// then replaces the store file atomically (tmp write, fsync, rename) so a
/// reader can never observe a partially written store.
pub fn commit_store(
    path: &Path,
    schema: &FeatureSchema,
    rows: &[ScoredRow],
) -> Result<CommitReport, StoreError> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header: Vec<&str> = BASE_COLUMNS.to_vec();
    header.extend(schema.columns.iter().map(|column| column.name.as_str()));
    writer.write_record(&header)?;

    let mut rows_written = 0usize;
    let mut rows_dropped = 0usize;
    for row in rows {
        let Some(features) = fully_defined(&row.features) else {
            rows_dropped += 1;
            continue;
        };

        let mut record: Vec<String> = Vec::with_capacity(header.len());
        record.push(row.log.game_id.clone());
        record.push(row.log.athlete_id.to_string());
        record.push(row.log.season.map(|s| s.to_string()).unwrap_or_default());
        record.push(row.log.game_date.to_rfc3339());
        record.push(row.log.points.to_string());
        record.push(row.log.rebounds.to_string());
        record.push(row.log.assists.to_string());
        record.extend(features.iter().map(|value| value.to_string()));
        writer.write_record(&record)?;
        rows_written += 1;
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| StoreError::Io(err.into_error()))?;
    write_atomic(path, &bytes)?;

    info!(
        component = "store",
        event = "store.commit",
        path = %path.display(),
        rows_written,
        rows_dropped
    );

    Ok(CommitReport {
        rows_written,
        rows_dropped,
    })
}

fn fully_defined(features: &[Option<f64>]) -> Option<Vec<f64>> {
    features.iter().copied().collect()
}

fn parse_store_record(
    record: &csv::StringRecord,
    column_indexes: &[usize; BASE_COLUMNS.len()],
    row: usize,
) -> Result<GameLog, StoreError> {
    let field = |slot: usize| record.get(column_indexes[slot]).unwrap_or_default();

    let season_raw = field(2).trim();
    let season = if season_raw.is_empty() {
        None
    } else {
        Some(parse_season(season_raw).ok_or_else(|| parse_error("season", season_raw, row))?)
    };

    let date_raw = field(3);
    let game_date = parse_game_date(date_raw).ok_or_else(|| parse_error("game_date", date_raw, row))?;

    Ok(GameLog {
        game_id: field(0).to_string(),
        athlete_id: field(1)
            .trim()
            .parse::<i64>()
            .map_err(|_| parse_error("athlete_id_1", field(1), row))?,
        season,
        game_date,
        points: parse_stat("points", field(4), row)?,
        rebounds: parse_stat("rebounds", field(5), row)?,
        assists: parse_stat("assists", field(6), row)?,
    })
}

// Legacy store files serialize season as a whole-valued float ("2024.0").
fn parse_season(raw: &str) -> Option<i32> {
    if let Ok(season) = raw.parse::<i32>() {
        return Some(season);
    }
    let season = raw.parse::<f64>().ok()?;
    if season.fract() == 0.0 {
        Some(season as i32)
    } else {
        None
    }
}

fn parse_stat(column: &'static str, raw: &str, row: usize) -> Result<f64, StoreError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| parse_error(column, raw, row))
}

fn parse_error(column: &'static str, value: &str, row: usize) -> StoreError {
    StoreError::ParseColumn {
        column,
        value: value.to_string(),
        row,
    }
}

/// Accepts RFC 3339, the scoreboard's minute-precision form
/// (`2026-08-05T23:00Z`), and a bare date for hand-seeded stores.
pub(crate) fn parse_game_date(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%MZ") {
        return Some(parsed.and_utc());
    }
    if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(parsed.and_time(chrono::NaiveTime::MIN).and_utc());
    }
    None
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| StoreError::InvalidPath {
            path: path.to_path_buf(),
        })?;
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    fs::rename(tmp_path, path)?;
    Ok(())
}
