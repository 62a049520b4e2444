//! Scoreboard fetch and box-score extraction for one calendar date.
//!
//! Everything under this module sits at the trust boundary with the remote
//! source: payloads are traversed fail-soft and malformed per-athlete records
//! are skipped, never propagated.

use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::store::{parse_game_date, GameLog};

const SCOREBOARD_BASE_URL: &str =
    "https://site.api.espn.com/apis/site/v2/sports/basketball/wnba/scoreboard";

/// The stats array is positional by source convention: `[0]` points,
/// `[1]` rebounds, `[2]` assists. Arity is validated before indexing.
const MIN_STAT_FIELDS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: SCOREBOARD_BASE_URL.to_string(),
            timeout_ms: 15_000,
            max_retries: 2,
            retry_backoff_ms: 200,
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP client build error: {0}")]
    HttpClientBuild(String),
    #[error("HTTP request failed for {url}: {message}")]
    HttpRequest { url: String, message: String },
}

/// Result of one scoreboard fetch. `Empty` is a normal terminal state
/// ("no games that day"), distinct from `Failed`; neither is an `Err`,
/// since transport problems degrade rather than abort the run.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Games(ScoreboardPayload),
    Empty,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreboardPayload {
    pub season: Option<i32>,
    pub events: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedGameLogs {
    pub logs: Vec<GameLog>,
    pub skipped_records: usize,
}

pub trait HttpFetcher {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

pub struct ReqwestBlockingFetcher {
    client: reqwest::blocking::Client,
}

impl ReqwestBlockingFetcher {
    pub fn new(timeout_ms: u64) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|err| FetchError::HttpClientBuild(err.to_string()))?;
        Ok(Self { client })
    }
}

impl HttpFetcher for ReqwestBlockingFetcher {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| FetchError::HttpRequest {
                url: url.to_string(),
                message: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpRequest {
                url: url.to_string(),
                message: format!("unexpected HTTP status {status}"),
            });
        }

        response
            .bytes()
            .map(|bytes| bytes.to_vec())
            .map_err(|err| FetchError::HttpRequest {
                url: url.to_string(),
                message: err.to_string(),
            })
    }
}

/// Fetches the scoreboard for one date. Forward-looking dates are refused up
/// front; transport errors, timeouts, and bad statuses come back as
/// `FetchOutcome::Failed` with a human-readable cause after bounded retries.
pub fn fetch_scoreboard(
    fetcher: &dyn HttpFetcher,
    date: NaiveDate,
    cfg: &FetchConfig,
) -> FetchOutcome {
    if date > Utc::now().date_naive() {
        return FetchOutcome::Failed(format!("refusing forward-looking fetch for {date}"));
    }

    let url = format!("{}?dates={}", cfg.base_url, date.format("%Y%m%d"));
    let bytes = match fetch_bytes_with_retry(fetcher, &url, cfg) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(
                component = "scoreboard",
                event = "scoreboard.fetch.failed",
                date = %date,
                cause = %err
            );
            return FetchOutcome::Failed(err.to_string());
        }
    };

    let payload: Value = match serde_json::from_slice(&bytes) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(
                component = "scoreboard",
                event = "scoreboard.fetch.failed",
                date = %date,
                cause = %err
            );
            return FetchOutcome::Failed(format!("invalid scoreboard json: {err}"));
        }
    };

    let events: Vec<Value> = payload
        .get("events")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    if events.is_empty() {
        info!(
            component = "scoreboard",
            event = "scoreboard.fetch.empty",
            date = %date
        );
        return FetchOutcome::Empty;
    }

    let season = payload
        .get("season")
        .and_then(|season| season.get("year"))
        .and_then(value_as_i64)
        .and_then(|year| i32::try_from(year).ok());

    info!(
        component = "scoreboard",
        event = "scoreboard.fetch.ok",
        date = %date,
        events = events.len()
    );

    FetchOutcome::Games(ScoreboardPayload { season, events })
}

/// Flattens events → competitions → competitors → roster into one `GameLog`
/// per athlete-event pair. An athlete record missing its id, its stats array,
/// or any of the first three stat values is skipped locally; a malformed
/// record never aborts the parse. An empty payload parses to zero logs.
pub fn parse_scoreboard(payload: &ScoreboardPayload) -> ParsedGameLogs {
    let mut logs = Vec::new();
    let mut skipped_records = 0usize;

    for event in &payload.events {
        let Some(game_id) = event.get("id").and_then(value_as_string) else {
            skipped_records += 1;
            continue;
        };
        let Some(competition) = event
            .get("competitions")
            .and_then(Value::as_array)
            .and_then(|competitions| competitions.first())
        else {
            skipped_records += 1;
            continue;
        };
        let Some(game_date) = competition
            .get("date")
            .and_then(Value::as_str)
            .and_then(parse_game_date)
        else {
            skipped_records += 1;
            continue;
        };

        let competitors = competition
            .get("competitors")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for competitor in competitors {
            let roster = competitor
                .get("roster")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            for athlete in roster {
                match parse_athlete_line(athlete, &game_id, payload.season, game_date) {
                    Some(log) => logs.push(log),
                    None => skipped_records += 1,
                }
            }
        }
    }

    info!(
        component = "scoreboard",
        event = "scoreboard.parse.finish",
        logs = logs.len(),
        skipped_records
    );

    ParsedGameLogs {
        logs,
        skipped_records,
    }
}

fn parse_athlete_line(
    athlete: &Value,
    game_id: &str,
    season: Option<i32>,
    game_date: chrono::DateTime<Utc>,
) -> Option<GameLog> {
    let athlete_id = athlete.get("id").and_then(value_as_i64)?;
    let stats = athlete
        .get("statistics")
        .and_then(Value::as_array)
        .and_then(|statistics| statistics.first())
        .and_then(|entry| entry.get("stats"))
        .and_then(Value::as_array)?;

    if stats.len() < MIN_STAT_FIELDS {
        return None;
    }

    Some(GameLog {
        game_id: game_id.to_string(),
        athlete_id,
        season,
        game_date,
        points: value_as_f64(&stats[0])?,
        rebounds: value_as_f64(&stats[1])?,
        assists: value_as_f64(&stats[2])?,
    })
}

fn fetch_bytes_with_retry(
    fetcher: &dyn HttpFetcher,
    url: &str,
    cfg: &FetchConfig,
) -> Result<Vec<u8>, FetchError> {
    let mut attempt: u32 = 0;
    loop {
        match fetcher.get_bytes(url) {
            Ok(bytes) => return Ok(bytes),
            Err(err) if attempt >= cfg.max_retries => return Err(err),
            Err(_) => {
                attempt = attempt.saturating_add(1);
                let shift = attempt.saturating_sub(1).min(10);
                let factor = 1u64 << shift;
                let sleep_ms = cfg.retry_backoff_ms.saturating_mul(factor);
                std::thread::sleep(Duration::from_millis(sleep_ms));
            }
        }
    }
}

// The source emits numbers both as JSON numbers and as quoted strings.

fn value_as_i64(value: &Value) -> Option<i64> {
    if let Some(parsed) = value.as_i64() {
        return Some(parsed);
    }
    value.as_str()?.trim().parse::<i64>().ok()
}

fn value_as_f64(value: &Value) -> Option<f64> {
    if let Some(parsed) = value.as_f64() {
        return Some(parsed);
    }
    value.as_str()?.trim().parse::<f64>().ok()
}

fn value_as_string(value: &Value) -> Option<String> {
    if let Some(text) = value.as_str() {
        return Some(text.to_string());
    }
    value.as_i64().map(|number| number.to_string())
}
