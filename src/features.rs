//! Causal rolling-average features over the merged game-log history.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

use crate::store::GameLog;

pub const FEATURE_SCHEMA_VERSION: u32 = 1;

const STAT_COUNT: usize = 3;

/// The three tracked statistic categories, in store column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stat {
    Points,
    Rebounds,
    Assists,
}

pub const ALL_STATS: [Stat; STAT_COUNT] = [Stat::Points, Stat::Rebounds, Stat::Assists];

impl Stat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Points => "points",
            Self::Rebounds => "rebounds",
            Self::Assists => "assists",
        }
    }

    pub fn value(self, log: &GameLog) -> f64 {
        match self {
            Self::Points => log.points,
            Self::Rebounds => log.rebounds,
            Self::Assists => log.assists,
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Points => 0,
            Self::Rebounds => 1,
            Self::Assists => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureDType {
    F64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureColumn {
    pub name: String,
    pub dtype: FeatureDType,
}

/// Derived-column list plus a fingerprint over everything that shapes it.
/// The serving path refuses a store whose fingerprint it does not expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub fingerprint: String,
    pub columns: Vec<FeatureColumn>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub windows: Vec<u32>,
    pub schema_version: u32,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            windows: vec![3, 5, 10],
            schema_version: FEATURE_SCHEMA_VERSION,
        }
    }
}

/// One store row after feature recomputation. `features` is aligned with the
/// schema's column order; `None` marks a value with no prior history, which
/// the persistence gate drops at commit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRow {
    pub log: GameLog,
    pub features: Vec<Option<f64>>,
}

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("invalid feature config: {0}")]
    InvalidConfig(String),
    #[error("schema version mismatch: expected {expected}, got {actual}")]
    SchemaVersionMismatch { expected: u32, actual: u32 },
    #[error("schema fingerprint mismatch: expected {expected}, got {actual}")]
    SchemaFingerprintMismatch { expected: String, actual: String },
}

pub fn build_feature_schema(cfg: &FeatureConfig) -> FeatureSchema {
    let mut columns = Vec::with_capacity(cfg.windows.len() * STAT_COUNT);
    for window in &cfg.windows {
        for stat in ALL_STATS {
            columns.push(FeatureColumn {
                name: format!("avg_{}_last_{}", stat.as_str(), window),
                dtype: FeatureDType::F64,
            });
        }
    }

    let fingerprint = schema_fingerprint(cfg, &columns);

    FeatureSchema {
        version: cfg.schema_version,
        fingerprint,
        columns,
    }
}

/// Recomputes every feature value over the full history. Partition by
/// athlete, sort by game date ascending (ties keep their pre-sort order),
/// then for each row take the mean of each statistic over up to `window`
/// strictly preceding rows of the same athlete. The current row never
/// contributes to its own features, and one prior row is enough for a
/// defined (partial) mean.
///
/// Always a full pass, never an incremental patch: a merge may have inserted
/// a backfilled game anywhere in an athlete's timeline, which would leave
/// every later incremental value stale.
pub fn compute_features(
    logs: &[GameLog],
    cfg: &FeatureConfig,
) -> Result<(FeatureSchema, Vec<ScoredRow>), FeatureError> {
    validate_config(cfg)?;
    let schema = build_feature_schema(cfg);

    let mut order: Vec<usize> = (0..logs.len()).collect();
    order.sort_by(|&a, &b| {
        (logs[a].athlete_id, logs[a].game_date).cmp(&(logs[b].athlete_id, logs[b].game_date))
    });

    let max_window = cfg.windows.iter().copied().max().unwrap_or(1) as usize;
    let mut rolling = AthleteRolling::new(max_window);
    let mut current_athlete: Option<i64> = None;
    let mut athletes = 0usize;

    let mut rows = Vec::with_capacity(logs.len());
    for idx in order {
        let log = &logs[idx];
        if current_athlete != Some(log.athlete_id) {
            current_athlete = Some(log.athlete_id);
            athletes += 1;
            rolling.reset();
        }

        let mut features = Vec::with_capacity(schema.columns.len());
        for window in &cfg.windows {
            for stat in ALL_STATS {
                features.push(rolling.mean_last(stat, *window as usize));
            }
        }

        rolling.push(log);
        rows.push(ScoredRow {
            log: log.clone(),
            features,
        });
    }

    info!(
        component = "features",
        event = "features.compute.finish",
        rows = rows.len(),
        athletes,
        windows = ?cfg.windows
    );

    Ok((schema, rows))
}

pub fn assert_schema_compatible(
    expected_version: u32,
    expected_fingerprint: &str,
    actual: &FeatureSchema,
) -> Result<(), FeatureError> {
    if expected_version != actual.version {
        return Err(FeatureError::SchemaVersionMismatch {
            expected: expected_version,
            actual: actual.version,
        });
    }

    if expected_fingerprint != actual.fingerprint {
        return Err(FeatureError::SchemaFingerprintMismatch {
            expected: expected_fingerprint.to_string(),
            actual: actual.fingerprint.clone(),
        });
    }

    Ok(())
}

fn validate_config(cfg: &FeatureConfig) -> Result<(), FeatureError> {
    if cfg.windows.is_empty() {
        return Err(FeatureError::InvalidConfig(
            "windows must not be empty".to_string(),
        ));
    }

    if cfg.schema_version != FEATURE_SCHEMA_VERSION {
        return Err(FeatureError::InvalidConfig(format!(
            "schema_version must equal FEATURE_SCHEMA_VERSION ({FEATURE_SCHEMA_VERSION})"
        )));
    }

    let mut seen = HashSet::new();
    for window in &cfg.windows {
        if *window == 0 {
            return Err(FeatureError::InvalidConfig(
                "windows entries must be > 0".to_string(),
            ));
        }
        if !seen.insert(*window) {
            return Err(FeatureError::InvalidConfig(
                "windows entries must be unique".to_string(),
            ));
        }
    }

    Ok(())
}

#[derive(Debug, Clone)]
struct AthleteRolling {
    values: [VecDeque<f64>; STAT_COUNT],
    max_window: usize,
}

impl AthleteRolling {
    fn new(max_window: usize) -> Self {
        Self {
            values: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
            max_window,
        }
    }

    fn reset(&mut self) {
        for deque in &mut self.values {
            deque.clear();
        }
    }

    fn push(&mut self, log: &GameLog) {
        for stat in ALL_STATS {
            let deque = &mut self.values[stat.index()];
            deque.push_back(stat.value(log));
            while deque.len() > self.max_window {
                deque.pop_front();
            }
        }
    }

    fn mean_last(&self, stat: Stat, window: usize) -> Option<f64> {
        let deque = &self.values[stat.index()];
        if deque.is_empty() {
            return None;
        }
        let take = window.min(deque.len());
        let sum: f64 = deque.range(deque.len() - take..).sum();
        Some(sum / take as f64)
    }
}

fn schema_fingerprint(cfg: &FeatureConfig, columns: &[FeatureColumn]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("version:{};", cfg.schema_version));
    hasher.update("windows:");
    for window in &cfg.windows {
        hasher.update(format!("{window},"));
    }
    hasher.update(";columns:");
    for column in columns {
        hasher.update(column.name.as_bytes());
        hasher.update(":f64;");
    }
    hex::encode(hasher.finalize())
}
