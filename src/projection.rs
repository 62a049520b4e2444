//! Serving path: latest feature row per athlete through opaque stat models.
//!
//! Reads only a committed snapshot; the batch pipeline never blocks it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::features::{FeatureSchema, ScoredRow, Stat};

/// An opaque per-category model: one fully-defined feature row in, one
/// scalar projection out. `features` is aligned with the schema column
/// order the model was declared against.
pub trait StatModel: Send + Sync {
    fn predict(&self, features: &[f64]) -> f64;
}

pub struct ProjectionModels {
    pub points: Box<dyn StatModel>,
    pub rebounds: Box<dyn StatModel>,
    pub assists: Box<dyn StatModel>,
}

/// The most recent fully-defined feature row for one athlete.
#[derive(Debug, Clone, PartialEq)]
pub struct AthleteFeatureRow {
    pub athlete_id: i64,
    pub game_id: String,
    pub game_date: DateTime<Utc>,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatProjection {
    pub points: f64,
    pub rebounds: f64,
    pub assists: f64,
}

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("schema has no column named {0}")]
    MissingColumn(String),
}

/// Collapses scored rows to the latest fully-defined row per athlete
/// (max `game_date`; on a tie the later row in store order wins, matching
/// the committed store's sort).
pub fn latest_feature_rows(rows: &[ScoredRow]) -> HashMap<i64, AthleteFeatureRow> {
    let mut latest: HashMap<i64, AthleteFeatureRow> = HashMap::new();

    for row in rows {
        let values: Option<Vec<f64>> = row.features.iter().copied().collect();
        let Some(values) = values else {
            continue;
        };

        let candidate = AthleteFeatureRow {
            athlete_id: row.log.athlete_id,
            game_id: row.log.game_id.clone(),
            game_date: row.log.game_date,
            values,
        };
        match latest.get(&row.log.athlete_id) {
            Some(current) if candidate.game_date < current.game_date => {}
            _ => {
                latest.insert(row.log.athlete_id, candidate);
            }
        }
    }

    latest
}

pub fn project_athlete(row: &AthleteFeatureRow, models: &ProjectionModels) -> StatProjection {
    StatProjection {
        points: models.points.predict(&row.values),
        rebounds: models.rebounds.predict(&row.values),
        assists: models.assists.predict(&row.values),
    }
}

/// Baseline model: projects a statistic as its own rolling average over the
/// given window, read straight from the feature row. Stands in for trained
/// model artifacts so the serving path works end to end out of the box.
#[derive(Debug, Clone, Copy)]
pub struct RollingAverageModel {
    column_index: usize,
}

impl RollingAverageModel {
    pub fn for_stat(
        schema: &FeatureSchema,
        stat: Stat,
        window: u32,
    ) -> Result<Self, ProjectionError> {
        let name = format!("avg_{}_last_{}", stat.as_str(), window);
        let column_index = schema
            .columns
            .iter()
            .position(|column| column.name == name)
            .ok_or(ProjectionError::MissingColumn(name))?;
        Ok(Self { column_index })
    }
}

impl StatModel for RollingAverageModel {
    fn predict(&self, features: &[f64]) -> f64 {
        features.get(self.column_index).copied().unwrap_or(f64::NAN)
    }
}

/// Bundles one baseline model per category, all reading the same window.
pub fn baseline_models(
    schema: &FeatureSchema,
    window: u32,
) -> Result<ProjectionModels, ProjectionError> {
    Ok(ProjectionModels {
        points: Box::new(RollingAverageModel::for_stat(schema, Stat::Points, window)?),
        rebounds: Box::new(RollingAverageModel::for_stat(
            schema,
            Stat::Rebounds,
            window,
        )?),
        assists: Box::new(RollingAverageModel::for_stat(
            schema,
            Stat::Assists,
            window,
        )?),
    })
}
