//! Propcast core crate.
//!
//! Implemented scope:
//! - scoreboard fetch and box-score extraction for one calendar date
//! - historical game-log store with keep-last merge and atomic commit
//! - causal rolling-average feature recomputation over the full history
//! - projection serving from the latest feature row per athlete

mod features;
mod observability;
mod projection;
mod scoreboard;
mod store;
mod update;

pub use features::{
    assert_schema_compatible, build_feature_schema, compute_features, FeatureColumn, FeatureConfig,
    FeatureDType, FeatureError, FeatureSchema, ScoredRow, Stat, ALL_STATS, FEATURE_SCHEMA_VERSION,
};
pub use observability::{
    init_logging, log_run_start, log_run_summary, logging_config_from_env, LogFormat,
    LoggingConfig, LoggingInitError,
};
pub use projection::{
    baseline_models, latest_feature_rows, project_athlete, AthleteFeatureRow, ProjectionError,
    ProjectionModels, RollingAverageModel, StatModel, StatProjection,
};
pub use scoreboard::{
    fetch_scoreboard, parse_scoreboard, FetchConfig, FetchError, FetchOutcome, HttpFetcher,
    ParsedGameLogs, ReqwestBlockingFetcher, ScoreboardPayload,
};
pub use store::{
    commit_store, load_store, merge_logs, CommitReport, GameLog, MergeOutcome, StoreError,
    BASE_COLUMNS,
};
pub use update::{run_update, UpdateConfig, UpdateError, UpdateSummary, DEFAULT_STORE_PATH};
