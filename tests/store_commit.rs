use std::fs;
use std::path::Path;

use chrono::{TimeZone, Utc};
use propcast::{
    commit_store, compute_features, load_store, FeatureConfig, GameLog, StoreError,
    FEATURE_SCHEMA_VERSION,
};
use tempfile::tempdir;

fn log(game_id: &str, athlete_id: i64, day: u32, points: f64) -> GameLog {
    GameLog {
        game_id: game_id.to_string(),
        athlete_id,
        season: Some(2024),
        game_date: Utc.with_ymd_and_hms(2024, 7, day, 23, 0, 0).unwrap(),
        points,
        rebounds: 5.0,
        assists: 2.0,
    }
}

fn window_cfg(windows: Vec<u32>) -> FeatureConfig {
    FeatureConfig {
        windows,
        schema_version: FEATURE_SCHEMA_VERSION,
    }
}

#[test]
fn commit_drops_history_starved_rows_and_load_round_trips_the_rest() {
    // Entity 618: day-1 points=10, day-2 points=20, window [1]. The day-2
    // row's average must be day 1's value; the day-1 row has no history and
    // is dropped at the gate.
    let logs = vec![log("g1", 618, 1, 10.0), log("g2", 618, 2, 20.0)];
    let (schema, scored) = compute_features(&logs, &window_cfg(vec![1])).unwrap();

    let temp = tempdir().expect("temp dir should be created");
    let path = temp.path().join("store.csv");
    let report = commit_store(&path, &schema, &scored).expect("commit should succeed");

    assert_eq!(report.rows_written, 1);
    assert_eq!(report.rows_dropped, 1);

    let text = fs::read_to_string(&path).expect("store file should exist");
    let mut lines = text.lines();
    assert_eq!(
        lines.next().unwrap(),
        "game_id,athlete_id_1,season,game_date,points,rebounds,assists,\
         avg_points_last_1,avg_rebounds_last_1,avg_assists_last_1"
    );
    let row = lines.next().expect("one data row expected");
    assert!(row.starts_with("g2,618,2024,"));
    assert!(row.ends_with(",10,5,2"));

    let reloaded = load_store(&path).expect("reload should succeed");
    assert_eq!(reloaded.len(), 1);
    assert_eq!(reloaded[0].game_id, "g2");
    assert_eq!(reloaded[0].points, 20.0);
    assert_eq!(reloaded[0].game_date, logs[1].game_date);
}

#[test]
fn committed_store_has_no_empty_cells() {
    let logs = vec![
        log("g1", 618, 1, 10.0),
        log("g2", 618, 2, 20.0),
        log("g3", 618, 3, 30.0),
        log("g1", 651, 1, 8.0),
    ];
    let (schema, scored) = compute_features(&logs, &window_cfg(vec![1, 2])).unwrap();

    let temp = tempdir().expect("temp dir should be created");
    let path = temp.path().join("store.csv");
    commit_store(&path, &schema, &scored).expect("commit should succeed");

    let mut reader = csv::Reader::from_path(&path).expect("store should open");
    for record in reader.records() {
        let record = record.expect("record should parse");
        for cell in record.iter() {
            assert!(!cell.is_empty(), "committed store contains an empty cell");
        }
    }
}

#[test]
fn commit_replaces_prior_store_in_place_and_leaves_no_tmp_file() {
    let temp = tempdir().expect("temp dir should be created");
    let path = temp.path().join("store.csv");
    fs::write(&path, "stale contents").expect("seed write should succeed");

    let logs = vec![log("g1", 618, 1, 10.0), log("g2", 618, 2, 20.0)];
    let (schema, scored) = compute_features(&logs, &window_cfg(vec![1])).unwrap();
    commit_store(&path, &schema, &scored).expect("commit should succeed");

    let text = fs::read_to_string(&path).expect("store file should exist");
    assert!(text.starts_with("game_id,"));
    assert!(!Path::new(&path.with_file_name("store.csv.tmp")).exists());
}

#[test]
fn commit_into_missing_directory_fails_without_creating_the_store() {
    let temp = tempdir().expect("temp dir should be created");
    let path = temp.path().join("missing").join("store.csv");

    let logs = vec![log("g1", 618, 1, 10.0), log("g2", 618, 2, 20.0)];
    let (schema, scored) = compute_features(&logs, &window_cfg(vec![1])).unwrap();

    let err = commit_store(&path, &schema, &scored).unwrap_err();
    assert!(matches!(err, StoreError::Io(_)));
    assert!(!path.exists());
}

#[test]
fn load_accepts_stores_without_derived_columns() {
    let temp = tempdir().expect("temp dir should be created");
    let path = temp.path().join("store.csv");
    fs::write(
        &path,
        "game_id,athlete_id_1,season,game_date,points,rebounds,assists\n\
         g1,618,2024,2024-07-01T23:00Z,10,5,2\n\
         g2,618,,2024-07-02T23:00Z,20,6,3\n",
    )
    .expect("seed write should succeed");

    let logs = load_store(&path).expect("load should succeed");
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].season, Some(2024));
    assert_eq!(logs[1].season, None);
    assert_eq!(logs[1].points, 20.0);
}

#[test]
fn load_rejects_a_corrupted_row() {
    let temp = tempdir().expect("temp dir should be created");
    let path = temp.path().join("store.csv");
    fs::write(
        &path,
        "game_id,athlete_id_1,season,game_date,points,rebounds,assists\n\
         g1,not-a-number,2024,2024-07-01T23:00Z,10,5,2\n",
    )
    .expect("seed write should succeed");

    let err = load_store(&path).unwrap_err();
    assert!(matches!(
        err,
        StoreError::ParseColumn {
            column: "athlete_id_1",
            ..
        }
    ));
}
