use std::collections::HashMap;
use std::fs;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use propcast::{
    fetch_scoreboard, log_run_start, log_run_summary, run_update, FeatureConfig, FetchConfig,
    FetchError, FetchOutcome, HttpFetcher, UpdateConfig, FEATURE_SCHEMA_VERSION,
};
use serde_json::json;
use tempfile::tempdir;
use tracing::dispatcher::with_default;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriter;

#[derive(Clone, Default)]
struct SharedWriter {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedWriter {
    fn output_string(&self) -> String {
        let bytes = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        String::from_utf8_lossy(&bytes).to_string()
    }
}

struct SharedWriterGuard {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = SharedWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedWriterGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for SharedWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut out = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        out.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn capture_logs(max_level: Level, f: impl FnOnce()) -> String {
    let writer = SharedWriter::default();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_ansi(false)
        .with_max_level(max_level)
        .with_writer(writer.clone())
        .finish();
    let dispatch = tracing::Dispatch::new(subscriber);

    with_default(&dispatch, f);
    writer.output_string()
}

#[derive(Default)]
struct MockFetcher {
    responses: HashMap<String, Vec<u8>>,
}

impl MockFetcher {
    fn with(mut self, url: &str, body: &[u8]) -> Self {
        self.responses.insert(url.to_string(), body.to_vec());
        self
    }
}

impl HttpFetcher for MockFetcher {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.responses
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::HttpRequest {
                url: url.to_string(),
                message: "missing mock response".to_string(),
            })
    }
}

fn no_retry_cfg() -> FetchConfig {
    FetchConfig {
        base_url: "http://mock/scoreboard".to_string(),
        max_retries: 0,
        retry_backoff_ms: 0,
        ..FetchConfig::default()
    }
}

fn seed_store(path: &Path) {
    fs::write(
        path,
        "game_id,athlete_id_1,season,game_date,points,rebounds,assists\n\
         g1,618,2024,2024-07-01T23:00Z,10,4,2\n\
         g2,618,2024,2024-07-02T23:00Z,20,6,4\n",
    )
    .expect("seed store write should succeed");
}

#[test]
fn degraded_fetch_emits_warn_event() {
    let date = NaiveDate::from_ymd_opt(2024, 7, 3).unwrap();
    let logs = capture_logs(Level::INFO, || {
        let outcome = fetch_scoreboard(&MockFetcher::default(), date, &no_retry_cfg());
        assert!(matches!(outcome, FetchOutcome::Failed(_)));
    });

    assert!(logs.contains("\"event\":\"scoreboard.fetch.failed\""));
}

#[test]
fn successful_update_run_emits_lifecycle_events() {
    let temp = tempdir().expect("temp dir should be created");
    let store_path = temp.path().join("store.csv");
    seed_store(&store_path);

    let date = NaiveDate::from_ymd_opt(2024, 7, 3).unwrap();
    let body = json!({
        "season": { "year": 2024 },
        "events": [{
            "id": "g3",
            "competitions": [{
                "date": "2024-07-03T23:00Z",
                "competitors": [{ "roster": [{
                    "id": 618,
                    "statistics": [{ "stats": ["30", "8", "6"] }],
                }]}],
            }],
        }],
    })
    .to_string();

    let cfg = UpdateConfig {
        store_path,
        fetch: no_retry_cfg(),
        features: FeatureConfig {
            windows: vec![3],
            schema_version: FEATURE_SCHEMA_VERSION,
        },
    };
    let url = format!("{}?dates=20240703", cfg.fetch.base_url);
    let fetcher = MockFetcher::default().with(&url, body.as_bytes());

    let logs = capture_logs(Level::INFO, || {
        run_update(date, &cfg, &fetcher).expect("update should succeed");
    });

    assert!(logs.contains("\"event\":\"run.start\""));
    assert!(logs.contains("\"event\":\"scoreboard.fetch.ok\""));
    assert!(logs.contains("\"event\":\"features.compute.finish\""));
    assert!(logs.contains("\"event\":\"store.commit\""));
    assert!(logs.contains("\"event\":\"run.summary\""));
}

#[test]
fn lifecycle_helpers_emit_baseline_events() {
    let date = NaiveDate::from_ymd_opt(2024, 7, 3).unwrap();
    let logs = capture_logs(Level::INFO, || {
        log_run_start(date, Path::new("data/wnba_game_logs.csv"));
        log_run_summary(date, 12, 10, 2, 240, 6, true);
    });

    assert!(logs.contains("\"event\":\"run.start\""));
    assert!(logs.contains("\"event\":\"run.summary\""));
}
