//! End-to-end: scrape owners' log stores, consolidate, query buckets

use std::fs;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use shinystats::config::Config;
use shinystats::types::{Granularity, StatsError, TimeWindow};
use tempfile::TempDir;

/// Create `<home>/<owner>/ShinyApps/<app>/logs/shinylogs.sqlite` holding one
/// session row per connect time.
fn write_app_log(home: &Path, owner: &str, app: &str, connects: &[&str]) {
    let dir = home.join(owner).join("ShinyApps").join(app).join("logs");
    fs::create_dir_all(&dir).unwrap();
    let conn = Connection::open(dir.join("shinylogs.sqlite")).unwrap();
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS session (app TEXT, user TEXT, server_connected TEXT,
             sessionid TEXT, server_disconnected TEXT, user_agent TEXT,
             screen_res TEXT, browser_res TEXT, pixel_ratio REAL, browser_connected TEXT)",
    )
    .unwrap();
    for (i, connect) in connects.iter().enumerate() {
        let sid = format!("{}-{}-{}", owner, app, connect);
        conn.execute(
            "INSERT INTO session VALUES (?1, ?2, ?3, ?4, ?3, 'Mozilla/5.0', '1920x1080',
                 '1280x720', 1.0, ?5)",
            [app, owner, *connect, sid.as_str(), i.to_string().as_str()],
        )
        .unwrap();
    }
}

fn session_count(config: &Config) -> i64 {
    let conn = Connection::open(config.consolidator().canonical_path()).unwrap();
    conn.query_row("SELECT COUNT(*) FROM session", [], |r| r.get(0))
        .unwrap()
}

fn ts(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 5, day)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

fn setup() -> (TempDir, TempDir, Config) {
    let home = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    let config = Config {
        root: root.path().to_path_buf(),
        home_root: home.path().to_path_buf(),
        owners: vec!["alice".to_string(), "bob".to_string()],
        ..Config::default()
    };
    (home, root, config)
}

#[test]
fn consolidate_then_query_hourly_buckets() {
    let (home, _root, config) = setup();
    write_app_log(
        home.path(),
        "alice",
        "sales",
        &[
            "2023-05-01 10:05:00.123456+00:00",
            "2023-05-01 10:40:00.5+00:00",
            "2023-05-01 11:02:00.000001+00:00",
        ],
    );
    write_app_log(
        home.path(),
        "bob",
        "inventory",
        &["2023-05-01 09:00:00.1+00:00"],
    );
    // Server log directory, not an application
    fs::create_dir_all(home.path().join("bob/ShinyApps/log")).unwrap();
    // Application that has not logged yet
    fs::create_dir_all(home.path().join("bob/ShinyApps/forecast")).unwrap();

    let sources = config.enumerator().sources(&config.owners);
    assert_eq!(sources.len(), 3);

    let report = config.consolidator().consolidate(&sources).unwrap();
    assert_eq!(report.stage.staged.len(), 2);
    assert_eq!(report.stage.skipped.len(), 1);
    assert_eq!(report.stage.skipped[0].application, "forecast");
    assert_eq!(session_count(&config), 4);

    let mut stats = config.stats_service();
    let series = stats
        .series(
            "sales",
            Granularity::Hour,
            TimeWindow::new(ts(1, 0), ts(2, 0)),
        )
        .unwrap();
    let counts: Vec<(NaiveDateTime, u64)> =
        series.buckets.iter().map(|b| (b.start, b.count)).collect();
    assert_eq!(counts, vec![(ts(1, 10), 2), (ts(1, 11), 1)]);
    assert_eq!(series.owner.as_deref(), Some("alice"));

    let apps = stats.applications().unwrap();
    assert_eq!(apps["alice"], vec!["sales"]);
    assert_eq!(apps["bob"], vec!["inventory"]);
}

#[test]
fn repeated_consolidation_is_stable() {
    let (home, _root, config) = setup();
    write_app_log(
        home.path(),
        "alice",
        "sales",
        &["2023-05-01 10:05:00.1+00:00", "2023-05-02 10:05:00.1+00:00"],
    );
    write_app_log(
        home.path(),
        "bob",
        "inventory",
        &["2023-05-01 09:00:00.1+00:00"],
    );
    let consolidator = config.consolidator();

    for _ in 0..3 {
        let sources = config.enumerator().sources(&config.owners);
        consolidator.consolidate(&sources).unwrap();
        assert_eq!(session_count(&config), 3);
    }

    // New rows appended at the source are picked up once
    write_app_log(
        home.path(),
        "alice",
        "sales",
        &["2023-05-03 10:05:00.1+00:00"],
    );
    let sources = config.enumerator().sources(&config.owners);
    let report = consolidator.consolidate(&sources).unwrap();
    assert_eq!(report.merge.rows_inserted(), 1);
    assert_eq!(session_count(&config), 4);
}

#[test]
fn nothing_to_consolidate_is_no_data() {
    let (home, _root, config) = setup();
    fs::create_dir_all(home.path().join("alice/ShinyApps/sales")).unwrap();

    let sources = config.enumerator().sources(&config.owners);
    let err = config.consolidator().consolidate(&sources).unwrap_err();

    assert!(matches!(err, StatsError::NoData(_)));
    assert!(!config.consolidator().canonical_path().exists());
}

#[test]
fn monthly_series_for_unknown_app_is_two_zero_buckets() {
    let (home, _root, config) = setup();
    write_app_log(
        home.path(),
        "alice",
        "sales",
        &["2023-05-01 10:05:00.1+00:00"],
    );
    let sources = config.enumerator().sources(&config.owners);
    config.consolidator().consolidate(&sources).unwrap();

    let window = TimeWindow::new(ts(1, 0), ts(20, 0));
    let series = config
        .stats_service()
        .series("forecast", Granularity::Month, window)
        .unwrap();

    assert_eq!(series.buckets.len(), 2);
    assert_eq!(series.buckets[0].start, window.start);
    assert_eq!(series.buckets[1].start, window.end);
    assert_eq!(series.total(), 0);
    assert_eq!(series.owner, None);
    assert_eq!(series.bucket_width_secs, 30 * 86_400);
}
