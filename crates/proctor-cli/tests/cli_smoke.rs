use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn proctor() -> Command {
    let mut cmd = Command::cargo_bin("proctor").unwrap();
    cmd.env_remove("PROCTOR_LOG")
        .env_remove("PROCTOR_CLOUD_API_KEY")
        .env_remove("PROCTOR_CLOUD_API_SECRET")
        .env_remove("PROCTOR_HTTP_BEARER_TOKEN");
    cmd
}

fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/compare", addr)
}

fn init(dir: &TempDir) -> (std::path::PathBuf, std::path::PathBuf) {
    let config = dir.path().join("proctor.yaml");
    let db = dir.path().join("state").join("proctor.db");
    proctor()
        .arg("init")
        .arg("--config")
        .arg(&config)
        .arg("--db")
        .arg(&db)
        .assert()
        .success();
    (config, db)
}

fn insert_report(db: &Path, userid: i64, snapshot: &str) -> i64 {
    let conn = rusqlite::Connection::open(db).unwrap();
    conn.execute(
        "INSERT INTO reports (courseid, cmid, userid, snapshot_reference, timemodified)
         VALUES (10, 20, ?1, ?2, 1700000000)",
        rusqlite::params![userid, snapshot],
    )
    .unwrap();
    conn.last_insert_rowid()
}

#[test]
fn init_writes_config_and_schema() {
    let dir = TempDir::new().unwrap();
    let (config, db) = init(&dir);
    assert!(config.exists());
    assert!(db.exists());

    let raw = fs::read_to_string(&config).unwrap();
    assert!(raw.contains("match_method"));

    // Second init keeps the existing config.
    fs::write(&config, "match_method: http\n").unwrap();
    proctor()
        .arg("init")
        .arg("--config")
        .arg(&config)
        .arg("--db")
        .arg(&db)
        .assert()
        .success()
        .stderr(contains("leaving it alone"));
    assert_eq!(fs::read_to_string(&config).unwrap(), "match_method: http\n");
}

#[test]
fn status_reports_counters_as_json() {
    let dir = TempDir::new().unwrap();
    let (_, db) = init(&dir);
    insert_report(&db, 1, "snap.png");

    proctor()
        .arg("status")
        .arg("--db")
        .arg(&db)
        .arg("--format")
        .arg("json")
        .assert()
        .success()
        .stdout(contains("\"reports\": 1"))
        .stdout(contains("\"queued_tasks\": 0"))
        .stdout(contains("\"version\"").not());
}

#[test]
fn missing_config_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    proctor()
        .arg("run")
        .arg("--config")
        .arg(dir.path().join("nope.yaml"))
        .arg("--db")
        .arg(dir.path().join("proctor.db"))
        .assert()
        .code(2)
        .stderr(contains("config error"));
}

#[test]
fn unknown_match_method_skips_run_and_keeps_queue() {
    let dir = TempDir::new().unwrap();
    let (config, db) = init(&dir);
    fs::write(&config, "match_method: pigeon\n").unwrap();

    let id = insert_report(&db, 1, "snap.png");
    {
        let conn = rusqlite::Connection::open(&db).unwrap();
        conn.execute(
            "INSERT INTO match_tasks (reportid, reference_image_uri, target_image_uri, timemodified)
             VALUES (?1, 'ref.png', 'snap.png', 1700000000)",
            [id],
        )
        .unwrap();
    }

    proctor()
        .arg("run")
        .arg("--config")
        .arg(&config)
        .arg("--db")
        .arg(&db)
        .assert()
        .code(2)
        .stderr(contains("proctor.worker.misconfigured"));

    let conn = rusqlite::Connection::open(&db).unwrap();
    let queued: i64 = conn
        .query_row("SELECT COUNT(*) FROM match_tasks", [], |r| r.get(0))
        .unwrap();
    assert_eq!(queued, 1);
}

#[test]
fn enqueue_then_run_scores_unreachable_backend_as_non_match() {
    let dir = TempDir::new().unwrap();
    let (config, db) = init(&dir);

    fs::write(dir.path().join("ref-7.png"), b"reference").unwrap();
    let snapshot = dir.path().join("snap-1.png");
    fs::write(&snapshot, b"snapshot").unwrap();
    fs::write(
        &config,
        format!(
            "configVersion: 1\nmatch_method: http\nhttp_endpoint_url: {}\nreference_image_template: \"{}/ref-{{userid}}.png\"\nsampling_limit: -1\n",
            closed_port_url(),
            dir.path().display()
        ),
    )
    .unwrap();
    let id = insert_report(&db, 7, &snapshot.display().to_string());

    proctor()
        .arg("enqueue")
        .arg("--config")
        .arg(&config)
        .arg("--db")
        .arg(&db)
        .assert()
        .success()
        .stdout(contains("\"enqueued\":1"));

    proctor()
        .arg("run")
        .arg("--config")
        .arg(&config)
        .arg("--db")
        .arg(&db)
        .assert()
        .success()
        .stdout(contains("\"claimed\":1"))
        .stdout(contains("\"backend_errors\":1"));

    let conn = rusqlite::Connection::open(&db).unwrap();
    let (score, flag): (i64, i64) = conn
        .query_row(
            "SELECT match_score, match_flag FROM reports WHERE id = ?1",
            [id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .unwrap();
    assert_eq!((score, flag), (0, 2));
    let warnings: i64 = conn
        .query_row("SELECT COUNT(*) FROM warnings", [], |r| r.get(0))
        .unwrap();
    assert_eq!(warnings, 1);
}
