mod helpers;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use helpers::{insert_turns, FixedGenerator};
use psyche::config::PsycheConfig;
use psyche::db;
use psyche::error::GenerationError;
use psyche::evolution::scheduler::{self, Scheduler};
use psyche::evolution::types::RunStatus;
use psyche::generation::TextGenerator;
use tempfile::TempDir;

/// Config whose run time has always passed, pointed at a fresh file database.
fn due_now(dir: &TempDir) -> (PathBuf, PsycheConfig) {
    let db_path = dir.path().join("psyche.db");
    let mut config = PsycheConfig::default();
    config.storage.db_path = db_path.to_string_lossy().into_owned();
    config.consolidation.run_at = "00:00".into();
    config.consolidation.tick_interval_secs = 1;
    (db_path, config)
}

fn seed_turns(db_path: &Path) {
    let conn = db::open_database(db_path).unwrap();
    insert_turns(&conn, "the compiler found a bug in my function", 0.8, 3);
}

struct Panics;

impl TextGenerator for Panics {
    fn generate(&self, _prompt: &str, _context: Option<&str>) -> Result<String, GenerationError> {
        panic!("generator crashed");
    }

    fn model(&self) -> &str {
        "panics"
    }
}

#[tokio::test]
async fn tick_runs_once_per_day() {
    let dir = TempDir::new().unwrap();
    let (db_path, config) = due_now(&dir);
    seed_turns(&db_path);
    let scheduler = Scheduler::new(db_path.clone(), config, Arc::new(FixedGenerator("notes".into())));

    let first = scheduler.tick().await.unwrap().expect("first tick should run consolidation");
    assert_eq!(first.status, RunStatus::Completed);
    assert_eq!(first.turns_processed, 3);
    assert_eq!(first.knowledge_ids.len(), 1);

    assert!(scheduler.tick().await.unwrap().is_none());

    let conn = db::open_database(&db_path).unwrap();
    let runs = scheduler::recent_runs(&conn, 10).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Completed);
}

#[tokio::test]
async fn disabled_consolidation_never_claims() {
    let dir = TempDir::new().unwrap();
    let (db_path, mut config) = due_now(&dir);
    config.consolidation.enabled = false;
    let scheduler = Scheduler::new(db_path.clone(), config, Arc::new(FixedGenerator("notes".into())));

    assert!(scheduler.tick().await.unwrap().is_none());
    let conn = db::open_database(&db_path).unwrap();
    assert!(scheduler::recent_runs(&conn, 10).unwrap().is_empty());
}

#[tokio::test]
async fn crashed_run_marks_slot_failed() {
    let dir = TempDir::new().unwrap();
    let (db_path, config) = due_now(&dir);
    seed_turns(&db_path);
    let scheduler = Scheduler::new(db_path.clone(), config, Arc::new(Panics));

    let err = scheduler.tick().await.unwrap_err();
    assert!(format!("{err:#}").contains("panicked"));

    let conn = db::open_database(&db_path).unwrap();
    let run = scheduler::recent_runs(&conn, 1).unwrap().remove(0);
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.finished_at.is_some());
    assert!(run.error.as_deref().unwrap().contains("panicked"));
    // Deltas applied before the crash are still on the record.
    assert_eq!(run.turns_processed, 3);

    // The failed slot is not retried today.
    assert!(scheduler.tick().await.unwrap().is_none());
}

#[tokio::test]
async fn loop_runs_due_consolidation_and_stops_on_shutdown() {
    let dir = TempDir::new().unwrap();
    let (db_path, config) = due_now(&dir);
    seed_turns(&db_path);
    let scheduler = Scheduler::new(db_path.clone(), config, Arc::new(FixedGenerator("notes".into())));

    tokio::time::timeout(
        Duration::from_secs(30),
        scheduler.run_until_shutdown(tokio::time::sleep(Duration::from_millis(300))),
    )
    .await
    .expect("scheduler should stop when shutdown resolves");

    let conn = db::open_database(&db_path).unwrap();
    let runs = scheduler::recent_runs(&conn, 10).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Completed);
}

#[tokio::test]
async fn loop_survives_failing_ticks() {
    let dir = TempDir::new().unwrap();
    let (db_path, config) = due_now(&dir);
    seed_turns(&db_path);
    let scheduler = Scheduler::new(db_path.clone(), config, Arc::new(Panics));

    tokio::time::timeout(
        Duration::from_secs(30),
        scheduler.run_until_shutdown(tokio::time::sleep(Duration::from_millis(1500))),
    )
    .await
    .expect("scheduler should stop when shutdown resolves");

    let conn = db::open_database(&db_path).unwrap();
    let runs = scheduler::recent_runs(&conn, 10).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
}
