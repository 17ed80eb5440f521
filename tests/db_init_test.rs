mod helpers;

use psyche::db;
use psyche::evolution::types::TraitId;
use tempfile::TempDir;

#[test]
fn open_creates_new_db_at_nonexistent_path() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("subdir").join("evolution.db");
    assert!(!db_path.exists());

    let conn = db::open_database(&db_path).unwrap();
    assert!(db_path.exists());

    let traits: i64 = conn
        .query_row("SELECT COUNT(*) FROM personality_traits", [], |row| row.get(0))
        .unwrap();
    assert_eq!(traits as usize, TraitId::ALL.len());
}

#[test]
fn reopening_keeps_existing_values() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("evolution.db");

    {
        let mut conn = db::open_database(&db_path).unwrap();
        psyche::evolution::traits::apply_delta(
            &mut conn,
            TraitId::Humor,
            0.2,
            psyche::evolution::types::TraitCause::Turn,
        )
        .unwrap();
    }

    let conn = db::open_database(&db_path).unwrap();
    let humor = psyche::evolution::traits::get_trait(&conn, TraitId::Humor).unwrap();
    assert!((humor - 0.7).abs() < 1e-9);
}

#[test]
fn wal_and_busy_timeout_are_set() {
    let tmp = TempDir::new().unwrap();
    let conn = db::open_database(tmp.path().join("evolution.db")).unwrap();

    let mode: String = conn
        .pragma_query_value(None, "journal_mode", |row| row.get(0))
        .unwrap();
    assert_eq!(mode.to_lowercase(), "wal");

    let timeout: i64 = conn
        .pragma_query_value(None, "busy_timeout", |row| row.get(0))
        .unwrap();
    assert_eq!(timeout, 5000);
}

#[test]
fn health_check_passes_on_fresh_db() {
    let conn = helpers::test_db();
    let report = db::check_database_health(&conn).unwrap();

    assert!(report.integrity_ok);
    assert_eq!(report.schema_version, db::migrations::CURRENT_SCHEMA_VERSION);
    assert_eq!(report.weights_version, Some(1));
    assert_eq!(report.trait_count as usize, TraitId::ALL.len());
    assert_eq!(report.history_count, 0);
    assert_eq!(report.turn_count, 0);
    assert_eq!(report.run_count, 0);
}

#[test]
fn out_of_range_trait_value_is_rejected_by_schema() {
    let conn = helpers::test_db();
    let err = conn.execute(
        "UPDATE personality_traits SET value = 1.5 WHERE trait_id = 'humor'",
        [],
    );
    assert!(err.is_err());
}
