mod helpers;

use psyche::db;
use psyche::db::migrations::{get_schema_version, get_weights_version, run_migrations, CURRENT_SCHEMA_VERSION};
use psyche::evolution::scorer::WEIGHTS_V1;

#[test]
fn fresh_db_migrates_to_current_version() {
    let conn = helpers::test_db();
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
}

#[test]
fn stored_weights_match_compiled_table() {
    let conn = helpers::test_db();
    assert_eq!(get_weights_version(&conn).unwrap(), Some(WEIGHTS_V1.version));
}

#[test]
fn manual_v1_db_upgrades_correctly() {
    // A v1 database that was never migrated
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    conn.pragma_update(None, "foreign_keys", "ON").unwrap();
    db::schema::init_schema(&conn).unwrap();

    assert_eq!(get_schema_version(&conn).unwrap(), 1);
    assert!(get_weights_version(&conn).unwrap().is_none());

    run_migrations(&conn).unwrap();
    run_migrations(&conn).unwrap();

    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    assert_eq!(get_weights_version(&conn).unwrap(), Some(1));
}
