//! Schema upgrades, applied in order on every open.
//!
//! | version | change |
//! |---------|--------|
//! | 1 | base tables from [`super::schema`] |
//! | 2 | `weights_version` key: which scoring table produced stored turn scores |
//! | 3 | `consolidation_runs.last_turn_id`: id cursor for the next run's window |

use rusqlite::{Connection, OptionalExtension};

pub const CURRENT_SCHEMA_VERSION: u32 = 3;

pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    let raw: String = conn.query_row(
        "SELECT value FROM schema_meta WHERE key = 'schema_version'",
        [],
        |row| row.get(0),
    )?;
    Ok(raw.parse().unwrap_or(0))
}

/// Stored scoring weight-table version. `None` on a database that predates v2
/// and has not been migrated.
pub fn get_weights_version(conn: &Connection) -> rusqlite::Result<Option<u32>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM schema_meta WHERE key = 'weights_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(raw.and_then(|v| v.parse().ok()))
}

pub fn set_weights_version(conn: &Connection, version: u32) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO schema_meta (key, value) VALUES ('weights_version', ?1) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        [version.to_string()],
    )?;
    Ok(())
}

/// Bring the database up to [`CURRENT_SCHEMA_VERSION`]. One transaction per step.
pub fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    let mut version = get_schema_version(conn)?;
    tracing::debug!(schema_version = version, target = CURRENT_SCHEMA_VERSION, "checking migrations");

    while version < CURRENT_SCHEMA_VERSION {
        let next = version + 1;
        let tx = conn.unchecked_transaction()?;
        match next {
            2 => record_weights_version(&tx)?,
            3 => add_run_cursor(&tx)?,
            _ => {
                tracing::error!(version = next, "no migration to this version");
                break;
            }
        }
        tx.execute(
            "UPDATE schema_meta SET value = ?1 WHERE key = 'schema_version'",
            [next.to_string()],
        )?;
        tx.commit()?;
        tracing::info!(from = version, to = next, "schema migrated");
        version = next;
    }
    Ok(())
}

/// v2: stored scores all came from the first weight table.
fn record_weights_version(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('weights_version', '1')",
        [],
    )?;
    Ok(())
}

/// v3: runs remember the highest turn id they consolidated. Existing finished
/// runs get the last turn stored before they finished.
fn add_run_cursor(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "ALTER TABLE consolidation_runs ADD COLUMN last_turn_id INTEGER NOT NULL DEFAULT 0;
         UPDATE consolidation_runs SET last_turn_id = COALESCE(
             (SELECT MAX(t.id) FROM conversation_turns t
              WHERE t.created_at <= consolidation_runs.finished_at), 0)
         WHERE finished_at IS NOT NULL;",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v1_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::schema::init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn fresh_schema_starts_at_v1() {
        assert_eq!(get_schema_version(&v1_db()).unwrap(), 1);
    }

    #[test]
    fn upgrade_reaches_current_and_is_repeatable() {
        let conn = v1_db();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
        assert_eq!(get_weights_version(&conn).unwrap(), Some(1));
    }

    #[test]
    fn weights_version_can_be_replaced() {
        let conn = v1_db();
        assert!(get_weights_version(&conn).unwrap().is_none());
        set_weights_version(&conn, 7).unwrap();
        set_weights_version(&conn, 8).unwrap();
        assert_eq!(get_weights_version(&conn).unwrap(), Some(8));
    }

    #[test]
    fn cursor_backfilled_for_finished_runs() {
        let conn = v1_db();
        conn.execute_batch(
            "INSERT INTO conversation_turns
                 (sender, sender_class, platform, content, importance, emotional_weight, created_at)
             VALUES ('op', 'operator', 't', 'a', 0.5, 0.5, '2026-06-13T10:00:00+00:00'),
                    ('op', 'operator', 't', 'b', 0.5, 0.5, '2026-06-13T12:00:00+00:00'),
                    ('op', 'operator', 't', 'c', 0.5, 0.5, '2026-06-14T09:00:00+00:00');
             INSERT INTO consolidation_runs (run_date, status, started_at, finished_at)
             VALUES ('2026-06-14', 'completed', '2026-06-14T02:00:00+00:00', '2026-06-14T02:05:00+00:00');
             INSERT INTO consolidation_runs (run_date, status, started_at)
             VALUES ('2026-06-15', 'claimed', '2026-06-15T02:00:00+00:00');",
        )
        .unwrap();

        run_migrations(&conn).unwrap();

        let cursor = |date: &str| -> i64 {
            conn.query_row(
                "SELECT last_turn_id FROM consolidation_runs WHERE run_date = ?1",
                [date],
                |row| row.get(0),
            )
            .unwrap()
        };
        assert_eq!(cursor("2026-06-14"), 2);
        assert_eq!(cursor("2026-06-15"), 0);
    }
}
