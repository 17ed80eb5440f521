//! SQL DDL for all psyche tables.
//!
//! Defines `personality_traits`, `trait_history`, `conversation_turns`,
//! `knowledge_entries`, `goals`, `consolidation_runs`, `personality_snapshots`,
//! and `schema_meta`. All DDL uses `IF NOT EXISTS` for idempotent initialization.

use rusqlite::{params, Connection};

use crate::evolution::types::TraitId;

const SCHEMA_SQL: &str = r#"
-- Current trait values, one row per registered trait
CREATE TABLE IF NOT EXISTS personality_traits (
    trait_id TEXT PRIMARY KEY,
    value REAL NOT NULL CHECK(value >= 0.0 AND value <= 1.0),
    updated_at TEXT NOT NULL
);

-- Append-only audit of every trait mutation
CREATE TABLE IF NOT EXISTS trait_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    trait_id TEXT NOT NULL REFERENCES personality_traits(trait_id),
    old_value REAL NOT NULL,
    new_value REAL NOT NULL,
    cause TEXT NOT NULL CHECK(cause IN ('turn','consolidation')),
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_trait_history_trait ON trait_history(trait_id, id);

CREATE TABLE IF NOT EXISTS conversation_turns (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sender TEXT NOT NULL,
    sender_class TEXT NOT NULL CHECK(sender_class IN ('operator','federated','system')),
    platform TEXT NOT NULL,
    content TEXT NOT NULL,
    is_rejection INTEGER NOT NULL DEFAULT 0,
    importance REAL NOT NULL CHECK(importance >= 0.0 AND importance <= 1.0),
    emotional_weight REAL NOT NULL CHECK(emotional_weight >= 0.0 AND emotional_weight <= 1.0),
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_turns_created ON conversation_turns(created_at);

-- Topics are deliberately not unique: summaries accumulate across runs
CREATE TABLE IF NOT EXISTS knowledge_entries (
    id TEXT PRIMARY KEY,
    topic TEXT NOT NULL,
    content TEXT NOT NULL,
    source TEXT NOT NULL CHECK(source IN ('model','research')),
    run_date TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_knowledge_topic ON knowledge_entries(topic);

CREATE TABLE IF NOT EXISTS goals (
    id TEXT PRIMARY KEY,
    description TEXT NOT NULL,
    metric TEXT NOT NULL CHECK(metric IN ('conversation_count','knowledge_topic_count','consolidation_count')),
    target REAL NOT NULL CHECK(target > 0.0),
    progress INTEGER NOT NULL DEFAULT 0 CHECK(progress >= 0 AND progress <= 100),
    status TEXT NOT NULL DEFAULT 'active' CHECK(status IN ('active','completed')),
    predecessor_id TEXT REFERENCES goals(id),
    created_at TEXT NOT NULL,
    completed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_goals_metric_status ON goals(metric, status);

-- One row per calendar date; the unique key is the claim guard
CREATE TABLE IF NOT EXISTS consolidation_runs (
    run_date TEXT PRIMARY KEY,
    status TEXT NOT NULL CHECK(status IN ('claimed','completed','failed')),
    turns_processed INTEGER NOT NULL DEFAULT 0,
    trait_deltas TEXT NOT NULL DEFAULT '[]',
    knowledge_ids TEXT NOT NULL DEFAULT '[]',
    error TEXT,
    started_at TEXT NOT NULL,
    finished_at TEXT
);

CREATE TABLE IF NOT EXISTS personality_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    snapshot TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables and seed the registered traits. Idempotent.
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    seed_traits(conn)?;
    Ok(())
}

/// Insert every registered trait at the neutral midpoint, leaving existing rows alone.
fn seed_traits(conn: &Connection) -> rusqlite::Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    for trait_id in TraitId::ALL {
        conn.execute(
            "INSERT OR IGNORE INTO personality_traits (trait_id, value, updated_at) VALUES (?1, 0.5, ?2)",
            params![trait_id.as_str(), now],
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creates_all_tables() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        for expected in [
            "personality_traits",
            "trait_history",
            "conversation_turns",
            "knowledge_entries",
            "goals",
            "consolidation_runs",
            "personality_snapshots",
            "schema_meta",
        ] {
            assert!(tables.contains(&expected.to_string()), "{expected} missing");
        }
    }

    #[test]
    fn schema_seeds_registered_traits() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM personality_traits", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count as usize, TraitId::ALL.len());
    }

    #[test]
    fn schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn.execute(
            "UPDATE personality_traits SET value = 0.9 WHERE trait_id = 'humor'",
            [],
        )
        .unwrap();
        init_schema(&conn).unwrap(); // second call should not error or reset values

        let humor: f64 = conn
            .query_row(
                "SELECT value FROM personality_traits WHERE trait_id = 'humor'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!((humor - 0.9).abs() < 1e-9);
    }

    #[test]
    fn run_date_is_unique() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let insert = "INSERT INTO consolidation_runs (run_date, status, started_at) \
                      VALUES ('2026-01-01', 'claimed', '2026-01-01T02:00:00Z')";
        conn.execute(insert, []).unwrap();
        assert!(conn.execute(insert, []).is_err());
    }
}
