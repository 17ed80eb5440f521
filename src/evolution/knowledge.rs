//! Knowledge entries produced by consolidation or the topic-research flow.
//!
//! Topics are not unique. Each run may add another summary for a topic that
//! already has entries, and readers see all of them.

use rusqlite::{params, Connection, Row};

use super::types::{KnowledgeEntry, KnowledgeSource};
use crate::db::parse_tag;
use crate::error::Result;

pub fn insert_entry(
    conn: &Connection,
    topic: &str,
    content: &str,
    source: KnowledgeSource,
    run_date: Option<&str>,
) -> Result<KnowledgeEntry> {
    let entry = KnowledgeEntry {
        id: uuid::Uuid::now_v7().to_string(),
        topic: topic.to_string(),
        content: content.to_string(),
        source,
        run_date: run_date.map(str::to_string),
        created_at: chrono::Utc::now().to_rfc3339(),
    };
    conn.execute(
        "INSERT INTO knowledge_entries (id, topic, content, source, run_date, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            entry.id,
            entry.topic,
            entry.content,
            entry.source.as_str(),
            entry.run_date,
            entry.created_at,
        ],
    )?;
    tracing::debug!(id = %entry.id, topic = %entry.topic, source = entry.source.as_str(), "knowledge entry stored");
    Ok(entry)
}

/// Total number of entries. This is the value the knowledge goal metric tracks.
pub fn count_entries(conn: &Connection) -> Result<u64> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM knowledge_entries", [], |row| row.get(0))?;
    Ok(n as u64)
}

/// Number of distinct topics.
pub fn count_topics(conn: &Connection) -> Result<u64> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT topic) FROM knowledge_entries",
        [],
        |row| row.get(0),
    )?;
    Ok(n as u64)
}

/// Newest entries first.
pub fn recent_entries(conn: &Connection, limit: usize) -> Result<Vec<KnowledgeEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, topic, content, source, run_date, created_at FROM knowledge_entries \
         ORDER BY created_at DESC, id DESC LIMIT ?1",
    )?;
    let entries = stmt
        .query_map(params![limit as i64], entry_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<KnowledgeEntry> {
    Ok(KnowledgeEntry {
        id: row.get(0)?,
        topic: row.get(1)?,
        content: row.get(2)?,
        source: parse_tag(3, row.get(3)?)?,
        run_date: row.get(4)?,
        created_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn duplicate_topics_accumulate() {
        let conn = db::open_memory_database().unwrap();
        insert_entry(&conn, "programming", "first summary", KnowledgeSource::Model, Some("2026-01-01")).unwrap();
        insert_entry(&conn, "programming", "second summary", KnowledgeSource::Model, Some("2026-01-02")).unwrap();
        insert_entry(&conn, "science", "from research", KnowledgeSource::Research, None).unwrap();

        assert_eq!(count_entries(&conn).unwrap(), 3);
        assert_eq!(count_topics(&conn).unwrap(), 2);
    }

    #[test]
    fn recent_entries_are_newest_first() {
        let conn = db::open_memory_database().unwrap();
        let a = insert_entry(&conn, "a", "one", KnowledgeSource::Model, None).unwrap();
        let b = insert_entry(&conn, "b", "two", KnowledgeSource::Research, None).unwrap();

        let recent = recent_entries(&conn, 10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, b.id);
        assert_eq!(recent[1].id, a.id);
        assert_eq!(recent[0].source, KnowledgeSource::Research);

        assert_eq!(recent_entries(&conn, 1).unwrap().len(), 1);
    }
}
