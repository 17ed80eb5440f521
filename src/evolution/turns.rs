//! Conversation ingress: score, persist, and react to a single turn.
//!
//! Everything here runs synchronously on the request path. Scoring failures
//! degrade to a neutral score and trait or goal failures are logged, so a
//! received turn is always stored.

use rusqlite::{params, Connection, Row};
use tracing::{debug, warn};

use super::goals::{self, FollowUpPolicy, GoalCompletion};
use super::scorer::{self, TraitNudge};
use super::traits;
use super::types::{GoalMetric, NewTurn, SenderClass, TraitCause, Turn};
use crate::config::EvolutionConfig;
use crate::db::parse_tag;
use crate::error::Result;

/// A stored turn plus what it set in motion.
#[derive(Debug)]
pub struct RecordedTurn {
    pub turn: Turn,
    /// Live trait nudges that were committed.
    pub nudges_applied: usize,
    pub completed_goals: Vec<GoalCompletion>,
}

/// Score and store a turn, then apply its live trait nudges and tick
/// conversation goals.
///
/// Only the insert itself can fail this call.
pub fn record_turn(conn: &mut Connection, new: NewTurn, config: &EvolutionConfig) -> Result<RecordedTurn> {
    let score = scorer::score_or_neutral(&new);
    let turn = insert_turn(conn, &new, score.importance, score.emotional_weight)?;
    debug!(
        turn_id = turn.id,
        sender_class = %turn.sender_class,
        importance = turn.importance,
        emotional_weight = turn.emotional_weight,
        "turn recorded"
    );

    let mut nudges_applied = 0;
    if config.enabled {
        for nudge in scorer::turn_deltas(&new, score, config) {
            let outcome = match nudge {
                TraitNudge::Shift { trait_id, delta } => {
                    traits::apply_delta(conn, trait_id, delta, TraitCause::Turn).map(|_| trait_id)
                }
                TraitNudge::Decay { trait_id, amount } => {
                    traits::decay_toward(conn, trait_id, amount, config.baseline, TraitCause::Turn)
                        .map(|_| trait_id)
                }
            };
            match outcome {
                Ok(_) => nudges_applied += 1,
                Err(e) => warn!(error = %e, turn_id = turn.id, "trait nudge failed"),
            }
        }
    }

    let mut completed_goals = Vec::new();
    if new.sender_class == SenderClass::Operator {
        let ticked = count_conversations(conn).and_then(|n| {
            goals::tick(conn, GoalMetric::ConversationCount, n as f64, &FollowUpPolicy)
        });
        match ticked {
            Ok(done) => completed_goals = done,
            Err(e) => warn!(error = %e, turn_id = turn.id, "conversation goal tick failed"),
        }
    }

    Ok(RecordedTurn {
        turn,
        nudges_applied,
        completed_goals,
    })
}

/// Persist a turn with an already computed score.
pub fn insert_turn(conn: &Connection, new: &NewTurn, importance: f64, emotional_weight: f64) -> Result<Turn> {
    let created_at = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO conversation_turns \
         (sender, sender_class, platform, content, is_rejection, importance, emotional_weight, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            new.sender,
            new.sender_class.as_str(),
            new.platform,
            new.content,
            new.is_rejection,
            importance,
            emotional_weight,
            created_at,
        ],
    )?;
    Ok(Turn {
        id: conn.last_insert_rowid(),
        sender: new.sender.clone(),
        sender_class: new.sender_class,
        platform: new.platform.clone(),
        content: new.content.clone(),
        is_rejection: new.is_rejection,
        importance,
        emotional_weight,
        created_at,
    })
}

/// Turns created strictly after `since` (RFC 3339), oldest first.
pub fn turns_since(conn: &Connection, since: &str, limit: usize) -> Result<Vec<Turn>> {
    let mut stmt = conn.prepare(
        "SELECT id, sender, sender_class, platform, content, is_rejection, importance, \
         emotional_weight, created_at FROM conversation_turns \
         WHERE created_at > ?1 ORDER BY created_at, id LIMIT ?2",
    )?;
    let turns = stmt
        .query_map(params![since, limit as i64], turn_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(turns)
}

/// Turns with an id greater than `after_id`, in insertion order.
pub fn turns_after(conn: &Connection, after_id: i64, limit: usize) -> Result<Vec<Turn>> {
    let mut stmt = conn.prepare(
        "SELECT id, sender, sender_class, platform, content, is_rejection, importance, \
         emotional_weight, created_at FROM conversation_turns \
         WHERE id > ?1 ORDER BY id LIMIT ?2",
    )?;
    let turns = stmt
        .query_map(params![after_id, limit as i64], turn_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(turns)
}

/// Id of the newest turn created at or before `at` (RFC 3339), 0 if none.
pub fn last_turn_id_at(conn: &Connection, at: &str) -> Result<i64> {
    let id: Option<i64> = conn.query_row(
        "SELECT MAX(id) FROM conversation_turns WHERE created_at <= ?1",
        params![at],
        |row| row.get(0),
    )?;
    Ok(id.unwrap_or(0))
}

/// Number of operator turns ever stored. Drives the conversation goal metric.
pub fn count_conversations(conn: &Connection) -> Result<u64> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM conversation_turns WHERE sender_class = 'operator'",
        [],
        |row| row.get(0),
    )?;
    Ok(n as u64)
}

fn turn_from_row(row: &Row<'_>) -> rusqlite::Result<Turn> {
    Ok(Turn {
        id: row.get(0)?,
        sender: row.get(1)?,
        sender_class: parse_tag(2, row.get(2)?)?,
        platform: row.get(3)?,
        content: row.get(4)?,
        is_rejection: row.get(5)?,
        importance: row.get(6)?,
        emotional_weight: row.get(7)?,
        created_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::evolution::types::{NewGoal, TraitId};

    fn operator(content: &str) -> NewTurn {
        NewTurn {
            sender: "operator".into(),
            sender_class: SenderClass::Operator,
            platform: "main_ui".into(),
            content: content.into(),
            is_rejection: false,
        }
    }

    #[test]
    fn record_turn_stores_score_and_nudges_traits() {
        let mut conn = db::open_memory_database().unwrap();
        let config = EvolutionConfig::default();

        let recorded = record_turn(
            &mut conn,
            operator("Why does this function return an error from the api?"),
            &config,
        )
        .unwrap();

        assert!(recorded.turn.id > 0);
        assert!(recorded.nudges_applied > 0);
        assert!(traits::get_trait(&conn, TraitId::TechnicalDepth).unwrap() > 0.5);
    }

    #[test]
    fn empty_turn_is_still_stored_with_neutral_score() {
        let mut conn = db::open_memory_database().unwrap();
        let recorded = record_turn(&mut conn, operator(""), &EvolutionConfig::default()).unwrap();

        assert_eq!(recorded.turn.importance, 0.5);
        assert_eq!(recorded.turn.emotional_weight, 0.5);
        assert_eq!(count_conversations(&conn).unwrap(), 1);
    }

    #[test]
    fn disabled_evolution_leaves_traits_alone() {
        let mut conn = db::open_memory_database().unwrap();
        let config = EvolutionConfig {
            enabled: false,
            ..EvolutionConfig::default()
        };
        let recorded = record_turn(&mut conn, operator("please be funny, tell me a joke"), &config).unwrap();

        assert_eq!(recorded.nudges_applied, 0);
        assert_eq!(traits::get_trait(&conn, TraitId::Humor).unwrap(), 0.5);
    }

    #[test]
    fn operator_turns_tick_conversation_goals() {
        let mut conn = db::open_memory_database().unwrap();
        let goal = goals::add_goal(
            &conn,
            &NewGoal {
                description: "talk twice".into(),
                metric: GoalMetric::ConversationCount,
                target: 2.0,
            },
        )
        .unwrap();
        let config = EvolutionConfig::default();

        record_turn(&mut conn, operator("hello there"), &config).unwrap();
        assert_eq!(goals::get_goal(&conn, &goal.id).unwrap().progress, 50);

        let mut system = operator("scheduled reminder");
        system.sender_class = SenderClass::System;
        record_turn(&mut conn, system, &config).unwrap();
        assert_eq!(goals::get_goal(&conn, &goal.id).unwrap().progress, 50);

        let recorded = record_turn(&mut conn, operator("hello again"), &config).unwrap();
        assert_eq!(recorded.completed_goals.len(), 1);
        assert_eq!(recorded.completed_goals[0].completed.id, goal.id);
    }

    #[test]
    fn turns_since_filters_and_orders() {
        let conn = db::open_memory_database().unwrap();
        let first = insert_turn(&conn, &operator("one"), 0.5, 0.5).unwrap();
        let second = insert_turn(&conn, &operator("two"), 0.6, 0.4).unwrap();

        let all = turns_since(&conn, "1970-01-01T00:00:00Z", 10).unwrap();
        assert_eq!(all.iter().map(|t| t.id).collect::<Vec<_>>(), vec![first.id, second.id]);

        let later = turns_since(&conn, &first.created_at, 10).unwrap();
        assert_eq!(later.len(), 1);
        assert_eq!(later[0].content, "two");
    }

    #[test]
    fn turns_after_pages_by_id() {
        let conn = db::open_memory_database().unwrap();
        let ids: Vec<i64> = ["one", "two", "three"]
            .iter()
            .map(|c| insert_turn(&conn, &operator(c), 0.5, 0.5).unwrap().id)
            .collect();

        let page = turns_after(&conn, 0, 2).unwrap();
        assert_eq!(page.iter().map(|t| t.id).collect::<Vec<_>>(), ids[..2].to_vec());
        let rest = turns_after(&conn, page[1].id, 10).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].content, "three");

        assert_eq!(last_turn_id_at(&conn, "1970-01-01T00:00:00Z").unwrap(), 0);
        assert_eq!(last_turn_id_at(&conn, "2999-01-01T00:00:00Z").unwrap(), ids[2]);
    }
}
