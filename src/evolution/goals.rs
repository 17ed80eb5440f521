//! Goal tracker: long-running goals with monotonic progress.
//!
//! [`tick`] recomputes progress for every active goal on a metric. A goal that
//! reaches 100% is completed under a status guard, so the completion hook
//! ([`SuccessorPolicy`]) fires exactly once per goal, and its successor is
//! inserted in the same transaction as the completion.

use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use tracing::info;

use super::types::{Goal, GoalMetric, GoalStatus, NewGoal};
use crate::db::parse_tag;
use crate::error::{EvolveError, Result};

/// Completion hook: decides what, if anything, follows a completed goal.
pub trait SuccessorPolicy {
    fn successor(&self, completed: &Goal) -> Option<NewGoal>;
}

/// Follows a completed goal with a larger target on the same metric.
#[derive(Debug, Clone, Copy, Default)]
pub struct FollowUpPolicy;

impl SuccessorPolicy for FollowUpPolicy {
    fn successor(&self, completed: &Goal) -> Option<NewGoal> {
        let (factor, description) = match completed.metric {
            GoalMetric::KnowledgeTopicCount => (2.0, "Expand the knowledge base to {n} entries"),
            GoalMetric::ConversationCount => (2.5, "Hold {n} conversations with the operator"),
            GoalMetric::ConsolidationCount => (2.0, "Complete {n} nightly consolidations"),
        };
        let target = (completed.target * factor).ceil();
        Some(NewGoal {
            description: description.replace("{n}", &format!("{target}")),
            metric: completed.metric,
            target,
        })
    }
}

/// A goal completed by a [`tick`], with the successor its policy created.
#[derive(Debug, Clone)]
pub struct GoalCompletion {
    pub completed: Goal,
    pub successor: Option<Goal>,
}

/// Goals created when the tracker starts with an empty table.
pub fn seed_definitions() -> Vec<NewGoal> {
    vec![
        NewGoal {
            description: "Build a knowledge base of 50 entries".into(),
            metric: GoalMetric::KnowledgeTopicCount,
            target: 50.0,
        },
        NewGoal {
            description: "Hold 100 conversations with the operator".into(),
            metric: GoalMetric::ConversationCount,
            target: 100.0,
        },
        NewGoal {
            description: "Complete 7 nightly consolidations".into(),
            metric: GoalMetric::ConsolidationCount,
            target: 7.0,
        },
    ]
}

/// Insert the seed goals if no goal has ever been created. Returns what was inserted.
pub fn seed_goals(conn: &mut Connection) -> Result<Vec<Goal>> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let existing: i64 = tx.query_row("SELECT COUNT(*) FROM goals", [], |row| row.get(0))?;
    if existing > 0 {
        return Ok(Vec::new());
    }
    let mut seeded = Vec::new();
    for new in seed_definitions() {
        seeded.push(insert_goal(&tx, &new, None)?);
    }
    tx.commit()?;
    info!(count = seeded.len(), "seeded initial goals");
    Ok(seeded)
}

/// Create an active goal. Targets must be finite and positive.
pub fn add_goal(conn: &Connection, new: &NewGoal) -> Result<Goal> {
    insert_goal(conn, new, None)
}

pub fn get_goal(conn: &Connection, id: &str) -> Result<Goal> {
    conn.query_row(
        &format!("SELECT {GOAL_COLUMNS} FROM goals WHERE id = ?1"),
        params![id],
        goal_from_row,
    )
    .optional()?
    .ok_or_else(|| EvolveError::GoalNotFound(id.to_string()))
}

pub fn active_goals(conn: &Connection) -> Result<Vec<Goal>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {GOAL_COLUMNS} FROM goals WHERE status = 'active' ORDER BY created_at, id"
    ))?;
    let goals = stmt
        .query_map([], goal_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(goals)
}

/// Most recently completed goals, newest first.
pub fn completed_goals(conn: &Connection, limit: usize) -> Result<Vec<Goal>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {GOAL_COLUMNS} FROM goals WHERE status = 'completed' \
         ORDER BY completed_at DESC, id DESC LIMIT ?1"
    ))?;
    let goals = stmt
        .query_map(params![limit as i64], goal_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(goals)
}

/// Recompute progress of every active goal on `metric` from its current value.
///
/// Progress is `min(100, floor(100 * value / target))` and never moves backwards.
/// Goals reaching 100 are completed and handed to `policy` once.
pub fn tick(
    conn: &mut Connection,
    metric: GoalMetric,
    value: f64,
    policy: &dyn SuccessorPolicy,
) -> Result<Vec<GoalCompletion>> {
    if !value.is_finite() || value < 0.0 {
        tracing::warn!(metric = %metric, value, "ignoring goal tick with invalid metric value");
        return Ok(Vec::new());
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let goals: Vec<Goal> = {
        let mut stmt = tx.prepare(&format!(
            "SELECT {GOAL_COLUMNS} FROM goals WHERE status = 'active' AND metric = ?1"
        ))?;
        let rows = stmt.query_map(params![metric.as_str()], goal_from_row)?;
        rows.collect::<Result<Vec<_>, _>>()?
    };

    let now = chrono::Utc::now().to_rfc3339();
    let mut completions = Vec::new();

    for goal in goals {
        let progress = progress_for(value, goal.target).max(goal.progress);

        if progress < 100 {
            if progress > goal.progress {
                tx.execute(
                    "UPDATE goals SET progress = ?1 \
                     WHERE id = ?2 AND status = 'active' AND progress < ?1",
                    params![progress, goal.id],
                )?;
            }
            continue;
        }

        let changed = tx.execute(
            "UPDATE goals SET progress = 100, status = 'completed', completed_at = ?1 \
             WHERE id = ?2 AND status = 'active'",
            params![now, goal.id],
        )?;
        if changed != 1 {
            continue;
        }

        let completed = Goal {
            progress: 100,
            status: GoalStatus::Completed,
            completed_at: Some(now.clone()),
            ..goal
        };
        let successor = match policy.successor(&completed) {
            Some(next) => Some(insert_goal(&tx, &next, Some(&completed.id))?),
            None => None,
        };
        info!(
            goal_id = %completed.id,
            description = %completed.description,
            successor = successor.as_ref().map(|g| g.id.as_str()).unwrap_or("none"),
            "goal completed"
        );
        completions.push(GoalCompletion { completed, successor });
    }

    tx.commit()?;
    Ok(completions)
}

fn progress_for(value: f64, target: f64) -> u8 {
    ((100.0 * value / target).floor()).clamp(0.0, 100.0) as u8
}

const GOAL_COLUMNS: &str =
    "id, description, metric, target, progress, status, predecessor_id, created_at, completed_at";

fn goal_from_row(row: &Row<'_>) -> rusqlite::Result<Goal> {
    Ok(Goal {
        id: row.get(0)?,
        description: row.get(1)?,
        metric: parse_tag(2, row.get(2)?)?,
        target: row.get(3)?,
        progress: row.get(4)?,
        status: parse_tag(5, row.get(5)?)?,
        predecessor_id: row.get(6)?,
        created_at: row.get(7)?,
        completed_at: row.get(8)?,
    })
}

fn insert_goal(conn: &Connection, new: &NewGoal, predecessor: Option<&str>) -> Result<Goal> {
    if !new.target.is_finite() || new.target <= 0.0 {
        return Err(EvolveError::InvalidGoalTarget(new.target));
    }
    let goal = Goal {
        id: uuid::Uuid::now_v7().to_string(),
        description: new.description.clone(),
        metric: new.metric,
        target: new.target,
        progress: 0,
        status: GoalStatus::Active,
        predecessor_id: predecessor.map(str::to_string),
        created_at: chrono::Utc::now().to_rfc3339(),
        completed_at: None,
    };
    conn.execute(
        "INSERT INTO goals (id, description, metric, target, progress, status, predecessor_id, created_at) \
         VALUES (?1, ?2, ?3, ?4, 0, 'active', ?5, ?6)",
        params![
            goal.id,
            goal.description,
            goal.metric.as_str(),
            goal.target,
            goal.predecessor_id,
            goal.created_at,
        ],
    )?;
    Ok(goal)
}
