//! Trait store: bounded personality values with an append-only history.
//!
//! Every mutation runs inside one `IMMEDIATE` transaction: read the current
//! value, clamp the result into `[0.0, 1.0]`, write it, and append a
//! `trait_history` row. A value never moves without its audit entry, and no
//! reader on another connection can observe an unclamped value.

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::collections::BTreeMap;

use super::types::{TraitCause, TraitHistoryEntry, TraitId};
use crate::db::parse_tag;
use crate::error::{EvolveError, Result};

/// Old and new value of a committed mutation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraitChange {
    pub old_value: f64,
    pub new_value: f64,
}

/// Current value of a registered trait.
pub fn get_trait(conn: &Connection, trait_id: TraitId) -> Result<f64> {
    conn.query_row(
        "SELECT value FROM personality_traits WHERE trait_id = ?1",
        params![trait_id.as_str()],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| EvolveError::TraitNotFound(trait_id.to_string()))
}

/// Add `delta` to a trait, clamped into `[0.0, 1.0]`, and record the change.
///
/// Returns the new value. Deltas must be finite and within `[-1.0, 1.0]`; anything
/// else is rejected before the store is touched.
pub fn apply_delta(
    conn: &mut Connection,
    trait_id: TraitId,
    delta: f64,
    cause: TraitCause,
) -> Result<f64> {
    apply_delta_with_change(conn, trait_id, delta, cause).map(|change| change.new_value)
}

/// Like [`apply_delta`], but also reports the value it replaced.
pub fn apply_delta_with_change(
    conn: &mut Connection,
    trait_id: TraitId,
    delta: f64,
    cause: TraitCause,
) -> Result<TraitChange> {
    if !delta.is_finite() || delta.abs() > 1.0 {
        return Err(EvolveError::InvalidDelta(delta));
    }
    let change = mutate(conn, trait_id, cause, |old| clamp_unit(old + delta))?
        .ok_or_else(|| EvolveError::TraitNotFound(trait_id.to_string()))?;

    tracing::debug!(
        trait_id = %trait_id,
        delta,
        old = change.old_value,
        new = change.new_value,
        cause = cause.as_str(),
        "trait delta applied"
    );
    Ok(change)
}

/// Move a trait up to `amount` toward `baseline` without crossing it.
///
/// A trait already sitting on the baseline is left alone and no history row is
/// written. Returns the resulting value.
pub fn decay_toward(
    conn: &mut Connection,
    trait_id: TraitId,
    amount: f64,
    baseline: f64,
    cause: TraitCause,
) -> Result<f64> {
    if !amount.is_finite() || !(0.0..=1.0).contains(&amount) {
        return Err(EvolveError::InvalidDecay(amount));
    }
    let baseline = clamp_unit(baseline);

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let old = get_trait(&tx, trait_id)?;
    let new = if old > baseline {
        (old - amount).max(baseline)
    } else {
        (old + amount).min(baseline)
    };
    if (new - old).abs() < f64::EPSILON {
        tx.commit()?;
        return Ok(old);
    }
    write_value(&tx, trait_id, old, new, cause)?;
    tx.commit()?;
    Ok(new)
}

/// All registered traits and their current values.
pub fn snapshot(conn: &Connection) -> Result<BTreeMap<TraitId, f64>> {
    let mut stmt = conn.prepare("SELECT trait_id, value FROM personality_traits")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut map = BTreeMap::new();
    for (name, value) in rows {
        // Rows for traits this build no longer registers are ignored.
        if let Ok(trait_id) = name.parse::<TraitId>() {
            map.insert(trait_id, value);
        }
    }
    Ok(map)
}

/// Persist the current [`snapshot`] as JSON. Returns the snapshot row id.
pub fn save_snapshot(conn: &Connection, kind: &str) -> Result<i64> {
    let snap = snapshot(conn)?;
    let json = serde_json::to_string(&snap)?;
    conn.execute(
        "INSERT INTO personality_snapshots (kind, snapshot, created_at) VALUES (?1, ?2, ?3)",
        params![kind, json, chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Most recent history entries for a trait, newest first.
pub fn history(conn: &Connection, trait_id: TraitId, limit: usize) -> Result<Vec<TraitHistoryEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, old_value, new_value, cause, created_at FROM trait_history \
         WHERE trait_id = ?1 ORDER BY id DESC LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![trait_id.as_str(), limit as i64], |row| {
            Ok(TraitHistoryEntry {
                id: row.get(0)?,
                trait_id,
                old_value: row.get(1)?,
                new_value: row.get(2)?,
                cause: parse_tag(3, row.get(3)?)?,
                created_at: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Read-modify-write under an immediate transaction. `None` if the trait row is missing.
fn mutate(
    conn: &mut Connection,
    trait_id: TraitId,
    cause: TraitCause,
    f: impl FnOnce(f64) -> f64,
) -> Result<Option<TraitChange>> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let old: Option<f64> = tx
        .query_row(
            "SELECT value FROM personality_traits WHERE trait_id = ?1",
            params![trait_id.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    let Some(old) = old else {
        return Ok(None);
    };

    let new = f(old);
    write_value(&tx, trait_id, old, new, cause)?;
    tx.commit()?;
    Ok(Some(TraitChange {
        old_value: old,
        new_value: new,
    }))
}

fn write_value(
    conn: &Connection,
    trait_id: TraitId,
    old: f64,
    new: f64,
    cause: TraitCause,
) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE personality_traits SET value = ?1, updated_at = ?2 WHERE trait_id = ?3",
        params![new, now, trait_id.as_str()],
    )?;
    conn.execute(
        "INSERT INTO trait_history (trait_id, old_value, new_value, cause, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![trait_id.as_str(), old, new, cause.as_str(), now],
    )?;
    Ok(())
}
