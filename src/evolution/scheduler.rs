//! Run scheduler: per-day consolidation slots and the ticking loop.
//!
//! A slot moves `NoRunYet → Claimed → Completed | Failed`. The claim is a
//! single `INSERT ... ON CONFLICT(run_date) DO NOTHING`; the connection that
//! gets one affected row owns tonight's run and every other tick skips. A
//! failed slot stays failed until the next calendar date.

use anyhow::Context;
use chrono::{DateTime, Local, NaiveTime};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::consolidate;
use super::types::{RunRecord, RunStatus};
use crate::config::PsycheConfig;
use crate::db::{self, parse_tag};
use crate::error::Result;
use crate::generation::TextGenerator;

/// What a single scheduler tick decided.
#[derive(Debug, Clone)]
pub enum TickOutcome {
    /// Before tonight's configured run time.
    NotDue,
    /// Someone already holds today's slot.
    AlreadyClaimed { status: RunStatus },
    /// This caller claimed today's slot and must run consolidation.
    Claimed(RunRecord),
}

/// Slot key for a local timestamp (`YYYY-MM-DD`).
pub fn run_date_for(now: DateTime<Local>) -> String {
    now.format("%Y-%m-%d").to_string()
}

/// Atomically insert a `claimed` record for `run_date`.
///
/// Returns `None` if a record for that date already exists, whatever its status.
pub fn claim_run(conn: &Connection, run_date: &str) -> Result<Option<RunRecord>> {
    let started_at = chrono::Utc::now().to_rfc3339();
    let inserted = conn.execute(
        "INSERT INTO consolidation_runs (run_date, status, started_at) VALUES (?1, 'claimed', ?2) \
         ON CONFLICT(run_date) DO NOTHING",
        params![run_date, started_at],
    )?;
    if inserted != 1 {
        return Ok(None);
    }
    Ok(Some(RunRecord {
        run_date: run_date.to_string(),
        status: RunStatus::Claimed,
        turns_processed: 0,
        trait_deltas: Vec::new(),
        knowledge_ids: Vec::new(),
        last_turn_id: 0,
        error: None,
        started_at,
        finished_at: None,
    }))
}

/// Decide whether tonight's run is due and, if so, claim it.
pub fn check_and_claim(conn: &Connection, now: DateTime<Local>, run_at: NaiveTime) -> Result<TickOutcome> {
    if now.time() < run_at {
        return Ok(TickOutcome::NotDue);
    }
    let run_date = run_date_for(now);
    if let Some(record) = claim_run(conn, &run_date)? {
        info!(run_date = %run_date, "claimed consolidation slot");
        return Ok(TickOutcome::Claimed(record));
    }
    let status = get_run(conn, &run_date)?
        .map(|r| r.status)
        .unwrap_or(RunStatus::Claimed);
    debug!(run_date = %run_date, status = %status, "consolidation slot already taken");
    Ok(TickOutcome::AlreadyClaimed { status })
}

/// Write the mutable fields of a run record back to its row.
pub fn save_run(conn: &Connection, record: &RunRecord) -> Result<()> {
    conn.execute(
        "UPDATE consolidation_runs SET status = ?1, turns_processed = ?2, trait_deltas = ?3, \
         knowledge_ids = ?4, last_turn_id = ?5, error = ?6, finished_at = ?7 WHERE run_date = ?8",
        params![
            record.status.as_str(),
            record.turns_processed as i64,
            serde_json::to_string(&record.trait_deltas)?,
            serde_json::to_string(&record.knowledge_ids)?,
            record.last_turn_id,
            record.error,
            record.finished_at,
            record.run_date,
        ],
    )?;
    Ok(())
}

/// Mark a still-`claimed` slot as failed. Progress already saved on the row is kept.
///
/// Returns `false` if the slot had already reached a final status.
pub fn fail_run(conn: &Connection, run_date: &str, error: &str) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE consolidation_runs SET status = 'failed', error = ?1, finished_at = ?2 \
         WHERE run_date = ?3 AND status = 'claimed'",
        params![error, chrono::Utc::now().to_rfc3339(), run_date],
    )?;
    Ok(updated == 1)
}

pub fn get_run(conn: &Connection, run_date: &str) -> Result<Option<RunRecord>> {
    let record = conn
        .query_row(
            &format!("SELECT {RUN_COLUMNS} FROM consolidation_runs WHERE run_date = ?1"),
            params![run_date],
            run_from_row,
        )
        .optional()?;
    Ok(record)
}

/// The most recent completed run, if any.
pub fn last_completed_run(conn: &Connection) -> Result<Option<RunRecord>> {
    let record = conn
        .query_row(
            &format!(
                "SELECT {RUN_COLUMNS} FROM consolidation_runs WHERE status = 'completed' \
                 ORDER BY run_date DESC LIMIT 1"
            ),
            [],
            run_from_row,
        )
        .optional()?;
    Ok(record)
}

pub fn count_completed_runs(conn: &Connection) -> Result<u64> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM consolidation_runs WHERE status = 'completed'",
        [],
        |row| row.get(0),
    )?;
    Ok(n as u64)
}

/// Newest runs first, for operational review.
pub fn recent_runs(conn: &Connection, limit: usize) -> Result<Vec<RunRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RUN_COLUMNS} FROM consolidation_runs ORDER BY run_date DESC LIMIT ?1"
    ))?;
    let runs = stmt
        .query_map(params![limit as i64], run_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(runs)
}

const RUN_COLUMNS: &str =
    "run_date, status, turns_processed, trait_deltas, knowledge_ids, error, started_at, finished_at, \
     last_turn_id";

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    let json_col = |idx: usize| -> rusqlite::Result<String> { row.get(idx) };
    let decode = |idx: usize, raw: String| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, raw.into())
    };
    let deltas_raw = json_col(3)?;
    let ids_raw = json_col(4)?;
    let turns: i64 = row.get(2)?;

    Ok(RunRecord {
        run_date: row.get(0)?,
        status: parse_tag(1, row.get(1)?)?,
        turns_processed: turns.max(0) as usize,
        trait_deltas: serde_json::from_str(&deltas_raw).map_err(|e| decode(3, e.to_string()))?,
        knowledge_ids: serde_json::from_str(&ids_raw).map_err(|e| decode(4, e.to_string()))?,
        last_turn_id: row.get(8)?,
        error: row.get(5)?,
        started_at: row.get(6)?,
        finished_at: row.get(7)?,
    })
}

/// Drives nightly consolidation from a fixed-interval tick.
///
/// Each tick opens its own connection on a blocking thread, so a long run
/// never holds the connection used by live conversation.
pub struct Scheduler {
    db_path: PathBuf,
    config: PsycheConfig,
    generator: Arc<dyn TextGenerator>,
}

impl Scheduler {
    pub fn new(db_path: PathBuf, config: PsycheConfig, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            db_path,
            config,
            generator,
        }
    }

    /// One scheduler tick. Returns the finished run record if this tick ran one.
    pub async fn tick(&self) -> anyhow::Result<Option<RunRecord>> {
        if !self.config.consolidation.enabled {
            return Ok(None);
        }
        let run_at = self.config.consolidation.run_time()?;
        let db_path = self.db_path.clone();

        let claimed = tokio::task::spawn_blocking(move || -> anyhow::Result<Option<RunRecord>> {
            let conn = db::open_database(&db_path)?;
            match check_and_claim(&conn, Local::now(), run_at)? {
                TickOutcome::Claimed(record) => Ok(Some(record)),
                TickOutcome::NotDue | TickOutcome::AlreadyClaimed { .. } => Ok(None),
            }
        })
        .await
        .context("scheduler claim task panicked")??;

        match claimed {
            Some(record) => self.run_claimed(record).await.map(Some),
            None => Ok(None),
        }
    }

    /// Run consolidation for a slot this caller has already claimed.
    ///
    /// If the run cannot persist its own outcome, or its task panics, the slot
    /// is marked `failed` through a fresh connection and the error is returned.
    pub async fn run_claimed(&self, record: RunRecord) -> anyhow::Result<RunRecord> {
        let run_date = record.run_date.clone();
        let db_path = self.db_path.clone();
        let config = self.config.consolidation.clone();
        let generator = Arc::clone(&self.generator);

        let outcome = tokio::task::spawn_blocking(move || -> anyhow::Result<RunRecord> {
            let mut conn = db::open_database(&db_path)?;
            consolidate::run(&mut conn, generator.as_ref(), &config, record)
        })
        .await;
        let err = match outcome {
            Ok(Ok(finished)) => return Ok(finished),
            Ok(Err(e)) => e,
            Err(join) => anyhow::Error::new(join).context("consolidation task panicked"),
        };

        let message = format!("{err:#}");
        let db_path = self.db_path.clone();
        let date = run_date.clone();
        let marked = tokio::task::spawn_blocking(move || -> anyhow::Result<bool> {
            let conn = db::open_database(&db_path)?;
            Ok(fail_run(&conn, &date, &message)?)
        })
        .await;
        match marked {
            Ok(Ok(true)) => warn!(run_date = %run_date, "consolidation slot marked failed"),
            Ok(Ok(false)) => {}
            Ok(Err(e)) => error!(run_date = %run_date, error = %format!("{e:#}"), "could not mark slot failed"),
            Err(e) => error!(run_date = %run_date, error = %e, "could not mark slot failed"),
        }
        Err(err)
    }

    /// Tick until `shutdown` resolves. Tick errors are logged and the loop continues.
    pub async fn run_until_shutdown<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let period = Duration::from_secs(self.config.consolidation.tick_interval_secs.max(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(
            run_at = %self.config.consolidation.run_at,
            interval_secs = period.as_secs(),
            "scheduler started"
        );
        if !self.config.consolidation.enabled {
            warn!("consolidation is disabled; scheduler will idle");
        }

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("scheduler stopping");
                    break;
                }
                _ = interval.tick() => {
                    match self.tick().await {
                        Ok(Some(record)) => info!(
                            run_date = %record.run_date,
                            status = %record.status,
                            turns = record.turns_processed,
                            deltas = record.trait_deltas.len(),
                            knowledge = record.knowledge_ids.len(),
                            "consolidation run finished"
                        ),
                        Ok(None) => {}
                        Err(e) => error!(error = %format!("{e:#}"), "scheduler tick failed"),
                    }
                }
            }
        }
    }
}
