//! Memory consolidator: the nightly batch job.
//!
//! Given a claimed [`RunRecord`], [`run`] reviews the turns since the last
//! completed run, applies one net delta per trait, snapshots the personality,
//! summarizes topic clusters into knowledge entries, and re-evaluates goals.
//!
//! Nothing is rolled back on failure. Progress is written to the run record as
//! it happens, and a failure marks the record `failed` with whatever was
//! already applied.

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::collections::BTreeMap;
use tracing::{info, warn};

use super::goals::{self, FollowUpPolicy};
use super::knowledge;
use super::scheduler;
use super::scorer::{self, TopicDomain};
use super::traits;
use super::turns;
use super::types::{AppliedDelta, GoalMetric, KnowledgeSource, RunRecord, RunStatus, SenderClass, TraitCause, TraitId, Turn};
use crate::config::ConsolidationConfig;
use crate::generation::{strip_think, truncate_chars, TextGenerator};

/// Net deltas smaller than this are not worth an audit entry.
const MIN_DELTA: f64 = 0.005;
const TURN_EXCERPT_CHARS: usize = 300;
const TURNS_PER_PROMPT: usize = 40;
const SUMMARY_MAX_CHARS: usize = 1200;

const SUMMARY_CONTEXT: &str = "You maintain the long-term memory of a personal assistant. \
Write plain factual notes. Do not address the user.";

/// Turns a run will consolidate, oldest first.
#[derive(Debug)]
pub struct Window {
    /// Turns with ids up to and including this one were already consolidated or skipped.
    pub after_id: i64,
    pub turns: Vec<Turn>,
}

impl Window {
    /// Cursor the run records: the last turn in the window, or `after_id` when empty.
    pub fn cursor(&self) -> i64 {
        self.turns.last().map_or(self.after_id, |t| t.id)
    }
}

/// Turns on one topic, largest clusters first.
#[derive(Debug)]
pub struct TopicCluster<'a> {
    pub domain: TopicDomain,
    pub turns: Vec<&'a Turn>,
}

/// Run consolidation for a claimed slot and return the finished record.
///
/// Returns `Err` only when the outcome itself could not be persisted.
pub fn run(
    conn: &mut Connection,
    generator: &dyn TextGenerator,
    config: &ConsolidationConfig,
    mut record: RunRecord,
) -> Result<RunRecord> {
    info!(run_date = %record.run_date, model = generator.model(), "consolidation starting");

    match execute(conn, generator, config, &mut record) {
        Ok(()) => {
            record.status = RunStatus::Completed;
            record.error = None;
            record.finished_at = Some(chrono::Utc::now().to_rfc3339());
            scheduler::save_run(conn, &record).context("failed to mark run completed")?;
            info!(
                run_date = %record.run_date,
                turns = record.turns_processed,
                deltas = record.trait_deltas.len(),
                knowledge = record.knowledge_ids.len(),
                "consolidation completed"
            );
        }
        Err(e) => {
            let message = format!("{e:#}");
            record.status = RunStatus::Failed;
            record.error = Some(message.clone());
            record.finished_at = Some(chrono::Utc::now().to_rfc3339());
            scheduler::save_run(conn, &record).context("failed to mark run failed")?;
            warn!(
                run_date = %record.run_date,
                error = %message,
                deltas = record.trait_deltas.len(),
                knowledge = record.knowledge_ids.len(),
                "consolidation failed, partial progress kept"
            );
        }
    }
    Ok(record)
}

fn execute(
    conn: &mut Connection,
    generator: &dyn TextGenerator,
    config: &ConsolidationConfig,
    record: &mut RunRecord,
) -> Result<()> {
    let fetched = fetch_window(conn, config)?;
    record.turns_processed = fetched.turns.len();
    record.last_turn_id = fetched.cursor();
    scheduler::save_run(conn, record)?;
    let window = fetched.turns;

    for (trait_id, delta) in aggregate_deltas(&window, config) {
        let change = traits::apply_delta_with_change(conn, trait_id, delta, TraitCause::Consolidation)
            .with_context(|| format!("failed to apply consolidation delta to {trait_id}"))?;
        record.trait_deltas.push(AppliedDelta {
            trait_id,
            delta,
            old_value: change.old_value,
            new_value: change.new_value,
        });
        scheduler::save_run(conn, record)?;
    }

    traits::save_snapshot(conn, "nightly").context("failed to save personality snapshot")?;

    for cluster in cluster_turns(&window, config.min_cluster_size, config.max_knowledge_entries) {
        let prompt = build_prompt(&cluster);
        let raw = generator
            .generate(&prompt, Some(SUMMARY_CONTEXT))
            .with_context(|| format!("summarizing {} turns on {}", cluster.turns.len(), cluster.domain))?;

        let cleaned = strip_think(&raw);
        let summary = truncate_chars(&cleaned, SUMMARY_MAX_CHARS).trim();
        if summary.is_empty() {
            warn!(topic = %cluster.domain, "empty summary from generator, skipping topic");
            continue;
        }
        let entry = knowledge::insert_entry(
            conn,
            cluster.domain.as_str(),
            summary,
            KnowledgeSource::Model,
            Some(&record.run_date),
        )?;
        record.knowledge_ids.push(entry.id);
        scheduler::save_run(conn, record)?;
    }

    let knowledge_count = knowledge::count_entries(conn)?;
    let conversation_count = turns::count_conversations(conn)?;
    // This run counts toward the metric even though it is not marked completed yet.
    let consolidation_count = scheduler::count_completed_runs(conn)? + 1;
    for (metric, value) in [
        (GoalMetric::KnowledgeTopicCount, knowledge_count),
        (GoalMetric::ConversationCount, conversation_count),
        (GoalMetric::ConsolidationCount, consolidation_count),
    ] {
        goals::tick(conn, metric, value as f64, &FollowUpPolicy)
            .with_context(|| format!("failed to tick {metric} goals"))?;
    }
    Ok(())
}

/// Turns after the last completed run's cursor, capped at `max_turns`.
///
/// Turns that arrive while a run is in progress, or that overflow the cap, stay
/// after the cursor and fall into the next window. With no completed run yet,
/// the window starts `lookback_hours` back.
pub fn fetch_window(conn: &Connection, config: &ConsolidationConfig) -> Result<Window> {
    let after_id = match scheduler::last_completed_run(conn)? {
        Some(last) => last.last_turn_id,
        None => turns::last_turn_id_at(conn, &lookback_start(config.lookback_hours).to_rfc3339())?,
    };
    let turns = turns::turns_after(conn, after_id, config.max_turns)?;
    info!(after_id, turns = turns.len(), "consolidation window loaded");
    Ok(Window { after_id, turns })
}

fn lookback_start(hours: u64) -> chrono::DateTime<chrono::Utc> {
    i64::try_from(hours)
        .ok()
        .and_then(chrono::TimeDelta::try_hours)
        .and_then(|span| chrono::Utc::now().checked_sub_signed(span))
        .unwrap_or(chrono::DateTime::<chrono::Utc>::UNIX_EPOCH)
}

/// One net delta per trait for the whole window.
///
/// Each counted turn contributes signals in `[-1, 1]` weighted by its importance.
/// The per-trait mean is scaled by `rate` and capped at `max_trait_delta`.
/// System turns and rejections are not counted.
pub fn aggregate_deltas(window: &[Turn], config: &ConsolidationConfig) -> BTreeMap<TraitId, f64> {
    let counted: Vec<&Turn> = window
        .iter()
        .filter(|t| t.sender_class != SenderClass::System && !t.is_rejection)
        .collect();
    if counted.is_empty() {
        return BTreeMap::new();
    }

    let mut sums: BTreeMap<TraitId, f64> = BTreeMap::new();
    for turn in &counted {
        for (trait_id, signal) in turn_signals(turn) {
            *sums.entry(trait_id).or_default() += signal * turn.importance;
        }
    }

    let n = counted.len() as f64;
    let cap = config.max_trait_delta.abs();
    sums.into_iter()
        .map(|(trait_id, sum)| (trait_id, (sum / n * config.rate).clamp(-cap, cap)))
        .filter(|(_, delta)| delta.abs() >= MIN_DELTA)
        .collect()
}

fn turn_signals(turn: &Turn) -> Vec<(TraitId, f64)> {
    let mut signals = Vec::new();
    match scorer::classify_topic(&turn.content) {
        Some(TopicDomain::Programming) => signals.push((TraitId::TechnicalDepth, 1.0)),
        Some(TopicDomain::Science) => {
            signals.push((TraitId::TechnicalDepth, 0.5));
            signals.push((TraitId::Curiosity, 0.5));
        }
        Some(TopicDomain::Philosophy) => signals.push((TraitId::Curiosity, 1.0)),
        Some(TopicDomain::Creative) => signals.push((TraitId::Creativity, 1.0)),
        Some(TopicDomain::Emotional) => signals.push((TraitId::Empathy, 1.0)),
        Some(TopicDomain::Practical) => signals.push((TraitId::Patience, 0.5)),
        None => {}
    }

    if turn.emotional_weight >= 0.6 {
        signals.push((TraitId::Empathy, 0.5));
    }

    let words = turn.content.split_whitespace().count();
    if words >= 40 {
        signals.push((TraitId::Verbosity, 0.5));
    } else if words <= 3 {
        signals.push((TraitId::Verbosity, -0.5));
    }

    if scorer::is_correction(&turn.content) {
        signals.push((TraitId::Assertiveness, -0.5));
    } else if scorer::is_praise(&turn.content) {
        signals.push((TraitId::Enthusiasm, 0.5));
    }
    signals
}

/// Group turns by topic, keep clusters of at least `min_size`, largest first.
pub fn cluster_turns(window: &[Turn], min_size: usize, max_clusters: usize) -> Vec<TopicCluster<'_>> {
    let mut by_domain: BTreeMap<TopicDomain, Vec<&Turn>> = BTreeMap::new();
    for turn in window {
        if turn.sender_class == SenderClass::System || turn.is_rejection {
            continue;
        }
        if let Some(domain) = scorer::classify_topic(&turn.content) {
            by_domain.entry(domain).or_default().push(turn);
        }
    }

    let mut clusters: Vec<TopicCluster<'_>> = by_domain
        .into_iter()
        .filter(|(_, turns)| turns.len() >= min_size.max(1))
        .map(|(domain, turns)| TopicCluster { domain, turns })
        .collect();
    // Stable sort keeps domain order among equal sizes.
    clusters.sort_by(|a, b| b.turns.len().cmp(&a.turns.len()));
    clusters.truncate(max_clusters);
    clusters
}

fn build_prompt(cluster: &TopicCluster<'_>) -> String {
    let excerpts: Vec<String> = cluster
        .turns
        .iter()
        .take(TURNS_PER_PROMPT)
        .map(|t| format!("{}: {}", t.sender, truncate_chars(&t.content, TURN_EXCERPT_CHARS)))
        .collect();
    format!(
        "Review these recent conversation excerpts about {topic}.\n\n{body}\n\n\
         Summarize the specific facts, preferences, and open questions worth remembering \
         long-term, in at most five sentences. Output only the summary.",
        topic = cluster.domain,
        body = excerpts.join("\n"),
    )
}
