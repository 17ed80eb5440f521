use anyhow::Result;

use psyche::config::PsycheConfig;
use psyche::evolution::{goals, knowledge, scheduler, traits, turns};

/// Display traits, goals, and recent consolidation runs.
pub fn status(config: &PsycheConfig, runs: usize) -> Result<()> {
    let conn = super::open_configured_db(config)?;

    println!("Personality");
    println!("{}", "=".repeat(40));
    for (trait_id, value) in traits::snapshot(&conn)? {
        println!("  {:<16} {:.3}  {}", trait_id.as_str(), value, bar(value));
    }
    println!();

    println!("Active goals:");
    let active = goals::active_goals(&conn)?;
    if active.is_empty() {
        println!("  (none)");
    }
    for g in &active {
        println!("  [{:>3}%] {} ({} / {})", g.progress, g.description, g.metric, g.target);
    }
    let completed = goals::completed_goals(&conn, 3)?;
    if !completed.is_empty() {
        println!("Recently completed:");
        for g in &completed {
            println!("  {} ({})", g.description, g.completed_at.as_deref().unwrap_or("-"));
        }
    }
    println!();

    println!("Conversations:         {}", turns::count_conversations(&conn)?);
    println!(
        "Knowledge entries:     {} ({} topics)",
        knowledge::count_entries(&conn)?,
        knowledge::count_topics(&conn)?
    );
    println!();

    println!("Recent runs:");
    let recent = scheduler::recent_runs(&conn, runs)?;
    if recent.is_empty() {
        println!("  (none)");
    }
    for r in &recent {
        println!(
            "  {}  {:<9} turns={} deltas={} knowledge={}",
            r.run_date,
            r.status.as_str(),
            r.turns_processed,
            r.trait_deltas.len(),
            r.knowledge_ids.len()
        );
        if let Some(ref err) = r.error {
            println!("      error: {err}");
        }
    }
    Ok(())
}

fn bar(value: f64) -> String {
    let filled = (value.clamp(0.0, 1.0) * 20.0).round() as usize;
    format!("{}{}", "#".repeat(filled), "-".repeat(20 - filled))
}
