//! CLI `consolidate` command: claim today's slot and run consolidation now.

use anyhow::Result;
use chrono::Local;
use std::sync::Arc;

use psyche::config::PsycheConfig;
use psyche::evolution::scheduler::{self, Scheduler};
use psyche::generation::{self, TextGenerator};

pub async fn consolidate(config: PsycheConfig) -> Result<()> {
    // Built before claiming so a bad provider never leaves a slot stuck in `claimed`.
    let generator: Arc<dyn TextGenerator> = Arc::from(generation::create_generator(&config.generation)?);

    let conn = super::open_configured_db(&config)?;
    let run_date = scheduler::run_date_for(Local::now());
    let Some(record) = scheduler::claim_run(&conn, &run_date)? else {
        let status = scheduler::get_run(&conn, &run_date)?
            .map(|r| r.status.to_string())
            .unwrap_or_else(|| "unknown".into());
        println!("Consolidation for {run_date} already exists (status: {status}).");
        return Ok(());
    };
    drop(conn);

    let scheduler = Scheduler::new(config.resolved_db_path(), config, generator);
    let finished = scheduler.run_claimed(record).await?;

    println!("Consolidation {}", finished.run_date);
    println!("{}", "=".repeat(40));
    println!("  Status:            {}", finished.status);
    println!("  Turns processed:   {}", finished.turns_processed);
    println!("  Deltas applied:    {}", finished.trait_deltas.len());
    for d in &finished.trait_deltas {
        println!(
            "    {:<16} {:+.3}  ({:.3} -> {:.3})",
            d.trait_id.as_str(),
            d.delta,
            d.old_value,
            d.new_value
        );
    }
    println!("  Knowledge entries: {}", finished.knowledge_ids.len());
    if let Some(ref err) = finished.error {
        println!("  Error:             {err}");
    }
    Ok(())
}
