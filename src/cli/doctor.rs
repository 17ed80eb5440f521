//! CLI `doctor` command: run database diagnostics and print a health report.

use anyhow::{Context, Result};

use psyche::config::PsycheConfig;
use psyche::db;
use psyche::evolution::scorer;

/// Run database diagnostics and print a health report.
pub fn doctor(config: &PsycheConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("Run `psyche serve` or `psyche record` to initialize.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    let conn = db::open_database(&db_path).context("failed to open database (may be corrupt)")?;
    let report = db::check_database_health(&conn).context("failed to run health check")?;

    println!("Psyche Health Report");
    println!("====================");
    println!();
    println!("Database:          {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!();
    println!("Scoring weights:");
    match report.weights_version {
        Some(v) => println!("  Stored:          v{v}"),
        None => println!("  Stored:          (not set)"),
    }
    println!("  Compiled:        v{}", scorer::WEIGHTS_V1.version);
    if report.weights_version.is_some_and(|v| v != scorer::WEIGHTS_V1.version) {
        println!("  WARNING: weight table changed; older turn scores are not comparable.");
    }
    println!();
    println!("Generation:");
    println!("  Provider:        {}", config.generation.provider);
    println!("  Endpoint:        {}", config.generation.url);
    println!("  Model:           {}", config.generation.model);
    println!();
    println!("Row counts:");
    println!("  Traits:          {}", report.trait_count);
    println!("  Trait history:   {}", report.history_count);
    println!("  Turns:           {}", report.turn_count);
    println!("  Knowledge:       {}", report.knowledge_count);
    println!("  Goals:           {}", report.goal_count);
    println!("  Runs:            {}", report.run_count);
    println!();
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
        println!();
        println!("Recovery steps:");
        println!("  1. Stop `psyche serve`.");
        println!("  2. Restore from a backup: cp backup.db {}", db_path.display());
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
