use anyhow::Result;

use psyche::config::PsycheConfig;
use psyche::evolution::traits;
use psyche::evolution::types::TraitId;

/// Show the audit trail for one trait, newest first.
pub fn history(config: &PsycheConfig, trait_name: &str, limit: usize) -> Result<()> {
    let trait_id: TraitId = trait_name.parse()?;
    let conn = super::open_configured_db(config)?;

    println!("{}: {:.3}", trait_id, traits::get_trait(&conn, trait_id)?);
    println!("{}", "=".repeat(50));
    let entries = traits::history(&conn, trait_id, limit)?;
    if entries.is_empty() {
        println!("  (no changes recorded)");
    }
    for e in entries {
        println!(
            "  {}  {:<13} {:.3} -> {:.3}  ({:+.3})",
            e.created_at,
            e.cause.as_str(),
            e.old_value,
            e.new_value,
            e.new_value - e.old_value
        );
    }
    Ok(())
}
