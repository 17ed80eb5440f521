pub mod consolidate;
pub mod doctor;
pub mod history;
pub mod record;
pub mod serve;
pub mod status;

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::{info, warn};

use psyche::config::PsycheConfig;
use psyche::db;
use psyche::evolution::{goals, scorer};

/// Open the configured database, seed goals on first run, and warn when the
/// stored scoring weights differ from the compiled-in table.
pub fn open_configured_db(config: &PsycheConfig) -> Result<Connection> {
    let db_path = config.resolved_db_path();
    let mut conn = db::open_database(&db_path)?;

    match db::migrations::get_weights_version(&conn)? {
        Some(stored) if stored != scorer::WEIGHTS_V1.version => warn!(
            stored,
            current = scorer::WEIGHTS_V1.version,
            "stored turn scores were produced by a different weight table"
        ),
        Some(_) => {}
        None => db::migrations::set_weights_version(&conn, scorer::WEIGHTS_V1.version)?,
    }

    if config.goals.seed_on_first_run {
        let seeded = goals::seed_goals(&mut conn).context("failed to seed goals")?;
        if !seeded.is_empty() {
            info!(count = seeded.len(), "first run: initial goals created");
        }
    }
    Ok(conn)
}
