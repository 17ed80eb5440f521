//! CLI `serve` command: run the nightly consolidation scheduler until ctrl-c.

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};

use psyche::config::PsycheConfig;
use psyche::evolution::scheduler::Scheduler;
use psyche::generation;

pub async fn serve(config: PsycheConfig) -> Result<()> {
    // Initializes schema and seeds goals before the first tick.
    drop(super::open_configured_db(&config)?);

    let generator: Arc<dyn generation::TextGenerator> =
        Arc::from(generation::create_generator(&config.generation)?);
    info!(
        db = %config.resolved_db_path().display(),
        model = generator.model(),
        "starting scheduler"
    );

    let scheduler = Scheduler::new(config.resolved_db_path(), config, generator);
    scheduler
        .run_until_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await;
    Ok(())
}
