use super::probe::build_probe;
use super::Context;
use pln_staging::gatekeeper::sweep::format_summary;
use pln_staging::gatekeeper::{JournalTrustController, SweepOptions};
use std::path::PathBuf;
use std::sync::Arc;
use time::OffsetDateTime;

/// Ping every journal and whitelist the healthy, recent ones
pub async fn execute(
    config_path: Option<PathBuf>,
    min_version: Option<String>,
    dry_run: bool,
    all: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Context::open(config_path).await?;
    let probe = Arc::new(build_probe(&ctx.config)?);
    let controller = JournalTrustController::new(
        Arc::clone(&ctx.store),
        probe,
        ctx.config.sweep_settings(),
    );

    let options = SweepOptions {
        min_version,
        dry_run,
        include_listed: all,
    };
    let summary = controller
        .run_sweep(options, OffsetDateTime::now_utc())
        .await?;

    println!("{}", format_summary(&summary, dry_run));
    Ok(())
}
