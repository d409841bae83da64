//! Incremental watch mode — `stratum watch`.

use super::run::build_executor;
use anyhow::Result;
use std::sync::Arc;
use stratum::config::Config;
use stratum::watch::WatchController;

pub async fn cmd_watch(config: &Config) -> Result<()> {
    let executor = Arc::new(build_executor(config)?);
    if executor.graph().is_empty() {
        println!("No packages found under {}", config.project_dir.display());
        return Ok(());
    }

    println!(
        "Watching {} packages for changes (Ctrl-C to stop)",
        executor.graph().packages().len()
    );
    WatchController::new(executor).run().await
}
