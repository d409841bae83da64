//! Phase execution — `stratum run`.

use anyhow::Result;
use std::sync::Arc;
use stratum::checkpoint::Checkpoint;
use stratum::config::Config;
use stratum::executor::{Executor, ExecutorOptions};
use stratum::graph::PackageGraph;
use stratum::manifest::discover_packages;
use stratum::script::standard_registry;
use tokio_util::sync::CancellationToken;

/// Discover packages, build the graph, and wire up an executor with the
/// standard script-running phase registry.
pub fn build_executor(config: &Config) -> Result<Executor> {
    let packages = discover_packages(&config.project_dir)?;
    let graph = Arc::new(PackageGraph::build(packages)?);
    let registry = standard_registry(config);
    let checkpoint = Checkpoint::new(config.status_file());
    Ok(Executor::new(
        graph,
        registry,
        checkpoint,
        ExecutorOptions {
            dry_run: config.dry_run,
            resume: config.resume,
        },
    ))
}

/// Run the full phase chain, or a single phase plus its mandatory
/// prerequisites.
pub async fn cmd_run(config: &Config, phase: Option<&str>) -> Result<()> {
    let executor = build_executor(config)?;
    if executor.graph().is_empty() {
        println!("No packages found under {}", config.project_dir.display());
        return Ok(());
    }

    match phase {
        Some(key) => {
            let previous = if config.resume {
                Checkpoint::new(config.status_file()).read()
            } else {
                None
            };
            executor
                .execute_phase(key, previous, CancellationToken::new())
                .await?;
        }
        None => executor.execute().await?,
    }
    println!("Done.");
    Ok(())
}
