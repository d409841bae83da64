//! Inspection commands — `stratum list`, `stratum status`, `stratum reset`.

use anyhow::Result;
use stratum::checkpoint::Checkpoint;
use stratum::config::Config;
use stratum::graph::PackageGraph;
use stratum::manifest::discover_packages;

/// Print packages grouped by dependency level.
pub fn cmd_list(config: &Config) -> Result<()> {
    let packages = discover_packages(&config.project_dir)?;
    let graph = PackageGraph::build(packages)?;
    if graph.is_empty() {
        println!("No packages found under {}", config.project_dir.display());
        return Ok(());
    }

    for (i, level) in graph.levels().iter().enumerate() {
        println!("Level {i}:");
        for package in &level.packages {
            let deps: Vec<&str> = package.dependencies.iter().map(String::as_str).collect();
            if deps.is_empty() {
                println!("  {}", package.name);
            } else {
                println!("  {} (depends on {})", package.name, deps.join(", "));
            }
        }
    }
    Ok(())
}

/// Show the persisted checkpoint, if any.
pub fn cmd_status(config: &Config) -> Result<()> {
    match Checkpoint::new(config.status_file()).read() {
        Some(status) => {
            match status.package_dependency_index {
                Some(level) => println!(
                    "Last checkpoint: phase '{}' at dependency level {level}",
                    status.phase_key
                ),
                None => println!("Last checkpoint: project phase '{}'", status.phase_key),
            }
            if let Ok(modified) = std::fs::metadata(config.status_file()).and_then(|m| m.modified())
            {
                let when: chrono::DateTime<chrono::Local> = modified.into();
                println!("  written {}", when.format("%Y-%m-%d %H:%M:%S"));
            }
        }
        None => println!("No checkpoint; next run starts fresh."),
    }
    Ok(())
}

/// Delete the persisted checkpoint.
pub fn cmd_reset(config: &Config) -> Result<()> {
    Checkpoint::new(config.status_file()).clear()?;
    println!("Checkpoint cleared.");
    Ok(())
}
