//! Standard script-running phase actions.
//!
//! The CLI wires each package phase to the shell command declared under the
//! package manifest's `stratum.scripts.<key>` entry. Packages without the
//! script are excluded by the phase's filter, so actions can assume the
//! script exists.
//!
//! Commands run through `sh -c` in the package directory. Cancellation kills
//! the child process and surfaces as `EngineError::Cancelled`.

use crate::config::Config;
use crate::errors::EngineError;
use crate::package::{Package, PackageVariant};
use crate::phase::{PackageAction, PackageFilter, Phase, PhaseRegistry, ProjectAction};
use anyhow::{Context, Result};
use std::process::Stdio;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Run a package's declared script for a phase key.
pub async fn run_script(package: &Package, key: &str, cancel: CancellationToken) -> Result<()> {
    let Some(command) = package.script(key) else {
        debug!(package = %package.name, phase = key, "no script declared, nothing to run");
        return Ok(());
    };

    info!(package = %package.name, phase = key, command, "running script");
    let mut child = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(&package.path)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to spawn '{key}' script for '{}'", package.name))?;

    tokio::select! {
        status = child.wait() => {
            let status = status
                .with_context(|| format!("Failed to wait on '{key}' script for '{}'", package.name))?;
            if !status.success() {
                anyhow::bail!(
                    "Script '{key}' for package '{}' exited with {status}",
                    package.name
                );
            }
            Ok(())
        }
        _ = cancel.cancelled() => {
            let _ = child.kill().await;
            Err(EngineError::Cancelled.into())
        }
    }
}

fn script_action(key: &'static str) -> PackageAction {
    Arc::new(move |package, cancel| {
        Box::pin(async move { run_script(&package, key, cancel).await })
    })
}

fn has_script(key: &'static str) -> PackageFilter {
    Arc::new(move |package| package.script(key).is_some())
}

fn resolve_config_action(config: &Config) -> ProjectAction {
    let config = config.clone();
    Arc::new(move || {
        let config = config.clone();
        Box::pin(async move {
            config.ensure_directories()?;
            info!(project = %config.project_dir.display(), "configuration resolved");
            Ok(())
        })
    })
}

/// Whether a package is a deployable application.
fn is_deployable(package: &Package) -> bool {
    matches!(
        package.variant,
        PackageVariant::FirebaseFunctionsApp | PackageVariant::FirebaseHostingApp
    )
}

/// Build the standard phase registry used by the CLI.
///
/// Registration order is the execution chain: `resolve-config` (project,
/// mandatory), then `install`, `compile` and `lint` per package, then
/// `deploy` for deployable applications.
pub fn standard_registry(config: &Config) -> PhaseRegistry {
    let mut registry = PhaseRegistry::new();

    registry.register(
        Phase::project("resolve-config", "Resolve configuration", resolve_config_action(config))
            .mandatory(),
    );
    registry.register(
        Phase::package("install", "Install dependencies", script_action("install"))
            .with_package_filter(has_script("install"))
            .with_mandatory_phases(&["resolve-config"]),
    );
    registry.register(
        Phase::package_with_output("compile", "Compile", script_action("compile"))
            .with_package_filter(has_script("compile"))
            .with_mandatory_phases(&["install", "resolve-config"]),
    );
    registry.register(
        Phase::package("lint", "Lint", script_action("lint"))
            .with_package_filter(has_script("lint")),
    );
    registry.register(
        Phase::package("deploy", "Deploy", script_action("deploy")).with_package_filter(Arc::new(
            |package| is_deployable(package) && package.script("deploy").is_some(),
        )),
    );

    registry
}
