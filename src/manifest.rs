//! Package manifest discovery and parsing.
//!
//! Walks the project tree for `package.json` files (skipping `node_modules`
//! and hidden directories) and turns each into a `Package`. The engine's own
//! settings live under a `stratum` section of the manifest:
//!
//! ```json
//! {
//!   "name": "lib-a",
//!   "dependencies": { "lib-b": "*" },
//!   "stratum": {
//!     "variant": "lib",
//!     "output": "build",
//!     "scripts": { "compile": "tsc -p ." }
//!   }
//! }
//! ```
//!
//! In-repo dependency names are the union of `dependencies` and
//! `devDependencies` keys; names that do not match a discovered package are
//! ignored by the grapher as external.

use crate::package::{Package, PackageVariant};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

pub const MANIFEST_NAME: &str = "package.json";

#[derive(Debug, Deserialize)]
struct RawManifest {
    name: String,
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
    #[serde(default, rename = "devDependencies")]
    dev_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    stratum: StratumSection,
}

#[derive(Debug, Default, Deserialize)]
struct StratumSection {
    #[serde(default)]
    variant: PackageVariant,
    /// Output directory relative to the package, overriding the default.
    output: Option<String>,
    #[serde(default)]
    scripts: BTreeMap<String, String>,
}

/// Parse a single manifest file into a `Package`.
pub fn load_package(manifest_path: &Path) -> Result<Package> {
    let content = fs::read_to_string(manifest_path)
        .with_context(|| format!("Failed to read {}", manifest_path.display()))?;
    let raw: RawManifest = serde_json::from_str(&content)
        .with_context(|| format!("Invalid manifest {}", manifest_path.display()))?;

    let dir = manifest_path
        .parent()
        .with_context(|| format!("Manifest has no parent directory: {}", manifest_path.display()))?
        .to_path_buf();

    let dependencies: BTreeSet<String> = raw
        .dependencies
        .keys()
        .chain(raw.dev_dependencies.keys())
        .cloned()
        .collect();

    let mut package = Package::new(&raw.name, dir.clone(), raw.stratum.variant, dependencies)
        .with_scripts(raw.stratum.scripts);
    if let Some(output) = raw.stratum.output
        && raw.stratum.variant.has_output()
    {
        package = package.with_output(Some(dir.join(output)));
    }
    Ok(package)
}

/// Discover every package under `project_dir`.
///
/// The project root's own manifest is not a package; `node_modules` and
/// hidden directories are never descended into.
pub fn discover_packages(project_dir: &Path) -> Result<Vec<Package>> {
    let mut packages = Vec::new();

    for entry in WalkDir::new(project_dir)
        .follow_links(false)
        .into_iter()
        .filter_entry(is_searchable)
    {
        let entry = entry.context("Failed to walk project tree")?;
        if !entry.file_type().is_file() || entry.file_name() != MANIFEST_NAME {
            continue;
        }
        if entry.path().parent() == Some(project_dir) {
            debug!(path = %entry.path().display(), "skipping project root manifest");
            continue;
        }
        packages.push(load_package(entry.path())?);
    }

    debug!(count = packages.len(), "discovered packages");
    Ok(packages)
}

fn is_searchable(entry: &DirEntry) -> bool {
    // Depth 0 is the project root itself, whatever it is named.
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return true;
    }
    let name = entry.file_name().to_string_lossy();
    !name.starts_with('.') && name != "node_modules"
}
