//! Package data model.
//!
//! A `Package` is a unit of source code with its own manifest, identified by
//! its manifest name (which may differ from its directory name). Identity
//! fields are immutable after construction; the manifest loader creates
//! packages once at startup and the grapher arranges them into levels.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// The kind of package, driving which phases apply to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PackageVariant {
    /// No sources of its own; configuration-only. Produces no output.
    Sourceless,
    /// A library consumed by other packages.
    #[default]
    Lib,
    /// A deployable Firebase Functions application.
    FirebaseFunctionsApp,
    /// A deployable Firebase Hosting application.
    FirebaseHostingApp,
    /// A Python package. Its manifest cannot express cross-package
    /// dependencies, so it does not participate in the dependency graph.
    Python,
}

impl PackageVariant {
    /// Whether packages of this variant can declare in-repo dependencies.
    ///
    /// Non-participating variants are appended as one final extra level
    /// after all graph-derived levels.
    pub fn participates_in_graph(&self) -> bool {
        !matches!(self, Self::Python)
    }

    /// Whether packages of this variant produce compiled output.
    pub fn has_output(&self) -> bool {
        !matches!(self, Self::Sourceless)
    }
}

/// A package in the monorepo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    /// Manifest name. Distinct from the directory name.
    pub name: String,
    /// Absolute path to the package directory.
    pub path: PathBuf,
    /// Absolute path to the compiled output directory, absent for
    /// sourceless packages.
    pub output: Option<PathBuf>,
    /// Package variant.
    pub variant: PackageVariant,
    /// Names of in-repo packages this package depends on, as declared in
    /// its manifest. Entries not matching a known package are treated as
    /// external, already-published dependencies and ignored by the grapher.
    pub dependencies: BTreeSet<String>,
    /// Phase scripts declared in the manifest (phase key -> shell command).
    #[serde(default)]
    pub scripts: BTreeMap<String, String>,
}

impl Package {
    /// Create a package with the given identity fields and no scripts.
    pub fn new(
        name: &str,
        path: PathBuf,
        variant: PackageVariant,
        dependencies: BTreeSet<String>,
    ) -> Self {
        let output = variant.has_output().then(|| path.join("dist"));
        Self {
            name: name.to_string(),
            path,
            output,
            variant,
            dependencies,
            scripts: BTreeMap::new(),
        }
    }

    /// Override the output directory.
    pub fn with_output(mut self, output: Option<PathBuf>) -> Self {
        self.output = output;
        self
    }

    /// Attach manifest-declared phase scripts.
    pub fn with_scripts(mut self, scripts: BTreeMap<String, String>) -> Self {
        self.scripts = scripts;
        self
    }

    /// Look up the shell command for a phase key.
    pub fn script(&self, key: &str) -> Option<&str> {
        self.scripts.get(key).map(String::as_str)
    }
}
