//! Phase model and registry.
//!
//! A `Phase` is a named step applied once per run (`Project` variant) or
//! once per package (`Package` / `PackageWithOutput` variants). The host
//! application registers phases in order; registration order is both
//! priority and the scheduler's grouping key.
//!
//! Actions and filters are injected as opaque callbacks: the engine treats
//! actions as black boxes that either complete or raise. Package actions
//! receive a cancellation token and are responsible for checking it at
//! their own I/O boundaries.

use crate::errors::EngineError;
use crate::package::Package;
use anyhow::Result;
use futures::future::BoxFuture;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Async action run once for the whole project.
pub type ProjectAction = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Async action run once per package.
pub type PackageAction =
    Arc<dyn Fn(Arc<Package>, CancellationToken) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Predicate gating a package phase for a given package.
pub type PackageFilter = Arc<dyn Fn(&Package) -> bool + Send + Sync>;

/// Predicate gating a project phase for this run.
pub type ProjectFilter = Arc<dyn Fn() -> bool + Send + Sync>;

/// How a phase is parameterized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseVariant {
    /// Runs once for the whole project.
    Project,
    /// Runs once per package.
    Package,
    /// Runs once per package and requires the package to have an output
    /// directory (implies the package is not sourceless).
    PackageWithOutput,
}

impl PhaseVariant {
    /// Whether this phase runs per package. `Package` and
    /// `PackageWithOutput` phases batch together.
    pub fn is_per_package(&self) -> bool {
        !matches!(self, Self::Project)
    }
}

enum Action {
    Project(ProjectAction),
    Package(PackageAction),
}

enum Filter {
    /// Default: always true.
    None,
    Project(ProjectFilter),
    Package(PackageFilter),
}

/// A named step in the build chain.
pub struct Phase {
    /// Stable key, used for checkpoints and mandatory-phase references.
    pub key: String,
    /// Human-readable name.
    pub name: String,
    pub variant: PhaseVariant,
    action: Action,
    filter: Filter,
    /// Keys of phases that must have run first. Resolved recursively and
    /// de-duplicated when the phase is invoked directly.
    pub mandatory_phases: Vec<String>,
    /// Once this phase actually executes, all later scheduled work halts.
    pub terminating: bool,
    /// Always executes, even where resume logic would otherwise skip it.
    /// Mandatory phases re-establish in-memory state that is never
    /// persisted (derived configuration, version numbers).
    pub is_mandatory: bool,
}

impl fmt::Debug for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Phase")
            .field("key", &self.key)
            .field("variant", &self.variant)
            .field("terminating", &self.terminating)
            .field("is_mandatory", &self.is_mandatory)
            .finish_non_exhaustive()
    }
}

impl Phase {
    /// Create a project-variant phase.
    pub fn project(key: &str, name: &str, action: ProjectAction) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            variant: PhaseVariant::Project,
            action: Action::Project(action),
            filter: Filter::None,
            mandatory_phases: Vec::new(),
            terminating: false,
            is_mandatory: false,
        }
    }

    /// Create a package-variant phase.
    pub fn package(key: &str, name: &str, action: PackageAction) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            variant: PhaseVariant::Package,
            action: Action::Package(action),
            filter: Filter::None,
            mandatory_phases: Vec::new(),
            terminating: false,
            is_mandatory: false,
        }
    }

    /// Create a package-variant phase that requires compiled output.
    pub fn package_with_output(key: &str, name: &str, action: PackageAction) -> Self {
        let mut phase = Self::package(key, name, action);
        phase.variant = PhaseVariant::PackageWithOutput;
        phase
    }

    /// Set the project filter.
    pub fn with_project_filter(mut self, filter: ProjectFilter) -> Self {
        self.filter = Filter::Project(filter);
        self
    }

    /// Set the package filter.
    pub fn with_package_filter(mut self, filter: PackageFilter) -> Self {
        self.filter = Filter::Package(filter);
        self
    }

    /// Set the phases that must have run before this one.
    pub fn with_mandatory_phases(mut self, keys: &[&str]) -> Self {
        self.mandatory_phases = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    /// Mark this phase as terminating.
    pub fn terminating(mut self) -> Self {
        self.terminating = true;
        self
    }

    /// Mark this phase as mandatory.
    pub fn mandatory(mut self) -> Self {
        self.is_mandatory = true;
        self
    }

    /// Evaluate the filter for a project phase.
    pub fn project_filter_passes(&self) -> bool {
        match &self.filter {
            Filter::Project(f) => f(),
            _ => true,
        }
    }

    /// Evaluate the filter for a package phase against one package.
    ///
    /// `PackageWithOutput` phases additionally require the package to have
    /// an output path.
    pub fn package_filter_passes(&self, package: &Package) -> bool {
        if self.variant == PhaseVariant::PackageWithOutput && package.output.is_none() {
            return false;
        }
        match &self.filter {
            Filter::Package(f) => f(package),
            _ => true,
        }
    }

    /// Invoke the project action.
    pub fn run_project_action(&self) -> BoxFuture<'static, Result<()>> {
        match &self.action {
            Action::Project(action) => action(),
            Action::Package(_) => {
                Box::pin(async { anyhow::bail!("package phase invoked without a package") })
            }
        }
    }

    /// Invoke the package action for one package.
    pub fn run_package_action(
        &self,
        package: Arc<Package>,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<()>> {
        match &self.action {
            Action::Package(action) => action(package, cancel),
            Action::Project(_) => {
                Box::pin(async { anyhow::bail!("project phase invoked with a package") })
            }
        }
    }
}

/// Ordered list of registered phases.
///
/// Registration order is execution priority; contiguous same-variant runs
/// form the scheduler's batches.
#[derive(Debug, Default)]
pub struct PhaseRegistry {
    phases: Vec<Arc<Phase>>,
}

impl PhaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a phase to the ordered registry.
    pub fn register(&mut self, phase: Phase) {
        self.phases.push(Arc::new(phase));
    }

    pub fn phases(&self) -> &[Arc<Phase>] {
        &self.phases
    }

    pub fn get(&self, key: &str) -> Option<Arc<Phase>> {
        self.phases.iter().find(|p| p.key == key).cloned()
    }

    /// Recursively expand a phase's mandatory prerequisites.
    ///
    /// The result is flattened and de-duplicated by key, first occurrence
    /// wins. Reversing the list places the deepest prerequisite first.
    /// Idempotent and order-stable across repeated calls.
    pub fn resolve_all_mandatory_phases(&self, phase: &Phase) -> Result<Vec<Arc<Phase>>> {
        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(phase.key.clone());
        let mut resolved = Vec::new();
        self.expand_mandatory(phase, &mut seen, &mut resolved)?;
        Ok(resolved)
    }

    fn expand_mandatory(
        &self,
        phase: &Phase,
        seen: &mut HashSet<String>,
        out: &mut Vec<Arc<Phase>>,
    ) -> Result<()> {
        for key in &phase.mandatory_phases {
            let dep = self
                .get(key)
                .ok_or_else(|| EngineError::UnknownPhase { key: key.clone() })?;
            if !seen.insert(dep.key.clone()) {
                continue;
            }
            out.push(dep.clone());
            self.expand_mandatory(&dep, seen, out)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn noop_project() -> ProjectAction {
        Arc::new(|| Box::pin(async { Ok(()) }))
    }

    pub(crate) fn noop_package() -> PackageAction {
        Arc::new(|_, _| Box::pin(async { Ok(()) }))
    }

    #[test]
    fn test_variant_batching() {
        assert!(!PhaseVariant::Project.is_per_package());
        assert!(PhaseVariant::Package.is_per_package());
        assert!(PhaseVariant::PackageWithOutput.is_per_package());
    }

    #[test]
    fn test_default_filters_pass() {
        let project = Phase::project("a", "A", noop_project());
        assert!(project.project_filter_passes());

        let pkg_phase = Phase::package("b", "B", noop_package());
        let pkg = Package::new(
            "x",
            std::path::PathBuf::from("/repo/x"),
            crate::package::PackageVariant::Lib,
            Default::default(),
        );
        assert!(pkg_phase.package_filter_passes(&pkg));
    }

    #[test]
    fn test_package_with_output_requires_output() {
        let phase = Phase::package_with_output("compile", "Compile", noop_package());

        let sourceless = Package::new(
            "cfg",
            std::path::PathBuf::from("/repo/cfg"),
            crate::package::PackageVariant::Sourceless,
            Default::default(),
        );
        assert!(!phase.package_filter_passes(&sourceless));

        let lib = Package::new(
            "lib",
            std::path::PathBuf::from("/repo/lib"),
            crate::package::PackageVariant::Lib,
            Default::default(),
        );
        assert!(phase.package_filter_passes(&lib));
    }

    #[test]
    fn test_registry_order_and_lookup() {
        let mut registry = PhaseRegistry::new();
        registry.register(Phase::project("a", "A", noop_project()));
        registry.register(Phase::package("b", "B", noop_package()));

        let keys: Vec<&str> = registry.phases().iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert!(registry.get("b").is_some());
        assert!(registry.get("z").is_none());
    }

    #[test]
    fn test_resolve_mandatory_recursive_dedup() {
        let mut registry = PhaseRegistry::new();
        registry.register(Phase::project("config", "Config", noop_project()));
        registry.register(
            Phase::package("install", "Install", noop_package()).with_mandatory_phases(&["config"]),
        );
        registry.register(
            Phase::package_with_output("compile", "Compile", noop_package())
                .with_mandatory_phases(&["install", "config"]),
        );

        let compile = registry.get("compile").unwrap();
        let resolved = registry.resolve_all_mandatory_phases(&compile).unwrap();
        let keys: Vec<&str> = resolved.iter().map(|p| p.key.as_str()).collect();
        // First occurrence wins: install first, its own prerequisite next,
        // and the duplicate "config" reference collapses.
        assert_eq!(keys, vec!["install", "config"]);

        // Reversed, the deepest prerequisite comes first.
        let mut chain = resolved.clone();
        chain.reverse();
        assert_eq!(chain[0].key, "config");
    }

    #[test]
    fn test_resolve_mandatory_idempotent() {
        let mut registry = PhaseRegistry::new();
        registry.register(Phase::project("a", "A", noop_project()));
        registry
            .register(Phase::package("b", "B", noop_package()).with_mandatory_phases(&["a"]));

        let b = registry.get("b").unwrap();
        let first = registry.resolve_all_mandatory_phases(&b).unwrap();
        let second = registry.resolve_all_mandatory_phases(&b).unwrap();
        let keys = |v: &[Arc<Phase>]| v.iter().map(|p| p.key.clone()).collect::<Vec<_>>();
        assert_eq!(keys(&first), keys(&second));
    }

    #[test]
    fn test_resolve_mandatory_unknown_key_fails() {
        let mut registry = PhaseRegistry::new();
        registry.register(
            Phase::package("b", "B", noop_package()).with_mandatory_phases(&["missing"]),
        );

        let b = registry.get("b").unwrap();
        let err = registry.resolve_all_mandatory_phases(&b).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_resolve_mandatory_tolerates_mutual_references() {
        // a and b name each other; first-occurrence de-dup keeps this finite.
        let mut registry = PhaseRegistry::new();
        registry
            .register(Phase::project("a", "A", noop_project()).with_mandatory_phases(&["b"]));
        registry
            .register(Phase::project("b", "B", noop_project()).with_mandatory_phases(&["a"]));

        let a = registry.get("a").unwrap();
        let resolved = registry.resolve_all_mandatory_phases(&a).unwrap();
        let keys: Vec<&str> = resolved.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["b"]);
    }
}
