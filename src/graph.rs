//! Dependency grapher: arranges packages into ordered dependency levels.
//!
//! Each package's level is `0` when it has no in-repo dependency, otherwise
//! `1 + max(level of its dependencies)`, computed by memoized depth-first
//! recursion that carries the current recursion path. Re-entering a package
//! already on the path is a fatal `CyclicDependency` error naming that
//! package. Variants that cannot express cross-package dependencies are
//! appended as one final extra level after all graph-derived levels.
//!
//! The invariant consumers rely on: every package's declared dependencies
//! resolve to packages in strictly lower levels, so all packages within one
//! level are safe to process concurrently.

use crate::errors::GraphError;
use crate::package::Package;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// A layer of packages with no inter-dependency.
#[derive(Debug, Clone)]
pub struct DependencyLevel {
    pub packages: Vec<Arc<Package>>,
}

impl DependencyLevel {
    pub fn names(&self) -> Vec<&str> {
        self.packages.iter().map(|p| p.name.as_str()).collect()
    }
}

/// The resolved package graph: all packages plus their ordered levels.
///
/// Built once at startup and passed explicitly into the scheduler, executor
/// and watch controller.
#[derive(Debug)]
pub struct PackageGraph {
    packages: Vec<Arc<Package>>,
    levels: Vec<DependencyLevel>,
    level_by_name: HashMap<String, usize>,
}

impl PackageGraph {
    /// Build the graph from the flat package list.
    pub fn build(packages: Vec<Package>) -> Result<Self, GraphError> {
        let packages: Vec<Arc<Package>> = packages.into_iter().map(Arc::new).collect();

        let mut by_name: HashMap<&str, &Arc<Package>> = HashMap::new();
        for pkg in &packages {
            if let Some(existing) = by_name.insert(&pkg.name, pkg) {
                return Err(GraphError::DuplicatePackage {
                    name: pkg.name.clone(),
                    first: existing.path.clone(),
                    second: pkg.path.clone(),
                });
            }
        }

        let mut memo: HashMap<String, usize> = HashMap::new();
        let mut max_level = 0usize;
        for pkg in &packages {
            if !pkg.variant.participates_in_graph() {
                continue;
            }
            let level = compute_level(pkg, &by_name, &mut memo, &mut Vec::new())?;
            max_level = max_level.max(level);
        }

        // Bucket participants by level, ascending. Registration order within
        // a level follows the input package order.
        let mut buckets: Vec<Vec<Arc<Package>>> = vec![Vec::new(); max_level + 1];
        let mut extra: Vec<Arc<Package>> = Vec::new();
        for pkg in &packages {
            if pkg.variant.participates_in_graph() {
                buckets[memo[&pkg.name]].push(pkg.clone());
            } else {
                extra.push(pkg.clone());
            }
        }

        let mut levels: Vec<DependencyLevel> = buckets
            .into_iter()
            .filter(|b| !b.is_empty())
            .map(|packages| DependencyLevel { packages })
            .collect();
        if !extra.is_empty() {
            levels.push(DependencyLevel { packages: extra });
        }

        let mut level_by_name = HashMap::new();
        for (i, level) in levels.iter().enumerate() {
            for pkg in &level.packages {
                level_by_name.insert(pkg.name.clone(), i);
            }
        }

        Ok(Self {
            packages,
            levels,
            level_by_name,
        })
    }

    pub fn packages(&self) -> &[Arc<Package>] {
        &self.packages
    }

    pub fn levels(&self) -> &[DependencyLevel] {
        &self.levels
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Level index for a package name.
    pub fn level_of(&self, name: &str) -> Option<usize> {
        self.level_by_name.get(name).copied()
    }

    /// Look up a package by name.
    pub fn get(&self, name: &str) -> Option<&Arc<Package>> {
        self.packages.iter().find(|p| p.name == name)
    }

    /// Resolve the package owning a filesystem path by longest-path-prefix
    /// match against known package paths.
    pub fn package_for_path(&self, path: &Path) -> Option<&Arc<Package>> {
        self.packages
            .iter()
            .filter(|p| path.starts_with(&p.path))
            .max_by_key(|p| p.path.as_os_str().len())
    }
}

/// Memoized DFS carrying the current recursion path.
fn compute_level(
    pkg: &Arc<Package>,
    by_name: &HashMap<&str, &Arc<Package>>,
    memo: &mut HashMap<String, usize>,
    path: &mut Vec<String>,
) -> Result<usize, GraphError> {
    if let Some(&level) = memo.get(&pkg.name) {
        return Ok(level);
    }
    if path.contains(&pkg.name) {
        return Err(GraphError::CyclicDependency {
            package: pkg.name.clone(),
        });
    }
    path.push(pkg.name.clone());

    let mut level = 0usize;
    for dep in &pkg.dependencies {
        // Unknown names are external, already-published dependencies.
        let Some(dep_pkg) = by_name.get(dep.as_str()) else {
            continue;
        };
        if !dep_pkg.variant.participates_in_graph() {
            continue;
        }
        level = level.max(1 + compute_level(dep_pkg, by_name, memo, path)?);
    }

    path.pop();
    memo.insert(pkg.name.clone(), level);
    Ok(level)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::PackageVariant;
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    fn pkg(name: &str, deps: &[&str]) -> Package {
        pkg_variant(name, deps, PackageVariant::Lib)
    }

    fn pkg_variant(name: &str, deps: &[&str], variant: PackageVariant) -> Package {
        let deps: BTreeSet<String> = deps.iter().map(|s| s.to_string()).collect();
        Package::new(name, PathBuf::from(format!("/repo/{name}")), variant, deps)
    }

    #[test]
    fn test_single_package_single_level() {
        let graph = PackageGraph::build(vec![pkg("a", &[])]).unwrap();
        assert_eq!(graph.levels().len(), 1);
        assert_eq!(graph.levels()[0].names(), vec!["a"]);
    }

    #[test]
    fn test_diamond_levels() {
        // a <- (b, c) <- d
        let graph = PackageGraph::build(vec![
            pkg("a", &[]),
            pkg("b", &["a"]),
            pkg("c", &["a"]),
            pkg("d", &["b", "c"]),
        ])
        .unwrap();

        assert_eq!(graph.levels().len(), 3);
        assert_eq!(graph.levels()[0].names(), vec!["a"]);
        assert_eq!(graph.levels()[1].names(), vec!["b", "c"]);
        assert_eq!(graph.levels()[2].names(), vec!["d"]);
    }

    #[test]
    fn test_every_dependency_in_strictly_lower_level() {
        let graph = PackageGraph::build(vec![
            pkg("a", &[]),
            pkg("b", &["a"]),
            pkg("c", &["a", "b"]),
            pkg("d", &["c"]),
            pkg("e", &[]),
        ])
        .unwrap();

        for level in graph.levels() {
            for p in &level.packages {
                let own = graph.level_of(&p.name).unwrap();
                for dep in &p.dependencies {
                    if let Some(dep_level) = graph.level_of(dep) {
                        assert!(dep_level < own, "{dep} must sit below {}", p.name);
                    }
                }
            }
        }
    }

    #[test]
    fn test_cycle_detection_names_a_member() {
        let result = PackageGraph::build(vec![
            pkg("a", &["c"]),
            pkg("b", &["a"]),
            pkg("c", &["b"]),
        ]);

        let err = result.unwrap_err();
        match err {
            GraphError::CyclicDependency { ref package } => {
                assert!(["a", "b", "c"].contains(&package.as_str()));
            }
            _ => panic!("Expected CyclicDependency, got {err:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let result = PackageGraph::build(vec![pkg("a", &["a"])]);
        assert!(matches!(
            result,
            Err(GraphError::CyclicDependency { .. })
        ));
    }

    #[test]
    fn test_unknown_dependency_ignored() {
        // "react" is not an in-repo package; treat it as external.
        let graph = PackageGraph::build(vec![pkg("a", &["react"]), pkg("b", &["a"])]).unwrap();
        assert_eq!(graph.levels().len(), 2);
        assert_eq!(graph.level_of("a"), Some(0));
        assert_eq!(graph.level_of("b"), Some(1));
    }

    #[test]
    fn test_non_graph_variant_appended_as_final_level() {
        let graph = PackageGraph::build(vec![
            pkg("a", &[]),
            pkg("b", &["a"]),
            pkg_variant("tooling-py", &[], PackageVariant::Python),
        ])
        .unwrap();

        assert_eq!(graph.levels().len(), 3);
        assert_eq!(graph.levels()[2].names(), vec!["tooling-py"]);
        assert_eq!(graph.level_of("tooling-py"), Some(2));
    }

    #[test]
    fn test_duplicate_package_name_rejected() {
        let result = PackageGraph::build(vec![pkg("a", &[]), pkg("a", &[])]);
        assert!(matches!(result, Err(GraphError::DuplicatePackage { .. })));
    }

    #[test]
    fn test_package_for_path_longest_prefix() {
        let mut nested = pkg("a-nested", &[]);
        nested.path = PathBuf::from("/repo/a/nested");
        let graph = PackageGraph::build(vec![pkg("a", &[]), nested]).unwrap();

        let owner = graph
            .package_for_path(Path::new("/repo/a/nested/src/index.ts"))
            .unwrap();
        assert_eq!(owner.name, "a-nested");

        let owner = graph
            .package_for_path(Path::new("/repo/a/src/index.ts"))
            .unwrap();
        assert_eq!(owner.name, "a");

        assert!(graph.package_for_path(Path::new("/elsewhere")).is_none());
    }

    #[test]
    fn test_empty_graph() {
        let graph = PackageGraph::build(vec![]).unwrap();
        assert!(graph.is_empty());
        assert!(graph.levels().is_empty());
    }
}
