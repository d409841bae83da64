//! Batch construction over the ordered phase list.
//!
//! The scheduler groups contiguous same-kind phases into batches in a single
//! forward scan:
//!
//! 1. A phase joins the current batch when the batch is empty or the phase's
//!    kind matches the batch's kind.
//! 2. A project phase whose filter evaluates false is dropped without
//!    breaking the batch; project phases are individually optional.
//! 3. A kind mismatch ends the batch and starts the next one.
//! 4. A batch containing a terminating phase is flagged; the executor halts
//!    the remaining batches once such a batch actually executes something.
//! 5. A batch reduced to empty yields nothing.
//!
//! Filter and terminating evaluation happen here, at construction time; the
//! decision to actually run a batch happens at execution time. That
//! separation decouples "what could run" from "whether it still should."

use crate::phase::{Phase, PhaseVariant};
use std::sync::Arc;
use tracing::debug;

/// How a batch is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    /// Phases run once, sequentially.
    Project,
    /// Phases run per package, level by level.
    Package,
}

impl From<PhaseVariant> for BatchKind {
    fn from(variant: PhaseVariant) -> Self {
        if variant.is_per_package() {
            Self::Package
        } else {
            Self::Project
        }
    }
}

/// A maximal contiguous run of same-kind phases, scheduled together.
/// Computed transiently per invocation, never persisted.
#[derive(Debug, Clone)]
pub struct Batch {
    pub kind: BatchKind,
    pub phases: Vec<Arc<Phase>>,
    /// True when any phase in the batch is terminating.
    pub terminating: bool,
}

impl Batch {
    fn new(kind: BatchKind) -> Self {
        Self {
            kind,
            phases: Vec::new(),
            terminating: false,
        }
    }

    fn push(&mut self, phase: Arc<Phase>) {
        self.terminating |= phase.terminating;
        self.phases.push(phase);
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn keys(&self) -> Vec<&str> {
        self.phases.iter().map(|p| p.key.as_str()).collect()
    }
}

/// Build the ordered batch list for a phase chain.
pub fn build_batches(phases: &[Arc<Phase>]) -> Vec<Batch> {
    let mut batches: Vec<Batch> = Vec::new();
    let mut current: Option<Batch> = None;

    for phase in phases {
        let kind = BatchKind::from(phase.variant);

        // Project phases are individually optional: a false filter drops
        // the phase without ending the current batch.
        if kind == BatchKind::Project && !phase.project_filter_passes() {
            debug!(phase = %phase.key, "project phase filtered out of schedule");
            continue;
        }

        match current.as_mut() {
            Some(batch) if batch.kind == kind => batch.push(phase.clone()),
            Some(batch) => {
                let finished = std::mem::replace(batch, Batch::new(kind));
                if !finished.is_empty() {
                    batches.push(finished);
                }
                batch.push(phase.clone());
            }
            None => {
                let mut batch = Batch::new(kind);
                batch.push(phase.clone());
                current = Some(batch);
            }
        }
    }

    if let Some(batch) = current
        && !batch.is_empty()
    {
        batches.push(batch);
    }

    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::{PackageAction, Phase, ProjectAction};
    use std::sync::Arc;

    fn project_action() -> ProjectAction {
        Arc::new(|| Box::pin(async { Ok(()) }))
    }

    fn package_action() -> PackageAction {
        Arc::new(|_, _| Box::pin(async { Ok(()) }))
    }

    fn project(key: &str) -> Arc<Phase> {
        Arc::new(Phase::project(key, key, project_action()))
    }

    fn package(key: &str) -> Arc<Phase> {
        Arc::new(Phase::package(key, key, package_action()))
    }

    #[test]
    fn test_contiguous_same_kind_share_a_batch() {
        let phases = vec![project("a"), project("b"), package("c"), package("d")];
        let batches = build_batches(&phases);

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].kind, BatchKind::Project);
        assert_eq!(batches[0].keys(), vec!["a", "b"]);
        assert_eq!(batches[1].kind, BatchKind::Package);
        assert_eq!(batches[1].keys(), vec!["c", "d"]);
    }

    #[test]
    fn test_kind_flip_starts_new_batch() {
        let phases = vec![project("a"), package("b"), project("c")];
        let batches = build_batches(&phases);

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].keys(), vec!["a"]);
        assert_eq!(batches[1].keys(), vec!["b"]);
        assert_eq!(batches[2].keys(), vec!["c"]);
    }

    #[test]
    fn test_package_with_output_groups_with_package() {
        let phases = vec![
            package("install"),
            Arc::new(Phase::package_with_output(
                "compile",
                "compile",
                package_action(),
            )),
        ];
        let batches = build_batches(&phases);

        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].keys(), vec!["install", "compile"]);
    }

    #[test]
    fn test_filtered_project_phase_does_not_break_batch() {
        let filtered = Arc::new(
            Phase::project("skipme", "skipme", project_action())
                .with_project_filter(Arc::new(|| false)),
        );
        let phases = vec![project("a"), filtered, project("b")];
        let batches = build_batches(&phases);

        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].keys(), vec!["a", "b"]);
    }

    #[test]
    fn test_all_filtered_yields_no_batch() {
        let phases: Vec<Arc<Phase>> = ["a", "b"]
            .iter()
            .map(|k| {
                Arc::new(
                    Phase::project(k, k, project_action())
                        .with_project_filter(Arc::new(|| false)),
                )
            })
            .collect();

        assert!(build_batches(&phases).is_empty());
    }

    #[test]
    fn test_terminating_flag_propagates_to_batch() {
        let phases = vec![
            project("a"),
            Arc::new(Phase::project("halt", "halt", project_action()).terminating()),
            package("c"),
        ];
        let batches = build_batches(&phases);

        assert_eq!(batches.len(), 2);
        assert!(batches[0].terminating);
        assert!(!batches[1].terminating);
    }

    #[test]
    fn test_package_phase_filters_not_evaluated_here() {
        // Package filters depend on a concrete package; construction keeps
        // the phase and defers the decision to the executor.
        let phases = vec![Arc::new(
            Phase::package("b", "b", package_action()).with_package_filter(Arc::new(|_| false)),
        )];
        let batches = build_batches(&phases);
        assert_eq!(batches.len(), 1);
    }

    #[test]
    fn test_empty_input() {
        assert!(build_batches(&[]).is_empty());
    }
}
