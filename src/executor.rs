//! Batch executor with resumable checkpoints.
//!
//! The executor consumes the scheduler's ordered batch list with an
//! iterative loop carrying an `ExecutionContext` that is created fresh per
//! invocation — the halt flag and resume marker never leak across calls.
//!
//! Project batches run their phases sequentially. Package batches iterate
//! dependency levels strictly in order: level N+1 never begins until every
//! package in level N has settled. Within one level all packages run
//! concurrently; a failing package does not cancel its siblings — the join
//! waits for everyone, then the first error aborts the chain.
//!
//! Resume rule (both batch kinds): while still behind the persisted resume
//! point, non-mandatory phases are skipped with a log line only; reaching
//! the exact persisted phase (and level, for package phases) clears the
//! marker and execution continues from there inclusive. Mandatory phases
//! always execute, because they re-establish in-memory state that is never
//! persisted.

use crate::checkpoint::{Checkpoint, RunningStatus};
use crate::errors::EngineError;
use crate::graph::PackageGraph;
use crate::package::Package;
use crate::phase::{Phase, PhaseRegistry};
use crate::scheduler::{Batch, BatchKind, build_batches};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Delay substituted for each action in dry-run mode.
pub const DRY_RUN_DELAY: Duration = Duration::from_millis(50);

/// External configuration toggles for the executor.
#[derive(Debug, Clone, Default)]
pub struct ExecutorOptions {
    /// Substitute a fixed delay for every action.
    pub dry_run: bool,
    /// Seed `execute` from the persisted checkpoint, if one exists.
    pub resume: bool,
}

/// Per-invocation scheduling state, threaded through the batch loop.
struct ExecutionContext {
    resume: Option<RunningStatus>,
    /// True while execution is still behind the resume point.
    resuming: bool,
    /// Set once a terminating batch executes; later batches are skipped.
    halt: bool,
    cancel: CancellationToken,
}

impl ExecutionContext {
    fn new(resume: Option<RunningStatus>, cancel: CancellationToken) -> Self {
        Self {
            resuming: resume.is_some(),
            resume,
            halt: false,
            cancel,
        }
    }

    /// Clear the resuming marker when execution reaches the persisted
    /// phase/level pair — the run has caught up.
    fn mark_if_resume_point(&mut self, phase_key: &str, level: Option<usize>) {
        if self.resuming
            && self
                .resume
                .as_ref()
                .is_some_and(|s| s.matches(phase_key, level))
        {
            self.resuming = false;
        }
    }

    /// Whether this phase is skipped by resume logic right now.
    fn skips(&self, phase: &Phase) -> bool {
        self.resuming && !phase.is_mandatory
    }

    fn ensure_not_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::Cancelled.into());
        }
        Ok(())
    }
}

/// Drives phase chains over the package graph.
pub struct Executor {
    graph: Arc<PackageGraph>,
    registry: PhaseRegistry,
    checkpoint: Checkpoint,
    options: ExecutorOptions,
}

impl Executor {
    pub fn new(
        graph: Arc<PackageGraph>,
        registry: PhaseRegistry,
        checkpoint: Checkpoint,
        options: ExecutorOptions,
    ) -> Self {
        Self {
            graph,
            registry,
            checkpoint,
            options,
        }
    }

    pub fn graph(&self) -> &Arc<PackageGraph> {
        &self.graph
    }

    pub fn registry(&self) -> &PhaseRegistry {
        &self.registry
    }

    /// Run the full registered chain from the start.
    ///
    /// With the resume toggle set, the persisted checkpoint seeds the skip
    /// logic. A fully successful run clears the checkpoint so the next
    /// resume invocation starts fresh.
    pub async fn execute(&self) -> Result<()> {
        let resume = if self.options.resume {
            self.checkpoint.read()
        } else {
            None
        };
        let phases: Vec<Arc<Phase>> = self.registry.phases().to_vec();
        self.execute_phases(&phases, resume, CancellationToken::new())
            .await?;
        self.checkpoint.clear()?;
        Ok(())
    }

    /// Resolve a single phase's mandatory prerequisite chain and run just
    /// that chain, deepest prerequisite first, optionally seeded with a
    /// resume status. Used by the watch controller.
    pub async fn execute_phase(
        &self,
        key: &str,
        previous: Option<RunningStatus>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let phase = self
            .registry
            .get(key)
            .ok_or_else(|| EngineError::UnknownPhase {
                key: key.to_string(),
            })?;

        let mut chain = self.registry.resolve_all_mandatory_phases(&phase)?;
        chain.reverse();
        chain.push(phase);
        self.execute_phases(&chain, previous, cancel).await
    }

    /// Run an explicit phase chain.
    pub async fn execute_phases(
        &self,
        phases: &[Arc<Phase>],
        resume: Option<RunningStatus>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let batches = build_batches(phases);
        let mut ctx = ExecutionContext::new(resume, cancel);

        for batch in &batches {
            if ctx.halt {
                info!(phases = ?batch.keys(), "terminating phase ran, skipping remaining batch");
                continue;
            }
            match batch.kind {
                BatchKind::Project => self.run_project_batch(batch, &mut ctx).await?,
                BatchKind::Package => self.run_package_batch(batch, &mut ctx).await?,
            }
        }
        Ok(())
    }

    async fn run_project_batch(&self, batch: &Batch, ctx: &mut ExecutionContext) -> Result<()> {
        let mut executed_any = false;

        for phase in &batch.phases {
            ctx.ensure_not_cancelled()?;
            ctx.mark_if_resume_point(&phase.key, None);

            if ctx.skips(phase) {
                info!(phase = %phase.key, "already completed in previous run, skipping");
                continue;
            }

            info!(phase = %phase.key, "running project phase");
            if self.options.dry_run {
                tokio::time::sleep(DRY_RUN_DELAY).await;
            } else {
                phase
                    .run_project_action()
                    .await
                    .with_context(|| format!("Project phase '{}' failed", phase.key))?;
            }
            executed_any = true;

            // Persisted after the action so a crash mid-phase resumes at
            // this same phase, not the next one.
            self.checkpoint.write(&RunningStatus::project(&phase.key))?;
        }

        if executed_any && batch.terminating {
            ctx.halt = true;
        }
        Ok(())
    }

    async fn run_package_batch(&self, batch: &Batch, ctx: &mut ExecutionContext) -> Result<()> {
        let mut executed_any = false;

        for (level_idx, level) in self.graph.levels().iter().enumerate() {
            ctx.ensure_not_cancelled()?;

            // Decide, per phase, whether resume logic still skips it at
            // this level. The decision applies uniformly to every package
            // in the level.
            let mut to_run: Vec<Arc<Phase>> = Vec::new();
            for phase in &batch.phases {
                ctx.mark_if_resume_point(&phase.key, Some(level_idx));
                if ctx.skips(phase) {
                    debug!(phase = %phase.key, level = level_idx, "behind resume point, skipping");
                    continue;
                }
                to_run.push(phase.clone());
            }
            if to_run.is_empty() {
                continue;
            }

            self.checkpoint
                .write(&RunningStatus::package(&to_run[0].key, level_idx))?;
            info!(
                level = level_idx,
                packages = ?level.names(),
                phases = ?to_run.iter().map(|p| p.key.as_str()).collect::<Vec<_>>(),
                "running package level"
            );

            // Fan out: every package in the level concurrently, each
            // running the batch's phases sequentially.
            let mut handles = Vec::with_capacity(level.packages.len());
            for package in &level.packages {
                handles.push(tokio::spawn(run_package_chain(
                    package.clone(),
                    to_run.clone(),
                    level_idx,
                    self.checkpoint.clone(),
                    self.options.dry_run,
                    ctx.cancel.clone(),
                )));
            }

            // Fan in: wait for every package to settle before judging the
            // level; sibling failures do not cancel each other.
            let mut first_error: Option<anyhow::Error> = None;
            for result in futures::future::join_all(handles).await {
                match result {
                    Ok(Ok(ran)) => executed_any |= ran,
                    Ok(Err(e)) => {
                        if first_error.is_none() {
                            first_error = Some(e);
                        }
                    }
                    Err(join_err) => {
                        if first_error.is_none() {
                            first_error = Some(join_err.into());
                        }
                    }
                }
            }
            if let Some(err) = first_error {
                return Err(err);
            }
        }

        if executed_any && batch.terminating {
            ctx.halt = true;
        }
        Ok(())
    }
}

/// Run a batch's phases sequentially for one package.
///
/// Each phase is gated by its own filter; the cancellation token is checked
/// between actions (granular, not pre-emptive). Returns whether any action
/// actually executed.
async fn run_package_chain(
    package: Arc<Package>,
    phases: Vec<Arc<Phase>>,
    level: usize,
    checkpoint: Checkpoint,
    dry_run: bool,
    cancel: CancellationToken,
) -> Result<bool> {
    let mut ran = false;

    for phase in &phases {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled.into());
        }
        if !phase.package_filter_passes(&package) {
            debug!(phase = %phase.key, package = %package.name, "filtered out");
            continue;
        }

        debug!(phase = %phase.key, package = %package.name, "running package phase");
        if dry_run {
            tokio::time::sleep(DRY_RUN_DELAY).await;
        } else {
            phase
                .run_package_action(package.clone(), cancel.clone())
                .await
                .with_context(|| {
                    format!("Phase '{}' failed for package '{}'", phase.key, package.name)
                })?;
        }
        ran = true;

        // Finer-grained than project phases: package actions are slower
        // and riskier, so checkpoint after every single one.
        checkpoint.write(&RunningStatus::package(&phase.key, level))?;
    }

    Ok(ran)
}
