//! Watch mode: filesystem changes trigger scoped recompiles.
//!
//! A `notify` watcher feeds change events into a tokio channel; the
//! controller debounces them, resolves the owning package by
//! longest-path-prefix, and re-invokes the executor for the compile phase
//! seeded at the affected package's dependency level, so earlier levels are
//! assumed already built.
//!
//! The controller is a three-state machine: `Idle` (watching), `Compiling`
//! (a run is in flight) and `Aborting` (the in-flight run was cancelled and
//! a newer change is queued behind it). A cancelled run never resets the
//! status board; only the run that actually finishes does, so a superseded
//! run cannot flicker every package back to Watching while newer work is
//! pending. Compile failures mark the affected packages Errored and watching
//! continues.

use crate::checkpoint::RunningStatus;
use crate::executor::Executor;
use crate::package::Package;
use anyhow::{Context, Result};
use notify::{EventKind, RecursiveMode, Watcher};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Quiet period collapsing bursts of filesystem events into one recompile.
pub const WATCH_DEBOUNCE: Duration = Duration::from_millis(100);

const COMPILE_PHASE: &str = "compile";

/// A single filesystem change, already flattened from the watcher backend.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub removed: bool,
}

/// Per-package display status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageStatus {
    Watching,
    Compiling,
    Errored,
}

/// Shared per-package status map, updated by the controller.
#[derive(Debug, Default)]
pub struct StatusBoard {
    inner: Mutex<BTreeMap<String, PackageStatus>>,
}

impl StatusBoard {
    fn seed<'a>(&self, names: impl Iterator<Item = &'a str>) {
        let mut inner = self.inner.lock().unwrap();
        for name in names {
            inner.insert(name.to_string(), PackageStatus::Watching);
        }
    }

    fn set(&self, name: &str, status: PackageStatus) {
        self.inner
            .lock()
            .unwrap()
            .insert(name.to_string(), status);
    }

    fn set_all(&self, status: PackageStatus) {
        for value in self.inner.lock().unwrap().values_mut() {
            *value = status;
        }
    }

    pub fn snapshot(&self) -> BTreeMap<String, PackageStatus> {
        self.inner.lock().unwrap().clone()
    }
}

enum ControllerState {
    Idle,
    Compiling,
    Aborting,
}

/// Scope of a pending recompile: affected packages and the starting level.
#[derive(Debug)]
struct RecompileScope {
    packages: BTreeSet<String>,
    level: usize,
}

impl RecompileScope {
    fn merge(&mut self, other: RecompileScope) {
        self.packages.extend(other.packages);
        self.level = self.level.min(other.level);
    }
}

struct RunOutcome {
    packages: BTreeSet<String>,
    token: CancellationToken,
    result: Result<()>,
}

/// Drives watch mode over an executor and its package graph.
pub struct WatchController {
    executor: Arc<Executor>,
    board: Arc<StatusBoard>,
    debounce: Duration,
}

impl WatchController {
    pub fn new(executor: Arc<Executor>) -> Self {
        let board = Arc::new(StatusBoard::default());
        board.seed(executor.graph().packages().iter().map(|p| p.name.as_str()));
        Self {
            executor,
            board,
            debounce: WATCH_DEBOUNCE,
        }
    }

    /// Override the debounce window.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn status_board(&self) -> Arc<StatusBoard> {
        self.board.clone()
    }

    /// Watch every package directory until the process is stopped.
    pub async fn run(&self) -> Result<()> {
        let (tx, rx) = mpsc::channel::<ChangeEvent>(256);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    let removed = matches!(event.kind, EventKind::Remove(_));
                    if !removed
                        && !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
                    {
                        return;
                    }
                    for path in event.paths {
                        let _ = tx.blocking_send(ChangeEvent { path, removed });
                    }
                }
                Err(e) => warn!(error = %e, "file watcher error"),
            }
        })
        .context("Failed to create file watcher")?;

        for package in self.executor.graph().packages() {
            watcher
                .watch(&package.path, RecursiveMode::Recursive)
                .with_context(|| format!("Failed to watch {}", package.path.display()))?;
        }
        info!(
            packages = self.executor.graph().packages().len(),
            "watching for changes"
        );

        self.event_loop(rx).await
    }

    /// The controller state machine. Runs until the change channel closes.
    pub async fn event_loop(&self, mut changes: mpsc::Receiver<ChangeEvent>) -> Result<()> {
        let (done_tx, mut done_rx) = mpsc::channel::<RunOutcome>(4);
        let mut state = ControllerState::Idle;
        let mut current: Option<CancellationToken> = None;
        let mut pending: Option<RecompileScope> = None;

        loop {
            tokio::select! {
                maybe = changes.recv() => {
                    let Some(first) = maybe else {
                        // Change source closed; let the in-flight run and
                        // anything queued behind it settle before exiting.
                        while current.is_some() {
                            let Some(outcome) = done_rx.recv().await else {
                                break;
                            };
                            current = None;
                            self.finish_run(&outcome);
                            if let Some(scope) = pending.take() {
                                current = Some(self.spawn_run(scope, done_tx.clone()));
                            }
                        }
                        return Ok(());
                    };
                    let batch = debounced_batch(first, &mut changes, self.debounce).await;
                    let Some(scope) = self.resolve_scope(&batch) else {
                        continue;
                    };
                    match state {
                        ControllerState::Idle => {
                            current = Some(self.spawn_run(scope, done_tx.clone()));
                            state = ControllerState::Compiling;
                        }
                        ControllerState::Compiling => {
                            if let Some(token) = &current {
                                token.cancel();
                            }
                            merge_pending(&mut pending, scope);
                            state = ControllerState::Aborting;
                        }
                        ControllerState::Aborting => merge_pending(&mut pending, scope),
                    }
                }
                Some(outcome) = done_rx.recv() => {
                    current = None;
                    self.finish_run(&outcome);
                    if let Some(scope) = pending.take() {
                        current = Some(self.spawn_run(scope, done_tx.clone()));
                        state = ControllerState::Compiling;
                    } else {
                        state = ControllerState::Idle;
                    }
                }
            }
        }
    }

    /// Map a batch of raw events to the packages and starting level of the
    /// recompile they call for. Paths owned by no package, and paths inside
    /// a package's own output directory, are ignored.
    fn resolve_scope(&self, events: &[ChangeEvent]) -> Option<RecompileScope> {
        let graph = self.executor.graph();
        let mut packages = BTreeSet::new();
        let mut level: Option<usize> = None;

        for event in events {
            let Some(package) = graph.package_for_path(&event.path) else {
                debug!(path = %event.path.display(), "change outside any package");
                continue;
            };
            if package
                .output
                .as_ref()
                .is_some_and(|out| event.path.starts_with(out))
            {
                continue;
            }
            if event.removed
                && let Err(e) = remove_artifacts(package, &event.path)
            {
                warn!(package = %package.name, error = %e, "failed to remove stale artifacts");
            }
            packages.insert(package.name.clone());
            if let Some(l) = graph.level_of(&package.name) {
                level = Some(level.map_or(l, |current| current.min(l)));
            }
        }

        level.map(|level| RecompileScope { packages, level })
    }

    fn spawn_run(&self, scope: RecompileScope, done: mpsc::Sender<RunOutcome>) -> CancellationToken {
        let token = CancellationToken::new();
        for name in &scope.packages {
            self.board.set(name, PackageStatus::Compiling);
        }
        info!(packages = ?scope.packages, level = scope.level, "recompiling");

        let executor = self.executor.clone();
        let run_token = token.clone();
        tokio::spawn(async move {
            let result = executor
                .execute_phase(
                    COMPILE_PHASE,
                    Some(RunningStatus::package(COMPILE_PHASE, scope.level)),
                    run_token.clone(),
                )
                .await;
            let _ = done
                .send(RunOutcome {
                    packages: scope.packages,
                    token: run_token,
                    result,
                })
                .await;
        });
        token
    }

    fn finish_run(&self, outcome: &RunOutcome) {
        // A cancelled run was superseded: newer work owns the board now.
        if outcome.token.is_cancelled() {
            debug!(packages = ?outcome.packages, "superseded run settled");
            return;
        }
        match &outcome.result {
            Ok(()) => {
                info!(packages = ?outcome.packages, "recompile finished");
                self.board.set_all(PackageStatus::Watching);
            }
            Err(e) => {
                warn!(packages = ?outcome.packages, error = %e, "recompile failed, still watching");
                self.board.set_all(PackageStatus::Watching);
                for name in &outcome.packages {
                    self.board.set(name, PackageStatus::Errored);
                }
            }
        }
    }
}

fn merge_pending(pending: &mut Option<RecompileScope>, scope: RecompileScope) {
    match pending {
        Some(existing) => existing.merge(scope),
        None => *pending = Some(scope),
    }
}

/// Collect the events of one burst: the first event plus everything that
/// arrives within the quiet window.
async fn debounced_batch(
    first: ChangeEvent,
    changes: &mut mpsc::Receiver<ChangeEvent>,
    debounce: Duration,
) -> Vec<ChangeEvent> {
    let mut batch = vec![first];
    tokio::time::sleep(debounce).await;
    while let Ok(event) = changes.try_recv() {
        batch.push(event);
    }
    batch
}

/// Remove the compiled artifacts corresponding to a deleted source path.
///
/// Outputs mirror the source layout with the conventional `src/` prefix
/// stripped; TypeScript sources additionally map to their emitted `.js` and
/// `.d.ts` files.
fn remove_artifacts(package: &Package, changed: &Path) -> Result<()> {
    let Some(output) = &package.output else {
        return Ok(());
    };
    let Ok(rel) = changed.strip_prefix(&package.path) else {
        return Ok(());
    };
    let rel = rel.strip_prefix("src").unwrap_or(rel);

    let mut candidates = vec![output.join(rel)];
    if let Some(ext) = rel.extension().and_then(|e| e.to_str())
        && matches!(ext, "ts" | "tsx")
    {
        candidates.push(output.join(rel.with_extension("js")));
        candidates.push(output.join(rel.with_extension("d.ts")));
    }

    for candidate in candidates {
        if candidate.is_dir() {
            fs::remove_dir_all(&candidate)
                .with_context(|| format!("Failed to remove {}", candidate.display()))?;
            debug!(path = %candidate.display(), "removed stale artifact directory");
        } else if candidate.exists() {
            fs::remove_file(&candidate)
                .with_context(|| format!("Failed to remove {}", candidate.display()))?;
            debug!(path = %candidate.display(), "removed stale artifact");
        }
    }
    Ok(())
}
