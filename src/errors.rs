//! Typed error hierarchy for the Stratum engine.
//!
//! Two top-level enums cover the two failure domains:
//! - `GraphError` — dependency-graph construction failures
//! - `EngineError` — scheduling and execution failures
//!
//! Action errors raised by injected phase actions travel as `anyhow::Error`
//! and abort the chain; they are not enumerated here.

use thiserror::Error;

/// Errors raised while building the package dependency graph.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Cyclic dependency detected involving package '{package}'")]
    CyclicDependency { package: String },

    #[error("Duplicate package name '{name}' (at {first} and {second})")]
    DuplicatePackage {
        name: String,
        first: std::path::PathBuf,
        second: std::path::PathBuf,
    },
}

/// Errors raised by the scheduler and executor.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Unknown phase key '{key}'")]
    UnknownPhase { key: String },

    #[error("Execution cancelled")]
    Cancelled,

    #[error("Failed to persist running status at {path}: {source}")]
    CheckpointWrite {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    /// Whether this error is a cooperative cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Check whether an `anyhow::Error` carries a cooperative cancellation.
pub fn is_cancellation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<EngineError>()
        .is_some_and(EngineError::is_cancelled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cyclic_dependency_names_the_package() {
        let err = GraphError::CyclicDependency {
            package: "lib-core".to_string(),
        };
        assert!(err.to_string().contains("lib-core"));
    }

    #[test]
    fn unknown_phase_carries_key() {
        let err = EngineError::UnknownPhase {
            key: "compile".to_string(),
        };
        match &err {
            EngineError::UnknownPhase { key } => assert_eq!(key, "compile"),
            _ => panic!("Expected UnknownPhase"),
        }
        assert!(err.to_string().contains("compile"));
    }

    #[test]
    fn cancellation_is_detectable_through_anyhow() {
        let err: anyhow::Error = EngineError::Cancelled.into();
        assert!(is_cancellation(&err));

        let other: anyhow::Error = anyhow::anyhow!("compile failed");
        assert!(!is_cancellation(&other));
    }

    #[test]
    fn graph_error_converts_into_engine_error() {
        let inner = GraphError::CyclicDependency {
            package: "app".to_string(),
        };
        let engine: EngineError = inner.into();
        assert!(matches!(engine, EngineError::Graph(_)));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&GraphError::CyclicDependency {
            package: "x".into(),
        });
        assert_std_error(&EngineError::Cancelled);
    }
}
