//! stratum — monorepo build orchestration engine.
//!
//! Packages declare dependencies on one another through their manifests;
//! the grapher arranges them into dependency levels, the scheduler groups
//! registered phases into batches, and the executor runs batches with
//! checkpointed, resumable progress. Watch mode recompiles only what
//! changed, cancelling superseded work.

pub mod checkpoint;
pub mod config;
pub mod errors;
pub mod executor;
pub mod graph;
pub mod manifest;
pub mod package;
pub mod phase;
pub mod scheduler;
pub mod script;
pub mod watch;
