pub mod backoff;
pub mod cache;
pub mod link;
pub mod matcher;
pub mod orchestrator;
pub mod queue;

pub use orchestrator::{
    MountFailure, MountSpec, Mounts, RunStats, RunSummary, SyncError, SyncOptions,
    SyncOrchestrator,
};
