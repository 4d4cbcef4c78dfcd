//! Named, resumable workflows and their on-disk store.
//!
//! A workflow is mutated one transition at a time and persisted after each,
//! so a later process can pick up exactly where the previous one stopped.
mod migrate;
mod progress;
mod store;
mod types;

pub use progress::progress_summary;
pub use store::{NewWorkflow, WorkflowStore};
pub use types::{
    ExecutionStatus, ModuleExecutionState, NextModule, PlannedModule, Workflow, WorkflowStatus,
    WORKFLOW_SCHEMA_VERSION,
};

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch; a clock before 1970 reads as zero.
pub fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}
