//! On-demand progress computation; never persisted.
use super::{ExecutionStatus, Workflow};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressSummary {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Completed plus skipped, as a share of the plan.
    pub percent_complete: f64,
    pub execution_time_seconds: f64,
    pub files_processed: u64,
    pub files_modified: u64,
}

/// Summarize module states. An empty plan is 100% complete.
pub fn progress_summary(workflow: &Workflow) -> ProgressSummary {
    let mut summary = ProgressSummary {
        total: workflow.ordered_module_plan.len(),
        ..ProgressSummary::default()
    };
    for entry in &workflow.ordered_module_plan {
        let Some(state) = workflow.state(&entry.name) else {
            summary.pending += 1;
            continue;
        };
        match state.status {
            ExecutionStatus::Pending => summary.pending += 1,
            ExecutionStatus::Running => summary.running += 1,
            ExecutionStatus::Completed => summary.completed += 1,
            ExecutionStatus::Failed => summary.failed += 1,
            ExecutionStatus::Skipped => summary.skipped += 1,
        }
        summary.execution_time_seconds += state.execution_time_seconds;
        summary.files_processed += state.files_processed;
        summary.files_modified += state.files_modified;
    }
    summary.percent_complete = if summary.total == 0 {
        100.0
    } else {
        (summary.completed + summary.skipped) as f64 * 100.0 / summary.total as f64
    };
    summary
}
