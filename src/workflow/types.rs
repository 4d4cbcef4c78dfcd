//! Persisted workflow schema and its state transitions.
//!
//! A `Workflow` owns every `ModuleExecutionState`; the resolver's output is
//! copied into `ordered_module_plan` once, at creation.
use crate::config::ConfigMap;
use crate::error::FlowError;
use crate::modules::ExecutionResult;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

/// Current on-disk workflow format.
pub const WORKFLOW_SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Active,
    Completed,
    Failed,
    Paused,
}

impl WorkflowStatus {
    /// Return the stable string identifier used in JSON artifacts.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Active => "active",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Paused => "paused",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl ExecutionStatus {
    /// Return the stable string identifier used in JSON artifacts.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Skipped => "skipped",
        }
    }

    /// Dependents may run once a dependency reaches one of these.
    pub fn satisfies_dependents(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Skipped)
    }

    /// `Running` counts as runnable: an interrupted run is retried, never
    /// assumed complete.
    pub fn is_runnable(&self) -> bool {
        matches!(self, ExecutionStatus::Pending | ExecutionStatus::Running)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One plan entry, snapshotted from resolution when the workflow was created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedModule {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub interactive: bool,
    #[serde(default)]
    pub config: ConfigMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleExecutionState {
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_epoch_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at_epoch_ms: Option<u64>,
    #[serde(default)]
    pub files_processed: u64,
    #[serde(default)]
    pub files_modified: u64,
    #[serde(default)]
    pub execution_time_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
    /// Declared outputs, visible to dependents.
    #[serde(default, skip_serializing_if = "ConfigMap::is_empty")]
    pub outputs: ConfigMap,
}

impl ModuleExecutionState {
    pub fn pending() -> Self {
        Self {
            status: ExecutionStatus::Pending,
            started_at_epoch_ms: None,
            completed_at_epoch_ms: None,
            files_processed: 0,
            files_modified: 0,
            execution_time_seconds: 0.0,
            error_message: None,
            retry_count: 0,
            outputs: ConfigMap::new(),
        }
    }
}

/// Result of asking which module runs next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextModule {
    Ready(String),
    /// Every module completed or was skipped.
    Done,
    /// Progress needs human intervention on `failed_module`.
    Blocked {
        failed_module: String,
        waiting_module: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub schema_version: u32,
    pub name: String,
    pub root_directory: PathBuf,
    pub created_at_epoch_ms: u64,
    pub last_activity_at_epoch_ms: u64,
    pub status: WorkflowStatus,
    pub max_retries: u32,
    pub extensions: Vec<String>,
    pub ordered_module_plan: Vec<PlannedModule>,
    pub module_states: BTreeMap<String, ModuleExecutionState>,
    /// Paths relative to `root_directory`.
    pub discovered_files: Vec<PathBuf>,
}

impl Workflow {
    /// Build an ACTIVE workflow with every plan entry PENDING.
    pub fn new(
        name: &str,
        root_directory: PathBuf,
        plan: Vec<PlannedModule>,
        discovered_files: Vec<PathBuf>,
        extensions: Vec<String>,
        max_retries: u32,
        now_ms: u64,
    ) -> Self {
        let module_states = plan
            .iter()
            .map(|entry| (entry.name.clone(), ModuleExecutionState::pending()))
            .collect();
        Self {
            schema_version: WORKFLOW_SCHEMA_VERSION,
            name: name.to_string(),
            root_directory,
            created_at_epoch_ms: now_ms,
            last_activity_at_epoch_ms: now_ms,
            status: WorkflowStatus::Active,
            max_retries,
            extensions,
            ordered_module_plan: plan,
            module_states,
            discovered_files,
        }
    }

    pub fn planned(&self, module: &str) -> Option<&PlannedModule> {
        self.ordered_module_plan
            .iter()
            .find(|entry| entry.name == module)
    }

    pub fn state(&self, module: &str) -> Option<&ModuleExecutionState> {
        self.module_states.get(module)
    }

    fn state_mut(&mut self, module: &str) -> Result<&mut ModuleExecutionState, FlowError> {
        let workflow = self.name.clone();
        self.module_states
            .get_mut(module)
            .ok_or_else(|| FlowError::WorkflowState {
                name: workflow,
                message: format!("module {module} is not part of this workflow"),
            })
    }

    fn running_state_mut(
        &mut self,
        module: &str,
        action: &str,
    ) -> Result<&mut ModuleExecutionState, FlowError> {
        let workflow = self.name.clone();
        let state = self.state_mut(module)?;
        if state.status != ExecutionStatus::Running {
            return Err(FlowError::WorkflowState {
                name: workflow,
                message: format!("cannot {action} module {module} from status {}", state.status),
            });
        }
        Ok(state)
    }

    fn status_of(&self, module: &str) -> Option<ExecutionStatus> {
        self.module_states.get(module).map(|state| state.status)
    }

    pub fn touch(&mut self, now_ms: u64) {
        self.last_activity_at_epoch_ms = now_ms;
    }

    /// Pick the earliest runnable module whose dependencies are all satisfied.
    pub fn next_module(&self) -> NextModule {
        for entry in &self.ordered_module_plan {
            let runnable = self
                .status_of(&entry.name)
                .is_some_and(|status| status.is_runnable());
            if !runnable {
                continue;
            }
            let ready = entry.dependencies.iter().all(|dep| {
                self.status_of(dep)
                    .is_some_and(|status| status.satisfies_dependents())
            });
            if ready {
                return NextModule::Ready(entry.name.clone());
            }
        }

        let waiting = self.ordered_module_plan.iter().find(|entry| {
            self.status_of(&entry.name)
                .is_some_and(|status| status.is_runnable())
        });
        match waiting {
            Some(entry) => NextModule::Blocked {
                failed_module: self.blocking_dependency(&entry.name),
                waiting_module: Some(entry.name.clone()),
            },
            None => match self.first_with_status(ExecutionStatus::Failed) {
                Some(failed) => NextModule::Blocked {
                    failed_module: failed,
                    waiting_module: None,
                },
                None => NextModule::Done,
            },
        }
    }

    fn first_with_status(&self, status: ExecutionStatus) -> Option<String> {
        self.ordered_module_plan
            .iter()
            .find(|entry| self.status_of(&entry.name) == Some(status))
            .map(|entry| entry.name.clone())
    }

    /// Walk `module`'s dependencies and name the first one that failed, or
    /// else the first one that can never be satisfied.
    fn blocking_dependency(&self, module: &str) -> String {
        let mut stack = vec![module.to_string()];
        let mut seen = BTreeSet::new();
        let mut fallback = None;
        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            let Some(entry) = self.planned(&current) else {
                continue;
            };
            if let Some(failed) = entry
                .dependencies
                .iter()
                .find(|dep| self.status_of(dep) == Some(ExecutionStatus::Failed))
            {
                return failed.clone();
            }
            for dep in &entry.dependencies {
                if self.status_of(dep).is_none() {
                    fallback.get_or_insert_with(|| dep.clone());
                }
            }
            for dep in entry.dependencies.iter().rev() {
                if self
                    .status_of(dep)
                    .is_some_and(|status| !status.satisfies_dependents())
                {
                    stack.push(dep.clone());
                }
            }
        }
        fallback.unwrap_or_else(|| module.to_string())
    }

    /// PENDING or RUNNING to RUNNING.
    pub fn mark_started(&mut self, module: &str, now_ms: u64) -> Result<(), FlowError> {
        let workflow = self.name.clone();
        let state = self.state_mut(module)?;
        if !state.status.is_runnable() {
            return Err(FlowError::WorkflowState {
                name: workflow,
                message: format!("cannot start module {module} from status {}", state.status),
            });
        }
        state.status = ExecutionStatus::Running;
        state.started_at_epoch_ms = Some(now_ms);
        state.completed_at_epoch_ms = None;
        state.error_message = None;
        if self.status == WorkflowStatus::Paused {
            self.status = WorkflowStatus::Active;
        }
        self.touch(now_ms);
        Ok(())
    }

    /// RUNNING to COMPLETED, recording the module's counters and outputs.
    pub fn mark_completed(
        &mut self,
        module: &str,
        result: &ExecutionResult,
        elapsed_seconds: f64,
        now_ms: u64,
    ) -> Result<(), FlowError> {
        let state = self.running_state_mut(module, "complete")?;
        state.status = ExecutionStatus::Completed;
        state.completed_at_epoch_ms = Some(now_ms);
        state.files_processed = result.files_processed;
        state.files_modified = result.files_modified;
        state.execution_time_seconds = elapsed_seconds;
        state.error_message = None;
        state.outputs = result.outputs.clone();
        self.touch(now_ms);
        Ok(())
    }

    /// RUNNING to FAILED. Increments `retry_count`; whether to retry is the
    /// caller's decision.
    pub fn mark_failed(
        &mut self,
        module: &str,
        message: &str,
        elapsed_seconds: f64,
        now_ms: u64,
    ) -> Result<(), FlowError> {
        let state = self.running_state_mut(module, "fail")?;
        state.status = ExecutionStatus::Failed;
        state.completed_at_epoch_ms = Some(now_ms);
        state.execution_time_seconds = elapsed_seconds;
        state.error_message = Some(message.to_string());
        state.retry_count += 1;
        self.touch(now_ms);
        Ok(())
    }

    /// Put a failed module back in the queue if it has retries left.
    ///
    /// Returns whether the module was requeued.
    pub fn requeue_if_retries_left(&mut self, module: &str) -> Result<bool, FlowError> {
        let max_retries = self.max_retries;
        let state = self.state_mut(module)?;
        if state.status != ExecutionStatus::Failed || state.retry_count > max_retries {
            return Ok(false);
        }
        state.status = ExecutionStatus::Pending;
        Ok(true)
    }

    /// Human retry: FAILED to PENDING with a fresh retry budget.
    pub fn retry_module(&mut self, module: &str, now_ms: u64) -> Result<(), FlowError> {
        let workflow = self.name.clone();
        let state = self.state_mut(module)?;
        if state.status != ExecutionStatus::Failed {
            return Err(FlowError::WorkflowState {
                name: workflow,
                message: format!("module {module} is {}, not failed", state.status),
            });
        }
        state.status = ExecutionStatus::Pending;
        state.retry_count = 0;
        state.error_message = None;
        self.status = WorkflowStatus::Active;
        self.refresh_status();
        self.touch(now_ms);
        Ok(())
    }

    /// Human skip: any unfinished module becomes SKIPPED, unblocking dependents.
    pub fn skip_module(&mut self, module: &str, now_ms: u64) -> Result<(), FlowError> {
        let workflow = self.name.clone();
        let state = self.state_mut(module)?;
        if state.status == ExecutionStatus::Completed {
            return Err(FlowError::WorkflowState {
                name: workflow,
                message: format!("module {module} already completed"),
            });
        }
        state.status = ExecutionStatus::Skipped;
        state.completed_at_epoch_ms = Some(now_ms);
        if self.status == WorkflowStatus::Failed {
            self.status = WorkflowStatus::Active;
        }
        self.refresh_status();
        self.touch(now_ms);
        Ok(())
    }

    /// Apply the terminal rule: COMPLETED only when every entry is completed
    /// or skipped, FAILED while any module is failed. PAUSED is kept until a
    /// module starts.
    pub fn refresh_status(&mut self) {
        let statuses: Vec<ExecutionStatus> = self
            .ordered_module_plan
            .iter()
            .map(|entry| {
                self.status_of(&entry.name)
                    .unwrap_or(ExecutionStatus::Pending)
            })
            .collect();
        if statuses.iter().all(ExecutionStatus::satisfies_dependents) {
            self.status = WorkflowStatus::Completed;
        } else if statuses.contains(&ExecutionStatus::Failed) {
            self.status = WorkflowStatus::Failed;
        } else if self.status != WorkflowStatus::Paused {
            self.status = WorkflowStatus::Active;
        }
    }
}

#[cfg(test)]
#[path = "types_tests.rs"]
mod tests;
