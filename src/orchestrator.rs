//! One-step workflow executor.
//!
//! Each call to [`Orchestrator::step`] runs at most one module and persists
//! the workflow before returning, so every invocation is a complete unit of
//! work. Resolution happens once per orchestrator and is fatal before any
//! workflow is created or touched.
use crate::config::{CliOverrides, ConfigMap, DeveloperManifest, UserPreferences};
use crate::discovery::{discover_files, normalize_extensions};
use crate::error::{error_chain_message, FlowError, EXIT_BLOCKED, EXIT_OK};
use crate::modules::{DocModule, ExecutionContext, ExecutionResult, ModuleRegistry};
use crate::resolve::{resolve, ModuleState, ResolutionResult};
use crate::workflow::{
    now_epoch_ms, ExecutionStatus, NewWorkflow, NextModule, PlannedModule, Workflow,
    WorkflowStatus, WorkflowStore,
};
use anyhow::Result;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::time::Instant;

/// Caller hooks around module execution.
pub trait StepObserver {
    /// Announce an interactive module. Returning `false` pauses the workflow
    /// without running it.
    fn confirm_interactive(&mut self, workflow: &Workflow, module: &PlannedModule) -> bool;

    fn module_starting(&mut self, _workflow: &Workflow, _module: &str) {}
}

/// What one step did.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Completed {
        module: String,
        files_processed: u64,
        files_modified: u64,
        elapsed_seconds: f64,
        workflow_status: WorkflowStatus,
    },
    Failed {
        module: String,
        message: String,
        will_retry: bool,
    },
    Paused {
        module: String,
    },
    Blocked {
        failed_module: String,
        waiting_module: Option<String>,
    },
    Done,
}

impl StepOutcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            StepOutcome::Completed { .. } | StepOutcome::Paused { .. } | StepOutcome::Done => {
                EXIT_OK
            }
            StepOutcome::Failed { .. } | StepOutcome::Blocked { .. } => EXIT_BLOCKED,
        }
    }

    /// True when another step could make progress right away.
    pub fn can_continue(&self) -> bool {
        match self {
            StepOutcome::Completed {
                workflow_status, ..
            } => *workflow_status != WorkflowStatus::Completed,
            _ => false,
        }
    }
}

/// Configuration tiers the plan is resolved from.
pub struct ResolveInputs {
    pub manifest: DeveloperManifest,
    pub preferences: UserPreferences,
    pub overrides: CliOverrides,
}

pub struct Orchestrator {
    registry: ModuleRegistry,
    store: WorkflowStore,
    inputs: ResolveInputs,
    plan: Option<Vec<ResolutionResult>>,
    warnings: Vec<String>,
}

impl Orchestrator {
    pub fn new(registry: ModuleRegistry, store: WorkflowStore, inputs: ResolveInputs) -> Self {
        Self {
            registry,
            store,
            inputs,
            plan: None,
            warnings: Vec::new(),
        }
    }

    /// Resolution warnings gathered so far.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Resolve once and cache the plan; any resolution error is fatal.
    pub fn resolved_plan(&mut self) -> Result<&[ResolutionResult]> {
        if self.plan.is_none() {
            let resolution = resolve(
                &self.registry,
                &self.inputs.manifest,
                &self.inputs.preferences,
                &self.inputs.overrides,
            )?;
            self.warnings.extend(resolution.warnings.iter().cloned());
            self.plan = Some(resolution.into_plan()?);
        }
        Ok(self.plan.as_deref().unwrap_or_default())
    }

    /// Create a workflow over `root` from the enabled modules of the plan.
    pub fn start(&mut self, name: &str, root: &Path) -> Result<Workflow> {
        let plan: Vec<PlannedModule> = self
            .resolved_plan()?
            .iter()
            .filter(|entry| entry.state == ModuleState::Enabled)
            .map(planned_module)
            .collect();
        let spec = NewWorkflow {
            plan,
            extensions: normalize_extensions(&self.inputs.manifest.extensions),
            max_retries: self.inputs.manifest.max_retries,
        };
        self.store.start(name, root, spec)
    }

    /// Run the next module of `name`, if any, and persist the result.
    pub fn step(&mut self, name: &str, observer: &mut dyn StepObserver) -> Result<StepOutcome> {
        self.resolved_plan()?;
        let mut workflow = self.store.load(name)?;

        let module = match workflow.next_module() {
            NextModule::Ready(module) => module,
            NextModule::Done => {
                self.settle(&mut workflow)?;
                return Ok(StepOutcome::Done);
            }
            NextModule::Blocked {
                failed_module,
                waiting_module,
            } => {
                self.settle(&mut workflow)?;
                return Ok(StepOutcome::Blocked {
                    failed_module,
                    waiting_module,
                });
            }
        };
        let Some(entry) = workflow.planned(&module).cloned() else {
            return Err(FlowError::WorkflowState {
                name: name.to_string(),
                message: format!("module {module} has no plan entry"),
            }
            .into());
        };

        let interactive = self
            .registry
            .descriptor(&module)
            .map_or(entry.interactive, |descriptor| descriptor.interactive);
        if interactive && !observer.confirm_interactive(&workflow, &entry) {
            workflow.status = WorkflowStatus::Paused;
            workflow.touch(now_epoch_ms());
            self.store.persist(&workflow)?;
            tracing::info!(workflow = %name, module = %module, "paused before interactive module");
            return Ok(StepOutcome::Paused { module });
        }

        if workflow.state(&module).map(|state| state.status) == Some(ExecutionStatus::Running) {
            tracing::warn!(
                workflow = %name,
                module = %module,
                "module was interrupted during a previous run; running it again"
            );
        }
        workflow.mark_started(&module, now_epoch_ms())?;
        self.store.persist(&workflow)?;
        observer.module_starting(&workflow, &module);

        let context = ExecutionContext {
            workflow: workflow.name.clone(),
            root_directory: workflow.root_directory.clone(),
            files: workflow.discovered_files.clone(),
            config: self.effective_config(&entry),
            upstream_outputs: upstream_outputs(&workflow, &entry),
        };
        let started = Instant::now();
        let outcome = match self.registry.module_mut(&module) {
            Some(instance) => run_module(instance, &module, &context),
            None => Err(FlowError::ModuleNotFound(module.clone())),
        };
        let elapsed_seconds = started.elapsed().as_secs_f64();

        let outcome = match outcome {
            Ok(result) => {
                workflow.mark_completed(&module, &result, elapsed_seconds, now_epoch_ms())?;
                if interactive {
                    refresh_discovery(&mut workflow, &result);
                }
                workflow.refresh_status();
                tracing::info!(
                    workflow = %name,
                    module = %module,
                    files_processed = result.files_processed,
                    files_modified = result.files_modified,
                    elapsed_seconds,
                    "module complete"
                );
                StepOutcome::Completed {
                    module,
                    files_processed: result.files_processed,
                    files_modified: result.files_modified,
                    elapsed_seconds,
                    workflow_status: workflow.status,
                }
            }
            Err(err) => {
                let message = err.to_string();
                workflow.mark_failed(&module, &message, elapsed_seconds, now_epoch_ms())?;
                let will_retry = workflow.requeue_if_retries_left(&module)?;
                workflow.refresh_status();
                tracing::warn!(
                    workflow = %name,
                    module = %module,
                    will_retry,
                    error = %message,
                    "module failed"
                );
                StepOutcome::Failed {
                    module,
                    message,
                    will_retry,
                }
            }
        };
        self.store.persist(&workflow)?;
        Ok(outcome)
    }

    /// Prefer the freshly resolved config while the module is still enabled.
    fn effective_config(&self, entry: &PlannedModule) -> ConfigMap {
        self.plan
            .as_deref()
            .and_then(|plan| plan.iter().find(|result| result.name == entry.name))
            .filter(|result| result.state == ModuleState::Enabled)
            .map_or_else(|| entry.config.clone(), |result| result.effective_config.clone())
    }

    fn settle(&self, workflow: &mut Workflow) -> Result<()> {
        let before = workflow.status;
        workflow.refresh_status();
        if workflow.status != before {
            workflow.touch(now_epoch_ms());
            self.store.persist(workflow)?;
        }
        Ok(())
    }
}

fn planned_module(result: &ResolutionResult) -> PlannedModule {
    PlannedModule {
        name: result.name.clone(),
        version: result.resolved_version.clone(),
        dependencies: result.resolved_dependencies.clone(),
        interactive: result.interactive,
        config: result.effective_config.clone(),
    }
}

fn upstream_outputs(workflow: &Workflow, entry: &PlannedModule) -> BTreeMap<String, ConfigMap> {
    entry
        .dependencies
        .iter()
        .filter_map(|dep| {
            let state = workflow.state(dep)?;
            (state.status == ExecutionStatus::Completed)
                .then(|| (dep.clone(), state.outputs.clone()))
        })
        .collect()
}

/// Initialize, execute, and clean up one module. Errors and panics from any
/// of the three calls become typed failures.
fn run_module(
    module: &mut dyn DocModule,
    name: &str,
    context: &ExecutionContext,
) -> Result<ExecutionResult, FlowError> {
    let initialized = catch_unwind(AssertUnwindSafe(|| module.initialize(&context.config)));
    let init_failure = match initialized {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(error_chain_message(&err)),
        Err(payload) => Some(format!("panicked: {}", panic_message(payload.as_ref()))),
    };
    if let Some(message) = init_failure {
        run_cleanup(module, name);
        return Err(FlowError::ModuleInitialization {
            module: name.to_string(),
            message,
        });
    }
    let executed = catch_unwind(AssertUnwindSafe(|| module.execute(context)));
    run_cleanup(module, name);
    match executed {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(err)) => Err(FlowError::ModuleExecution {
            module: name.to_string(),
            message: error_chain_message(&err),
        }),
        Err(payload) => Err(FlowError::ModuleExecution {
            module: name.to_string(),
            message: format!("panicked: {}", panic_message(payload.as_ref())),
        }),
    }
}

/// A panicking cleanup does not change the module's outcome.
fn run_cleanup(module: &mut dyn DocModule, name: &str) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| module.cleanup())) {
        tracing::warn!(
            module = %name,
            panic = %panic_message(payload.as_ref()),
            "module cleanup panicked"
        );
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        return (*text).to_string();
    }
    if let Some(text) = payload.downcast_ref::<String>() {
        return text.clone();
    }
    "unknown panic".to_string()
}

/// Re-scan the root after an interactive module, adopting its `extensions`
/// output when it reports one.
fn refresh_discovery(workflow: &mut Workflow, result: &ExecutionResult) {
    if let Some(extensions) = result
        .outputs
        .get("extensions")
        .and_then(serde_json::Value::as_array)
    {
        let extensions: Vec<&str> = extensions
            .iter()
            .filter_map(serde_json::Value::as_str)
            .collect();
        let normalized = normalize_extensions(&extensions);
        if !normalized.is_empty() {
            workflow.extensions = normalized;
        }
    }
    match discover_files(&workflow.root_directory, &workflow.extensions) {
        Ok(files) => {
            if files.is_empty() {
                tracing::warn!(workflow = %workflow.name, "discovery refresh found no documents");
            }
            workflow.discovered_files = files;
        }
        Err(err) => tracing::warn!(
            workflow = %workflow.name,
            error = %error_chain_message(&err),
            "discovery refresh failed; keeping previous file list"
        ),
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
