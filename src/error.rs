//! Error taxonomy for resolution and workflow execution.
//!
//! Typed errors travel inside `anyhow::Error` so the CLI can recover them with
//! `downcast_ref` and pick an exit code without string matching.
use std::path::PathBuf;
use thiserror::Error;

/// Exit code for success or a no-op.
pub const EXIT_OK: u8 = 0;
/// Exit code when a workflow is blocked or a module failed.
pub const EXIT_BLOCKED: u8 = 1;
/// Exit code for invalid input or configuration.
pub const EXIT_INVALID: u8 = 2;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("module not found: {0}")]
    ModuleNotFound(String),

    #[error("module {module} depends on {missing}, which is not installed")]
    MissingDependency { module: String, missing: String },

    #[error("circular dependency detected: {}", .cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },

    #[error("module {module} version {found} does not satisfy {required}")]
    VersionConflict {
        module: String,
        found: String,
        required: String,
    },

    #[error("module {module} requires {dependency}, which was disabled on the command line")]
    Dependency { module: String, dependency: String },

    #[error("module {module} failed to initialize: {message}")]
    ModuleInitialization { module: String, message: String },

    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("workflow already exists: {0}")]
    WorkflowExists(String),

    #[error("workflow {name} state is unusable: {message}")]
    WorkflowState { name: String, message: String },

    #[error("invalid directory {}: {reason}", .path.display())]
    InvalidDirectory { path: PathBuf, reason: String },

    #[error("module {module} failed: {message}")]
    ModuleExecution { module: String, message: String },

    #[error("resolution failed:\n{}", format_errors(.0))]
    Resolution(Vec<FlowError>),
}

impl FlowError {
    /// Map the error to the CLI exit code contract.
    pub fn exit_code(&self) -> u8 {
        match self {
            FlowError::Configuration(_)
            | FlowError::ModuleNotFound(_)
            | FlowError::MissingDependency { .. }
            | FlowError::CircularDependency { .. }
            | FlowError::VersionConflict { .. }
            | FlowError::Dependency { .. }
            | FlowError::Resolution(_)
            | FlowError::WorkflowNotFound(_)
            | FlowError::WorkflowExists(_)
            | FlowError::InvalidDirectory { .. } => EXIT_INVALID,
            FlowError::ModuleInitialization { .. }
            | FlowError::WorkflowState { .. }
            | FlowError::ModuleExecution { .. } => EXIT_BLOCKED,
        }
    }
}

fn format_errors(errors: &[FlowError]) -> String {
    errors
        .iter()
        .map(|err| format!("  - {err}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Exit code for an arbitrary error chain.
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<FlowError>())
        .map(FlowError::exit_code)
        .unwrap_or(EXIT_BLOCKED)
}

/// Render an error chain as one line for status output.
pub fn error_chain_message(err: &anyhow::Error) -> String {
    err.chain()
        .map(|cause| cause.to_string())
        .collect::<Vec<_>>()
        .join(": ")
}
