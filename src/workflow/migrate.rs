//! Decoding of persisted workflow files, including older schema versions.
//!
//! Version 1 stored the plan as bare module names with a separate
//! dependency map and timestamps in whole seconds.
use super::{
    ExecutionStatus, ModuleExecutionState, PlannedModule, Workflow, WorkflowStatus,
    WORKFLOW_SCHEMA_VERSION,
};
use crate::config::{ConfigMap, DEFAULT_EXTENSIONS, DEFAULT_MAX_RETRIES};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Why a workflow file could not be decoded.
#[derive(Debug)]
pub(crate) enum DecodeError {
    /// Unparsable or structurally wrong; a backup may help.
    Corrupt(String),
    /// Written by a newer docflow; a backup would be just as new.
    Unsupported(u64),
}

/// A decoded workflow and the schema version it was stored with.
pub(crate) struct Decoded {
    pub(crate) workflow: Workflow,
    pub(crate) migrated_from: Option<u64>,
}

pub(crate) fn decode_workflow(text: &str) -> Result<Decoded, DecodeError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|err| DecodeError::Corrupt(err.to_string()))?;
    let version = match value.get("schema_version") {
        None => 1,
        Some(raw) => raw
            .as_u64()
            .ok_or_else(|| DecodeError::Corrupt("schema_version must be an integer".into()))?,
    };
    match version {
        1 => {
            let legacy: WorkflowV1 = serde_json::from_value(value)
                .map_err(|err| DecodeError::Corrupt(err.to_string()))?;
            Ok(Decoded {
                workflow: legacy.migrate(),
                migrated_from: Some(1),
            })
        }
        2 => {
            let workflow: Workflow = serde_json::from_value(value)
                .map_err(|err| DecodeError::Corrupt(err.to_string()))?;
            Ok(Decoded {
                workflow,
                migrated_from: None,
            })
        }
        0 => Err(DecodeError::Corrupt("schema_version 0 is invalid".into())),
        newer => Err(DecodeError::Unsupported(newer)),
    }
}

#[derive(Deserialize)]
struct WorkflowV1 {
    name: String,
    root_directory: PathBuf,
    created_at: u64,
    last_activity_at: u64,
    status: WorkflowStatus,
    ordered_module_plan: Vec<String>,
    #[serde(default)]
    module_dependencies: BTreeMap<String, Vec<String>>,
    module_states: BTreeMap<String, ModuleStateV1>,
    #[serde(default)]
    discovered_files: Vec<PathBuf>,
}

#[derive(Deserialize)]
struct ModuleStateV1 {
    status: ExecutionStatus,
    #[serde(default)]
    started_at: Option<u64>,
    #[serde(default)]
    completed_at: Option<u64>,
    #[serde(default)]
    files_processed: u64,
    #[serde(default)]
    files_modified: u64,
    #[serde(default)]
    execution_time_seconds: f64,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    retry_count: u32,
}

fn seconds_to_ms(seconds: u64) -> u64 {
    seconds.saturating_mul(1_000)
}

impl WorkflowV1 {
    fn migrate(mut self) -> Workflow {
        let ordered_module_plan = self
            .ordered_module_plan
            .iter()
            .map(|name| PlannedModule {
                name: name.clone(),
                version: String::new(),
                dependencies: self.module_dependencies.remove(name).unwrap_or_default(),
                interactive: false,
                config: ConfigMap::new(),
            })
            .collect::<Vec<_>>();
        let mut module_states: BTreeMap<String, ModuleExecutionState> = self
            .module_states
            .into_iter()
            .map(|(name, state)| {
                let migrated = ModuleExecutionState {
                    status: state.status,
                    started_at_epoch_ms: state.started_at.map(seconds_to_ms),
                    completed_at_epoch_ms: state.completed_at.map(seconds_to_ms),
                    files_processed: state.files_processed,
                    files_modified: state.files_modified,
                    execution_time_seconds: state.execution_time_seconds,
                    error_message: state.error_message,
                    retry_count: state.retry_count,
                    outputs: ConfigMap::new(),
                };
                (name, migrated)
            })
            .collect();
        for entry in &ordered_module_plan {
            module_states
                .entry(entry.name.clone())
                .or_insert_with(ModuleExecutionState::pending);
        }
        Workflow {
            schema_version: WORKFLOW_SCHEMA_VERSION,
            name: self.name,
            root_directory: self.root_directory,
            created_at_epoch_ms: seconds_to_ms(self.created_at),
            last_activity_at_epoch_ms: seconds_to_ms(self.last_activity_at),
            status: self.status,
            max_retries: DEFAULT_MAX_RETRIES,
            extensions: DEFAULT_EXTENSIONS.iter().map(|ext| ext.to_string()).collect(),
            ordered_module_plan,
            module_states,
            discovered_files: self.discovered_files,
        }
    }
}
