//! Durable, atomic persistence of named workflows.
//!
//! Each workflow lives in `workflows/<name>.json` with the previously
//! committed version in `workflows/<name>.json.bak`. Writes go through a
//! synced temp file that is renamed onto the canonical path, so a reader sees
//! either the old or the new file and never a partial one. A single writer
//! per workflow is assumed; there is no locking.
use super::migrate::{decode_workflow, DecodeError};
use super::{now_epoch_ms, PlannedModule, Workflow};
use crate::discovery::discover_files;
use crate::error::FlowError;
use crate::paths::{workflow_name_from_path, StatePaths};
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Reject names that are empty, hidden, or not safe as a file stem.
pub fn validate_workflow_name(name: &str) -> Result<(), FlowError> {
    let valid_chars = name
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'));
    if name.is_empty() || name.starts_with('.') || !valid_chars {
        return Err(FlowError::Configuration(format!(
            "invalid workflow name {name:?}: use letters, digits, '-', '_' or '.', not starting with '.'"
        )));
    }
    Ok(())
}

/// Inputs for a new workflow besides its name and root.
pub struct NewWorkflow {
    pub plan: Vec<PlannedModule>,
    pub extensions: Vec<String>,
    pub max_retries: u32,
}

pub struct WorkflowStore {
    paths: StatePaths,
}

impl WorkflowStore {
    pub fn new(paths: StatePaths) -> Self {
        Self { paths }
    }

    #[cfg(test)]
    pub fn paths(&self) -> &StatePaths {
        &self.paths
    }

    pub fn exists(&self, name: &str) -> bool {
        self.paths.workflow_path(name).is_file()
    }

    /// Create and persist a workflow over the documents found under `root`.
    pub fn start(&self, name: &str, root: &Path, spec: NewWorkflow) -> Result<Workflow> {
        validate_workflow_name(name)?;
        if self.exists(name) {
            return Err(FlowError::WorkflowExists(name.to_string()).into());
        }
        if !root.is_dir() {
            return Err(FlowError::InvalidDirectory {
                path: root.to_path_buf(),
                reason: "not an existing directory".to_string(),
            }
            .into());
        }
        let root = root
            .canonicalize()
            .with_context(|| format!("resolve {}", root.display()))?;
        let files = discover_files(&root, &spec.extensions)?;
        if files.is_empty() {
            return Err(FlowError::InvalidDirectory {
                path: root,
                reason: format!(
                    "no documents with extensions {}",
                    spec.extensions.join(", ")
                ),
            }
            .into());
        }
        let workflow = Workflow::new(
            name,
            root,
            spec.plan,
            files,
            spec.extensions,
            spec.max_retries,
            now_epoch_ms(),
        );
        self.persist(&workflow)?;
        tracing::info!(
            workflow = %name,
            modules = workflow.ordered_module_plan.len(),
            files = workflow.discovered_files.len(),
            "workflow created"
        );
        Ok(workflow)
    }

    /// Load a workflow, migrating old schemas and recovering from the backup
    /// when the canonical file is unreadable.
    ///
    /// Loading is not read-only: a migrated workflow is persisted in the
    /// current schema and a restored backup is written back onto the
    /// canonical path. `status` and `list` go through here too.
    pub fn load(&self, name: &str) -> Result<Workflow> {
        validate_workflow_name(name)?;
        let path = self.paths.workflow_path(name);
        if !path.is_file() {
            return Err(FlowError::WorkflowNotFound(name.to_string()).into());
        }
        let text = fs::read_to_string(&path).ok();
        let decoded = match text.as_deref().map(decode_workflow) {
            Some(Ok(decoded)) => decoded,
            Some(Err(DecodeError::Unsupported(version))) => {
                return Err(unsupported(name, version).into());
            }
            Some(Err(DecodeError::Corrupt(reason))) => {
                return self.restore_from_backup(name, &reason);
            }
            None => return self.restore_from_backup(name, "not valid UTF-8"),
        };
        let mut workflow = decoded.workflow;
        check_name(name, &workflow)?;
        if let Some(version) = decoded.migrated_from {
            tracing::info!(workflow = %name, from = version, "migrated workflow schema");
            workflow.touch(now_epoch_ms());
            self.persist(&workflow)?;
        }
        Ok(workflow)
    }

    fn restore_from_backup(&self, name: &str, reason: &str) -> Result<Workflow> {
        let backup = self.paths.workflow_backup_path(name);
        let corrupt = || FlowError::WorkflowState {
            name: name.to_string(),
            message: format!("workflow file is corrupt ({reason}) and no usable backup exists"),
        };
        let Ok(text) = fs::read_to_string(&backup) else {
            return Err(corrupt().into());
        };
        let decoded = match decode_workflow(&text) {
            Ok(decoded) => decoded,
            Err(DecodeError::Unsupported(version)) => return Err(unsupported(name, version).into()),
            Err(DecodeError::Corrupt(_)) => return Err(corrupt().into()),
        };
        let workflow = decoded.workflow;
        check_name(name, &workflow)?;
        tracing::warn!(workflow = %name, reason, "restored workflow from backup");
        write_atomic(&self.paths.workflow_path(name), &serialize(&workflow)?)?;
        Ok(workflow)
    }

    /// Commit `workflow`: sync a temp file, copy the current canonical file
    /// over the backup, then rename the temp file into place.
    pub fn persist(&self, workflow: &Workflow) -> Result<()> {
        validate_workflow_name(&workflow.name)?;
        let canonical = self.paths.workflow_path(&workflow.name);
        let backup = self.paths.workflow_backup_path(&workflow.name);
        let dir = self.paths.workflows_dir();
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;

        let staged = stage(&dir, &workflow.name, &serialize(workflow)?)?;
        if canonical.is_file() {
            let backup_tmp = dir.join(format!(".{}.json.bak.tmp", workflow.name));
            fs::copy(&canonical, &backup_tmp)
                .with_context(|| format!("back up {}", canonical.display()))?;
            fs::rename(&backup_tmp, &backup)
                .with_context(|| format!("publish {}", backup.display()))?;
        }
        staged
            .persist(&canonical)
            .map_err(|err| err.error)
            .with_context(|| format!("publish {}", canonical.display()))?;
        tracing::debug!(workflow = %workflow.name, path = %canonical.display(), "workflow persisted");
        Ok(())
    }

    /// Load every persisted workflow. Unreadable files are returned as errors
    /// alongside their names rather than failing the listing.
    pub fn list(&self) -> Result<Vec<(String, Result<Workflow>)>> {
        let dir = self.paths.workflows_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&dir).with_context(|| format!("read {}", dir.display()))? {
            let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
            if let Some(name) = workflow_name_from_path(&entry.path()) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names
            .into_iter()
            .map(|name| {
                let loaded = self.load(&name);
                (name, loaded)
            })
            .collect())
    }

    /// Delete a workflow and its backup. Only ever user-initiated.
    pub fn remove(&self, name: &str) -> Result<()> {
        validate_workflow_name(name)?;
        let path = self.paths.workflow_path(name);
        if !path.is_file() {
            return Err(FlowError::WorkflowNotFound(name.to_string()).into());
        }
        fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))?;
        let backup = self.paths.workflow_backup_path(name);
        if backup.is_file() {
            fs::remove_file(&backup).with_context(|| format!("remove {}", backup.display()))?;
        }
        tracing::info!(workflow = %name, "workflow removed");
        Ok(())
    }
}

fn unsupported(name: &str, version: u64) -> FlowError {
    FlowError::WorkflowState {
        name: name.to_string(),
        message: format!("schema_version {version} is newer than this docflow supports"),
    }
}

fn check_name(name: &str, workflow: &Workflow) -> Result<(), FlowError> {
    if workflow.name != name {
        return Err(FlowError::WorkflowState {
            name: name.to_string(),
            message: format!("file contains workflow {}", workflow.name),
        });
    }
    Ok(())
}

fn serialize(workflow: &Workflow) -> Result<String> {
    let mut text = serde_json::to_string_pretty(workflow).context("serialize workflow")?;
    text.push('\n');
    Ok(text)
}

fn stage(dir: &Path, name: &str, text: &str) -> Result<tempfile::NamedTempFile> {
    let mut staged = tempfile::Builder::new()
        .prefix(&format!(".{name}."))
        .suffix(".tmp")
        .tempfile_in(dir)
        .with_context(|| format!("create temp file in {}", dir.display()))?;
    staged
        .write_all(text.as_bytes())
        .context("write workflow temp file")?;
    staged
        .as_file()
        .sync_all()
        .context("sync workflow temp file")?;
    Ok(staged)
}

fn write_atomic(path: &Path, text: &str) -> Result<()> {
    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("workflow");
    stage(&dir, name, text)?
        .persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("publish {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
