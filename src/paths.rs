//! Typed paths into the docflow state directory.
//!
//! Centralizing path construction keeps file access consistent between the
//! store, the config loaders, and the CLI.
use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};

/// Environment variable that overrides the default state directory.
pub const STATE_DIR_ENV: &str = "DOCFLOW_HOME";

const WORKFLOW_EXT: &str = "json";
const BACKUP_EXT: &str = "json.bak";

/// Convenience wrapper for locating state artifacts.
#[derive(Debug, Clone)]
pub struct StatePaths {
    root: PathBuf,
}

impl StatePaths {
    /// Create a new path helper rooted at the state directory.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Return the state root used for path derivation.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Return the developer `manifest.json` path.
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("manifest.json")
    }

    /// Return the user `preferences.json` path.
    pub fn preferences_path(&self) -> PathBuf {
        self.root.join("preferences.json")
    }

    /// Return the `workflows/` directory path.
    pub fn workflows_dir(&self) -> PathBuf {
        self.root.join("workflows")
    }

    /// Return the canonical `workflows/<name>.json` path.
    pub fn workflow_path(&self, name: &str) -> PathBuf {
        self.workflows_dir().join(format!("{name}.{WORKFLOW_EXT}"))
    }

    /// Return the paired `workflows/<name>.json.bak` path.
    pub fn workflow_backup_path(&self, name: &str) -> PathBuf {
        self.workflows_dir().join(format!("{name}.{BACKUP_EXT}"))
    }
}

/// Extract a workflow name from a canonical workflow file path.
///
/// Backup and temporary files yield `None`.
pub fn workflow_name_from_path(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    if file_name.starts_with('.') {
        return None;
    }
    let name = file_name.strip_suffix(&format!(".{WORKFLOW_EXT}"))?;
    if name.is_empty() {
        return None;
    }
    Some(name.to_string())
}

/// Resolve the state directory: explicit flag, then env, then the user data dir.
pub fn resolve_state_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Some(value) = std::env::var_os(STATE_DIR_ENV).filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(value));
    }
    let data_dir = dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .ok_or_else(|| anyhow!("cannot determine home directory"))?;
    Ok(data_dir.join("docflow"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_names_skip_backups_and_temp_files() {
        let paths = StatePaths::new(PathBuf::from("/state"));
        assert_eq!(
            workflow_name_from_path(&paths.workflow_path("proj")).as_deref(),
            Some("proj")
        );
        assert_eq!(
            workflow_name_from_path(&paths.workflow_backup_path("proj")),
            None
        );
        assert_eq!(
            workflow_name_from_path(Path::new("/state/workflows/.proj.json.a1b2.tmp")),
            None
        );
        assert_eq!(workflow_name_from_path(Path::new("/state/workflows/.json")), None);
    }

    #[test]
    fn explicit_state_dir_wins() {
        let dir = resolve_state_dir(Some(Path::new("/tmp/flow"))).expect("resolve");
        assert_eq!(dir, PathBuf::from("/tmp/flow"));
    }
}
