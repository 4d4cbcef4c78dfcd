//! Module capability contract and the in-memory registry.
//!
//! A module is anything that can be initialized with a config map, executed
//! against a workflow's file set, and cleaned up. The registry is built once
//! per process and passed explicitly to the resolver and the orchestrator.
mod builtin;
#[cfg(test)]
pub(crate) mod testing;

use crate::config::ConfigMap;
use crate::error::FlowError;
use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

pub use builtin::builtin_registry;

/// Identity and defaults of an installable module.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleDescriptor {
    pub name: String,
    pub version: String,
    pub description: String,
    pub dependencies: BTreeSet<String>,
    pub default_config: ConfigMap,
    /// Interactive modules are announced before they run and trigger a
    /// file discovery refresh afterwards.
    pub interactive: bool,
    pub default_enabled: bool,
}

impl ModuleDescriptor {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            description: String::new(),
            dependencies: BTreeSet::new(),
            default_config: ConfigMap::new(),
            interactive: false,
            default_enabled: true,
        }
    }

    pub fn with_dependencies(mut self, deps: &[&str]) -> Self {
        self.dependencies = deps.iter().map(|dep| dep.to_string()).collect();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_default(mut self, key: &str, value: serde_json::Value) -> Self {
        self.default_config.insert(key.to_string(), value);
        self
    }

    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    #[cfg(test)]
    pub fn disabled_by_default(mut self) -> Self {
        self.default_enabled = false;
        self
    }
}

/// Everything a module sees when it executes.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub workflow: String,
    pub root_directory: PathBuf,
    /// Discovered files, relative to `root_directory`.
    pub files: Vec<PathBuf>,
    pub config: ConfigMap,
    /// Outputs recorded by this module's dependencies, keyed by module name.
    pub upstream_outputs: BTreeMap<String, ConfigMap>,
}

impl ExecutionContext {
    pub fn absolute_files(&self) -> Vec<PathBuf> {
        self.files
            .iter()
            .map(|rel| self.root_directory.join(rel))
            .collect()
    }

    pub fn config_strings(&self, key: &str) -> Option<Vec<String>> {
        let values = self.config.get(key)?.as_array()?;
        values
            .iter()
            .map(|value| value.as_str().map(str::to_string))
            .collect()
    }
}

/// What a module reports after a successful run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionResult {
    pub files_processed: u64,
    pub files_modified: u64,
    /// Declared outputs made available to dependent modules.
    pub outputs: ConfigMap,
}

/// Lifecycle every module implements.
pub trait DocModule {
    fn descriptor(&self) -> &ModuleDescriptor;

    /// Validate and store configuration before `execute`.
    fn initialize(&mut self, config: &ConfigMap) -> Result<()>;

    fn execute(&mut self, context: &ExecutionContext) -> Result<ExecutionResult>;

    /// Release anything acquired in `initialize`. Runs after every execute
    /// attempt, successful or not.
    fn cleanup(&mut self) {}
}

/// Catalog of available modules keyed by name.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, Box<dyn DocModule>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module: Box<dyn DocModule>) -> Result<(), FlowError> {
        let name = module.descriptor().name.clone();
        if self.modules.contains_key(&name) {
            return Err(FlowError::Configuration(format!(
                "module {name} registered more than once"
            )));
        }
        self.modules.insert(name, module);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn descriptor(&self, name: &str) -> Option<&ModuleDescriptor> {
        self.modules.get(name).map(|module| module.descriptor())
    }

    #[cfg(test)]
    pub fn descriptors(&self) -> impl Iterator<Item = &ModuleDescriptor> {
        self.modules.values().map(|module| module.descriptor())
    }

    pub(crate) fn module_mut(&mut self, name: &str) -> Option<&mut (dyn DocModule + 'static)> {
        self.modules.get_mut(name).map(|module| module.as_mut())
    }
}
