//! Developer manifest and user preference configuration.
//!
//! Both files are plain JSON in the state directory. Loading is strict
//! (`deny_unknown_fields`) so typos surface as configuration errors instead of
//! silently falling back to defaults.
use crate::error::FlowError;
use crate::paths::StatePaths;
use crate::resolve::VersionReq;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

/// Current schema version for `manifest.json`.
pub const MANIFEST_SCHEMA_VERSION: u32 = 1;
/// Current schema version for `preferences.json`.
pub const PREFERENCES_SCHEMA_VERSION: u32 = 1;
/// Retries granted to a failing module before the workflow is blocked.
pub const DEFAULT_MAX_RETRIES: u32 = 2;
/// File extensions picked up when the manifest does not list any.
pub const DEFAULT_EXTENSIONS: [&str; 3] = ["md", "markdown", "txt"];

/// Free-form per-module configuration.
pub type ConfigMap = BTreeMap<String, serde_json::Value>;

/// Transient per-invocation enablement overrides (`--enable` / `--disable`).
pub type CliOverrides = BTreeMap<String, bool>;

/// Developer-authored manifest describing which modules run and how.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DeveloperManifest {
    pub schema_version: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub modules: Vec<ModuleConstraint>,
}

/// Per-module resolution constraint from the manifest.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ModuleConstraint {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    /// Comparator expression such as `>=1.0, <2`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Dependencies unioned with the ones the module declares itself.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub init_order: i64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: ConfigMap,
}

impl ModuleConstraint {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            required: false,
            version: None,
            dependencies: Vec::new(),
            init_order: 0,
            config: ConfigMap::new(),
        }
    }
}

impl DeveloperManifest {
    /// Look up the constraint for a module, if the manifest names it.
    pub fn constraint(&self, name: &str) -> Option<&ModuleConstraint> {
        self.modules.iter().find(|module| module.name == name)
    }
}

/// Persisted user choices about optional modules.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct UserPreferences {
    pub schema_version: u32,
    #[serde(default)]
    pub enabled_modules: BTreeSet<String>,
    #[serde(default)]
    pub disabled_modules: BTreeSet<String>,
    #[serde(default)]
    pub module_overrides: BTreeMap<String, ConfigMap>,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            schema_version: PREFERENCES_SCHEMA_VERSION,
            enabled_modules: BTreeSet::new(),
            disabled_modules: BTreeSet::new(),
            module_overrides: BTreeMap::new(),
        }
    }
}

impl UserPreferences {
    pub fn enable(&mut self, module: &str) {
        self.disabled_modules.remove(module);
        self.enabled_modules.insert(module.to_string());
    }

    pub fn disable(&mut self, module: &str) {
        self.enabled_modules.remove(module);
        self.disabled_modules.insert(module.to_string());
    }

    /// Drop every preference recorded for a module.
    pub fn reset(&mut self, module: &str) {
        self.enabled_modules.remove(module);
        self.disabled_modules.remove(module);
        self.module_overrides.remove(module);
    }

    pub fn set_override(&mut self, module: &str, key: &str, value: serde_json::Value) {
        self.module_overrides
            .entry(module.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|ext| ext.to_string()).collect()
}

/// Build the manifest used when none is installed.
///
/// `scope` is required so every workflow starts by confirming its file set.
pub fn default_manifest() -> DeveloperManifest {
    let mut scope = ModuleConstraint::new("scope");
    scope.required = true;
    let mut whitespace = ModuleConstraint::new("whitespace");
    whitespace.version = Some(">=1.0, <2".to_string());
    whitespace.init_order = 10;
    let mut links = ModuleConstraint::new("links");
    links.init_order = 20;
    DeveloperManifest {
        schema_version: MANIFEST_SCHEMA_VERSION,
        max_retries: DEFAULT_MAX_RETRIES,
        extensions: default_extensions(),
        modules: vec![scope, whitespace, links],
    }
}

/// Render a pretty JSON manifest stub for `docflow init`.
pub fn manifest_stub() -> Result<String> {
    serde_json::to_string_pretty(&default_manifest()).context("serialize manifest stub")
}

/// Load a manifest from an explicit path.
pub fn load_manifest(path: &Path) -> Result<DeveloperManifest> {
    let bytes = fs::read(path).with_context(|| format!("read manifest {}", path.display()))?;
    let manifest: DeveloperManifest = serde_json::from_slice(&bytes).map_err(|err| {
        FlowError::Configuration(format!("parse manifest {}: {err}", path.display()))
    })?;
    validate_manifest(&manifest)?;
    Ok(manifest)
}

/// Load the manifest from an explicit path, the state dir, or built-in defaults.
pub fn load_manifest_or_default(
    paths: &StatePaths,
    explicit: Option<&Path>,
) -> Result<DeveloperManifest> {
    if let Some(path) = explicit {
        return load_manifest(path);
    }
    let path = paths.manifest_path();
    if path.is_file() {
        return load_manifest(&path);
    }
    tracing::debug!("no manifest installed, using built-in defaults");
    Ok(default_manifest())
}

/// Persist a manifest to the state directory in a stable JSON format.
pub fn write_manifest(paths: &StatePaths, manifest: &DeveloperManifest) -> Result<()> {
    write_json(&paths.manifest_path(), manifest, "manifest")
}

/// Validate manifest schema, module names, and version constraints.
pub fn validate_manifest(manifest: &DeveloperManifest) -> Result<()> {
    if manifest.schema_version != MANIFEST_SCHEMA_VERSION {
        return Err(FlowError::Configuration(format!(
            "unsupported manifest schema_version {}",
            manifest.schema_version
        ))
        .into());
    }
    let mut seen = BTreeSet::new();
    for module in &manifest.modules {
        if module.name.trim().is_empty() {
            return Err(FlowError::Configuration("module names must be non-empty".into()).into());
        }
        if !seen.insert(module.name.as_str()) {
            return Err(FlowError::Configuration(format!(
                "module {} is listed more than once",
                module.name
            ))
            .into());
        }
        if let Some(req) = module.version.as_deref() {
            VersionReq::parse(req).map_err(|err| {
                FlowError::Configuration(format!("module {}: {err}", module.name))
            })?;
        }
        if module.dependencies.iter().any(|dep| dep == &module.name) {
            return Err(FlowError::CircularDependency {
                cycle: vec![module.name.clone(), module.name.clone()],
            }
            .into());
        }
    }
    Ok(())
}

/// Load user preferences; a missing file means no preferences.
pub fn load_preferences(paths: &StatePaths) -> Result<UserPreferences> {
    let path = paths.preferences_path();
    if !path.is_file() {
        return Ok(UserPreferences::default());
    }
    let bytes = fs::read(&path).with_context(|| format!("read preferences {}", path.display()))?;
    let prefs: UserPreferences = serde_json::from_slice(&bytes).map_err(|err| {
        FlowError::Configuration(format!("parse preferences {}: {err}", path.display()))
    })?;
    validate_preferences(&prefs)?;
    Ok(prefs)
}

/// Persist user preferences in a stable JSON format.
pub fn write_preferences(paths: &StatePaths, prefs: &UserPreferences) -> Result<()> {
    write_json(&paths.preferences_path(), prefs, "preferences")
}

fn validate_preferences(prefs: &UserPreferences) -> Result<()> {
    if prefs.schema_version != PREFERENCES_SCHEMA_VERSION {
        return Err(FlowError::Configuration(format!(
            "unsupported preferences schema_version {}",
            prefs.schema_version
        ))
        .into());
    }
    if let Some(both) = prefs.enabled_modules.intersection(&prefs.disabled_modules).next() {
        return Err(FlowError::Configuration(format!(
            "module {both} is both enabled and disabled in preferences"
        ))
        .into());
    }
    Ok(())
}

/// Collapse repeated `--enable`/`--disable` flags into an override map.
pub fn cli_overrides(enable: &[String], disable: &[String]) -> Result<CliOverrides> {
    let mut overrides = CliOverrides::new();
    for name in enable {
        overrides.insert(name.clone(), true);
    }
    for name in disable {
        if overrides.insert(name.clone(), false) == Some(true) {
            return Err(FlowError::Configuration(format!(
                "module {name} passed to both --enable and --disable"
            ))
            .into());
        }
    }
    Ok(overrides)
}

/// Shallow key-wise merge: values in `patch` replace those in `base`.
pub fn merge_config(base: &mut ConfigMap, patch: &ConfigMap) {
    for (key, value) in patch {
        base.insert(key.clone(), value.clone());
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T, label: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(value).with_context(|| format!("serialize {label}"))?;
    fs::write(path, text.as_bytes()).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
