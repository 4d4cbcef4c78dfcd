//! Dependency resolution for the module plan.
//!
//! Resolution is a pure function of the registry and three configuration
//! tiers (manifest, user preferences, command-line overrides). Only a cycle
//! aborts resolution; every other problem is collected so the user sees all
//! of them in one pass.
mod graph;
mod version;

use crate::config::{merge_config, CliOverrides, ConfigMap, DeveloperManifest, UserPreferences};
use crate::error::FlowError;
use crate::modules::ModuleRegistry;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

pub use graph::{find_cycle, topological_order, DependencyGraph};
pub use version::{Version, VersionReq};

/// Enablement outcome for one module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    Enabled,
    Disabled,
    Failed,
}

impl ModuleState {
    /// Return the stable string identifier used in JSON output.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleState::Enabled => "enabled",
            ModuleState::Disabled => "disabled",
            ModuleState::Failed => "failed",
        }
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One entry of the resolved plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolutionResult {
    pub name: String,
    pub state: ModuleState,
    pub resolved_version: String,
    pub resolved_dependencies: Vec<String>,
    /// Position in the plan; always greater than every dependency's.
    pub init_order: usize,
    pub effective_config: ConfigMap,
    pub required: bool,
    pub interactive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Ordered plan plus everything noticed while building it.
#[derive(Debug, Default)]
pub struct Resolution {
    pub plan: Vec<ResolutionResult>,
    pub errors: Vec<FlowError>,
    pub warnings: Vec<String>,
}

impl Resolution {
    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<&ResolutionResult> {
        self.plan.iter().find(|entry| entry.name == name)
    }

    pub fn enabled(&self) -> impl Iterator<Item = &ResolutionResult> {
        self.plan
            .iter()
            .filter(|entry| entry.state == ModuleState::Enabled)
    }

    /// Return the plan, or every collected error when resolution failed.
    pub fn into_plan(self) -> Result<Vec<ResolutionResult>, FlowError> {
        if self.errors.is_empty() {
            Ok(self.plan)
        } else {
            Err(FlowError::Resolution(self.errors))
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Source {
    Cli,
    Required,
    Preference,
    Default,
    AutoEnabled,
}

struct Decision {
    enabled: bool,
    source: Source,
}

/// Resolve modules into an ordered, enablement-annotated plan.
///
/// Returns `Err` only for a dependency cycle.
pub fn resolve(
    registry: &ModuleRegistry,
    manifest: &DeveloperManifest,
    preferences: &UserPreferences,
    overrides: &CliOverrides,
) -> Result<Resolution, FlowError> {
    let mut resolution = Resolution::default();
    let mut failures: BTreeMap<String, String> = BTreeMap::new();

    let graph = build_graph(registry, manifest, overrides, &mut resolution, &mut failures);

    if let Some(cycle) = find_cycle(&graph) {
        return Err(FlowError::CircularDependency { cycle });
    }

    let hint = |name: &str| {
        manifest
            .constraint(name)
            .map_or(0, |constraint| constraint.init_order)
    };
    let order = topological_order(&graph, hint).map_err(|mut stuck| {
        if let Some(first) = stuck.first().cloned() {
            stuck.push(first);
        }
        FlowError::CircularDependency { cycle: stuck }
    })?;

    for name in preferences
        .enabled_modules
        .iter()
        .chain(preferences.disabled_modules.iter())
    {
        if !registry.contains(name) {
            resolution
                .warnings
                .push(format!("preferences mention unknown module {name}; ignored"));
        }
    }

    let mut decisions: BTreeMap<&str, Decision> = BTreeMap::new();
    for name in &order {
        let decision = decide(name, manifest, preferences, overrides, registry, &mut resolution);
        decisions.insert(name.as_str(), decision);
    }

    // Dependents come first in reverse order, so enabling a dependency here
    // is seen again when that dependency's own turn comes.
    for name in order.iter().rev() {
        let enabled = decisions
            .get(name.as_str())
            .is_some_and(|decision| decision.enabled);
        if !enabled {
            continue;
        }
        for dep in graph.get(name).into_iter().flatten() {
            let Some(dep_decision) = decisions.get_mut(dep.as_str()) else {
                continue;
            };
            if dep_decision.enabled {
                continue;
            }
            if dep_decision.source == Source::Cli {
                resolution.errors.push(FlowError::Dependency {
                    module: name.clone(),
                    dependency: dep.clone(),
                });
                failures
                    .entry(name.clone())
                    .or_insert_with(|| format!("requires {dep}, disabled on the command line"));
                continue;
            }
            dep_decision.enabled = true;
            dep_decision.source = Source::AutoEnabled;
            resolution.warnings.push(format!(
                "auto-enabled {dep} because enabled module {name} depends on it"
            ));
        }
    }

    for name in &order {
        let enabled = decisions
            .get(name.as_str())
            .is_some_and(|decision| decision.enabled);
        if enabled {
            check_version(name, registry, manifest, &mut resolution, &mut failures);
        }
    }

    for (position, name) in order.iter().enumerate() {
        let Some(descriptor) = registry.descriptor(name) else {
            continue;
        };
        let constraint = manifest.constraint(name);
        let enabled = decisions
            .get(name.as_str())
            .is_some_and(|decision| decision.enabled);
        let error_message = failures.get(name).cloned();
        let state = if error_message.is_some() {
            ModuleState::Failed
        } else if enabled {
            ModuleState::Enabled
        } else {
            ModuleState::Disabled
        };

        let mut effective_config = descriptor.default_config.clone();
        if let Some(constraint) = constraint {
            merge_config(&mut effective_config, &constraint.config);
        }
        if let Some(patch) = preferences.module_overrides.get(name) {
            merge_config(&mut effective_config, patch);
        }

        resolution.plan.push(ResolutionResult {
            name: name.clone(),
            state,
            resolved_version: descriptor.version.clone(),
            resolved_dependencies: graph
                .get(name)
                .map(|deps| deps.iter().cloned().collect())
                .unwrap_or_default(),
            init_order: position,
            effective_config,
            required: constraint.is_some_and(|constraint| constraint.required),
            interactive: descriptor.interactive,
            error_message,
        });
    }

    for warning in &resolution.warnings {
        tracing::debug!(%warning, "resolution warning");
    }
    tracing::debug!(
        order = ?order,
        errors = resolution.errors.len(),
        "resolution complete"
    );
    Ok(resolution)
}

/// Build the dependency graph from manifest modules plus anything they pull in.
fn build_graph(
    registry: &ModuleRegistry,
    manifest: &DeveloperManifest,
    overrides: &CliOverrides,
    resolution: &mut Resolution,
    failures: &mut BTreeMap<String, String>,
) -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    let mut queue: VecDeque<String> = VecDeque::new();
    let mut reported_unknown = BTreeSet::new();

    for constraint in &manifest.modules {
        queue.push_back(constraint.name.clone());
    }
    for name in overrides.keys() {
        if registry.contains(name) {
            queue.push_back(name.clone());
        } else if reported_unknown.insert(name.clone()) {
            resolution.errors.push(FlowError::ModuleNotFound(name.clone()));
        }
    }

    while let Some(name) = queue.pop_front() {
        if graph.contains_key(&name) {
            continue;
        }
        let Some(descriptor) = registry.descriptor(&name) else {
            if reported_unknown.insert(name.clone()) {
                resolution.errors.push(FlowError::ModuleNotFound(name.clone()));
            }
            continue;
        };
        let mut deps: BTreeSet<String> = descriptor.dependencies.clone();
        if let Some(constraint) = manifest.constraint(&name) {
            deps.extend(constraint.dependencies.iter().cloned());
        }
        let mut present = BTreeSet::new();
        for dep in deps {
            if registry.contains(&dep) {
                if !graph.contains_key(&dep) {
                    queue.push_back(dep.clone());
                }
                present.insert(dep);
            } else {
                resolution.errors.push(FlowError::MissingDependency {
                    module: name.clone(),
                    missing: dep.clone(),
                });
                failures
                    .entry(name.clone())
                    .or_insert_with(|| format!("missing dependency {dep}"));
            }
        }
        graph.insert(name, present);
    }
    graph
}

fn decide(
    name: &str,
    manifest: &DeveloperManifest,
    preferences: &UserPreferences,
    overrides: &CliOverrides,
    registry: &ModuleRegistry,
    resolution: &mut Resolution,
) -> Decision {
    let required = manifest
        .constraint(name)
        .is_some_and(|constraint| constraint.required);
    let user_disabled = preferences.disabled_modules.contains(name);

    match overrides.get(name) {
        Some(false) if required => {
            resolution.warnings.push(format!(
                "module {name} is required; ignoring --disable {name}"
            ));
            return Decision {
                enabled: true,
                source: Source::Required,
            };
        }
        Some(enabled) => {
            return Decision {
                enabled: *enabled,
                source: Source::Cli,
            };
        }
        None => {}
    }

    if required {
        if user_disabled {
            resolution.warnings.push(format!(
                "module {name} is required; ignoring disabled preference"
            ));
        }
        return Decision {
            enabled: true,
            source: Source::Required,
        };
    }
    if user_disabled {
        return Decision {
            enabled: false,
            source: Source::Preference,
        };
    }
    if preferences.enabled_modules.contains(name) {
        return Decision {
            enabled: true,
            source: Source::Preference,
        };
    }
    Decision {
        enabled: registry
            .descriptor(name)
            .is_some_and(|descriptor| descriptor.default_enabled),
        source: Source::Default,
    }
}

fn check_version(
    name: &str,
    registry: &ModuleRegistry,
    manifest: &DeveloperManifest,
    resolution: &mut Resolution,
    failures: &mut BTreeMap<String, String>,
) {
    let Some(required) = manifest
        .constraint(name)
        .and_then(|constraint| constraint.version.as_deref())
    else {
        return;
    };
    let Some(descriptor) = registry.descriptor(name) else {
        return;
    };
    let req = match VersionReq::parse(required) {
        Ok(req) => req,
        Err(err) => {
            resolution
                .errors
                .push(FlowError::Configuration(format!("module {name}: {err}")));
            failures
                .entry(name.to_string())
                .or_insert_with(|| err.to_string());
            return;
        }
    };
    let found = match Version::parse(&descriptor.version) {
        Ok(found) => found,
        Err(err) => {
            resolution
                .errors
                .push(FlowError::Configuration(format!("module {name}: {err}")));
            failures
                .entry(name.to_string())
                .or_insert_with(|| err.to_string());
            return;
        }
    };
    if !req.matches(&found) {
        resolution.errors.push(FlowError::VersionConflict {
            module: name.to_string(),
            found: descriptor.version.clone(),
            required: required.to_string(),
        });
        failures
            .entry(name.to_string())
            .or_insert_with(|| format!("version {} does not satisfy {required}", descriptor.version));
    }
}

#[cfg(test)]
#[path = "resolve_tests.rs"]
mod tests;
