//! Built-in document modules.
//!
//! The transformations are deliberately small; they exist so a fresh install
//! has a real plan to run.
use super::{DocModule, ExecutionContext, ExecutionResult, ModuleDescriptor, ModuleRegistry};
use crate::config::{ConfigMap, DEFAULT_EXTENSIONS};
use crate::discovery::normalize_extensions;
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde_json::json;
use std::fs;

/// Build the registry of modules shipped with the binary.
pub fn builtin_registry() -> Result<ModuleRegistry> {
    let mut registry = ModuleRegistry::new();
    registry.register(Box::new(ScopeModule::new()))?;
    registry.register(Box::new(WhitespaceModule::new()))?;
    registry.register(Box::new(LinksModule::new()))?;
    Ok(registry)
}

/// Confirms which file extensions the workflow covers.
struct ScopeModule {
    descriptor: ModuleDescriptor,
}

impl ScopeModule {
    fn new() -> Self {
        Self {
            descriptor: ModuleDescriptor::new("scope", "1.0.0")
                .with_description("Confirm the document set the workflow covers")
                .interactive(),
        }
    }
}

impl DocModule for ScopeModule {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    fn initialize(&mut self, config: &ConfigMap) -> Result<()> {
        if let Some(value) = config.get("extensions") {
            let valid = value
                .as_array()
                .is_some_and(|items| items.iter().all(serde_json::Value::is_string));
            if !valid {
                return Err(anyhow!("extensions must be a list of strings"));
            }
        }
        Ok(())
    }

    fn execute(&mut self, context: &ExecutionContext) -> Result<ExecutionResult> {
        let extensions = context
            .config_strings("extensions")
            .unwrap_or_else(|| DEFAULT_EXTENSIONS.iter().map(|ext| ext.to_string()).collect());
        let extensions = normalize_extensions(&extensions);
        if extensions.is_empty() {
            return Err(anyhow!("scope needs at least one file extension"));
        }
        let mut outputs = ConfigMap::new();
        outputs.insert("extensions".to_string(), json!(extensions));
        outputs.insert("file_count".to_string(), json!(context.files.len()));
        Ok(ExecutionResult {
            files_processed: context.files.len() as u64,
            files_modified: 0,
            outputs,
        })
    }
}

/// Strips trailing whitespace and normalizes the final newline.
struct WhitespaceModule {
    descriptor: ModuleDescriptor,
    trailing: Option<Regex>,
    blank_runs: Option<Regex>,
}

impl WhitespaceModule {
    fn new() -> Self {
        Self {
            descriptor: ModuleDescriptor::new("whitespace", "1.2.0")
                .with_description("Strip trailing whitespace and normalize line endings")
                .with_dependencies(&["scope"])
                .with_default("collapse_blank_lines", json!(false)),
            trailing: None,
            blank_runs: None,
        }
    }

    fn normalize(&self, text: &str) -> Result<String> {
        let trailing = self
            .trailing
            .as_ref()
            .ok_or_else(|| anyhow!("whitespace module used before initialize"))?;
        let unix = text.replace("\r\n", "\n");
        let mut cleaned = trailing.replace_all(&unix, "").into_owned();
        if let Some(blank_runs) = &self.blank_runs {
            cleaned = blank_runs.replace_all(&cleaned, "\n\n").into_owned();
        }
        let body = cleaned.trim_end_matches('\n');
        if body.is_empty() {
            return Ok(String::new());
        }
        Ok(format!("{body}\n"))
    }
}

impl DocModule for WhitespaceModule {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    fn initialize(&mut self, config: &ConfigMap) -> Result<()> {
        self.trailing = Some(Regex::new(r"(?m)[ \t]+$").context("compile trailing regex")?);
        let collapse = config
            .get("collapse_blank_lines")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        self.blank_runs = if collapse {
            Some(Regex::new(r"\n{3,}").context("compile blank line regex")?)
        } else {
            None
        };
        Ok(())
    }

    fn execute(&mut self, context: &ExecutionContext) -> Result<ExecutionResult> {
        let mut result = ExecutionResult::default();
        for path in context.absolute_files() {
            let Ok(text) = fs::read_to_string(&path) else {
                tracing::warn!(
                    workflow = %context.workflow,
                    path = %path.display(),
                    "skipping unreadable or non-UTF-8 file"
                );
                continue;
            };
            result.files_processed += 1;
            let normalized = self.normalize(&text)?;
            if normalized != text {
                fs::write(&path, normalized.as_bytes())
                    .with_context(|| format!("write {}", path.display()))?;
                result.files_modified += 1;
            }
        }
        result
            .outputs
            .insert("files_modified".to_string(), json!(result.files_modified));
        Ok(result)
    }

    fn cleanup(&mut self) {
        self.trailing = None;
        self.blank_runs = None;
    }
}

/// Reports Markdown links; never modifies files.
struct LinksModule {
    descriptor: ModuleDescriptor,
    link: Option<Regex>,
    fail_on_empty: bool,
}

impl LinksModule {
    fn new() -> Self {
        Self {
            descriptor: ModuleDescriptor::new("links", "0.3.0")
                .with_description("Report Markdown links and empty link targets")
                .with_dependencies(&["whitespace"])
                .with_default("fail_on_empty_targets", json!(false)),
            link: None,
            fail_on_empty: false,
        }
    }
}

impl DocModule for LinksModule {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    fn initialize(&mut self, config: &ConfigMap) -> Result<()> {
        self.link = Some(Regex::new(r"\[([^\]]*)\]\(([^)]*)\)").context("compile link regex")?);
        self.fail_on_empty = config
            .get("fail_on_empty_targets")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        Ok(())
    }

    fn execute(&mut self, context: &ExecutionContext) -> Result<ExecutionResult> {
        let link = self
            .link
            .as_ref()
            .ok_or_else(|| anyhow!("links module used before initialize"))?;
        if let Some(rewritten) = context
            .upstream_outputs
            .get("whitespace")
            .and_then(|outputs| outputs.get("files_modified"))
        {
            tracing::debug!(workflow = %context.workflow, %rewritten, "scanning links after whitespace pass");
        }
        let mut result = ExecutionResult::default();
        let mut links = 0u64;
        let mut empty = Vec::new();
        for (rel, path) in context.files.iter().zip(context.absolute_files()) {
            let Ok(text) = fs::read_to_string(&path) else {
                continue;
            };
            result.files_processed += 1;
            for caps in link.captures_iter(&text) {
                links += 1;
                let target = caps.get(2).map_or("", |target| target.as_str());
                if target.trim().is_empty() {
                    empty.push(rel.display().to_string());
                }
            }
        }
        if self.fail_on_empty && !empty.is_empty() {
            return Err(anyhow!(
                "{} link(s) with empty targets in {}",
                empty.len(),
                empty.join(", ")
            ));
        }
        result.outputs.insert("links".to_string(), json!(links));
        result
            .outputs
            .insert("empty_targets".to_string(), json!(empty.len()));
        Ok(result)
    }

    fn cleanup(&mut self) {
        self.link = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn context(root: &TempDir, files: &[&str], config: ConfigMap) -> ExecutionContext {
        ExecutionContext {
            workflow: "test".to_string(),
            root_directory: root.path().to_path_buf(),
            files: files.iter().map(PathBuf::from).collect(),
            config,
            upstream_outputs: Default::default(),
        }
    }

    #[test]
    fn builtin_registry_has_expected_chain() {
        let registry = builtin_registry().expect("registry");
        let names: Vec<_> = registry.descriptors().map(|d| d.name.clone()).collect();
        assert_eq!(names, vec!["links", "scope", "whitespace"]);
        assert!(registry.descriptor("scope").expect("scope").interactive);
        assert!(registry
            .descriptor("links")
            .expect("links")
            .dependencies
            .contains("whitespace"));
    }

    #[test]
    fn whitespace_strips_trailing_and_counts_modified() {
        let root = TempDir::new().expect("temp dir");
        fs::write(root.path().join("a.md"), "title  \r\nbody\t\n\n\n").expect("write a");
        fs::write(root.path().join("b.md"), "clean\n").expect("write b");

        let mut module = WhitespaceModule::new();
        module.initialize(&ConfigMap::new()).expect("init");
        let result = module
            .execute(&context(&root, &["a.md", "b.md"], ConfigMap::new()))
            .expect("execute");
        module.cleanup();

        assert_eq!(result.files_processed, 2);
        assert_eq!(result.files_modified, 1);
        let a = fs::read_to_string(root.path().join("a.md")).expect("read a");
        assert_eq!(a, "title\nbody\n");
    }

    #[test]
    fn whitespace_collapses_blank_runs_when_configured() {
        let mut module = WhitespaceModule::new();
        let mut config = ConfigMap::new();
        config.insert("collapse_blank_lines".to_string(), json!(true));
        module.initialize(&config).expect("init");
        let out = module.normalize("a\n\n\n\nb").expect("normalize");
        assert_eq!(out, "a\n\nb\n");
    }

    #[test]
    fn links_counts_and_fails_on_empty_targets() {
        let root = TempDir::new().expect("temp dir");
        fs::write(
            root.path().join("doc.md"),
            "see [one](https://a) and [two]() here\n",
        )
        .expect("write doc");

        let mut module = LinksModule::new();
        module.initialize(&ConfigMap::new()).expect("init");
        let result = module
            .execute(&context(&root, &["doc.md"], ConfigMap::new()))
            .expect("execute");
        assert_eq!(result.outputs["links"], json!(2));
        assert_eq!(result.outputs["empty_targets"], json!(1));

        let mut strict = ConfigMap::new();
        strict.insert("fail_on_empty_targets".to_string(), json!(true));
        module.initialize(&strict).expect("init strict");
        let err = module
            .execute(&context(&root, &["doc.md"], strict))
            .expect_err("empty target should fail");
        assert!(err.to_string().contains("doc.md"));
    }

    #[test]
    fn scope_normalizes_extensions() {
        let root = TempDir::new().expect("temp dir");
        let mut config = ConfigMap::new();
        config.insert("extensions".to_string(), json!([".MD", "rst"]));
        let mut module = ScopeModule::new();
        module.initialize(&config).expect("init");
        let result = module
            .execute(&context(&root, &["x.md"], config))
            .expect("execute");
        assert_eq!(result.outputs["extensions"], json!(["md", "rst"]));
        assert_eq!(result.files_processed, 1);

        let mut bad = ConfigMap::new();
        bad.insert("extensions".to_string(), json!("md"));
        assert!(module.initialize(&bad).is_err());
    }
}
