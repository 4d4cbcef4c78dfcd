//! Scripted modules for unit tests.
use super::{DocModule, ExecutionContext, ExecutionResult, ModuleDescriptor, ModuleRegistry};
use crate::config::ConfigMap;
use anyhow::{anyhow, Result};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Behavior {
    Succeed,
    Fail,
    FailInit,
    Panic,
    PanicInit,
    PanicCleanup,
}

/// Calls observed by a scripted module, shared with the test body.
#[derive(Debug, Default)]
pub(crate) struct CallLog {
    pub(crate) events: Vec<String>,
    pub(crate) contexts: Vec<ExecutionContext>,
}

pub(crate) struct ScriptedModule {
    descriptor: ModuleDescriptor,
    behavior: Behavior,
    log: Rc<RefCell<CallLog>>,
}

impl ScriptedModule {
    pub(crate) fn new(descriptor: ModuleDescriptor, behavior: Behavior) -> Self {
        Self {
            descriptor,
            behavior,
            log: Rc::default(),
        }
    }

    pub(crate) fn with_log(mut self, log: Rc<RefCell<CallLog>>) -> Self {
        self.log = log;
        self
    }

    fn record(&self, event: &str) {
        self.log
            .borrow_mut()
            .events
            .push(format!("{}:{event}", self.descriptor.name));
    }
}

impl DocModule for ScriptedModule {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    fn initialize(&mut self, _config: &ConfigMap) -> Result<()> {
        self.record("initialize");
        if self.behavior == Behavior::FailInit {
            return Err(anyhow!("bad config"));
        }
        if self.behavior == Behavior::PanicInit {
            panic!("scripted init panic");
        }
        Ok(())
    }

    fn execute(&mut self, context: &ExecutionContext) -> Result<ExecutionResult> {
        self.record("execute");
        self.log.borrow_mut().contexts.push(context.clone());
        match self.behavior {
            Behavior::Succeed
            | Behavior::FailInit
            | Behavior::PanicInit
            | Behavior::PanicCleanup => {
                let mut outputs = ConfigMap::new();
                outputs.insert(
                    "ran".to_string(),
                    serde_json::json!(self.descriptor.name.clone()),
                );
                Ok(ExecutionResult {
                    files_processed: context.files.len() as u64,
                    files_modified: 1,
                    outputs,
                })
            }
            Behavior::Fail => Err(anyhow!("scripted failure")),
            Behavior::Panic => panic!("scripted panic"),
        }
    }

    fn cleanup(&mut self) {
        self.record("cleanup");
        if self.behavior == Behavior::PanicCleanup {
            panic!("scripted cleanup panic");
        }
    }
}

/// Build a registry of always-succeeding modules from `(name, deps)` pairs.
pub(crate) fn registry_of(modules: &[(&str, &[&str])]) -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    for (name, deps) in modules {
        let descriptor = ModuleDescriptor::new(name, "1.0.0").with_dependencies(deps);
        registry
            .register(Box::new(ScriptedModule::new(descriptor, Behavior::Succeed)))
            .expect("register scripted module");
    }
    registry
}
