//! Command handlers behind the CLI.
//!
//! Handlers return the process exit code for outcomes that are not errors
//! (a blocked workflow, a failed module); real errors propagate to `main`.
use crate::cli::{
    CleanupArgs, Command, GlobalArgs, InitArgs, ListArgs, ModuleTargetArgs, OverrideArgs,
    PlanArgs, PrefsAction, PrefsArgs, ResumeArgs, RootArgs, StartArgs, StatusArgs, StepArgs,
};
use crate::config::{
    cli_overrides, default_manifest, load_manifest_or_default, load_preferences, manifest_stub,
    write_manifest, write_preferences, DeveloperManifest, UserPreferences,
};
use crate::error::{error_chain_message, FlowError, EXIT_INVALID, EXIT_OK};
use crate::modules::{builtin_registry, ModuleRegistry};
use crate::orchestrator::{Orchestrator, ResolveInputs, StepObserver, StepOutcome};
use crate::paths::{resolve_state_dir, StatePaths};
use crate::resolve::resolve;
use crate::workflow::{
    now_epoch_ms, progress_summary, NextModule, PlannedModule, Workflow, WorkflowStatus,
    WorkflowStore,
};
use anyhow::{Context, Result};

/// Dispatch a parsed command line.
pub fn run(args: RootArgs) -> Result<u8> {
    let global = args.global;
    match args.command {
        Command::Init(args) => run_init(&global, args),
        Command::Plan(args) => run_plan(&global, args),
        Command::Start(args) => run_start(&global, args),
        Command::Resume(args) => run_resume(&global, args),
        Command::Status(args) => run_status(&global, args),
        Command::List(args) => run_list(&global, args),
        Command::Cleanup(args) => run_cleanup(&global, args),
        Command::Retry(args) => run_retry(&global, args),
        Command::Skip(args) => run_skip(&global, args.target),
        Command::Prefs(args) => run_prefs(&global, args),
    }
}

/// State directory plus the configuration tiers loaded from it.
struct Session {
    paths: StatePaths,
    manifest: DeveloperManifest,
    preferences: UserPreferences,
}

impl Session {
    fn load(global: &GlobalArgs) -> Result<Self> {
        let paths = StatePaths::new(resolve_state_dir(global.state_dir.as_deref())?);
        let manifest = load_manifest_or_default(&paths, global.manifest.as_deref())?;
        let preferences = load_preferences(&paths)?;
        tracing::debug!(state_dir = %paths.root().display(), "session loaded");
        Ok(Self {
            paths,
            manifest,
            preferences,
        })
    }

    fn store(&self) -> WorkflowStore {
        WorkflowStore::new(self.paths.clone())
    }

    fn orchestrator(self, overrides: &OverrideArgs) -> Result<Orchestrator> {
        let overrides = cli_overrides(&overrides.enable, &overrides.disable)?;
        let store = self.store();
        Ok(Orchestrator::new(
            builtin_registry()?,
            store,
            ResolveInputs {
                manifest: self.manifest,
                preferences: self.preferences,
                overrides,
            },
        ))
    }
}

fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        eprintln!("warning: {warning}");
    }
}

fn run_init(global: &GlobalArgs, args: InitArgs) -> Result<u8> {
    if args.stdout {
        println!("{}", manifest_stub()?);
        return Ok(EXIT_OK);
    }
    let paths = StatePaths::new(resolve_state_dir(global.state_dir.as_deref())?);
    let path = paths.manifest_path();
    if path.is_file() && !args.force {
        return Err(FlowError::Configuration(format!(
            "manifest already exists at {} (use --force to overwrite)",
            path.display()
        ))
        .into());
    }
    write_manifest(&paths, &default_manifest())?;
    println!("wrote {}", path.display());
    Ok(EXIT_OK)
}

fn run_plan(global: &GlobalArgs, args: PlanArgs) -> Result<u8> {
    let session = Session::load(global)?;
    let overrides = cli_overrides(&args.overrides.enable, &args.overrides.disable)?;
    let registry = builtin_registry()?;
    let resolution = resolve(
        &registry,
        &session.manifest,
        &session.preferences,
        &overrides,
    )?;
    let errors: Vec<String> = resolution.errors.iter().map(ToString::to_string).collect();

    if args.json {
        let report = serde_json::json!({
            "plan": resolution.plan,
            "warnings": resolution.warnings,
            "errors": errors,
        });
        let text = serde_json::to_string_pretty(&report).context("serialize plan")?;
        println!("{text}");
    } else {
        print_warnings(&resolution.warnings);
        for entry in &resolution.plan {
            let mut line = format!(
                "{:>2}. {:<12} {:<8} {:<8}",
                entry.init_order, entry.name, entry.resolved_version, entry.state
            );
            if !entry.resolved_dependencies.is_empty() {
                line.push_str(&format!(" after {}", entry.resolved_dependencies.join(", ")));
            }
            if entry.required {
                line.push_str(" (required)");
            }
            if entry.interactive {
                line.push_str(" (interactive)");
            }
            if let Some(descriptor) = registry
                .descriptor(&entry.name)
                .filter(|descriptor| !descriptor.description.is_empty())
            {
                line.push_str(&format!(" - {}", descriptor.description));
            }
            println!("{}", line.trim_end());
        }
        println!(
            "{} of {} modules enabled",
            resolution.enabled().count(),
            resolution.plan.len()
        );
        for error in &errors {
            eprintln!("error: {error}");
        }
    }
    Ok(if errors.is_empty() { EXIT_OK } else { EXIT_INVALID })
}

fn run_start(global: &GlobalArgs, args: StartArgs) -> Result<u8> {
    let session = Session::load(global)?;
    let mut orchestrator = session.orchestrator(&args.overrides)?;
    let started = orchestrator.start(&args.name, &args.directory);
    print_warnings(orchestrator.warnings());
    let workflow = started?;
    println!(
        "created workflow {} over {} ({} files, {} modules)",
        workflow.name,
        workflow.root_directory.display(),
        workflow.discovered_files.len(),
        workflow.ordered_module_plan.len()
    );
    if args.no_run {
        return Ok(EXIT_OK);
    }
    run_steps(&mut orchestrator, &args.name, &args.step)
}

fn run_resume(global: &GlobalArgs, args: ResumeArgs) -> Result<u8> {
    let session = Session::load(global)?;
    let mut orchestrator = session.orchestrator(&args.overrides)?;
    let resolved = orchestrator.resolved_plan().map(|_| ());
    print_warnings(orchestrator.warnings());
    resolved?;
    run_steps(&mut orchestrator, &args.name, &args.step)
}

/// Prints progress and decides whether interactive modules run.
struct ConsoleObserver {
    interactive: bool,
}

impl StepObserver for ConsoleObserver {
    fn confirm_interactive(&mut self, workflow: &Workflow, module: &PlannedModule) -> bool {
        if self.interactive {
            println!("running interactive module {} {}", module.name, module.version);
            return true;
        }
        println!(
            "module {} is interactive; run `docflow resume {} --interactive` to continue",
            module.name, workflow.name
        );
        false
    }

    fn module_starting(&mut self, _workflow: &Workflow, module: &str) {
        println!("running {module}");
    }
}

fn run_steps(orchestrator: &mut Orchestrator, name: &str, step: &StepArgs) -> Result<u8> {
    let mut observer = ConsoleObserver {
        interactive: step.interactive,
    };
    loop {
        let outcome = orchestrator.step(name, &mut observer)?;
        report_outcome(name, &outcome);
        if !(step.all && outcome.can_continue()) {
            return Ok(outcome.exit_code());
        }
    }
}

fn report_outcome(name: &str, outcome: &StepOutcome) {
    match outcome {
        StepOutcome::Completed {
            module,
            files_processed,
            files_modified,
            elapsed_seconds,
            workflow_status,
        } => {
            println!(
                "{module} completed in {elapsed_seconds:.2}s ({files_processed} processed, {files_modified} modified)"
            );
            if *workflow_status == WorkflowStatus::Completed {
                println!("workflow {name} completed");
            }
        }
        StepOutcome::Failed {
            module,
            message,
            will_retry,
        } => {
            eprintln!("{module} failed: {message}");
            if *will_retry {
                eprintln!("{module} will be retried on the next resume");
            } else {
                eprintln!(
                    "{module} is out of retries; use `docflow retry {name} {module}` or `docflow skip {name} {module}`"
                );
            }
        }
        StepOutcome::Paused { module } => println!("workflow {name} paused before {module}"),
        StepOutcome::Blocked {
            failed_module,
            waiting_module,
        } => match waiting_module {
            Some(waiting) => {
                eprintln!("workflow {name} is blocked: {waiting} needs failed module {failed_module}")
            }
            None => eprintln!("workflow {name} is blocked on failed module {failed_module}"),
        },
        StepOutcome::Done => println!("workflow {name} is complete; nothing to do"),
    }
}

fn run_status(global: &GlobalArgs, args: StatusArgs) -> Result<u8> {
    let session = Session::load(global)?;
    let workflow = session.store().load(&args.name)?;
    let summary = progress_summary(&workflow);
    let next = workflow.next_module();

    if args.json {
        let next = match &next {
            NextModule::Ready(module) => serde_json::json!({ "kind": "ready", "module": module }),
            NextModule::Done => serde_json::json!({ "kind": "done" }),
            NextModule::Blocked {
                failed_module,
                waiting_module,
            } => serde_json::json!({
                "kind": "blocked",
                "failed_module": failed_module,
                "waiting_module": waiting_module,
            }),
        };
        let report = serde_json::json!({
            "workflow": workflow,
            "progress": summary,
            "next": next,
        });
        let text = serde_json::to_string_pretty(&report).context("serialize status")?;
        println!("{text}");
        return Ok(EXIT_OK);
    }

    println!("workflow {} ({})", workflow.name, workflow.status);
    println!("  root: {}", workflow.root_directory.display());
    println!("  files: {}", workflow.discovered_files.len());
    println!(
        "  progress: {}/{} modules done ({:.0}%), {} failed, {} skipped",
        summary.completed + summary.skipped,
        summary.total,
        summary.percent_complete,
        summary.failed,
        summary.skipped
    );
    println!(
        "  work: {:.2}s, {} files processed, {} modified",
        summary.execution_time_seconds, summary.files_processed, summary.files_modified
    );
    println!(
        "  last activity: {}",
        format_age(workflow.last_activity_at_epoch_ms)
    );
    for entry in &workflow.ordered_module_plan {
        let Some(state) = workflow.state(&entry.name) else {
            continue;
        };
        let mut line = format!("    {:<12} {}", entry.name, state.status);
        if state.retry_count > 0 {
            line.push_str(&format!(" (attempts: {})", state.retry_count));
        }
        if let Some(message) = &state.error_message {
            line.push_str(&format!(": {message}"));
        }
        println!("{line}");
    }
    match next {
        NextModule::Ready(module) => println!("  next: {module}"),
        NextModule::Done => println!("  next: nothing, all modules finished"),
        NextModule::Blocked { failed_module, .. } => {
            println!("  next: blocked on failed module {failed_module}")
        }
    }
    Ok(EXIT_OK)
}

fn run_list(global: &GlobalArgs, args: ListArgs) -> Result<u8> {
    let session = Session::load(global)?;
    let listed = session.store().list()?;

    if args.json {
        let rows: Vec<serde_json::Value> = listed
            .iter()
            .map(|(name, loaded)| match loaded {
                Ok(workflow) => serde_json::json!({
                    "name": name,
                    "status": workflow.status,
                    "percent_complete": progress_summary(workflow).percent_complete,
                    "last_activity_at_epoch_ms": workflow.last_activity_at_epoch_ms,
                }),
                Err(err) => serde_json::json!({
                    "name": name,
                    "error": error_chain_message(err),
                }),
            })
            .collect();
        let text = serde_json::to_string_pretty(&rows).context("serialize workflow list")?;
        println!("{text}");
        return Ok(EXIT_OK);
    }

    if listed.is_empty() {
        println!("no workflows");
        return Ok(EXIT_OK);
    }
    for (name, loaded) in &listed {
        match loaded {
            Ok(workflow) => println!(
                "{name:<20} {:<10} {:>4.0}%  {}",
                workflow.status,
                progress_summary(workflow).percent_complete,
                format_age(workflow.last_activity_at_epoch_ms)
            ),
            Err(err) => println!("{name:<20} unreadable: {}", error_chain_message(err)),
        }
    }
    Ok(EXIT_OK)
}

fn run_cleanup(global: &GlobalArgs, args: CleanupArgs) -> Result<u8> {
    let session = Session::load(global)?;
    let store = session.store();
    let mut targets = Vec::new();
    if let Some(name) = args.name {
        targets.push(name);
    }
    if args.completed || args.failed {
        for (name, loaded) in store.list()? {
            let Ok(workflow) = loaded else {
                continue;
            };
            let matches = (args.completed && workflow.status == WorkflowStatus::Completed)
                || (args.failed && workflow.status == WorkflowStatus::Failed);
            if matches && !targets.contains(&name) {
                targets.push(name);
            }
        }
    }
    if targets.is_empty() {
        println!("no workflows matched");
        return Ok(EXIT_OK);
    }
    for name in &targets {
        store.remove(name)?;
        println!("removed {name}");
    }
    Ok(EXIT_OK)
}

fn run_retry(global: &GlobalArgs, args: ModuleTargetArgs) -> Result<u8> {
    let session = Session::load(global)?;
    let store = session.store();
    let mut workflow = store.load(&args.name)?;
    workflow.retry_module(&args.module, now_epoch_ms())?;
    store.persist(&workflow)?;
    println!(
        "{} requeued; run `docflow resume {}` to retry it",
        args.module, args.name
    );
    Ok(EXIT_OK)
}

fn run_skip(global: &GlobalArgs, args: ModuleTargetArgs) -> Result<u8> {
    let session = Session::load(global)?;
    let store = session.store();
    let mut workflow = store.load(&args.name)?;
    workflow.skip_module(&args.module, now_epoch_ms())?;
    store.persist(&workflow)?;
    println!("{} skipped; workflow is {}", args.module, workflow.status);
    Ok(EXIT_OK)
}

fn run_prefs(global: &GlobalArgs, args: PrefsArgs) -> Result<u8> {
    let session = Session::load(global)?;
    let mut prefs = session.preferences;
    let registry = builtin_registry()?;
    match args.action {
        PrefsAction::Show => {
            let text = serde_json::to_string_pretty(&prefs).context("serialize preferences")?;
            println!("{text}");
            return Ok(EXIT_OK);
        }
        PrefsAction::Enable { module } => {
            require_known(&registry, &module)?;
            prefs.enable(&module);
        }
        PrefsAction::Disable { module } => {
            require_known(&registry, &module)?;
            if session
                .manifest
                .constraint(&module)
                .is_some_and(|constraint| constraint.required)
            {
                eprintln!("warning: module {module} is required; the preference will be ignored");
            }
            prefs.disable(&module);
        }
        PrefsAction::Reset { module } => prefs.reset(&module),
        PrefsAction::Set { module, key, value } => {
            require_known(&registry, &module)?;
            let value = serde_json::from_str(&value).unwrap_or(serde_json::Value::String(value));
            prefs.set_override(&module, &key, value);
        }
    }
    write_preferences(&session.paths, &prefs)?;
    println!("wrote {}", session.paths.preferences_path().display());
    Ok(EXIT_OK)
}

fn require_known(registry: &ModuleRegistry, module: &str) -> Result<(), FlowError> {
    if registry.contains(module) {
        Ok(())
    } else {
        Err(FlowError::ModuleNotFound(module.to_string()))
    }
}

fn format_age(epoch_ms: u64) -> String {
    let seconds = now_epoch_ms().saturating_sub(epoch_ms) / 1_000;
    match seconds {
        0..=59 => format!("{seconds}s ago"),
        60..=3_599 => format!("{}m ago", seconds / 60),
        3_600..=86_399 => format!("{}h ago", seconds / 3_600),
        _ => format!("{}d ago", seconds / 86_400),
    }
}
