//! CLI argument parsing for docflow.
//!
//! The CLI is thin: argument types only. Behavior lives in `commands`.
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "docflow",
    version,
    about = "Resumable, dependency-ordered document processing workflows",
    after_help = "Examples:\n  docflow plan\n  docflow start proj ./docs --interactive\n  docflow resume proj --all\n  docflow status proj --json\n  docflow retry proj whitespace\n  docflow cleanup --completed",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every command.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// State directory holding the manifest, preferences, and workflows
    #[arg(long, value_name = "DIR", global = true)]
    pub state_dir: Option<PathBuf>,

    /// Developer manifest to use instead of the installed one
    #[arg(long, value_name = "PATH", global = true)]
    pub manifest: Option<PathBuf>,

    /// Log debug detail to stderr
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Init(InitArgs),
    Plan(PlanArgs),
    Start(StartArgs),
    #[command(alias = "continue")]
    Resume(ResumeArgs),
    Status(StatusArgs),
    List(ListArgs),
    Cleanup(CleanupArgs),
    Retry(ModuleTargetArgs),
    Skip(SkipArgs),
    Prefs(PrefsArgs),
}

/// Write the default developer manifest into the state directory.
#[derive(Parser, Debug)]
#[command(about = "Install a starter developer manifest")]
pub struct InitArgs {
    /// Overwrite an existing manifest.json
    #[arg(long)]
    pub force: bool,

    /// Print the manifest instead of installing it
    #[arg(long, conflicts_with = "force")]
    pub stdout: bool,
}

/// Per-invocation module enablement overrides.
#[derive(Args, Debug, Clone, Default)]
pub struct OverrideArgs {
    /// Enable a module for this invocation only (repeatable)
    #[arg(long = "enable", value_name = "MODULE")]
    pub enable: Vec<String>,

    /// Disable a module for this invocation only (repeatable)
    #[arg(long = "disable", value_name = "MODULE")]
    pub disable: Vec<String>,
}

/// How far a run should go.
#[derive(Args, Debug, Clone, Default)]
pub struct StepArgs {
    /// Run interactive modules instead of pausing before them
    #[arg(long)]
    pub interactive: bool,

    /// Keep stepping until the workflow completes, fails, or pauses
    #[arg(long)]
    pub all: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Show the resolved module plan without touching workflows")]
pub struct PlanArgs {
    #[command(flatten)]
    pub overrides: OverrideArgs,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Create a workflow over a directory and run its first module")]
pub struct StartArgs {
    /// Workflow name
    pub name: String,

    /// Directory containing the documents to process
    #[arg(value_name = "DIR")]
    pub directory: PathBuf,

    #[command(flatten)]
    pub overrides: OverrideArgs,

    #[command(flatten)]
    pub step: StepArgs,

    /// Only create the workflow; run nothing
    #[arg(long, conflicts_with_all = ["interactive", "all"])]
    pub no_run: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Run the next module of a workflow")]
pub struct ResumeArgs {
    /// Workflow name
    pub name: String,

    #[command(flatten)]
    pub overrides: OverrideArgs,

    #[command(flatten)]
    pub step: StepArgs,
}

#[derive(Parser, Debug)]
#[command(about = "Summarize a workflow's progress")]
pub struct StatusArgs {
    /// Workflow name
    pub name: String,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "List persisted workflows")]
pub struct ListArgs {
    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Delete workflows by name or by status")]
pub struct CleanupArgs {
    /// Workflow to delete
    #[arg(required_unless_present_any = ["completed", "failed"])]
    pub name: Option<String>,

    /// Delete every completed workflow
    #[arg(long)]
    pub completed: bool,

    /// Delete every failed workflow
    #[arg(long)]
    pub failed: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Requeue a failed module with a fresh retry budget")]
pub struct ModuleTargetArgs {
    /// Workflow name
    pub name: String,

    /// Module to act on
    pub module: String,
}

#[derive(Parser, Debug)]
#[command(about = "Mark a module skipped so its dependents can run")]
pub struct SkipArgs {
    #[command(flatten)]
    pub target: ModuleTargetArgs,
}

#[derive(Parser, Debug)]
#[command(about = "Show or edit persisted module preferences")]
pub struct PrefsArgs {
    #[command(subcommand)]
    pub action: PrefsAction,
}

#[derive(Subcommand, Debug)]
pub enum PrefsAction {
    /// Print current preferences as JSON
    Show,
    /// Enable an optional module in future runs
    Enable { module: String },
    /// Disable an optional module in future runs
    Disable { module: String },
    /// Forget enablement and config overrides for a module
    Reset { module: String },
    /// Override one config key for a module (VALUE is parsed as JSON, else taken as a string)
    Set {
        module: String,
        key: String,
        value: String,
    },
}
