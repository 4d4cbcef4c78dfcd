use clap::Parser;
use std::process::ExitCode;

mod cli;
mod commands;
mod config;
mod discovery;
mod error;
mod logging;
mod modules;
mod orchestrator;
mod paths;
mod resolve;
mod workflow;

use crate::cli::RootArgs;
use crate::error::{error_chain_message, exit_code_for};

fn main() -> ExitCode {
    let args = RootArgs::parse();
    logging::init_logging(args.global.verbose);
    match commands::run(args) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            tracing::debug!(error = ?err, "command failed");
            eprintln!("error: {}", error_chain_message(&err));
            ExitCode::from(exit_code_for(&err))
        }
    }
}
