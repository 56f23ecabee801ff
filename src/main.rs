//! CLI entry point for the gridstage tool.

use anyhow::Result;
use clap::Parser;
use gridstage_core::Context;
use tracing::{debug, info};

mod app_config;
mod cli;
mod commands;
mod exit_handler;
mod terminal;

use app_config::{Settings, load_config};
use cli::{Cli, Command};
use exit_handler::ProcessExit;

#[tokio::main]
async fn main() {
    let exit = match run().await {
        Ok(exit) => exit,
        Err(error) => {
            eprintln!("error: {error:#}");
            ProcessExit::Failure
        }
    };
    std::process::exit(exit.code());
}

async fn run() -> Result<ProcessExit> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();

    let loaded = load_config(cli.config.as_deref())?;
    let settings = Settings::from_file(loaded.config.as_ref());

    // Priority: RUST_LOG env var > quiet flag > verbose flag > config file > info
    let default_level =
        terminal::resolve_default_log_level(cli.verbose, cli.quiet, settings.verbosity);
    terminal::init_tracing(default_level);

    debug!(?cli, config_path = ?loaded.path, ?settings, "CLI arguments parsed");

    let context = Context::mock();
    info!(version = Context::version(), plugins = ?context.plugin_names(), "gridstage starting");

    match &cli.command {
        Command::BringOnline(args) => {
            commands::run_bringonline_command(&context, args, &settings, cli.json).await
        }
        Command::Copy(args) => {
            let show_progress = terminal::progress_enabled(cli.quiet, cli.json);
            commands::run_copy_command(&context, args, &settings, show_progress, cli.json).await
        }
        Command::Version => {
            commands::run_version_command(&context, cli.json)?;
            Ok(ProcessExit::Success)
        }
    }
}
