// ABOUTME: Entry point for the switchyard CLI application.
// ABOUTME: Parses arguments, sets up logging, and dispatches to command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use commands::Session;
use std::env;
use switchyard::config;
use switchyard::error::Result;
use switchyard::output::Output;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("SWITCHYARD_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = cli.output_mode();
    if let Err(e) = run(cli).await {
        Output::new(mode).error(&e.to_string());
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let output = Output::new(cli.output_mode());
    let cwd = env::current_dir()?;

    match cli.command {
        Commands::Init {
            service,
            artifact,
            force,
        } => {
            config::init_config(&cwd, service.as_deref(), artifact.as_deref(), force)?;
            output.success(&format!("Created {}", config::CONFIG_FILENAME));
            Ok(())
        }
        Commands::Deploy { artifact, force } => {
            let session = Session::open(&cwd).await?;
            commands::deploy(session, artifact, force, output).await
        }
        Commands::Status { history } => {
            let session = Session::open(&cwd).await?;
            commands::status(session, history, output).await
        }
        Commands::Rollback => {
            let session = Session::open(&cwd).await?;
            commands::rollback(session, output).await
        }
        Commands::Release {
            revision,
            branch,
            force,
        } => {
            let session = Session::open(&cwd).await?;
            commands::release(session, revision, branch, force, output).await
        }
        Commands::Resolve { force } => {
            let session = Session::open(&cwd).await?;
            commands::resolve(session, force, output).await
        }
    }
}
