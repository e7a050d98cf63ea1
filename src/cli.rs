// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands, their arguments, and the global output flags.

use clap::{Parser, Subcommand};
use switchyard::output::OutputMode;

#[derive(Parser)]
#[command(name = "switchyard")]
#[command(about = "Blue/green deployments behind a load balancer")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print the final result
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Print JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else if self.quiet {
            OutputMode::Quiet
        } else {
            OutputMode::Normal
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new switchyard.yml configuration file
    Init {
        /// Service name
        #[arg(long)]
        service: Option<String>,

        /// Initial artifact reference
        #[arg(long)]
        artifact: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Deploy an artifact through the blue/green state machine
    Deploy {
        /// Artifact to deploy (defaults to the configured artifact)
        #[arg(short, long)]
        artifact: Option<String>,

        /// Break an existing deploy lock
        #[arg(long)]
        force: bool,
    },

    /// Show the latest deployment and target group roles
    Status {
        /// Also list archived deployments
        #[arg(long)]
        history: bool,
    },

    /// Request a rollback of the running deployment
    Rollback,

    /// Run the release pipeline for a source revision
    Release {
        /// Revision id to build and deploy
        #[arg(short, long)]
        revision: String,

        /// Branch the revision was pushed to (defaults to the watched branch)
        #[arg(short, long)]
        branch: Option<String>,

        /// Break an existing deploy lock
        #[arg(long)]
        force: bool,
    },

    /// Finish a rollback that stopped for manual intervention
    Resolve {
        /// Break an existing deploy lock
        #[arg(long)]
        force: bool,
    },
}
