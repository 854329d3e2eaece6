//! gitmirror: keep local checkouts in sync with forge push webhooks.
//!
//! # Usage
//!
//! ```text
//! gitmirror [--config <path>] [run]
//! gitmirror [--config <path>] check
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{check::CheckArgs, run::RunArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "gitmirror",
    version,
    about = "Mirror git repositories into local checkouts on push webhooks",
    long_about = None,
)]
struct Cli {
    /// Configuration file. Defaults to the first config.yaml found in
    /// /etc/gitmirror, the user config directory, then the current directory.
    #[arg(long, short, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the webhook listener and sync workers in the foreground (default).
    Run(RunArgs),

    /// Load and validate the configuration, then print the resolved repositories.
    Check(CheckArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.config.as_deref();
    match cli.command.unwrap_or(Commands::Run(RunArgs::default())) {
        Commands::Run(args) => args.run(config),
        Commands::Check(args) => args.run(config),
    }
}
