// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::LaunchArgs;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use xh_config::LaunchConfig;

#[derive(Parser, Debug)]
#[command(name = "xh", version, about = "Launch processes with composable options")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a command, forwarding its output and exit code.
    Run {
        #[command(flatten)]
        launch: LaunchArgs,

        /// Forward this process's stdin to the command.
        #[arg(long)]
        stdin: bool,

        /// Command line, tokenized with shell quoting rules.
        command: String,
    },

    /// Run a command and print its captured output after it exits.
    Output {
        #[command(flatten)]
        launch: LaunchArgs,

        /// Capture stderr together with stdout.
        #[arg(long)]
        combined: bool,

        /// Command line, tokenized with shell quoting rules.
        command: String,
    },

    /// Inspect launch configuration files.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Load and validate a configuration, printing any warnings.
    Check {
        /// Path to a TOML launch configuration.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let runtime = tokio::runtime::Runtime::new().context("start async runtime")?;
    let outcome = runtime.block_on(dispatch(cli));
    // A forwarded stdin read may still be parked on a terminal.
    runtime.shutdown_background();
    outcome
}

async fn dispatch(cli: Cli) -> Result<ExitCode> {

    let config = match &cli.command {
        Commands::Run { launch, .. } | Commands::Output { launch, .. } => {
            commands::load(launch.config.as_deref())?
        }
        Commands::Config { .. } => LaunchConfig::default(),
    };

    let filter = if cli.debug {
        EnvFilter::new("xh=debug")
    } else {
        let level = config.log_level.as_deref().unwrap_or("info");
        EnvFilter::new(format!("xh={level}"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            launch,
            stdin,
            command,
        } => commands::cmd_run(&config, &launch, &command, stdin).await,
        Commands::Output {
            launch,
            combined,
            command,
        } => commands::cmd_output(&config, &launch, &command, combined).await,
        Commands::Config {
            action: ConfigAction::Check { config: path },
        } => commands::cmd_config_check(path.as_deref()),
    }
}
