// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

mod commands;
mod group;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use collective_io_core::{CollectiveError, IoConfig};
use collective_io_logging::{CliLogLevel, CliLoggingArgs};

#[derive(Parser, Debug)]
#[command(
    name = "cio",
    version,
    about = "Run collective reads over an in-process group of members"
)]
struct Cli {
    /// TOML configuration file; `CIO_*` variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    logging: CliLoggingArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read a file collectively and compare what every member received
    Read(commands::ReadArgs),
    /// Query file metadata collectively
    Stat(commands::StatArgs),
    /// Let every member write its own output file
    Write(commands::WriteArgs),
}

/// Exit code for failures that tore the group down
fn abort_exit_code(err: &anyhow::Error, config: &IoConfig) -> Option<i32> {
    match err.downcast_ref::<CollectiveError>()? {
        CollectiveError::Aborted { code } => Some(*code),
        CollectiveError::RegistryOverflow { .. } | CollectiveError::Divergence { .. } => {
            Some(config.abort_code)
        }
        _ => None,
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.logging.clone().init("cio", CliLogLevel::Warn)?;

    let config = IoConfig::load(cli.config.as_deref())?;
    tracing::debug!(?config, "configuration loaded");

    let outcome = match &cli.command {
        Command::Read(args) => commands::read(args, &config),
        Command::Stat(args) => commands::stat(args, &config),
        Command::Write(args) => commands::write(args, &config),
    };

    if let Err(err) = &outcome {
        if let Some(code) = abort_exit_code(err, &config) {
            eprintln!("Error: {err:#}");
            std::process::exit(code);
        }
    }
    outcome
}
