// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `noetl` - the command-line client for the `noetld` execution
//! engine daemon.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod client;
mod commands;
mod output;
mod paths;

use clap::{Parser, Subcommand};

use commands::cancel::CancelArgs;
use commands::daemon::DaemonCommand;
use commands::events::EventsArgs;
use commands::execution::RunArgs;
use commands::status::StatusArgs;
use output::OutputFormat;

#[derive(Parser)]
#[command(
    name = "noetl",
    version = concat!(env!("CARGO_PKG_VERSION"), "+", env!("BUILD_GIT_HASH")),
    about = "Client for the noetld workflow execution daemon"
)]
struct Cli {
    /// Output format.
    #[arg(short = 'f', long, value_enum, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage the noetld daemon itself.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
    /// Start an execution of a registered catalog entry.
    Run(RunArgs),
    /// Look up an execution's status.
    Status(StatusArgs),
    /// List an execution's event log.
    Events(EventsArgs),
    /// Request cancellation of an execution.
    Cancel(CancelArgs),
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Daemon { command } => commands::daemon::run(command, cli.format).await,
        Command::Run(args) => commands::execution::run(args, cli.format).await,
        Command::Status(args) => commands::status::run(args, cli.format).await,
        Command::Events(args) => commands::events::run(args, cli.format).await,
        Command::Cancel(args) => commands::cancel::run(args, cli.format).await,
    };

    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            std::process::ExitCode::FAILURE
        }
    }
}
