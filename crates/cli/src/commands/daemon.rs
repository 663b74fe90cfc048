// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `noetl daemon` - daemon lifecycle commands: start, stop, status.

use std::process::Command;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Subcommand;
use noetl_wire::{Request, Response};
use serde_json::json;

use crate::client::{find_noetld_binary, spawn_daemon, ClientError, DaemonClient};
use crate::output::{format_or_json, OutputFormat};
use crate::paths;

#[derive(Subcommand)]
pub enum DaemonCommand {
    /// Start the daemon.
    Start {
        /// Run in the foreground instead of spawning a detached process.
        #[arg(long)]
        foreground: bool,
    },
    /// Ask the daemon to shut down.
    Stop,
    /// Report whether the daemon is running and its uptime.
    Status,
}

pub async fn run(command: DaemonCommand, format: OutputFormat) -> Result<()> {
    match command {
        DaemonCommand::Start { foreground } => start(foreground).await,
        DaemonCommand::Stop => stop().await,
        DaemonCommand::Status => status(format).await,
    }
}

async fn start(foreground: bool) -> Result<()> {
    let socket_path = paths::socket_path()?;

    if foreground {
        let binary = find_noetld_binary().ok_or(ClientError::BinaryNotFound)?;
        let status = Command::new(binary).status()?;
        if !status.success() {
            return Err(anyhow!("daemon exited with status {status}"));
        }
        return Ok(());
    }

    if let Ok(mut client) = DaemonClient::connect(&socket_path).await {
        if let Ok(Response::Status { uptime_secs, .. }) = client.send(&Request::Status).await {
            println!("daemon already running (uptime: {uptime_secs}s)");
            return Ok(());
        }
    }

    spawn_daemon()?;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if DaemonClient::connect(&socket_path).await.is_ok() {
            println!("daemon started");
            return Ok(());
        }
    }
    Err(anyhow!("timed out waiting for the daemon to start"))
}

async fn stop() -> Result<()> {
    let socket_path = paths::socket_path()?;
    let mut client = match DaemonClient::connect(&socket_path).await {
        Ok(client) => client,
        Err(_) => {
            println!("daemon not running");
            return Ok(());
        }
    };
    match client.send(&Request::Shutdown).await {
        Ok(Response::ShuttingDown) => {
            println!("daemon stopped");
            Ok(())
        }
        Ok(other) => DaemonClient::reject(other).map_err(Into::into),
        Err(e) => Err(e.into()),
    }
}

async fn status(format: OutputFormat) -> Result<()> {
    let socket_path = paths::socket_path()?;
    let mut client = match DaemonClient::connect(&socket_path).await {
        Ok(client) => client,
        Err(_) => {
            let obj = json!({ "running": false });
            return format_or_json(format, &obj, |_| println!("daemon not running"));
        }
    };
    match client.send(&Request::Status).await {
        Ok(Response::Status { uptime_secs, executions_active }) => {
            let obj = json!({
                "running": true,
                "uptime_secs": uptime_secs,
                "executions_active": executions_active,
            });
            format_or_json(format, &obj, |_| {
                println!("daemon running (uptime: {uptime_secs}s, active executions: {executions_active})");
            })
        }
        Ok(other) => DaemonClient::reject(other).map_err(Into::into),
        Err(e) => Err(e.into()),
    }
}
