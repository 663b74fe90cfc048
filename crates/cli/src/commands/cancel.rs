// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `noetl cancel` - request cooperative cancellation of an execution.

use anyhow::Result;
use clap::Args;
use noetl_core::id::ExecutionId;
use noetl_wire::{Request, Response};

use crate::client::DaemonClient;
use crate::output::OutputFormat;
use crate::paths;

#[derive(Args)]
pub struct CancelArgs {
    /// Execution id to cancel.
    pub execution_id: u64,

    /// Reason recorded on the cancellation event.
    #[arg(long)]
    pub reason: Option<String>,
}

pub async fn run(args: CancelArgs, _format: OutputFormat) -> Result<()> {
    let socket_path = paths::socket_path()?;
    let mut client = DaemonClient::connect(&socket_path).await?;

    let response = client
        .send(&Request::CancelExecution { execution_id: ExecutionId::new(args.execution_id), reason: args.reason })
        .await?;
    match response {
        Response::Cancelled => {
            println!("cancellation requested for execution {}", args.execution_id);
            Ok(())
        }
        other => DaemonClient::reject(other).map_err(Into::into),
    }
}
