// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `noetl status` - look up a single execution's summary.

use anyhow::Result;
use clap::Args;
use noetl_core::id::ExecutionId;
use noetl_wire::{Query, Request, Response};
use serde_json::json;

use crate::client::DaemonClient;
use crate::output::{format_or_json, OutputFormat};
use crate::paths;

#[derive(Args)]
pub struct StatusArgs {
    /// Execution id to look up.
    pub execution_id: u64,
}

pub async fn run(args: StatusArgs, format: OutputFormat) -> Result<()> {
    let socket_path = paths::socket_path()?;
    let mut client = DaemonClient::connect(&socket_path).await?;

    let response =
        client.send(&Request::Query { query: Query::GetExecution { execution_id: ExecutionId::new(args.execution_id) } }).await?;
    match response {
        Response::Execution { summary } => {
            let obj = json!({
                "execution_id": summary.execution_id.as_u64(),
                "status": summary.status,
                "started_at": summary.started_at,
                "ended_at": summary.ended_at,
                "error": &summary.error,
                "last_event_id": summary.last_event_id.map(|id| id.as_u64()),
            });
            format_or_json(format, &obj, |_| {
                println!("execution {}: {:?}", summary.execution_id.as_u64(), summary.status);
                if let Some(error) = &summary.error {
                    println!("  error: {error:?}");
                }
            })
        }
        other => DaemonClient::reject(other).map_err(Into::into),
    }
}
