// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `noetl events` - list an execution's event log.

use anyhow::Result;
use clap::Args;
use noetl_core::id::{EventId, ExecutionId};
use noetl_wire::{Query, Request, Response};
use serde_json::json;

use crate::client::DaemonClient;
use crate::output::{format_or_json, OutputFormat};
use crate::paths;

#[derive(Args)]
pub struct EventsArgs {
    /// Execution id whose events to list.
    pub execution_id: u64,

    /// Only return events after this event id.
    #[arg(long)]
    pub since: Option<u64>,

    /// Maximum number of events to return.
    #[arg(long, default_value_t = 100)]
    pub limit: usize,
}

pub async fn run(args: EventsArgs, format: OutputFormat) -> Result<()> {
    let socket_path = paths::socket_path()?;
    let mut client = DaemonClient::connect(&socket_path).await?;

    let response = client
        .send(&Request::Query {
            query: Query::ListEvents {
                execution_id: ExecutionId::new(args.execution_id),
                from_event_id: args.since.map(EventId::new),
                limit: args.limit,
            },
        })
        .await?;
    match response {
        Response::Events { events } => {
            let obj = json!({ "events": &events });
            format_or_json(format, &obj, |_| {
                for event in &events {
                    println!("{} {:?}", event.event_id.as_u64(), event.kind);
                }
            })
        }
        other => DaemonClient::reject(other).map_err(Into::into),
    }
}
