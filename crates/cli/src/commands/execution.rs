// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `noetl run` - resolve a catalog entry and start an execution.
//! Grounded on the two-step flow `noetl_wire::Query::ResolveCatalog`
//! documents: a caller names a catalog by path, not by id, so the CLI
//! resolves it first and then issues `CreateExecution` with the
//! resulting id, mirroring `noetl_engine::Engine::resolve_catalog`.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use noetl_wire::{Query, Request, Response};
use serde_json::{json, Value};

use crate::client::DaemonClient;
use crate::output::{format_or_json, OutputFormat};
use crate::paths;

#[derive(Args)]
pub struct RunArgs {
    /// Catalog path to execute (as registered with the daemon).
    pub catalog_path: String,

    /// Exact catalog version to run (defaults to the latest registered).
    #[arg(long)]
    pub version: Option<String>,

    /// Inline JSON workload, e.g. '{"key": "value"}'.
    #[arg(long, conflicts_with = "workload_file")]
    pub workload: Option<String>,

    /// Path to a file containing the JSON workload.
    #[arg(long)]
    pub workload_file: Option<PathBuf>,

    /// Parent execution id, for a sub-execution started outside the worker's
    /// own `sub_playbook` tool.
    #[arg(long)]
    pub parent: Option<u64>,
}

pub async fn run(args: RunArgs, format: OutputFormat) -> Result<()> {
    let workload = load_workload(&args)?;
    let socket_path = paths::socket_path()?;
    let mut client = DaemonClient::connect_or_start(&socket_path).await?;

    let resolved = client
        .send(&Request::Query { query: Query::ResolveCatalog { path: args.catalog_path.clone(), version: args.version.clone() } })
        .await?;
    let catalog_id = match resolved {
        Response::CatalogResolved { catalog_id } => catalog_id,
        other => return DaemonClient::reject(other).map_err(Into::into),
    };

    let started = client
        .send(&Request::CreateExecution {
            catalog_id,
            workload,
            parent_execution_id: args.parent.map(noetl_core::id::ExecutionId::new),
        })
        .await?;
    match started {
        Response::ExecutionStarted { execution_id } => {
            let obj = json!({ "execution_id": execution_id.as_u64() });
            format_or_json(format, &obj, |_| println!("started execution {}", execution_id.as_u64()))
        }
        other => DaemonClient::reject(other).map_err(Into::into),
    }
}

fn load_workload(args: &RunArgs) -> Result<Value> {
    if let Some(inline) = &args.workload {
        return Ok(serde_json::from_str(inline)?);
    }
    if let Some(path) = &args.workload_file {
        let contents = std::fs::read_to_string(path)?;
        return Ok(serde_json::from_str(&contents)?);
    }
    Ok(Value::Object(Default::default()))
}
