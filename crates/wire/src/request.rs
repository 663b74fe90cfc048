// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use noetl_core::event::EventKind;
use noetl_core::id::{CatalogId, EventId, ExecutionId, WorkerId};
use noetl_core::result::ResultScope;
use noetl_storage::result_store::PutHints;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Query;

/// Request from a worker, the CLI, or a gateway to the daemon.
/// Mutating calls only — read-only lookups are [`Query`], kept as a
/// separate wire type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    /// Health check ping.
    Ping,

    /// Version/auth handshake. `token` is required on TCP connections,
    /// ignored on the Unix socket.
    Hello {
        version: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },

    /// Read-only lookups, forwarded to [`Query`]'s handler.
    Query { query: Query },

    /// Start a new execution of a catalog entry.
    CreateExecution {
        catalog_id: CatalogId,
        workload: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_execution_id: Option<ExecutionId>,
    },

    /// Append a worker-originated event. The sole path by which a
    /// worker may mutate durable state.
    EmitEvent {
        execution_id: ExecutionId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_event_id: Option<EventId>,
        event: EventKind,
    },

    /// Extend the leases a worker still holds.
    Heartbeat { worker_id: WorkerId, execution_id: ExecutionId, node_ids: Vec<noetl_core::event::NodeId> },

    /// Persist a worker's result payload (or reference) through the
    /// Result Store.
    PutResult {
        execution_id: ExecutionId,
        name: String,
        scope: ResultScope,
        payload: Value,
        #[serde(default)]
        hints: PutHints,
    },

    /// Request cooperative cancellation of an execution.
    CancelExecution {
        execution_id: ExecutionId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// Register a worker runtime's pool membership.
    RegisterRuntime { pools: Vec<String> },

    /// Request daemon shutdown.
    Shutdown,

    /// Daemon status/uptime.
    Status,
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
