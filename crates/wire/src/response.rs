// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use noetl_core::event::{ErrorInfo, StoredEvent};
use noetl_core::id::{CatalogId, EventId, ExecutionId, RuntimeId};
use noetl_core::result::ResultRef;
use noetl_dispatcher::TaskSpec;
use serde::{Deserialize, Serialize};

/// An execution's terminal/in-flight status, part of the
/// `GetExecution` shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// `GetExecution(execution_id) -> { status, started_at, ended_at?, error?, last_event_id }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub execution_id: ExecutionId,
    pub status: ExecutionStatus,
    pub started_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event_id: Option<EventId>,
}

/// Response from the daemon to a worker, the CLI, or a gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Response {
    /// Generic success.
    Ok,

    /// Health check response.
    Pong,

    /// Version handshake response.
    Hello { version: String },

    /// Daemon is shutting down.
    ShuttingDown,

    /// A request failed; `kind` mirrors the originating error enum's
    /// variant name so a caller can match on it without string-parsing
    /// `message`.
    Error { kind: String, message: String },

    /// `CreateExecution` accepted.
    ExecutionStarted { execution_id: ExecutionId },

    /// `GetExecution` result.
    Execution { summary: ExecutionSummary },

    /// `ListEvents` result.
    Events { events: Vec<StoredEvent> },

    /// `GetTask` result.
    Task { task: TaskSpec },

    /// `ResolveCatalog` result.
    CatalogResolved { catalog_id: CatalogId },

    /// `EmitEvent` result.
    EventEmitted { event_id: EventId },

    /// `Heartbeat` acknowledgment.
    HeartbeatAck,

    /// `PutResult` result.
    ResultPut { reference: ResultRef },

    /// `CancelExecution` acknowledgment.
    Cancelled,

    /// `RegisterRuntime` result.
    RuntimeRegistered { runtime_id: RuntimeId, pools: Vec<String>, registered_at: u64 },

    /// Daemon uptime/status.
    Status { uptime_secs: u64, executions_active: usize },
}

#[cfg(test)]
#[path = "response_tests.rs"]
mod tests;
