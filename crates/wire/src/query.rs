// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use noetl_core::id::{EventId, ExecutionId};
use serde::{Deserialize, Serialize};

/// Read-only lookups against daemon state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Query {
    /// `GetExecution(execution_id) -> { status, started_at, ended_at?, error?, last_event_id }`.
    GetExecution { execution_id: ExecutionId },

    /// `ListEvents(execution_id, from_event_id?, limit) -> event[]`.
    ListEvents {
        execution_id: ExecutionId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from_event_id: Option<EventId>,
        limit: usize,
    },

    /// `GetTask(execution_id, node_id) -> task_spec`.
    GetTask { execution_id: ExecutionId, node_id: noetl_core::event::NodeId },

    /// Resolve a catalog path (and optional exact version) to the id
    /// `CreateExecution` needs — `CreateExecution` is addressed by
    /// `catalog_path`, not by id, so this is the lookup a caller performs
    /// first, mirroring `noetl_engine::Engine::resolve_catalog`.
    ResolveCatalog {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
    },
}

#[cfg(test)]
#[path = "query_tests.rs"]
mod tests;
