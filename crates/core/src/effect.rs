// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Effects the engine, dispatcher, and worker runtime ask their host
//! process to perform. Modeled as data, so the dispatch/retry logic
//! that decides *what* to do stays pure and testable independent of
//! *how* it runs.

use crate::event::StoredEvent;
use crate::id::ExecutionId;
use crate::result::ResultScope;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Side effects the execution engine, dispatcher, and loop/aggregator
/// ask the runtime to perform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Effect {
    /// Append an event to the per-execution log (C1).
    AppendEvent { execution_id: ExecutionId, event: StoredEvent },

    /// Publish a task notification to the broker (C6/C8), payload bound
    /// by the notification budget.
    PublishTask { pool: String, execution_id: ExecutionId, node_id: crate::event::NodeId, deadline_epoch_ms: u64 },

    /// Acquire or refresh the per-execution lease.
    SetLease { execution_id: ExecutionId, #[serde(with = "duration_ms")] ttl: Duration },

    /// Release a held lease, e.g. on graceful handoff.
    ReleaseLease { execution_id: ExecutionId },

    /// Run a tool executor (worker runtime only).
    RunTool { execution_id: ExecutionId, node_id: crate::event::NodeId },

    /// Persist a payload through the Result Store (C3).
    WriteResult { execution_id: ExecutionId, name: String, scope: ResultScope, payload: Value },

    /// Arm a timer (lease expiry checks, heartbeat cadence, retry
    /// backoff, schedule ticks).
    SetTimer { id: String, #[serde(with = "duration_ms")] duration: Duration },

    /// Disarm a previously armed timer.
    CancelTimer { id: String },
}

impl Effect {
    /// Effect name for log spans.
    pub fn name(&self) -> &'static str {
        match self {
            Effect::AppendEvent { .. } => "append_event",
            Effect::PublishTask { .. } => "publish_task",
            Effect::SetLease { .. } => "set_lease",
            Effect::ReleaseLease { .. } => "release_lease",
            Effect::RunTool { .. } => "run_tool",
            Effect::WriteResult { .. } => "write_result",
            Effect::SetTimer { .. } => "set_timer",
            Effect::CancelTimer { .. } => "cancel_timer",
        }
    }

    /// Key-value pairs for structured logging.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Effect::AppendEvent { execution_id, event } => vec![
                ("execution_id", execution_id.to_string()),
                ("event_type", event.kind.type_name().to_string()),
            ],
            Effect::PublishTask { pool, execution_id, node_id, .. } => vec![
                ("pool", pool.clone()),
                ("execution_id", execution_id.to_string()),
                ("node_id", node_id.to_string()),
            ],
            Effect::SetLease { execution_id, ttl } => {
                vec![("execution_id", execution_id.to_string()), ("ttl_ms", ttl.as_millis().to_string())]
            }
            Effect::ReleaseLease { execution_id } => vec![("execution_id", execution_id.to_string())],
            Effect::RunTool { execution_id, node_id } => {
                vec![("execution_id", execution_id.to_string()), ("node_id", node_id.to_string())]
            }
            Effect::WriteResult { execution_id, name, scope, .. } => vec![
                ("execution_id", execution_id.to_string()),
                ("name", name.clone()),
                ("scope", format!("{scope:?}")),
            ],
            Effect::SetTimer { id, duration } => {
                vec![("timer_id", id.clone()), ("duration_ms", duration.as_millis().to_string())]
            }
            Effect::CancelTimer { id } => vec![("timer_id", id.clone())],
        }
    }

    /// Whether to log both start and completion, or just a single
    /// summary line — a verbosity-by-frequency rule.
    pub fn verbose(&self) -> bool {
        !matches!(self, Effect::SetTimer { .. } | Effect::CancelTimer { .. })
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
        duration.as_millis().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
#[path = "effect_tests.rs"]
mod tests;
