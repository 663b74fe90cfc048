// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The canonical event record and the event-kind taxonomy the engine,
//! dispatcher, and worker runtime exchange.

use crate::id::{CatalogId, EventId, ExecutionId, WorkerId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Identifies one attempt of one step within an execution.
///
/// Formatted as `"<step name>#<attempt>"` so that (a) a retry always gets
/// a fresh, distinct id and (b) comparing `NodeId`s as strings gives a
/// stable tie-break order for frontier nodes that share a step name
/// prefix, matching the ordering requirement without needing a second
/// allocator just for node attempts.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn for_attempt(step_name: &str, attempt: u32) -> Self {
        Self(format!("{step_name}#{attempt}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The step name this node id was minted for, i.e. everything before
    /// the last `#<attempt>` suffix.
    pub fn step_name(&self) -> &str {
        self.0.rsplit_once('#').map(|(name, _)| name).unwrap_or(&self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A result value attached to a completed step: either carried inline or
/// as a pointer into the Result Store, matching the canonical event
/// record's `result` field shape in the external interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultValue {
    Inline(Value),
    Ref { #[serde(rename = "$ref")] reference: String },
}

/// Structured error context attached to failure events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail_ref: Option<String>,
}

/// Summary of a sink operation: never the rows themselves, only what a
/// caller needs to know the write happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkSummary {
    pub rows_affected: u64,
    pub bytes: u64,
    pub checksum: String,
}

/// Combination strategy for assembling a [`crate::result::Manifest`]
/// from loop iteration results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombineStrategy {
    Append,
    Replace,
    Merge,
    Concat,
}

impl Default for CombineStrategy {
    fn default() -> Self {
        CombineStrategy::Append
    }
}

/// The event-kind taxonomy, tagged by `event_type` exactly as the
/// canonical event record in the external interface specifies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum EventKind {
    #[serde(rename = "playbook.initialized")]
    PlaybookInitialized {
        catalog_id: CatalogId,
        #[serde(skip_serializing_if = "Option::is_none")]
        catalog_version: Option<String>,
        workload: Value,
    },
    #[serde(rename = "playbook.completed")]
    PlaybookCompleted,
    #[serde(rename = "playbook.failed")]
    PlaybookFailed { error: ErrorInfo },

    #[serde(rename = "step.started")]
    StepStarted {
        node_id: NodeId,
        node_name: String,
        node_type: String,
        attempt: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        loop_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        current_index: Option<u64>,
    },
    #[serde(rename = "step.dispatched")]
    StepDispatched {
        node_id: NodeId,
        worker_pool: String,
        deadline_epoch_ms: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        loop_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        current_index: Option<u64>,
    },
    #[serde(rename = "step.result")]
    StepResult { node_id: NodeId, result: ResultValue },
    #[serde(rename = "step.completed")]
    StepCompleted {
        node_id: NodeId,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<ResultValue>,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        worker_id: Option<WorkerId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        loop_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        current_index: Option<u64>,
    },
    #[serde(rename = "step.failed")]
    StepFailed {
        node_id: NodeId,
        error: ErrorInfo,
        attempt: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        loop_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        current_index: Option<u64>,
    },
    #[serde(rename = "step.lost")]
    StepLost {
        node_id: NodeId,
        #[serde(skip_serializing_if = "Option::is_none")]
        worker_id: Option<WorkerId>,
    },
    #[serde(rename = "step.skipped")]
    StepSkipped {
        node_id: NodeId,
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        loop_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        current_index: Option<u64>,
    },

    #[serde(rename = "loop.started")]
    LoopStarted { loop_name: String, collection_size: u64 },
    #[serde(rename = "loop.completed")]
    LoopCompleted { loop_name: String, result: ResultValue },

    #[serde(rename = "sink.started")]
    SinkStarted {
        node_id: NodeId,
        #[serde(skip_serializing_if = "Option::is_none")]
        loop_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        current_index: Option<u64>,
    },
    #[serde(rename = "sink.completed")]
    SinkCompleted {
        node_id: NodeId,
        #[serde(skip_serializing_if = "Option::is_none")]
        loop_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        current_index: Option<u64>,
        summary: SinkSummary,
    },

    #[serde(rename = "execution.cancel_requested")]
    ExecutionCancelRequested {
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    #[serde(rename = "execution.cancelled")]
    ExecutionCancelled,
    #[serde(rename = "execution.completed")]
    ExecutionCompleted,
    #[serde(rename = "execution.failed")]
    ExecutionFailed {
        #[serde(skip_serializing_if = "Option::is_none")]
        node_name: Option<String>,
        error: ErrorInfo,
    },

    #[serde(rename = "case.evaluated")]
    CaseEvaluated {
        node_id: NodeId,
        condition: String,
        value: bool,
    },
}

impl EventKind {
    /// The node this event concerns, if any — used to project
    /// `node_status`/`node_result` and to enforce the at-most-one
    /// terminal-event-per-`node_id` invariant.
    pub fn node_id(&self) -> Option<&NodeId> {
        match self {
            EventKind::StepStarted { node_id, .. }
            | EventKind::StepDispatched { node_id, .. }
            | EventKind::StepResult { node_id, .. }
            | EventKind::StepCompleted { node_id, .. }
            | EventKind::StepFailed { node_id, .. }
            | EventKind::StepLost { node_id, .. }
            | EventKind::StepSkipped { node_id, .. }
            | EventKind::SinkStarted { node_id, .. }
            | EventKind::SinkCompleted { node_id, .. }
            | EventKind::CaseEvaluated { node_id, .. } => Some(node_id),
            _ => None,
        }
    }

    /// True for the events that close out a node's lifecycle; invariant
    /// 2 forbids more than one of these per `node_id`.
    pub fn is_terminal_for_node(&self) -> bool {
        matches!(
            self,
            EventKind::StepCompleted { .. } | EventKind::StepFailed { .. } | EventKind::StepSkipped { .. }
        )
    }

    /// A short, stable discriminant string, primarily for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            EventKind::PlaybookInitialized { .. } => "playbook.initialized",
            EventKind::PlaybookCompleted => "playbook.completed",
            EventKind::PlaybookFailed { .. } => "playbook.failed",
            EventKind::StepStarted { .. } => "step.started",
            EventKind::StepDispatched { .. } => "step.dispatched",
            EventKind::StepResult { .. } => "step.result",
            EventKind::StepCompleted { .. } => "step.completed",
            EventKind::StepFailed { .. } => "step.failed",
            EventKind::StepLost { .. } => "step.lost",
            EventKind::StepSkipped { .. } => "step.skipped",
            EventKind::LoopStarted { .. } => "loop.started",
            EventKind::LoopCompleted { .. } => "loop.completed",
            EventKind::SinkStarted { .. } => "sink.started",
            EventKind::SinkCompleted { .. } => "sink.completed",
            EventKind::ExecutionCancelRequested { .. } => "execution.cancel_requested",
            EventKind::ExecutionCancelled => "execution.cancelled",
            EventKind::ExecutionCompleted => "execution.completed",
            EventKind::ExecutionFailed { .. } => "execution.failed",
            EventKind::CaseEvaluated { .. } => "case.evaluated",
        }
    }
}

/// A persisted event: the envelope the Event Log Store assigns (primary
/// key `(execution_id, event_id)`, ordering, parentage) wrapped around
/// the caller-supplied [`EventKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub execution_id: ExecutionId,
    pub event_id: EventId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_event_id: Option<EventId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_execution_id: Option<ExecutionId>,
    pub created_at: u64,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Idempotence key for duplicate-terminal-event detection, per the tie-
/// break rule: the first terminal event for a `node_id` wins.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventIdempotenceKey {
    pub execution_id: ExecutionId,
    pub node_id: NodeId,
    pub event_type: &'static str,
}

impl StoredEvent {
    pub fn idempotence_key(&self) -> Option<EventIdempotenceKey> {
        self.kind.node_id().map(|node_id| EventIdempotenceKey {
            execution_id: self.execution_id,
            node_id: node_id.clone(),
            event_type: self.kind.type_name(),
        })
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
