// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized state rebuilt by folding [`StoredEvent`]s in order:
//! `node_status`, `node_result`, and execution-level terminal state.
//! Frontier reconstruction itself
//! (which additionally needs the step graph) lives in `noetl-engine`;
//! this module only tracks what a single linear fold over the event
//! stream can determine on its own.

use noetl_core::event::{ErrorInfo, EventKind, NodeId, ResultValue, StoredEvent};
use noetl_core::id::ExecutionId;
use std::collections::HashMap;

/// The last non-result status observed for a node: the `node_status[name]`
/// projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Running,
    Completed,
    Failed,
    Skipped,
}

/// What a step's most recent `step.failed` event carried, kept so the
/// engine's retry consultation doesn't have to re-scan the raw event
/// stream on every dispatch cycle.
#[derive(Debug, Clone)]
pub struct NodeFailure {
    pub attempt: u32,
    pub error: ErrorInfo,
    pub created_at: u64,
}

/// Per-execution materialized state.
#[derive(Debug, Clone, Default)]
pub struct ExecutionState {
    pub node_status: HashMap<NodeId, NodeStatus>,
    pub node_result: HashMap<NodeId, ResultValue>,
    /// Highest attempt number started for each step name, used to mint
    /// the next `NodeId` on retry.
    pub last_attempt: HashMap<String, u32>,
    /// The most recent failure recorded for a node, used to decide
    /// whether a `Failed` status is final or still awaiting a retry.
    pub node_failure: HashMap<NodeId, NodeFailure>,
    pub cancelled: bool,
    pub completed: bool,
    pub failed: bool,
}

impl ExecutionState {
    fn apply(&mut self, created_at: u64, kind: &EventKind) {
        match kind {
            EventKind::StepStarted { node_id, attempt, .. } => {
                self.node_status.insert(node_id.clone(), NodeStatus::Running);
                let name = node_id.step_name().to_string();
                let entry = self.last_attempt.entry(name).or_insert(0);
                *entry = (*entry).max(*attempt);
            }
            EventKind::StepCompleted { node_id, result, .. } => {
                self.node_status.insert(node_id.clone(), NodeStatus::Completed);
                if let Some(result) = result {
                    self.node_result.insert(node_id.clone(), result.clone());
                }
            }
            EventKind::StepResult { node_id, result } => {
                self.node_result.insert(node_id.clone(), result.clone());
            }
            EventKind::StepFailed { node_id, error, attempt, .. } => {
                self.node_status.insert(node_id.clone(), NodeStatus::Failed);
                self.node_failure.insert(node_id.clone(), NodeFailure { attempt: *attempt, error: error.clone(), created_at });
            }
            EventKind::StepSkipped { node_id, .. } => {
                self.node_status.insert(node_id.clone(), NodeStatus::Skipped);
            }
            EventKind::ExecutionCancelled => {
                self.cancelled = true;
            }
            EventKind::ExecutionCompleted => {
                self.completed = true;
            }
            EventKind::ExecutionFailed { .. } => {
                self.failed = true;
            }
            _ => {}
        }
    }

    /// Whether `node_id` already carries a terminal event — the guard
    /// ensuring at most one terminal event per node.
    pub fn is_terminal(&self, node_id: &NodeId) -> bool {
        matches!(self.node_status.get(node_id), Some(NodeStatus::Completed | NodeStatus::Failed | NodeStatus::Skipped))
    }
}

/// Folds a [`StoredEvent`] stream into per-execution [`ExecutionState`].
/// Two independent folds over the same event stream must produce
/// identical projections.
#[derive(Debug, Clone, Default)]
pub struct MaterializedState {
    executions: HashMap<ExecutionId, ExecutionState>,
}

impl MaterializedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_event(&mut self, event: &StoredEvent) {
        self.executions.entry(event.execution_id).or_default().apply(event.created_at, &event.kind);
    }

    /// Rebuild state from scratch by folding `events` in order.
    pub fn rebuild(events: &[StoredEvent]) -> Self {
        let mut state = Self::new();
        for event in events {
            state.apply_event(event);
        }
        state
    }

    pub fn execution(&self, execution_id: ExecutionId) -> Option<&ExecutionState> {
        self.executions.get(&execution_id)
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
