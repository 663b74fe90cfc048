// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Frontier reconstruction: which steps are eligible to start, given
//! the normalized step graph and the folded [`ExecutionState`].
//! Deliberately a pure, stateless recomputation — the same "recompute
//! from the fold, don't track incrementally" discipline
//! `noetl_storage::state` applies one layer down.

use crate::retry::{self, RetryDecision};
use noetl_core::event::NodeId;
use noetl_core::playbook::Step;
use noetl_storage::state::{ExecutionState, NodeStatus};

/// A step eligible to start a fresh attempt this dispatch cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyStep {
    pub step_name: String,
    pub attempt: u32,
}

fn predecessors<'a>(steps: &'a [Step], step_name: &str) -> Vec<&'a Step> {
    steps.iter().filter(|s| s.next.iter().any(|n| n == step_name)).collect()
}

/// Whether the last attempt of `step` has a pending retry: a `Failed`
/// status whose retry policy still permits another attempt. A step in
/// this state is *not yet terminal* for frontier purposes — it must not
/// gate `finally` steps or the execution-done check until its retries
/// are exhausted.
fn pending_retry(step: &Step, state: &ExecutionState) -> Option<(u32, u64)> {
    let attempt = *state.last_attempt.get(&step.name)?;
    let node_id = NodeId::for_attempt(&step.name, attempt);
    if !matches!(state.node_status.get(&node_id), Some(NodeStatus::Failed)) {
        return None;
    }
    let failure = state.node_failure.get(&node_id)?;
    match retry::decide_retry(step.retry.as_ref(), failure.attempt, &failure.error.kind, failure.created_at) {
        RetryDecision::Retry { next_attempt, delay_ms } => Some((next_attempt, failure.created_at + delay_ms)),
        RetryDecision::Terminal => None,
    }
}

/// The node status of `step`'s last attempt, `None` if it has not yet
/// reached a terminal one — this treats a `Failed` attempt with a
/// pending retry as not-yet-terminal (see [`pending_retry`]).
fn step_terminal_status(step: &Step, state: &ExecutionState) -> Option<NodeStatus> {
    let attempt = *state.last_attempt.get(&step.name)?;
    if attempt == 0 {
        return None;
    }
    let node_id = NodeId::for_attempt(&step.name, attempt);
    let status = state.node_status.get(&node_id).copied()?;
    if status == NodeStatus::Failed && pending_retry(step, state).is_some() {
        return None;
    }
    Some(status)
}

fn predecessors_satisfied(steps: &[Step], step: &Step, state: &ExecutionState) -> bool {
    let preds = predecessors(steps, &step.name);
    if preds.is_empty() {
        return true;
    }
    preds.iter().all(|p| matches!(step_terminal_status(p, state), Some(NodeStatus::Completed) | Some(NodeStatus::Skipped)))
}

/// Steps not yet attempted whose predecessors (if any) have all reached
/// a terminal, non-failing status. Retries of an already-attempted step
/// are not frontier nodes — those are driven by `retry::decide_retry`
/// against a `step.failed`/`step.lost` event, not by this recomputation.
pub fn ready_steps(steps: &[Step], state: &ExecutionState) -> Vec<ReadyStep> {
    let mut out: Vec<ReadyStep> = steps
        .iter()
        .filter(|s| !s.is_finally)
        .filter(|s| !state.last_attempt.contains_key(&s.name))
        .filter(|s| predecessors_satisfied(steps, s, state))
        .map(|s| ReadyStep { step_name: s.name.clone(), attempt: 1 })
        .collect();
    out.sort_by(|a, b| a.step_name.cmp(&b.step_name));
    out
}

/// Whether every non-`finally` step has reached a terminal status.
pub fn core_steps_done(steps: &[Step], state: &ExecutionState) -> bool {
    steps.iter().filter(|s| !s.is_finally).all(|s| {
        matches!(step_terminal_status(s, state), Some(NodeStatus::Completed | NodeStatus::Failed | NodeStatus::Skipped))
    })
}

/// Whether any non-`finally` step ended in `Failed`.
pub fn has_failure(steps: &[Step], state: &ExecutionState) -> bool {
    steps.iter().filter(|s| !s.is_finally).any(|s| matches!(step_terminal_status(s, state), Some(NodeStatus::Failed)))
}

/// Steps whose last attempt failed, whose retry policy permits another
/// attempt, and whose backoff delay has elapsed as of `now` — driven by
/// `retry::decide_retry` against the node's recorded [`NodeFailure`].
/// These are the retry half of the frontier; [`ready_steps`] only ever
/// covers first attempts.
pub fn ready_retries(steps: &[Step], state: &ExecutionState, now: u64) -> Vec<ReadyStep> {
    let mut out: Vec<ReadyStep> = steps
        .iter()
        .filter(|s| !s.is_finally)
        .filter_map(|s| pending_retry(s, state).map(|(next_attempt, earliest)| (s, next_attempt, earliest)))
        .filter(|(_, _, earliest)| now >= *earliest)
        .map(|(s, next_attempt, _)| ReadyStep { step_name: s.name.clone(), attempt: next_attempt })
        .collect();
    out.sort_by(|a, b| a.step_name.cmp(&b.step_name));
    out
}

/// `finally` steps become eligible only once the core graph has failed —
/// they are cleanup/failure-handler steps run as a terminal cascade,
/// not ordinary successors.
pub fn ready_finally_steps(steps: &[Step], state: &ExecutionState) -> Vec<ReadyStep> {
    if !has_failure(steps, state) {
        return Vec::new();
    }
    let mut out: Vec<ReadyStep> = steps
        .iter()
        .filter(|s| s.is_finally)
        .filter(|s| !state.last_attempt.contains_key(&s.name))
        .filter(|s| predecessors_satisfied(steps, s, state))
        .map(|s| ReadyStep { step_name: s.name.clone(), attempt: 1 })
        .collect();
    out.sort_by(|a, b| a.step_name.cmp(&b.step_name));
    out
}

/// Whether the whole graph, `finally` steps included, has reached a
/// terminal status — the gate before the engine appends
/// `execution.completed`/`execution.failed`.
pub fn execution_done(steps: &[Step], state: &ExecutionState) -> bool {
    if !core_steps_done(steps, state) {
        return false;
    }
    if !has_failure(steps, state) {
        return true;
    }
    steps.iter().filter(|s| s.is_finally).all(|s| {
        matches!(step_terminal_status(s, state), Some(NodeStatus::Completed | NodeStatus::Failed | NodeStatus::Skipped))
    })
}

#[cfg(test)]
#[path = "frontier_tests.rs"]
mod tests;
