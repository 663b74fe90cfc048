// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use noetl_core::event::{ErrorInfo, EventKind, ResultValue};
use noetl_core::id::ExecutionId;
use noetl_core::playbook::Tool;
use noetl_storage::state::MaterializedState;
use std::collections::HashMap;

fn step(name: &str, next: &[&str]) -> Step {
    Step {
        name: name.to_string(),
        tool: Tool::Http { method: "GET".into(), url: "http://x".into(), headers: HashMap::new(), body: None },
        inputs: HashMap::new(),
        next: next.iter().map(|s| s.to_string()).collect(),
        when: None,
        loop_spec: None,
        retry: None,
        sink: None,
        timeout_ms: None,
        pool: "default".to_string(),
        is_finally: false,
    }
}

fn finally_step(name: &str) -> Step {
    let mut s = step(name, &[]);
    s.is_finally = true;
    s
}

fn started(execution_id: ExecutionId, event_id: u64, name: &str, attempt: u32) -> noetl_core::event::StoredEvent {
    noetl_core::event::StoredEvent {
        execution_id,
        event_id: noetl_core::id::EventId::new(event_id),
        parent_event_id: None,
        parent_execution_id: None,
        created_at: event_id,
        kind: EventKind::StepStarted {
            node_id: NodeId::for_attempt(name, attempt),
            node_name: name.to_string(),
            node_type: "http".into(),
            attempt,
            loop_name: None,
            current_index: None,
        },
    }
}

fn completed(execution_id: ExecutionId, event_id: u64, name: &str, attempt: u32) -> noetl_core::event::StoredEvent {
    noetl_core::event::StoredEvent {
        execution_id,
        event_id: noetl_core::id::EventId::new(event_id),
        parent_event_id: None,
        parent_execution_id: None,
        created_at: event_id,
        kind: EventKind::StepCompleted {
            node_id: NodeId::for_attempt(name, attempt),
            result: Some(ResultValue::Inline(serde_json::json!(null))),
            duration_ms: None,
            worker_id: None,
            loop_name: None,
            current_index: None,
        },
    }
}

fn failed(execution_id: ExecutionId, event_id: u64, name: &str, attempt: u32) -> noetl_core::event::StoredEvent {
    noetl_core::event::StoredEvent {
        execution_id,
        event_id: noetl_core::id::EventId::new(event_id),
        parent_event_id: None,
        parent_execution_id: None,
        created_at: event_id,
        kind: EventKind::StepFailed {
            node_id: NodeId::for_attempt(name, attempt),
            error: ErrorInfo { kind: "ToolExecutionError".into(), message: "boom".into(), detail_ref: None },
            attempt,
            duration_ms: None,
            loop_name: None,
            current_index: None,
        },
    }
}

#[test]
fn root_steps_with_no_predecessors_are_immediately_ready() {
    let steps = vec![step("a", &["b"]), step("b", &[])];
    let state = MaterializedState::new();
    let exec = state.execution(ExecutionId::new(1)).cloned().unwrap_or_default();
    let ready = ready_steps(&steps, &exec);
    assert_eq!(ready, vec![ReadyStep { step_name: "a".into(), attempt: 1 }]);
}

#[test]
fn a_step_becomes_ready_only_once_its_predecessor_completes() {
    let execution_id = ExecutionId::new(1);
    let steps = vec![step("a", &["b"]), step("b", &[])];
    let events = vec![started(execution_id, 1, "a", 1), completed(execution_id, 2, "a", 1)];
    let state = MaterializedState::rebuild(&events);
    let exec = state.execution(execution_id).unwrap();
    let ready = ready_steps(&steps, exec);
    assert_eq!(ready, vec![ReadyStep { step_name: "b".into(), attempt: 1 }]);
}

#[test]
fn a_failed_predecessor_never_unblocks_its_successor() {
    let execution_id = ExecutionId::new(1);
    let steps = vec![step("a", &["b"]), step("b", &[])];
    let events = vec![started(execution_id, 1, "a", 1), failed(execution_id, 2, "a", 1)];
    let state = MaterializedState::rebuild(&events);
    let exec = state.execution(execution_id).unwrap();
    assert!(ready_steps(&steps, exec).is_empty());
    assert!(has_failure(&steps, exec));
}

#[test]
fn finally_steps_only_surface_after_a_failure() {
    let execution_id = ExecutionId::new(1);
    let steps = vec![step("a", &[]), finally_step("cleanup")];
    let state_no_failure = MaterializedState::new();
    let exec = state_no_failure.execution(execution_id).cloned().unwrap_or_default();
    assert!(ready_finally_steps(&steps, &exec).is_empty());

    let events = vec![started(execution_id, 1, "a", 1), failed(execution_id, 2, "a", 1)];
    let state = MaterializedState::rebuild(&events);
    let exec = state.execution(execution_id).unwrap();
    assert_eq!(ready_finally_steps(&steps, exec), vec![ReadyStep { step_name: "cleanup".into(), attempt: 1 }]);
}

#[test]
fn execution_is_not_done_until_finally_steps_also_terminate() {
    let execution_id = ExecutionId::new(1);
    let steps = vec![step("a", &[]), finally_step("cleanup")];
    let events = vec![started(execution_id, 1, "a", 1), failed(execution_id, 2, "a", 1)];
    let state = MaterializedState::rebuild(&events);
    let exec = state.execution(execution_id).unwrap();
    assert!(!execution_done(&steps, exec));
}

#[test]
fn execution_is_done_once_every_step_including_finally_terminates() {
    let execution_id = ExecutionId::new(1);
    let steps = vec![step("a", &[]), finally_step("cleanup")];
    let events = vec![
        started(execution_id, 1, "a", 1),
        failed(execution_id, 2, "a", 1),
        started(execution_id, 3, "cleanup", 1),
        completed(execution_id, 4, "cleanup", 1),
    ];
    let state = MaterializedState::rebuild(&events);
    let exec = state.execution(execution_id).unwrap();
    assert!(execution_done(&steps, exec));
}
