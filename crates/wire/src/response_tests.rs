// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use noetl_core::event::NodeId;
use noetl_core::id::ExecutionId;
use noetl_core::playbook::Tool;
use noetl_dispatcher::TaskSpec;
use serde_json::json;
use std::collections::HashMap;

#[test]
fn ok_and_pong_serialize_as_bare_tags() {
    assert_eq!(serde_json::to_value(&Response::Ok).unwrap(), json!({"type": "Ok"}));
    assert_eq!(serde_json::to_value(&Response::Pong).unwrap(), json!({"type": "Pong"}));
}

#[test]
fn execution_started_round_trips() {
    let response = Response::ExecutionStarted { execution_id: ExecutionId::new(5) };
    let json = serde_json::to_string(&response).unwrap();
    let decoded: Response = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, response);
}

#[test]
fn execution_summary_omits_absent_optional_fields() {
    let summary = ExecutionSummary { execution_id: ExecutionId::new(1), status: ExecutionStatus::Running, started_at: 100, ended_at: None, error: None, last_event_id: None };
    let response = Response::Execution { summary };
    let value = serde_json::to_value(&response).unwrap();
    let inner = &value["summary"];
    assert!(inner.get("ended_at").is_none());
    assert!(inner.get("error").is_none());
    assert!(inner.get("last_event_id").is_none());
    assert_eq!(inner["status"], json!("running"));
}

#[test]
fn execution_status_uses_snake_case() {
    assert_eq!(serde_json::to_value(ExecutionStatus::Cancelled).unwrap(), json!("cancelled"));
}

#[test]
fn task_round_trips_a_task_spec() {
    let task = TaskSpec {
        execution_id: ExecutionId::new(1),
        node_id: NodeId::for_attempt("fetch", 1),
        step: noetl_core::playbook::Step {
            name: "fetch".to_string(),
            tool: Tool::Http { method: "GET".to_string(), url: "https://example.test".to_string(), headers: HashMap::new(), body: None },
            inputs: HashMap::new(),
            next: Vec::new(),
            when: None,
            loop_spec: None,
            retry: None,
            sink: None,
            timeout_ms: None,
            pool: "default".to_string(),
            is_finally: false,
        },
        rendered_inputs: HashMap::new(),
        attempt: 1,
        deadline_epoch_ms: 60_000,
    };
    let response = Response::Task { task };
    let json = serde_json::to_string(&response).unwrap();
    let decoded: Response = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, response);
}

#[test]
fn catalog_resolved_round_trips() {
    let response = Response::CatalogResolved { catalog_id: noetl_core::id::CatalogId::new(9) };
    let json = serde_json::to_string(&response).unwrap();
    let decoded: Response = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, response);
}

#[test]
fn error_response_round_trips_kind_and_message() {
    let response = Response::Error { kind: "NotFound".to_string(), message: "execution not found".to_string() };
    let json = serde_json::to_string(&response).unwrap();
    let decoded: Response = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, response);
}

#[test]
fn runtime_registered_round_trips_pool_list() {
    let response = Response::RuntimeRegistered { runtime_id: noetl_core::id::RuntimeId::from("runtime_a"), pools: vec!["default".to_string()], registered_at: 42 };
    let json = serde_json::to_string(&response).unwrap();
    let decoded: Response = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, response);
}

#[test]
fn event_emitted_carries_its_event_id() {
    let response = Response::EventEmitted { event_id: noetl_core::id::EventId::new(9) };
    let value = serde_json::to_value(&response).unwrap();
    assert_eq!(value, json!({"type": "EventEmitted", "event_id": 9}));
}
