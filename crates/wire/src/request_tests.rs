// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use noetl_core::event::{EventKind, NodeId};
use noetl_core::id::{CatalogId, ExecutionId, WorkerId};
use noetl_core::result::ResultScope;
use noetl_storage::result_store::PutHints;
use serde_json::json;

#[test]
fn ping_round_trips_through_json() {
    let request = Request::Ping;
    let json = serde_json::to_string(&request).unwrap();
    assert_eq!(json, r#"{"type":"Ping"}"#);
    let decoded: Request = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, request);
}

#[test]
fn hello_omits_absent_token() {
    let request = Request::Hello { version: "1.0".to_string(), token: None };
    let json = serde_json::to_value(&request).unwrap();
    assert_eq!(json, json!({"type": "Hello", "version": "1.0"}));
}

#[test]
fn hello_carries_a_tcp_auth_token() {
    let request = Request::Hello { version: "1.0".to_string(), token: Some("secret".to_string()) };
    let json = serde_json::to_value(&request).unwrap();
    assert_eq!(json["token"], json!("secret"));
    let decoded: Request = serde_json::from_value(json).unwrap();
    assert_eq!(decoded, request);
}

#[test]
fn query_variant_wraps_a_query() {
    let request = Request::Query { query: Query::GetExecution { execution_id: ExecutionId::new(1) } };
    let json = serde_json::to_string(&request).unwrap();
    let decoded: Request = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, request);
}

#[test]
fn create_execution_round_trips_with_no_parent() {
    let request = Request::CreateExecution { catalog_id: CatalogId::new(9), workload: json!({"a": 1}), parent_execution_id: None };
    let json = serde_json::to_string(&request).unwrap();
    assert!(!json.contains("parent_execution_id"));
    let decoded: Request = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, request);
}

#[test]
fn emit_event_round_trips_a_terminal_event_kind() {
    let request = Request::EmitEvent {
        execution_id: ExecutionId::new(1),
        parent_event_id: None,
        event: EventKind::StepLost { node_id: NodeId::for_attempt("fetch", 1), worker_id: Some(WorkerId::from("worker_a")) },
    };
    let json = serde_json::to_string(&request).unwrap();
    let decoded: Request = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, request);
}

#[test]
fn put_result_defaults_its_hints_when_omitted() {
    let json = json!({
        "type": "PutResult",
        "execution_id": ExecutionId::new(2),
        "name": "body",
        "scope": "step",
        "payload": {"ok": true},
    });
    let decoded: Request = serde_json::from_value(json).unwrap();
    match decoded {
        Request::PutResult { hints, scope, .. } => {
            assert_eq!(scope, ResultScope::Step);
            assert_eq!(hints, PutHints::default());
        }
        other => panic!("expected PutResult, got {other:?}"),
    }
}

#[test]
fn cancel_execution_round_trips_with_a_reason() {
    let request = Request::CancelExecution { execution_id: ExecutionId::new(3), reason: Some("user requested".to_string()) };
    let json = serde_json::to_string(&request).unwrap();
    let decoded: Request = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, request);
}

#[test]
fn register_runtime_round_trips_pool_names() {
    let request = Request::RegisterRuntime { pools: vec!["default".to_string(), "gpu".to_string()] };
    let json = serde_json::to_string(&request).unwrap();
    let decoded: Request = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, request);
}
