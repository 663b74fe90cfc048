// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use noetl_core::event::NodeId;
use noetl_core::id::{EventId, ExecutionId};
use serde_json::json;

#[test]
fn get_execution_round_trips() {
    let query = Query::GetExecution { execution_id: ExecutionId::new(1) };
    let json = serde_json::to_string(&query).unwrap();
    let decoded: Query = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, query);
}

#[test]
fn list_events_omits_an_absent_cursor() {
    let query = Query::ListEvents { execution_id: ExecutionId::new(1), from_event_id: None, limit: 50 };
    let value = serde_json::to_value(&query).unwrap();
    assert_eq!(value, json!({"type": "ListEvents", "execution_id": 1, "limit": 50}));
}

#[test]
fn list_events_carries_a_resume_cursor() {
    let query = Query::ListEvents { execution_id: ExecutionId::new(1), from_event_id: Some(EventId::new(42)), limit: 10 };
    let json = serde_json::to_string(&query).unwrap();
    let decoded: Query = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, query);
}

#[test]
fn get_task_round_trips_a_node_id() {
    let query = Query::GetTask { execution_id: ExecutionId::new(1), node_id: NodeId::for_attempt("fetch", 2) };
    let json = serde_json::to_string(&query).unwrap();
    let decoded: Query = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, query);
}

#[test]
fn resolve_catalog_omits_an_absent_version() {
    let query = Query::ResolveCatalog { path: "wf".to_string(), version: None };
    let value = serde_json::to_value(&query).unwrap();
    assert_eq!(value, json!({"type": "ResolveCatalog", "path": "wf"}));
}

#[test]
fn resolve_catalog_round_trips_a_pinned_version() {
    let query = Query::ResolveCatalog { path: "wf".to_string(), version: Some("v2".to_string()) };
    let json = serde_json::to_string(&query).unwrap();
    let decoded: Query = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, query);
}
