// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use noetl_core::event::NodeId;
use noetl_core::id::ExecutionId;

fn key(n: u32) -> TaskKey {
    TaskKey { execution_id: ExecutionId::new(1), node_id: NodeId::for_attempt("fetch", n) }
}

#[test]
fn acquired_lease_is_live_until_deadline() {
    let table = LeaseTable::new();
    table.acquire(key(1), 1, 1_000);

    assert!(table.is_live(&key(1), 999));
    assert!(!table.is_live(&key(1), 1_000));
}

#[test]
fn extend_pushes_the_deadline_out() {
    let table = LeaseTable::new();
    table.acquire(key(1), 1, 1_000);

    table.extend(&key(1), WorkerId::from("worker_a"), 5_000);

    assert!(table.is_live(&key(1), 4_999));
}

#[test]
fn extend_on_unknown_key_is_a_no_op() {
    let table = LeaseTable::new();
    table.extend(&key(1), WorkerId::from("worker_a"), 5_000);
    assert!(!table.is_live(&key(1), 0));
}

#[test]
fn release_removes_the_lease() {
    let table = LeaseTable::new();
    table.acquire(key(1), 1, 1_000);
    table.release(&key(1));
    assert!(!table.is_live(&key(1), 0));
}

#[test]
fn sweep_expired_returns_and_removes_only_past_deadline_leases() {
    let table = LeaseTable::new();
    table.acquire(key(1), 1, 1_000);
    table.acquire(key(2), 1, 5_000);

    let expired = table.sweep_expired(1_000);

    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].key, key(1));
    assert!(table.is_live(&key(2), 1_000));
    assert!(table.sweep_expired(1_000).is_empty());
}

#[test]
fn sweep_expired_reports_the_worker_that_last_held_the_lease() {
    let table = LeaseTable::new();
    table.acquire(key(1), 2, 1_000);
    table.extend(&key(1), WorkerId::from("worker_b"), 1_000);

    let expired = table.sweep_expired(1_000);

    assert_eq!(expired[0].worker_id, Some(WorkerId::from("worker_b")));
    assert_eq!(expired[0].attempt, 2);
}
