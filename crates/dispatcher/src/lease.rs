// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-task lease bookkeeping: one deadline per outstanding unit of
//! work, refreshed by heartbeats.
//!
//! This is deliberately not a full three-layered timeout scheme — it
//! only tracks the engine-side `lease_timeout`. The worker execution
//! timeout is enforced by the worker itself; the broker redelivery
//! timeout lives in [`noetl_broker::LocalBroker`].

use noetl_core::id::{ExecutionId, WorkerId};
use parking_lot::Mutex;
use std::collections::HashMap;

/// A task identity within the lease table: one node, one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskKey {
    pub execution_id: ExecutionId,
    pub node_id: noetl_core::event::NodeId,
}

#[derive(Debug, Clone)]
struct Lease {
    worker_id: Option<WorkerId>,
    deadline_epoch_ms: u64,
    attempt: u32,
}

/// A lease that aged out without a heartbeat or terminal event — the
/// engine turns this into a synthetic `step.lost` event and consults its
/// retry policy.
#[derive(Debug, Clone)]
pub struct LeaseExpiry {
    pub key: TaskKey,
    pub worker_id: Option<WorkerId>,
    pub attempt: u32,
}

/// In-memory table of outstanding per-task leases.
#[derive(Default)]
pub struct LeaseTable {
    leases: Mutex<HashMap<TaskKey, Lease>>,
}

impl LeaseTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart, on redispatch) a lease for `key`.
    pub fn acquire(&self, key: TaskKey, attempt: u32, deadline_epoch_ms: u64) {
        self.leases.lock().insert(key, Lease { worker_id: None, deadline_epoch_ms, attempt });
    }

    /// Extend a lease's deadline — the effect of a `Heartbeat` RPC.
    /// Unknown keys are ignored: a heartbeat racing a lease's own
    /// expiry-driven removal is not an error.
    pub fn extend(&self, key: &TaskKey, worker_id: WorkerId, new_deadline_epoch_ms: u64) {
        if let Some(lease) = self.leases.lock().get_mut(key) {
            lease.worker_id = Some(worker_id);
            lease.deadline_epoch_ms = new_deadline_epoch_ms;
        }
    }

    /// Close a lease out, e.g. on a terminal `EmitEvent` for its node.
    pub fn release(&self, key: &TaskKey) {
        self.leases.lock().remove(key);
    }

    pub fn is_live(&self, key: &TaskKey, now: u64) -> bool {
        self.leases.lock().get(key).is_some_and(|l| l.deadline_epoch_ms > now)
    }

    /// Remove and return every lease whose deadline has passed.
    pub fn sweep_expired(&self, now: u64) -> Vec<LeaseExpiry> {
        let mut leases = self.leases.lock();
        let expired_keys: Vec<TaskKey> =
            leases.iter().filter(|(_, l)| l.deadline_epoch_ms <= now).map(|(k, _)| k.clone()).collect();
        expired_keys
            .into_iter()
            .filter_map(|key| {
                leases.remove(&key).map(|lease| LeaseExpiry { key, worker_id: lease.worker_id, attempt: lease.attempt })
            })
            .collect()
    }

    /// Remove and return every expired lease belonging to one execution
    /// — used by the engine's per-execution dispatch cycle so that
    /// ticking one execution never steals another execution's expired
    /// leases out from under it. State mutation is serialized per
    /// execution, not globally.
    pub fn sweep_expired_for(&self, execution_id: ExecutionId, now: u64) -> Vec<LeaseExpiry> {
        let mut leases = self.leases.lock();
        let expired_keys: Vec<TaskKey> = leases
            .iter()
            .filter(|(k, l)| k.execution_id == execution_id && l.deadline_epoch_ms <= now)
            .map(|(k, _)| k.clone())
            .collect();
        expired_keys
            .into_iter()
            .filter_map(|key| {
                leases.remove(&key).map(|lease| LeaseExpiry { key, worker_id: lease.worker_id, attempt: lease.attempt })
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "lease_tests.rs"]
mod tests;
