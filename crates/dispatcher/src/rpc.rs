// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The dispatcher's RPC surface: `GetTask`, `EmitEvent`, `Heartbeat`,
//! `PutResult`. One context struct holds every store a request handler
//! touches, and each request variant maps to a short, direct call into
//! it — the worker-facing analogue of the daemon's CLI-facing request
//! dispatch.

use crate::lease::{LeaseExpiry, LeaseTable, TaskKey};
use noetl_broker::{BrokerAdapter, BrokerError};
use noetl_core::clock::Clock;
use noetl_core::event::{EventIdempotenceKey, EventKind, NodeId};
use noetl_core::id::{EventId, ExecutionId, IdAllocator, WorkerId};
use noetl_core::playbook::Step;
use noetl_storage::result_store::{PutHints, ResultBackend, ResultStore, ResultStoreError};
use noetl_storage::wal::{EventLogStore, WalError};
use noetl_core::result::{ResultRef, ResultScope};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// The ≤1 KiB budget on a task notification itself — a tighter bound
/// than the broker's general 16 KiB notification budget, enforced here
/// because the dispatcher, not the broker, knows the shape of this
/// particular payload.
pub const TASK_NOTIFICATION_BYTES: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum DispatcherError {
    #[error("task {0:?} lease has expired or was never dispatched")]
    LeaseExpired(TaskKey),
    #[error("no such task {0:?}")]
    UnknownTask(TaskKey),
    #[error("task notification exceeds {TASK_NOTIFICATION_BYTES} bytes")]
    NotificationTooLarge,
    #[error(transparent)]
    Wal(#[from] WalError),
    #[error(transparent)]
    ResultStore(#[from] ResultStoreError),
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// The wire shape of a task notification published to `tasks.<pool>.<kind>`
/// — deliberately thin: it must not carry rendered inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskNotification {
    pub execution_id: ExecutionId,
    pub node_id: NodeId,
    pub deadline_epoch_ms: u64,
}

/// The full task detail a worker fetches via `GetTask` after receiving a
/// notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub execution_id: ExecutionId,
    pub node_id: NodeId,
    pub step: Step,
    pub rendered_inputs: HashMap<String, Value>,
    pub attempt: u32,
    pub deadline_epoch_ms: u64,
}

struct DispatchedTask {
    step: Step,
    rendered_inputs: HashMap<String, Value>,
    attempt: u32,
}

/// The dispatcher: publishes task notifications, answers
/// `GetTask`/`Heartbeat`/`PutResult`, and authoritatively appends worker-
/// originated events via `EmitEvent`. One instance is shared by every
/// connection handler in the daemon — the engine owns writes to the
/// event log; workers write only through the dispatcher RPC.
pub struct Dispatcher<Br: BrokerAdapter, Rb: ResultBackend, C: Clock> {
    event_log: Arc<EventLogStore>,
    result_store: Arc<ResultStore<Rb>>,
    broker: Arc<Br>,
    clock: C,
    id_allocator: Arc<dyn IdAllocator>,
    lease_timeout_ms: u64,
    leases: LeaseTable,
    tasks: Mutex<HashMap<TaskKey, DispatchedTask>>,
    /// First-writer-wins table for terminal events, keyed by
    /// `(execution_id, node_id, event_type)`: if two workers race
    /// `EmitEvent` for the same node's terminal
    /// status — an at-least-once broker redelivery handed to two workers
    /// is the one realistic way this happens, since retries always mint a
    /// fresh `node_id` — the second is discarded and the first's
    /// `event_id` is handed back instead of appending a duplicate.
    seen_terminal: Mutex<HashMap<EventIdempotenceKey, EventId>>,
}

impl<Br: BrokerAdapter, Rb: ResultBackend, C: Clock> Dispatcher<Br, Rb, C> {
    pub fn new(
        event_log: Arc<EventLogStore>,
        result_store: Arc<ResultStore<Rb>>,
        broker: Arc<Br>,
        clock: C,
        id_allocator: Arc<dyn IdAllocator>,
        lease_timeout: Duration,
    ) -> Self {
        Self {
            event_log,
            result_store,
            broker,
            clock,
            id_allocator,
            lease_timeout_ms: lease_timeout.as_millis() as u64,
            leases: LeaseTable::new(),
            tasks: Mutex::new(HashMap::new()),
            seen_terminal: Mutex::new(HashMap::new()),
        }
    }

    /// Register a task's full detail, start its lease, and publish the
    /// thin notification workers poll for. Called by the engine's
    /// dispatch cycle (`noetl_engine::dispatch`), never by a worker.
    pub async fn dispatch_task(
        &self,
        execution_id: ExecutionId,
        node_id: NodeId,
        step: Step,
        rendered_inputs: HashMap<String, Value>,
        attempt: u32,
    ) -> Result<(), DispatcherError> {
        let now = self.clock.epoch_ms();
        let deadline_epoch_ms = now + self.lease_timeout_ms;
        let key = TaskKey { execution_id, node_id: node_id.clone() };

        let notification = TaskNotification { execution_id, node_id: node_id.clone(), deadline_epoch_ms };
        let payload = serde_json::to_vec(&notification).map_err(|_| DispatcherError::NotificationTooLarge)?;
        if payload.len() > TASK_NOTIFICATION_BYTES {
            return Err(DispatcherError::NotificationTooLarge);
        }

        let pool = step.pool.clone();
        let kind = step.tool.kind();
        self.tasks.lock().insert(key.clone(), DispatchedTask { step, rendered_inputs, attempt });
        self.leases.acquire(key, attempt, deadline_epoch_ms);

        self.broker.publish(&format!("tasks.{pool}.{kind}"), payload).await?;
        Ok(())
    }

    /// `GetTask(execution_id, node_id) -> { spec, rendered_inputs, deadline }`.
    /// A worker calling this after its lease has expired gets
    /// [`DispatcherError::LeaseExpired`]; the caller's response to that
    /// is to drop the notification silently.
    pub fn get_task(&self, execution_id: ExecutionId, node_id: NodeId) -> Result<TaskSpec, DispatcherError> {
        let now = self.clock.epoch_ms();
        let key = TaskKey { execution_id, node_id: node_id.clone() };
        if !self.leases.is_live(&key, now) {
            return Err(DispatcherError::LeaseExpired(key));
        }
        let tasks = self.tasks.lock();
        let task = tasks.get(&key).ok_or_else(|| DispatcherError::UnknownTask(key.clone()))?;
        Ok(TaskSpec {
            execution_id,
            node_id,
            step: task.step.clone(),
            rendered_inputs: task.rendered_inputs.clone(),
            attempt: task.attempt,
            deadline_epoch_ms: now + self.lease_timeout_ms,
        })
    }

    /// `EmitEvent(execution_id, event) -> event_id`. The sole path by
    /// which a worker may mutate durable state. Terminal events for a
    /// node release its lease immediately rather than waiting for the
    /// next sweep.
    pub fn emit_event(
        &self,
        execution_id: ExecutionId,
        parent_event_id: Option<EventId>,
        kind: EventKind,
    ) -> Result<EventId, DispatcherError> {
        let idempotence_key = kind.node_id().filter(|_| kind.is_terminal_for_node()).map(|node_id| {
            EventIdempotenceKey { execution_id, node_id: node_id.clone(), event_type: kind.type_name() }
        });

        let mut seen = self.seen_terminal.lock();
        if let Some(key) = &idempotence_key {
            if let Some(&existing) = seen.get(key) {
                tracing::debug!(%execution_id, node_id = %key.node_id, event_type = key.event_type, "duplicate terminal event discarded");
                return Ok(existing);
            }
        }

        let created_at = self.clock.epoch_ms();
        let node_id = kind.node_id().cloned();
        let is_terminal = kind.is_terminal_for_node() || matches!(kind, EventKind::StepLost { .. });
        let event_id = self.event_log.append(execution_id, parent_event_id, None, created_at, kind)?;

        if let Some(key) = idempotence_key {
            seen.insert(key, event_id);
        }
        drop(seen);

        if is_terminal {
            if let Some(node_id) = node_id {
                let key = TaskKey { execution_id, node_id };
                self.leases.release(&key);
                self.tasks.lock().remove(&key);
            }
        }
        Ok(event_id)
    }

    /// `Heartbeat(worker_id, leased_tasks[]) -> ack`. Extends every lease
    /// the worker still holds; unknown or already-expired leases are
    /// silently ignored rather than treated as a protocol error, since a
    /// heartbeat racing an engine-side sweep is an expected timing.
    pub fn heartbeat(&self, worker_id: WorkerId, leased_tasks: &[TaskKey]) {
        let new_deadline = self.clock.epoch_ms() + self.lease_timeout_ms;
        for key in leased_tasks {
            self.leases.extend(key, worker_id.clone(), new_deadline);
        }
    }

    /// `PutResult(execution_id, name, payload|ref, scope) -> ref`. A thin
    /// wrapper over the Result Store that mints the `ResultId` on the
    /// worker's behalf, since workers do not carry an ID allocator of
    /// their own — workers are stateless.
    pub fn put_result(
        &self,
        execution_id: ExecutionId,
        name: impl Into<String>,
        scope: ResultScope,
        payload: Value,
        hints: PutHints,
    ) -> Result<ResultRef, DispatcherError> {
        let id = self.id_allocator.next_id().into();
        Ok(self.result_store.put(id, execution_id, name, scope, payload, hints)?)
    }

    /// Supervise timeouts: remove and return every lease that aged out
    /// without a heartbeat or terminal event. The caller (the engine's
    /// dispatch cycle) turns each into a `step.lost` event and consults
    /// its retry policy.
    pub fn sweep_expired_leases(&self, now: u64) -> Vec<LeaseExpiry> {
        let expired = self.leases.sweep_expired(now);
        let mut tasks = self.tasks.lock();
        for expiry in &expired {
            tasks.remove(&expiry.key);
        }
        expired
    }

    /// The per-execution variant of [`Self::sweep_expired_leases`] —
    /// used by the engine's dispatch cycle so ticking one execution
    /// never removes another execution's expired leases before that
    /// execution gets a chance to react to them.
    pub fn sweep_expired_leases_for(&self, execution_id: ExecutionId, now: u64) -> Vec<LeaseExpiry> {
        let expired = self.leases.sweep_expired_for(execution_id, now);
        let mut tasks = self.tasks.lock();
        for expiry in &expired {
            tasks.remove(&expiry.key);
        }
        expired
    }
}

#[cfg(test)]
#[path = "rpc_tests.rs"]
mod tests;
