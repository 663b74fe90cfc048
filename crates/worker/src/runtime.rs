// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The worker runtime's per-notification cycle and polling loop. Built
//! on the dispatcher's own RPC surface — a worker is just another
//! caller of `GetTask`/`EmitEvent`/`Heartbeat`/`PutResult`, the same
//! four calls the daemon's listener exposes over the wire to an
//! out-of-process worker.

use crate::registry::{SubExecutionSpawner, ToolContext, ToolError, ToolRegistry};
use noetl_broker::{BrokerAdapter, BrokerError};
use noetl_core::clock::Clock;
use noetl_core::event::{ErrorInfo, EventKind, NodeId, ResultValue, SinkSummary};
use noetl_core::id::{ExecutionId, WorkerId};
use noetl_core::playbook::SinkSpec;
use noetl_core::result::{ResultScope, StorageTier};
use noetl_dispatcher::lease::TaskKey;
use noetl_dispatcher::rpc::{Dispatcher, DispatcherError, TaskSpec};
use noetl_storage::result_store::{PutHints, ResultBackend};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Dispatcher(#[from] DispatcherError),
    #[error(transparent)]
    Broker(#[from] BrokerError),
    #[error(transparent)]
    Tool(#[from] ToolError),
}

pub struct WorkerRuntimeConfig {
    pub worker_id: WorkerId,
    pub pools: Vec<String>,
    pub lease_timeout: Duration,
    pub poll_interval: Duration,
}

/// The step name this node id belongs to, split from its `[index]`
/// loop-iteration suffix if it has one — `dispatch_iteration` mints
/// node ids as `"{step_name}[{index}]#{attempt}"`, so recovering
/// `loop_name`/`current_index` here is a pure string parse rather than
/// a field the dispatcher would otherwise have to carry just for this.
fn parse_loop_node(node_id: &NodeId) -> (Option<String>, Option<u64>) {
    let step_name = node_id.step_name();
    let Some(open) = step_name.find('[') else { return (None, None) };
    if !step_name.ends_with(']') {
        return (None, None);
    }
    match step_name[open + 1..step_name.len() - 1].parse::<u64>() {
        Ok(index) => (Some(step_name[..open].to_string()), Some(index)),
        Err(_) => (None, None),
    }
}

/// Non-cryptographic 64-bit hash for the sink summary's `checksum`
/// field — no hashing crate is in the workspace stack, so this follows
/// `noetl_engine::retry`'s precedent of a small hand-rolled mix rather
/// than adding one just for this.
fn fnv1a64(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    bytes.iter().fold(OFFSET, |hash, byte| (hash ^ *byte as u64).wrapping_mul(PRIME))
}

/// The worker runtime (C10): polls its pools' task subjects, executes
/// whatever a notification names via the tool registry, and reports
/// back exclusively through the dispatcher's RPCs. Stateless across
/// restarts beyond `in_flight`, which only exists to know which leases
/// to renew.
pub struct WorkerRuntime<Br: BrokerAdapter, Rb: ResultBackend, C: Clock> {
    dispatcher: Arc<Dispatcher<Br, Rb, C>>,
    broker: Arc<Br>,
    registry: ToolRegistry,
    spawner: Option<Arc<dyn SubExecutionSpawner>>,
    clock: C,
    config: WorkerRuntimeConfig,
    in_flight: Mutex<HashSet<TaskKey>>,
}

impl<Br: BrokerAdapter, Rb: ResultBackend, C: Clock> WorkerRuntime<Br, Rb, C> {
    pub fn new(
        dispatcher: Arc<Dispatcher<Br, Rb, C>>,
        broker: Arc<Br>,
        registry: ToolRegistry,
        spawner: Option<Arc<dyn SubExecutionSpawner>>,
        clock: C,
        config: WorkerRuntimeConfig,
    ) -> Self {
        Self { dispatcher, broker, registry, spawner, clock, config, in_flight: Mutex::new(HashSet::new()) }
    }

    fn subjects(&self) -> Vec<String> {
        let mut subjects = Vec::new();
        for pool in &self.config.pools {
            for kind in self.registry.kinds() {
                subjects.push(format!("tasks.{pool}.{kind}"));
            }
        }
        subjects
    }

    /// Poll every subscribed subject once, processing at most one
    /// delivery per subject. Returns the number of deliveries handled,
    /// mainly so tests can drive the cycle deterministically instead of
    /// racing a background `run` loop.
    pub async fn poll_once(&self) -> Result<usize, WorkerError> {
        let mut handled = 0;
        for subject in self.subjects() {
            if let Some(delivery) = self.broker.pull(&subject).await? {
                self.process_delivery(&subject, delivery.delivery_id, delivery.payload).await?;
                handled += 1;
            }
        }
        Ok(handled)
    }

    /// Extend every lease this worker still has in flight — heartbeats
    /// fire at `lease_timeout / 3`.
    pub fn send_heartbeat(&self) {
        let keys: Vec<TaskKey> = self.in_flight.lock().iter().cloned().collect();
        if !keys.is_empty() {
            self.dispatcher.heartbeat(self.config.worker_id.clone(), &keys);
        }
    }

    /// Run the poll/heartbeat loop until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut poll_tick = tokio::time::interval(self.config.poll_interval);
        let mut heartbeat_tick = tokio::time::interval(self.config.lease_timeout / 3);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = poll_tick.tick() => {
                    if let Err(error) = self.poll_once().await {
                        tracing::warn!(%error, "worker poll cycle failed");
                    }
                }
                _ = heartbeat_tick.tick() => self.send_heartbeat(),
            }
        }
    }

    async fn process_delivery(&self, subject: &str, delivery_id: u64, payload: Vec<u8>) -> Result<(), WorkerError> {
        let notification: noetl_dispatcher::rpc::TaskNotification = match serde_json::from_slice(&payload) {
            Ok(n) => n,
            Err(_) => {
                self.broker.ack(subject, delivery_id).await?;
                return Ok(());
            }
        };
        self.broker.ack(subject, delivery_id).await?;

        let task = match self.dispatcher.get_task(notification.execution_id, notification.node_id.clone()) {
            Ok(task) => task,
            // A lease that expired between notification and fetch is
            // dropped silently, not retried.
            Err(DispatcherError::LeaseExpired(_)) | Err(DispatcherError::UnknownTask(_)) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let key = TaskKey { execution_id: task.execution_id, node_id: task.node_id.clone() };
        self.in_flight.lock().insert(key.clone());
        let started = self.clock.epoch_ms();
        let outcome = self.run_task(&task).await;
        self.in_flight.lock().remove(&key);
        let duration_ms = self.clock.epoch_ms().saturating_sub(started);

        match outcome {
            Ok(value) => self.emit_success(&task, value, duration_ms)?,
            Err(error) => self.emit_failure(&task, error, duration_ms)?,
        }
        Ok(())
    }

    async fn run_task(&self, task: &TaskSpec) -> Result<Value, ToolError> {
        let kind = task.step.tool.kind();
        let executor = self.registry.get(kind).ok_or_else(|| ToolError::UnsupportedTool(kind.to_string()))?;
        let ctx = ToolContext { execution_id: task.execution_id, spawner: self.spawner.clone() };
        let result = executor.execute(&ctx, &task.step.tool, &task.rendered_inputs).await?;

        if let Some(sink) = task.step.sink.clone() {
            self.run_sink(task, &sink, &result).await?;
        }
        Ok(result)
    }

    async fn run_sink(&self, task: &TaskSpec, sink: &SinkSpec, result: &Value) -> Result<(), ToolError> {
        let kind = sink.tool.kind();
        let executor = self.registry.get(kind).ok_or_else(|| ToolError::UnsupportedTool(kind.to_string()))?;
        let ctx = ToolContext { execution_id: task.execution_id, spawner: self.spawner.clone() };
        let mut inputs = HashMap::new();
        inputs.insert("result".to_string(), result.clone());

        let sink_node_id = NodeId::for_attempt(&format!("{}.sink", task.node_id.step_name()), 1);
        self.dispatcher.emit_event(task.execution_id, None, EventKind::SinkStarted { node_id: sink_node_id.clone(), loop_name: None, current_index: None })?;
        executor.execute(&ctx, sink.tool.as_ref(), &inputs).await?;

        let payload = serde_json::to_vec(result).unwrap_or_default();
        let summary = SinkSummary { rows_affected: 1, bytes: payload.len() as u64, checksum: format!("{:016x}", fnv1a64(&payload)) };
        self.dispatcher.emit_event(task.execution_id, None, EventKind::SinkCompleted { node_id: sink_node_id, loop_name: None, current_index: None, summary })?;
        Ok(())
    }

    fn build_result_value(&self, execution_id: ExecutionId, node_id: &NodeId, value: Value) -> Result<ResultValue, WorkerError> {
        let result_ref = self.dispatcher.put_result(execution_id, node_id.to_string(), ResultScope::Step, value.clone(), PutHints::default())?;
        Ok(match result_ref.tier {
            StorageTier::Inline => ResultValue::Inline(value),
            _ => ResultValue::Ref { reference: result_ref.uri() },
        })
    }

    fn emit_success(&self, task: &TaskSpec, value: Value, duration_ms: u64) -> Result<(), WorkerError> {
        let (loop_name, current_index) = parse_loop_node(&task.node_id);
        let result = self.build_result_value(task.execution_id, &task.node_id, value)?;
        self.dispatcher.emit_event(
            task.execution_id,
            None,
            EventKind::StepCompleted {
                node_id: task.node_id.clone(),
                result: Some(result),
                duration_ms: Some(duration_ms),
                worker_id: Some(self.config.worker_id.clone()),
                loop_name,
                current_index,
            },
        )?;
        Ok(())
    }

    fn emit_failure(&self, task: &TaskSpec, error: ToolError, duration_ms: u64) -> Result<(), WorkerError> {
        let (loop_name, current_index) = parse_loop_node(&task.node_id);
        self.dispatcher.emit_event(
            task.execution_id,
            None,
            EventKind::StepFailed {
                node_id: task.node_id.clone(),
                error: ErrorInfo { kind: error.kind().to_string(), message: error.to_string(), detail_ref: None },
                attempt: task.attempt,
                duration_ms: Some(duration_ms),
                loop_name,
                current_index,
            },
        )?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
