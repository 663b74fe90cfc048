// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The execution engine: the only component that writes engine-
//! authored events to the log directly (workers write only through
//! `noetl_dispatcher::Dispatcher::emit_event`). Holds the catalog and
//! in-flight execution registries, drives the dispatch cycle, and
//! reconciles loop/sink completions.

use crate::dispatch::{self, StepOutcome};
use crate::frontier;
use crate::loop_state::{self, LoopAggregator, LoopError};
use crate::template::TemplateContext;
use noetl_broker::{BrokerAdapter, BrokerError};
use noetl_core::catalog::CatalogEntry;
use noetl_core::clock::Clock;
use noetl_core::event::{ErrorInfo, EventKind, NodeId, ResultValue};
use noetl_core::id::{CatalogId, ExecutionId, IdAllocator, ResultId, RuntimeId};
use noetl_core::playbook::Step;
use noetl_dispatcher::{Dispatcher, DispatcherError};
use noetl_storage::result_store::{ResultBackend, ResultStore, ResultStoreError};
use noetl_storage::state::MaterializedState;
use noetl_storage::transient::{TransientStore, VarKind};
use noetl_storage::wal::{EventLogStore, WalError};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Wal(#[from] WalError),
    #[error(transparent)]
    ResultStore(#[from] ResultStoreError),
    #[error(transparent)]
    Dispatcher(#[from] DispatcherError),
    #[error(transparent)]
    Broker(#[from] BrokerError),
    #[error(transparent)]
    Loop(#[from] LoopError),
    #[error(transparent)]
    Template(#[from] crate::template::TemplateError),
    #[error("no such execution {0}")]
    UnknownExecution(ExecutionId),
    #[error("no such catalog entry {0}")]
    UnknownCatalog(CatalogId),
    #[error("no such step {0}")]
    UnknownStep(String),
    #[error("no active loop named {0}")]
    UnknownLoop(String),
}

/// A loop this execution started, tracked so the dispatch cycle can
/// reconcile iteration completions without re-deriving them from the
/// whole event log each tick.
struct ActiveLoop {
    step: Step,
    reconciled: u64,
    manifest_id: ResultId,
}

/// What the engine remembers about one in-flight execution beyond what
/// the event-log fold already tracks (`ExecutionState` stays
/// deliberately minimal; cancellation and the step graph live here).
pub struct ExecutionMeta {
    pub catalog_id: CatalogId,
    pub steps: Vec<Step>,
    pub workload: Value,
    pub parent_execution_id: Option<ExecutionId>,
    pub started_at: u64,
    pub cancel_requested: bool,
    pub cancel_reason: Option<String>,
    active_loops: HashMap<String, ActiveLoop>,
}

/// A thin snapshot of an execution's terminal state, the shape
/// `get_execution` hands back to a caller without exposing the full
/// internal registry.
#[derive(Debug, Clone)]
pub struct ExecutionSummary {
    pub execution_id: ExecutionId,
    pub completed: bool,
    pub failed: bool,
    pub cancelled: bool,
}

#[derive(Debug, Clone)]
pub struct RuntimeRegistration {
    pub runtime_id: RuntimeId,
    pub pools: Vec<String>,
    pub registered_at: u64,
}

pub struct Engine<Br: BrokerAdapter, Rb: ResultBackend, C: Clock> {
    event_log: Arc<EventLogStore>,
    result_store: Arc<ResultStore<Rb>>,
    transient: Arc<TransientStore>,
    dispatcher: Arc<Dispatcher<Br, Rb, C>>,
    loop_aggregator: LoopAggregator<Br>,
    clock: C,
    id_allocator: Arc<dyn IdAllocator>,
    catalogs: Mutex<HashMap<CatalogId, CatalogEntry>>,
    catalog_steps: Mutex<HashMap<CatalogId, Vec<Step>>>,
    executions: Mutex<HashMap<ExecutionId, ExecutionMeta>>,
    runtimes: Mutex<HashMap<RuntimeId, RuntimeRegistration>>,
}

impl<Br: BrokerAdapter, Rb: ResultBackend, C: Clock> Engine<Br, Rb, C> {
    pub fn new(
        event_log: Arc<EventLogStore>,
        result_store: Arc<ResultStore<Rb>>,
        transient: Arc<TransientStore>,
        dispatcher: Arc<Dispatcher<Br, Rb, C>>,
        broker: Arc<Br>,
        clock: C,
        id_allocator: Arc<dyn IdAllocator>,
    ) -> Self {
        Self {
            event_log,
            result_store,
            transient,
            dispatcher,
            loop_aggregator: LoopAggregator::new(broker),
            clock,
            id_allocator,
            catalogs: Mutex::new(HashMap::new()),
            catalog_steps: Mutex::new(HashMap::new()),
            executions: Mutex::new(HashMap::new()),
            runtimes: Mutex::new(HashMap::new()),
        }
    }

    /// Register an already-normalized catalog entry and its step graph.
    /// The DSL parser that would have produced `steps` is out of scope —
    /// callers supply the normalized form.
    pub fn register_catalog(&self, entry: CatalogEntry, steps: Vec<Step>) {
        self.catalogs.lock().insert(entry.id, entry);
        self.catalog_steps.lock().insert(entry.id, steps);
    }

    /// Resolve a catalog path (and, optionally, an exact version) to the
    /// id `create_execution` needs. When `version` is omitted, the most
    /// recently registered matching entry wins — catalog entries are
    /// immutable and append-only, so "most recent" is an unambiguous
    /// choice of "latest". Used by callers that only know the path, e.g.
    /// `noetl-scheduler` and the `sub_playbook` tool's in-process spawner.
    pub fn resolve_catalog(&self, path: &str, version: Option<&str>) -> Option<CatalogId> {
        self.catalogs
            .lock()
            .values()
            .filter(|entry| entry.path == path && version.map_or(true, |v| entry.version == v))
            .max_by_key(|entry| entry.created_at)
            .map(|entry| entry.id)
    }

    pub fn register_runtime(&self, runtime_id: RuntimeId, pools: Vec<String>) -> RuntimeRegistration {
        let registration = RuntimeRegistration { runtime_id: runtime_id.clone(), pools, registered_at: self.clock.epoch_ms() };
        self.runtimes.lock().insert(runtime_id, registration.clone());
        registration
    }

    /// Start a new execution of `catalog_id` against `workload`, appending
    /// `playbook.initialized`. Does not dispatch anything itself —
    /// `dispatch_cycle` must be called at least once afterward.
    pub fn create_execution(
        &self,
        catalog_id: CatalogId,
        workload: Value,
        parent_execution_id: Option<ExecutionId>,
    ) -> Result<ExecutionId, EngineError> {
        let entry = self.catalogs.lock().get(&catalog_id).cloned().ok_or(EngineError::UnknownCatalog(catalog_id))?;
        let steps = self.catalog_steps.lock().get(&catalog_id).cloned().ok_or(EngineError::UnknownCatalog(catalog_id))?;
        let execution_id: ExecutionId = self.id_allocator.next_id().into();
        let now = self.clock.epoch_ms();

        self.event_log.append(
            execution_id,
            None,
            parent_execution_id,
            now,
            EventKind::PlaybookInitialized { catalog_id, catalog_version: Some(entry.version.clone()), workload: workload.clone() },
        )?;

        self.executions.lock().insert(
            execution_id,
            ExecutionMeta {
                catalog_id,
                steps,
                workload,
                parent_execution_id,
                started_at: now,
                cancel_requested: false,
                cancel_reason: None,
                active_loops: HashMap::new(),
            },
        );
        Ok(execution_id)
    }

    /// Reinsert an in-flight execution's registry entry after a restart,
    /// without appending a new `playbook.initialized` event — the event
    /// log already has one from the original `create_execution` call.
    /// The daemon calls this once per execution discovered via
    /// `noetl_storage::wal::EventLogStore::known_execution_ids` whose
    /// folded state is not yet terminal, reading `catalog_id`/`workload`
    /// back out of that execution's own first event.
    pub fn recover_execution(
        &self,
        execution_id: ExecutionId,
        catalog_id: CatalogId,
        workload: Value,
        parent_execution_id: Option<ExecutionId>,
        started_at: u64,
    ) -> Result<(), EngineError> {
        let steps = self.catalog_steps.lock().get(&catalog_id).cloned().ok_or(EngineError::UnknownCatalog(catalog_id))?;
        self.executions.lock().insert(
            execution_id,
            ExecutionMeta {
                catalog_id,
                steps,
                workload,
                parent_execution_id,
                started_at,
                cancel_requested: false,
                cancel_reason: None,
                active_loops: HashMap::new(),
            },
        );
        Ok(())
    }

    pub fn cancel_execution(&self, execution_id: ExecutionId, reason: Option<String>) -> Result<(), EngineError> {
        let mut executions = self.executions.lock();
        let meta = executions.get_mut(&execution_id).ok_or(EngineError::UnknownExecution(execution_id))?;
        meta.cancel_requested = true;
        meta.cancel_reason = reason.clone();
        drop(executions);
        self.event_log.append(execution_id, None, None, self.clock.epoch_ms(), EventKind::ExecutionCancelRequested { reason })?;
        Ok(())
    }

    pub fn list_events(&self, execution_id: ExecutionId) -> Result<Vec<noetl_core::event::StoredEvent>, EngineError> {
        Ok(self.event_log.read(execution_id, None, None)?)
    }

    pub fn get_execution(&self, execution_id: ExecutionId) -> Result<ExecutionSummary, EngineError> {
        let events = self.list_events(execution_id)?;
        let state = MaterializedState::rebuild(&events);
        let exec = state.execution(execution_id).cloned().unwrap_or_default();
        Ok(ExecutionSummary { execution_id, completed: exec.completed, failed: exec.failed, cancelled: exec.cancelled })
    }

    fn template_context<'a>(&self, workload: &'a Value, vars: &'a HashMap<String, Value>, results: &'a HashMap<String, Value>) -> TemplateContext<'a> {
        TemplateContext { workload, vars, results }
    }

    /// One tick of the dispatch cycle: recompute the
    /// frontier from the folded event log, decide each ready step, and
    /// dispatch what's ready. Also reconciles any loop still waiting on
    /// iteration completions and checks for execution-level termination.
    /// Idempotent — calling it again before any new event arrives is a
    /// no-op.
    pub async fn dispatch_cycle(&self, execution_id: ExecutionId) -> Result<(), EngineError> {
        let now = self.clock.epoch_ms();
        for expiry in self.dispatcher.sweep_expired_leases_for(execution_id, now) {
            let node_id = expiry.key.node_id;
            self.dispatcher.emit_event(execution_id, None, EventKind::StepLost { node_id: node_id.clone(), worker_id: expiry.worker_id })?;
            self.dispatcher.emit_event(
                execution_id,
                None,
                EventKind::StepFailed {
                    node_id,
                    error: ErrorInfo {
                        kind: "TaskTimeout".to_string(),
                        message: "lease expired without heartbeat or completion".to_string(),
                        detail_ref: None,
                    },
                    attempt: expiry.attempt,
                    duration_ms: None,
                    loop_name: None,
                    current_index: None,
                },
            )?;
        }

        let events = self.event_log.read(execution_id, None, None)?;
        let state = MaterializedState::rebuild(&events);
        let exec_state = state.execution(execution_id).cloned().unwrap_or_default();

        if exec_state.cancelled {
            return Ok(());
        }

        let workload = {
            let executions = self.executions.lock();
            let meta = executions.get(&execution_id).ok_or(EngineError::UnknownExecution(execution_id))?;
            meta.workload.clone()
        };

        let results: HashMap<String, Value> = exec_state
            .node_result
            .iter()
            .map(|(node_id, result)| (node_id.step_name().to_string(), self.result_to_value(result)))
            .collect();
        let vars = self.transient.snapshot(execution_id, now);
        let ctx = self.template_context(&workload, &vars, &results);

        let steps = {
            let executions = self.executions.lock();
            executions.get(&execution_id).ok_or(EngineError::UnknownExecution(execution_id))?.steps.clone()
        };

        let mut ready = frontier::ready_steps(&steps, &exec_state);
        ready.extend(frontier::ready_retries(&steps, &exec_state, now));
        ready.extend(frontier::ready_finally_steps(&steps, &exec_state));

        for ready_step in ready {
            let step = steps
                .iter()
                .find(|s| s.name == ready_step.step_name)
                .ok_or_else(|| EngineError::UnknownStep(ready_step.step_name.clone()))?
                .clone();
            self.start_step(execution_id, &step, ready_step.attempt, &ctx, now).await?;
        }

        self.reconcile_loops(execution_id, &events).await?;
        self.check_termination(execution_id, &steps).await?;
        Ok(())
    }

    fn result_to_value(&self, result: &ResultValue) -> Value {
        match result {
            ResultValue::Inline(v) => v.clone(),
            ResultValue::Ref { reference } => self.result_store.resolve(&Value::String(reference.clone())).unwrap_or(Value::Null),
        }
    }

    async fn start_step(
        &self,
        execution_id: ExecutionId,
        step: &Step,
        attempt: u32,
        ctx: &TemplateContext<'_>,
        now: u64,
    ) -> Result<(), EngineError> {
        let node_id = NodeId::for_attempt(&step.name, attempt);
        self.event_log.append(
            execution_id,
            None,
            None,
            now,
            EventKind::StepStarted { node_id: node_id.clone(), node_name: step.name.clone(), node_type: step.node_type().to_string(), attempt, loop_name: None, current_index: None },
        )?;

        let decision = dispatch::decide_step(step, ctx)?;
        if let Some(value) = decision.case_value {
            self.event_log.append(execution_id, None, None, now, EventKind::CaseEvaluated { node_id: node_id.clone(), condition: step.when.as_ref().map(|w| w.0.clone()).unwrap_or_default(), value })?;
        }

        match decision.outcome {
            StepOutcome::Skipped { reason } => {
                self.event_log.append(execution_id, None, None, now, EventKind::StepSkipped { node_id, reason, loop_name: None, current_index: None })?;
            }
            StepOutcome::Ready { rendered_inputs } => {
                if let Some(loop_spec) = &step.loop_spec {
                    self.start_loop(execution_id, step, loop_spec, ctx, now).await?;
                } else {
                    self.dispatcher.dispatch_task(execution_id, node_id, step.clone(), rendered_inputs, attempt).await?;
                }
            }
        }
        Ok(())
    }

    async fn start_loop(
        &self,
        execution_id: ExecutionId,
        step: &Step,
        loop_spec: &noetl_core::playbook::LoopSpec,
        ctx: &TemplateContext<'_>,
        now: u64,
    ) -> Result<(), EngineError> {
        let collection = crate::template::render_value(&loop_spec.collection, ctx);
        let items = collection.as_array().cloned().unwrap_or_default();
        let collection_size = items.len() as u64;

        self.event_log.append(execution_id, None, None, now, EventKind::LoopStarted { loop_name: step.name.clone(), collection_size })?;

        let manifest_id: ResultId = self.id_allocator.next_id().into();
        self.executions
            .lock()
            .get_mut(&execution_id)
            .ok_or(EngineError::UnknownExecution(execution_id))?
            .active_loops
            .insert(step.name.clone(), ActiveLoop { step: step.clone(), reconciled: 0, manifest_id });

        let admitted = self.loop_aggregator.start(execution_id, &step.name, collection_size, loop_spec.concurrency).await?;
        for index in admitted {
            self.dispatch_iteration(execution_id, step, loop_spec, &items, index, ctx, now).await?;
        }
        Ok(())
    }

    async fn dispatch_iteration(
        &self,
        execution_id: ExecutionId,
        step: &Step,
        loop_spec: &noetl_core::playbook::LoopSpec,
        items: &[Value],
        index: u64,
        ctx: &TemplateContext<'_>,
        now: u64,
    ) -> Result<(), EngineError> {
        let element = items.get(index as usize).cloned().unwrap_or(Value::Null);
        self.transient.set(execution_id, loop_spec.element_var.clone(), element, VarKind::IteratorState, None, now);
        let vars = self.transient.snapshot(execution_id, now);
        let iter_ctx = self.template_context(ctx.workload, &vars, ctx.results);

        let node_id = NodeId::for_attempt(&format!("{}[{index}]", step.name), 1);
        self.event_log.append(
            execution_id,
            None,
            None,
            now,
            EventKind::StepStarted { node_id: node_id.clone(), node_name: step.name.clone(), node_type: step.node_type().to_string(), attempt: 1, loop_name: Some(step.name.clone()), current_index: Some(index) },
        )?;
        let rendered_inputs: HashMap<String, Value> = step.inputs.iter().map(|(k, v)| (k.clone(), crate::template::render_value(v, &iter_ctx))).collect();
        self.dispatcher.dispatch_task(execution_id, node_id, step.clone(), rendered_inputs, 1).await?;
        Ok(())
    }

    /// Reconcile completed loop iterations against each active loop's
    /// aggregator counter, admitting further iterations and closing out
    /// loops whose collection has fully completed.
    async fn reconcile_loops(&self, execution_id: ExecutionId, events: &[noetl_core::event::StoredEvent]) -> Result<(), EngineError> {
        let loop_names: Vec<String> = {
            let executions = self.executions.lock();
            let Some(meta) = executions.get(&execution_id) else { return Ok(()) };
            meta.active_loops.keys().cloned().collect()
        };

        for loop_name in loop_names {
            let completed_count = events
                .iter()
                .filter(|e| matches!(&e.kind, EventKind::StepCompleted { loop_name: Some(n), .. } if n == &loop_name))
                .count() as u64;

            let (already_reconciled, step, manifest_id, loop_spec) = {
                let executions = self.executions.lock();
                let meta = executions.get(&execution_id).ok_or(EngineError::UnknownExecution(execution_id))?;
                let active = meta.active_loops.get(&loop_name).ok_or_else(|| EngineError::UnknownLoop(loop_name.clone()))?;
                // Only ever populated from a step whose `loop_spec` is `Some` (see `start_step`).
                #[allow(clippy::expect_used)]
                let loop_spec = active.step.loop_spec.clone().expect("active loop always has a loop_spec");
                (active.reconciled, active.step.clone(), active.manifest_id, loop_spec)
            };

            if completed_count <= already_reconciled {
                continue;
            }

            let workload = {
                let executions = self.executions.lock();
                executions.get(&execution_id).ok_or(EngineError::UnknownExecution(execution_id))?.workload.clone()
            };
            let vars = HashMap::new();
            let results = HashMap::new();
            let ctx = self.template_context(&workload, &vars, &results);
            let items_value = crate::template::render_value(&loop_spec.collection, &ctx);
            let items = items_value.as_array().cloned().unwrap_or_default();

            let mut done = false;
            for _ in already_reconciled..completed_count {
                let now = self.clock.epoch_ms();
                let progress = self.loop_aggregator.on_iteration_complete(execution_id, &loop_name).await?;
                for index in progress.admit {
                    self.dispatch_iteration(execution_id, &step, &loop_spec, &items, index, &ctx, now).await?;
                }
                done = progress.done;
            }

            {
                let mut executions = self.executions.lock();
                let meta = executions.get_mut(&execution_id).ok_or(EngineError::UnknownExecution(execution_id))?;
                if let Some(active) = meta.active_loops.get_mut(&loop_name) {
                    active.reconciled = completed_count;
                }
            }

            if done {
                let now = self.clock.epoch_ms();
                let manifest = loop_state::build_manifest(
                    &self.event_log,
                    &self.result_store,
                    execution_id,
                    &loop_name,
                    manifest_id,
                    loop_spec.strategy,
                    loop_spec.merge_path.clone(),
                    now,
                )?;
                let manifest_ref = format!("noetl://manifest/{}", manifest.id.as_u64());
                self.event_log.append(execution_id, None, None, now, EventKind::LoopCompleted { loop_name: loop_name.clone(), result: ResultValue::Ref { reference: manifest_ref.clone() } })?;

                // The loop parent node itself is never dispatched — only its
                // iterations and sink are — so its own terminal event has to
                // be appended here, or `frontier::step_terminal_status` would
                // never see this step leave `Running`.
                self.event_log.append(
                    execution_id,
                    None,
                    None,
                    now,
                    EventKind::StepCompleted {
                        node_id: NodeId::for_attempt(&loop_name, 1),
                        result: Some(ResultValue::Ref { reference: manifest_ref }),
                        duration_ms: None,
                        worker_id: None,
                        loop_name: None,
                        current_index: None,
                    },
                )?;

                if let Some(sink) = &loop_spec.sink {
                    self.dispatch_sink(execution_id, &loop_name, sink, manifest_id, now).await?;
                }

                self.executions
                    .lock()
                    .get_mut(&execution_id)
                    .ok_or(EngineError::UnknownExecution(execution_id))?
                    .active_loops
                    .remove(&loop_name);
            }
        }
        Ok(())
    }

    async fn dispatch_sink(
        &self,
        execution_id: ExecutionId,
        loop_name: &str,
        sink: &noetl_core::playbook::SinkSpec,
        manifest_id: ResultId,
        now: u64,
    ) -> Result<(), EngineError> {
        let node_id = NodeId::for_attempt(&format!("{loop_name}.sink"), 1);
        self.event_log.append(execution_id, None, None, now, EventKind::SinkStarted { node_id: node_id.clone(), loop_name: Some(loop_name.to_string()), current_index: None })?;

        let mut inputs = HashMap::new();
        inputs.insert("manifest_ref".to_string(), Value::String(format!("noetl://manifest/{}", manifest_id.as_u64())));

        let sink_step = Step {
            name: format!("{loop_name}.sink"),
            tool: (*sink.tool).clone(),
            inputs,
            next: Vec::new(),
            when: None,
            loop_spec: None,
            retry: None,
            sink: None,
            timeout_ms: None,
            pool: "default".to_string(),
            is_finally: false,
        };
        self.dispatcher.dispatch_task(execution_id, node_id, sink_step, HashMap::new(), 1).await?;
        Ok(())
    }

    /// Append the terminal playbook/execution events once the whole
    /// graph (finally steps included) has reached a terminal status, and
    /// release this execution's ephemeral resources.
    async fn check_termination(&self, execution_id: ExecutionId, steps: &[Step]) -> Result<(), EngineError> {
        let events = self.event_log.read(execution_id, None, None)?;
        let state = MaterializedState::rebuild(&events);
        let exec_state = state.execution(execution_id).cloned().unwrap_or_default();

        if exec_state.completed || exec_state.failed || exec_state.cancelled {
            return Ok(());
        }
        if !frontier::execution_done(steps, &exec_state) {
            return Ok(());
        }

        let now = self.clock.epoch_ms();
        if frontier::has_failure(steps, &exec_state) {
            self.event_log.append(execution_id, None, None, now, EventKind::PlaybookFailed { error: ErrorInfo { kind: "StepFailed".into(), message: "one or more steps failed".into(), detail_ref: None } })?;
            self.event_log.append(execution_id, None, None, now, EventKind::ExecutionFailed { node_name: None, error: ErrorInfo { kind: "StepFailed".into(), message: "execution terminated with a failed step".into(), detail_ref: None } })?;
        } else {
            self.event_log.append(execution_id, None, None, now, EventKind::PlaybookCompleted)?;
            self.event_log.append(execution_id, None, None, now, EventKind::ExecutionCompleted)?;
        }

        self.result_store.cleanup_execution(execution_id)?;
        self.transient.drop_execution(execution_id);
        Ok(())
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
