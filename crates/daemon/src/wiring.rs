// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Concrete type wiring for the daemon's process: one [`LocalBroker`]
//! over one filesystem-backed result store, shared by the engine, the
//! dispatcher, the scheduler, and (when enabled) an in-process worker —
//! one concrete stack built once at startup and handed around behind
//! `Arc`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use noetl_broker::LocalBroker;
use noetl_core::clock::SystemClock;
use noetl_core::id::{ExecutionId, IdAllocator};
use noetl_dispatcher::rpc::Dispatcher;
use noetl_engine::snowflake::SnowflakeAllocator;
use noetl_engine::Engine;
use noetl_scheduler::Scheduler;
use noetl_storage::result_store::FilesystemBackend;
use noetl_storage::{EventLogStore, ResultStore, TransientStore};
use noetl_worker::{ToolRegistry, WorkerRuntime, WorkerRuntimeConfig};
use parking_lot::Mutex;

use crate::env;

pub type AppBroker = LocalBroker<SystemClock>;
pub type AppEngine = Engine<AppBroker, FilesystemBackend, SystemClock>;
pub type AppDispatcher = Dispatcher<AppBroker, FilesystemBackend, SystemClock>;
pub type AppScheduler = Scheduler<AppBroker, FilesystemBackend, SystemClock>;
pub type AppWorkerRuntime = WorkerRuntime<AppBroker, FilesystemBackend, SystemClock>;

/// The daemon's assembled process state, shared across the listener's
/// connection handlers and the two background tickers (dispatch-cycle,
/// scheduler-tick).
pub struct App {
    pub event_log: Arc<EventLogStore>,
    pub broker: Arc<AppBroker>,
    pub engine: Arc<AppEngine>,
    pub dispatcher: Arc<AppDispatcher>,
    pub scheduler: Arc<AppScheduler>,
    pub worker_runtime: Option<Arc<AppWorkerRuntime>>,
    pub id_allocator: Arc<dyn IdAllocator>,
    /// Executions the dispatch-cycle ticker should keep driving.
    /// `Engine`'s own execution registry has no "list active ids"
    /// accessor (it only answers per-id queries), so the daemon tracks
    /// membership itself: populated on `CreateExecution`, on startup
    /// recovery, and on each schedule firing; pruned once
    /// `Engine::get_execution` reports a terminal status.
    pub active_executions: Mutex<HashSet<ExecutionId>>,
    pub start_time: Instant,
}

impl App {
    /// Build the process's storage, broker, engine, dispatcher, and
    /// scheduler from a state directory. Does not load the catalog or
    /// recover in-flight executions — see [`crate::lifecycle::startup`].
    pub fn build(state_dir: &std::path::Path) -> Result<Self, noetl_storage::wal::WalError> {
        let event_log = Arc::new(EventLogStore::open(env::events_dir(state_dir))?);
        let result_backend = FilesystemBackend::new(env::results_dir(state_dir));
        let result_store =
            Arc::new(ResultStore::new(result_backend, env::result_inline_threshold(), env::result_kv_threshold()));
        let transient = Arc::new(TransientStore::new());
        let broker = Arc::new(LocalBroker::new(SystemClock, env::broker_redelivery_timeout()));
        let id_allocator: Arc<dyn IdAllocator> = Arc::new(SnowflakeAllocator::new(SystemClock, env::shard_id()));

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&event_log),
            Arc::clone(&result_store),
            Arc::clone(&broker),
            SystemClock,
            Arc::clone(&id_allocator),
            env::lease_timeout(),
        ));

        let engine = Arc::new(Engine::new(
            Arc::clone(&event_log),
            Arc::clone(&result_store),
            transient,
            Arc::clone(&dispatcher),
            Arc::clone(&broker),
            SystemClock,
            Arc::clone(&id_allocator),
        ));

        let scheduler = Arc::new(Scheduler::new(Arc::clone(&broker), Arc::clone(&engine), SystemClock));

        let worker_runtime = if env::inline_worker_enabled() {
            let config = WorkerRuntimeConfig {
                worker_id: format!("inline-{}", std::process::id()).into(),
                pools: env::inline_worker_pools(),
                lease_timeout: env::lease_timeout(),
                poll_interval: env::worker_poll_interval(),
            };
            Some(Arc::new(WorkerRuntime::new(
                Arc::clone(&dispatcher),
                Arc::clone(&broker),
                ToolRegistry::with_builtin_tools(),
                Some(Arc::new(crate::catalog::EngineSpawner { engine: Arc::clone(&engine) })),
                SystemClock,
                config,
            )))
        } else {
            None
        };

        Ok(Self {
            event_log,
            broker,
            engine,
            dispatcher,
            scheduler,
            worker_runtime,
            id_allocator,
            active_executions: Mutex::new(HashSet::new()),
            start_time: Instant::now(),
        })
    }

    pub fn track_execution(&self, execution_id: ExecutionId) {
        self.active_executions.lock().insert(execution_id);
    }

    /// Drop every execution whose current status is terminal, called
    /// once per dispatch-cycle tick so the tracking set doesn't grow
    /// without bound over a long-running daemon.
    pub fn prune_terminal_executions(&self) {
        let candidates: Vec<ExecutionId> = self.active_executions.lock().iter().copied().collect();
        for execution_id in candidates {
            let Ok(summary) = self.engine.get_execution(execution_id) else { continue };
            if summary.completed || summary.failed || summary.cancelled {
                self.active_executions.lock().remove(&execution_id);
            }
        }
    }
}
