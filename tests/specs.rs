// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace-level end-to-end scenario tests. Each `#[tokio::test]`
//! wires a real (in-process) `Engine` + `Dispatcher` + `WorkerRuntime`
//! over a shared `LocalBroker`/`EventLogStore`/`ResultStore` — no
//! daemon process, no wire protocol, just the same library surface
//! `noetl-daemon` itself calls.
//!
//! Tool steps use the `shell` executor with `echo`/`awk` as a
//! deterministic stand-in for the nominal HTTP/Python calls the
//! scenarios describe — real network or interpreter dependencies would
//! make these tests environment-fragile for no added coverage, since
//! the worker's tool dispatch is already exercised per-tool in
//! `noetl-worker`'s own test suite.

use noetl_broker::LocalBroker;
use noetl_core::catalog::{CatalogEntry, CatalogKind};
use noetl_core::clock::FakeClock;
use noetl_core::event::{EventKind, ResultValue};
use noetl_core::id::{CatalogId, ExecutionId, IdAllocator, ResultId, Snowflake, WorkerId};
use noetl_core::playbook::{Backoff, LoopMode, LoopSpec, RetryPolicy, RetryableError, SinkSpec, Step, Tool, WhenCondition};
use noetl_dispatcher::lease::TaskKey;
use noetl_dispatcher::Dispatcher;
use noetl_engine::{Engine, ExecutionSummary};
use noetl_storage::result_store::{FilesystemBackend, ResultStore};
use noetl_storage::transient::TransientStore;
use noetl_storage::wal::EventLogStore;
use noetl_worker::{ToolRegistry, WorkerRuntime, WorkerRuntimeConfig};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

struct SequentialIds(AtomicU64);

impl IdAllocator for SequentialIds {
    fn next_id(&self) -> Snowflake {
        Snowflake::new(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

type TestBroker = LocalBroker<FakeClock>;
type TestBackend = FilesystemBackend;
type TestEngine = Engine<TestBroker, TestBackend, FakeClock>;
type TestWorker = WorkerRuntime<TestBroker, TestBackend, FakeClock>;
type TestDispatcher = Dispatcher<TestBroker, TestBackend, FakeClock>;

struct Harness {
    engine: TestEngine,
    dispatcher: Arc<TestDispatcher>,
    broker: Arc<TestBroker>,
    event_log: Arc<EventLogStore>,
    result_store: Arc<ResultStore<TestBackend>>,
    clock: FakeClock,
}

fn harness(dir: &std::path::Path, lease_timeout: Duration) -> (Harness, TestWorker) {
    let clock = FakeClock::new();
    let event_log = Arc::new(EventLogStore::open(dir.join("events")).unwrap());
    let result_store = Arc::new(ResultStore::new(FilesystemBackend::new(dir.join("results")), 16, 4096));
    let transient = Arc::new(TransientStore::new());
    let broker = Arc::new(LocalBroker::new(clock.clone(), Duration::from_millis(2_000)));
    let ids: Arc<dyn IdAllocator> = Arc::new(SequentialIds(AtomicU64::new(1)));
    let dispatcher = Arc::new(Dispatcher::new(event_log.clone(), result_store.clone(), broker.clone(), clock.clone(), ids.clone(), lease_timeout));
    let engine = Engine::new(event_log.clone(), result_store.clone(), transient, dispatcher.clone(), broker.clone(), clock.clone(), ids);

    let worker_config = WorkerRuntimeConfig {
        worker_id: WorkerId::from("worker_a"),
        pools: vec!["default".to_string()],
        lease_timeout,
        poll_interval: Duration::from_millis(50),
    };
    let worker = WorkerRuntime::new(dispatcher.clone(), broker.clone(), ToolRegistry::with_builtin_tools(), None, clock.clone(), worker_config);

    (Harness { engine, dispatcher, broker, event_log, result_store, clock }, worker)
}

/// A second worker sharing the same dispatcher/broker, under a distinct
/// `worker_id` — used by the crash-recovery scenario to stand in for
/// the replacement worker that picks up a lost lease.
fn second_worker(h: &Harness, worker_id: &str, lease_timeout: Duration) -> TestWorker {
    let config = WorkerRuntimeConfig {
        worker_id: WorkerId::from(worker_id),
        pools: vec!["default".to_string()],
        lease_timeout,
        poll_interval: Duration::from_millis(50),
    };
    WorkerRuntime::new(h.dispatcher.clone(), h.broker.clone(), ToolRegistry::with_builtin_tools(), None, h.clock.clone(), config)
}

fn register(engine: &TestEngine, steps: Vec<Step>) -> CatalogId {
    let catalog_id = CatalogId::new(1);
    engine.register_catalog(
        CatalogEntry { id: catalog_id, path: "wf".into(), version: "v1".into(), kind: CatalogKind::Playbook, content: json!({}), layout: None, created_at: 0 },
        steps,
    );
    catalog_id
}

fn shell_step(name: &str, command: &str) -> Step {
    Step {
        name: name.to_string(),
        tool: Tool::Shell { command: command.to_string(), env: HashMap::new() },
        inputs: HashMap::new(),
        next: Vec::new(),
        when: None,
        loop_spec: None,
        retry: None,
        sink: None,
        timeout_ms: None,
        pool: "default".to_string(),
        is_finally: false,
    }
}

/// Drive `dispatch_cycle`/`poll_once` in lockstep until the execution
/// reaches a terminal status or `max_ticks` is exhausted.
async fn run_until_terminal(h: &Harness, worker: &TestWorker, execution_id: ExecutionId, max_ticks: u32) -> ExecutionSummary {
    for _ in 0..max_ticks {
        h.engine.dispatch_cycle(execution_id).await.unwrap();
        worker.poll_once().await.unwrap();
        let summary = h.engine.get_execution(execution_id).unwrap();
        if summary.completed || summary.failed {
            return summary;
        }
    }
    h.engine.get_execution(execution_id).unwrap()
}

fn events_of(h: &Harness, execution_id: ExecutionId) -> Vec<noetl_core::event::StoredEvent> {
    h.engine.list_events(execution_id).unwrap()
}

// 1. Linear success: a -> b -> c, each a tool step returning {ok:true,n:k}.
#[tokio::test]
async fn linear_success_completes_every_step_in_order() {
    let dir = tempdir().unwrap();
    let (h, worker) = harness(dir.path(), Duration::from_millis(10_000));

    let mut a = shell_step("a", "echo '{\"ok\":true,\"n\":1}'");
    a.next = vec!["b".to_string()];
    let mut b = shell_step("b", "echo '{\"ok\":true,\"n\":2}'");
    b.next = vec!["c".to_string()];
    let c = shell_step("c", "echo '{\"ok\":true,\"n\":3}'");

    let catalog_id = register(&h.engine, vec![a, b, c]);
    let execution_id = h.engine.create_execution(catalog_id, json!({}), None).unwrap();

    let summary = run_until_terminal(&h, &worker, execution_id, 10).await;
    assert!(summary.completed, "execution should complete");
    assert!(!summary.failed);

    let events = events_of(&h, execution_id);
    let ordered_types: Vec<&str> = events.iter().map(|e| e.kind.type_name()).collect();

    assert_eq!(ordered_types.first(), Some(&"playbook.initialized"));
    assert_eq!(ordered_types.last(), Some(&"execution.completed"));
    assert!(ordered_types.contains(&"playbook.completed"));

    for (name, expected_n) in [("a", 1), ("b", 2), ("c", 3)] {
        let completed = events
            .iter()
            .find(|e| matches!(&e.kind, EventKind::StepCompleted { node_id, .. } if node_id.step_name() == name))
            .unwrap_or_else(|| panic!("missing step.completed for {name}"));
        match &completed.kind {
            EventKind::StepCompleted { result: Some(ResultValue::Inline(value)), .. } => {
                assert_eq!(value["ok"], Value::Bool(true));
                assert_eq!(value["n"], json!(expected_n));
            }
            other => panic!("expected inline step.completed for {name}, got {other:?}"),
        }
    }

    // step.started(a) must precede step.started(b) must precede step.started(c).
    let position = |name: &str| {
        events
            .iter()
            .position(|e| matches!(&e.kind, EventKind::StepStarted { node_id, .. } if node_id.step_name() == name))
            .unwrap()
    };
    assert!(position("a") < position("b"));
    assert!(position("b") < position("c"));
}

// 2. Conditional branch: a -> (b when workload.x > 10) else c.
#[tokio::test]
async fn conditional_branch_skips_the_false_branch_and_runs_the_other() {
    let dir = tempdir().unwrap();
    let (h, worker) = harness(dir.path(), Duration::from_millis(10_000));

    let mut a = shell_step("a", "echo '{\"ok\":true}'");
    a.next = vec!["b".to_string(), "c".to_string()];
    let mut b = shell_step("b", "echo '{\"branch\":\"high\"}'");
    b.when = Some(WhenCondition("{{ workload.x }} > 10".to_string()));
    let c = shell_step("c", "echo '{\"branch\":\"low\"}'");

    let catalog_id = register(&h.engine, vec![a, b, c]);
    let execution_id = h.engine.create_execution(catalog_id, json!({"x": 5}), None).unwrap();

    let summary = run_until_terminal(&h, &worker, execution_id, 10).await;
    assert!(summary.completed);

    let events = events_of(&h, execution_id);

    let case = events
        .iter()
        .find(|e| matches!(&e.kind, EventKind::CaseEvaluated { node_id, .. } if node_id.step_name() == "b"))
        .expect("case.evaluated for b");
    assert!(matches!(&case.kind, EventKind::CaseEvaluated { value, .. } if !*value));

    assert!(events.iter().any(|e| matches!(&e.kind, EventKind::StepSkipped { node_id, .. } if node_id.step_name() == "b")));
    assert!(events.iter().any(|e| matches!(&e.kind, EventKind::StepStarted { node_id, .. } if node_id.step_name() == "c")));
    assert!(events.iter().any(|e| matches!(&e.kind, EventKind::StepCompleted { node_id, .. } if node_id.step_name() == "c")));
    assert!(!events.iter().any(|e| matches!(&e.kind, EventKind::StepCompleted { node_id, .. } if node_id.step_name() == "b")));
}

// 3. Retry then succeed: step `t` fails twice (ToolExecutionError), then succeeds.
#[tokio::test]
async fn retry_then_succeed_exhausts_two_failures_before_completing() {
    let dir = tempdir().unwrap();
    let (h, worker) = harness(dir.path(), Duration::from_millis(10_000));
    let counter_path = dir.path().join("attempts.count");

    let policy = RetryPolicy {
        max_attempts: 3,
        retry_on: vec![RetryableError::ToolExecutionError],
        backoff: Backoff { base_ms: 10, cap_ms: 40 },
    };
    let command = format!(
        "n=$(cat {path} 2>/dev/null || echo 0); n=$((n+1)); echo $n > {path}; if [ $n -lt 3 ]; then exit 1; else echo '{{\"ok\":true,\"n\":'$n'}}'; fi",
        path = counter_path.display()
    );
    let mut t = shell_step("t", &command);
    t.retry = Some(policy);

    let catalog_id = register(&h.engine, vec![t]);
    let execution_id = h.engine.create_execution(catalog_id, json!({}), None).unwrap();

    // Drive ticks, advancing the clock past the (jittered, capped-at-40ms)
    // backoff window between each to let the retry become ready.
    let mut summary = ExecutionSummary { execution_id, completed: false, failed: false, cancelled: false };
    for _ in 0..10 {
        h.engine.dispatch_cycle(execution_id).await.unwrap();
        worker.poll_once().await.unwrap();
        summary = h.engine.get_execution(execution_id).unwrap();
        if summary.completed || summary.failed {
            break;
        }
        h.clock.advance(Duration::from_millis(200));
    }

    assert!(summary.completed, "execution should eventually complete once the retry budget succeeds");
    assert!(!summary.failed);

    let events = events_of(&h, execution_id);
    let started: Vec<u32> = events
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::StepStarted { node_id, attempt, .. } if node_id.step_name() == "t" => Some(*attempt),
            _ => None,
        })
        .collect();
    assert_eq!(started, vec![1, 2, 3]);

    let failed: Vec<u32> = events
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::StepFailed { node_id, attempt, .. } if node_id.step_name() == "t" => Some(*attempt),
            _ => None,
        })
        .collect();
    assert_eq!(failed, vec![1, 2]);

    let completed = events.iter().filter(|e| matches!(&e.kind, EventKind::StepCompleted { node_id, .. } if node_id.step_name() == "t")).count();
    assert_eq!(completed, 1, "exactly one step.completed for t, at attempt 3");
}

// 4. Async loop with sink: three cities, concurrency=2, each iteration sinks.
#[tokio::test]
async fn async_loop_with_sink_closes_a_three_part_manifest() {
    let dir = tempdir().unwrap();
    let (h, worker) = harness(dir.path(), Duration::from_millis(10_000));

    let mut fetch = shell_step("fetch", "echo {{ city }}");
    fetch.inputs.insert("city".to_string(), json!("{{ city }}"));
    fetch.loop_spec = Some(LoopSpec {
        collection: json!(["london", "paris", "berlin"]),
        element_var: "city".to_string(),
        mode: LoopMode::Async,
        concurrency: 2,
        strategy: Default::default(),
        merge_path: None,
        sink: None,
    });
    fetch.sink = Some(SinkSpec { tool: Box::new(Tool::Shell { command: "cat".to_string(), env: HashMap::new() }) });

    let catalog_id = register(&h.engine, vec![fetch]);
    let execution_id = h.engine.create_execution(catalog_id, json!({}), None).unwrap();

    let summary = run_until_terminal(&h, &worker, execution_id, 20).await;
    assert!(summary.completed, "execution should complete once every iteration and its sink report in");

    let events = events_of(&h, execution_id);

    let loop_started = events.iter().find(|e| matches!(&e.kind, EventKind::LoopStarted { .. })).expect("loop.started");
    assert!(matches!(&loop_started.kind, EventKind::LoopStarted { collection_size, .. } if *collection_size == 3));

    let iteration_starts = events.iter().filter(|e| matches!(&e.kind, EventKind::StepStarted { loop_name: Some(n), .. } if n == "fetch")).count();
    assert_eq!(iteration_starts, 3);

    let sink_completed: Vec<_> = events.iter().filter(|e| matches!(&e.kind, EventKind::SinkCompleted { .. })).collect();
    assert_eq!(sink_completed.len(), 3, "one sink.completed per iteration");
    for event in &sink_completed {
        assert!(matches!(&event.kind, EventKind::SinkCompleted { summary, .. } if summary.rows_affected == 1));
    }

    let loop_completed = events.iter().find(|e| matches!(&e.kind, EventKind::LoopCompleted { .. })).expect("loop.completed");
    let EventKind::LoopCompleted { result: ResultValue::Ref { reference }, .. } = &loop_completed.kind else {
        panic!("loop.completed must carry a manifest ref");
    };
    let manifest_id: u64 = reference.rsplit('/').next().unwrap().parse().unwrap();
    let parts = h.result_store.stream(ResultId::new(manifest_id)).unwrap();
    assert_eq!(parts.len(), 3, "manifest must resolve to exactly three parts");

    let expected = ["london", "paris", "berlin"];
    for (index, part) in parts.iter().enumerate() {
        let value = h.result_store.resolve(&Value::String(part.uri())).unwrap();
        assert_eq!(value, json!(expected[index]));
    }
}

// 5. Worker crash recovery: a heartbeat is sent, the lease still expires
// (the worker never calls back in), and a different worker completes the retry.
#[tokio::test]
async fn worker_crash_recovery_retries_on_a_different_worker_after_lease_expiry() {
    let dir = tempdir().unwrap();
    let lease_timeout = Duration::from_millis(10_000);
    let (h, _worker_a) = harness(dir.path(), lease_timeout);
    let worker_b = second_worker(&h, "worker_b", lease_timeout);

    let policy = RetryPolicy {
        max_attempts: 2,
        retry_on: vec![RetryableError::TaskTimeout],
        backoff: Backoff { base_ms: 10, cap_ms: 1_000 },
    };
    let mut t = shell_step("t", "echo '{\"ok\":true}'");
    t.retry = Some(policy);

    let catalog_id = register(&h.engine, vec![t]);
    let execution_id = h.engine.create_execution(catalog_id, json!({}), None).unwrap();

    // Attempt 1 is dispatched; the (crashing) worker never fetches or
    // executes it, but does manage one heartbeat before going dark.
    h.engine.dispatch_cycle(execution_id).await.unwrap();
    h.clock.advance(Duration::from_millis(3_000));
    let key = TaskKey { execution_id, node_id: noetl_core::event::NodeId::for_attempt("t", 1) };
    h.dispatcher.heartbeat(WorkerId::from("worker_a"), &[key]);

    // The heartbeat only bought another `lease_timeout`; crossing that
    // without a second heartbeat or a terminal event ages the lease out.
    h.clock.advance(lease_timeout + Duration::from_millis(1_000));
    h.engine.dispatch_cycle(execution_id).await.unwrap();

    let events = events_of(&h, execution_id);
    assert!(events.iter().any(|e| matches!(&e.kind, EventKind::StepLost { node_id, .. } if node_id.step_name() == "t")));
    assert!(events.iter().any(|e| matches!(&e.kind, EventKind::StepFailed { node_id, error, .. } if node_id.step_name() == "t" && error.kind == "TaskTimeout")));

    // The retry becomes ready once its backoff elapses; worker_b picks it up.
    h.clock.advance(Duration::from_millis(1_500));
    h.engine.dispatch_cycle(execution_id).await.unwrap();
    worker_b.poll_once().await.unwrap();
    h.engine.dispatch_cycle(execution_id).await.unwrap();

    let summary = h.engine.get_execution(execution_id).unwrap();
    assert!(summary.completed, "the retried attempt must eventually complete");

    let events = events_of(&h, execution_id);
    let completed = events
        .iter()
        .find(|e| matches!(&e.kind, EventKind::StepCompleted { node_id, .. } if node_id.step_name() == "t"))
        .expect("step.completed for t");
    assert!(matches!(&completed.kind, EventKind::StepCompleted { worker_id: Some(w), .. } if w.as_str() == "worker_b"));
}

// 6. Payload overflow: a 2 MiB JSON document is stored out-of-band and
// resolves back byte-for-byte, with the event carrying only a `$ref`.
#[tokio::test]
async fn payload_overflow_stores_out_of_band_and_resolves_byte_for_byte() {
    let dir = tempdir().unwrap();
    let (h, worker) = harness(dir.path(), Duration::from_millis(10_000));

    // A 2 MiB string value wrapped in a small JSON envelope, built with
    // `awk` so the test has no dependency on an interpreter beyond `sh`.
    const PAYLOAD_BYTES: usize = 2 * 1024 * 1024;
    let command = format!(
        "awk 'BEGIN{{printf \"{{\\\"data\\\":\\\"\"; for (i = 0; i < {PAYLOAD_BYTES}; i++) printf \"a\"; printf \"\\\"}}\"}}'"
    );
    let big = shell_step("big", &command);

    let catalog_id = register(&h.engine, vec![big]);
    let execution_id = h.engine.create_execution(catalog_id, json!({}), None).unwrap();

    let summary = run_until_terminal(&h, &worker, execution_id, 10).await;
    assert!(summary.completed);

    let events = events_of(&h, execution_id);
    let completed = events
        .iter()
        .find(|e| matches!(&e.kind, EventKind::StepCompleted { node_id, .. } if node_id.step_name() == "big"))
        .expect("step.completed for big");

    let reference = match &completed.kind {
        EventKind::StepCompleted { result: Some(ResultValue::Ref { reference }), .. } => reference.clone(),
        other => panic!("a 2 MiB result must be carried by reference, got {other:?}"),
    };
    assert!(reference.starts_with("noetl://"));

    let resolved = h.result_store.resolve(&Value::String(reference)).unwrap();
    let data = resolved["data"].as_str().expect("resolved payload must have a data field");
    assert_eq!(data.len(), PAYLOAD_BYTES);
    assert!(data.bytes().all(|b| b == b'a'));
}
