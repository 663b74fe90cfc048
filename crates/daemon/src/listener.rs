// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Unix-socket listener: one task per connection, each reading and
//! answering `noetl-wire` frames in a loop until the peer disconnects.

use std::sync::Arc;

use noetl_core::event::EventKind;
use noetl_core::id::{ExecutionId, RuntimeId};
use noetl_dispatcher::lease::TaskKey;
use noetl_wire::{ExecutionStatus, ExecutionSummary, ProtocolError, Query, Request, Response};
use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::UnixStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::env;
use crate::wiring::App;

/// Accept connections until `cancel` fires, spawning one handler task
/// per connection.
pub async fn serve(listener: tokio::net::UnixListener, app: Arc<App>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("listener shutting down");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let app = Arc::clone(&app);
                        let cancel = cancel.clone();
                        tokio::spawn(async move { handle_connection(stream, app, cancel).await });
                    }
                    Err(error) => warn!(%error, "failed to accept connection"),
                }
            }
        }
    }
}

async fn handle_connection(stream: UnixStream, app: Arc<App>, cancel: CancellationToken) {
    let (mut reader, mut writer): (ReadHalf<UnixStream>, WriteHalf<UnixStream>) = tokio::io::split(stream);
    let timeout = env::ipc_timeout();
    loop {
        let request = tokio::select! {
            _ = cancel.cancelled() => break,
            request = noetl_wire::read_request(&mut reader, timeout) => request,
        };
        let request = match request {
            Ok(request) => request,
            Err(ProtocolError::ConnectionClosed) => break,
            Err(error) => {
                debug!(%error, "failed to read request");
                break;
            }
        };

        let is_shutdown = matches!(request, Request::Shutdown);
        let response = handle_request(&app, request).await;
        if noetl_wire::write_response(&mut writer, &response, timeout).await.is_err() {
            break;
        }
        if is_shutdown {
            break;
        }
    }
}

async fn handle_request(app: &App, request: Request) -> Response {
    match request {
        Request::Ping => Response::Pong,
        Request::Hello { version: _, token } => {
            if env::tcp_port().is_some() && env::auth_token().is_some() && token != env::auth_token() {
                return Response::Error { kind: "Unauthorized".to_string(), message: "invalid or missing auth token".to_string() };
            }
            Response::Hello { version: env::PROTOCOL_VERSION.to_string() }
        }
        Request::Status => Response::Status {
            uptime_secs: app.start_time.elapsed().as_secs(),
            executions_active: app.active_executions.lock().len(),
        },
        Request::Shutdown => Response::ShuttingDown,

        Request::Query { query } => handle_query(app, query),

        Request::CreateExecution { catalog_id, workload, parent_execution_id } => {
            match app.engine.create_execution(catalog_id, workload, parent_execution_id) {
                Ok(execution_id) => {
                    app.track_execution(execution_id);
                    crate::lifecycle::dispatch_once(app, execution_id).await;
                    Response::ExecutionStarted { execution_id }
                }
                Err(error) => error_response(&error),
            }
        }

        Request::EmitEvent { execution_id, parent_event_id, event } => {
            match app.dispatcher.emit_event(execution_id, parent_event_id, event) {
                Ok(event_id) => {
                    crate::lifecycle::dispatch_once(app, execution_id).await;
                    Response::EventEmitted { event_id }
                }
                Err(error) => Response::Error { kind: "DispatcherError".to_string(), message: error.to_string() },
            }
        }

        Request::Heartbeat { worker_id, execution_id, node_ids } => {
            let keys: Vec<TaskKey> = node_ids.into_iter().map(|node_id| TaskKey { execution_id, node_id }).collect();
            app.dispatcher.heartbeat(worker_id, &keys);
            Response::HeartbeatAck
        }

        Request::PutResult { execution_id, name, scope, payload, hints } => {
            match app.dispatcher.put_result(execution_id, name, scope, payload, hints) {
                Ok(reference) => Response::ResultPut { reference },
                Err(error) => Response::Error { kind: "DispatcherError".to_string(), message: error.to_string() },
            }
        }

        Request::CancelExecution { execution_id, reason } => match app.engine.cancel_execution(execution_id, reason) {
            Ok(()) => {
                crate::lifecycle::dispatch_once(app, execution_id).await;
                Response::Cancelled
            }
            Err(error) => error_response(&error),
        },

        Request::RegisterRuntime { pools } => {
            let registration = app.engine.register_runtime(RuntimeId::new(), pools);
            Response::RuntimeRegistered {
                runtime_id: registration.runtime_id,
                pools: registration.pools,
                registered_at: registration.registered_at,
            }
        }
    }
}

fn handle_query(app: &App, query: Query) -> Response {
    match query {
        Query::GetExecution { execution_id } => match app.engine.get_execution(execution_id) {
            Ok(summary) => Response::Execution { summary: wire_execution_summary(app, execution_id, summary) },
            Err(error) => error_response(&error),
        },
        Query::ListEvents { execution_id, from_event_id, limit } => {
            match app.event_log.read(execution_id, from_event_id, Some(limit)) {
                Ok(events) => Response::Events { events },
                Err(error) => Response::Error { kind: "WalError".to_string(), message: error.to_string() },
            }
        }
        Query::GetTask { execution_id, node_id } => match app.dispatcher.get_task(execution_id, node_id) {
            Ok(task) => Response::Task { task },
            Err(error) => Response::Error { kind: "DispatcherError".to_string(), message: error.to_string() },
        },
        Query::ResolveCatalog { path, version } => match app.engine.resolve_catalog(&path, version.as_deref()) {
            Some(catalog_id) => Response::CatalogResolved { catalog_id },
            None => Response::Error { kind: "UnknownCatalog".to_string(), message: format!("no catalog entry at path {path:?}") },
        },
    }
}

fn error_response(error: &noetl_engine::EngineError) -> Response {
    Response::Error { kind: engine_error_kind(error).to_string(), message: error.to_string() }
}

fn engine_error_kind(error: &noetl_engine::EngineError) -> &'static str {
    use noetl_engine::EngineError;
    match error {
        EngineError::UnknownExecution(_) => "UnknownExecution",
        EngineError::UnknownCatalog(_) => "UnknownCatalog",
        EngineError::UnknownStep(_) => "UnknownStep",
        EngineError::UnknownLoop(_) => "UnknownLoop",
        EngineError::Wal(_) => "WalError",
        EngineError::ResultStore(_) => "ResultStoreError",
        EngineError::Dispatcher(_) => "DispatcherError",
        EngineError::Loop(_) => "LoopError",
        EngineError::Template(_) => "TemplateError",
        EngineError::Broker(_) => "BrokerError",
    }
}

/// The wire layer's `ExecutionSummary` carries `started_at`/`ended_at`/
/// `error`/`last_event_id`, which the engine's own (identically named)
/// summary does not track — derived here from the raw event stream
/// rather than added to the engine's projection, since nothing inside
/// the engine needs them.
fn wire_execution_summary(app: &App, execution_id: ExecutionId, summary: noetl_engine::ExecutionSummary) -> ExecutionSummary {
    let events = app.event_log.read(execution_id, None, None).unwrap_or_default();
    let started_at = events.first().map(|e| e.created_at).unwrap_or(0);
    let last = events.last();
    let last_event_id = last.map(|e| e.event_id);
    let status = if summary.cancelled {
        ExecutionStatus::Cancelled
    } else if summary.failed {
        ExecutionStatus::Failed
    } else if summary.completed {
        ExecutionStatus::Completed
    } else {
        ExecutionStatus::Running
    };
    let ended_at = (status != ExecutionStatus::Running).then(|| last.map(|e| e.created_at)).flatten();
    let error = events.iter().rev().find_map(|e| match &e.kind {
        EventKind::ExecutionFailed { error, .. } => Some(error.clone()),
        EventKind::PlaybookFailed { error } => Some(error.clone()),
        _ => None,
    });
    ExecutionSummary { execution_id, status, started_at, ended_at, error, last_event_id }
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
