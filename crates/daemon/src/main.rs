// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `noetld`: the control-plane daemon. Owns the event log, result
//! store, broker, engine, dispatcher, and scheduler for one NoETL
//! deployment, and exposes them over a Unix-socket wire protocol.

use std::sync::Arc;

use noetld::lifecycle::{self, Config};
use noetld::listener;
use noetld::wiring::App;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing(log_path: &std::path::Path) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let parent = log_path.parent().unwrap_or_else(|| std::path::Path::new("."));
    if std::fs::create_dir_all(parent).is_err() {
        tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();
        return None;
    }
    let file_appender = tracing_appender::rolling::never(
        parent,
        log_path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("daemon.log")),
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("noetld=info".parse().unwrap_or_default()))
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();
    Some(guard)
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let config = match Config::resolve() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("noetld: {error}");
            return std::process::ExitCode::FAILURE;
        }
    };

    let _tracing_guard = init_tracing(&config.log_path);
    info!(version = env!("CARGO_PKG_VERSION"), "starting noetld");

    let startup = match lifecycle::startup(&config).await {
        Ok(startup) => startup,
        Err(error) => {
            error!(%error, "startup failed");
            return std::process::ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    let app = startup.app;

    let listener_task = tokio::spawn(listener::serve(startup.listener, Arc::clone(&app), cancel.clone()));
    let dispatch_task = tokio::spawn(run_dispatch_ticker(Arc::clone(&app), cancel.clone()));
    let scheduler_task = tokio::spawn(run_scheduler_ticker(Arc::clone(&app), cancel.clone()));
    let worker_task = app.worker_runtime.clone().map(|runtime| {
        let cancel = cancel.clone();
        tokio::spawn(async move { runtime.run(cancel).await })
    });

    wait_for_shutdown_signal().await;
    info!("shutdown signal received");
    cancel.cancel();

    let _ = listener_task.await;
    let _ = dispatch_task.await;
    let _ = scheduler_task.await;
    if let Some(worker_task) = worker_task {
        let _ = worker_task.await;
    }

    startup.lock.release();
    info!("noetld stopped");
    std::process::ExitCode::SUCCESS
}

/// Every active execution gets a `dispatch_cycle` tick on a fixed
/// interval — the mechanism that actually advances executions besides
/// the synchronous kick a `CreateExecution`/`EmitEvent` request already
/// gives its own execution, so lease expiry and loop reconciliation
/// keep moving even with no inbound traffic.
async fn run_dispatch_ticker(app: Arc<App>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(noetld::env::dispatch_interval());
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let execution_ids: Vec<_> = app.active_executions.lock().iter().copied().collect();
                for execution_id in execution_ids {
                    lifecycle::dispatch_once(&app, execution_id).await;
                }
                app.prune_terminal_executions();
            }
        }
    }
}

/// Tick the scheduler on its own interval, feeding every execution it
/// starts into the daemon's active-execution tracking set so the
/// dispatch ticker picks it up.
async fn run_scheduler_ticker(app: Arc<App>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(noetld::env::scheduler_interval());
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                match app.scheduler.tick().await {
                    Ok(started) => {
                        for execution_id in started {
                            app.track_execution(execution_id);
                        }
                    }
                    Err(error) => tracing::warn!(%error, "scheduler tick failed"),
                }
            }
        }
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sig) => sig,
        Err(_) => return,
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
