// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup, recovery, and shutdown: acquire a single-instance
//! lock before touching anything else, create directories, replay
//! durable state, bind the socket last. The guard writes a PID file
//! and probes liveness with a no-op signal send
//! (`nix::sys::signal::kill` with `None`), matching how `ps`/`kill -0`
//! detect a stale PID without sending a real signal (see DESIGN.md for
//! why this replaces an advisory file lock).

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use nix::sys::signal::kill;
use nix::unistd::Pid;
use noetl_core::clock::{Clock, SystemClock};
use noetl_core::event::EventKind;
use noetl_core::id::{ExecutionId, IdAllocator};
use noetl_storage::MaterializedState;
use tokio::net::UnixListener;
use tracing::{info, warn};

use crate::env::{self, EnvError};
use crate::wiring::App;

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Env(#[from] EnvError),
    #[error("another noetld instance is already running (pid in {0})")]
    AlreadyRunning(PathBuf),
    #[error("failed to bind control socket at {path}: {source}")]
    Bind { path: PathBuf, #[source] source: std::io::Error },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Wal(#[from] noetl_storage::wal::WalError),
    #[error(transparent)]
    Catalog(#[from] crate::catalog::CatalogLoadError),
    #[error(transparent)]
    Engine(#[from] noetl_engine::EngineError),
}

/// Resolved filesystem layout for one daemon process.
#[derive(Debug, Clone)]
pub struct Config {
    pub state_dir: PathBuf,
    pub socket_path: PathBuf,
    pub lock_path: PathBuf,
    pub catalog_dir: PathBuf,
    pub log_path: PathBuf,
}

impl Config {
    pub fn resolve() -> Result<Self, EnvError> {
        let state_dir = env::state_dir()?;
        Ok(Self {
            socket_path: env::socket_path(&state_dir),
            lock_path: env::lock_path(&state_dir),
            catalog_dir: env::catalog_dir(&state_dir),
            log_path: env::log_path(&state_dir),
            state_dir,
        })
    }
}

/// Holds the lock file open for the process's lifetime; removes the
/// lock and socket files on an orderly shutdown. A crash leaves the
/// lock file behind with a now-dead pid inside, which the next startup
/// detects and reclaims via [`acquire_lock`].
pub struct LockGuard {
    lock_path: PathBuf,
    socket_path: PathBuf,
    _file: std::fs::File,
}

impl LockGuard {
    pub fn release(self) {
        let _ = std::fs::remove_file(&self.lock_path);
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

fn pid_is_alive(pid: i32) -> bool {
    kill(Pid::from_raw(pid), None).is_ok()
}

/// Acquire the single-instance lock, reclaiming a stale one left behind
/// by a process that is no longer alive.
fn acquire_lock(lock_path: &std::path::Path, socket_path: &std::path::Path) -> Result<LockGuard, LifecycleError> {
    if let Ok(existing) = std::fs::read_to_string(lock_path) {
        if let Some(pid) = existing.trim().parse::<i32>().ok().filter(|pid| pid_is_alive(*pid)) {
            let _ = pid;
            return Err(LifecycleError::AlreadyRunning(lock_path.to_path_buf()));
        }
        warn!(path = %lock_path.display(), "reclaiming lock file from a dead process");
    }
    let mut file = std::fs::OpenOptions::new().write(true).create(true).truncate(true).open(lock_path)?;
    writeln!(file, "{}", std::process::id())?;
    file.flush()?;
    Ok(LockGuard { lock_path: lock_path.to_path_buf(), socket_path: socket_path.to_path_buf(), _file: file })
}

pub struct StartupResult {
    pub app: Arc<App>,
    pub listener: UnixListener,
    pub lock: LockGuard,
}

/// Bring up one daemon process: lock, directories, storage, catalog,
/// in-flight execution recovery, then bind the socket.
pub async fn startup(config: &Config) -> Result<StartupResult, LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;
    let lock = acquire_lock(&config.lock_path, &config.socket_path)?;

    let app = match run_startup(config).await {
        Ok(app) => app,
        Err(error) => {
            lock.release();
            return Err(error);
        }
    };

    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let listener = match UnixListener::bind(&config.socket_path) {
        Ok(listener) => listener,
        Err(source) => {
            lock.release();
            return Err(LifecycleError::Bind { path: config.socket_path.clone(), source });
        }
    };

    info!(socket = %config.socket_path.display(), "noetld ready");
    Ok(StartupResult { app: Arc::new(app), listener, lock })
}

async fn run_startup(config: &Config) -> Result<App, LifecycleError> {
    let app = App::build(&config.state_dir)?;

    let loaded =
        crate::catalog::load_catalog_dir(&config.catalog_dir, &app.engine, app.id_allocator.as_ref(), SystemClock.epoch_ms())?;
    info!(count = loaded, "catalog entries loaded");
    let scheduled = crate::catalog::load_schedules(&config.catalog_dir, &app.scheduler, app.id_allocator.as_ref()).await?;
    info!(count = scheduled, "schedules registered");

    recover_in_flight_executions(&app).await?;

    Ok(app)
}

/// Rediscover executions that were still in flight when the process
/// last stopped, via `EventLogStore::known_execution_ids` — the WAL is
/// the only durable source of truth, since nothing else persists the
/// engine's in-memory execution registry across a restart.
async fn recover_in_flight_executions(app: &App) -> Result<(), LifecycleError> {
    let mut recovered = 0;
    for execution_id in app.event_log.known_execution_ids()? {
        let events = app.event_log.read(execution_id, None, None)?;
        let state = MaterializedState::rebuild(&events);
        let Some(execution_state) = state.execution(execution_id) else { continue };
        if execution_state.completed || execution_state.failed || execution_state.cancelled {
            continue;
        }
        let Some(first) = events.first() else { continue };
        let EventKind::PlaybookInitialized { catalog_id, workload, .. } = &first.kind else {
            warn!(execution_id = %execution_id.as_u64(), "in-flight execution's first event was not playbook.initialized, skipping recovery");
            continue;
        };
        app.engine.recover_execution(execution_id, *catalog_id, workload.clone(), first.parent_execution_id, first.created_at)?;
        app.track_execution(execution_id);
        recovered += 1;
    }
    if recovered > 0 {
        info!(count = recovered, "recovered in-flight executions from the event log");
    }
    Ok(())
}

/// Drive `execution_id` through `dispatch_cycle` once, logging but not
/// propagating failure — a single bad cycle should not bring down the
/// ticker for every other execution.
pub async fn dispatch_once(app: &App, execution_id: ExecutionId) {
    if let Err(error) = app.engine.dispatch_cycle(execution_id).await {
        warn!(execution_id = %execution_id.as_u64(), %error, "dispatch cycle failed");
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
