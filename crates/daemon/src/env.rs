// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment-driven configuration: one function per setting,
//! `NOETL_`-prefixed, each with the default a standalone run needs.

use std::path::PathBuf;
use std::time::Duration;

/// Wire protocol version exchanged on `Hello`.
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    #[error("could not determine a state directory; set NOETL_STATE_DIR")]
    NoStateDir,
}

/// Root directory for all durable daemon state: the event log, result
/// store, broker K/V snapshots are not persisted independently, and the
/// single-instance lock file. `NOETL_STATE_DIR` overrides the XDG state
/// directory (`~/.local/state/noetl` on Linux).
pub fn state_dir() -> Result<PathBuf, EnvError> {
    if let Ok(dir) = std::env::var("NOETL_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::state_dir()
        .or_else(dirs::home_dir)
        .map(|dir| dir.join("noetl"))
        .ok_or(EnvError::NoStateDir)
}

pub fn socket_path(state_dir: &std::path::Path) -> PathBuf {
    state_dir.join("noetld.sock")
}

pub fn lock_path(state_dir: &std::path::Path) -> PathBuf {
    state_dir.join("noetld.lock")
}

pub fn events_dir(state_dir: &std::path::Path) -> PathBuf {
    state_dir.join("events")
}

pub fn results_dir(state_dir: &std::path::Path) -> PathBuf {
    state_dir.join("results")
}

/// Directory scanned at startup for pre-normalized catalog and schedule
/// descriptors (see [`crate::catalog`]) — the DSL parser that would
/// otherwise populate the catalog is out of scope, so a deployment
/// drops already-normalized JSON here instead.
pub fn catalog_dir(state_dir: &std::path::Path) -> PathBuf {
    std::env::var("NOETL_CATALOG_DIR").map(PathBuf::from).unwrap_or_else(|_| state_dir.join("catalog"))
}

pub fn log_path(state_dir: &std::path::Path) -> PathBuf {
    state_dir.join("daemon.log")
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

pub fn ipc_timeout() -> Duration {
    Duration::from_millis(env_u64("NOETL_IPC_TIMEOUT_MS", 5_000))
}

pub fn lease_timeout() -> Duration {
    Duration::from_millis(env_u64("NOETL_LEASE_TIMEOUT_MS", 30_000))
}

pub fn dispatch_interval() -> Duration {
    Duration::from_millis(env_u64("NOETL_DISPATCH_INTERVAL_MS", 250))
}

pub fn scheduler_interval() -> Duration {
    Duration::from_millis(env_u64("NOETL_SCHEDULER_INTERVAL_MS", 1_000))
}

pub fn worker_poll_interval() -> Duration {
    Duration::from_millis(env_u64("NOETL_WORKER_POLL_MS", 200))
}

pub fn broker_redelivery_timeout() -> Duration {
    Duration::from_millis(env_u64("NOETL_BROKER_REDELIVERY_MS", 30_000))
}

pub fn result_inline_threshold() -> u64 {
    env_u64("NOETL_RESULT_INLINE_BYTES", 4 * 1024)
}

pub fn result_kv_threshold() -> u64 {
    env_u64("NOETL_RESULT_KV_BYTES", 16 * 1024)
}

/// Shard id for the Snowflake allocator — distinct shards must be used
/// if more than one daemon process ever shares a broker, which a
/// single-process deployment never needs to think about.
pub fn shard_id() -> u16 {
    env_u64("NOETL_SHARD_ID", 0) as u16
}

/// Whether the daemon runs an in-process worker against the `default`
/// pool, so a fresh deployment can run an end-to-end execution without
/// standing up a separate worker process first.
pub fn inline_worker_enabled() -> bool {
    std::env::var("NOETL_INLINE_WORKER").map(|v| v != "0" && v.to_lowercase() != "false").unwrap_or(true)
}

pub fn inline_worker_pools() -> Vec<String> {
    std::env::var("NOETL_WORKER_POOLS")
        .ok()
        .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_else(|| vec!["default".to_string()])
}

/// TCP listener port, if a deployment wants a non-local control plane
/// surface alongside the Unix socket. Unset by default — the Unix
/// socket alone is sufficient for a single-host deployment.
pub fn tcp_port() -> Option<u16> {
    std::env::var("NOETL_TCP_PORT").ok().and_then(|v| v.parse().ok())
}

/// Required on `Hello` for TCP connections only; the Unix socket's
/// filesystem permissions are its own access control.
pub fn auth_token() -> Option<String> {
    std::env::var("NOETL_AUTH_TOKEN").ok()
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
