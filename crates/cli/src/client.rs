// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A thin client over the daemon's Unix-socket wire protocol: send a
//! request, match the expected `Response` variant, reject otherwise.

use std::path::{Path, PathBuf};
use std::time::Duration;

use noetl_wire::{decode, encode, read_message, write_message, ProtocolError, Request, Response};
use tokio::net::UnixStream;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to connect to the daemon at {path}: {source}")]
    Connect { path: PathBuf, source: std::io::Error },
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("daemon returned an unexpected response: {0:?}")]
    UnexpectedResponse(Response),
    #[error("{kind}: {message}")]
    DaemonError { kind: String, message: String },
    #[error("could not locate the noetld binary; set NOETL_DAEMON_BIN or put it on PATH")]
    BinaryNotFound,
    #[error("failed to start the daemon: {0}")]
    SpawnFailed(std::io::Error),
    #[error("timed out waiting for the daemon to start")]
    StartTimeout,
}

/// A connected client. One request in flight at a time, matching the
/// daemon's own per-connection handling (one handler loop per accepted
/// connection, read-then-write in lockstep).
pub struct DaemonClient {
    stream: UnixStream,
    timeout: Duration,
}

impl DaemonClient {
    pub async fn connect(socket_path: &Path) -> Result<Self, ClientError> {
        let stream = UnixStream::connect(socket_path)
            .await
            .map_err(|source| ClientError::Connect { path: socket_path.to_path_buf(), source })?;
        Ok(Self { stream, timeout: ipc_timeout() })
    }

    /// Connect, spawning the daemon as a detached background process
    /// and retrying briefly if nothing is listening yet.
    pub async fn connect_or_start(socket_path: &Path) -> Result<Self, ClientError> {
        if let Ok(client) = Self::connect(socket_path).await {
            return Ok(client);
        }
        spawn_daemon()?;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if let Ok(client) = Self::connect(socket_path).await {
                return Ok(client);
            }
        }
        Err(ClientError::StartTimeout)
    }

    /// Send `request` and return the daemon's `Response`, translating a
    /// bare `Response::Error` into `Err(ClientError::DaemonError)` so
    /// callers only need to match the variant they expect.
    pub async fn send(&mut self, request: &Request) -> Result<Response, ClientError> {
        let payload = encode(request)?;
        write_message(&mut self.stream, &payload).await?;
        let bytes =
            tokio::time::timeout(self.timeout, read_message(&mut self.stream)).await.map_err(|_| ProtocolError::Timeout)??;
        let response: Response = decode(&bytes)?;
        match response {
            Response::Error { kind, message } => Err(ClientError::DaemonError { kind, message }),
            other => Ok(other),
        }
    }

    /// Helper for the common "matched the wrong `Response` variant"
    /// branch in command implementations.
    pub fn reject<T>(response: Response) -> Result<T, ClientError> {
        Err(ClientError::UnexpectedResponse(response))
    }
}

fn ipc_timeout() -> Duration {
    std::env::var("NOETL_IPC_TIMEOUT_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or_else(|| Duration::from_millis(5_000))
}

/// Locate the `noetld` binary to spawn: `NOETL_DAEMON_BIN`, then a
/// sibling of this CLI's own executable (the layout `cargo build`
/// produces, with both binaries in the same `target/<profile>`
/// directory), then a bare `"noetld"` left for `PATH` lookup.
pub(crate) fn find_noetld_binary() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("NOETL_DAEMON_BIN") {
        return Some(PathBuf::from(path));
    }
    if let Ok(current_exe) = std::env::current_exe() {
        let candidate = current_exe.with_file_name(format!("noetld{}", std::env::consts::EXE_SUFFIX));
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    Some(PathBuf::from("noetld"))
}

pub(crate) fn spawn_daemon() -> Result<(), ClientError> {
    let binary = find_noetld_binary().ok_or(ClientError::BinaryNotFound)?;
    std::process::Command::new(binary)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .map_err(ClientError::SpawnFailed)?;
    Ok(())
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
