// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;
use tempfile::tempdir;

#[test]
#[serial]
fn resolve_honors_noetl_state_dir() {
    let dir = tempdir().unwrap();
    std::env::set_var("NOETL_STATE_DIR", dir.path());
    let config = Config::resolve().unwrap();
    std::env::remove_var("NOETL_STATE_DIR");
    assert_eq!(config.state_dir, dir.path());
    assert_eq!(config.socket_path, dir.path().join("noetld.sock"));
}

#[test]
fn fresh_lock_file_carries_this_process_pid() {
    let dir = tempdir().unwrap();
    let lock_path = dir.path().join("noetld.lock");
    let socket_path = dir.path().join("noetld.sock");
    let guard = acquire_lock(&lock_path, &socket_path).unwrap();
    let contents = std::fs::read_to_string(&lock_path).unwrap();
    assert_eq!(contents.trim().parse::<u32>().unwrap(), std::process::id());
    guard.release();
    assert!(!lock_path.exists());
}

#[test]
fn stale_lock_from_a_dead_pid_is_reclaimed() {
    let dir = tempdir().unwrap();
    let lock_path = dir.path().join("noetld.lock");
    let socket_path = dir.path().join("noetld.sock");
    // PID 1 is always alive under any container/init; a PID this large is
    // virtually guaranteed to be unallocated, simulating a dead process.
    std::fs::write(&lock_path, "2147483000\n").unwrap();
    let guard = acquire_lock(&lock_path, &socket_path).unwrap();
    let contents = std::fs::read_to_string(&lock_path).unwrap();
    assert_eq!(contents.trim().parse::<u32>().unwrap(), std::process::id());
    guard.release();
}

#[test]
fn live_pid_refuses_a_second_lock() {
    let dir = tempdir().unwrap();
    let lock_path = dir.path().join("noetld.lock");
    let socket_path = dir.path().join("noetld.sock");
    std::fs::write(&lock_path, format!("{}\n", std::process::id())).unwrap();
    let result = acquire_lock(&lock_path, &socket_path);
    assert!(matches!(result, Err(LifecycleError::AlreadyRunning(_))));
}
