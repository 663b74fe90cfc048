// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;

#[test]
#[serial]
fn state_dir_honors_the_override() {
    std::env::set_var("NOETL_STATE_DIR", "/tmp/noetl-cli-paths-test");
    assert_eq!(state_dir().unwrap(), PathBuf::from("/tmp/noetl-cli-paths-test"));
    std::env::remove_var("NOETL_STATE_DIR");
}

#[test]
#[serial]
fn socket_path_lives_under_the_state_dir() {
    std::env::set_var("NOETL_STATE_DIR", "/tmp/noetl-cli-paths-test");
    assert_eq!(socket_path().unwrap(), PathBuf::from("/tmp/noetl-cli-paths-test/noetld.sock"));
    std::env::remove_var("NOETL_STATE_DIR");
}
