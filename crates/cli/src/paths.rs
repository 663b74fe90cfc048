// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolves the daemon's control socket path the same way `noetld`
//! does (`NOETL_STATE_DIR`, falling back to the XDG state directory).
//! Duplicated rather than shared via a dependency on `noetl-daemon`:
//! this crate talks to the daemon only over `noetl-wire`'s protocol.

use std::path::PathBuf;

pub fn state_dir() -> anyhow::Result<PathBuf> {
    if let Ok(dir) = std::env::var("NOETL_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::state_dir()
        .or_else(dirs::home_dir)
        .map(|dir| dir.join("noetl"))
        .ok_or_else(|| anyhow::anyhow!("could not determine a state directory; set NOETL_STATE_DIR"))
}

pub fn socket_path() -> anyhow::Result<PathBuf> {
    Ok(state_dir()?.join("noetld.sock"))
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
