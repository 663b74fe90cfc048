// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Storage backends for the engine: the append-only Event Log Store
//! (C1), the materialized state projection rebuilt from it, the tiered
//! Result Store (C7), and the ephemeral Transient Store (C8).

pub mod result_store;
pub mod state;
pub mod transient;
pub mod wal;

pub use result_store::{ResultBackend, ResultStore, ResultStoreError};
pub use state::{ExecutionState, MaterializedState, NodeStatus};
pub use transient::{TransientError, TransientStore};
pub use wal::{EventFilter, EventLogStore, WalError};
