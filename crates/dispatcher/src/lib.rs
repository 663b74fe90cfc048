// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! noetl-dispatcher: the worker-facing RPC surface — `GetTask`,
//! `EmitEvent`, `Heartbeat`, `PutResult` — plus the per-task lease
//! table that backs its timeout supervision.

pub mod lease;
pub mod rpc;

pub use lease::{LeaseExpiry, LeaseTable, TaskKey};
pub use rpc::{Dispatcher, DispatcherError, TaskNotification, TaskSpec, TASK_NOTIFICATION_BYTES};
