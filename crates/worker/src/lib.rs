// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! noetl-worker: the worker runtime. Stateless by design — the only
//! durable state a worker ever touches goes through
//! `noetl_dispatcher::Dispatcher`'s RPCs and the Result Store, never a
//! local cache or its own copy of the event log.
//!
//! A small built-in tool registry (`http`, `shell`, `python`,
//! `sub_playbook`) makes the runtime genuinely runnable end to end.
//! Tool executors are treated as an externally-supplied capability, so
//! these four are intentionally minimal rather than a product surface.

pub mod registry;
pub mod runtime;
pub mod tools;

pub use registry::{SubExecutionSpawner, ToolContext, ToolError, ToolExecutor, ToolRegistry};
pub use runtime::{WorkerRuntime, WorkerRuntimeConfig};
