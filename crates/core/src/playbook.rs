// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The normalized playbook graph the engine consumes.
//!
//! This is *not* the DSL — the DSL parser and static validator are out
//! of scope. What lives here is the already-normalized shape the
//! engine, dispatcher, and worker all agree on: an ordered list of
//! [`Step`], each carrying a tagged [`Tool`] variant — typed, tagged
//! variants rather than an interpreter over loosely typed config.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// A tool executor declaration. The engine only holds these; execution
/// is polymorphic over the worker runtime's small capability interface
/// (`prepare`, `execute`, `describe`) — see `noetl-worker::registry`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Tool {
    Http {
        method: String,
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<Value>,
    },
    Sql {
        connection: String,
        query: String,
        #[serde(default)]
        params: HashMap<String, Value>,
    },
    Shell {
        command: String,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    Python {
        script: String,
        #[serde(default)]
        args: Vec<String>,
    },
    SubPlaybook {
        catalog_path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        catalog_version: Option<String>,
        #[serde(default)]
        workload: Value,
    },
}

impl Tool {
    /// A short discriminant string, mirroring the pool/kind the
    /// dispatcher's task notification carries.
    pub fn kind(&self) -> &'static str {
        match self {
            Tool::Http { .. } => "http",
            Tool::Sql { .. } => "sql",
            Tool::Shell { .. } => "shell",
            Tool::Python { .. } => "python",
            Tool::SubPlaybook { .. } => "sub_playbook",
        }
    }
}

/// Error kinds a retry policy matches against, mirroring the error
/// taxonomy closely enough for a retry predicate (the full taxonomy is
/// `noetl_core::error::NoetlError`; this is the subset retry policies
/// are declared over).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryableError {
    ToolExecutionError,
    TaskTimeout,
    BrokerUnavailable,
    ResultStoreUnavailable,
}

/// Exponential backoff with a cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backoff {
    pub base_ms: u64,
    pub cap_ms: u64,
}

impl Backoff {
    /// Capped exponential backoff for the given (1-indexed) attempt,
    /// before jitter is applied by the caller.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.base_ms.saturating_mul(1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX));
        Duration::from_millis(exp.min(self.cap_ms))
    }
}

/// A step's retry policy: how many attempts, which errors are retriable,
/// and the backoff between attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(default)]
    pub retry_on: Vec<RetryableError>,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn permits(&self, attempt: u32, error: RetryableError) -> bool {
        attempt < self.max_attempts && self.retry_on.contains(&error)
    }
}

/// Fan-out execution mode for a [`LoopSpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    Sequential,
    Async,
}

/// A step's loop/fan-out declaration, owned by the Loop/Aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopSpec {
    /// Either an inline array or a template string the engine renders
    /// against the current context before the loop starts.
    pub collection: Value,
    pub element_var: String,
    pub mode: LoopMode,
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
    #[serde(default)]
    pub strategy: crate::event::CombineStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sink: Option<SinkSpec>,
}

fn default_concurrency() -> u32 {
    1
}

/// Declarative post-processing storage action attached to a step or a
/// loop iteration (a "Sink").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkSpec {
    pub tool: Box<Tool>,
}

/// A `when` condition, re-evaluated against the current context each
/// dispatch cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WhenCondition(pub String);

/// One step (node) in the normalized playbook graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub tool: Tool,
    #[serde(default)]
    pub inputs: HashMap<String, Value>,
    #[serde(default)]
    pub next: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<WhenCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_spec: Option<LoopSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sink: Option<SinkSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// The worker pool this step's tasks are published to.
    #[serde(default = "default_pool")]
    pub pool: String,
    /// Marks a step as the `finally`/end step scheduled when the
    /// execution otherwise would have gone terminally `failed` (the
    /// "terminal cascade").
    #[serde(default)]
    pub is_finally: bool,
}

fn default_pool() -> String {
    "default".to_string()
}

impl Step {
    pub fn node_type(&self) -> &'static str {
        self.tool.kind()
    }
}

#[cfg(test)]
#[path = "playbook_tests.rs"]
mod tests;
