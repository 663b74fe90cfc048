// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The tool executor registry: `kind -> Arc<dyn ToolExecutor>`, keyed
//! exactly by `Tool::kind()` — an unknown kind produces an
//! `UnsupportedTool` failure event. A small-capability-interface
//! registry rather than an interpreter over loosely typed config.

use async_trait::async_trait;
use noetl_core::id::ExecutionId;
use noetl_core::playbook::Tool;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("http request failed: {0}")]
    Http(String),
    #[error("shell command exited with status {0}")]
    ShellExitStatus(i32),
    #[error("shell command failed: {0}")]
    Shell(String),
    #[error("python script failed: {0}")]
    Python(String),
    #[error("sub-playbook dispatch failed: {0}")]
    SubPlaybook(String),
    #[error("unsupported tool kind: {0}")]
    UnsupportedTool(String),
    #[error(transparent)]
    Dispatcher(#[from] noetl_dispatcher::DispatcherError),
}

impl ToolError {
    /// The `{kind, message}` shape a `step.failed` event's `ErrorInfo`
    /// carries.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::Http(_)
            | ToolError::Shell(_)
            | ToolError::ShellExitStatus(_)
            | ToolError::Python(_)
            | ToolError::SubPlaybook(_)
            | ToolError::Dispatcher(_) => "ToolExecutionError",
            ToolError::UnsupportedTool(_) => "UnsupportedTool",
        }
    }
}

/// What an executor needs beyond the rendered inputs: which execution
/// and node this invocation belongs to, and (only for `sub_playbook`) a
/// way to start a child execution without the worker crate depending on
/// `noetl-engine`'s `Engine` directly.
pub struct ToolContext {
    pub execution_id: ExecutionId,
    pub spawner: Option<Arc<dyn SubExecutionSpawner>>,
}

/// Delegates `sub_playbook`'s `CreateExecution` call back to whatever
/// owns the catalog and the engine — in-process, the daemon wires this
/// directly to `Engine::create_execution`; a worker running in its own
/// process would implement it over the wire RPC instead.
#[async_trait]
pub trait SubExecutionSpawner: Send + Sync {
    async fn create_sub_execution(
        &self,
        catalog_path: &str,
        catalog_version: Option<&str>,
        workload: Value,
        parent_execution_id: ExecutionId,
    ) -> Result<ExecutionId, ToolError>;
}

/// One tool's capability interface: render (the caller already rendered
/// `inputs`; an executor may still need to resolve its own tool-literal
/// fields, e.g. a templated URL, against them) then execute.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, ctx: &ToolContext, tool: &Tool, inputs: &HashMap<String, Value>) -> Result<Value, ToolError>;
}

/// `kind -> executor` registry the runtime consults for every dispatched
/// task.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    executors: HashMap<&'static str, Arc<dyn ToolExecutor>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: &'static str, executor: Arc<dyn ToolExecutor>) -> &mut Self {
        self.executors.insert(kind, executor);
        self
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn ToolExecutor>> {
        self.executors.get(kind).cloned()
    }

    pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.executors.keys().copied()
    }

    /// The built-in registry of the supplemented tool set.
    pub fn with_builtin_tools() -> Self {
        let mut registry = Self::new();
        registry.register("http", Arc::new(crate::tools::http::HttpExecutor::default()));
        registry.register("shell", Arc::new(crate::tools::shell::ShellExecutor));
        registry.register("python", Arc::new(crate::tools::python::PythonExecutor));
        registry.register("sub_playbook", Arc::new(crate::tools::sub_playbook::SubPlaybookExecutor));
        registry
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
