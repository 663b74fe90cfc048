// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `sub_playbook` tool: delegates to `CreateExecution` for a child
//! playbook run, carrying `parent_execution_id` so the parent's event
//! log can be correlated with the child's. The child execution's own
//! completion is observed the ordinary way
//! (polling `GetExecution`/`ListEvents`), not inlined into this result —
//! the step itself only reports that the child was started.

use crate::registry::{ToolContext, ToolError, ToolExecutor};
use crate::tools::render_against_inputs;
use async_trait::async_trait;
use noetl_core::playbook::Tool;
use serde_json::Value;
use std::collections::HashMap;

pub struct SubPlaybookExecutor;

#[async_trait]
impl ToolExecutor for SubPlaybookExecutor {
    async fn execute(&self, ctx: &ToolContext, tool: &Tool, inputs: &HashMap<String, Value>) -> Result<Value, ToolError> {
        let Tool::SubPlaybook { catalog_path, catalog_version, workload } = tool else {
            return Err(ToolError::UnsupportedTool("sub_playbook executor invoked with a non-sub_playbook tool".into()));
        };
        let spawner = ctx
            .spawner
            .as_ref()
            .ok_or_else(|| ToolError::SubPlaybook("no sub-execution spawner configured for this worker".into()))?;

        let rendered_workload = if workload.is_null() { Value::Object(inputs.clone().into_iter().collect()) } else { render_against_inputs(workload, inputs) };

        let child_execution_id = spawner
            .create_sub_execution(catalog_path, catalog_version.as_deref(), rendered_workload, ctx.execution_id)
            .await?;

        Ok(serde_json::json!({ "execution_id": child_execution_id.to_string() }))
    }
}

#[cfg(test)]
#[path = "sub_playbook_tests.rs"]
mod tests;
