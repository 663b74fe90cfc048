// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `python` tool: invokes `python3 <script> [args...]` as a
//! subprocess, same capture convention as the `shell` tool. No
//! interpreter embedding (e.g. `pyo3`) is pulled in — this is an
//! intentionally small stand-in, not a product surface.

use crate::registry::{ToolContext, ToolError, ToolExecutor};
use crate::tools::render_string_against_inputs;
use async_trait::async_trait;
use noetl_core::playbook::Tool;
use serde_json::Value;
use std::collections::HashMap;
use tokio::process::Command;

pub struct PythonExecutor;

#[async_trait]
impl ToolExecutor for PythonExecutor {
    async fn execute(&self, _ctx: &ToolContext, tool: &Tool, inputs: &HashMap<String, Value>) -> Result<Value, ToolError> {
        let Tool::Python { script, args } = tool else {
            return Err(ToolError::UnsupportedTool("python executor invoked with a non-python tool".into()));
        };

        let rendered_script = render_string_against_inputs(script, inputs);
        let rendered_args: Vec<String> = args.iter().map(|a| render_string_against_inputs(a, inputs)).collect();

        let output = Command::new("python3")
            .arg(&rendered_script)
            .args(&rendered_args)
            .output()
            .await
            .map_err(|e| ToolError::Python(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();
            return Err(ToolError::Python(format!("exit {}: {stderr}", output.status.code().unwrap_or(-1))));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        match serde_json::from_str::<Value>(&stdout) {
            Ok(value) => Ok(value),
            Err(_) => Ok(Value::String(stdout)),
        }
    }
}

#[cfg(test)]
#[path = "python_tests.rs"]
mod tests;
