// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `shell` tool: runs `command` through `/bin/sh -c`, capturing
//! stdout as the step's result. No shell grammar is parsed here — a
//! full shell lexer/parser would be a product surface in its own right
//! and is out of scope for this intentionally small executor; the
//! underlying shell does the parsing.

use crate::registry::{ToolContext, ToolError, ToolExecutor};
use crate::tools::render_string_against_inputs;
use async_trait::async_trait;
use noetl_core::playbook::Tool;
use serde_json::Value;
use std::collections::HashMap;
use tokio::process::Command;

pub struct ShellExecutor;

#[async_trait]
impl ToolExecutor for ShellExecutor {
    async fn execute(&self, _ctx: &ToolContext, tool: &Tool, inputs: &HashMap<String, Value>) -> Result<Value, ToolError> {
        let Tool::Shell { command, env } = tool else {
            return Err(ToolError::UnsupportedTool("shell executor invoked with a non-shell tool".into()));
        };

        let rendered_command = render_string_against_inputs(command, inputs);
        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c").arg(&rendered_command);
        for (key, value) in env {
            cmd.env(key, render_string_against_inputs(value, inputs));
        }

        let output = cmd.output().await.map_err(|e| ToolError::Shell(e.to_string()))?;
        if !output.status.success() {
            return Err(ToolError::ShellExitStatus(output.status.code().unwrap_or(-1)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        match serde_json::from_str::<Value>(&stdout) {
            Ok(value) => Ok(value),
            Err(_) => Ok(Value::String(stdout)),
        }
    }
}

#[cfg(test)]
#[path = "shell_tests.rs"]
mod tests;
