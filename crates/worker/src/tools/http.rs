// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `http` tool: issues one HTTP request per step invocation via
//! `reqwest`, the same HTTP client already in the workspace stack for
//! the keychain's future token-refresh calls. Deliberately minimal —
//! no retries, redirects policy, or connection pooling configuration
//! beyond `reqwest`'s defaults; tool executors stay intentionally
//! small.

use crate::registry::{ToolContext, ToolError, ToolExecutor};
use crate::tools::{render_against_inputs, render_string_against_inputs};
use async_trait::async_trait;
use noetl_core::playbook::Tool;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;

pub struct HttpExecutor {
    client: Client,
}

impl Default for HttpExecutor {
    fn default() -> Self {
        Self { client: Client::new() }
    }
}

#[async_trait]
impl ToolExecutor for HttpExecutor {
    async fn execute(&self, _ctx: &ToolContext, tool: &Tool, inputs: &HashMap<String, Value>) -> Result<Value, ToolError> {
        let Tool::Http { method, url, headers, body } = tool else {
            return Err(ToolError::UnsupportedTool("http executor invoked with a non-http tool".into()));
        };

        let rendered_url = render_string_against_inputs(url, inputs);
        let rendered_method = reqwest::Method::from_bytes(method.to_uppercase().as_bytes())
            .map_err(|e| ToolError::Http(format!("invalid method {method}: {e}")))?;

        let mut request = self.client.request(rendered_method, &rendered_url);
        for (name, value) in headers {
            request = request.header(name, render_string_against_inputs(value, inputs));
        }

        let rendered_body = body.as_ref().map(|b| render_against_inputs(b, inputs));
        if let Some(payload) = rendered_body {
            request = request.json(&payload);
        } else if !inputs.is_empty() {
            request = request.json(inputs);
        }

        let response = request.send().await.map_err(|e| ToolError::Http(e.to_string()))?;
        let status = response.status();
        let body_value: Value = response.json().await.unwrap_or(Value::Null);

        if !status.is_success() {
            return Err(ToolError::Http(format!("{rendered_url} returned {status}")));
        }
        Ok(body_value)
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
