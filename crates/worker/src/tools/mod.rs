// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The built-in tool executors: `http`, `shell`, `python`,
//! `sub_playbook`.

pub mod http;
pub mod python;
pub mod shell;
pub mod sub_playbook;

use noetl_engine::template::{render_value, TemplateContext};
use serde_json::Value;
use std::collections::HashMap;

/// Render a tool's own literal fields (a URL, a shell command, a script
/// path) against the step's already-rendered `inputs`, reusing the
/// engine's template language rather than inventing a second one. The
/// engine renders `step.inputs` against `workload`/`vars`/`results`
/// before dispatch; this renders a tool declaration's fields against
/// those same resolved inputs, so `{{ path }}` in a tool field picks up
/// an input named `path`.
pub(crate) fn render_against_inputs(value: &Value, inputs: &HashMap<String, Value>) -> Value {
    let workload = Value::Null;
    let results = HashMap::new();
    let ctx = TemplateContext { workload: &workload, vars: inputs, results: &results };
    render_value(value, &ctx)
}

pub(crate) fn render_string_against_inputs(s: &str, inputs: &HashMap<String, Value>) -> String {
    match render_against_inputs(&Value::String(s.to_string()), inputs) {
        Value::String(rendered) => rendered,
        other => other.to_string(),
    }
}
