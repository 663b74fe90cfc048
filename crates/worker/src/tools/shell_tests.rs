// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use noetl_core::id::ExecutionId;

fn ctx() -> ToolContext {
    ToolContext { execution_id: ExecutionId::new(1), spawner: None }
}

#[tokio::test]
async fn captures_stdout_as_a_string_result() {
    let executor = ShellExecutor;
    let tool = Tool::Shell { command: "echo hello".to_string(), env: HashMap::new() };
    let value = executor.execute(&ctx(), &tool, &HashMap::new()).await.unwrap();
    assert_eq!(value, Value::String("hello".to_string()));
}

#[tokio::test]
async fn json_stdout_is_parsed_into_its_native_value() {
    let executor = ShellExecutor;
    let tool = Tool::Shell { command: r#"echo '{"ok": true}'"#.to_string(), env: HashMap::new() };
    let value = executor.execute(&ctx(), &tool, &HashMap::new()).await.unwrap();
    assert_eq!(value, serde_json::json!({"ok": true}));
}

#[tokio::test]
async fn a_nonzero_exit_status_is_reported_as_a_tool_error() {
    let executor = ShellExecutor;
    let tool = Tool::Shell { command: "exit 3".to_string(), env: HashMap::new() };
    let err = executor.execute(&ctx(), &tool, &HashMap::new()).await.unwrap_err();
    assert!(matches!(err, ToolError::ShellExitStatus(3)));
}

#[tokio::test]
async fn inputs_are_rendered_into_the_command_before_it_runs() {
    let executor = ShellExecutor;
    let mut inputs = HashMap::new();
    inputs.insert("name".to_string(), Value::String("world".to_string()));
    let tool = Tool::Shell { command: "echo {{ name }}".to_string(), env: HashMap::new() };
    let value = executor.execute(&ctx(), &tool, &inputs).await.unwrap();
    assert_eq!(value, Value::String("world".to_string()));
}
