// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use noetl_core::id::ExecutionId;

fn ctx() -> ToolContext {
    ToolContext { execution_id: ExecutionId::new(1), spawner: None }
}

#[tokio::test]
async fn rejects_a_tool_declaration_of_the_wrong_kind() {
    let executor = HttpExecutor::default();
    let tool = Tool::Shell { command: "echo hi".to_string(), env: HashMap::new() };
    let err = executor.execute(&ctx(), &tool, &HashMap::new()).await.unwrap_err();
    assert!(matches!(err, ToolError::UnsupportedTool(_)));
}

#[tokio::test]
async fn invalid_http_method_is_reported_as_a_tool_error() {
    let executor = HttpExecutor::default();
    let tool = Tool::Http { method: "BAD METHOD".to_string(), url: "https://example.test".to_string(), headers: HashMap::new(), body: None };
    let err = executor.execute(&ctx(), &tool, &HashMap::new()).await.unwrap_err();
    assert!(matches!(err, ToolError::Http(_)));
}
