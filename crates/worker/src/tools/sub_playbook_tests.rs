// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use noetl_core::id::ExecutionId;
use parking_lot::Mutex;

struct MockSpawner {
    calls: Mutex<Vec<(String, Option<String>, Value, ExecutionId)>>,
    next_id: ExecutionId,
}

#[async_trait]
impl SubExecutionSpawner for MockSpawner {
    async fn create_sub_execution(
        &self,
        catalog_path: &str,
        catalog_version: Option<&str>,
        workload: Value,
        parent_execution_id: ExecutionId,
    ) -> Result<ExecutionId, ToolError> {
        self.calls.lock().push((catalog_path.to_string(), catalog_version.map(str::to_string), workload, parent_execution_id));
        Ok(self.next_id)
    }
}

fn ctx_with(spawner: Option<Arc<dyn SubExecutionSpawner>>) -> ToolContext {
    ToolContext { execution_id: ExecutionId::new(7), spawner }
}

#[tokio::test]
async fn without_a_configured_spawner_the_call_fails() {
    let executor = SubPlaybookExecutor;
    let tool = Tool::SubPlaybook { catalog_path: "child.yaml".to_string(), catalog_version: None, workload: Value::Null };
    let err = executor.execute(&ctx_with(None), &tool, &HashMap::new()).await.unwrap_err();
    assert!(matches!(err, ToolError::SubPlaybook(_)));
}

#[tokio::test]
async fn delegates_to_the_spawner_and_returns_the_child_execution_id() {
    let spawner = Arc::new(MockSpawner { calls: Mutex::new(Vec::new()), next_id: ExecutionId::new(42) });
    let executor = SubPlaybookExecutor;
    let tool = Tool::SubPlaybook {
        catalog_path: "child.yaml".to_string(),
        catalog_version: Some("v2".to_string()),
        workload: serde_json::json!({"greeting": "hi"}),
    };

    let value = executor.execute(&ctx_with(Some(spawner.clone())), &tool, &HashMap::new()).await.unwrap();

    assert_eq!(value, serde_json::json!({"execution_id": ExecutionId::new(42).to_string()}));
    let calls = spawner.calls.lock();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "child.yaml");
    assert_eq!(calls[0].1.as_deref(), Some("v2"));
    assert_eq!(calls[0].2, serde_json::json!({"greeting": "hi"}));
    assert_eq!(calls[0].3, ExecutionId::new(7));
}

#[tokio::test]
async fn a_null_workload_falls_back_to_the_rendered_inputs() {
    let spawner = Arc::new(MockSpawner { calls: Mutex::new(Vec::new()), next_id: ExecutionId::new(1) });
    let executor = SubPlaybookExecutor;
    let tool = Tool::SubPlaybook { catalog_path: "child.yaml".to_string(), catalog_version: None, workload: Value::Null };
    let mut inputs = HashMap::new();
    inputs.insert("key".to_string(), Value::String("value".to_string()));

    executor.execute(&ctx_with(Some(spawner.clone())), &tool, &inputs).await.unwrap();

    let calls = spawner.calls.lock();
    assert_eq!(calls[0].2, serde_json::json!({"key": "value"}));
}
