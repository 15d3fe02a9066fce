use std::sync::Arc;

use serde_json::json;

use weft_core::config::{EngineConfig, LlmConfig};
use weft_core::execution::{ExecutionStatus, LogLevel, TokenUsage};
use weft_core::traits::{CredentialStore, ExecutionStore, WorkflowStore};
use weft_core::types::Credentials;
use weft_engine::{ModelInvoker, ToolInvoker, WorkflowEngine, WorkflowService};
use weft_store::SqliteStore;
use weft_test_utils::{
    branching_workflow, linear_workflow, tool_workflow, FailingTool, MockLlmClient, TEST_OWNER,
};
use weft_tools::ToolRegistry;

fn engine(store: Arc<SqliteStore>, llm: MockLlmClient) -> WorkflowEngine {
    let mut tools = ToolRegistry::new();
    tools.register(FailingTool::new("Flaky", "connection reset"));
    WorkflowEngine::new(
        ModelInvoker::with_client(Arc::new(llm), &LlmConfig::default()),
        ToolInvoker::new(Arc::new(tools)),
        store,
        EngineConfig::default(),
    )
}

#[tokio::test]
async fn test_failed_run_reads_back_verbatim() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let engine = engine(store.clone(), MockLlmClient::new());

    let exec = engine
        .run(
            &tool_workflow("Flaky", json!({})),
            "hello",
            TEST_OWNER,
            &Credentials::new(),
        )
        .await
        .unwrap();
    assert_eq!(exec.status, ExecutionStatus::Failed);

    let stored = store.get(&exec.id, TEST_OWNER).await.unwrap().unwrap();
    assert_eq!(stored.status, ExecutionStatus::Failed);
    assert_eq!(stored.logs, exec.logs);
    assert_eq!(stored.logs.len(), 3);
    assert_eq!(stored.logs[2].level, LogLevel::Error);
    assert!(stored.output.is_none());
    assert_eq!(stored.metrics, exec.metrics);
    let m = &stored.metrics;
    assert_eq!(
        m.duration,
        Some((m.end_time.unwrap() - m.start_time).num_milliseconds())
    );
}

#[tokio::test]
async fn test_completed_run_reads_back_with_usage() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let llm = MockLlmClient::new().with_reply("ok", TokenUsage::new(40, 10, 50));
    let engine = engine(store.clone(), llm);

    let exec = engine
        .run(
            &linear_workflow(),
            "hello",
            TEST_OWNER,
            &Credentials::new().with("openai", "sk"),
        )
        .await
        .unwrap();

    let stored = store.get(&exec.id, TEST_OWNER).await.unwrap().unwrap();
    assert_eq!(stored.status, ExecutionStatus::Completed);
    assert_eq!(stored.output.as_deref(), Some("ok"));
    assert_eq!(stored.metrics.token_usage, Some(TokenUsage::new(40, 10, 50)));
    assert_eq!(stored.logs, exec.logs);
    assert_eq!(stored.logs[3].data.as_ref().unwrap()["tokenUsage"]["prompt"], 40);
}

#[tokio::test]
async fn test_service_over_sqlite() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    store
        .save_workflow(&branching_workflow("input.includes('urgent')"))
        .await
        .unwrap();
    store
        .set_credential(TEST_OWNER, "openai", "sk-owner")
        .await
        .unwrap();

    let engine = Arc::new(engine(store.clone(), MockLlmClient::new()));
    let service = WorkflowService::new(engine, store.clone(), store.clone(), store.clone());

    let exec = service
        .execute_workflow("wf-branch", "this is urgent", TEST_OWNER)
        .await
        .unwrap();
    assert_eq!(exec.status, ExecutionStatus::Completed);
    assert_eq!(exec.output.as_deref(), Some("this is urgent"));

    let listed = service
        .list_executions(TEST_OWNER, Some("wf-branch"), None)
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, exec.id);

    let metrics = service.metrics(TEST_OWNER, Some(7)).await.unwrap();
    assert_eq!(metrics[0].success_count, 1);
}
