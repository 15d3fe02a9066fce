use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use weft_core::config::GatewayConfig;
use weft_engine::WorkflowService;

use crate::routes;
use crate::state::AppState;

/// Build the API router over shared state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/workflows", get(routes::list_workflows))
        .route(
            "/api/workflows/{id}",
            get(routes::get_workflow).delete(routes::delete_workflow),
        )
        .route("/api/workflows/{id}/execute", post(routes::execute_workflow))
        .route("/api/user/api-keys", put(routes::set_api_keys))
        .route("/api/executions", get(routes::list_executions))
        .route("/api/executions/metrics", get(routes::execution_metrics))
        .route("/api/executions/{id}", get(routes::get_execution))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// HTTP gateway server built on axum.
pub struct GatewayServer {
    config: GatewayConfig,
    service: Arc<WorkflowService>,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, service: Arc<WorkflowService>) -> Self {
        Self { config, service }
    }

    /// Run the gateway server until the cancellation token is triggered.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let state = Arc::new(AppState {
            config: self.config.clone(),
            service: self.service.clone(),
        });
        let app = router(state);

        let listener = TcpListener::bind(&self.config.bind).await?;
        info!(
            bind = %self.config.bind,
            api_keys = self.config.api_keys.len(),
            "Gateway listening"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("Gateway shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use weft_core::config::{ApiKeyConfig, EngineConfig, LlmConfig};
    use weft_core::traits::{CredentialStore, WorkflowStore};
    use weft_engine::{ModelInvoker, ToolInvoker, WorkflowEngine};
    use weft_test_utils::{linear_workflow, MemoryStore, MockLlmClient, TEST_OWNER};
    use weft_tools::ToolRegistry;

    async fn app(api_keys: Vec<ApiKeyConfig>) -> Router {
        let store = Arc::new(MemoryStore::new());
        store.save_workflow(&linear_workflow()).await.unwrap();
        store
            .set_credential(TEST_OWNER, "openai", "sk-test")
            .await
            .unwrap();

        let engine = WorkflowEngine::new(
            ModelInvoker::with_client(Arc::new(MockLlmClient::new()), &LlmConfig::default()),
            ToolInvoker::new(Arc::new(ToolRegistry::new())),
            store.clone(),
            EngineConfig::default(),
        );
        let service = WorkflowService::new(Arc::new(engine), store.clone(), store.clone(), store);
        let config = GatewayConfig {
            api_keys,
            default_owner: TEST_OWNER.to_string(),
            ..GatewayConfig::default()
        };
        router(Arc::new(AppState {
            config,
            service: Arc::new(service),
        }))
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    fn execute(id: &str, body: &str) -> Request<Body> {
        Request::post(format!("/api/workflows/{}/execute", id))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    fn put_keys(body: &str) -> Request<Body> {
        Request::put("/api/user/api-keys")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn delete(uri: &str) -> Request<Body> {
        Request::delete(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = app(vec![]).await;
        let (status, json) = send(&app, get("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_execute_then_read_back() {
        let app = app(vec![]).await;
        let (status, exec) = send(&app, execute("wf-linear", r#"{"input":"hello"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(exec["status"], "Completed");
        assert_eq!(exec["output"], "mock response");
        assert_eq!(exec["workflowId"], "wf-linear");
        let id = exec["id"].as_str().unwrap().to_string();

        let (status, fetched) = send(&app, get(&format!("/api/executions/{}", id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["logs"].as_array().unwrap().len(), 5);

        let (status, list) = send(&app, get("/api/executions?workflowId=wf-linear&limit=5")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);

        let (status, metrics) = send(&app, get("/api/executions/metrics?days=7")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(metrics[0]["successCount"], 1);
    }

    #[tokio::test]
    async fn test_error_bodies() {
        let app = app(vec![]).await;

        let (status, json) = send(&app, execute("wf-linear", r#"{"input":""}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "bad_request");
        assert_eq!(json["message"], "Input is required");

        let (status, json) = send(&app, execute("missing", r#"{"input":"x"}"#)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["message"], "Workflow not found: missing");

        let (status, json) = send(&app, execute("wf-linear", "not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "bad_request");

        let (status, json) = send(&app, get("/api/executions/does-not-exist")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "not_found");
    }

    #[tokio::test]
    async fn test_api_key_auth() {
        let keys = vec![ApiKeyConfig {
            name: "ci".into(),
            key: "wk_ci".into(),
            owner_id: TEST_OWNER.into(),
        }];
        let app = app(keys).await;

        let (status, json) = send(&app, execute("wf-linear", r#"{"input":"hi"}"#)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "unauthorized");

        let req = Request::post("/api/workflows/wf-linear/execute")
            .header("content-type", "application/json")
            .header("authorization", "Bearer wk_ci")
            .body(Body::from(r#"{"input":"hi"}"#))
            .unwrap();
        let (status, json) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["userId"], TEST_OWNER);

        // Health stays open.
        let (status, _) = send(&app, get("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_workflow_list_get_delete() {
        let app = app(vec![]).await;

        let (status, list) = send(&app, get("/api/workflows")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);
        assert_eq!(list[0]["id"], "wf-linear");

        let (status, wf) = send(&app, get("/api/workflows/wf-linear")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(wf["name"], "Linear");

        let (status, json) = send(&app, delete("/api/workflows/wf-linear")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);

        let (status, json) = send(&app, delete("/api/workflows/wf-linear")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["message"], "Workflow not found: wf-linear");

        let (status, _) = send(&app, get("/api/workflows/wf-linear")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (_, list) = send(&app, get("/api/workflows")).await;
        assert!(list.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_api_keys() {
        let app = app(vec![]).await;

        let (status, json) = send(&app, put_keys(r#"{"openai":"sk-new","pinecone":""}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "API keys updated successfully");
        assert_eq!(json["providers"], serde_json::json!(["openai"]));

        let (status, exec) = send(&app, execute("wf-linear", r#"{"input":"hello"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(exec["status"], "Completed");

        let (status, json) = send(&app, put_keys(r#"{"openai":""}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["message"], "At least one API key is required");

        let (status, json) = send(&app, put_keys(r#"{"openai": 42}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "bad_request");
    }

    #[tokio::test]
    async fn test_management_routes_require_auth() {
        let keys = vec![ApiKeyConfig {
            name: "ci".into(),
            key: "wk_ci".into(),
            owner_id: TEST_OWNER.into(),
        }];
        let app = app(keys).await;

        let (status, _) = send(&app, get("/api/workflows")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = send(&app, delete("/api/workflows/wf-linear")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = send(&app, put_keys(r#"{"openai":"sk-x"}"#)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (_, list) = send(
            &app,
            Request::get("/api/workflows")
                .header("authorization", "Bearer wk_ci")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(list.as_array().unwrap().len(), 1);
    }
}
