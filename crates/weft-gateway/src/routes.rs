use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use tracing::info;

use weft_core::execution::{DailyMetrics, Execution};
use weft_core::workflow::Workflow;

use crate::error::ApiError;
use crate::middleware::Authenticated;
use crate::state::AppState;

// GET /api/health (no auth)
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// GET /api/workflows
pub async fn list_workflows(
    Authenticated(auth): Authenticated,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Workflow>>, ApiError> {
    let workflows = state.service.list_workflows(&auth.owner_id).await?;
    Ok(Json(workflows))
}

// GET /api/workflows/{id}
pub async fn get_workflow(
    Authenticated(auth): Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Workflow>, ApiError> {
    let workflow = state.service.get_workflow(&id, &auth.owner_id).await?;
    Ok(Json(workflow))
}

// DELETE /api/workflows/{id}
pub async fn delete_workflow(
    Authenticated(auth): Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.service.delete_workflow(&id, &auth.owner_id).await?;
    info!(workflow_id = %id, key = %auth.name, "Workflow deleted");
    Ok(Json(serde_json::json!({ "success": true })))
}

// PUT /api/user/api-keys
// Body maps provider name to secret, e.g. {"openai": "sk-...", "anthropic": "..."}.
pub async fn set_api_keys(
    Authenticated(auth): Authenticated,
    State(state): State<Arc<AppState>>,
    body: Result<Json<BTreeMap<String, String>>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(secrets) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let providers = state
        .service
        .set_credentials(&auth.owner_id, &secrets)
        .await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": "API keys updated successfully",
        "providers": providers,
    })))
}

#[derive(Deserialize)]
pub struct ExecuteBody {
    #[serde(default)]
    pub input: String,
}

// POST /api/workflows/{id}/execute
pub async fn execute_workflow(
    Authenticated(auth): Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<ExecuteBody>, JsonRejection>,
) -> Result<Json<Execution>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    info!(workflow_id = %id, key = %auth.name, "Execute requested");

    let execution = state
        .service
        .execute_workflow(&id, &body.input, &auth.owner_id)
        .await?;
    Ok(Json(execution))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub workflow_id: Option<String>,
    pub limit: Option<usize>,
}

// GET /api/executions?workflowId=&limit=
pub async fn list_executions(
    Authenticated(auth): Authenticated,
    State(state): State<Arc<AppState>>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<Execution>>, ApiError> {
    let executions = state
        .service
        .list_executions(&auth.owner_id, q.workflow_id.as_deref(), q.limit)
        .await?;
    Ok(Json(executions))
}

#[derive(Deserialize)]
pub struct MetricsQuery {
    pub days: Option<u32>,
}

// GET /api/executions/metrics?days=
pub async fn execution_metrics(
    Authenticated(auth): Authenticated,
    State(state): State<Arc<AppState>>,
    Query(q): Query<MetricsQuery>,
) -> Result<Json<Vec<DailyMetrics>>, ApiError> {
    let metrics = state.service.metrics(&auth.owner_id, q.days).await?;
    Ok(Json(metrics))
}

// GET /api/executions/{id}
pub async fn get_execution(
    Authenticated(auth): Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Execution>, ApiError> {
    let execution = state.service.get_execution(&id, &auth.owner_id).await?;
    Ok(Json(execution))
}
