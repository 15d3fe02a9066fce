use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use weft_core::error::{Result, WeftError};
use weft_core::execution::{DailyMetrics, Execution, ExecutionId};
use weft_core::traits::{CredentialStore, ExecutionStore, WorkflowStore};
use weft_core::types::Credentials;
use weft_core::workflow::Workflow;

use crate::engine::WorkflowEngine;

/// Default page size for execution listings.
pub const DEFAULT_LIST_LIMIT: usize = 20;
/// Default metrics window in days.
pub const DEFAULT_METRICS_DAYS: u32 = 30;

/// Caller-facing operations over stored workflows, owner credentials, and executions.
pub struct WorkflowService {
    engine: Arc<WorkflowEngine>,
    workflows: Arc<dyn WorkflowStore>,
    credentials: Arc<dyn CredentialStore>,
    executions: Arc<dyn ExecutionStore>,
    default_credentials: Credentials,
}

impl WorkflowService {
    pub fn new(
        engine: Arc<WorkflowEngine>,
        workflows: Arc<dyn WorkflowStore>,
        credentials: Arc<dyn CredentialStore>,
        executions: Arc<dyn ExecutionStore>,
    ) -> Self {
        Self {
            engine,
            workflows,
            credentials,
            executions,
            default_credentials: Credentials::new(),
        }
    }

    /// Credentials used beneath every owner's stored ones.
    pub fn with_default_credentials(mut self, defaults: Credentials) -> Self {
        self.default_credentials = defaults;
        self
    }

    /// Load `workflow_id` for `owner_id` and run it on `input`.
    pub async fn execute_workflow(
        &self,
        workflow_id: &str,
        input: &str,
        owner_id: &str,
    ) -> Result<Execution> {
        if input.trim().is_empty() {
            return Err(WeftError::InvalidInput("Input is required".into()));
        }

        let workflow = self
            .workflows
            .get_workflow(workflow_id, owner_id)
            .await?
            .ok_or_else(|| WeftError::WorkflowNotFound(workflow_id.to_string()))?;

        let credentials = self
            .credentials
            .credentials(owner_id)
            .await?
            .merged_over(&self.default_credentials);

        info!(workflow_id, owner_id, providers = ?credentials.providers(), "Executing workflow");
        self.engine.run(&workflow, input, owner_id, &credentials).await
    }

    /// Owner's workflows, most recently updated first.
    pub async fn list_workflows(&self, owner_id: &str) -> Result<Vec<Workflow>> {
        self.workflows.list_workflows(owner_id).await
    }

    pub async fn get_workflow(&self, id: &str, owner_id: &str) -> Result<Workflow> {
        self.workflows
            .get_workflow(id, owner_id)
            .await?
            .ok_or_else(|| WeftError::WorkflowNotFound(id.to_string()))
    }

    pub async fn delete_workflow(&self, id: &str, owner_id: &str) -> Result<()> {
        if !self.workflows.delete_workflow(id, owner_id).await? {
            return Err(WeftError::WorkflowNotFound(id.to_string()));
        }
        info!(workflow_id = id, owner_id, "Workflow deleted");
        Ok(())
    }

    /// Store provider secrets for `owner_id`. Blank secrets are skipped; at
    /// least one must be present. Returns the providers written, sorted.
    pub async fn set_credentials(
        &self,
        owner_id: &str,
        secrets: &BTreeMap<String, String>,
    ) -> Result<Vec<String>> {
        let mut written = Vec::new();
        for (provider, secret) in secrets {
            let provider = provider.trim().to_ascii_lowercase();
            let secret = secret.trim();
            if provider.is_empty() || secret.is_empty() {
                continue;
            }
            self.credentials
                .set_credential(owner_id, &provider, secret)
                .await?;
            written.push(provider);
        }
        if written.is_empty() {
            return Err(WeftError::InvalidInput("At least one API key is required".into()));
        }
        written.sort_unstable();
        written.dedup();
        info!(owner_id, providers = ?written, "Credentials updated");
        Ok(written)
    }

    pub async fn get_execution(&self, id: &str, owner_id: &str) -> Result<Execution> {
        self.executions
            .get(&ExecutionId::from_string(id), owner_id)
            .await?
            .ok_or_else(|| WeftError::ExecutionNotFound(id.to_string()))
    }

    pub async fn list_executions(
        &self,
        owner_id: &str,
        workflow_id: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<Execution>> {
        let limit = limit.filter(|&l| l > 0).unwrap_or(DEFAULT_LIST_LIMIT);
        self.executions.list(owner_id, workflow_id, limit).await
    }

    pub async fn metrics(&self, owner_id: &str, days: Option<u32>) -> Result<Vec<DailyMetrics>> {
        let days = days.filter(|&d| d > 0).unwrap_or(DEFAULT_METRICS_DAYS);
        self.executions.daily_metrics(owner_id, days).await
    }
}
