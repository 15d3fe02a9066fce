use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use futures::future::BoxFuture;

use weft_core::error::{Result, WeftError};
use weft_core::execution::{
    metrics_window_start, summarize_daily, DailyMetrics, Execution, ExecutionId, ExecutionUpdate,
    LogEntry,
};
use weft_core::traits::{CredentialStore, ExecutionStore, WorkflowStore};
use weft_core::types::Credentials;
use weft_core::workflow::Workflow;

/// In-memory implementation of every store trait, with switches for
/// injecting persistence failures.
#[derive(Default)]
pub struct MemoryStore {
    executions: Mutex<Vec<Execution>>,
    workflows: Mutex<Vec<Workflow>>,
    credentials: Mutex<HashMap<String, Credentials>>,
    fail_create: AtomicBool,
    fail_append: AtomicBool,
    fail_update: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_append(&self, fail: bool) {
        self.fail_append.store(fail, Ordering::SeqCst);
    }

    pub fn fail_update(&self, fail: bool) {
        self.fail_update.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of a stored execution regardless of owner.
    pub fn snapshot(&self, id: &ExecutionId) -> Option<Execution> {
        self.executions
            .lock()
            .unwrap()
            .iter()
            .find(|e| &e.id == id)
            .cloned()
    }

    pub fn execution_count(&self) -> usize {
        self.executions.lock().unwrap().len()
    }
}

impl ExecutionStore for MemoryStore {
    fn create(&self, execution: &Execution) -> BoxFuture<'_, Result<ExecutionId>> {
        let execution = execution.clone();
        Box::pin(async move {
            if self.fail_create.load(Ordering::SeqCst) {
                return Err(WeftError::Database("create failed".into()));
            }
            let id = execution.id.clone();
            self.executions.lock().unwrap().push(execution);
            Ok(id)
        })
    }

    fn append_log(&self, id: &ExecutionId, entry: &LogEntry) -> BoxFuture<'_, Result<()>> {
        let id = id.clone();
        let entry = entry.clone();
        Box::pin(async move {
            if self.fail_append.load(Ordering::SeqCst) {
                return Err(WeftError::Database("append failed".into()));
            }
            let mut execs = self.executions.lock().unwrap();
            let exec = execs
                .iter_mut()
                .find(|e| e.id == id)
                .ok_or_else(|| WeftError::ExecutionNotFound(id.to_string()))?;
            if exec.status.is_terminal() {
                return Err(WeftError::ExecutionClosed(id.to_string()));
            }
            exec.updated_at = entry.timestamp;
            exec.logs.push(entry);
            Ok(())
        })
    }

    fn update(&self, id: &ExecutionId, update: &ExecutionUpdate) -> BoxFuture<'_, Result<()>> {
        let id = id.clone();
        let update = update.clone();
        Box::pin(async move {
            if self.fail_update.load(Ordering::SeqCst) {
                return Err(WeftError::Database("update failed".into()));
            }
            let mut execs = self.executions.lock().unwrap();
            let exec = execs
                .iter_mut()
                .find(|e| e.id == id)
                .ok_or_else(|| WeftError::ExecutionNotFound(id.to_string()))?;
            if exec.status.is_terminal() {
                return Err(WeftError::ExecutionClosed(id.to_string()));
            }
            exec.status = update.status;
            exec.output = update.output;
            if let Some(end) = update.metrics.end_time {
                exec.updated_at = end;
            }
            exec.metrics = update.metrics;
            Ok(())
        })
    }

    fn get(&self, id: &ExecutionId, owner_id: &str) -> BoxFuture<'_, Result<Option<Execution>>> {
        let id = id.clone();
        let owner_id = owner_id.to_string();
        Box::pin(async move {
            Ok(self
                .executions
                .lock()
                .unwrap()
                .iter()
                .find(|e| e.id == id && e.user_id == owner_id)
                .cloned())
        })
    }

    fn list(
        &self,
        owner_id: &str,
        workflow_id: Option<&str>,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Execution>>> {
        let owner_id = owner_id.to_string();
        let workflow_id = workflow_id.map(str::to_string);
        Box::pin(async move {
            let execs = self.executions.lock().unwrap();
            Ok(execs
                .iter()
                .rev()
                .filter(|e| e.user_id == owner_id)
                .filter(|e| workflow_id.as_ref().map_or(true, |w| &e.workflow_id == w))
                .take(limit)
                .cloned()
                .collect())
        })
    }

    fn daily_metrics(&self, owner_id: &str, days: u32) -> BoxFuture<'_, Result<Vec<DailyMetrics>>> {
        let owner_id = owner_id.to_string();
        Box::pin(async move {
            let since = metrics_window_start(days);
            let execs = self.executions.lock().unwrap();
            Ok(summarize_daily(
                execs
                    .iter()
                    .filter(|e| e.user_id == owner_id && e.created_at.date_naive() >= since),
            ))
        })
    }
}

impl WorkflowStore for MemoryStore {
    fn get_workflow(&self, id: &str, owner_id: &str) -> BoxFuture<'_, Result<Option<Workflow>>> {
        let id = id.to_string();
        let owner_id = owner_id.to_string();
        Box::pin(async move {
            Ok(self
                .workflows
                .lock()
                .unwrap()
                .iter()
                .find(|w| w.id == id && w.owner_id == owner_id)
                .cloned())
        })
    }

    fn save_workflow(&self, workflow: &Workflow) -> BoxFuture<'_, Result<()>> {
        let workflow = workflow.clone();
        Box::pin(async move {
            let mut wfs = self.workflows.lock().unwrap();
            wfs.retain(|w| w.id != workflow.id);
            wfs.push(workflow);
            Ok(())
        })
    }

    fn list_workflows(&self, owner_id: &str) -> BoxFuture<'_, Result<Vec<Workflow>>> {
        let owner_id = owner_id.to_string();
        Box::pin(async move {
            let mut wfs: Vec<Workflow> = self
                .workflows
                .lock()
                .unwrap()
                .iter()
                .filter(|w| w.owner_id == owner_id)
                .cloned()
                .collect();
            wfs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            Ok(wfs)
        })
    }

    fn delete_workflow(&self, id: &str, owner_id: &str) -> BoxFuture<'_, Result<bool>> {
        let id = id.to_string();
        let owner_id = owner_id.to_string();
        Box::pin(async move {
            let mut wfs = self.workflows.lock().unwrap();
            let before = wfs.len();
            wfs.retain(|w| !(w.id == id && w.owner_id == owner_id));
            Ok(wfs.len() != before)
        })
    }
}

impl CredentialStore for MemoryStore {
    fn credentials(&self, owner_id: &str) -> BoxFuture<'_, Result<Credentials>> {
        let owner_id = owner_id.to_string();
        Box::pin(async move {
            Ok(self
                .credentials
                .lock()
                .unwrap()
                .get(&owner_id)
                .cloned()
                .unwrap_or_default())
        })
    }

    fn set_credential(
        &self,
        owner_id: &str,
        provider: &str,
        secret: &str,
    ) -> BoxFuture<'_, Result<()>> {
        let owner_id = owner_id.to_string();
        let provider = provider.to_string();
        let secret = secret.to_string();
        Box::pin(async move {
            self.credentials
                .lock()
                .unwrap()
                .entry(owner_id)
                .or_default()
                .insert(provider, secret);
            Ok(())
        })
    }
}
