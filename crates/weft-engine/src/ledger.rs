use std::sync::Arc;

use tracing::{debug, warn};

use weft_core::error::Result;
use weft_core::execution::{
    now_millis, Execution, ExecutionId, ExecutionStatus, ExecutionUpdate, LogEntry, TokenUsage,
};
use weft_core::traits::ExecutionStore;

use crate::model::estimate_cost;

/// Sole writer of one execution record.
///
/// Opening persists a `Running` skeleton; entries are appended one at a time;
/// `complete` or `fail` consume the ledger, so a closed record cannot be
/// touched again through it.
pub struct ExecutionLedger {
    store: Arc<dyn ExecutionStore>,
    record: Execution,
}

impl ExecutionLedger {
    /// Persist a new `Running` execution.
    pub async fn open(
        store: Arc<dyn ExecutionStore>,
        workflow_id: &str,
        user_id: &str,
        input: &str,
    ) -> Result<Self> {
        let mut record = Execution::start(workflow_id, user_id, input);
        record.id = store.create(&record).await?;
        debug!(execution_id = %record.id, workflow_id, "Execution opened");
        Ok(Self { store, record })
    }

    pub fn id(&self) -> &ExecutionId {
        &self.record.id
    }

    /// Read-only view of the record as written so far.
    pub fn record(&self) -> &Execution {
        &self.record
    }

    /// Node id of the most recent entry that carried one.
    pub fn last_node_id(&self) -> Option<&str> {
        self.record
            .logs
            .iter()
            .rev()
            .find_map(|entry| entry.node_id.as_deref())
    }

    /// Append one entry. A store failure is reported but does not abort the run;
    /// the entry is still kept on the in-memory record.
    pub async fn append(&mut self, entry: LogEntry) {
        if let Err(e) = self.store.append_log(&self.record.id, &entry).await {
            warn!(
                execution_id = %self.record.id,
                error = %e,
                message = %entry.message,
                "Failed to persist execution log entry"
            );
        }
        self.record.updated_at = entry.timestamp;
        self.record.logs.push(entry);
    }

    /// Close as `Completed` with the final output and accumulated usage.
    pub async fn complete(self, output: String, usage: TokenUsage) -> Result<Execution> {
        let mut metrics = self.record.metrics.clone();
        metrics.finish(now_millis());
        metrics.token_usage = Some(usage);
        metrics.cost = Some(estimate_cost(&usage));
        self.close(ExecutionStatus::Completed, Some(output), metrics)
            .await
    }

    /// Close as `Failed`. Output stays unset; logs written so far are kept.
    pub async fn fail(self) -> Result<Execution> {
        let mut metrics = self.record.metrics.clone();
        metrics.finish(now_millis());
        self.close(ExecutionStatus::Failed, None, metrics).await
    }

    async fn close(
        mut self,
        status: ExecutionStatus,
        output: Option<String>,
        metrics: weft_core::execution::ExecutionMetrics,
    ) -> Result<Execution> {
        let update = ExecutionUpdate {
            status,
            output,
            metrics,
        };
        self.store.update(&self.record.id, &update).await?;

        if let Some(end) = update.metrics.end_time {
            self.record.updated_at = end;
        }
        self.record.status = update.status;
        self.record.output = update.output;
        self.record.metrics = update.metrics;
        debug!(execution_id = %self.record.id, status = %status, "Execution closed");
        Ok(self.record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_test_utils::MemoryStore;

    async fn open(store: &Arc<MemoryStore>) -> ExecutionLedger {
        ExecutionLedger::open(store.clone(), "wf", "user", "hello")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_open_persists_running_record() {
        let store = Arc::new(MemoryStore::new());
        let ledger = open(&store).await;
        let stored = store.snapshot(ledger.id()).unwrap();
        assert_eq!(stored.status, ExecutionStatus::Running);
        assert_eq!(stored.input, "hello");
    }

    #[tokio::test]
    async fn test_complete_sets_metrics() {
        let store = Arc::new(MemoryStore::new());
        let mut ledger = open(&store).await;
        ledger.append(LogEntry::info("step").with_node("n1")).await;
        let exec = ledger
            .complete("done".into(), TokenUsage::new(1000, 100, 1100))
            .await
            .unwrap();

        assert_eq!(exec.status, ExecutionStatus::Completed);
        assert_eq!(exec.output.as_deref(), Some("done"));
        let m = &exec.metrics;
        assert_eq!(
            m.duration,
            Some((m.end_time.unwrap() - m.start_time).num_milliseconds())
        );
        assert_eq!(m.token_usage, Some(TokenUsage::new(1000, 100, 1100)));
        assert!((m.cost.unwrap() - 0.013).abs() < 1e-9);

        let stored = store.snapshot(&exec.id).unwrap();
        assert_eq!(stored.status, ExecutionStatus::Completed);
        assert_eq!(stored.logs.len(), 1);
    }

    #[tokio::test]
    async fn test_fail_leaves_output_unset() {
        let store = Arc::new(MemoryStore::new());
        let mut ledger = open(&store).await;
        ledger.append(LogEntry::error("boom")).await;
        let exec = ledger.fail().await.unwrap();
        assert_eq!(exec.status, ExecutionStatus::Failed);
        assert!(exec.output.is_none());
        assert!(exec.metrics.end_time.is_some());
        assert!(exec.metrics.token_usage.is_none());
    }

    #[tokio::test]
    async fn test_append_failure_is_not_fatal() {
        let store = Arc::new(MemoryStore::new());
        let mut ledger = open(&store).await;
        store.fail_append(true);
        ledger.append(LogEntry::info("kept in memory")).await;
        assert_eq!(ledger.record().logs.len(), 1);
        let exec = ledger.complete("ok".into(), TokenUsage::default()).await.unwrap();
        assert_eq!(exec.logs.len(), 1);
        assert!(store.snapshot(&exec.id).unwrap().logs.is_empty());
    }

    #[tokio::test]
    async fn test_create_failure_propagates() {
        let store = Arc::new(MemoryStore::new());
        store.fail_create(true);
        assert!(ExecutionLedger::open(store, "wf", "u", "x").await.is_err());
    }

    #[tokio::test]
    async fn test_last_node_id() {
        let store = Arc::new(MemoryStore::new());
        let mut ledger = open(&store).await;
        ledger.append(LogEntry::info("a").with_node("n1")).await;
        ledger.append(LogEntry::info("no node")).await;
        assert_eq!(ledger.last_node_id(), Some("n1"));
    }
}
