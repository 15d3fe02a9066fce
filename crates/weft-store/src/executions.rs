use chrono::NaiveDate;
use futures::future::BoxFuture;
use rusqlite::{params, Connection, OptionalExtension};

use weft_core::error::{Result, WeftError};
use weft_core::execution::{
    metrics_window_start, DailyMetrics, Execution, ExecutionId, ExecutionMetrics,
    ExecutionStatus, ExecutionUpdate, LogEntry, LogLevel, TokenUsage,
};
use weft_core::traits::ExecutionStore;

use crate::store::{db_err, format_ts, parse_ts, SqliteStore};

const EXECUTION_COLUMNS: &str = "id, workflow_id, user_id, status, input, output, start_time, \
     end_time, duration_ms, prompt_tokens, completion_tokens, total_tokens, cost, created_at, updated_at";

/// Raw `executions` row, converted after the statement is done.
struct ExecutionRow {
    id: String,
    workflow_id: String,
    user_id: String,
    status: String,
    input: String,
    output: Option<String>,
    start_time: String,
    end_time: Option<String>,
    duration_ms: Option<i64>,
    prompt_tokens: Option<i64>,
    completion_tokens: Option<i64>,
    total_tokens: Option<i64>,
    cost: Option<f64>,
    created_at: String,
    updated_at: String,
}

impl ExecutionRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            workflow_id: row.get(1)?,
            user_id: row.get(2)?,
            status: row.get(3)?,
            input: row.get(4)?,
            output: row.get(5)?,
            start_time: row.get(6)?,
            end_time: row.get(7)?,
            duration_ms: row.get(8)?,
            prompt_tokens: row.get(9)?,
            completion_tokens: row.get(10)?,
            total_tokens: row.get(11)?,
            cost: row.get(12)?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
        })
    }

    fn into_execution(self, logs: Vec<LogEntry>) -> Result<Execution> {
        let status = ExecutionStatus::parse(&self.status).ok_or_else(|| {
            WeftError::Database(format!("Unknown execution status '{}'", self.status))
        })?;
        let token_usage = match (self.prompt_tokens, self.completion_tokens, self.total_tokens) {
            (Some(p), Some(c), Some(t)) => {
                Some(TokenUsage::new(stored_count(p)?, stored_count(c)?, stored_count(t)?))
            }
            _ => None,
        };
        Ok(Execution {
            id: ExecutionId::from_string(&self.id),
            workflow_id: self.workflow_id,
            user_id: self.user_id,
            status,
            input: self.input,
            output: self.output,
            logs,
            metrics: ExecutionMetrics {
                start_time: parse_ts(&self.start_time)?,
                end_time: self.end_time.as_deref().map(parse_ts).transpose()?,
                duration: self.duration_ms,
                token_usage,
                cost: self.cost,
            },
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

/// Token counts are INTEGER columns; values outside `i64` are rejected rather than wrapped.
fn column_count(n: u64) -> Result<i64> {
    i64::try_from(n).map_err(|_| WeftError::Database(format!("Token count {} out of range", n)))
}

fn stored_count(n: i64) -> Result<u64> {
    u64::try_from(n).map_err(|_| WeftError::Database(format!("Negative token count {}", n)))
}

/// Status of an execution row, if it exists.
fn current_status(conn: &Connection, id: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT status FROM executions WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )
    .optional()
    .map_err(db_err)
}

/// Error for a write that matched no open execution row.
fn closed_or_missing(conn: &Connection, id: String) -> WeftError {
    match current_status(conn, &id) {
        Ok(Some(_)) => WeftError::ExecutionClosed(id),
        Ok(None) => WeftError::ExecutionNotFound(id),
        Err(e) => e,
    }
}

fn load_logs(conn: &Connection, execution_id: &str) -> Result<Vec<LogEntry>> {
    let mut stmt = conn
        .prepare(
            "SELECT timestamp, level, message, node_id, data FROM execution_logs
             WHERE execution_id = ?1
             ORDER BY seq ASC",
        )
        .map_err(db_err)?;

    let rows = stmt
        .query_map(params![execution_id], |row| {
            let timestamp: String = row.get(0)?;
            let level: String = row.get(1)?;
            let message: String = row.get(2)?;
            let node_id: Option<String> = row.get(3)?;
            let data: Option<String> = row.get(4)?;
            Ok((timestamp, level, message, node_id, data))
        })
        .map_err(db_err)?;

    let mut logs = Vec::new();
    for row in rows {
        let (timestamp, level, message, node_id, data) = row.map_err(db_err)?;
        logs.push(LogEntry {
            timestamp: parse_ts(&timestamp)?,
            level: LogLevel::parse(&level),
            message,
            node_id,
            data: data.as_deref().map(|d| serde_json::from_str(d)).transpose()?,
        });
    }
    Ok(logs)
}

fn with_logs(conn: &Connection, rows: Vec<ExecutionRow>) -> Result<Vec<Execution>> {
    rows.into_iter()
        .map(|row| {
            let logs = load_logs(conn, &row.id)?;
            row.into_execution(logs)
        })
        .collect()
}

impl ExecutionStore for SqliteStore {
    fn create(&self, execution: &Execution) -> BoxFuture<'_, Result<ExecutionId>> {
        let execution = execution.clone();
        Box::pin(async move {
            let conn = self.conn()?;
            conn.execute(
                "INSERT INTO executions (id, workflow_id, user_id, status, input, start_time, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    execution.id.0,
                    execution.workflow_id,
                    execution.user_id,
                    execution.status.as_str(),
                    execution.input,
                    format_ts(&execution.metrics.start_time),
                    format_ts(&execution.created_at),
                    format_ts(&execution.updated_at),
                ],
            )
            .map_err(db_err)?;
            Ok(execution.id)
        })
    }

    fn append_log(&self, id: &ExecutionId, entry: &LogEntry) -> BoxFuture<'_, Result<()>> {
        let id = id.0.clone();
        let entry = entry.clone();
        Box::pin(async move {
            let data = entry.data.as_ref().map(|d| serde_json::to_string(d)).transpose()?;
            let timestamp = format_ts(&entry.timestamp);
            let conn = self.conn()?;
            let inserted = conn
                .execute(
                    "INSERT INTO execution_logs (execution_id, timestamp, level, message, node_id, data)
                     SELECT ?1, ?2, ?3, ?4, ?5, ?6
                     WHERE EXISTS (SELECT 1 FROM executions WHERE id = ?1 AND status = 'Running')",
                    params![
                        id,
                        timestamp,
                        entry.level.as_str(),
                        entry.message,
                        entry.node_id,
                        data,
                    ],
                )
                .map_err(db_err)?;
            if inserted == 0 {
                return Err(closed_or_missing(&conn, id));
            }
            conn.execute(
                "UPDATE executions SET updated_at = ?2 WHERE id = ?1",
                params![id, timestamp],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }

    fn update(&self, id: &ExecutionId, update: &ExecutionUpdate) -> BoxFuture<'_, Result<()>> {
        let id = id.0.clone();
        let update = update.clone();
        Box::pin(async move {
            let m = &update.metrics;
            let usage = match m.token_usage {
                Some(u) => Some((
                    column_count(u.prompt)?,
                    column_count(u.completion)?,
                    column_count(u.total)?,
                )),
                None => None,
            };
            let updated_at = m.end_time.unwrap_or_else(weft_core::execution::now_millis);
            let conn = self.conn()?;
            let changed = conn
                .execute(
                    "UPDATE executions SET
                        status = ?2, output = ?3, end_time = ?4, duration_ms = ?5,
                        prompt_tokens = ?6, completion_tokens = ?7, total_tokens = ?8,
                        cost = ?9, updated_at = ?10
                     WHERE id = ?1 AND status = 'Running'",
                    params![
                        id,
                        update.status.as_str(),
                        update.output,
                        m.end_time.as_ref().map(format_ts),
                        m.duration,
                        usage.map(|u| u.0),
                        usage.map(|u| u.1),
                        usage.map(|u| u.2),
                        m.cost,
                        format_ts(&updated_at),
                    ],
                )
                .map_err(db_err)?;
            if changed == 0 {
                return Err(closed_or_missing(&conn, id));
            }
            Ok(())
        })
    }

    fn get(&self, id: &ExecutionId, owner_id: &str) -> BoxFuture<'_, Result<Option<Execution>>> {
        let id = id.0.clone();
        let owner_id = owner_id.to_string();
        Box::pin(async move {
            let conn = self.conn()?;
            let row = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM executions WHERE id = ?1 AND user_id = ?2",
                        EXECUTION_COLUMNS
                    ),
                    params![id, owner_id],
                    ExecutionRow::from_row,
                )
                .optional()
                .map_err(db_err)?;

            match row {
                Some(row) => {
                    let logs = load_logs(&conn, &row.id)?;
                    Ok(Some(row.into_execution(logs)?))
                }
                None => Ok(None),
            }
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
            let conn = self.conn()?;
            let rows = {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {} FROM executions
                         WHERE user_id = ?1 AND (?2 IS NULL OR workflow_id = ?2)
                         ORDER BY created_at DESC, rowid DESC
                         LIMIT ?3",
                        EXECUTION_COLUMNS
                    ))
                    .map_err(db_err)?;
                let mapped = stmt
                    .query_map(
                        params![owner_id, workflow_id, limit as i64],
                        ExecutionRow::from_row,
                    )
                    .map_err(db_err)?;
                mapped
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(db_err)?
            };
            with_logs(&conn, rows)
        })
    }

    fn daily_metrics(&self, owner_id: &str, days: u32) -> BoxFuture<'_, Result<Vec<DailyMetrics>>> {
        let owner_id = owner_id.to_string();
        Box::pin(async move {
            let since = metrics_window_start(days).format("%Y-%m-%d").to_string();
            let conn = self.conn()?;
            let mut stmt = conn
                .prepare(
                    "SELECT substr(created_at, 1, 10) AS day,
                            COUNT(*),
                            SUM(CASE WHEN status = 'Completed' THEN 1 ELSE 0 END),
                            SUM(CASE WHEN status = 'Failed' THEN 1 ELSE 0 END),
                            AVG(duration_ms),
                            COALESCE(SUM(total_tokens), 0)
                     FROM executions
                     WHERE user_id = ?1 AND substr(created_at, 1, 10) >= ?2
                     GROUP BY day
                     ORDER BY day ASC",
                )
                .map_err(db_err)?;

            let rows = stmt
                .query_map(params![owner_id, since], |row| {
                    let day: String = row.get(0)?;
                    let count: i64 = row.get(1)?;
                    let success: i64 = row.get(2)?;
                    let failure: i64 = row.get(3)?;
                    let avg: Option<f64> = row.get(4)?;
                    let tokens: i64 = row.get(5)?;
                    Ok((day, count, success, failure, avg, tokens))
                })
                .map_err(db_err)?;

            let mut metrics = Vec::new();
            for row in rows {
                let (day, count, success, failure, avg, tokens) = row.map_err(db_err)?;
                let date = NaiveDate::parse_from_str(&day, "%Y-%m-%d")
                    .map_err(|e| WeftError::Database(format!("Invalid day '{}': {}", day, e)))?;
                metrics.push(DailyMetrics {
                    date,
                    count: count as u64,
                    success_count: success as u64,
                    failure_count: failure as u64,
                    avg_duration_ms: avg,
                    total_tokens: stored_count(tokens)?,
                });
            }
            Ok(metrics)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use weft_core::execution::now_millis;

    fn store() -> SqliteStore {
        SqliteStore::in_memory().unwrap()
    }

    async fn finished(store: &SqliteStore, user: &str, workflow: &str, ok: bool) -> ExecutionId {
        let exec = Execution::start(workflow, user, "input");
        let id = store.create(&exec).await.unwrap();
        let mut metrics = exec.metrics.clone();
        metrics.finish(now_millis());
        if ok {
            metrics.token_usage = Some(TokenUsage::new(10, 5, 15));
            metrics.cost = Some(0.00025);
        }
        let update = ExecutionUpdate {
            status: if ok {
                ExecutionStatus::Completed
            } else {
                ExecutionStatus::Failed
            },
            output: ok.then(|| "done".to_string()),
            metrics,
        };
        store.update(&id, &update).await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_logs_read_back_in_order() {
        let store = store();
        let exec = Execution::start("wf", "u1", "hello");
        let id = store.create(&exec).await.unwrap();

        let entries = vec![
            LogEntry::info("Executing node: Input").with_node("in"),
            LogEntry::warning("Condition evaluation failed").with_data(json!({ "condition": "x >" })),
            LogEntry::error("Execution error: boom").with_node("in"),
        ];
        for e in &entries {
            store.append_log(&id, e).await.unwrap();
        }

        let loaded = store.get(&id, "u1").await.unwrap().unwrap();
        assert_eq!(loaded.logs, entries);
        assert_eq!(loaded.status, ExecutionStatus::Running);
        assert_eq!(loaded.metrics.start_time, exec.metrics.start_time);
    }

    #[tokio::test]
    async fn test_update_roundtrip() {
        let store = store();
        let id = finished(&store, "u1", "wf", true).await;
        let loaded = store.get(&id, "u1").await.unwrap().unwrap();

        assert_eq!(loaded.status, ExecutionStatus::Completed);
        assert_eq!(loaded.output.as_deref(), Some("done"));
        let m = &loaded.metrics;
        assert_eq!(
            m.duration,
            Some((m.end_time.unwrap() - m.start_time).num_milliseconds())
        );
        assert_eq!(m.token_usage, Some(TokenUsage::new(10, 5, 15)));
        assert_eq!(m.cost, Some(0.00025));
    }

    #[tokio::test]
    async fn test_get_is_owner_scoped() {
        let store = store();
        let id = finished(&store, "u1", "wf", true).await;
        assert!(store.get(&id, "u2").await.unwrap().is_none());
        assert!(store
            .get(&ExecutionId::from_string("missing"), "u1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_update_unknown_execution() {
        let store = store();
        let update = ExecutionUpdate {
            status: ExecutionStatus::Failed,
            output: None,
            metrics: ExecutionMetrics::started_at(now_millis()),
        };
        let err = store
            .update(&ExecutionId::from_string("ghost"), &update)
            .await
            .unwrap_err();
        assert!(matches!(err, WeftError::ExecutionNotFound(_)));
    }

    #[tokio::test]
    async fn test_append_to_unknown_execution_fails() {
        let store = store();
        let err = store
            .append_log(&ExecutionId::from_string("ghost"), &LogEntry::info("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, WeftError::ExecutionNotFound(_)));
    }

    #[tokio::test]
    async fn test_closed_execution_rejects_writes() {
        let store = store();
        let id = finished(&store, "u1", "wf", true).await;

        let err = store
            .append_log(&id, &LogEntry::info("late entry"))
            .await
            .unwrap_err();
        assert!(matches!(err, WeftError::ExecutionClosed(_)));

        let update = ExecutionUpdate {
            status: ExecutionStatus::Failed,
            output: None,
            metrics: ExecutionMetrics::started_at(now_millis()),
        };
        let err = store.update(&id, &update).await.unwrap_err();
        assert!(matches!(err, WeftError::ExecutionClosed(_)));

        let loaded = store.get(&id, "u1").await.unwrap().unwrap();
        assert_eq!(loaded.status, ExecutionStatus::Completed);
        assert_eq!(loaded.output.as_deref(), Some("done"));
        assert!(loaded.logs.is_empty());
    }

    #[tokio::test]
    async fn test_token_counts_out_of_range() {
        let store = store();
        let exec = Execution::start("wf", "u1", "input");
        let id = store.create(&exec).await.unwrap();

        let mut metrics = exec.metrics.clone();
        metrics.finish(now_millis());
        metrics.token_usage = Some(TokenUsage::new(u64::MAX, 0, u64::MAX));
        let update = ExecutionUpdate {
            status: ExecutionStatus::Completed,
            output: Some("done".into()),
            metrics,
        };
        let err = store.update(&id, &update).await.unwrap_err();
        assert!(matches!(err, WeftError::Database(_)));
        assert_eq!(
            store.get(&id, "u1").await.unwrap().unwrap().status,
            ExecutionStatus::Running
        );

        // A corrupt negative count is reported instead of wrapping.
        store
            .conn()
            .unwrap()
            .execute(
                "UPDATE executions SET prompt_tokens = -1, completion_tokens = 0, total_tokens = 0
                 WHERE id = ?1",
                params![id.0],
            )
            .unwrap();
        let err = store.get(&id, "u1").await.unwrap_err();
        assert!(err.to_string().contains("Negative token count"), "{err}");
    }

    #[tokio::test]
    async fn test_list_newest_first_with_filter() {
        let store = store();
        let first = finished(&store, "u1", "wf-a", true).await;
        let second = finished(&store, "u1", "wf-b", false).await;
        let third = finished(&store, "u1", "wf-a", true).await;
        finished(&store, "u2", "wf-a", true).await;

        let all = store.list("u1", None, 20).await.unwrap();
        let ids: Vec<_> = all.iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids, vec![third.clone(), second, first.clone()]);

        let only_a = store.list("u1", Some("wf-a"), 20).await.unwrap();
        assert_eq!(only_a.len(), 2);

        let limited = store.list("u1", None, 1).await.unwrap();
        assert_eq!(limited[0].id, third);
    }

    #[tokio::test]
    async fn test_daily_metrics() {
        let store = store();
        finished(&store, "u1", "wf", true).await;
        finished(&store, "u1", "wf", true).await;
        finished(&store, "u1", "wf", false).await;
        store
            .create(&Execution::start("wf", "u1", "still running"))
            .await
            .unwrap();

        let metrics = store.daily_metrics("u1", 7).await.unwrap();
        assert_eq!(metrics.len(), 1);
        let today = &metrics[0];
        assert_eq!(today.date, chrono::Utc::now().date_naive());
        assert_eq!(today.count, 4);
        assert_eq!(today.success_count, 2);
        assert_eq!(today.failure_count, 1);
        assert_eq!(today.total_tokens, 30);
        assert!(today.avg_duration_ms.is_some());

        assert!(store.daily_metrics("u2", 7).await.unwrap().is_empty());
    }
}
