use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current UTC time at millisecond precision.
///
/// Stored records keep milliseconds, so durations computed from these
/// timestamps survive a store round-trip exactly.
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Unique execution identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(pub String);

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Execution status. `Running` is the only non-terminal state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Running" => Some(Self::Running),
            "Completed" => Some(Self::Completed),
            "Failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "warning" => Self::Warning,
            "error" => Self::Error,
            _ => Self::Info,
        }
    }
}

/// One entry in an execution's append-only audit log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: now_millis(),
            level,
            message: message.into(),
            node_id: None,
            data: None,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }

    pub fn with_node(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Prompt/completion/total token counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt: u64,
    pub completion: u64,
    pub total: u64,
}

impl TokenUsage {
    pub fn new(prompt: u64, completion: u64, total: u64) -> Self {
        Self {
            prompt,
            completion,
            total,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.prompt == 0 && self.completion == 0 && self.total == 0
    }
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, other: Self) {
        self.prompt = self.prompt.saturating_add(other.prompt);
        self.completion = self.completion.saturating_add(other.completion);
        self.total = self.total.saturating_add(other.total);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMetrics {
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Milliseconds between start and end.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
}

impl ExecutionMetrics {
    pub fn started_at(start_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            end_time: None,
            duration: None,
            token_usage: None,
            cost: None,
        }
    }

    /// Stamp the end time and derive the duration from it.
    pub fn finish(&mut self, end_time: DateTime<Utc>) {
        self.end_time = Some(end_time);
        self.duration = Some((end_time - self.start_time).num_milliseconds());
    }
}

/// The durable record of one workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub id: ExecutionId,
    pub workflow_id: String,
    pub user_id: String,
    pub status: ExecutionStatus,
    pub input: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    pub metrics: ExecutionMetrics,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Execution {
    /// A fresh `Running` record with no logs.
    pub fn start(
        workflow_id: impl Into<String>,
        user_id: impl Into<String>,
        input: impl Into<String>,
    ) -> Self {
        let now = now_millis();
        Self {
            id: ExecutionId::new(),
            workflow_id: workflow_id.into(),
            user_id: user_id.into(),
            status: ExecutionStatus::Running,
            input: input.into(),
            output: None,
            logs: vec![],
            metrics: ExecutionMetrics::started_at(now),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn error_logs(&self) -> impl Iterator<Item = &LogEntry> {
        self.logs.iter().filter(|l| l.level == LogLevel::Error)
    }
}

/// Terminal fields written once when an execution closes.
#[derive(Debug, Clone)]
pub struct ExecutionUpdate {
    pub status: ExecutionStatus,
    pub output: Option<String>,
    pub metrics: ExecutionMetrics,
}

/// Aggregated execution counters for one UTC day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DailyMetrics {
    pub date: NaiveDate,
    pub count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_duration_ms: Option<f64>,
    pub total_tokens: u64,
}

/// First UTC day covered by a `days`-long metrics window ending today.
pub fn metrics_window_start(days: u32) -> NaiveDate {
    let today = Utc::now().date_naive();
    today - chrono::Duration::days(i64::from(days.max(1)) - 1)
}

/// Group executions by UTC creation day, oldest day first. Days with no
/// executions are omitted.
pub fn summarize_daily<'a>(executions: impl IntoIterator<Item = &'a Execution>) -> Vec<DailyMetrics> {
    let mut days: std::collections::BTreeMap<NaiveDate, (DailyMetrics, i64, u64)> =
        std::collections::BTreeMap::new();

    for exec in executions {
        let date = exec.created_at.date_naive();
        let (day, duration_sum, with_duration) = days.entry(date).or_insert_with(|| {
            (
                DailyMetrics {
                    date,
                    count: 0,
                    success_count: 0,
                    failure_count: 0,
                    avg_duration_ms: None,
                    total_tokens: 0,
                },
                0,
                0,
            )
        });
        day.count += 1;
        match exec.status {
            ExecutionStatus::Completed => day.success_count += 1,
            ExecutionStatus::Failed => day.failure_count += 1,
            ExecutionStatus::Running => {}
        }
        if let Some(d) = exec.metrics.duration {
            *duration_sum += d;
            *with_duration += 1;
        }
        if let Some(usage) = exec.metrics.token_usage {
            day.total_tokens = day.total_tokens.saturating_add(usage.total);
        }
    }

    days.into_values()
        .map(|(mut day, sum, n)| {
            if n > 0 {
                day.avg_duration_ms = Some(sum as f64 / n as f64);
            }
            day
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_is_running_without_end() {
        let exec = Execution::start("wf", "user", "hello");
        assert_eq!(exec.status, ExecutionStatus::Running);
        assert!(!exec.status.is_terminal());
        assert!(exec.metrics.end_time.is_none());
        assert!(exec.logs.is_empty());
    }

    #[test]
    fn test_finish_duration_is_exact() {
        let mut metrics = ExecutionMetrics::started_at(now_millis());
        let end = metrics.start_time + chrono::Duration::milliseconds(1234);
        metrics.finish(end);
        assert_eq!(metrics.duration, Some(1234));
        assert_eq!(
            metrics.duration.unwrap(),
            (metrics.end_time.unwrap() - metrics.start_time).num_milliseconds()
        );
    }

    #[test]
    fn test_token_usage_accumulates() {
        let mut total = TokenUsage::default();
        total += TokenUsage::new(10, 5, 15);
        total += TokenUsage::new(1, 2, 3);
        assert_eq!(total, TokenUsage::new(11, 7, 18));
        assert!(!total.is_empty());
    }

    #[test]
    fn test_summarize_daily() {
        let mut ok = Execution::start("wf", "u", "a");
        ok.status = ExecutionStatus::Completed;
        ok.metrics.duration = Some(100);
        ok.metrics.token_usage = Some(TokenUsage::new(5, 5, 10));
        let mut bad = Execution::start("wf", "u", "b");
        bad.status = ExecutionStatus::Failed;
        bad.metrics.duration = Some(300);
        let running = Execution::start("wf", "u", "c");

        let days = summarize_daily([&ok, &bad, &running]);
        assert_eq!(days.len(), 1);
        let day = &days[0];
        assert_eq!(day.count, 3);
        assert_eq!(day.success_count, 1);
        assert_eq!(day.failure_count, 1);
        assert_eq!(day.avg_duration_ms, Some(200.0));
        assert_eq!(day.total_tokens, 10);
    }

    #[test]
    fn test_metrics_window_start() {
        assert_eq!(metrics_window_start(1), Utc::now().date_naive());
        assert_eq!(
            metrics_window_start(7),
            Utc::now().date_naive() - chrono::Duration::days(6)
        );
    }

    #[test]
    fn test_serialized_shape() {
        let mut exec = Execution::start("wf", "user", "hi");
        exec.logs
            .push(LogEntry::warning("careful").with_node("c1"));
        let json = serde_json::to_value(&exec).unwrap();
        assert_eq!(json["status"], "Running");
        assert_eq!(json["workflowId"], "wf");
        assert_eq!(json["logs"][0]["level"], "warning");
        assert_eq!(json["logs"][0]["nodeId"], "c1");
        assert!(json["metrics"]["startTime"].is_string());
        assert!(json.get("output").is_none());
    }
}
