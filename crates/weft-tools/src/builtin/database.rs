use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, InterruptHandle, OpenFlags};
use tracing::{debug, warn};

use weft_core::error::{Result, WeftError};
use weft_core::traits::ToolExecutor;
use weft_core::types::ToolInput;

use super::{resolve_under_root, tool_error};

const TOOL: &str = "Database";
const MAX_ROWS: usize = 1000;

/// Read-only SQL queries against a SQLite file below the file root.
pub struct DatabaseTool {
    root: PathBuf,
    timeout_secs: u64,
}

impl DatabaseTool {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            timeout_secs: 30,
        }
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// Interrupts the running query when the owning future is dropped before
/// the query finishes, so a timed-out call releases its blocking thread.
struct CancelOnDrop {
    handle: InterruptHandle,
    cancelled: Arc<AtomicBool>,
    armed: bool,
}

impl CancelOnDrop {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            warn!(tool = TOOL, "Query abandoned, interrupting");
            self.cancelled.store(true, Ordering::SeqCst);
            self.handle.interrupt();
        }
    }
}

fn is_read_only_query(query: &str) -> bool {
    let head = query
        .trim_start()
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or("")
        .to_ascii_uppercase();
    head == "SELECT" || head == "WITH"
}

fn column_value(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Value::from(f),
        ValueRef::Text(t) => serde_json::Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => serde_json::Value::String(
            b.iter().map(|byte| format!("{:02x}", byte)).collect(),
        ),
    }
}

fn open(path: &Path) -> Result<Connection> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| tool_error(TOOL, format!("{}: {}", path.display(), e)))
}

fn run_query(conn: Connection, query: &str, cancelled: &AtomicBool) -> Result<serde_json::Value> {
    let mut stmt = conn.prepare(query).map_err(|e| tool_error(TOOL, e))?;
    if !stmt.readonly() {
        return Err(WeftError::ToolValidation(
            "only read-only SELECT/WITH queries are allowed".into(),
        ));
    }

    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    if cancelled.load(Ordering::SeqCst) {
        return Err(tool_error(TOOL, "query cancelled"));
    }
    let mut rows = stmt.query([]).map_err(|e| tool_error(TOOL, e))?;

    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(|e| tool_error(TOOL, e))? {
        if out.len() >= MAX_ROWS || cancelled.load(Ordering::SeqCst) {
            break;
        }
        let mut obj = serde_json::Map::with_capacity(columns.len());
        for (i, name) in columns.iter().enumerate() {
            let value = row.get_ref(i).map_err(|e| tool_error(TOOL, e))?;
            obj.insert(name.clone(), column_value(value));
        }
        out.push(serde_json::Value::Object(obj));
    }
    Ok(serde_json::Value::Array(out))
}

impl ToolExecutor for DatabaseTool {
    fn tool_type(&self) -> &str {
        TOOL
    }

    fn description(&self) -> &str {
        "Run a read-only SQL query against a SQLite database and return rows as JSON."
    }

    fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    fn execute(&self, input: ToolInput) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let database = input
                .param_str("database")
                .ok_or_else(|| WeftError::ToolValidation("'database' parameter is required".into()))?;
            let path = resolve_under_root(&self.root, database)?;
            let query = input.param_or_result("query");
            if !is_read_only_query(&query) {
                return Err(WeftError::ToolValidation(
                    "only read-only SELECT/WITH queries are allowed".into(),
                ));
            }

            debug!(path = %path.display(), "Running database query");
            let conn = open(&path)?;
            let cancelled = Arc::new(AtomicBool::new(false));
            let guard = CancelOnDrop {
                handle: conn.get_interrupt_handle(),
                cancelled: cancelled.clone(),
                armed: true,
            };
            let result = tokio::task::spawn_blocking(move || run_query(conn, &query, &cancelled))
                .await
                .map_err(|e| tool_error(TOOL, e))?;
            guard.disarm();
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use weft_core::types::{Credentials, ExecutionContext};

    use crate::ToolRegistry;

    const ENDLESS: &str =
        "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) SELECT count(*) FROM c";

    fn seed(dir: &Path) {
        let conn = Connection::open(dir.join("shop.db")).unwrap();
        conn.execute_batch(
            "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT, price REAL);
             INSERT INTO items (name, price) VALUES ('apple', 1.5), ('pear', NULL);",
        )
        .unwrap();
    }

    fn input(params: serde_json::Value, result: Option<&str>) -> ToolInput {
        let mut ctx = ExecutionContext::new("x");
        if let Some(r) = result {
            ctx = ctx.with_result(serde_json::json!(r));
        }
        ToolInput {
            parameters: params,
            context: ctx,
            credentials: Credentials::new(),
        }
    }

    #[test]
    fn test_is_read_only_query() {
        assert!(is_read_only_query("  select * from t"));
        assert!(is_read_only_query("WITH x AS (SELECT 1) SELECT * FROM x"));
        assert!(!is_read_only_query("DELETE FROM t"));
        assert!(!is_read_only_query("selectx"));
    }

    #[tokio::test]
    async fn test_rows_as_json() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());
        let tool = DatabaseTool::new(dir.path().to_path_buf());
        let rows = tool
            .execute(input(
                serde_json::json!({ "database": "shop.db", "query": "SELECT name, price FROM items ORDER BY id" }),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(
            rows,
            serde_json::json!([
                { "name": "apple", "price": 1.5 },
                { "name": "pear", "price": null }
            ])
        );
    }

    #[tokio::test]
    async fn test_query_falls_back_to_result() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());
        let tool = DatabaseTool::new(dir.path().to_path_buf());
        let rows = tool
            .execute(input(
                serde_json::json!({ "database": "shop.db" }),
                Some("SELECT COUNT(*) AS n FROM items"),
            ))
            .await
            .unwrap();
        assert_eq!(rows, serde_json::json!([{ "n": 2 }]));
    }

    #[tokio::test]
    async fn test_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());
        let tool = DatabaseTool::new(dir.path().to_path_buf());
        let err = tool
            .execute(input(
                serde_json::json!({ "database": "shop.db", "query": "DROP TABLE items" }),
                None,
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, WeftError::ToolValidation(_)));
    }

    #[test]
    fn test_timed_out_query_releases_blocking_thread() {
        // One blocking thread: a query left running would starve the next call.
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .max_blocking_threads(1)
            .build()
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());

        rt.block_on(async {
            let mut registry = ToolRegistry::new();
            registry.register(DatabaseTool::new(dir.path().to_path_buf()).with_timeout_secs(1));

            let err = registry
                .invoke(
                    "Database",
                    input(serde_json::json!({ "database": "shop.db", "query": ENDLESS }), None),
                )
                .await
                .unwrap_err();
            assert!(matches!(err, WeftError::ToolTimeout { timeout_secs: 1, .. }));

            let rows = tokio::time::timeout(
                Duration::from_secs(5),
                registry.invoke(
                    "Database",
                    input(
                        serde_json::json!({ "database": "shop.db", "query": "SELECT COUNT(*) AS n FROM items" }),
                        None,
                    ),
                ),
            )
            .await
            .expect("blocking thread still held by the abandoned query")
            .unwrap();
            assert_eq!(rows, serde_json::json!([{ "n": 2 }]));
        });
    }
}
