use futures::future::BoxFuture;
use rusqlite::{params, OptionalExtension};

use weft_core::error::Result;
use weft_core::execution::now_millis;
use weft_core::traits::{CredentialStore, WorkflowStore};
use weft_core::types::Credentials;
use weft_core::workflow::{Workflow, WorkflowStatus};

use crate::store::{db_err, format_ts, parse_ts, SqliteStore};

const WORKFLOW_COLUMNS: &str =
    "id, owner_id, name, description, status, nodes, edges, settings, created_at, updated_at";

type WorkflowRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
);

fn workflow_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<WorkflowRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
    ))
}

fn into_workflow(row: WorkflowRow) -> Result<Workflow> {
    let (id, owner_id, name, description, status, nodes, edges, settings, created, updated) = row;
    Ok(Workflow {
        id,
        owner_id,
        name,
        description,
        status: WorkflowStatus::parse(&status),
        nodes: serde_json::from_str(&nodes)?,
        edges: serde_json::from_str(&edges)?,
        settings: serde_json::from_str(&settings)?,
        created_at: parse_ts(&created)?,
        updated_at: parse_ts(&updated)?,
    })
}

impl WorkflowStore for SqliteStore {
    fn get_workflow(&self, id: &str, owner_id: &str) -> BoxFuture<'_, Result<Option<Workflow>>> {
        let id = id.to_string();
        let owner_id = owner_id.to_string();
        Box::pin(async move {
            let conn = self.conn()?;
            let row = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM workflows WHERE id = ?1 AND owner_id = ?2",
                        WORKFLOW_COLUMNS
                    ),
                    params![id, owner_id],
                    workflow_row,
                )
                .optional()
                .map_err(db_err)?;
            row.map(into_workflow).transpose()
        })
    }

    fn save_workflow(&self, workflow: &Workflow) -> BoxFuture<'_, Result<()>> {
        let workflow = workflow.clone();
        Box::pin(async move {
            let nodes = serde_json::to_string(&workflow.nodes)?;
            let edges = serde_json::to_string(&workflow.edges)?;
            let settings = serde_json::to_string(&workflow.settings)?;
            let conn = self.conn()?;
            conn.execute(
                "INSERT INTO workflows (id, owner_id, name, description, status, nodes, edges, settings, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(id) DO UPDATE SET
                    owner_id = excluded.owner_id,
                    name = excluded.name,
                    description = excluded.description,
                    status = excluded.status,
                    nodes = excluded.nodes,
                    edges = excluded.edges,
                    settings = excluded.settings,
                    updated_at = excluded.updated_at",
                params![
                    workflow.id,
                    workflow.owner_id,
                    workflow.name,
                    workflow.description,
                    workflow.status.as_str(),
                    nodes,
                    edges,
                    settings,
                    format_ts(&workflow.created_at),
                    format_ts(&workflow.updated_at),
                ],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }

    fn list_workflows(&self, owner_id: &str) -> BoxFuture<'_, Result<Vec<Workflow>>> {
        let owner_id = owner_id.to_string();
        Box::pin(async move {
            let conn = self.conn()?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM workflows WHERE owner_id = ?1 ORDER BY updated_at DESC",
                    WORKFLOW_COLUMNS
                ))
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![owner_id], workflow_row)
                .map_err(db_err)?;

            let mut workflows = Vec::new();
            for row in rows {
                workflows.push(into_workflow(row.map_err(db_err)?)?);
            }
            Ok(workflows)
        })
    }

    fn delete_workflow(&self, id: &str, owner_id: &str) -> BoxFuture<'_, Result<bool>> {
        let id = id.to_string();
        let owner_id = owner_id.to_string();
        Box::pin(async move {
            let conn = self.conn()?;
            let deleted = conn
                .execute(
                    "DELETE FROM workflows WHERE id = ?1 AND owner_id = ?2",
                    params![id, owner_id],
                )
                .map_err(db_err)?;
            Ok(deleted > 0)
        })
    }
}

impl CredentialStore for SqliteStore {
    fn credentials(&self, owner_id: &str) -> BoxFuture<'_, Result<Credentials>> {
        let owner_id = owner_id.to_string();
        Box::pin(async move {
            let conn = self.conn()?;
            let mut stmt = conn
                .prepare("SELECT provider, secret FROM credentials WHERE owner_id = ?1")
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![owner_id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(db_err)?;

            let mut credentials = Credentials::new();
            for row in rows {
                let (provider, secret) = row.map_err(db_err)?;
                credentials.insert(provider, secret);
            }
            Ok(credentials)
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
            let conn = self.conn()?;
            conn.execute(
                "INSERT INTO credentials (owner_id, provider, secret, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(owner_id, provider) DO UPDATE SET
                    secret = excluded.secret,
                    updated_at = excluded.updated_at",
                params![owner_id, provider, secret, format_ts(&now_millis())],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }
}
