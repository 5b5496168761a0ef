//! SurrealDB-backed RunLedger implementation
//!
//! Uses `schema::RunRow` for persistence, converting to/from
//! `storage_traits` types at the boundary.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use surrealdb::sql::Datetime as SurrealDatetime;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::handle::SurrealHandle;
use crate::schema::RunRow;
use crate::storage_traits::{AgentRun, NewAgentRun, RunFilter, RunId, RunLedger, StorageResult};

/// SurrealDB-backed implementation of [`RunLedger`].
pub struct SurrealRunLedger {
    handle: Arc<SurrealHandle>,
}

impl SurrealRunLedger {
    pub fn new(handle: Arc<SurrealHandle>) -> Self {
        Self { handle }
    }

    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> crate::Result<Self> {
        let handle = SurrealHandle::setup_db().await?;
        Ok(Self::new(Arc::new(handle)))
    }

    async fn fetch_run(&self, run_id: RunId) -> StorageResult<Option<RunRow>> {
        let mut response = self
            .handle
            .db()
            .query("SELECT * FROM agent_runs WHERE agent_run_id = $id LIMIT 1")
            .bind(("id", run_id.0))
            .await?;
        let rows: Vec<RunRow> = response.take(0)?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl RunLedger for SurrealRunLedger {
    async fn create_run(&self, run: NewAgentRun) -> StorageResult<AgentRun> {
        run.validate()?;
        let id = self.handle.next_id("agent_runs").await?;
        let row = RunRow::from_new(id, &run, Utc::now())?;

        let created: Option<RunRow> = self.handle.db().create("agent_runs").content(row).await?;
        if created.is_none() {
            return Err(StorageError::Backend(format!(
                "insert of agent run {id} returned no row"
            )));
        }

        let stored = self
            .fetch_run(RunId(id))
            .await?
            .ok_or_else(|| StorageError::not_found("agent run", id))?
            .into_domain()?;
        info!(
            run_id = id,
            project_id = stored.project_id,
            status = %stored.run_status,
            "agent run recorded"
        );
        Ok(stored)
    }

    async fn get_run(&self, run_id: RunId) -> StorageResult<AgentRun> {
        self.fetch_run(run_id)
            .await?
            .ok_or_else(|| StorageError::not_found("agent run", run_id))?
            .into_domain()
    }

    async fn list_runs(&self, filter: &RunFilter) -> StorageResult<Vec<AgentRun>> {
        filter.validate()?;

        let mut clauses = Vec::new();
        if filter.project_scope.is_some() {
            clauses.push("project_id IN $scope");
        }
        if filter.project_id.is_some() {
            clauses.push("project_id = $project_id");
        }
        if filter.agent_id.is_some() {
            clauses.push("agent_id = $agent_id");
        }
        if filter.run_status.is_some() {
            clauses.push("run_status = $run_status");
        }
        if filter.created_since.is_some() {
            clauses.push("created_at >= $since");
        }
        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT * FROM agent_runs {where_clause} ORDER BY agent_run_id DESC LIMIT {} START {}",
            filter.limit, filter.offset
        );
        debug!(%sql, "listing agent runs");

        let mut query = self.handle.db().query(sql);
        if let Some(scope) = &filter.project_scope {
            query = query.bind(("scope", scope.clone()));
        }
        if let Some(project_id) = filter.project_id {
            query = query.bind(("project_id", project_id));
        }
        if let Some(agent_id) = filter.agent_id {
            query = query.bind(("agent_id", agent_id));
        }
        if let Some(status) = filter.run_status {
            query = query.bind(("run_status", status.as_str().to_string()));
        }
        if let Some(since) = filter.created_since {
            query = query.bind(("since", SurrealDatetime::from(since)));
        }

        let mut response = query.await?;
        let rows: Vec<RunRow> = response.take(0)?;
        rows.into_iter().map(RunRow::into_domain).collect()
    }
}
