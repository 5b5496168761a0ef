//! SurrealDB-backed AgentDirectory implementation

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use crate::error::StorageError;
use crate::handle::SurrealHandle;
use crate::schema::{AgentRow, AssignmentRow};
use crate::storage_traits::*;
use crate::vocab::AssignmentStatus;

/// SurrealDB-backed implementation of [`AgentDirectory`].
pub struct SurrealAgentDirectory {
    handle: Arc<SurrealHandle>,
}

impl SurrealAgentDirectory {
    pub fn new(handle: Arc<SurrealHandle>) -> Self {
        Self { handle }
    }

    async fn fetch_agent(&self, agent_id: i64) -> StorageResult<Option<Agent>> {
        let mut response = self
            .handle
            .db()
            .query("SELECT * FROM agent_catalog WHERE agent_id = $id LIMIT 1")
            .bind(("id", agent_id))
            .await?;
        let rows: Vec<AgentRow> = response.take(0)?;
        rows.into_iter().next().map(AgentRow::into_domain).transpose()
    }

    async fn fetch_assignment(&self, assignment_id: i64) -> StorageResult<Option<Assignment>> {
        let mut response = self
            .handle
            .db()
            .query(
                "SELECT * FROM project_agent_assignments \
                 WHERE project_agent_assignment_id = $id LIMIT 1",
            )
            .bind(("id", assignment_id))
            .await?;
        let rows: Vec<AssignmentRow> = response.take(0)?;
        rows.into_iter()
            .next()
            .map(AssignmentRow::into_domain)
            .transpose()
    }

    async fn active_agent_ids(&self) -> StorageResult<Vec<i64>> {
        let mut response = self
            .handle
            .db()
            .query("SELECT VALUE agent_id FROM agent_catalog WHERE is_active = true")
            .await?;
        let mut ids: Vec<i64> = response.take(0)?;
        ids.sort_unstable();
        Ok(ids)
    }
}

#[async_trait]
impl AgentDirectory for SurrealAgentDirectory {
    async fn create_agent(&self, agent: NewAgent) -> StorageResult<Agent> {
        agent.validate()?;
        let id = self.handle.next_id("agent_catalog").await?;
        let now = Utc::now();
        let record = Agent {
            agent_id: id,
            agent_code: agent.agent_code,
            agent_name: agent.agent_name,
            module_name: agent.module_name,
            owner_team: agent.owner_team,
            default_model: agent.default_model,
            skill_ref: agent.skill_ref,
            is_active: agent.is_active,
            metadata: agent.metadata,
            created_at: now,
            updated_at: now,
        };
        let row = AgentRow::from_domain(&record)?;
        let _: Option<AgentRow> = self.handle.db().create("agent_catalog").content(row).await?;

        info!(agent_id = id, agent_code = %record.agent_code, "agent created");
        self.get_agent(id).await
    }

    async fn update_agent(&self, agent_id: i64, patch: AgentPatch) -> StorageResult<Agent> {
        patch.validate()?;
        let mut agent = self
            .fetch_agent(agent_id)
            .await?
            .ok_or_else(|| StorageError::not_found("agent", agent_id))?;
        patch.apply_to(&mut agent, Utc::now());
        let row = AgentRow::from_domain(&agent)?;

        let mut response = self
            .handle
            .db()
            .query("UPDATE agent_catalog CONTENT $row WHERE agent_id = $id RETURN AFTER")
            .bind(("row", row))
            .bind(("id", agent_id))
            .await?;
        let rows: Vec<AgentRow> = response.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::not_found("agent", agent_id))?
            .into_domain()
    }

    async fn get_agent(&self, agent_id: i64) -> StorageResult<Agent> {
        self.fetch_agent(agent_id)
            .await?
            .ok_or_else(|| StorageError::not_found("agent", agent_id))
    }

    async fn list_agents(&self, filter: &AgentFilter) -> StorageResult<Vec<Agent>> {
        let mut clauses = Vec::new();
        if filter.module_name.is_some() {
            clauses.push("module_name = $module_name");
        }
        if filter.is_active.is_some() {
            clauses.push("is_active = $is_active");
        }
        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!("SELECT * FROM agent_catalog {where_clause} ORDER BY agent_id DESC");

        let mut query = self.handle.db().query(sql);
        if let Some(module_name) = &filter.module_name {
            query = query.bind(("module_name", module_name.clone()));
        }
        if let Some(is_active) = filter.is_active {
            query = query.bind(("is_active", is_active));
        }
        let mut response = query.await?;
        let rows: Vec<AgentRow> = response.take(0)?;
        rows.into_iter().map(AgentRow::into_domain).collect()
    }

    async fn create_assignment(&self, assignment: NewAssignment) -> StorageResult<Assignment> {
        match self.fetch_agent(assignment.agent_id).await? {
            Some(agent) if agent.is_active => {}
            _ => {
                return Err(StorageError::Rejected(format!(
                    "agent {} not found or inactive",
                    assignment.agent_id
                )))
            }
        }

        // Compared here so that a missing stage id counts as a duplicate too.
        let existing = self
            .list_assignments(&AssignmentFilter {
                project_id: Some(assignment.project_id),
                agent_id: Some(assignment.agent_id),
                limit: MAX_PAGE_SIZE,
                ..AssignmentFilter::default()
            })
            .await?;
        if existing.iter().any(|a| a.stage_id == assignment.stage_id) {
            return Err(StorageError::Conflict(
                "assignment already exists for project, agent and stage".to_string(),
            ));
        }

        let id = self.handle.next_id("project_agent_assignments").await?;
        let row = AssignmentRow {
            project_agent_assignment_id: id,
            project_id: assignment.project_id,
            agent_id: assignment.agent_id,
            stage_id: assignment.stage_id,
            assignment_status: assignment.assignment_status.as_str().to_string(),
            assigned_at: Utc::now(),
            assigned_by_user_id: assignment.assigned_by_user_id,
        };
        let _: Option<AssignmentRow> = self
            .handle
            .db()
            .create("project_agent_assignments")
            .content(row)
            .await?;

        info!(
            assignment_id = id,
            project_id = assignment.project_id,
            agent_id = assignment.agent_id,
            "assignment created"
        );
        self.get_assignment(id).await
    }

    async fn update_assignment_status(
        &self,
        assignment_id: i64,
        status: AssignmentStatus,
    ) -> StorageResult<Assignment> {
        let mut response = self
            .handle
            .db()
            .query(
                "UPDATE project_agent_assignments SET assignment_status = $status \
                 WHERE project_agent_assignment_id = $id RETURN AFTER",
            )
            .bind(("status", status.as_str().to_string()))
            .bind(("id", assignment_id))
            .await?;
        let rows: Vec<AssignmentRow> = response.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::not_found("assignment", assignment_id))?
            .into_domain()
    }

    async fn get_assignment(&self, assignment_id: i64) -> StorageResult<Assignment> {
        self.fetch_assignment(assignment_id)
            .await?
            .ok_or_else(|| StorageError::not_found("assignment", assignment_id))
    }

    async fn list_assignments(&self, filter: &AssignmentFilter) -> StorageResult<Vec<Assignment>> {
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
        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT * FROM project_agent_assignments {where_clause} \
             ORDER BY project_agent_assignment_id DESC LIMIT {} START {}",
            filter.limit, filter.offset
        );

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
        let mut response = query.await?;
        let rows: Vec<AssignmentRow> = response.take(0)?;
        rows.into_iter().map(AssignmentRow::into_domain).collect()
    }

    async fn latest_active_assignment_agent(&self, project_id: i64) -> StorageResult<Option<i64>> {
        let active_agents = self.active_agent_ids().await?;
        if active_agents.is_empty() {
            return Ok(None);
        }
        let mut response = self
            .handle
            .db()
            .query(
                "SELECT * FROM project_agent_assignments \
                 WHERE project_id = $project_id AND assignment_status = 'active' \
                 AND agent_id IN $agents \
                 ORDER BY project_agent_assignment_id DESC LIMIT 1",
            )
            .bind(("project_id", project_id))
            .bind(("agents", active_agents))
            .await?;
        let rows: Vec<AssignmentRow> = response.take(0)?;
        Ok(rows.into_iter().next().map(|row| row.agent_id))
    }

    async fn first_active_agent(&self) -> StorageResult<Option<i64>> {
        Ok(self.active_agent_ids().await?.into_iter().next())
    }
}
