//! SurrealDB-backed ProjectStore implementation
//!
//! Multi-statement writes (project bootstrap, stage status change plus its
//! event) run inside one `BEGIN TRANSACTION ... COMMIT TRANSACTION` query so
//! a failing statement rolls back the whole operation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use surrealdb::engine::any::Any;
use tracing::{debug, info};

use crate::error::{classify_backend_message, StorageError};
use crate::handle::SurrealHandle;
use crate::schema::{MemberRow, ProgressRow, ProjectRow, StageEventRow, StageRow};
use crate::storage_traits::*;
use crate::vocab::{MemberRole, StageStatus};

/// SurrealDB-backed implementation of [`ProjectStore`].
pub struct SurrealProjectStore {
    handle: Arc<SurrealHandle>,
}

/// Fold every statement error of a transactional response into one error.
fn check_transaction(mut response: surrealdb::Response) -> StorageResult<()> {
    let errors = response.take_errors();
    if errors.is_empty() {
        return Ok(());
    }
    let mut indexed: Vec<(usize, surrealdb::Error)> = errors.into_iter().collect();
    indexed.sort_by_key(|(index, _)| *index);
    let message = indexed
        .into_iter()
        .map(|(_, e)| e.to_string())
        .collect::<Vec<_>>()
        .join("; ");
    Err(classify_backend_message(message))
}

impl SurrealProjectStore {
    pub fn new(handle: Arc<SurrealHandle>) -> Self {
        Self { handle }
    }

    fn db(&self) -> &surrealdb::Surreal<Any> {
        self.handle.db()
    }

    async fn require_project(&self, project_id: i64) -> StorageResult<Project> {
        self.find_project(project_id)
            .await?
            .ok_or_else(|| StorageError::not_found("project", project_id))
    }

    async fn fetch_member(&self, project_id: i64, user_id: i64) -> StorageResult<Option<MemberRow>> {
        let mut response = self
            .db()
            .query(
                "SELECT * FROM project_members \
                 WHERE project_id = $project_id AND user_id = $user_id LIMIT 1",
            )
            .bind(("project_id", project_id))
            .bind(("user_id", user_id))
            .await?;
        let rows: Vec<MemberRow> = response.take(0)?;
        Ok(rows.into_iter().next())
    }

    async fn fetch_progress(
        &self,
        project_id: i64,
        stage_id: i64,
    ) -> StorageResult<Option<ProgressRow>> {
        let mut response = self
            .db()
            .query(
                "SELECT * FROM project_stage_status \
                 WHERE project_id = $project_id AND stage_id = $stage_id LIMIT 1",
            )
            .bind(("project_id", project_id))
            .bind(("stage_id", stage_id))
            .await?;
        let rows: Vec<ProgressRow> = response.take(0)?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl ProjectStore for SurrealProjectStore {
    async fn create_project(&self, project: NewProject) -> StorageResult<Project> {
        project.validate()?;

        let mut response = self
            .db()
            .query("SELECT * FROM projects WHERE project_key = $key LIMIT 1")
            .bind(("key", project.project_key.clone()))
            .await?;
        let taken: Vec<ProjectRow> = response.take(0)?;
        if !taken.is_empty() {
            return Err(StorageError::Conflict(format!(
                "project_key '{}' already exists",
                project.project_key
            )));
        }

        let stages = self.list_stage_catalog().await?;
        let project_id = self.handle.next_id("projects").await?;
        let member_id = self.handle.next_id("project_members").await?;
        let now = Utc::now();

        let mut progress = Vec::with_capacity(stages.len());
        for stage in &stages {
            progress.push(ProgressRow {
                project_stage_status_id: self.handle.next_id("project_stage_status").await?,
                project_id,
                stage_id: stage.stage_id,
                stage_status: StageStatus::NotStarted.as_str().to_string(),
                progress_percent: 0.0,
                started_at: None,
                completed_at: None,
                updated_by_user_id: Some(project.owner_user_id),
                updated_at: now,
            });
        }

        let record = Project {
            project_id,
            project_key: project.project_key,
            project_name: project.project_name,
            description: project.description,
            lifecycle_status: project.lifecycle_status,
            owner_user_id: project.owner_user_id,
            created_at: now,
            updated_at: now,
        };
        let owner = MemberRow {
            project_member_id: member_id,
            project_id,
            user_id: record.owner_user_id,
            member_role: MemberRole::Admin.as_str().to_string(),
            created_at: now,
        };

        let sql = r#"
            BEGIN TRANSACTION;
            CREATE projects CONTENT $project;
            CREATE project_members CONTENT $owner;
            FOR $row IN $progress {
                CREATE type::thing('project_stage_status', [$row.project_id, $row.stage_id]) CONTENT $row;
            };
            COMMIT TRANSACTION;
        "#;
        let response = self
            .db()
            .query(sql)
            .bind(("project", ProjectRow::from_domain(&record)))
            .bind(("owner", owner))
            .bind(("progress", progress))
            .await?;
        check_transaction(response)?;

        info!(
            project_id,
            project_key = %record.project_key,
            stages = stages.len(),
            "project bootstrapped"
        );
        self.require_project(project_id).await
    }

    async fn find_project(&self, project_id: i64) -> StorageResult<Option<Project>> {
        let mut response = self
            .db()
            .query("SELECT * FROM projects WHERE project_id = $id LIMIT 1")
            .bind(("id", project_id))
            .await?;
        let rows: Vec<ProjectRow> = response.take(0)?;
        rows.into_iter().next().map(ProjectRow::into_domain).transpose()
    }

    async fn update_project(
        &self,
        project_id: i64,
        patch: ProjectPatch,
    ) -> StorageResult<Project> {
        patch.validate()?;
        let mut project = self.require_project(project_id).await?;
        patch.apply_to(&mut project, Utc::now());

        let mut response = self
            .db()
            .query("UPDATE projects CONTENT $row WHERE project_id = $id RETURN AFTER")
            .bind(("row", ProjectRow::from_domain(&project)))
            .bind(("id", project_id))
            .await?;
        let rows: Vec<ProjectRow> = response.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::not_found("project", project_id))?
            .into_domain()
    }

    async fn list_memberships(&self, user_id: i64) -> StorageResult<Vec<ProjectMembership>> {
        let mut response = self
            .db()
            .query("SELECT * FROM project_members WHERE user_id = $user_id")
            .bind(("user_id", user_id))
            .await?;
        let members: Vec<MemberRow> = response.take(0)?;
        if members.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = members.iter().map(|m| m.project_id).collect();
        let mut response = self
            .db()
            .query("SELECT * FROM projects WHERE project_id IN $ids")
            .bind(("ids", ids))
            .await?;
        let projects: Vec<ProjectRow> = response.take(0)?;
        let mut by_id = HashMap::new();
        for row in projects {
            let project = row.into_domain()?;
            by_id.insert(project.project_id, project);
        }

        let mut rows = Vec::with_capacity(members.len());
        for member in members {
            if let Some(project) = by_id.remove(&member.project_id) {
                rows.push(ProjectMembership {
                    project,
                    member_role: member.member_role.parse()?,
                });
            }
        }
        rows.sort_by(|a, b| {
            b.project
                .updated_at
                .cmp(&a.project.updated_at)
                .then(b.project.project_id.cmp(&a.project.project_id))
        });
        Ok(rows)
    }

    async fn member_role(
        &self,
        project_id: i64,
        user_id: i64,
    ) -> StorageResult<Option<MemberRole>> {
        self.fetch_member(project_id, user_id)
            .await?
            .map(|m| m.member_role.parse())
            .transpose()
    }

    async fn list_members(&self, project_id: i64) -> StorageResult<Vec<ProjectMember>> {
        self.require_project(project_id).await?;
        let mut response = self
            .db()
            .query("SELECT * FROM project_members WHERE project_id = $project_id ORDER BY project_member_id ASC")
            .bind(("project_id", project_id))
            .await?;
        let rows: Vec<MemberRow> = response.take(0)?;
        rows.into_iter().map(MemberRow::into_domain).collect()
    }

    async fn add_member(
        &self,
        project_id: i64,
        user_id: i64,
        role: MemberRole,
    ) -> StorageResult<ProjectMember> {
        self.require_project(project_id).await?;
        if self.fetch_member(project_id, user_id).await?.is_some() {
            return Err(StorageError::Conflict(format!(
                "user {user_id} is already a member of project {project_id}"
            )));
        }
        let row = MemberRow {
            project_member_id: self.handle.next_id("project_members").await?,
            project_id,
            user_id,
            member_role: role.as_str().to_string(),
            created_at: Utc::now(),
        };
        let _: Option<MemberRow> = self.db().create("project_members").content(row).await?;

        self.fetch_member(project_id, user_id)
            .await?
            .ok_or_else(|| StorageError::not_found("project member", user_id))?
            .into_domain()
    }

    async fn update_member_role(
        &self,
        project_id: i64,
        user_id: i64,
        role: MemberRole,
    ) -> StorageResult<ProjectMember> {
        let project = self.require_project(project_id).await?;
        let members = self.list_members(project_id).await?;
        ensure_member_change_allowed(project.owner_user_id, &members, user_id, Some(role))?;

        let mut response = self
            .db()
            .query(
                "UPDATE project_members SET member_role = $role \
                 WHERE project_id = $project_id AND user_id = $user_id RETURN AFTER",
            )
            .bind(("role", role.as_str().to_string()))
            .bind(("project_id", project_id))
            .bind(("user_id", user_id))
            .await?;
        let rows: Vec<MemberRow> = response.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::not_found("project member", user_id))?
            .into_domain()
    }

    async fn remove_member(&self, project_id: i64, user_id: i64) -> StorageResult<()> {
        let project = self.require_project(project_id).await?;
        let members = self.list_members(project_id).await?;
        ensure_member_change_allowed(project.owner_user_id, &members, user_id, None)?;

        self.db()
            .query("DELETE project_members WHERE project_id = $project_id AND user_id = $user_id")
            .bind(("project_id", project_id))
            .bind(("user_id", user_id))
            .await?
            .check()?;
        Ok(())
    }

    async fn register_stage(&self, stage: NewStage) -> StorageResult<Stage> {
        stage.validate()?;
        if self
            .get_stage(&StageRef::Code(stage.stage_code.clone()))
            .await
            .is_ok()
        {
            return Err(StorageError::Conflict(format!(
                "stage_code '{}' already exists",
                stage.stage_code
            )));
        }
        let row = StageRow {
            stage_id: self.handle.next_id("stage_catalog").await?,
            stage_code: stage.stage_code,
            stage_name: stage.stage_name,
            stage_order: stage.stage_order,
        };
        let stage_id = row.stage_id;
        let _: Option<StageRow> = self.db().create("stage_catalog").content(row).await?;
        self.get_stage(&StageRef::Id(stage_id)).await
    }

    async fn list_stage_catalog(&self) -> StorageResult<Vec<Stage>> {
        let mut response = self.db().query("SELECT * FROM stage_catalog").await?;
        let rows: Vec<StageRow> = response.take(0)?;
        let mut stages: Vec<Stage> = rows.into_iter().map(Stage::from).collect();
        stages.sort_by_key(|s| (s.stage_order, s.stage_id));
        Ok(stages)
    }

    async fn get_stage(&self, stage: &StageRef) -> StorageResult<Stage> {
        let query = match stage {
            StageRef::Id(id) => self
                .db()
                .query("SELECT * FROM stage_catalog WHERE stage_id = $id LIMIT 1")
                .bind(("id", *id)),
            StageRef::Code(code) => self
                .db()
                .query("SELECT * FROM stage_catalog WHERE stage_code = $code LIMIT 1")
                .bind(("code", code.clone())),
        };
        let mut response = query.await?;
        let rows: Vec<StageRow> = response.take(0)?;
        rows.into_iter()
            .next()
            .map(Stage::from)
            .ok_or_else(|| StorageError::not_found("stage", stage))
    }

    async fn list_stage_progress(&self, project_id: i64) -> StorageResult<Vec<StageProgress>> {
        let catalog: HashMap<i64, Stage> = self
            .list_stage_catalog()
            .await?
            .into_iter()
            .map(|s| (s.stage_id, s))
            .collect();
        let mut response = self
            .db()
            .query("SELECT * FROM project_stage_status WHERE project_id = $project_id")
            .bind(("project_id", project_id))
            .await?;
        let rows: Vec<ProgressRow> = response.take(0)?;

        let mut progress = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(stage) = catalog.get(&row.stage_id) {
                progress.push(row.into_domain(stage)?);
            }
        }
        progress.sort_by_key(|p| (p.stage_order, p.stage_id));
        Ok(progress)
    }

    async fn update_stage_status(
        &self,
        project_id: i64,
        stage: &StageRef,
        update: StageStatusUpdate,
    ) -> StorageResult<StageProgress> {
        update.validate()?;
        let stage = self.get_stage(stage).await?;
        self.require_project(project_id).await?;

        let existing = self.fetch_progress(project_id, stage.stage_id).await?;
        let (row_id, previous_started_at) = match &existing {
            Some(row) => (row.project_stage_status_id, row.started_at),
            None => (self.handle.next_id("project_stage_status").await?, None),
        };
        let now = Utc::now();
        let (started_at, completed_at) = update.stamp(previous_started_at, now);

        let row = ProgressRow {
            project_stage_status_id: row_id,
            project_id,
            stage_id: stage.stage_id,
            stage_status: update.stage_status.as_str().to_string(),
            progress_percent: update.progress_percent,
            started_at,
            completed_at,
            updated_by_user_id: Some(update.updated_by_user_id),
            updated_at: now,
        };
        let event = StageEventRow {
            project_stage_event_id: self.handle.next_id("project_stage_events").await?,
            project_id,
            stage_id: stage.stage_id,
            event_type: STATUS_CHANGE_EVENT.to_string(),
            event_payload: serde_json::to_string(&update.event_payload())?,
            event_note: update.event_note.clone(),
            created_by_user_id: Some(update.updated_by_user_id),
            created_at: now,
        };

        let sql = r#"
            BEGIN TRANSACTION;
            UPSERT type::thing('project_stage_status', [$row.project_id, $row.stage_id]) CONTENT $row;
            CREATE project_stage_events CONTENT $event;
            COMMIT TRANSACTION;
        "#;
        let response = self
            .db()
            .query(sql)
            .bind(("row", row))
            .bind(("event", event))
            .await?;
        check_transaction(response)?;
        debug!(project_id, stage_id = stage.stage_id, "stage status written");

        self.fetch_progress(project_id, stage.stage_id)
            .await?
            .ok_or_else(|| StorageError::not_found("project stage status", stage.stage_id))?
            .into_domain(&stage)
    }

    async fn list_stage_events(
        &self,
        project_id: i64,
        stage_id: Option<i64>,
    ) -> StorageResult<Vec<StageEvent>> {
        let sql = if stage_id.is_some() {
            "SELECT * FROM project_stage_events WHERE project_id = $project_id AND stage_id = $stage_id \
             ORDER BY project_stage_event_id DESC"
        } else {
            "SELECT * FROM project_stage_events WHERE project_id = $project_id \
             ORDER BY project_stage_event_id DESC"
        };
        let mut query = self.db().query(sql).bind(("project_id", project_id));
        if let Some(stage_id) = stage_id {
            query = query.bind(("stage_id", stage_id));
        }
        let mut response = query.await?;
        let rows: Vec<StageEventRow> = response.take(0)?;
        rows.into_iter().map(StageEventRow::into_domain).collect()
    }
}
