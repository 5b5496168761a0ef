//! `DeskService`: the single entry point used by front ends.
//!
//! Every operation takes the acting [`Actor`], checks access through the
//! [`AccessGate`] (or the global role check for catalog-wide writes) and then
//! delegates to the stores or the generation pipeline.

use std::sync::Arc;

use agentdesk_providers::{default_providers, GenerationProvider, ProviderConfig};
use agentdesk_state::{
    Agent, AgentDirectory, AgentFilter, AgentPatch, AgentRun, Assignment, AssignmentFilter,
    AssignmentStatus, MemberRole, NewAgent, NewAgentRun, NewAssignment, NewProject, NewStage,
    Project, ProjectMember, ProjectMembership, ProjectPatch, ProjectStore, RunFilter, RunId,
    RunLedger, RunStatus, Stage, StageEvent, StageProgress, StageRef, StageStatus,
    StageStatusUpdate,
};
use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::debug;

use crate::access::{
    require_global_rw, AccessGate, Capability, GlobalPermissions, ProjectPermissions,
};
use crate::domain::{
    Actor, DeskError, ImageGenerationRequest, ImageGenerationResponse, Result,
    TextGenerationRequest, TextGenerationResponse,
};
use crate::generation::GenerationPipeline;
use crate::metrics::METRICS;
use crate::obs;
use crate::reporting::{
    self, build_dashboard, collect_runs, summarize_costs, CostSummary, Dashboard, DashboardInputs,
    COST_WINDOW_DAYS,
};

/// The caller's rights: global roles plus one entry per visible project.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PermissionsReport {
    pub user_id: i64,
    pub global: GlobalPermissions,
    pub projects: Vec<ProjectPermissions>,
}

/// A requested stage transition, addressed by id or code.
#[derive(Debug, Clone)]
pub struct StageChange {
    pub stage: StageRef,
    pub stage_status: StageStatus,
    pub progress_percent: f64,
    pub event_note: Option<String>,
}

#[derive(Clone)]
pub struct DeskService {
    pipeline: GenerationPipeline,
    gate: AccessGate,
    ledger: Arc<dyn RunLedger>,
    directory: Arc<dyn AgentDirectory>,
    projects: Arc<dyn ProjectStore>,
}

impl DeskService {
    pub fn new(
        providers: Vec<Arc<dyn GenerationProvider>>,
        config: &ProviderConfig,
        ledger: Arc<dyn RunLedger>,
        directory: Arc<dyn AgentDirectory>,
        projects: Arc<dyn ProjectStore>,
    ) -> Self {
        let pipeline = GenerationPipeline::new(
            providers,
            ledger.clone(),
            directory.clone(),
            config.limits,
        );
        Self {
            pipeline,
            gate: AccessGate::new(projects.clone()),
            ledger,
            directory,
            projects,
        }
    }

    /// Build with the OpenAI and Gemini adapters configured from `config`.
    pub fn with_default_providers(
        config: &ProviderConfig,
        ledger: Arc<dyn RunLedger>,
        directory: Arc<dyn AgentDirectory>,
        projects: Arc<dyn ProjectStore>,
    ) -> Result<Self> {
        let providers = default_providers(config)?;
        Ok(Self::new(providers, config, ledger, directory, projects))
    }

    pub fn gate(&self) -> &AccessGate {
        &self.gate
    }

    // -------------------------------------------------------------------------
    // Generation
    // -------------------------------------------------------------------------

    pub async fn generate_text(
        &self,
        actor: &Actor,
        req: TextGenerationRequest,
    ) -> Result<TextGenerationResponse> {
        req.validate()?;
        self.gate
            .require_capability(req.project_id, actor, Capability::GenerateContent)
            .await?;
        self.pipeline.generate_text(actor, &req).await
    }

    pub async fn generate_image(
        &self,
        actor: &Actor,
        req: ImageGenerationRequest,
    ) -> Result<ImageGenerationResponse> {
        req.validate()?;
        self.gate
            .require_capability(req.project_id, actor, Capability::GenerateContent)
            .await?;
        self.pipeline.generate_image(actor, &req).await
    }

    // -------------------------------------------------------------------------
    // Runs
    // -------------------------------------------------------------------------

    /// Runs in the caller's projects. `filter.project_scope` is overwritten.
    pub async fn list_runs(&self, actor: &Actor, mut filter: RunFilter) -> Result<Vec<AgentRun>> {
        if let Some(project_id) = filter.project_id {
            self.gate
                .require_capability(project_id, actor, Capability::ViewRuns)
                .await?;
        }
        filter.project_scope = Some(self.gate.project_scope(actor).await?);
        Ok(self.ledger.list_runs(&filter).await?)
    }

    pub async fn get_run(&self, actor: &Actor, run_id: RunId) -> Result<AgentRun> {
        let run = self.ledger.get_run(run_id).await?;
        self.gate
            .require_capability(run.project_id, actor, Capability::ViewRuns)
            .await?;
        Ok(run)
    }

    pub async fn create_run(&self, actor: &Actor, mut run: NewAgentRun) -> Result<AgentRun> {
        self.gate
            .require_capability(run.project_id, actor, Capability::CreateAgentRuns)
            .await?;
        self.directory.get_agent(run.agent_id).await?;
        run.created_by_user_id = Some(actor.user_id);
        let stored = self.ledger.create_run(run).await?;
        METRICS.inc_runs_recorded();
        obs::emit_run_recorded(stored.agent_run_id, stored.project_id, stored.run_status);
        Ok(stored)
    }

    // -------------------------------------------------------------------------
    // Reporting
    // -------------------------------------------------------------------------

    pub async fn cost_summary(
        &self,
        actor: &Actor,
        days: u32,
        project_id: Option<i64>,
    ) -> Result<CostSummary> {
        reporting::validate_days(days)?;
        if let Some(project_id) = project_id {
            self.gate
                .require_capability(project_id, actor, Capability::ViewCosts)
                .await?;
        }
        let memberships = self.projects.list_memberships(actor.user_id).await?;
        let scope: Vec<i64> = memberships.iter().map(|m| m.project.project_id).collect();
        let runs = collect_runs(
            self.ledger.as_ref(),
            RunFilter {
                project_scope: Some(scope),
                project_id,
                created_since: Some(Utc::now() - Duration::days(i64::from(days))),
                ..RunFilter::default()
            },
        )
        .await?;
        let projects: Vec<Project> = memberships.into_iter().map(|m| m.project).collect();
        debug!(days, runs = runs.len(), "summarizing costs");
        Ok(summarize_costs(days, project_id, &runs, &projects))
    }

    pub async fn dashboard(&self, actor: &Actor, limit: usize) -> Result<Dashboard> {
        reporting::validate_limit(limit)?;
        let now = Utc::now();
        let memberships = self.projects.list_memberships(actor.user_id).await?;
        let scope: Vec<i64> = memberships.iter().map(|m| m.project.project_id).collect();

        let mut stage_progress = Vec::new();
        for project_id in &scope {
            stage_progress.extend(self.projects.list_stage_progress(*project_id).await?);
        }
        let recent_runs = collect_runs(
            self.ledger.as_ref(),
            RunFilter {
                project_scope: Some(scope.clone()),
                created_since: Some(now - Duration::days(COST_WINDOW_DAYS)),
                ..RunFilter::default()
            },
        )
        .await?;
        let queued_runs = collect_runs(
            self.ledger.as_ref(),
            RunFilter {
                project_scope: Some(scope),
                run_status: Some(RunStatus::Queued),
                ..RunFilter::default()
            },
        )
        .await?;

        Ok(build_dashboard(
            actor.user_id,
            now,
            DashboardInputs {
                memberships: &memberships,
                stage_progress: &stage_progress,
                recent_runs: &recent_runs,
                queued_runs: &queued_runs,
            },
            limit,
        ))
    }

    /// Rights in one project, or in every project the caller belongs to.
    pub async fn permissions(
        &self,
        actor: &Actor,
        project_id: Option<i64>,
    ) -> Result<PermissionsReport> {
        let projects = match project_id {
            Some(project_id) => vec![self.gate.project_permissions(project_id, actor).await?],
            None => self
                .projects
                .list_memberships(actor.user_id)
                .await?
                .into_iter()
                .map(|m| {
                    ProjectPermissions::for_role(m.project.project_id, actor.user_id, m.member_role)
                })
                .collect(),
        };
        Ok(PermissionsReport {
            user_id: actor.user_id,
            global: GlobalPermissions::for_actor(actor),
            projects,
        })
    }

    // -------------------------------------------------------------------------
    // Projects and members
    // -------------------------------------------------------------------------

    pub async fn list_projects(&self, actor: &Actor) -> Result<Vec<ProjectMembership>> {
        Ok(self.projects.list_memberships(actor.user_id).await?)
    }

    pub async fn get_project(&self, actor: &Actor, project_id: i64) -> Result<ProjectMembership> {
        let member_role = self
            .gate
            .require_capability(project_id, actor, Capability::ViewProject)
            .await?;
        let project = self
            .projects
            .find_project(project_id)
            .await?
            .ok_or_else(|| DeskError::NotFound(format!("project {project_id} not found")))?;
        Ok(ProjectMembership {
            project,
            member_role,
        })
    }

    /// The caller becomes the owner and first admin.
    pub async fn create_project(&self, actor: &Actor, mut project: NewProject) -> Result<Project> {
        require_global_rw(actor, "create project")?;
        project.owner_user_id = actor.user_id;
        let created = self.projects.create_project(project).await?;
        obs::emit_project_created(created.project_id, &created.project_key, created.owner_user_id);
        Ok(created)
    }

    pub async fn update_project(
        &self,
        actor: &Actor,
        project_id: i64,
        patch: ProjectPatch,
    ) -> Result<Project> {
        self.gate
            .require_capability(project_id, actor, Capability::EditProject)
            .await?;
        Ok(self.projects.update_project(project_id, patch).await?)
    }

    pub async fn list_members(&self, actor: &Actor, project_id: i64) -> Result<Vec<ProjectMember>> {
        self.gate
            .require_capability(project_id, actor, Capability::ViewMembers)
            .await?;
        Ok(self.projects.list_members(project_id).await?)
    }

    pub async fn add_member(
        &self,
        actor: &Actor,
        project_id: i64,
        user_id: i64,
        role: MemberRole,
    ) -> Result<ProjectMember> {
        self.gate
            .require_capability(project_id, actor, Capability::ManageMembers)
            .await?;
        let member = self.projects.add_member(project_id, user_id, role).await?;
        obs::emit_member_changed(project_id, user_id, "added", Some(role));
        Ok(member)
    }

    pub async fn update_member_role(
        &self,
        actor: &Actor,
        project_id: i64,
        user_id: i64,
        role: MemberRole,
    ) -> Result<ProjectMember> {
        self.gate
            .require_capability(project_id, actor, Capability::ManageMembers)
            .await?;
        let member = self
            .projects
            .update_member_role(project_id, user_id, role)
            .await?;
        obs::emit_member_changed(project_id, user_id, "role_changed", Some(role));
        Ok(member)
    }

    pub async fn remove_member(&self, actor: &Actor, project_id: i64, user_id: i64) -> Result<()> {
        self.gate
            .require_capability(project_id, actor, Capability::ManageMembers)
            .await?;
        self.projects.remove_member(project_id, user_id).await?;
        obs::emit_member_changed(project_id, user_id, "removed", None);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Stages
    // -------------------------------------------------------------------------

    pub async fn stage_catalog(&self) -> Result<Vec<Stage>> {
        Ok(self.projects.list_stage_catalog().await?)
    }

    pub async fn register_stage(&self, actor: &Actor, stage: NewStage) -> Result<Stage> {
        require_global_rw(actor, "register stage")?;
        Ok(self.projects.register_stage(stage).await?)
    }

    pub async fn list_stages(&self, actor: &Actor, project_id: i64) -> Result<Vec<StageProgress>> {
        self.gate
            .require_capability(project_id, actor, Capability::ViewStages)
            .await?;
        Ok(self.projects.list_stage_progress(project_id).await?)
    }

    pub async fn set_stage_status(
        &self,
        actor: &Actor,
        project_id: i64,
        change: StageChange,
    ) -> Result<StageProgress> {
        self.gate
            .require_capability(project_id, actor, Capability::ManageStageStatus)
            .await?;
        let update = StageStatusUpdate {
            stage_status: change.stage_status,
            progress_percent: change.progress_percent,
            event_note: change.event_note,
            updated_by_user_id: actor.user_id,
        };
        let progress = self
            .projects
            .update_stage_status(project_id, &change.stage, update)
            .await?;
        obs::emit_stage_status_changed(
            project_id,
            progress.stage_id,
            progress.stage_status,
            progress.progress_percent,
        );
        Ok(progress)
    }

    pub async fn list_stage_events(
        &self,
        actor: &Actor,
        project_id: i64,
        stage: Option<StageRef>,
    ) -> Result<Vec<StageEvent>> {
        self.gate
            .require_capability(project_id, actor, Capability::ViewStages)
            .await?;
        let stage_id = match stage {
            Some(stage) => Some(self.projects.get_stage(&stage).await?.stage_id),
            None => None,
        };
        Ok(self.projects.list_stage_events(project_id, stage_id).await?)
    }

    // -------------------------------------------------------------------------
    // Agent catalog and assignments
    // -------------------------------------------------------------------------

    pub async fn list_agents(&self, filter: &AgentFilter) -> Result<Vec<Agent>> {
        Ok(self.directory.list_agents(filter).await?)
    }

    pub async fn get_agent(&self, agent_id: i64) -> Result<Agent> {
        Ok(self.directory.get_agent(agent_id).await?)
    }

    pub async fn create_agent(&self, actor: &Actor, agent: NewAgent) -> Result<Agent> {
        require_global_rw(actor, "create agent")?;
        let created = self.directory.create_agent(agent).await?;
        obs::emit_agent_changed(created.agent_id, "created", created.is_active);
        Ok(created)
    }

    pub async fn update_agent(
        &self,
        actor: &Actor,
        agent_id: i64,
        patch: AgentPatch,
    ) -> Result<Agent> {
        require_global_rw(actor, "update agent")?;
        let updated = self.directory.update_agent(agent_id, patch).await?;
        obs::emit_agent_changed(updated.agent_id, "updated", updated.is_active);
        Ok(updated)
    }

    /// Assignments in one project, or across all of the caller's projects.
    pub async fn list_assignments(
        &self,
        actor: &Actor,
        mut filter: AssignmentFilter,
    ) -> Result<Vec<Assignment>> {
        if let Some(project_id) = filter.project_id {
            self.gate
                .require_capability(project_id, actor, Capability::ViewAssignments)
                .await?;
        }
        filter.project_scope = Some(self.gate.project_scope(actor).await?);
        Ok(self.directory.list_assignments(&filter).await?)
    }

    pub async fn get_assignment(&self, actor: &Actor, assignment_id: i64) -> Result<Assignment> {
        let assignment = self.directory.get_assignment(assignment_id).await?;
        self.gate
            .require_capability(assignment.project_id, actor, Capability::ViewAssignments)
            .await?;
        Ok(assignment)
    }

    pub async fn create_assignment(
        &self,
        actor: &Actor,
        mut assignment: NewAssignment,
    ) -> Result<Assignment> {
        self.gate
            .require_capability(assignment.project_id, actor, Capability::ManageAssignments)
            .await?;
        if let Some(stage_id) = assignment.stage_id {
            self.projects.get_stage(&StageRef::Id(stage_id)).await?;
        }
        assignment.assigned_by_user_id = Some(actor.user_id);
        Ok(self.directory.create_assignment(assignment).await?)
    }

    pub async fn update_assignment_status(
        &self,
        actor: &Actor,
        assignment_id: i64,
        status: AssignmentStatus,
    ) -> Result<Assignment> {
        let current = self.directory.get_assignment(assignment_id).await?;
        self.gate
            .require_capability(current.project_id, actor, Capability::ManageAssignments)
            .await?;
        Ok(self
            .directory
            .update_assignment_status(assignment_id, status)
            .await?)
    }
}
