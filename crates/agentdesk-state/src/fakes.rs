//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryRunLedger`, `MemoryAgentDirectory`, and `MemoryProjectStore`
//! that satisfy the trait contracts without any external dependencies.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StorageError;
use crate::storage_traits::*;
use crate::vocab::{AssignmentStatus, MemberRole, StageStatus};

fn page<T: Clone>(rows: impl Iterator<Item = T>, limit: usize, offset: usize) -> Vec<T> {
    rows.skip(offset).take(limit).collect()
}

// ---------------------------------------------------------------------------
// MemoryRunLedger
// ---------------------------------------------------------------------------

/// In-memory run ledger backed by a `BTreeMap<run_id, AgentRun>`.
#[derive(Debug, Default)]
pub struct MemoryRunLedger {
    runs: Mutex<BTreeMap<i64, AgentRun>>,
}

impl MemoryRunLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows written so far.
    pub fn len(&self) -> usize {
        self.runs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every row in insertion order.
    pub fn all_runs(&self) -> Vec<AgentRun> {
        self.runs.lock().unwrap().values().cloned().collect()
    }

    /// Insert a row with an explicit creation time (reporting windows in tests).
    pub fn insert_at(
        &self,
        run: NewAgentRun,
        created_at: chrono::DateTime<Utc>,
    ) -> StorageResult<AgentRun> {
        run.validate()?;
        let mut runs = self.runs.lock().unwrap();
        let id = runs.keys().next_back().copied().unwrap_or(0) + 1;
        let record = AgentRun::from_new(RunId(id), run, created_at);
        runs.insert(id, record.clone());
        Ok(record)
    }
}

#[async_trait]
impl RunLedger for MemoryRunLedger {
    async fn create_run(&self, run: NewAgentRun) -> StorageResult<AgentRun> {
        self.insert_at(run, Utc::now())
    }

    async fn get_run(&self, run_id: RunId) -> StorageResult<AgentRun> {
        let runs = self.runs.lock().unwrap();
        runs.get(&run_id.0)
            .cloned()
            .ok_or_else(|| StorageError::not_found("agent run", run_id))
    }

    async fn list_runs(&self, filter: &RunFilter) -> StorageResult<Vec<AgentRun>> {
        filter.validate()?;
        let runs = self.runs.lock().unwrap();
        Ok(page(
            runs.values().rev().filter(|r| filter.matches(r)).cloned(),
            filter.limit,
            filter.offset,
        ))
    }
}

// ---------------------------------------------------------------------------
// MemoryAgentDirectory
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct DirectoryState {
    agents: BTreeMap<i64, Agent>,
    assignments: BTreeMap<i64, Assignment>,
}

/// In-memory agent catalog and assignment table.
#[derive(Debug, Default)]
pub struct MemoryAgentDirectory {
    state: Mutex<DirectoryState>,
}

impl MemoryAgentDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AgentDirectory for MemoryAgentDirectory {
    async fn create_agent(&self, agent: NewAgent) -> StorageResult<Agent> {
        agent.validate()?;
        let mut state = self.state.lock().unwrap();
        if state
            .agents
            .values()
            .any(|a| a.agent_code == agent.agent_code)
        {
            return Err(StorageError::Conflict(format!(
                "agent_code '{}' already exists",
                agent.agent_code
            )));
        }
        let id = state.agents.keys().next_back().copied().unwrap_or(0) + 1;
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
        state.agents.insert(id, record.clone());
        Ok(record)
    }

    async fn update_agent(&self, agent_id: i64, patch: AgentPatch) -> StorageResult<Agent> {
        patch.validate()?;
        let mut state = self.state.lock().unwrap();
        let agent = state
            .agents
            .get_mut(&agent_id)
            .ok_or_else(|| StorageError::not_found("agent", agent_id))?;
        patch.apply_to(agent, Utc::now());
        Ok(agent.clone())
    }

    async fn get_agent(&self, agent_id: i64) -> StorageResult<Agent> {
        let state = self.state.lock().unwrap();
        state
            .agents
            .get(&agent_id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("agent", agent_id))
    }

    async fn list_agents(&self, filter: &AgentFilter) -> StorageResult<Vec<Agent>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .agents
            .values()
            .rev()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect())
    }

    async fn create_assignment(&self, assignment: NewAssignment) -> StorageResult<Assignment> {
        let mut state = self.state.lock().unwrap();
        match state.agents.get(&assignment.agent_id) {
            Some(agent) if agent.is_active => {}
            _ => {
                return Err(StorageError::Rejected(format!(
                    "agent {} not found or inactive",
                    assignment.agent_id
                )))
            }
        }
        let duplicate = state.assignments.values().any(|a| {
            a.project_id == assignment.project_id
                && a.agent_id == assignment.agent_id
                && a.stage_id == assignment.stage_id
        });
        if duplicate {
            return Err(StorageError::Conflict(
                "assignment already exists for project, agent and stage".to_string(),
            ));
        }
        let id = state.assignments.keys().next_back().copied().unwrap_or(0) + 1;
        let record = Assignment {
            project_agent_assignment_id: id,
            project_id: assignment.project_id,
            agent_id: assignment.agent_id,
            stage_id: assignment.stage_id,
            assignment_status: assignment.assignment_status,
            assigned_at: Utc::now(),
            assigned_by_user_id: assignment.assigned_by_user_id,
        };
        state.assignments.insert(id, record.clone());
        Ok(record)
    }

    async fn update_assignment_status(
        &self,
        assignment_id: i64,
        status: AssignmentStatus,
    ) -> StorageResult<Assignment> {
        let mut state = self.state.lock().unwrap();
        let assignment = state
            .assignments
            .get_mut(&assignment_id)
            .ok_or_else(|| StorageError::not_found("assignment", assignment_id))?;
        assignment.assignment_status = status;
        Ok(assignment.clone())
    }

    async fn get_assignment(&self, assignment_id: i64) -> StorageResult<Assignment> {
        let state = self.state.lock().unwrap();
        state
            .assignments
            .get(&assignment_id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("assignment", assignment_id))
    }

    async fn list_assignments(&self, filter: &AssignmentFilter) -> StorageResult<Vec<Assignment>> {
        filter.validate()?;
        let state = self.state.lock().unwrap();
        Ok(page(
            state
                .assignments
                .values()
                .rev()
                .filter(|a| filter.matches(a))
                .cloned(),
            filter.limit,
            filter.offset,
        ))
    }

    async fn latest_active_assignment_agent(&self, project_id: i64) -> StorageResult<Option<i64>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .assignments
            .values()
            .rev()
            .filter(|a| {
                a.project_id == project_id && a.assignment_status == AssignmentStatus::Active
            })
            .find(|a| state.agents.get(&a.agent_id).is_some_and(|ag| ag.is_active))
            .map(|a| a.agent_id))
    }

    async fn first_active_agent(&self) -> StorageResult<Option<i64>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .agents
            .values()
            .find(|a| a.is_active)
            .map(|a| a.agent_id))
    }
}

// ---------------------------------------------------------------------------
// MemoryProjectStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct ProgressRow {
    project_stage_status_id: i64,
    project_id: i64,
    stage_id: i64,
    stage_status: StageStatus,
    progress_percent: f64,
    started_at: Option<chrono::DateTime<Utc>>,
    completed_at: Option<chrono::DateTime<Utc>>,
    updated_by_user_id: Option<i64>,
    updated_at: chrono::DateTime<Utc>,
}

impl ProgressRow {
    fn with_stage(&self, stage: &Stage) -> StageProgress {
        StageProgress {
            project_stage_status_id: self.project_stage_status_id,
            project_id: self.project_id,
            stage_id: self.stage_id,
            stage_code: stage.stage_code.clone(),
            stage_name: stage.stage_name.clone(),
            stage_order: stage.stage_order,
            stage_status: self.stage_status,
            progress_percent: self.progress_percent,
            started_at: self.started_at,
            completed_at: self.completed_at,
            updated_by_user_id: self.updated_by_user_id,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Default)]
struct ProjectState {
    projects: BTreeMap<i64, Project>,
    members: BTreeMap<i64, ProjectMember>,
    stages: BTreeMap<i64, Stage>,
    progress: BTreeMap<i64, ProgressRow>,
    events: BTreeMap<i64, StageEvent>,
}

fn next_id<V>(map: &BTreeMap<i64, V>) -> i64 {
    map.keys().next_back().copied().unwrap_or(0) + 1
}

impl ProjectState {
    fn project(&self, project_id: i64) -> StorageResult<&Project> {
        self.projects
            .get(&project_id)
            .ok_or_else(|| StorageError::not_found("project", project_id))
    }

    fn stage(&self, stage: &StageRef) -> StorageResult<&Stage> {
        self.stages
            .values()
            .find(|s| stage.matches(s))
            .ok_or_else(|| StorageError::not_found("stage", stage))
    }

    fn members_of(&self, project_id: i64) -> Vec<ProjectMember> {
        self.members
            .values()
            .filter(|m| m.project_id == project_id)
            .cloned()
            .collect()
    }

    fn member_key(&self, project_id: i64, user_id: i64) -> Option<i64> {
        self.members
            .iter()
            .find(|(_, m)| m.project_id == project_id && m.user_id == user_id)
            .map(|(k, _)| *k)
    }
}

/// In-memory project store. Project bootstrap is all-or-nothing under one lock.
#[derive(Debug, Default)]
pub struct MemoryProjectStore {
    state: Mutex<ProjectState>,
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn create_project(&self, project: NewProject) -> StorageResult<Project> {
        project.validate()?;
        let mut state = self.state.lock().unwrap();
        if state
            .projects
            .values()
            .any(|p| p.project_key == project.project_key)
        {
            return Err(StorageError::Conflict(format!(
                "project_key '{}' already exists",
                project.project_key
            )));
        }

        let now = Utc::now();
        let project_id = next_id(&state.projects);
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
        state.projects.insert(project_id, record.clone());

        let member_id = next_id(&state.members);
        state.members.insert(
            member_id,
            ProjectMember {
                project_member_id: member_id,
                project_id,
                user_id: record.owner_user_id,
                member_role: MemberRole::Admin,
                created_at: now,
            },
        );

        let stage_ids: Vec<i64> = state.stages.keys().copied().collect();
        for stage_id in stage_ids {
            let id = next_id(&state.progress);
            state.progress.insert(
                id,
                ProgressRow {
                    project_stage_status_id: id,
                    project_id,
                    stage_id,
                    stage_status: StageStatus::NotStarted,
                    progress_percent: 0.0,
                    started_at: None,
                    completed_at: None,
                    updated_by_user_id: Some(record.owner_user_id),
                    updated_at: now,
                },
            );
        }
        Ok(record)
    }

    async fn find_project(&self, project_id: i64) -> StorageResult<Option<Project>> {
        let state = self.state.lock().unwrap();
        Ok(state.projects.get(&project_id).cloned())
    }

    async fn update_project(
        &self,
        project_id: i64,
        patch: ProjectPatch,
    ) -> StorageResult<Project> {
        patch.validate()?;
        let mut state = self.state.lock().unwrap();
        let project = state
            .projects
            .get_mut(&project_id)
            .ok_or_else(|| StorageError::not_found("project", project_id))?;
        patch.apply_to(project, Utc::now());
        Ok(project.clone())
    }

    async fn list_memberships(&self, user_id: i64) -> StorageResult<Vec<ProjectMembership>> {
        let state = self.state.lock().unwrap();
        let mut rows: Vec<ProjectMembership> = state
            .members
            .values()
            .filter(|m| m.user_id == user_id)
            .filter_map(|m| {
                state.projects.get(&m.project_id).map(|p| ProjectMembership {
                    project: p.clone(),
                    member_role: m.member_role,
                })
            })
            .collect();
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
        let state = self.state.lock().unwrap();
        Ok(state
            .member_key(project_id, user_id)
            .and_then(|k| state.members.get(&k))
            .map(|m| m.member_role))
    }

    async fn list_members(&self, project_id: i64) -> StorageResult<Vec<ProjectMember>> {
        let state = self.state.lock().unwrap();
        state.project(project_id)?;
        Ok(state.members_of(project_id))
    }

    async fn add_member(
        &self,
        project_id: i64,
        user_id: i64,
        role: MemberRole,
    ) -> StorageResult<ProjectMember> {
        let mut state = self.state.lock().unwrap();
        state.project(project_id)?;
        if state.member_key(project_id, user_id).is_some() {
            return Err(StorageError::Conflict(format!(
                "user {user_id} is already a member of project {project_id}"
            )));
        }
        let id = next_id(&state.members);
        let member = ProjectMember {
            project_member_id: id,
            project_id,
            user_id,
            member_role: role,
            created_at: Utc::now(),
        };
        state.members.insert(id, member.clone());
        Ok(member)
    }

    async fn update_member_role(
        &self,
        project_id: i64,
        user_id: i64,
        role: MemberRole,
    ) -> StorageResult<ProjectMember> {
        let mut state = self.state.lock().unwrap();
        let owner = state.project(project_id)?.owner_user_id;
        ensure_member_change_allowed(owner, &state.members_of(project_id), user_id, Some(role))?;
        let key = state
            .member_key(project_id, user_id)
            .ok_or_else(|| StorageError::not_found("project member", user_id))?;
        let member = state
            .members
            .get_mut(&key)
            .ok_or_else(|| StorageError::not_found("project member", user_id))?;
        member.member_role = role;
        Ok(member.clone())
    }

    async fn remove_member(&self, project_id: i64, user_id: i64) -> StorageResult<()> {
        let mut state = self.state.lock().unwrap();
        let owner = state.project(project_id)?.owner_user_id;
        ensure_member_change_allowed(owner, &state.members_of(project_id), user_id, None)?;
        if let Some(key) = state.member_key(project_id, user_id) {
            state.members.remove(&key);
        }
        Ok(())
    }

    async fn register_stage(&self, stage: NewStage) -> StorageResult<Stage> {
        stage.validate()?;
        let mut state = self.state.lock().unwrap();
        if state
            .stages
            .values()
            .any(|s| s.stage_code == stage.stage_code)
        {
            return Err(StorageError::Conflict(format!(
                "stage_code '{}' already exists",
                stage.stage_code
            )));
        }
        let id = next_id(&state.stages);
        let record = Stage {
            stage_id: id,
            stage_code: stage.stage_code,
            stage_name: stage.stage_name,
            stage_order: stage.stage_order,
        };
        state.stages.insert(id, record.clone());
        Ok(record)
    }

    async fn list_stage_catalog(&self) -> StorageResult<Vec<Stage>> {
        let state = self.state.lock().unwrap();
        let mut stages: Vec<Stage> = state.stages.values().cloned().collect();
        stages.sort_by_key(|s| (s.stage_order, s.stage_id));
        Ok(stages)
    }

    async fn get_stage(&self, stage: &StageRef) -> StorageResult<Stage> {
        let state = self.state.lock().unwrap();
        state.stage(stage).cloned()
    }

    async fn list_stage_progress(&self, project_id: i64) -> StorageResult<Vec<StageProgress>> {
        let state = self.state.lock().unwrap();
        let mut rows: Vec<StageProgress> = state
            .progress
            .values()
            .filter(|p| p.project_id == project_id)
            .filter_map(|p| state.stages.get(&p.stage_id).map(|s| p.with_stage(s)))
            .collect();
        rows.sort_by_key(|p| (p.stage_order, p.stage_id));
        Ok(rows)
    }

    async fn update_stage_status(
        &self,
        project_id: i64,
        stage: &StageRef,
        update: StageStatusUpdate,
    ) -> StorageResult<StageProgress> {
        update.validate()?;
        let mut state = self.state.lock().unwrap();
        let stage = state.stage(stage)?.clone();
        state.project(project_id)?;

        let now = Utc::now();
        let existing = state
            .progress
            .iter()
            .find(|(_, p)| p.project_id == project_id && p.stage_id == stage.stage_id)
            .map(|(k, p)| (*k, p.started_at));
        let (key, previous_started_at) = match existing {
            Some((k, started)) => (k, started),
            None => (next_id(&state.progress), None),
        };
        let (started_at, completed_at) = update.stamp(previous_started_at, now);
        let row = ProgressRow {
            project_stage_status_id: key,
            project_id,
            stage_id: stage.stage_id,
            stage_status: update.stage_status,
            progress_percent: update.progress_percent,
            started_at,
            completed_at,
            updated_by_user_id: Some(update.updated_by_user_id),
            updated_at: now,
        };
        state.progress.insert(key, row.clone());

        let event_id = next_id(&state.events);
        state.events.insert(
            event_id,
            StageEvent {
                project_stage_event_id: event_id,
                project_id,
                stage_id: stage.stage_id,
                event_type: STATUS_CHANGE_EVENT.to_string(),
                event_payload: update.event_payload(),
                event_note: update.event_note.clone(),
                created_by_user_id: Some(update.updated_by_user_id),
                created_at: now,
            },
        );
        Ok(row.with_stage(&stage))
    }

    async fn list_stage_events(
        &self,
        project_id: i64,
        stage_id: Option<i64>,
    ) -> StorageResult<Vec<StageEvent>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .events
            .values()
            .rev()
            .filter(|e| e.project_id == project_id && stage_id.map_or(true, |s| s == e.stage_id))
            .cloned()
            .collect())
    }
}
