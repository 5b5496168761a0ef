//! Storage trait boundaries for AgentDesk persistence.
//!
//! Three traits cover the relational surface the domain layer needs:
//! - [`RunLedger`]: append-only agent run records
//! - [`AgentDirectory`]: agent catalog and project assignments
//! - [`ProjectStore`]: projects, members, stage catalog and stage progress
//!
//! Each trait has an in-memory fake in [`crate::fakes`] and a SurrealDB
//! implementation sharing one [`crate::SurrealHandle`].

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StorageError;
use crate::vocab::{
    AssignmentStatus, LifecycleStatus, MemberRole, RunStatus, StageStatus, TriggerSource,
};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Longest error message a run may carry.
pub const ERROR_MESSAGE_MAX_CHARS: usize = 1000;

/// Longest note attached to a stage status change.
pub const EVENT_NOTE_MAX_CHARS: usize = 500;

/// Hard cap on page size for list operations.
pub const MAX_PAGE_SIZE: usize = 200;

fn check_len(
    field: &'static str,
    value: &str,
    min: usize,
    max: usize,
) -> StorageResult<()> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(StorageError::invalid(
            field,
            format!("length must be between {min} and {max} characters (got {len})"),
        ));
    }
    Ok(())
}

fn check_opt_len(field: &'static str, value: Option<&str>, max: usize) -> StorageResult<()> {
    match value {
        Some(v) => check_len(field, v, 0, max),
        None => Ok(()),
    }
}

fn check_page(limit: usize) -> StorageResult<()> {
    if limit == 0 || limit > MAX_PAGE_SIZE {
        return Err(StorageError::invalid(
            "limit",
            format!("must be between 1 and {MAX_PAGE_SIZE}"),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// RunLedger — Agent Run Persistence
// ---------------------------------------------------------------------------

/// Identity of an agent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub i64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A run about to be appended to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAgentRun {
    pub project_id: i64,
    pub agent_id: i64,
    pub stage_id: Option<i64>,
    pub provider: Option<String>,
    pub model_name: Option<String>,
    pub run_status: RunStatus,
    pub trigger_source: TriggerSource,
    pub input_payload: Option<Value>,
    pub output_payload: Option<Value>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub token_input_count: Option<i64>,
    pub token_output_count: Option<i64>,
    pub cost_usd: Option<f64>,
    pub created_by_user_id: Option<i64>,
}

impl NewAgentRun {
    /// A queued, manually triggered run with no payloads.
    pub fn new(project_id: i64, agent_id: i64) -> Self {
        Self {
            project_id,
            agent_id,
            stage_id: None,
            provider: None,
            model_name: None,
            run_status: RunStatus::default(),
            trigger_source: TriggerSource::default(),
            input_payload: None,
            output_payload: None,
            error_message: None,
            started_at: None,
            finished_at: None,
            duration_ms: None,
            token_input_count: None,
            token_output_count: None,
            cost_usd: None,
            created_by_user_id: None,
        }
    }

    pub fn validate(&self) -> StorageResult<()> {
        check_opt_len(
            "error_message",
            self.error_message.as_deref(),
            ERROR_MESSAGE_MAX_CHARS,
        )?;
        if self.duration_ms.is_some_and(|d| d < 0) {
            return Err(StorageError::invalid("duration_ms", "must not be negative"));
        }
        if self.cost_usd.is_some_and(|c| !c.is_finite() || c < 0.0) {
            return Err(StorageError::invalid(
                "cost_usd",
                "must be a finite, non-negative amount",
            ));
        }
        Ok(())
    }
}

/// A persisted agent run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRun {
    pub agent_run_id: RunId,
    pub project_id: i64,
    pub agent_id: i64,
    pub stage_id: Option<i64>,
    pub provider: Option<String>,
    pub model_name: Option<String>,
    pub run_status: RunStatus,
    pub trigger_source: TriggerSource,
    pub input_payload: Option<Value>,
    pub output_payload: Option<Value>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub token_input_count: Option<i64>,
    pub token_output_count: Option<i64>,
    pub cost_usd: Option<f64>,
    pub created_by_user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl AgentRun {
    pub fn from_new(agent_run_id: RunId, run: NewAgentRun, created_at: DateTime<Utc>) -> Self {
        Self {
            agent_run_id,
            project_id: run.project_id,
            agent_id: run.agent_id,
            stage_id: run.stage_id,
            provider: run.provider,
            model_name: run.model_name,
            run_status: run.run_status,
            trigger_source: run.trigger_source,
            input_payload: run.input_payload,
            output_payload: run.output_payload,
            error_message: run.error_message,
            started_at: run.started_at,
            finished_at: run.finished_at,
            duration_ms: run.duration_ms,
            token_input_count: run.token_input_count,
            token_output_count: run.token_output_count,
            cost_usd: run.cost_usd,
            created_by_user_id: run.created_by_user_id,
            created_at,
        }
    }
}

/// Query over the ledger. Results are ordered newest (highest id) first.
#[derive(Debug, Clone, PartialEq)]
pub struct RunFilter {
    /// Restrict to these projects (membership scoping). `Some(vec![])` matches nothing.
    pub project_scope: Option<Vec<i64>>,
    pub project_id: Option<i64>,
    pub agent_id: Option<i64>,
    pub run_status: Option<RunStatus>,
    pub created_since: Option<DateTime<Utc>>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for RunFilter {
    fn default() -> Self {
        Self {
            project_scope: None,
            project_id: None,
            agent_id: None,
            run_status: None,
            created_since: None,
            limit: 50,
            offset: 0,
        }
    }
}

impl RunFilter {
    pub fn validate(&self) -> StorageResult<()> {
        check_page(self.limit)
    }

    pub fn matches(&self, run: &AgentRun) -> bool {
        if let Some(scope) = &self.project_scope {
            if !scope.contains(&run.project_id) {
                return false;
            }
        }
        if self.project_id.is_some_and(|p| p != run.project_id) {
            return false;
        }
        if self.agent_id.is_some_and(|a| a != run.agent_id) {
            return false;
        }
        if self.run_status.is_some_and(|s| s != run.run_status) {
            return false;
        }
        if self.created_since.is_some_and(|t| run.created_at < t) {
            return false;
        }
        true
    }
}

/// Append-only ledger of agent runs.
///
/// Guarantees:
/// - `create_run` validates the row, inserts it, and returns the row as read back.
/// - Rows are never mutated after insertion.
#[async_trait]
pub trait RunLedger: Send + Sync {
    async fn create_run(&self, run: NewAgentRun) -> StorageResult<AgentRun>;

    /// Returns `StorageError::NotFound` for an unknown id.
    async fn get_run(&self, run_id: RunId) -> StorageResult<AgentRun>;

    async fn list_runs(&self, filter: &RunFilter) -> StorageResult<Vec<AgentRun>>;
}

// ---------------------------------------------------------------------------
// AgentDirectory — Agent Catalog and Assignments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAgent {
    pub agent_code: String,
    pub agent_name: String,
    pub module_name: String,
    pub owner_team: String,
    pub default_model: Option<String>,
    pub skill_ref: Option<String>,
    pub is_active: bool,
    pub metadata: Option<Value>,
}

impl NewAgent {
    pub fn validate(&self) -> StorageResult<()> {
        check_len("agent_code", &self.agent_code, 2, 60)?;
        check_len("agent_name", &self.agent_name, 2, 120)?;
        check_len("module_name", &self.module_name, 2, 80)?;
        check_len("owner_team", &self.owner_team, 2, 120)?;
        check_opt_len("default_model", self.default_model.as_deref(), 120)?;
        check_opt_len("skill_ref", self.skill_ref.as_deref(), 255)
    }
}

/// Partial update of an agent. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentPatch {
    pub agent_name: Option<String>,
    pub module_name: Option<String>,
    pub owner_team: Option<String>,
    pub default_model: Option<String>,
    pub skill_ref: Option<String>,
    pub is_active: Option<bool>,
    pub metadata: Option<Value>,
}

impl AgentPatch {
    pub fn is_empty(&self) -> bool {
        self.agent_name.is_none()
            && self.module_name.is_none()
            && self.owner_team.is_none()
            && self.default_model.is_none()
            && self.skill_ref.is_none()
            && self.is_active.is_none()
            && self.metadata.is_none()
    }

    pub fn validate(&self) -> StorageResult<()> {
        if self.is_empty() {
            return Err(StorageError::invalid("agent", "no fields to update"));
        }
        if let Some(name) = &self.agent_name {
            check_len("agent_name", name, 2, 120)?;
        }
        if let Some(module) = &self.module_name {
            check_len("module_name", module, 2, 80)?;
        }
        if let Some(team) = &self.owner_team {
            check_len("owner_team", team, 2, 120)?;
        }
        check_opt_len("default_model", self.default_model.as_deref(), 120)?;
        check_opt_len("skill_ref", self.skill_ref.as_deref(), 255)
    }

    /// Apply the patch to an existing agent, stamping `updated_at`.
    pub fn apply_to(&self, agent: &mut Agent, now: DateTime<Utc>) {
        if let Some(v) = &self.agent_name {
            agent.agent_name = v.clone();
        }
        if let Some(v) = &self.module_name {
            agent.module_name = v.clone();
        }
        if let Some(v) = &self.owner_team {
            agent.owner_team = v.clone();
        }
        if let Some(v) = &self.default_model {
            agent.default_model = Some(v.clone());
        }
        if let Some(v) = &self.skill_ref {
            agent.skill_ref = Some(v.clone());
        }
        if let Some(v) = self.is_active {
            agent.is_active = v;
        }
        if let Some(v) = &self.metadata {
            agent.metadata = Some(v.clone());
        }
        agent.updated_at = now;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: i64,
    pub agent_code: String,
    pub agent_name: String,
    pub module_name: String,
    pub owner_team: String,
    pub default_model: Option<String>,
    pub skill_ref: Option<String>,
    pub is_active: bool,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentFilter {
    pub module_name: Option<String>,
    pub is_active: Option<bool>,
}

impl AgentFilter {
    pub fn matches(&self, agent: &Agent) -> bool {
        self.module_name
            .as_deref()
            .map_or(true, |m| m == agent.module_name)
            && self.is_active.map_or(true, |a| a == agent.is_active)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAssignment {
    pub project_id: i64,
    pub agent_id: i64,
    pub stage_id: Option<i64>,
    pub assignment_status: AssignmentStatus,
    pub assigned_by_user_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub project_agent_assignment_id: i64,
    pub project_id: i64,
    pub agent_id: i64,
    pub stage_id: Option<i64>,
    pub assignment_status: AssignmentStatus,
    pub assigned_at: DateTime<Utc>,
    pub assigned_by_user_id: Option<i64>,
}

/// Query over assignments. Results are ordered by highest assignment id first.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentFilter {
    pub project_scope: Option<Vec<i64>>,
    pub project_id: Option<i64>,
    pub agent_id: Option<i64>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for AssignmentFilter {
    fn default() -> Self {
        Self {
            project_scope: None,
            project_id: None,
            agent_id: None,
            limit: 50,
            offset: 0,
        }
    }
}

impl AssignmentFilter {
    pub fn validate(&self) -> StorageResult<()> {
        check_page(self.limit)
    }

    pub fn matches(&self, assignment: &Assignment) -> bool {
        if let Some(scope) = &self.project_scope {
            if !scope.contains(&assignment.project_id) {
                return false;
            }
        }
        self.project_id.map_or(true, |p| p == assignment.project_id)
            && self.agent_id.map_or(true, |a| a == assignment.agent_id)
    }
}

/// Agent catalog plus project-to-agent assignments.
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    /// Returns `StorageError::Conflict` if `agent_code` is taken.
    async fn create_agent(&self, agent: NewAgent) -> StorageResult<Agent>;

    async fn update_agent(&self, agent_id: i64, patch: AgentPatch) -> StorageResult<Agent>;

    async fn get_agent(&self, agent_id: i64) -> StorageResult<Agent>;

    /// Ordered by highest `agent_id` first.
    async fn list_agents(&self, filter: &AgentFilter) -> StorageResult<Vec<Agent>>;

    /// Rejects unknown or inactive agents; `Conflict` on a duplicate
    /// `(project_id, agent_id, stage_id)` tuple.
    async fn create_assignment(&self, assignment: NewAssignment) -> StorageResult<Assignment>;

    async fn update_assignment_status(
        &self,
        assignment_id: i64,
        status: AssignmentStatus,
    ) -> StorageResult<Assignment>;

    async fn get_assignment(&self, assignment_id: i64) -> StorageResult<Assignment>;

    async fn list_assignments(&self, filter: &AssignmentFilter) -> StorageResult<Vec<Assignment>>;

    /// Agent of the highest-id active assignment on the project whose agent is active.
    async fn latest_active_assignment_agent(&self, project_id: i64) -> StorageResult<Option<i64>>;

    /// Lowest active `agent_id` in the catalog.
    async fn first_active_agent(&self) -> StorageResult<Option<i64>>;
}

// ---------------------------------------------------------------------------
// ProjectStore — Projects, Members and Stages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProject {
    pub project_key: String,
    pub project_name: String,
    pub description: Option<String>,
    pub lifecycle_status: LifecycleStatus,
    pub owner_user_id: i64,
}

impl NewProject {
    pub fn validate(&self) -> StorageResult<()> {
        check_len("project_key", &self.project_key, 2, 40)?;
        check_len("project_name", &self.project_name, 2, 180)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectPatch {
    pub project_name: Option<String>,
    pub description: Option<String>,
    pub lifecycle_status: Option<LifecycleStatus>,
}

impl ProjectPatch {
    pub fn is_empty(&self) -> bool {
        self.project_name.is_none() && self.description.is_none() && self.lifecycle_status.is_none()
    }

    pub fn validate(&self) -> StorageResult<()> {
        if self.is_empty() {
            return Err(StorageError::invalid("project", "no fields to update"));
        }
        if let Some(name) = &self.project_name {
            check_len("project_name", name, 2, 180)?;
        }
        Ok(())
    }

    pub fn apply_to(&self, project: &mut Project, now: DateTime<Utc>) {
        if let Some(v) = &self.project_name {
            project.project_name = v.clone();
        }
        if let Some(v) = &self.description {
            project.description = Some(v.clone());
        }
        if let Some(v) = self.lifecycle_status {
            project.lifecycle_status = v;
        }
        project.updated_at = now;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub project_id: i64,
    pub project_key: String,
    pub project_name: String,
    pub description: Option<String>,
    pub lifecycle_status: LifecycleStatus,
    pub owner_user_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A project as seen by one of its members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectMembership {
    #[serde(flatten)]
    pub project: Project,
    pub member_role: MemberRole,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectMember {
    pub project_member_id: i64,
    pub project_id: i64,
    pub user_id: i64,
    pub member_role: MemberRole,
    pub created_at: DateTime<Utc>,
}

/// Enforce the member invariants for a role change (`Some`) or removal (`None`):
/// the owner stays an admin member, and a project keeps at least one admin.
pub fn ensure_member_change_allowed(
    owner_user_id: i64,
    members: &[ProjectMember],
    user_id: i64,
    new_role: Option<MemberRole>,
) -> StorageResult<()> {
    let current = members
        .iter()
        .find(|m| m.user_id == user_id)
        .ok_or_else(|| StorageError::not_found("project member", user_id))?;

    if user_id == owner_user_id {
        return match new_role {
            None => Err(StorageError::Rejected(
                "project owner cannot be removed from project members".to_string(),
            )),
            Some(role) if role != MemberRole::Admin => Err(StorageError::Rejected(
                "project owner must keep admin role".to_string(),
            )),
            Some(_) => Ok(()),
        };
    }

    let loses_admin = current.member_role == MemberRole::Admin
        && new_role.map_or(true, |r| r != MemberRole::Admin);
    if loses_admin {
        let admins = members
            .iter()
            .filter(|m| m.member_role == MemberRole::Admin)
            .count();
        if admins <= 1 {
            return Err(StorageError::Rejected(
                "project must have at least one admin member".to_string(),
            ));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStage {
    pub stage_code: String,
    pub stage_name: String,
    pub stage_order: i64,
}

impl NewStage {
    pub fn validate(&self) -> StorageResult<()> {
        check_len("stage_code", &self.stage_code, 2, 60)?;
        check_len("stage_name", &self.stage_name, 2, 120)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub stage_id: i64,
    pub stage_code: String,
    pub stage_name: String,
    pub stage_order: i64,
}

/// Address a catalog stage by id or by code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageRef {
    Id(i64),
    Code(String),
}

impl StageRef {
    pub fn matches(&self, stage: &Stage) -> bool {
        match self {
            StageRef::Id(id) => stage.stage_id == *id,
            StageRef::Code(code) => stage.stage_code == *code,
        }
    }
}

impl fmt::Display for StageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageRef::Id(id) => write!(f, "{id}"),
            StageRef::Code(code) => f.write_str(code),
        }
    }
}

/// Status of one catalog stage inside one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageProgress {
    pub project_stage_status_id: i64,
    pub project_id: i64,
    pub stage_id: i64,
    pub stage_code: String,
    pub stage_name: String,
    pub stage_order: i64,
    pub stage_status: StageStatus,
    pub progress_percent: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_by_user_id: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageStatusUpdate {
    pub stage_status: StageStatus,
    pub progress_percent: f64,
    pub event_note: Option<String>,
    pub updated_by_user_id: i64,
}

impl StageStatusUpdate {
    pub fn validate(&self) -> StorageResult<()> {
        if !(0.0..=100.0).contains(&self.progress_percent) {
            return Err(StorageError::invalid(
                "progress_percent",
                "must be between 0 and 100",
            ));
        }
        if self.stage_status == StageStatus::Done && self.progress_percent < 100.0 {
            return Err(StorageError::invalid(
                "progress_percent",
                "must be 100 when stage_status is done",
            ));
        }
        check_opt_len("event_note", self.event_note.as_deref(), EVENT_NOTE_MAX_CHARS)
    }

    /// Timestamps after applying this update over the previous row, if any:
    /// `started_at` is stamped on entering `in_progress` and never cleared;
    /// `completed_at` is stamped for terminal statuses and cleared otherwise.
    pub fn stamp(
        &self,
        previous_started_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let started_at = previous_started_at.or_else(|| {
            (self.stage_status == StageStatus::InProgress).then_some(now)
        });
        let completed_at = self.stage_status.is_terminal().then_some(now);
        (started_at, completed_at)
    }

    /// Payload recorded on the `status_change` event.
    pub fn event_payload(&self) -> Value {
        serde_json::json!({
            "stage_status": self.stage_status,
            "progress_percent": self.progress_percent,
        })
    }
}

/// Audit entry appended for every stage status change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEvent {
    pub project_stage_event_id: i64,
    pub project_id: i64,
    pub stage_id: i64,
    pub event_type: String,
    pub event_payload: Value,
    pub event_note: Option<String>,
    pub created_by_user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

pub const STATUS_CHANGE_EVENT: &str = "status_change";

/// Projects, their members, and per-project stage progress.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Atomically insert the project, its owner as an admin member, and a
    /// `not_started` progress row for every catalog stage.
    async fn create_project(&self, project: NewProject) -> StorageResult<Project>;

    async fn find_project(&self, project_id: i64) -> StorageResult<Option<Project>>;

    async fn update_project(&self, project_id: i64, patch: ProjectPatch)
        -> StorageResult<Project>;

    /// Projects the user belongs to, most recently updated first.
    async fn list_memberships(&self, user_id: i64) -> StorageResult<Vec<ProjectMembership>>;

    async fn member_role(&self, project_id: i64, user_id: i64)
        -> StorageResult<Option<MemberRole>>;

    async fn list_members(&self, project_id: i64) -> StorageResult<Vec<ProjectMember>>;

    /// Returns `StorageError::Conflict` if the user is already a member.
    async fn add_member(
        &self,
        project_id: i64,
        user_id: i64,
        role: MemberRole,
    ) -> StorageResult<ProjectMember>;

    async fn update_member_role(
        &self,
        project_id: i64,
        user_id: i64,
        role: MemberRole,
    ) -> StorageResult<ProjectMember>;

    async fn remove_member(&self, project_id: i64, user_id: i64) -> StorageResult<()>;

    /// Returns `StorageError::Conflict` if `stage_code` is taken.
    async fn register_stage(&self, stage: NewStage) -> StorageResult<Stage>;

    /// Ordered by `stage_order`, then `stage_id`.
    async fn list_stage_catalog(&self) -> StorageResult<Vec<Stage>>;

    async fn get_stage(&self, stage: &StageRef) -> StorageResult<Stage>;

    /// Ordered by `stage_order`.
    async fn list_stage_progress(&self, project_id: i64) -> StorageResult<Vec<StageProgress>>;

    /// Upsert the project's progress row for the stage and append a
    /// `status_change` event.
    async fn update_stage_status(
        &self,
        project_id: i64,
        stage: &StageRef,
        update: StageStatusUpdate,
    ) -> StorageResult<StageProgress>;

    /// Newest first.
    async fn list_stage_events(
        &self,
        project_id: i64,
        stage_id: Option<i64>,
    ) -> StorageResult<Vec<StageEvent>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn member(user_id: i64, role: MemberRole) -> ProjectMember {
        ProjectMember {
            project_member_id: user_id,
            project_id: 1,
            user_id,
            member_role: role,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn error_message_over_limit_is_invalid() {
        let mut run = NewAgentRun::new(1, 1);
        run.error_message = Some("x".repeat(ERROR_MESSAGE_MAX_CHARS + 1));
        assert!(matches!(
            run.validate(),
            Err(StorageError::InvalidField { field: "error_message", .. })
        ));
        run.error_message = Some("x".repeat(ERROR_MESSAGE_MAX_CHARS));
        assert!(run.validate().is_ok());
    }

    #[test]
    fn owner_cannot_be_demoted_or_removed() {
        let members = vec![member(1, MemberRole::Admin), member(2, MemberRole::Admin)];
        assert!(ensure_member_change_allowed(1, &members, 1, Some(MemberRole::Viewer)).is_err());
        assert!(ensure_member_change_allowed(1, &members, 1, None).is_err());
        assert!(ensure_member_change_allowed(1, &members, 1, Some(MemberRole::Admin)).is_ok());
    }

    #[test]
    fn last_admin_is_protected() {
        let members = vec![member(1, MemberRole::Operator), member(2, MemberRole::Admin)];
        let err = ensure_member_change_allowed(1, &members, 2, Some(MemberRole::Viewer))
            .unwrap_err();
        assert!(err.to_string().contains("at least one admin"));
        assert!(ensure_member_change_allowed(1, &members, 2, None).is_err());
    }

    #[test]
    fn second_admin_can_step_down() {
        let members = vec![member(1, MemberRole::Admin), member(2, MemberRole::Admin)];
        assert!(ensure_member_change_allowed(1, &members, 2, Some(MemberRole::Operator)).is_ok());
        assert!(ensure_member_change_allowed(1, &members, 2, None).is_ok());
    }

    #[test]
    fn unknown_member_is_not_found() {
        let members = vec![member(1, MemberRole::Admin)];
        assert!(matches!(
            ensure_member_change_allowed(1, &members, 9, None),
            Err(StorageError::NotFound { .. })
        ));
    }

    #[test]
    fn done_requires_full_progress() {
        let update = StageStatusUpdate {
            stage_status: StageStatus::Done,
            progress_percent: 90.0,
            event_note: None,
            updated_by_user_id: 1,
        };
        assert!(update.validate().is_err());
    }

    #[test]
    fn stamp_keeps_first_start_and_clears_completion() {
        let earlier = Utc::now() - Duration::hours(2);
        let now = Utc::now();
        let in_progress = StageStatusUpdate {
            stage_status: StageStatus::InProgress,
            progress_percent: 10.0,
            event_note: None,
            updated_by_user_id: 1,
        };
        assert_eq!(in_progress.stamp(None, now), (Some(now), None));
        assert_eq!(in_progress.stamp(Some(earlier), now), (Some(earlier), None));

        let blocked = StageStatusUpdate {
            stage_status: StageStatus::Blocked,
            ..in_progress.clone()
        };
        assert_eq!(blocked.stamp(None, now), (None, None));

        let failed = StageStatusUpdate {
            stage_status: StageStatus::Failed,
            ..in_progress
        };
        assert_eq!(failed.stamp(Some(earlier), now), (Some(earlier), Some(now)));
    }

    #[test]
    fn run_filter_scope_excludes_other_projects() {
        let run = AgentRun::from_new(RunId(1), NewAgentRun::new(7, 3), Utc::now());
        let scoped = RunFilter {
            project_scope: Some(vec![1, 2]),
            ..RunFilter::default()
        };
        assert!(!scoped.matches(&run));
        let open = RunFilter::default();
        assert!(open.matches(&run));
    }
}
