//! Role-based access control.
//!
//! Per-project rights come from the caller's membership role through the
//! [`Capability`] table. Catalog-wide rights come from the actor's global roles.

use std::fmt;
use std::sync::Arc;

use agentdesk_state::{MemberRole, ProjectStore};
use serde::Serialize;

use crate::domain::{Actor, DeskError, Result};
use crate::obs;

const ALL_ROLES: &[MemberRole] = &[MemberRole::Admin, MemberRole::Operator, MemberRole::Viewer];
const RW_ROLES: &[MemberRole] = &[MemberRole::Admin, MemberRole::Operator];
const ADMIN_ONLY: &[MemberRole] = &[MemberRole::Admin];

/// An action on a project that requires a membership role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ViewProject,
    ViewMembers,
    ViewStages,
    ViewAssignments,
    ViewRuns,
    ViewCosts,
    EditProject,
    ManageStageStatus,
    ManageAssignments,
    CreateAgentRuns,
    GenerateContent,
    ManageMembers,
}

impl Capability {
    pub fn allowed_roles(&self) -> &'static [MemberRole] {
        match self {
            Capability::ViewProject
            | Capability::ViewMembers
            | Capability::ViewStages
            | Capability::ViewAssignments
            | Capability::ViewRuns
            | Capability::ViewCosts => ALL_ROLES,
            Capability::EditProject
            | Capability::ManageStageStatus
            | Capability::ManageAssignments
            | Capability::CreateAgentRuns
            | Capability::GenerateContent => RW_ROLES,
            Capability::ManageMembers => ADMIN_ONLY,
        }
    }

    pub fn allows(&self, role: MemberRole) -> bool {
        self.allowed_roles().contains(&role)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ViewProject => "view_project",
            Capability::ViewMembers => "view_members",
            Capability::ViewStages => "view_stages",
            Capability::ViewAssignments => "view_assignments",
            Capability::ViewRuns => "view_runs",
            Capability::ViewCosts => "view_costs",
            Capability::EditProject => "edit_project",
            Capability::ManageStageStatus => "manage_stage_status",
            Capability::ManageAssignments => "manage_assignments",
            Capability::CreateAgentRuns => "create_agent_runs",
            Capability::GenerateContent => "generate_content",
            Capability::ManageMembers => "manage_members",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a member may do in one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectPermissions {
    pub project_id: i64,
    pub user_id: i64,
    pub member_role: MemberRole,
    pub can_view_project: bool,
    pub can_edit_project: bool,
    pub can_view_members: bool,
    pub can_manage_members: bool,
    pub can_manage_stage_status: bool,
    pub can_manage_assignments: bool,
    pub can_create_agent_runs: bool,
    pub can_generate_content: bool,
}

impl ProjectPermissions {
    pub fn for_role(project_id: i64, user_id: i64, role: MemberRole) -> Self {
        Self {
            project_id,
            user_id,
            member_role: role,
            can_view_project: Capability::ViewProject.allows(role),
            can_edit_project: Capability::EditProject.allows(role),
            can_view_members: Capability::ViewMembers.allows(role),
            can_manage_members: Capability::ManageMembers.allows(role),
            can_manage_stage_status: Capability::ManageStageStatus.allows(role),
            can_manage_assignments: Capability::ManageAssignments.allows(role),
            can_create_agent_runs: Capability::CreateAgentRuns.allows(role),
            can_generate_content: Capability::GenerateContent.allows(role),
        }
    }
}

/// Catalog-wide rights derived from the actor's global roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GlobalPermissions {
    pub can_create_projects: bool,
    pub can_manage_agent_catalog: bool,
}

impl GlobalPermissions {
    pub fn for_actor(actor: &Actor) -> Self {
        let rw = actor.has_any_role(RW_ROLES);
        Self {
            can_create_projects: rw,
            can_manage_agent_catalog: rw,
        }
    }
}

/// Require one of the admin/operator global roles.
pub fn require_global_rw(actor: &Actor, action: &str) -> Result<()> {
    if actor.has_any_role(RW_ROLES) {
        return Ok(());
    }
    obs::emit_access_denied(None, actor.user_id, action, "missing global role");
    Err(DeskError::Forbidden(format!(
        "missing required role(s) for {action}: admin or operator"
    )))
}

/// Confirms project existence and membership before any project-scoped work.
#[derive(Clone)]
pub struct AccessGate {
    projects: Arc<dyn ProjectStore>,
}

impl AccessGate {
    pub fn new(projects: Arc<dyn ProjectStore>) -> Self {
        Self { projects }
    }

    /// The caller's role in the project, if it allows `capability`.
    pub async fn require_capability(
        &self,
        project_id: i64,
        actor: &Actor,
        capability: Capability,
    ) -> Result<MemberRole> {
        if self.projects.find_project(project_id).await?.is_none() {
            return Err(DeskError::NotFound(format!("project {project_id} not found")));
        }
        let Some(role) = self.projects.member_role(project_id, actor.user_id).await? else {
            obs::emit_access_denied(
                Some(project_id),
                actor.user_id,
                capability.as_str(),
                "not a member",
            );
            return Err(DeskError::Forbidden(format!(
                "user {} is not a member of project {project_id}",
                actor.user_id
            )));
        };
        if !capability.allows(role) {
            obs::emit_access_denied(
                Some(project_id),
                actor.user_id,
                capability.as_str(),
                "role not allowed",
            );
            return Err(DeskError::Forbidden(format!(
                "member role '{role}' not allowed for {capability}"
            )));
        }
        Ok(role)
    }

    pub async fn project_permissions(
        &self,
        project_id: i64,
        actor: &Actor,
    ) -> Result<ProjectPermissions> {
        let role = self
            .require_capability(project_id, actor, Capability::ViewProject)
            .await?;
        Ok(ProjectPermissions::for_role(project_id, actor.user_id, role))
    }

    /// Ids of every project the actor belongs to.
    pub async fn project_scope(&self, actor: &Actor) -> Result<Vec<i64>> {
        Ok(self
            .projects
            .list_memberships(actor.user_id)
            .await?
            .into_iter()
            .map(|m| m.project.project_id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_table() {
        for cap in [
            Capability::ViewProject,
            Capability::ViewMembers,
            Capability::ViewStages,
            Capability::ViewAssignments,
            Capability::ViewRuns,
            Capability::ViewCosts,
        ] {
            assert!(cap.allows(MemberRole::Viewer), "{cap}");
        }
        for cap in [
            Capability::EditProject,
            Capability::ManageStageStatus,
            Capability::ManageAssignments,
            Capability::CreateAgentRuns,
            Capability::GenerateContent,
        ] {
            assert!(cap.allows(MemberRole::Operator), "{cap}");
            assert!(!cap.allows(MemberRole::Viewer), "{cap}");
        }
        assert!(Capability::ManageMembers.allows(MemberRole::Admin));
        assert!(!Capability::ManageMembers.allows(MemberRole::Operator));
    }

    #[test]
    fn permissions_by_role() {
        let viewer = ProjectPermissions::for_role(1, 2, MemberRole::Viewer);
        assert!(viewer.can_view_project && viewer.can_view_members);
        assert!(!viewer.can_edit_project && !viewer.can_generate_content);

        let operator = ProjectPermissions::for_role(1, 2, MemberRole::Operator);
        assert!(operator.can_edit_project && operator.can_create_agent_runs);
        assert!(!operator.can_manage_members);

        let admin = ProjectPermissions::for_role(1, 2, MemberRole::Admin);
        assert!(admin.can_manage_members);
    }

    #[test]
    fn global_permissions_follow_roles() {
        let viewer = Actor::new(1, [MemberRole::Viewer]);
        assert!(!GlobalPermissions::for_actor(&viewer).can_create_projects);
        assert!(require_global_rw(&viewer, "create_project").is_err());

        let operator = Actor::new(1, [MemberRole::Viewer, MemberRole::Operator]);
        assert!(GlobalPermissions::for_actor(&operator).can_manage_agent_catalog);
        assert!(require_global_rw(&operator, "create_project").is_ok());
    }
}
