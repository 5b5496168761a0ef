//! Default-agent resolution.

use std::sync::Arc;

use agentdesk_state::AgentDirectory;
use tracing::debug;

use crate::domain::{DeskError, Result};

pub const NO_ACTIVE_AGENT: &str = "No active agent available. Create/activate an agent first.";

/// Picks the agent a generation request runs under.
#[derive(Clone)]
pub struct AgentResolver {
    directory: Arc<dyn AgentDirectory>,
}

impl AgentResolver {
    pub fn new(directory: Arc<dyn AgentDirectory>) -> Self {
        Self { directory }
    }

    /// Resolution order:
    /// 1. the requested agent, verbatim;
    /// 2. the agent of the project's highest-id active assignment whose agent is active;
    /// 3. the lowest-id active agent in the catalog.
    ///
    /// Fails with a precondition error when none applies.
    pub async fn resolve(&self, project_id: i64, requested: Option<i64>) -> Result<i64> {
        if let Some(agent_id) = requested {
            return Ok(agent_id);
        }
        if let Some(agent_id) = self
            .directory
            .latest_active_assignment_agent(project_id)
            .await?
        {
            debug!(project_id, agent_id, "agent resolved from project assignment");
            return Ok(agent_id);
        }
        if let Some(agent_id) = self.directory.first_active_agent().await? {
            debug!(project_id, agent_id, "agent resolved from catalog");
            return Ok(agent_id);
        }
        Err(DeskError::Precondition(NO_ACTIVE_AGENT.to_string()))
    }
}
