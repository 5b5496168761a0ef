//! SurrealDB row shapes
//!
//! Rows mirror the domain records in [`crate::storage_traits`] with two
//! storage-side differences: enumerated columns are stored as their string
//! names, and structured payloads are stored as serialized JSON text.
//! Conversion back to the domain re-validates both.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StorageError;
use crate::storage_traits::*;

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Module for serializing optional chrono DateTime to SurrealDB datetime format
mod surreal_datetime_opt {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(d) => {
                let sd = SurrealDatetime::from(*d);
                serde::Serialize::serialize(&Some(sd), serializer)
            }
            None => serde::Serialize::serialize(&None::<SurrealDatetime>, serializer),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = Option::<SurrealDatetime>::deserialize(deserializer)?;
        Ok(sd.map(DateTime::from))
    }
}

fn encode_json(value: &Option<Value>) -> Result<Option<String>, StorageError> {
    value
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(StorageError::from)
}

fn decode_json(text: Option<String>) -> Result<Option<Value>, StorageError> {
    text.map(|t| serde_json::from_str(&t))
        .transpose()
        .map_err(StorageError::from)
}

/// Counter row in the `sequences` table.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SequenceRow {
    pub value: i64,
}

// ---------------------------------------------------------------------------
// agent_runs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RunRow {
    pub agent_run_id: i64,
    pub project_id: i64,
    pub agent_id: i64,
    pub stage_id: Option<i64>,
    pub provider: Option<String>,
    pub model_name: Option<String>,
    pub run_status: String,
    pub trigger_source: String,
    pub input_payload: Option<String>,
    pub output_payload: Option<String>,
    pub error_message: Option<String>,
    #[serde(default, with = "surreal_datetime_opt")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, with = "surreal_datetime_opt")]
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub token_input_count: Option<i64>,
    pub token_output_count: Option<i64>,
    pub cost_usd: Option<f64>,
    pub created_by_user_id: Option<i64>,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl RunRow {
    pub fn from_new(
        id: i64,
        run: &NewAgentRun,
        created_at: DateTime<Utc>,
    ) -> Result<Self, StorageError> {
        Ok(Self {
            agent_run_id: id,
            project_id: run.project_id,
            agent_id: run.agent_id,
            stage_id: run.stage_id,
            provider: run.provider.clone(),
            model_name: run.model_name.clone(),
            run_status: run.run_status.as_str().to_string(),
            trigger_source: run.trigger_source.as_str().to_string(),
            input_payload: encode_json(&run.input_payload)?,
            output_payload: encode_json(&run.output_payload)?,
            error_message: run.error_message.clone(),
            started_at: run.started_at,
            finished_at: run.finished_at,
            duration_ms: run.duration_ms,
            token_input_count: run.token_input_count,
            token_output_count: run.token_output_count,
            cost_usd: run.cost_usd,
            created_by_user_id: run.created_by_user_id,
            created_at,
        })
    }

    pub fn into_domain(self) -> Result<AgentRun, StorageError> {
        Ok(AgentRun {
            agent_run_id: RunId(self.agent_run_id),
            project_id: self.project_id,
            agent_id: self.agent_id,
            stage_id: self.stage_id,
            provider: self.provider,
            model_name: self.model_name,
            run_status: self.run_status.parse()?,
            trigger_source: self.trigger_source.parse()?,
            input_payload: decode_json(self.input_payload)?,
            output_payload: decode_json(self.output_payload)?,
            error_message: self.error_message,
            started_at: self.started_at,
            finished_at: self.finished_at,
            duration_ms: self.duration_ms,
            token_input_count: self.token_input_count,
            token_output_count: self.token_output_count,
            cost_usd: self.cost_usd,
            created_by_user_id: self.created_by_user_id,
            created_at: self.created_at,
        })
    }
}

// ---------------------------------------------------------------------------
// agent_catalog / project_agent_assignments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AgentRow {
    pub agent_id: i64,
    pub agent_code: String,
    pub agent_name: String,
    pub module_name: String,
    pub owner_team: String,
    pub default_model: Option<String>,
    pub skill_ref: Option<String>,
    pub is_active: bool,
    pub metadata_json: Option<String>,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "surreal_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl AgentRow {
    pub fn from_domain(agent: &Agent) -> Result<Self, StorageError> {
        Ok(Self {
            agent_id: agent.agent_id,
            agent_code: agent.agent_code.clone(),
            agent_name: agent.agent_name.clone(),
            module_name: agent.module_name.clone(),
            owner_team: agent.owner_team.clone(),
            default_model: agent.default_model.clone(),
            skill_ref: agent.skill_ref.clone(),
            is_active: agent.is_active,
            metadata_json: encode_json(&agent.metadata)?,
            created_at: agent.created_at,
            updated_at: agent.updated_at,
        })
    }

    pub fn into_domain(self) -> Result<Agent, StorageError> {
        Ok(Agent {
            agent_id: self.agent_id,
            agent_code: self.agent_code,
            agent_name: self.agent_name,
            module_name: self.module_name,
            owner_team: self.owner_team,
            default_model: self.default_model,
            skill_ref: self.skill_ref,
            is_active: self.is_active,
            metadata: decode_json(self.metadata_json)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AssignmentRow {
    pub project_agent_assignment_id: i64,
    pub project_id: i64,
    pub agent_id: i64,
    pub stage_id: Option<i64>,
    pub assignment_status: String,
    #[serde(with = "surreal_datetime")]
    pub assigned_at: DateTime<Utc>,
    pub assigned_by_user_id: Option<i64>,
}

impl AssignmentRow {
    pub fn into_domain(self) -> Result<Assignment, StorageError> {
        Ok(Assignment {
            project_agent_assignment_id: self.project_agent_assignment_id,
            project_id: self.project_id,
            agent_id: self.agent_id,
            stage_id: self.stage_id,
            assignment_status: self.assignment_status.parse()?,
            assigned_at: self.assigned_at,
            assigned_by_user_id: self.assigned_by_user_id,
        })
    }
}

// ---------------------------------------------------------------------------
// projects / project_members
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ProjectRow {
    pub project_id: i64,
    pub project_key: String,
    pub project_name: String,
    pub description: Option<String>,
    pub lifecycle_status: String,
    pub owner_user_id: i64,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "surreal_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl ProjectRow {
    pub fn from_domain(project: &Project) -> Self {
        Self {
            project_id: project.project_id,
            project_key: project.project_key.clone(),
            project_name: project.project_name.clone(),
            description: project.description.clone(),
            lifecycle_status: project.lifecycle_status.as_str().to_string(),
            owner_user_id: project.owner_user_id,
            created_at: project.created_at,
            updated_at: project.updated_at,
        }
    }

    pub fn into_domain(self) -> Result<Project, StorageError> {
        Ok(Project {
            project_id: self.project_id,
            project_key: self.project_key,
            project_name: self.project_name,
            description: self.description,
            lifecycle_status: self.lifecycle_status.parse()?,
            owner_user_id: self.owner_user_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct MemberRow {
    pub project_member_id: i64,
    pub project_id: i64,
    pub user_id: i64,
    pub member_role: String,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl MemberRow {
    pub fn into_domain(self) -> Result<ProjectMember, StorageError> {
        Ok(ProjectMember {
            project_member_id: self.project_member_id,
            project_id: self.project_id,
            user_id: self.user_id,
            member_role: self.member_role.parse()?,
            created_at: self.created_at,
        })
    }
}

// ---------------------------------------------------------------------------
// stage_catalog / project_stage_status / project_stage_events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StageRow {
    pub stage_id: i64,
    pub stage_code: String,
    pub stage_name: String,
    pub stage_order: i64,
}

impl From<StageRow> for Stage {
    fn from(row: StageRow) -> Self {
        Stage {
            stage_id: row.stage_id,
            stage_code: row.stage_code,
            stage_name: row.stage_name,
            stage_order: row.stage_order,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ProgressRow {
    pub project_stage_status_id: i64,
    pub project_id: i64,
    pub stage_id: i64,
    pub stage_status: String,
    pub progress_percent: f64,
    #[serde(default, with = "surreal_datetime_opt")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, with = "surreal_datetime_opt")]
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_by_user_id: Option<i64>,
    #[serde(with = "surreal_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl ProgressRow {
    pub fn into_domain(self, stage: &Stage) -> Result<StageProgress, StorageError> {
        Ok(StageProgress {
            project_stage_status_id: self.project_stage_status_id,
            project_id: self.project_id,
            stage_id: self.stage_id,
            stage_code: stage.stage_code.clone(),
            stage_name: stage.stage_name.clone(),
            stage_order: stage.stage_order,
            stage_status: self.stage_status.parse()?,
            progress_percent: self.progress_percent,
            started_at: self.started_at,
            completed_at: self.completed_at,
            updated_by_user_id: self.updated_by_user_id,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StageEventRow {
    pub project_stage_event_id: i64,
    pub project_id: i64,
    pub stage_id: i64,
    pub event_type: String,
    pub event_payload: String,
    pub event_note: Option<String>,
    pub created_by_user_id: Option<i64>,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl StageEventRow {
    pub fn into_domain(self) -> Result<StageEvent, StorageError> {
        Ok(StageEvent {
            project_stage_event_id: self.project_stage_event_id,
            project_id: self.project_id,
            stage_id: self.stage_id,
            event_type: self.event_type,
            event_payload: serde_json::from_str(&self.event_payload)?,
            event_note: self.event_note,
            created_by_user_id: self.created_by_user_id,
            created_at: self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::{RunStatus, TriggerSource};
    use serde_json::json;

    #[test]
    fn run_row_stores_payloads_as_json_text() {
        let mut run = NewAgentRun::new(3, 4);
        run.run_status = RunStatus::Success;
        run.trigger_source = TriggerSource::Api;
        run.input_payload = Some(json!({"prompt": "hello"}));
        let row = RunRow::from_new(9, &run, Utc::now()).unwrap();
        assert_eq!(row.input_payload.as_deref(), Some(r#"{"prompt":"hello"}"#));
        assert_eq!(row.run_status, "success");

        let back = row.into_domain().unwrap();
        assert_eq!(back.agent_run_id, RunId(9));
        assert_eq!(back.input_payload, Some(json!({"prompt": "hello"})));
        assert_eq!(back.trigger_source, TriggerSource::Api);
    }

    #[test]
    fn unknown_status_in_row_fails_conversion() {
        let run = NewAgentRun::new(1, 1);
        let mut row = RunRow::from_new(1, &run, Utc::now()).unwrap();
        row.run_status = "exploded".to_string();
        assert!(matches!(
            row.into_domain(),
            Err(StorageError::InvalidField { field: "run_status", .. })
        ));
    }
}
