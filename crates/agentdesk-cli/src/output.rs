//! Rendering of command results as pretty JSON or one text line per record.

use agentdesk_core::{
    CostSummary, Dashboard, ImageGenerationResponse, PermissionsReport, TextGenerationResponse,
};
use agentdesk_state::{
    Agent, AgentRun, Assignment, Project, ProjectMember, ProjectMembership, Stage, StageEvent,
    StageProgress,
};
use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}

/// A record with a compact single-line text form.
pub trait TextLine {
    fn text_line(&self) -> String;
}

pub fn render<T: Serialize + TextLine>(format: OutputFormat, value: &T) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(value)?),
        OutputFormat::Text => Ok(value.text_line()),
    }
}

pub fn render_list<T: Serialize + TextLine>(format: OutputFormat, values: &[T]) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(values)?),
        OutputFormat::Text if values.is_empty() => Ok("(none)".to_string()),
        OutputFormat::Text => Ok(values
            .iter()
            .map(TextLine::text_line)
            .collect::<Vec<_>>()
            .join("\n")),
    }
}

fn opt<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map_or_else(|| "-".to_string(), T::to_string)
}

impl TextLine for TextGenerationResponse {
    fn text_line(&self) -> String {
        format!(
            "run {} via {}/{} (${:.6}): {}",
            self.run_id, self.provider, self.model_name, self.cost_usd, self.text
        )
    }
}

impl TextLine for ImageGenerationResponse {
    fn text_line(&self) -> String {
        let payload = match (&self.image_url, &self.image_base64) {
            (Some(url), _) => url.clone(),
            (None, Some(b64)) => format!("<{} base64 chars>", b64.len()),
            (None, None) => "-".to_string(),
        };
        format!(
            "run {} via {}/{} (${:.6}) {} {}",
            self.run_id,
            self.provider,
            self.model_name,
            self.cost_usd,
            opt(&self.mime_type),
            payload
        )
    }
}

impl TextLine for AgentRun {
    fn text_line(&self) -> String {
        format!(
            "{}\tproject={}\tagent={}\t{}\t{}\t{}\tcost={}\t{}",
            self.agent_run_id,
            self.project_id,
            self.agent_id,
            self.run_status,
            opt(&self.provider),
            opt(&self.model_name),
            opt(&self.cost_usd),
            self.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }
}

impl TextLine for CostSummary {
    fn text_line(&self) -> String {
        agentdesk_core::reporting::render_cost_summary_text(self)
            .trim_end()
            .to_string()
    }
}

impl TextLine for Dashboard {
    fn text_line(&self) -> String {
        let mut lines = vec![format!(
            "projects={} blocked_stages={} failed_runs_7d={} queued_runs={} cost_30d=${:.6}",
            self.kpis.projects_count,
            self.kpis.blocked_stages_count,
            self.kpis.failed_runs_count_7d,
            self.kpis.queued_runs_count,
            self.kpis.cost_usd_total_30d
        )];
        for p in &self.projects {
            lines.push(format!(
                "  {} {} [{}] role={} blocked={} failed_7d={} queued={} cost_30d=${:.6}",
                p.project_id,
                p.project_key,
                p.lifecycle_status,
                p.member_role,
                p.blocked_stages_count,
                p.failed_runs_count_7d,
                p.queued_runs_count,
                p.cost_usd_total_30d
            ));
        }
        lines.join("\n")
    }
}

impl TextLine for PermissionsReport {
    fn text_line(&self) -> String {
        let mut lines = vec![format!(
            "user {} create_projects={} manage_agent_catalog={}",
            self.user_id, self.global.can_create_projects, self.global.can_manage_agent_catalog
        )];
        for p in &self.projects {
            lines.push(format!(
                "  project {} role={} edit={} members={} stages={} assignments={} runs={} generate={}",
                p.project_id,
                p.member_role,
                p.can_edit_project,
                p.can_manage_members,
                p.can_manage_stage_status,
                p.can_manage_assignments,
                p.can_create_agent_runs,
                p.can_generate_content
            ));
        }
        lines.join("\n")
    }
}

impl TextLine for Project {
    fn text_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\towner={}",
            self.project_id,
            self.project_key,
            self.project_name,
            self.lifecycle_status,
            self.owner_user_id
        )
    }
}

impl TextLine for ProjectMembership {
    fn text_line(&self) -> String {
        format!("{}\trole={}", self.project.text_line(), self.member_role)
    }
}

impl TextLine for ProjectMember {
    fn text_line(&self) -> String {
        format!(
            "project={}\tuser={}\t{}",
            self.project_id, self.user_id, self.member_role
        )
    }
}

impl TextLine for Stage {
    fn text_line(&self) -> String {
        format!(
            "{}\t{}\t{}\torder={}",
            self.stage_id, self.stage_code, self.stage_name, self.stage_order
        )
    }
}

impl TextLine for StageProgress {
    fn text_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}%",
            self.stage_order, self.stage_code, self.stage_status, self.progress_percent
        )
    }
}

impl TextLine for StageEvent {
    fn text_line(&self) -> String {
        format!(
            "{}\tstage={}\t{}\t{}\t{}",
            self.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.stage_id,
            self.event_type,
            self.event_payload,
            opt(&self.event_note)
        )
    }
}

impl TextLine for Agent {
    fn text_line(&self) -> String {
        let state = if self.is_active { "active" } else { "inactive" };
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            self.agent_id, self.agent_code, self.agent_name, self.module_name, self.owner_team, state
        )
    }
}

impl TextLine for Assignment {
    fn text_line(&self) -> String {
        format!(
            "{}\tproject={}\tagent={}\tstage={}\t{}",
            self.project_agent_assignment_id,
            self.project_id,
            self.agent_id,
            opt(&self.stage_id),
            self.assignment_status
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentdesk_state::{LifecycleStatus, MemberRole};
    use chrono::Utc;

    fn project() -> Project {
        Project {
            project_id: 3,
            project_key: "ACME".to_string(),
            project_name: "Acme launch".to_string(),
            description: None,
            lifecycle_status: LifecycleStatus::Active,
            owner_user_id: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn text_lines_are_tab_separated() {
        let line = ProjectMembership {
            project: project(),
            member_role: MemberRole::Operator,
        }
        .text_line();
        assert_eq!(line, "3\tACME\tAcme launch\tactive\towner=1\trole=operator");
    }

    #[test]
    fn empty_text_list_says_none() {
        let out = render_list::<Project>(OutputFormat::Text, &[]).unwrap();
        assert_eq!(out, "(none)");
        let json = render_list::<Project>(OutputFormat::Json, &[]).unwrap();
        assert_eq!(json, "[]");
    }

    #[test]
    fn json_is_pretty() {
        let out = render(OutputFormat::Json, &project()).unwrap();
        assert!(out.contains("\n  \"project_key\": \"ACME\""));
    }
}
