//! Cost and dashboard rollups over the run ledger.
//!
//! Aggregation is pure: callers gather runs and projects within the actor's
//! scope, then hand them to [`summarize_costs`] or [`build_dashboard`].

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use agentdesk_state::{
    AgentRun, LifecycleStatus, MemberRole, Project, ProjectMembership, RunFilter, RunLedger,
    RunStatus, StageProgress, StageStatus, MAX_PAGE_SIZE,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{DeskError, Result};
use agentdesk_providers::pricing::round_usd;

pub const DEFAULT_COST_DAYS: u32 = 30;
pub const MAX_COST_DAYS: u32 = 365;
pub const DEFAULT_DASHBOARD_LIMIT: usize = 20;
pub const FAILED_RUNS_WINDOW_DAYS: i64 = 7;
pub const COST_WINDOW_DAYS: i64 = 30;
const UNKNOWN_PROVIDER: &str = "unknown";

pub fn validate_days(days: u32) -> Result<()> {
    if !(1..=MAX_COST_DAYS).contains(&days) {
        return Err(DeskError::validation(format!(
            "days must be between 1 and {MAX_COST_DAYS}"
        )));
    }
    Ok(())
}

pub fn validate_limit(limit: usize) -> Result<()> {
    if !(1..=MAX_PAGE_SIZE).contains(&limit) {
        return Err(DeskError::validation(format!(
            "limit must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }
    Ok(())
}

/// Read every run matching `filter`, page by page.
pub async fn collect_runs(ledger: &dyn RunLedger, filter: RunFilter) -> Result<Vec<AgentRun>> {
    let mut filter = RunFilter {
        limit: MAX_PAGE_SIZE,
        offset: 0,
        ..filter
    };
    let mut runs = Vec::new();
    loop {
        let page = ledger.list_runs(&filter).await?;
        let done = page.len() < filter.limit;
        runs.extend(page);
        if done {
            return Ok(runs);
        }
        filter.offset += filter.limit;
    }
}

// =============================================================================
// COSTS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostByProvider {
    pub provider: String,
    pub total_cost_usd: f64,
    pub runs_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostByModel {
    pub provider: Option<String>,
    pub model_name: Option<String>,
    pub total_cost_usd: f64,
    pub runs_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostByProject {
    pub project_id: i64,
    pub project_key: String,
    pub project_name: String,
    pub total_cost_usd: f64,
    pub runs_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    pub days: u32,
    pub project_id: Option<i64>,
    pub total_cost_usd: f64,
    pub total_runs_count: u64,
    pub by_provider: Vec<CostByProvider>,
    pub by_model: Vec<CostByModel>,
    pub by_project: Vec<CostByProject>,
}

#[derive(Default)]
struct Tally {
    cost: f64,
    runs: u64,
}

impl Tally {
    fn add(&mut self, run: &AgentRun) {
        self.cost += run.cost_usd.unwrap_or(0.0);
        self.runs += 1;
    }
}

fn by_cost_then_name(a: (f64, &str), b: (f64, &str)) -> Ordering {
    b.0.partial_cmp(&a.0)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.1.cmp(b.1))
}

/// Roll runs up by provider, by (provider, model) and by project.
///
/// Runs whose project is missing from `projects` count toward the totals
/// but get no per-project row.
pub fn summarize_costs(
    days: u32,
    project_id: Option<i64>,
    runs: &[AgentRun],
    projects: &[Project],
) -> CostSummary {
    let mut total = Tally::default();
    let mut providers: BTreeMap<String, Tally> = BTreeMap::new();
    let mut models: BTreeMap<(Option<String>, Option<String>), Tally> = BTreeMap::new();
    let mut per_project: BTreeMap<i64, Tally> = BTreeMap::new();

    for run in runs {
        total.add(run);
        providers
            .entry(run.provider.clone().unwrap_or_else(|| UNKNOWN_PROVIDER.to_string()))
            .or_default()
            .add(run);
        models
            .entry((run.provider.clone(), run.model_name.clone()))
            .or_default()
            .add(run);
        per_project.entry(run.project_id).or_default().add(run);
    }

    let mut by_provider: Vec<CostByProvider> = providers
        .into_iter()
        .map(|(provider, t)| CostByProvider {
            provider,
            total_cost_usd: round_usd(t.cost),
            runs_count: t.runs,
        })
        .collect();
    by_provider.sort_by(|a, b| {
        by_cost_then_name((a.total_cost_usd, &a.provider), (b.total_cost_usd, &b.provider))
    });

    let mut by_model: Vec<CostByModel> = models
        .into_iter()
        .map(|((provider, model_name), t)| CostByModel {
            provider,
            model_name,
            total_cost_usd: round_usd(t.cost),
            runs_count: t.runs,
        })
        .collect();
    by_model.sort_by(|a, b| {
        let name = |m: &CostByModel| m.model_name.clone().unwrap_or_default();
        by_cost_then_name((a.total_cost_usd, &name(a)), (b.total_cost_usd, &name(b)))
    });

    let names: HashMap<i64, &Project> = projects.iter().map(|p| (p.project_id, p)).collect();
    let mut by_project: Vec<CostByProject> = per_project
        .into_iter()
        .filter_map(|(id, t)| {
            names.get(&id).map(|p| CostByProject {
                project_id: id,
                project_key: p.project_key.clone(),
                project_name: p.project_name.clone(),
                total_cost_usd: round_usd(t.cost),
                runs_count: t.runs,
            })
        })
        .collect();
    by_project.sort_by(|a, b| {
        by_cost_then_name(
            (a.total_cost_usd, &a.project_name),
            (b.total_cost_usd, &b.project_name),
        )
    });

    CostSummary {
        days,
        project_id,
        total_cost_usd: round_usd(total.cost),
        total_runs_count: total.runs,
        by_provider,
        by_model,
        by_project,
    }
}

// =============================================================================
// DASHBOARD
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardKpis {
    pub projects_count: u64,
    pub blocked_stages_count: u64,
    pub failed_runs_count_7d: u64,
    pub queued_runs_count: u64,
    pub cost_usd_total_30d: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardProject {
    pub project_id: i64,
    pub project_key: String,
    pub project_name: String,
    pub lifecycle_status: LifecycleStatus,
    pub member_role: MemberRole,
    pub blocked_stages_count: u64,
    pub failed_runs_count_7d: u64,
    pub queued_runs_count: u64,
    pub cost_usd_total_30d: f64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub user_id: i64,
    pub generated_at: DateTime<Utc>,
    pub kpis: DashboardKpis,
    pub projects: Vec<DashboardProject>,
}

/// Inputs for [`build_dashboard`], all already scoped to the user.
pub struct DashboardInputs<'a> {
    pub memberships: &'a [ProjectMembership],
    pub stage_progress: &'a [StageProgress],
    /// Runs created within the cost window.
    pub recent_runs: &'a [AgentRun],
    /// Every queued run, regardless of age.
    pub queued_runs: &'a [AgentRun],
}

#[derive(Default)]
struct ProjectCounters {
    blocked: u64,
    failed_7d: u64,
    queued: u64,
    cost_30d: f64,
}

pub fn build_dashboard(
    user_id: i64,
    now: DateTime<Utc>,
    inputs: DashboardInputs<'_>,
    limit: usize,
) -> Dashboard {
    let failed_since = now - Duration::days(FAILED_RUNS_WINDOW_DAYS);
    let cost_since = now - Duration::days(COST_WINDOW_DAYS);
    let mut counters: HashMap<i64, ProjectCounters> = HashMap::new();

    for progress in inputs.stage_progress {
        if progress.stage_status == StageStatus::Blocked {
            counters.entry(progress.project_id).or_default().blocked += 1;
        }
    }
    for run in inputs.recent_runs {
        if run.created_at < cost_since {
            continue;
        }
        let c = counters.entry(run.project_id).or_default();
        c.cost_30d += run.cost_usd.unwrap_or(0.0);
        if run.run_status == RunStatus::Failed && run.created_at >= failed_since {
            c.failed_7d += 1;
        }
    }
    for run in inputs.queued_runs {
        if run.run_status == RunStatus::Queued {
            counters.entry(run.project_id).or_default().queued += 1;
        }
    }

    let mut kpis = DashboardKpis {
        projects_count: inputs.memberships.len() as u64,
        blocked_stages_count: 0,
        failed_runs_count_7d: 0,
        queued_runs_count: 0,
        cost_usd_total_30d: 0.0,
    };
    let mut cost_total = 0.0;
    for membership in inputs.memberships {
        if let Some(c) = counters.get(&membership.project.project_id) {
            kpis.blocked_stages_count += c.blocked;
            kpis.failed_runs_count_7d += c.failed_7d;
            kpis.queued_runs_count += c.queued;
            cost_total += c.cost_30d;
        }
    }
    kpis.cost_usd_total_30d = round_usd(cost_total);

    let mut projects: Vec<DashboardProject> = inputs
        .memberships
        .iter()
        .map(|m| {
            let c = counters.remove(&m.project.project_id).unwrap_or_default();
            DashboardProject {
                project_id: m.project.project_id,
                project_key: m.project.project_key.clone(),
                project_name: m.project.project_name.clone(),
                lifecycle_status: m.project.lifecycle_status,
                member_role: m.member_role,
                blocked_stages_count: c.blocked,
                failed_runs_count_7d: c.failed_7d,
                queued_runs_count: c.queued,
                cost_usd_total_30d: round_usd(c.cost_30d),
                updated_at: m.project.updated_at,
            }
        })
        .collect();
    projects.sort_by(|a, b| {
        b.updated_at
            .cmp(&a.updated_at)
            .then_with(|| b.project_id.cmp(&a.project_id))
    });
    projects.truncate(limit);

    Dashboard {
        user_id,
        generated_at: now,
        kpis,
        projects,
    }
}

/// One line per provider plus totals.
pub fn render_cost_summary_text(summary: &CostSummary) -> String {
    let mut out = format!(
        "last {} days: ${:.6} over {} runs\n",
        summary.days, summary.total_cost_usd, summary.total_runs_count
    );
    for row in &summary.by_provider {
        out.push_str(&format!(
            "  {}: ${:.6} ({} runs)\n",
            row.provider, row.total_cost_usd, row.runs_count
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentdesk_state::{NewAgentRun, RunId};

    fn run(id: i64, project_id: i64, provider: Option<&str>, model: Option<&str>, cost: f64) -> AgentRun {
        let mut new = NewAgentRun::new(project_id, 1);
        new.provider = provider.map(String::from);
        new.model_name = model.map(String::from);
        new.cost_usd = Some(cost);
        AgentRun::from_new(RunId(id), new, Utc::now())
    }

    fn project(id: i64, name: &str) -> Project {
        Project {
            project_id: id,
            project_key: format!("P{id}"),
            project_name: name.to_string(),
            description: None,
            lifecycle_status: LifecycleStatus::Active,
            owner_user_id: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn cost_breakdowns_sort_by_cost_then_name() {
        let runs = vec![
            run(1, 1, Some("openai"), Some("gpt"), 0.5),
            run(2, 1, Some("gemini"), Some("gem"), 0.5),
            run(3, 2, None, None, 0.0),
            run(4, 2, Some("openai"), Some("gpt"), 1.25),
        ];
        let projects = vec![project(1, "Beta"), project(2, "Alpha")];
        let summary = summarize_costs(30, None, &runs, &projects);

        assert_eq!(summary.total_runs_count, 4);
        assert_eq!(summary.total_cost_usd, 2.25);

        let providers: Vec<&str> = summary.by_provider.iter().map(|p| p.provider.as_str()).collect();
        assert_eq!(providers, vec!["openai", "gemini", "unknown"]);
        assert_eq!(summary.by_provider[0].runs_count, 2);

        assert_eq!(summary.by_model[0].model_name.as_deref(), Some("gpt"));
        assert_eq!(summary.by_model[0].total_cost_usd, 1.75);

        let names: Vec<&str> = summary.by_project.iter().map(|p| p.project_name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Beta"]);
    }

    #[test]
    fn equal_costs_fall_back_to_name() {
        let runs = vec![run(1, 2, None, None, 1.0), run(2, 1, None, None, 1.0)];
        let projects = vec![project(1, "Zed"), project(2, "Ant")];
        let summary = summarize_costs(7, None, &runs, &projects);
        assert_eq!(summary.by_project[0].project_name, "Ant");
    }

    #[test]
    fn bounds_are_checked() {
        assert!(validate_days(0).is_err());
        assert!(validate_days(366).is_err());
        assert!(validate_days(365).is_ok());
        assert!(validate_limit(0).is_err());
        assert!(validate_limit(201).is_err());
        assert!(validate_limit(200).is_ok());
    }

    #[test]
    fn render_lists_providers() {
        let summary = summarize_costs(30, None, &[run(1, 1, Some("openai"), None, 0.1)], &[]);
        let text = render_cost_summary_text(&summary);
        assert!(text.contains("openai: $0.100000 (1 runs)"));
    }
}
