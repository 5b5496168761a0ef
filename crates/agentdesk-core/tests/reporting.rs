//! Cost summary and dashboard rollups, scoped to the caller's memberships.

use std::sync::Arc;

use agentdesk_core::reporting::DEFAULT_DASHBOARD_LIMIT;
use agentdesk_core::{Actor, DeskService, ErrorClass, StageChange};
use agentdesk_providers::ProviderConfig;
use agentdesk_state::fakes::{MemoryAgentDirectory, MemoryProjectStore, MemoryRunLedger};
use agentdesk_state::{
    LifecycleStatus, MemberRole, NewAgentRun, NewProject, NewStage, RunStatus, StageRef,
    StageStatus,
};
use chrono::{Duration, Utc};

struct Fixture {
    service: DeskService,
    ledger: Arc<MemoryRunLedger>,
    alpha: i64,
    beta: i64,
    hidden: i64,
}

fn admin(user_id: i64) -> Actor {
    Actor::new(user_id, [MemberRole::Admin])
}

fn run(project_id: i64, provider: Option<&str>, model: Option<&str>, cost: f64) -> NewAgentRun {
    let mut run = NewAgentRun::new(project_id, 1);
    run.provider = provider.map(String::from);
    run.model_name = model.map(String::from);
    run.cost_usd = Some(cost);
    run
}

async fn fixture() -> Fixture {
    let ledger = Arc::new(MemoryRunLedger::new());
    let service = DeskService::new(
        Vec::new(),
        &ProviderConfig::default(),
        ledger.clone(),
        Arc::new(MemoryAgentDirectory::new()),
        Arc::new(MemoryProjectStore::new()),
    );
    service
        .register_stage(
            &admin(1),
            NewStage {
                stage_code: "review".to_string(),
                stage_name: "Review".to_string(),
                stage_order: 1,
            },
        )
        .await
        .unwrap();

    let mut ids = Vec::new();
    for (key, owner) in [("ALPHA", 1), ("BETA", 1), ("HIDDEN", 9)] {
        let project = service
            .create_project(
                &admin(owner),
                NewProject {
                    project_key: key.to_string(),
                    project_name: key.to_lowercase(),
                    description: None,
                    lifecycle_status: LifecycleStatus::Active,
                    owner_user_id: owner,
                },
            )
            .await
            .unwrap();
        ids.push(project.project_id);
    }
    Fixture {
        service,
        ledger,
        alpha: ids[0],
        beta: ids[1],
        hidden: ids[2],
    }
}

#[tokio::test]
async fn cost_summary_rolls_up_visible_runs() {
    let f = fixture().await;
    let now = Utc::now();
    f.ledger
        .insert_at(run(f.alpha, Some("openai"), Some("gpt-5.2"), 0.25), now)
        .unwrap();
    f.ledger
        .insert_at(run(f.alpha, Some("openai"), Some("gpt-5.2"), 0.5), now)
        .unwrap();
    f.ledger
        .insert_at(run(f.beta, Some("gemini"), Some("gemini-3"), 1.0), now)
        .unwrap();
    f.ledger.insert_at(run(f.beta, None, None, 0.0), now).unwrap();
    f.ledger
        .insert_at(run(f.alpha, Some("openai"), None, 9.0), now - Duration::days(40))
        .unwrap();
    f.ledger
        .insert_at(run(f.hidden, Some("openai"), None, 5.0), now)
        .unwrap();

    let summary = f.service.cost_summary(&admin(1), 30, None).await.unwrap();
    assert_eq!(summary.total_runs_count, 4);
    assert_eq!(summary.total_cost_usd, 1.75);

    let providers: Vec<(&str, u64)> = summary
        .by_provider
        .iter()
        .map(|p| (p.provider.as_str(), p.runs_count))
        .collect();
    assert_eq!(providers, vec![("gemini", 1), ("openai", 2), ("unknown", 1)]);

    let projects: Vec<(&str, f64)> = summary
        .by_project
        .iter()
        .map(|p| (p.project_key.as_str(), p.total_cost_usd))
        .collect();
    assert_eq!(projects, vec![("BETA", 1.0), ("ALPHA", 0.75)]);

    let wide = f.service.cost_summary(&admin(1), 60, Some(f.alpha)).await.unwrap();
    assert_eq!(wide.total_runs_count, 3);
    assert_eq!(wide.project_id, Some(f.alpha));
}

#[tokio::test]
async fn cost_summary_checks_bounds_and_access() {
    let f = fixture().await;
    let bad = f.service.cost_summary(&admin(1), 0, None).await.unwrap_err();
    assert_eq!(bad.class(), ErrorClass::BadRequest);
    let too_long = f.service.cost_summary(&admin(1), 366, None).await.unwrap_err();
    assert_eq!(too_long.class(), ErrorClass::BadRequest);

    let hidden = f
        .service
        .cost_summary(&admin(1), 30, Some(f.hidden))
        .await
        .unwrap_err();
    assert_eq!(hidden.class(), ErrorClass::Forbidden);
    let missing = f.service.cost_summary(&admin(1), 30, Some(999)).await.unwrap_err();
    assert_eq!(missing.class(), ErrorClass::NotFound);
}

#[tokio::test]
async fn dashboard_counts_per_project() {
    let f = fixture().await;
    let now = Utc::now();
    let failed = |project_id| {
        let mut r = run(project_id, Some("openai"), None, 0.1);
        r.run_status = RunStatus::Failed;
        r
    };
    f.ledger.insert_at(failed(f.alpha), now - Duration::days(2)).unwrap();
    f.ledger.insert_at(failed(f.alpha), now - Duration::days(10)).unwrap();
    f.ledger
        .insert_at(run(f.beta, None, None, 0.0), now - Duration::days(90))
        .unwrap();
    f.ledger.insert_at(failed(f.hidden), now).unwrap();

    f.service
        .set_stage_status(
            &admin(1),
            f.beta,
            StageChange {
                stage: StageRef::Code("review".to_string()),
                stage_status: StageStatus::Blocked,
                progress_percent: 30.0,
                event_note: None,
            },
        )
        .await
        .unwrap();

    let dash = f
        .service
        .dashboard(&admin(1), DEFAULT_DASHBOARD_LIMIT)
        .await
        .unwrap();
    assert_eq!(dash.user_id, 1);
    assert_eq!(dash.kpis.projects_count, 2);
    assert_eq!(dash.kpis.blocked_stages_count, 1);
    assert_eq!(dash.kpis.failed_runs_count_7d, 1);
    assert_eq!(dash.kpis.queued_runs_count, 1);
    assert_eq!(dash.kpis.cost_usd_total_30d, 0.2);

    let alpha = dash.projects.iter().find(|p| p.project_id == f.alpha).unwrap();
    assert_eq!(alpha.member_role, MemberRole::Admin);
    assert_eq!(alpha.failed_runs_count_7d, 1);
    assert_eq!(alpha.cost_usd_total_30d, 0.2);
    let beta = dash.projects.iter().find(|p| p.project_id == f.beta).unwrap();
    assert_eq!(beta.blocked_stages_count, 1);
    assert_eq!(beta.queued_runs_count, 1);
    assert!(dash.projects.iter().all(|p| p.project_id != f.hidden));

    let ordered = dash
        .projects
        .windows(2)
        .all(|w| w[0].updated_at >= w[1].updated_at);
    assert!(ordered);

    let one = f.service.dashboard(&admin(1), 1).await.unwrap();
    assert_eq!(one.projects.len(), 1);
    assert_eq!(one.kpis.projects_count, 2);
    assert!(f.service.dashboard(&admin(1), 0).await.is_err());
}
