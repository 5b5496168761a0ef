//! SurrealDB-specific behavior: shared handles, schema bootstrap, and
//! optional connectivity against a real server.
//!
//! The cloud test needs a running SurrealDB instance:
//!   SURREALDB_ENDPOINT=ws://localhost:8000 SURREALDB_USERNAME=root \
//!   SURREALDB_PASSWORD=root SURREALDB_ROOT=true \
//!   cargo test -p agentdesk-state --test surreal_backend -- --ignored

use std::sync::Arc;

use agentdesk_state::*;
use serde_json::json;

#[tokio::test]
async fn stores_sharing_a_handle_see_each_others_rows() {
    let handle = Arc::new(SurrealHandle::setup_db().await.unwrap());
    let projects = SurrealProjectStore::new(handle.clone());
    let ledger = SurrealRunLedger::new(handle.clone());
    let directory = SurrealAgentDirectory::new(handle);

    let project = projects
        .create_project(NewProject {
            project_key: "orbit".to_string(),
            project_name: "Orbit".to_string(),
            description: Some("launch campaign".to_string()),
            lifecycle_status: LifecycleStatus::Active,
            owner_user_id: 1,
        })
        .await
        .unwrap();
    let agent = directory
        .create_agent(NewAgent {
            agent_code: "orbit-writer".to_string(),
            agent_name: "Orbit Writer".to_string(),
            module_name: "copy".to_string(),
            owner_team: "growth".to_string(),
            default_model: None,
            skill_ref: Some("skills/copy.md".to_string()),
            is_active: true,
            metadata: None,
        })
        .await
        .unwrap();

    let mut run = NewAgentRun::new(project.project_id, agent.agent_id);
    run.run_status = RunStatus::Failed;
    run.error_message = Some("openai: timeout | gemini: 503".to_string());
    let created = ledger.create_run(run).await.unwrap();

    assert_eq!(created.agent_run_id, RunId(1));
    assert_eq!(created.project_id, project.project_id);
    assert_eq!(created.provider, None);
    assert_eq!(created.input_payload, None);
}

#[tokio::test]
async fn nested_payloads_survive_storage() {
    let ledger = SurrealRunLedger::in_memory().await.unwrap();
    let payload = json!({
        "prompt": "summarize",
        "nested": {"list": [1, 2, 3], "flag": true, "none": null},
    });
    let mut run = NewAgentRun::new(1, 1);
    run.input_payload = Some(payload.clone());
    let created = ledger.create_run(run).await.unwrap();

    let fetched = ledger.get_run(created.agent_run_id).await.unwrap();
    assert_eq!(fetched.input_payload, Some(payload));
}

#[tokio::test]
async fn created_since_filters_out_older_runs() {
    let ledger = SurrealRunLedger::in_memory().await.unwrap();
    ledger.create_run(NewAgentRun::new(1, 1)).await.unwrap();

    let future = chrono::Utc::now() + chrono::Duration::hours(1);
    let none = ledger
        .list_runs(&RunFilter {
            created_since: Some(future),
            ..RunFilter::default()
        })
        .await
        .unwrap();
    assert!(none.is_empty());

    let past = chrono::Utc::now() - chrono::Duration::hours(1);
    let some = ledger
        .list_runs(&RunFilter {
            created_since: Some(past),
            run_status: Some(RunStatus::Queued),
            ..RunFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(some.len(), 1);
}

#[tokio::test]
#[ignore]
async fn connects_with_environment_credentials() {
    dotenvy::dotenv().ok();
    let config = CloudConfig::from_env().expect("SURREALDB_* variables must be set");
    let handle = SurrealHandle::setup_cloud(config).await.unwrap();
    let projects = SurrealProjectStore::new(Arc::new(handle));
    projects.list_stage_catalog().await.unwrap();
}
