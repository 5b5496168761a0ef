//! SurrealDB schema migrations and initialization
//!
//! Tables are SCHEMALESS; integrity comes from unique indexes plus
//! validation in [`crate::storage_traits`] before rows reach the store.

use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all AgentDesk tables in SurrealDB
///
/// Safe to call on every connection (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing AgentDesk SurrealDB schema");

    init_projects_tables(db).await?;
    init_stage_tables(db).await?;
    init_agent_tables(db).await?;
    init_agent_runs_table(db).await?;
    init_sequences_table(db).await?;

    info!("AgentDesk schema initialization complete");
    Ok(())
}

async fn run_ddl(db: &Surreal<Any>, table: &str, sql: &str) -> Result<()> {
    debug!(table, "Initializing table");
    db.query(sql)
        .await
        .and_then(|response| response.check())
        .map_err(|e| crate::StateError::SchemaSetup(format!("{table}: {e}")))?;
    info!("✓ {} initialized", table);
    Ok(())
}

/// Schema:
/// ```text
/// TABLE projects        { project_id INT UNIQUE, project_key STRING UNIQUE, project_name,
///                         description?, lifecycle_status, owner_user_id, created_at, updated_at }
/// TABLE project_members { project_member_id INT UNIQUE, project_id, user_id, member_role,
///                         created_at }  UNIQUE (project_id, user_id)
/// ```
async fn init_projects_tables(db: &Surreal<Any>) -> Result<()> {
    let sql = r#"
        DEFINE TABLE IF NOT EXISTS projects SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_project_id ON TABLE projects COLUMNS project_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_project_key ON TABLE projects COLUMNS project_key UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_project_owner ON TABLE projects COLUMNS owner_user_id;

        DEFINE TABLE IF NOT EXISTS project_members SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_project_member_id ON TABLE project_members COLUMNS project_member_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_project_member ON TABLE project_members COLUMNS project_id, user_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_member_user ON TABLE project_members COLUMNS user_id;
    "#;
    run_ddl(db, "projects", sql).await
}

/// Schema:
/// ```text
/// TABLE stage_catalog        { stage_id INT UNIQUE, stage_code STRING UNIQUE, stage_name, stage_order }
/// TABLE project_stage_status { id = [project_id, stage_id], project_stage_status_id INT UNIQUE,
///                              stage_status, progress_percent, started_at?, completed_at?,
///                              updated_by_user_id?, updated_at }
/// TABLE project_stage_events { project_stage_event_id INT UNIQUE, project_id, stage_id,
///                              event_type, event_payload (JSON text), event_note?,
///                              created_by_user_id?, created_at }
/// ```
async fn init_stage_tables(db: &Surreal<Any>) -> Result<()> {
    let sql = r#"
        DEFINE TABLE IF NOT EXISTS stage_catalog SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_stage_id ON TABLE stage_catalog COLUMNS stage_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_stage_code ON TABLE stage_catalog COLUMNS stage_code UNIQUE;

        DEFINE TABLE IF NOT EXISTS project_stage_status SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_stage_status_id ON TABLE project_stage_status COLUMNS project_stage_status_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_stage_status_project ON TABLE project_stage_status COLUMNS project_id, stage_id UNIQUE;

        DEFINE TABLE IF NOT EXISTS project_stage_events SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update NONE
                FOR delete NONE;
        DEFINE INDEX IF NOT EXISTS idx_stage_event_id ON TABLE project_stage_events COLUMNS project_stage_event_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_stage_event_project ON TABLE project_stage_events COLUMNS project_id, stage_id;
    "#;
    run_ddl(db, "stages", sql).await
}

/// Schema:
/// ```text
/// TABLE agent_catalog             { agent_id INT UNIQUE, agent_code STRING UNIQUE, agent_name,
///                                   module_name, owner_team, default_model?, skill_ref?,
///                                   is_active BOOL, metadata_json?, created_at, updated_at }
/// TABLE project_agent_assignments { project_agent_assignment_id INT UNIQUE, project_id, agent_id,
///                                   stage_id?, assignment_status, assigned_at,
///                                   assigned_by_user_id? }  UNIQUE (project_id, agent_id, stage_id)
/// ```
async fn init_agent_tables(db: &Surreal<Any>) -> Result<()> {
    let sql = r#"
        DEFINE TABLE IF NOT EXISTS agent_catalog SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_agent_id ON TABLE agent_catalog COLUMNS agent_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_agent_code ON TABLE agent_catalog COLUMNS agent_code UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_agent_active ON TABLE agent_catalog COLUMNS is_active;

        DEFINE TABLE IF NOT EXISTS project_agent_assignments SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_assignment_id ON TABLE project_agent_assignments COLUMNS project_agent_assignment_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_assignment_tuple ON TABLE project_agent_assignments COLUMNS project_id, agent_id, stage_id UNIQUE;
    "#;
    run_ddl(db, "agents", sql).await
}

/// Schema:
/// ```text
/// TABLE agent_runs {
///   agent_run_id:        INT (unique)
///   project_id, agent_id, stage_id?
///   provider?, model_name?
///   run_status:          STRING (queued | running | success | failed | cancelled | timeout)
///   trigger_source:      STRING (manual | schedule | event | api)
///   input_payload?:      STRING (JSON text)
///   output_payload?:     STRING (JSON text)
///   error_message?:      STRING (<= 1000 chars)
///   started_at?, finished_at?, duration_ms?
///   token_input_count?, token_output_count?, cost_usd?
///   created_by_user_id?, created_at
/// }
/// ```
///
/// The ledger is append-only: updates and deletes are refused.
async fn init_agent_runs_table(db: &Surreal<Any>) -> Result<()> {
    let sql = r#"
        DEFINE TABLE IF NOT EXISTS agent_runs SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update NONE
                FOR delete NONE;
        DEFINE INDEX IF NOT EXISTS idx_agent_run_id ON TABLE agent_runs COLUMNS agent_run_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_run_project ON TABLE agent_runs COLUMNS project_id, created_at;
        DEFINE INDEX IF NOT EXISTS idx_run_agent ON TABLE agent_runs COLUMNS agent_id;
    "#;
    run_ddl(db, "agent_runs", sql).await
}

/// One counter record per entity, e.g. `sequences:agent_runs`.
async fn init_sequences_table(db: &Surreal<Any>) -> Result<()> {
    run_ddl(
        db,
        "sequences",
        "DEFINE TABLE IF NOT EXISTS sequences SCHEMALESS;",
    )
    .await
}
