//! AgentDesk CLI
//!
//! The `agentdesk` command drives projects, members, pipeline stages, the
//! agent catalog and provider-fallback content generation.
//!
//! ## Commands
//!
//! - `generate`: Produce text or an image through the provider fallback chain
//! - `runs`, `costs`, `dashboard`: Inspect the run ledger and its rollups
//! - `projects`, `members`, `stages`: Manage projects and their progress
//! - `agents`, `assignments`: Manage the agent catalog

mod output;

use std::sync::Arc;

use agentdesk_core::{
    Actor, DeskService, ImageGenerationRequest, StageChange, TextGenerationRequest,
};
use agentdesk_providers::ProviderConfig;
use agentdesk_state::{
    AgentFilter, AgentPatch, AssignmentFilter, AssignmentStatus, LifecycleStatus, MemberRole,
    NewAgent, NewAgentRun, NewAssignment, NewProject, NewStage, ProjectPatch, RunFilter, RunId,
    RunStatus, StageRef, StageStatus, SurrealAgentDirectory, SurrealHandle, SurrealProjectStore,
    SurrealRunLedger, TriggerSource,
};
use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{debug, Level};

use output::{render, render_list, OutputFormat};

#[derive(Parser)]
#[command(name = "agentdesk")]
#[command(author = "AgentDesk Engineering")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "AgentDesk: projects, agents and provider-fallback generation", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Acting user id
    #[arg(long, global = true, env = "AGENTDESK_USER_ID")]
    user_id: Option<i64>,

    /// Global role of the acting user (repeatable)
    #[arg(long = "role", global = true, env = "AGENTDESK_ROLES", value_delimiter = ',')]
    roles: Vec<MemberRole>,

    /// Result format
    #[arg(long, global = true, value_enum, default_value = "text")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate content through the provider fallback chain
    Generate {
        #[command(subcommand)]
        action: GenerateAction,
    },

    /// Inspect or record agent runs
    Runs {
        #[command(subcommand)]
        action: RunsAction,
    },

    /// Cost rollup over the caller's projects
    Costs {
        /// Window in days (1-365)
        #[arg(long, default_value = "30")]
        days: u32,

        /// Restrict to one project
        #[arg(long)]
        project: Option<i64>,
    },

    /// Per-project KPIs for the caller
    Dashboard {
        /// Maximum number of project rows (1-200)
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Show the caller's global and per-project rights
    Permissions {
        /// Restrict to one project
        #[arg(long)]
        project: Option<i64>,
    },

    /// Manage projects
    Projects {
        #[command(subcommand)]
        action: ProjectsAction,
    },

    /// Manage project members
    Members {
        #[command(subcommand)]
        action: MembersAction,
    },

    /// Stage catalog and per-project stage progress
    Stages {
        #[command(subcommand)]
        action: StagesAction,
    },

    /// Manage the agent catalog
    Agents {
        #[command(subcommand)]
        action: AgentsAction,
    },

    /// Manage project agent assignments
    Assignments {
        #[command(subcommand)]
        action: AssignmentsAction,
    },
}

#[derive(Subcommand)]
enum GenerateAction {
    /// Generate text
    Text {
        #[arg(long)]
        project: i64,

        #[arg(long)]
        prompt: String,

        #[arg(long)]
        system_prompt: Option<String>,

        /// Agent to run as (resolved from the project when omitted)
        #[arg(long)]
        agent: Option<i64>,

        #[arg(long)]
        stage: Option<i64>,

        /// auto, openai or gemini
        #[arg(long, default_value = "auto")]
        provider: String,

        /// Model override
        #[arg(long)]
        model: Option<String>,

        #[arg(long)]
        temperature: Option<f64>,

        #[arg(long)]
        max_output_tokens: Option<u32>,
    },

    /// Generate an image
    Image {
        #[arg(long)]
        project: i64,

        #[arg(long)]
        prompt: String,

        #[arg(long)]
        agent: Option<i64>,

        #[arg(long)]
        stage: Option<i64>,

        #[arg(long, default_value = "auto")]
        provider: String,

        #[arg(long)]
        model: Option<String>,

        #[arg(long, default_value = "1024x1024")]
        size: String,
    },
}

#[derive(Subcommand)]
enum RunsAction {
    /// List runs, newest first
    List {
        #[arg(long)]
        project: Option<i64>,

        #[arg(long)]
        agent: Option<i64>,

        #[arg(long)]
        status: Option<RunStatus>,

        /// Only runs created in the last N days
        #[arg(long)]
        since_days: Option<u32>,

        #[arg(short, long, default_value = "50")]
        limit: usize,

        #[arg(long, default_value = "0")]
        offset: usize,
    },

    /// Show one run
    Show { run_id: i64 },

    /// Record a run manually
    Create {
        #[arg(long)]
        project: i64,

        #[arg(long)]
        agent: i64,

        #[arg(long)]
        stage: Option<i64>,

        #[arg(long, default_value = "queued")]
        status: RunStatus,

        #[arg(long, default_value = "manual")]
        trigger: TriggerSource,

        #[arg(long)]
        provider: Option<String>,

        #[arg(long)]
        model: Option<String>,

        /// Input payload as JSON
        #[arg(long)]
        input: Option<String>,

        #[arg(long)]
        cost_usd: Option<f64>,
    },
}

#[derive(Subcommand)]
enum ProjectsAction {
    /// Projects the caller belongs to
    List,

    Show { project_id: i64 },

    /// Create a project owned by the caller
    Create {
        #[arg(long)]
        key: String,

        #[arg(long)]
        name: String,

        #[arg(long)]
        description: Option<String>,

        #[arg(long, default_value = "draft")]
        lifecycle: LifecycleStatus,
    },

    Update {
        project_id: i64,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        lifecycle: Option<LifecycleStatus>,
    },
}

#[derive(Subcommand)]
enum MembersAction {
    List {
        #[arg(long)]
        project: i64,
    },

    Add {
        #[arg(long)]
        project: i64,

        #[arg(long)]
        user: i64,

        #[arg(long, default_value = "viewer")]
        role: MemberRole,
    },

    Update {
        #[arg(long)]
        project: i64,

        #[arg(long)]
        user: i64,

        #[arg(long)]
        role: MemberRole,
    },

    Remove {
        #[arg(long)]
        project: i64,

        #[arg(long)]
        user: i64,
    },
}

#[derive(Subcommand)]
enum StagesAction {
    /// Global stage catalog
    Catalog,

    /// Add a stage to the catalog
    Register {
        #[arg(long)]
        code: String,

        #[arg(long)]
        name: String,

        #[arg(long)]
        order: i64,
    },

    /// Stage progress of one project
    List {
        #[arg(long)]
        project: i64,
    },

    /// Change a stage's status
    Set {
        #[arg(long)]
        project: i64,

        /// Stage id or code
        #[arg(long)]
        stage: String,

        #[arg(long)]
        status: StageStatus,

        #[arg(long, default_value = "0")]
        progress: f64,

        #[arg(long)]
        note: Option<String>,
    },

    /// Status change history, newest first
    Events {
        #[arg(long)]
        project: i64,

        /// Stage id or code
        #[arg(long)]
        stage: Option<String>,
    },
}

#[derive(Subcommand)]
enum AgentsAction {
    List {
        #[arg(long)]
        module: Option<String>,

        #[arg(long)]
        active: Option<bool>,
    },

    Show { agent_id: i64 },

    Create {
        #[arg(long)]
        code: String,

        #[arg(long)]
        name: String,

        #[arg(long)]
        module: String,

        #[arg(long)]
        team: String,

        #[arg(long)]
        default_model: Option<String>,

        #[arg(long)]
        skill_ref: Option<String>,

        /// Register the agent as inactive
        #[arg(long)]
        inactive: bool,

        /// Metadata as JSON
        #[arg(long)]
        metadata: Option<String>,
    },

    Update {
        agent_id: i64,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        module: Option<String>,

        #[arg(long)]
        team: Option<String>,

        #[arg(long)]
        default_model: Option<String>,

        #[arg(long)]
        skill_ref: Option<String>,

        #[arg(long)]
        active: Option<bool>,

        #[arg(long)]
        metadata: Option<String>,
    },
}

#[derive(Subcommand)]
enum AssignmentsAction {
    List {
        #[arg(long)]
        project: Option<i64>,

        #[arg(long)]
        agent: Option<i64>,

        #[arg(short, long, default_value = "50")]
        limit: usize,

        #[arg(long, default_value = "0")]
        offset: usize,
    },

    Show { assignment_id: i64 },

    Create {
        #[arg(long)]
        project: i64,

        #[arg(long)]
        agent: i64,

        #[arg(long)]
        stage: Option<i64>,

        #[arg(long, default_value = "active")]
        status: AssignmentStatus,
    },

    Update {
        assignment_id: i64,

        #[arg(long)]
        status: AssignmentStatus,
    },
}

/// Caller identity and output settings shared by every command.
struct Invocation {
    user_id: Option<i64>,
    roles: Vec<MemberRole>,
    output: OutputFormat,
}

impl Invocation {
    fn actor(&self) -> Result<Actor> {
        let user_id = self
            .user_id
            .context("--user-id (or AGENTDESK_USER_ID) is required for this command")?;
        Ok(Actor::new(user_id, self.roles.iter().copied()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    agentdesk_core::init_tracing(cli.json, level);

    let handle = Arc::new(
        SurrealHandle::setup_from_env()
            .await
            .context("Failed to connect to AgentDesk database")?,
    );
    let config = ProviderConfig::from_env().context("Invalid provider configuration")?;
    let service = DeskService::with_default_providers(
        &config,
        Arc::new(SurrealRunLedger::new(handle.clone())),
        Arc::new(SurrealAgentDirectory::new(handle.clone())),
        Arc::new(SurrealProjectStore::new(handle)),
    )
    .context("Failed to build provider adapters")?;

    let ctx = Invocation {
        user_id: cli.user_id,
        roles: cli.roles,
        output: cli.output,
    };
    let rendered = execute(&service, &ctx, cli.command).await?;
    println!("{rendered}");
    Ok(())
}

async fn execute(service: &DeskService, ctx: &Invocation, command: Commands) -> Result<String> {
    match command {
        Commands::Generate { action } => cmd_generate(service, ctx, action).await,
        Commands::Runs { action } => cmd_runs(service, ctx, action).await,
        Commands::Costs { days, project } => {
            let summary = service.cost_summary(&ctx.actor()?, days, project).await?;
            render(ctx.output, &summary)
        }
        Commands::Dashboard { limit } => {
            let dashboard = service.dashboard(&ctx.actor()?, limit).await?;
            render(ctx.output, &dashboard)
        }
        Commands::Permissions { project } => {
            let report = service.permissions(&ctx.actor()?, project).await?;
            render(ctx.output, &report)
        }
        Commands::Projects { action } => cmd_projects(service, ctx, action).await,
        Commands::Members { action } => cmd_members(service, ctx, action).await,
        Commands::Stages { action } => cmd_stages(service, ctx, action).await,
        Commands::Agents { action } => cmd_agents(service, ctx, action).await,
        Commands::Assignments { action } => cmd_assignments(service, ctx, action).await,
    }
}

async fn cmd_generate(service: &DeskService, ctx: &Invocation, action: GenerateAction) -> Result<String> {
    let actor = ctx.actor()?;
    match action {
        GenerateAction::Text {
            project,
            prompt,
            system_prompt,
            agent,
            stage,
            provider,
            model,
            temperature,
            max_output_tokens,
        } => {
            let req = TextGenerationRequest {
                agent_id: agent,
                system_prompt,
                stage_id: stage,
                provider_preference: provider,
                model_name: model,
                temperature,
                max_output_tokens,
                ..TextGenerationRequest::new(project, prompt)
            };
            let resp = service.generate_text(&actor, req).await?;
            render(ctx.output, &resp)
        }
        GenerateAction::Image {
            project,
            prompt,
            agent,
            stage,
            provider,
            model,
            size,
        } => {
            let req = ImageGenerationRequest {
                agent_id: agent,
                stage_id: stage,
                provider_preference: provider,
                model_name: model,
                size: Some(size),
                ..ImageGenerationRequest::new(project, prompt)
            };
            let resp = service.generate_image(&actor, req).await?;
            render(ctx.output, &resp)
        }
    }
}

async fn cmd_runs(service: &DeskService, ctx: &Invocation, action: RunsAction) -> Result<String> {
    let actor = ctx.actor()?;
    match action {
        RunsAction::List {
            project,
            agent,
            status,
            since_days,
            limit,
            offset,
        } => {
            let filter = RunFilter {
                project_scope: None,
                project_id: project,
                agent_id: agent,
                run_status: status,
                created_since: since_days.map(|d| Utc::now() - Duration::days(i64::from(d))),
                limit,
                offset,
            };
            debug!(?filter, "listing runs");
            render_list(ctx.output, &service.list_runs(&actor, filter).await?)
        }
        RunsAction::Show { run_id } => {
            render(ctx.output, &service.get_run(&actor, RunId(run_id)).await?)
        }
        RunsAction::Create {
            project,
            agent,
            stage,
            status,
            trigger,
            provider,
            model,
            input,
            cost_usd,
        } => {
            let run = NewAgentRun {
                stage_id: stage,
                provider,
                model_name: model,
                run_status: status,
                trigger_source: trigger,
                input_payload: parse_json_arg("input", input.as_deref())?,
                cost_usd,
                ..NewAgentRun::new(project, agent)
            };
            render(ctx.output, &service.create_run(&actor, run).await?)
        }
    }
}

async fn cmd_projects(service: &DeskService, ctx: &Invocation, action: ProjectsAction) -> Result<String> {
    let actor = ctx.actor()?;
    match action {
        ProjectsAction::List => render_list(ctx.output, &service.list_projects(&actor).await?),
        ProjectsAction::Show { project_id } => {
            render(ctx.output, &service.get_project(&actor, project_id).await?)
        }
        ProjectsAction::Create {
            key,
            name,
            description,
            lifecycle,
        } => {
            let project = NewProject {
                project_key: key,
                project_name: name,
                description,
                lifecycle_status: lifecycle,
                owner_user_id: actor.user_id,
            };
            render(ctx.output, &service.create_project(&actor, project).await?)
        }
        ProjectsAction::Update {
            project_id,
            name,
            description,
            lifecycle,
        } => {
            let patch = ProjectPatch {
                project_name: name,
                description,
                lifecycle_status: lifecycle,
            };
            render(
                ctx.output,
                &service.update_project(&actor, project_id, patch).await?,
            )
        }
    }
}

async fn cmd_members(service: &DeskService, ctx: &Invocation, action: MembersAction) -> Result<String> {
    let actor = ctx.actor()?;
    match action {
        MembersAction::List { project } => {
            render_list(ctx.output, &service.list_members(&actor, project).await?)
        }
        MembersAction::Add { project, user, role } => render(
            ctx.output,
            &service.add_member(&actor, project, user, role).await?,
        ),
        MembersAction::Update { project, user, role } => render(
            ctx.output,
            &service.update_member_role(&actor, project, user, role).await?,
        ),
        MembersAction::Remove { project, user } => {
            service.remove_member(&actor, project, user).await?;
            Ok(format!("Removed user {user} from project {project}"))
        }
    }
}

async fn cmd_stages(service: &DeskService, ctx: &Invocation, action: StagesAction) -> Result<String> {
    match action {
        StagesAction::Catalog => render_list(ctx.output, &service.stage_catalog().await?),
        StagesAction::Register { code, name, order } => {
            let stage = NewStage {
                stage_code: code,
                stage_name: name,
                stage_order: order,
            };
            render(
                ctx.output,
                &service.register_stage(&ctx.actor()?, stage).await?,
            )
        }
        StagesAction::List { project } => render_list(
            ctx.output,
            &service.list_stages(&ctx.actor()?, project).await?,
        ),
        StagesAction::Set {
            project,
            stage,
            status,
            progress,
            note,
        } => {
            let change = StageChange {
                stage: parse_stage_ref(&stage),
                stage_status: status,
                progress_percent: progress,
                event_note: note,
            };
            render(
                ctx.output,
                &service.set_stage_status(&ctx.actor()?, project, change).await?,
            )
        }
        StagesAction::Events { project, stage } => {
            let events = service
                .list_stage_events(&ctx.actor()?, project, stage.as_deref().map(parse_stage_ref))
                .await?;
            render_list(ctx.output, &events)
        }
    }
}

async fn cmd_agents(service: &DeskService, ctx: &Invocation, action: AgentsAction) -> Result<String> {
    match action {
        AgentsAction::List { module, active } => {
            let filter = AgentFilter {
                module_name: module,
                is_active: active,
            };
            render_list(ctx.output, &service.list_agents(&filter).await?)
        }
        AgentsAction::Show { agent_id } => render(ctx.output, &service.get_agent(agent_id).await?),
        AgentsAction::Create {
            code,
            name,
            module,
            team,
            default_model,
            skill_ref,
            inactive,
            metadata,
        } => {
            let agent = NewAgent {
                agent_code: code,
                agent_name: name,
                module_name: module,
                owner_team: team,
                default_model,
                skill_ref,
                is_active: !inactive,
                metadata: parse_json_arg("metadata", metadata.as_deref())?,
            };
            render(ctx.output, &service.create_agent(&ctx.actor()?, agent).await?)
        }
        AgentsAction::Update {
            agent_id,
            name,
            module,
            team,
            default_model,
            skill_ref,
            active,
            metadata,
        } => {
            let patch = AgentPatch {
                agent_name: name,
                module_name: module,
                owner_team: team,
                default_model,
                skill_ref,
                is_active: active,
                metadata: parse_json_arg("metadata", metadata.as_deref())?,
            };
            render(
                ctx.output,
                &service.update_agent(&ctx.actor()?, agent_id, patch).await?,
            )
        }
    }
}

async fn cmd_assignments(
    service: &DeskService,
    ctx: &Invocation,
    action: AssignmentsAction,
) -> Result<String> {
    let actor = ctx.actor()?;
    match action {
        AssignmentsAction::List {
            project,
            agent,
            limit,
            offset,
        } => {
            let filter = AssignmentFilter {
                project_scope: None,
                project_id: project,
                agent_id: agent,
                limit,
                offset,
            };
            render_list(ctx.output, &service.list_assignments(&actor, filter).await?)
        }
        AssignmentsAction::Show { assignment_id } => render(
            ctx.output,
            &service.get_assignment(&actor, assignment_id).await?,
        ),
        AssignmentsAction::Create {
            project,
            agent,
            stage,
            status,
        } => {
            let assignment = NewAssignment {
                project_id: project,
                agent_id: agent,
                stage_id: stage,
                assignment_status: status,
                assigned_by_user_id: Some(actor.user_id),
            };
            render(
                ctx.output,
                &service.create_assignment(&actor, assignment).await?,
            )
        }
        AssignmentsAction::Update {
            assignment_id,
            status,
        } => render(
            ctx.output,
            &service
                .update_assignment_status(&actor, assignment_id, status)
                .await?,
        ),
    }
}

/// Numeric values address a stage by id, anything else by code.
fn parse_stage_ref(value: &str) -> StageRef {
    match value.trim().parse::<i64>() {
        Ok(id) => StageRef::Id(id),
        Err(_) => StageRef::Code(value.trim().to_string()),
    }
}

fn parse_json_arg(name: &str, raw: Option<&str>) -> Result<Option<Value>> {
    raw.map(|s| serde_json::from_str(s).with_context(|| format!("--{name} is not valid JSON")))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentdesk_providers::fakes::ScriptedProvider;
    use agentdesk_providers::{GenerationProvider, ProviderKind};

    async fn service() -> DeskService {
        let handle = Arc::new(SurrealHandle::setup_db().await.unwrap());
        let providers: Vec<Arc<dyn GenerationProvider>> = vec![
            Arc::new(ScriptedProvider::text(ProviderKind::OpenAi, "tagline", 4, 6)),
            Arc::new(ScriptedProvider::text(ProviderKind::Gemini, "unused", 1, 1)),
        ];
        DeskService::new(
            providers,
            &ProviderConfig::default(),
            Arc::new(SurrealRunLedger::new(handle.clone())),
            Arc::new(SurrealAgentDirectory::new(handle.clone())),
            Arc::new(SurrealProjectStore::new(handle)),
        )
    }

    fn ctx(output: OutputFormat) -> Invocation {
        Invocation {
            user_id: Some(1),
            roles: vec![MemberRole::Admin],
            output,
        }
    }

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("agentdesk").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn global_flags_parse() {
        let cli = parse(&[
            "--user-id",
            "7",
            "--role",
            "operator",
            "--role",
            "viewer",
            "--output",
            "json",
            "costs",
            "--days",
            "7",
        ]);
        assert_eq!(cli.user_id, Some(7));
        assert_eq!(cli.roles, vec![MemberRole::Operator, MemberRole::Viewer]);
        assert_eq!(cli.output, OutputFormat::Json);
        assert!(matches!(cli.command, Commands::Costs { days: 7, project: None }));
    }

    #[test]
    fn unknown_role_is_rejected() {
        let parsed = Cli::try_parse_from(["agentdesk", "--role", "owner", "dashboard"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn stage_refs_parse_ids_and_codes() {
        assert_eq!(parse_stage_ref("12"), StageRef::Id(12));
        assert_eq!(parse_stage_ref(" brief "), StageRef::Code("brief".to_string()));
    }

    #[test]
    fn actor_requires_user_id() {
        let anonymous = Invocation {
            user_id: None,
            roles: Vec::new(),
            output: OutputFormat::Text,
        };
        assert!(anonymous.actor().is_err());
    }

    #[tokio::test]
    async fn project_agent_and_generation_flow() {
        let service = service().await;
        let text = ctx(OutputFormat::Text);

        let created = execute(
            &service,
            &text,
            parse(&["projects", "create", "--key", "ACME", "--name", "Acme launch"]).command,
        )
        .await
        .unwrap();
        assert!(created.contains("ACME\tAcme launch\tdraft"), "{created}");

        execute(
            &service,
            &text,
            parse(&[
                "agents", "create", "--code", "writer", "--name", "Writer", "--module", "content",
                "--team", "studio",
            ])
            .command,
        )
        .await
        .unwrap();

        let generated = execute(
            &service,
            &ctx(OutputFormat::Json),
            parse(&["generate", "text", "--project", "1", "--prompt", "a tagline"]).command,
        )
        .await
        .unwrap();
        let value: Value = serde_json::from_str(&generated).unwrap();
        assert_eq!(value["text"], "tagline");
        assert_eq!(value["provider"], "openai");

        let runs = execute(&service, &text, parse(&["runs", "list"]).command)
            .await
            .unwrap();
        assert!(runs.contains("success"), "{runs}");
    }

    #[tokio::test]
    async fn bad_json_argument_is_reported() {
        let service = service().await;
        let err = execute(
            &service,
            &ctx(OutputFormat::Text),
            parse(&[
                "agents", "create", "--code", "x1", "--name", "X1", "--module", "m1", "--team",
                "t1", "--metadata", "{not json",
            ])
            .command,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("--metadata is not valid JSON"));
    }
}
