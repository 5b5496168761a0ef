//! AgentDesk State: SurrealDB Backend for AgentDesk
//!
//! This crate provides the persistence layer for projects, members, pipeline
//! stages, the agent catalog, and the append-only agent run ledger.
//!
//! ## Key Components
//!
//! - `RunLedger`, `AgentDirectory`, `ProjectStore`: async storage traits
//! - `fakes`: in-memory implementations for tests
//! - `SurrealHandle`: connection, schema bootstrap, and id sequences shared by
//!   `SurrealRunLedger`, `SurrealAgentDirectory`, and `SurrealProjectStore`

mod error;
pub mod fakes;
mod handle;
pub mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_directory;
pub mod surreal_ledger;
pub mod surreal_projects;
pub mod vocab;

pub use error::{StateError, StorageError};
pub use handle::{CloudConfig, SurrealHandle};
pub use storage_traits::{
    Agent, AgentDirectory, AgentFilter, AgentPatch, AgentRun, Assignment, AssignmentFilter,
    NewAgent, NewAgentRun, NewAssignment, NewProject, NewStage, Project, ProjectMember,
    ProjectMembership, ProjectPatch, ProjectStore, RunFilter, RunId, RunLedger, Stage, StageEvent,
    StageProgress, StageRef, StageStatusUpdate, StorageResult, ERROR_MESSAGE_MAX_CHARS,
    EVENT_NOTE_MAX_CHARS, MAX_PAGE_SIZE,
};
pub use surreal_directory::SurrealAgentDirectory;
pub use surreal_ledger::SurrealRunLedger;
pub use surreal_projects::SurrealProjectStore;
pub use vocab::{
    AssignmentStatus, LifecycleStatus, MemberRole, RunStatus, StageStatus, TriggerSource,
};

/// Result type for agentdesk-state operations
pub type Result<T> = std::result::Result<T, StateError>;
