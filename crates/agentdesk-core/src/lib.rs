//! AgentDesk Core Library
//!
//! Domain logic for the agent desk: request normalization, provider ordering,
//! default-agent resolution, the provider-fallback generation pipeline,
//! role-based access control and cost/dashboard reporting.
//!
//! ## Key Components
//!
//! - [`DeskService`]: the facade front ends call, one method per operation
//! - [`GenerationPipeline`]: sequential provider fallback with run recording
//! - [`AccessGate`]: project membership and capability checks
//! - [`obs`], [`metrics`], [`telemetry`]: structured events, counters, subscriber setup

pub mod access;
pub mod agents;
pub mod domain;
pub mod generation;
pub mod metrics;
pub mod obs;
pub mod reporting;
pub mod service;
pub mod telemetry;

pub use access::{
    require_global_rw, AccessGate, Capability, GlobalPermissions, ProjectPermissions,
};
pub use agents::{AgentResolver, NO_ACTIVE_AGENT};
pub use domain::{
    Actor, DeskError, ErrorClass, ImageGenerationRequest, ImageGenerationResponse, Result,
    TextGenerationRequest, TextGenerationResponse,
};
pub use generation::{normalize_text_request, provider_order, GenerationPipeline};
pub use metrics::{MetricsSnapshot, METRICS};
pub use reporting::{
    CostByModel, CostByProject, CostByProvider, CostSummary, Dashboard, DashboardKpis,
    DashboardProject,
};
pub use service::{DeskService, PermissionsReport, StageChange};
pub use telemetry::init_tracing;
