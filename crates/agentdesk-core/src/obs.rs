//! Structured observability hooks for AgentDesk.
//!
//! This module provides:
//! - Generation-scoped tracing spans via the `GenerationSpan` guard
//! - Emission functions for generation, ledger, access and catalog events
//!
//! Every event carries a stable `event = "..."` field. For JSON output, run
//! the binary with `--json`.

use std::time::Instant;

use agentdesk_providers::{ProviderError, ProviderKind};
use agentdesk_state::{MemberRole, RunId, RunStatus, StageStatus};
use tracing::{error, info, warn, Span};
use uuid::Uuid;

/// Guard owning the span of one generation request.
///
/// The span carries a fresh correlation id, the generation kind and the
/// project. The agent is recorded once resolved. Dropping the guard logs the
/// elapsed time inside the span.
///
/// # Example
///
/// ```ignore
/// let span = GenerationSpan::new("text", 42);
/// async { /* ... */ }.instrument(span.span().clone()).await;
/// ```
pub struct GenerationSpan {
    span: Span,
    correlation_id: Uuid,
    started: Instant,
}

impl GenerationSpan {
    pub fn new(kind: &'static str, project_id: i64) -> Self {
        let correlation_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "agentdesk.generation",
            correlation_id = %correlation_id,
            kind = kind,
            project_id = project_id,
            agent_id = tracing::field::Empty,
        );
        Self {
            span,
            correlation_id,
            started: Instant::now(),
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    pub fn record_agent(&self, agent_id: i64) {
        self.span.record("agent_id", agent_id);
    }
}

impl Drop for GenerationSpan {
    fn drop(&mut self) {
        let _entered = self.span.enter();
        info!(
            event = "generation.finished",
            elapsed_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX),
        );
    }
}

/// Emit event: a generation request passed validation and resolved its agent.
pub fn emit_generation_started(
    kind: &str,
    project_id: i64,
    agent_id: i64,
    preference: &str,
    model_override: Option<&str>,
    prompt_chars: usize,
) {
    info!(
        event = "generation.started",
        kind = %kind,
        project_id = project_id,
        agent_id = agent_id,
        provider_preference = %preference,
        model_override = model_override.unwrap_or("-"),
        prompt_chars = prompt_chars,
    );
}

/// Emit event: one provider is about to be called.
pub fn emit_provider_attempt(provider: ProviderKind, attempt: usize) {
    info!(
        event = "generation.provider_attempt",
        provider = %provider,
        attempt = attempt,
    );
}

/// Emit event: a provider call failed (warning level).
pub fn emit_provider_failed(provider: ProviderKind, error: &ProviderError) {
    warn!(
        event = "generation.provider_failed",
        provider = %provider,
        upstream = error.is_upstream(),
        error = %error,
    );
}

/// Emit event: a provider succeeded and its run was recorded.
pub fn emit_generation_succeeded(provider: ProviderKind, model_name: &str, run_id: RunId, cost_usd: f64) {
    info!(
        event = "generation.succeeded",
        provider = %provider,
        model_name = %model_name,
        run_id = %run_id,
        cost_usd = cost_usd,
    );
}

/// Emit event: every provider failed (error level).
pub fn emit_generation_exhausted(run_id: RunId, attempts: usize, all_upstream: bool) {
    error!(
        event = "generation.exhausted",
        run_id = %run_id,
        attempts = attempts,
        all_upstream = all_upstream,
    );
}

/// Emit event: a row was appended to the run ledger.
pub fn emit_run_recorded(run_id: RunId, project_id: i64, status: RunStatus) {
    info!(
        event = "run.recorded",
        run_id = %run_id,
        project_id = project_id,
        status = %status,
    );
}

/// Emit event: the access gate refused a request (warning level).
pub fn emit_access_denied(project_id: Option<i64>, user_id: i64, capability: &str, reason: &str) {
    warn!(
        event = "access.denied",
        project_id = project_id.unwrap_or(0),
        user_id = user_id,
        capability = %capability,
        reason = %reason,
    );
}

pub fn emit_project_created(project_id: i64, project_key: &str, owner_user_id: i64) {
    info!(
        event = "project.created",
        project_id = project_id,
        project_key = %project_key,
        owner_user_id = owner_user_id,
    );
}

/// Emit event: a membership was added, changed or removed.
pub fn emit_member_changed(project_id: i64, user_id: i64, action: &str, role: Option<MemberRole>) {
    info!(
        event = "member.changed",
        project_id = project_id,
        user_id = user_id,
        action = %action,
        role = role.map(|r| r.as_str()).unwrap_or("-"),
    );
}

pub fn emit_stage_status_changed(project_id: i64, stage_id: i64, status: StageStatus, progress: f64) {
    info!(
        event = "stage.status_changed",
        project_id = project_id,
        stage_id = stage_id,
        stage_status = %status,
        progress_percent = progress,
    );
}

/// Emit event: an agent or assignment was created or updated.
pub fn emit_agent_changed(agent_id: i64, action: &str, is_active: bool) {
    info!(
        event = "agent.changed",
        agent_id = agent_id,
        action = %action,
        is_active = is_active,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_span_has_unique_correlation_ids() {
        let a = GenerationSpan::new("text", 1);
        let b = GenerationSpan::new("text", 1);
        assert_ne!(a.correlation_id(), b.correlation_id());
        a.record_agent(7);
    }
}
