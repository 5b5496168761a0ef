//! Fallback orchestration: try providers in order, record exactly one run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use agentdesk_providers::{
    GeneratedPayload, GenerationJob, GenerationLimits, GenerationProvider, ImageJob,
    ProviderError, ProviderKind, ProviderResult,
};
use agentdesk_state::{
    AgentDirectory, AgentRun, NewAgentRun, RunLedger, RunStatus, TriggerSource,
    ERROR_MESSAGE_MAX_CHARS,
};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::Instrument;

use crate::agents::AgentResolver;
use crate::domain::{
    Actor, DeskError, ImageGenerationRequest, ImageGenerationResponse, Result,
    TextGenerationRequest, TextGenerationResponse,
};
use crate::metrics::METRICS;
use crate::obs;

use super::normalize::normalize_text_request;
use super::ordering::provider_order;

/// Everything about one invocation that ends up on its run row.
struct Invocation {
    project_id: i64,
    agent_id: i64,
    stage_id: Option<i64>,
    created_by_user_id: i64,
    model_override: Option<String>,
    input_payload: Value,
}

/// Drives generation requests through the provider list.
///
/// Providers are attempted strictly one after another. The first success is
/// recorded and returned; if every provider fails, one failed run is recorded
/// and the aggregate error carries its id.
#[derive(Clone)]
pub struct GenerationPipeline {
    providers: Vec<Arc<dyn GenerationProvider>>,
    ledger: Arc<dyn RunLedger>,
    resolver: AgentResolver,
    limits: GenerationLimits,
}

impl GenerationPipeline {
    pub fn new(
        providers: Vec<Arc<dyn GenerationProvider>>,
        ledger: Arc<dyn RunLedger>,
        directory: Arc<dyn AgentDirectory>,
        limits: GenerationLimits,
    ) -> Self {
        Self {
            providers,
            ledger,
            resolver: AgentResolver::new(directory),
            limits,
        }
    }

    pub fn limits(&self) -> &GenerationLimits {
        &self.limits
    }

    fn provider(&self, kind: ProviderKind) -> Option<&Arc<dyn GenerationProvider>> {
        self.providers.iter().find(|p| p.kind() == kind)
    }

    pub async fn generate_text(
        &self,
        actor: &Actor,
        req: &TextGenerationRequest,
    ) -> Result<TextGenerationResponse> {
        let span = obs::GenerationSpan::new("text", req.project_id);
        self.run_text(actor, req, &span)
            .instrument(span.span().clone())
            .await
    }

    /// Image requests reach providers exactly as received.
    pub async fn generate_image(
        &self,
        actor: &Actor,
        req: &ImageGenerationRequest,
    ) -> Result<ImageGenerationResponse> {
        let span = obs::GenerationSpan::new("image", req.project_id);
        self.run_image(actor, req, &span)
            .instrument(span.span().clone())
            .await
    }

    async fn run_text(
        &self,
        actor: &Actor,
        req: &TextGenerationRequest,
        span: &obs::GenerationSpan,
    ) -> Result<TextGenerationResponse> {
        let job = normalize_text_request(req, &self.limits);
        let order = provider_order(&req.provider_preference)?;
        let agent_id = self.resolver.resolve(req.project_id, req.agent_id).await?;
        span.record_agent(agent_id);
        obs::emit_generation_started(
            "text",
            req.project_id,
            agent_id,
            &req.provider_preference,
            req.model_name.as_deref(),
            job.prompt.chars().count(),
        );

        let invocation = Invocation {
            project_id: req.project_id,
            agent_id,
            stage_id: req.stage_id,
            created_by_user_id: actor.user_id,
            model_override: req.model_name.clone(),
            input_payload: json!({
                "prompt": job.prompt,
                "system_prompt": job.system_prompt,
            }),
        };
        let (run, result) = self
            .attempt_all(&invocation, &order, &GenerationJob::Text(job))
            .await?;

        Ok(TextGenerationResponse {
            run_id: run.agent_run_id,
            provider: result.provider,
            model_name: result.model_name,
            text: result.payload.text().unwrap_or_default().to_string(),
            token_input_count: result.token_input_count,
            token_output_count: result.token_output_count,
            cost_usd: result.cost_usd,
        })
    }

    async fn run_image(
        &self,
        actor: &Actor,
        req: &ImageGenerationRequest,
        span: &obs::GenerationSpan,
    ) -> Result<ImageGenerationResponse> {
        let order = provider_order(&req.provider_preference)?;
        let agent_id = self.resolver.resolve(req.project_id, req.agent_id).await?;
        span.record_agent(agent_id);
        obs::emit_generation_started(
            "image",
            req.project_id,
            agent_id,
            &req.provider_preference,
            req.model_name.as_deref(),
            req.prompt.chars().count(),
        );

        let invocation = Invocation {
            project_id: req.project_id,
            agent_id,
            stage_id: req.stage_id,
            created_by_user_id: actor.user_id,
            model_override: req.model_name.clone(),
            input_payload: json!({ "prompt": req.prompt, "size": req.size }),
        };
        let job = GenerationJob::Image(ImageJob {
            prompt: req.prompt.clone(),
            size: req.size.clone(),
            model_override: req.model_name.clone(),
        });
        let (run, result) = self.attempt_all(&invocation, &order, &job).await?;

        let (mime_type, image_base64, image_url) = match result.payload {
            GeneratedPayload::Image {
                mime_type,
                image_base64,
                image_url,
            } => (mime_type, image_base64, image_url),
            GeneratedPayload::Text { .. } => (None, None, None),
        };
        Ok(ImageGenerationResponse {
            run_id: run.agent_run_id,
            provider: result.provider,
            model_name: result.model_name,
            mime_type,
            image_base64,
            image_url,
            cost_usd: result.cost_usd,
        })
    }

    async fn attempt_all(
        &self,
        invocation: &Invocation,
        order: &[ProviderKind],
        job: &GenerationJob,
    ) -> Result<(AgentRun, ProviderResult)> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let mut failures: Vec<(ProviderKind, ProviderError)> = Vec::new();

        for (attempt, kind) in order.iter().copied().enumerate() {
            METRICS.inc_provider_attempts();
            obs::emit_provider_attempt(kind, attempt + 1);

            let outcome = match self.provider(kind) {
                Some(provider) => provider.generate(job).await,
                None => Err(ProviderError::UnknownProvider(kind.to_string())),
            };
            match outcome {
                Ok(result) => {
                    let run = NewAgentRun {
                        provider: Some(result.provider.as_str().to_string()),
                        model_name: Some(result.model_name.clone()),
                        run_status: RunStatus::Success,
                        output_payload: Some(output_payload(&result.payload)),
                        token_input_count: result.token_input_count,
                        token_output_count: result.token_output_count,
                        cost_usd: Some(result.cost_usd),
                        ..invocation.base_run(started_at, &clock)
                    };
                    let stored = self.record(run).await?;
                    METRICS.inc_generations_succeeded();
                    obs::emit_generation_succeeded(
                        result.provider,
                        &result.model_name,
                        stored.agent_run_id,
                        result.cost_usd,
                    );
                    return Ok((stored, result));
                }
                Err(err) => {
                    METRICS.inc_provider_failures();
                    obs::emit_provider_failed(kind, &err);
                    failures.push((kind, err));
                }
            }
        }

        let all_upstream = !failures.is_empty() && failures.iter().all(|(_, e)| e.is_upstream());
        let errors: Vec<String> = failures
            .iter()
            .map(|(kind, err)| format!("{kind}: {err}"))
            .collect();
        let run = NewAgentRun {
            provider: None,
            model_name: invocation.model_override.clone(),
            run_status: RunStatus::Failed,
            error_message: Some(truncate_chars(&errors.join(" | "), ERROR_MESSAGE_MAX_CHARS)),
            ..invocation.base_run(started_at, &clock)
        };
        let stored = self.record(run).await?;
        METRICS.inc_generations_exhausted();
        obs::emit_generation_exhausted(stored.agent_run_id, failures.len(), all_upstream);

        Err(DeskError::GenerationFailed {
            run_id: stored.agent_run_id,
            all_upstream,
            errors,
        })
    }

    async fn record(&self, run: NewAgentRun) -> Result<AgentRun> {
        let stored = self.ledger.create_run(run).await?;
        METRICS.inc_runs_recorded();
        obs::emit_run_recorded(stored.agent_run_id, stored.project_id, stored.run_status);
        Ok(stored)
    }
}

impl Invocation {
    /// Fields shared by the success and failure rows.
    fn base_run(&self, started_at: chrono::DateTime<Utc>, clock: &Instant) -> NewAgentRun {
        NewAgentRun {
            stage_id: self.stage_id,
            trigger_source: TriggerSource::Api,
            input_payload: Some(self.input_payload.clone()),
            started_at: Some(started_at),
            finished_at: Some(Utc::now()),
            duration_ms: Some(duration_ms(clock.elapsed())),
            created_by_user_id: Some(self.created_by_user_id),
            ..NewAgentRun::new(self.project_id, self.agent_id)
        }
    }
}

/// What the ledger keeps of a result. Image bytes are never persisted.
fn output_payload(payload: &GeneratedPayload) -> Value {
    match payload {
        GeneratedPayload::Text { text } => json!({ "text": text }),
        GeneratedPayload::Image {
            mime_type,
            image_base64,
            image_url,
        } => json!({
            "mime_type": mime_type,
            "image_url": image_url,
            "has_image_base64": image_base64.as_deref().is_some_and(|b| !b.is_empty()),
        }),
    }
}

/// Whole milliseconds, saturating at `i64::MAX`.
fn duration_ms(elapsed: Duration) -> i64 {
    i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
}

fn truncate_chars(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_output_payload_hides_bytes() {
        let payload = GeneratedPayload::Image {
            mime_type: Some("image/png".into()),
            image_base64: Some("aGVsbG8=".into()),
            image_url: None,
        };
        assert_eq!(
            output_payload(&payload),
            json!({"mime_type": "image/png", "image_url": null, "has_image_base64": true})
        );
    }

    #[test]
    fn duration_ms_saturates() {
        assert_eq!(duration_ms(Duration::from_millis(1_500)), 1_500);
        assert_eq!(duration_ms(Duration::MAX), i64::MAX);
    }

    #[test]
    fn truncation_is_char_based() {
        assert_eq!(truncate_chars("ééé", 2), "éé");
        assert_eq!(truncate_chars("ab", 10), "ab");
    }
}
