//! The ReAct agent loop itself: one LLM step, a concurrent tool
//! fan-out, repeat until a final answer, the step budget is exhausted,
//! the step times out too many times, or the caller cancels.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use harvey_adapters::{AnalysisAdapter, ExtractorAdapter};
use harvey_cache::PricingContextCache;
use harvey_llm::{
    ContentPart, Provider, ProviderError, ProviderMessage, ProviderRequest, Role as ProviderRole,
};
use harvey_tool::ToolError;
use harvey_types::agent::{AgentStep, ExitReason, Observation, ToolCallRecord};
use harvey_types::{DurationMs, Message, SessionError, SessionId};
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::config::{LoopConfig, MAX_LLM_RETRIES};
use crate::convert::{extract_text, extract_tool_uses, history_to_provider_messages, observation_is_error, observation_to_text};
use crate::schema::descriptor_to_tool_schema;
use crate::tools::build_registry;

/// A resolved pricing document offered to the loop as context for this
/// turn (already fetched through the cache by the chat facade, or
/// attached by the user). Rendered as a system-role message so it
/// reads distinctly from conversation history.
#[derive(Debug, Clone)]
pub struct ContextDocument {
    /// Human-readable label (e.g. the original URL or upload filename).
    pub label: String,
    /// The YAML text itself.
    pub yaml: String,
}

/// Per-run context the loop needs but doesn't own: which session this
/// is, and how to observe cancellation.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// The session this run belongs to (threaded into tool calls that
    /// need to publish cache-transition notifications).
    pub session: SessionId,
    /// Cooperative cancellation, checked at every suspension point.
    pub cancellation: CancellationToken,
}

/// Everything a single [`AgentLoop::run`] call produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Why the run stopped.
    pub exit_reason: ExitReason,
    /// The final answer text, if one was produced.
    pub final_answer: String,
    /// Per-step transcript, for metadata/plan reporting.
    pub steps: Vec<AgentStep>,
    /// The provider-facing message history accumulated this run
    /// (useful for a caller that wants to persist or inspect it).
    pub messages: Vec<ProviderMessage>,
    /// Set when `exit_reason` is [`ExitReason::Failed`].
    pub error: Option<SessionError>,
}

fn llm_backoff(attempt: u32) -> Duration {
    let base_ms = 200u64.saturating_mul(1u64 << attempt.min(10));
    let jitter = rand::thread_rng().gen_range(0..=base_ms / 4 + 1);
    Duration::from_millis(base_ms + jitter)
}

/// Drives one ReAct session turn against a provider and the six
/// built-in pricing tools.
pub struct AgentLoop<P, E, A>
where
    P: Provider,
    E: ExtractorAdapter,
    A: AnalysisAdapter,
{
    provider: P,
    cache: Arc<PricingContextCache<E>>,
    analysis: Arc<A>,
    config: LoopConfig,
}

impl<P, E, A> AgentLoop<P, E, A>
where
    P: Provider,
    E: ExtractorAdapter + 'static,
    A: AnalysisAdapter + 'static,
{
    /// Build a loop around `provider`, the shared pricing cache, and
    /// the shared analysis adapter.
    pub fn new(provider: P, cache: Arc<PricingContextCache<E>>, analysis: Arc<A>, config: LoopConfig) -> Self {
        Self {
            provider,
            cache,
            analysis,
            config,
        }
    }

    /// Run the loop for a single turn: `history` is the session's prior
    /// plain-text conversation, `context_docs` are pricing YAML
    /// documents already resolved into scope, and `question` is the
    /// user's latest message.
    pub async fn run(
        &self,
        ctx: &ToolContext,
        system_prompt: &str,
        history: &[Message],
        context_docs: &[ContextDocument],
        question: &str,
    ) -> RunOutcome {
        let registry = build_registry(self.cache.clone(), self.analysis.clone(), ctx.session.clone());
        let tool_schemas: Vec<_> = registry.list().iter().map(|d| descriptor_to_tool_schema(d)).collect();

        let mut messages = history_to_provider_messages(history);
        for doc in context_docs {
            messages.push(ProviderMessage {
                role: ProviderRole::System,
                content: vec![ContentPart::Text {
                    text: format!("Pricing context [{}]:\n{}", doc.label, doc.yaml),
                }],
            });
        }
        messages.push(ProviderMessage {
            role: ProviderRole::User,
            content: vec![ContentPart::Text { text: question.to_string() }],
        });

        let mut steps = Vec::new();

        for step_index in 0..self.config.step_budget {
            if ctx.cancellation.is_cancelled() {
                return RunOutcome {
                    exit_reason: ExitReason::Cancelled,
                    final_answer: String::new(),
                    steps,
                    messages,
                    error: Some(SessionError::Cancelled),
                };
            }

            let step_started = Instant::now();
            let step_result = tokio::time::timeout(
                self.config.step_timeout,
                self.run_one_step(step_index, &registry, &tool_schemas, system_prompt, &messages, ctx),
            )
            .await;

            match step_result {
                Err(_elapsed) => {
                    messages.push(ProviderMessage {
                        role: ProviderRole::User,
                        content: vec![ContentPart::Text {
                            text: "Step exceeded the step time budget and was abandoned.".to_string(),
                        }],
                    });
                    steps.push(AgentStep {
                        index: step_index,
                        thought: String::new(),
                        tool_calls: Vec::new(),
                        observations: Vec::new(),
                        duration: DurationMs::from(step_started.elapsed()),
                        tokens_in: None,
                        tokens_out: None,
                        created_at: Utc::now(),
                    });
                    continue;
                }
                Ok(Err(session_err)) => {
                    return RunOutcome {
                        exit_reason: ExitReason::Failed,
                        final_answer: String::new(),
                        steps,
                        messages,
                        error: Some(session_err),
                    };
                }
                Ok(Ok(StepOutcome::Answered { assistant_message, step })) => {
                    let answer = extract_text(&assistant_message.content);
                    messages.push(assistant_message);
                    steps.push(step);
                    return RunOutcome {
                        exit_reason: ExitReason::Answered,
                        final_answer: answer,
                        steps,
                        messages,
                        error: None,
                    };
                }
                Ok(Ok(StepOutcome::ToolsRan { assistant_message, tool_results, step })) => {
                    messages.push(assistant_message);
                    messages.push(tool_results);
                    steps.push(step);
                }
            }
        }

        self.force_final_answer(&tool_schemas, system_prompt, messages, steps).await
    }

    async fn run_one_step(
        &self,
        step_index: u32,
        registry: &harvey_tool::ToolRegistry,
        tool_schemas: &[harvey_llm::ToolSchema],
        system_prompt: &str,
        messages: &[ProviderMessage],
        ctx: &ToolContext,
    ) -> Result<StepOutcome, SessionError> {
        let step_started = Instant::now();

        let request = ProviderRequest {
            model: None,
            messages: messages.to_vec(),
            tools: tool_schemas.to_vec(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            system: Some(system_prompt.to_string()),
        };

        let response = self.complete_with_retry(request).await?;
        let thought = extract_text(&response.content);
        let tool_uses = extract_tool_uses(&response.content);

        let assistant_message = ProviderMessage {
            role: ProviderRole::Assistant,
            content: response.content.clone(),
        };

        if tool_uses.is_empty() {
            let step = AgentStep {
                index: step_index,
                thought,
                tool_calls: Vec::new(),
                observations: Vec::new(),
                duration: DurationMs::from(step_started.elapsed()),
                tokens_in: Some(response.usage.input_tokens as u32),
                tokens_out: Some(response.usage.output_tokens as u32),
                created_at: Utc::now(),
            };
            return Ok(StepOutcome::Answered { assistant_message, step });
        }

        if ctx.cancellation.is_cancelled() {
            return Err(SessionError::Cancelled);
        }

        let futs = tool_uses.iter().map(|(call_id, name, args)| {
            self.dispatch_tool(registry, call_id.clone(), name.clone(), args.clone())
        });
        let dispatched = futures::future::join_all(futs).await;

        let mut tool_calls = Vec::with_capacity(dispatched.len());
        let mut observations = Vec::with_capacity(dispatched.len());
        let mut result_parts = Vec::with_capacity(dispatched.len());
        for (call_id, name, args, observation) in dispatched {
            let is_error = observation_is_error(&observation);
            result_parts.push(ContentPart::ToolResult {
                tool_use_id: call_id,
                content: observation_to_text(&observation),
                is_error,
            });
            tool_calls.push(ToolCallRecord { name, args });
            observations.push(observation);
        }

        let tool_results = ProviderMessage {
            role: ProviderRole::User,
            content: result_parts,
        };

        let step = AgentStep {
            index: step_index,
            thought,
            tool_calls,
            observations,
            duration: DurationMs::from(step_started.elapsed()),
            tokens_in: Some(response.usage.input_tokens as u32),
            tokens_out: Some(response.usage.output_tokens as u32),
            created_at: Utc::now(),
        };

        Ok(StepOutcome::ToolsRan { assistant_message, tool_results, step })
    }

    async fn dispatch_tool(
        &self,
        registry: &harvey_tool::ToolRegistry,
        call_id: String,
        name: String,
        args: serde_json::Value,
    ) -> (String, String, serde_json::Value, Observation) {
        let canonical_args = args.clone();
        let outcome = tokio::time::timeout(self.config.tool_timeout, registry.invoke(&name, args)).await;

        let observation = match outcome {
            Err(_elapsed) => Observation::Error {
                code: "Timeout".to_string(),
                message: format!("tool {name} exceeded its time budget"),
            },
            Ok(Ok(value)) => Observation::Result { value },
            Ok(Err(err)) => tool_error_to_observation(err),
        };

        (call_id, name, canonical_args, observation)
    }

    async fn complete_with_retry(&self, request: ProviderRequest) -> Result<harvey_llm::ProviderResponse, SessionError> {
        let mut attempt = 0;
        loop {
            match self.provider.complete(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_retryable() && attempt < MAX_LLM_RETRIES => {
                    attempt += 1;
                    tracing::warn!(attempt, error = %err, "retrying llm transport failure");
                    tokio::time::sleep(llm_backoff(attempt)).await;
                }
                Err(err) => return Err(SessionError::LlmUnavailable(err.to_string())),
            }
        }
    }

    async fn force_final_answer(
        &self,
        tool_schemas: &[harvey_llm::ToolSchema],
        system_prompt: &str,
        mut messages: Vec<ProviderMessage>,
        mut steps: Vec<AgentStep>,
    ) -> RunOutcome {
        let _ = tool_schemas;
        messages.push(ProviderMessage {
            role: ProviderRole::User,
            content: vec![ContentPart::Text {
                text: "budget reached".to_string(),
            }],
        });

        let request = ProviderRequest {
            model: None,
            messages: messages.clone(),
            tools: Vec::new(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            system: Some(system_prompt.to_string()),
        };

        let started = Instant::now();
        match self.complete_with_retry(request).await {
            Ok(response) => {
                let answer = extract_text(&response.content);
                let assistant_message = ProviderMessage {
                    role: ProviderRole::Assistant,
                    content: response.content.clone(),
                };
                messages.push(assistant_message);
                steps.push(AgentStep {
                    index: steps.len() as u32,
                    thought: "budget reached".to_string(),
                    tool_calls: Vec::new(),
                    observations: Vec::new(),
                    duration: DurationMs::from(started.elapsed()),
                    tokens_in: Some(response.usage.input_tokens as u32),
                    tokens_out: Some(response.usage.output_tokens as u32),
                    created_at: Utc::now(),
                });
                RunOutcome {
                    exit_reason: ExitReason::BudgetExhausted,
                    final_answer: answer,
                    steps,
                    messages,
                    error: None,
                }
            }
            Err(session_err) => RunOutcome {
                exit_reason: ExitReason::Failed,
                final_answer: String::new(),
                steps,
                messages,
                error: Some(session_err),
            },
        }
    }
}

enum StepOutcome {
    Answered { assistant_message: ProviderMessage, step: AgentStep },
    ToolsRan {
        assistant_message: ProviderMessage,
        tool_results: ProviderMessage,
        step: AgentStep,
    },
}

fn tool_error_to_observation(err: ToolError) -> Observation {
    match err {
        ToolError::NotFound(name) => Observation::Error {
            code: "ToolNotFound".to_string(),
            message: format!("tool not found: {name}"),
        },
        ToolError::ArgumentInvalid { path, reason } => Observation::Error {
            code: "ArgumentInvalid".to_string(),
            message: format!("invalid argument at {path}: {reason}"),
        },
        ToolError::ToolInternal(message) => Observation::Error {
            code: "ToolInternal".to_string(),
            message,
        },
        ToolError::Semantic { code, message } => Observation::Error { code, message },
        ToolError::Other(err) => Observation::Error {
            code: "ToolInternal".to_string(),
            message: err.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvey_adapters::test_support::{MockAnalysisAdapter, MockExtractorAdapter};
    use harvey_llm::{ProviderResponse, StopReason, TokenUsage};
    use harvey_notify::NotifyBus;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;

    /// A scripted provider: replays a fixed sequence of responses, one
    /// per call, holding on the last once exhausted.
    struct ScriptedProvider {
        script: StdMutex<std::collections::VecDeque<ProviderResponse>>,
        calls: AtomicU32,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<ProviderResponse>) -> Self {
            Self {
                script: StdMutex::new(responses.into()),
                calls: AtomicU32::new(0),
            }
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Provider for ScriptedProvider {
        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            Ok(script.pop_front().unwrap_or(ProviderResponse {
                content: vec![ContentPart::Text { text: "done".to_string() }],
                stop_reason: StopReason::EndTurn,
                usage: TokenUsage::default(),
                model: "test".to_string(),
            }))
        }
    }

    fn text_response(text: &str) -> ProviderResponse {
        ProviderResponse {
            content: vec![ContentPart::Text { text: text.to_string() }],
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage::default(),
            model: "test".to_string(),
        }
    }

    fn tool_call_response(id: &str, name: &str, input: serde_json::Value) -> ProviderResponse {
        ProviderResponse {
            content: vec![ContentPart::ToolUse { id: id.to_string(), name: name.to_string(), input }],
            stop_reason: StopReason::ToolUse,
            usage: TokenUsage::default(),
            model: "test".to_string(),
        }
    }

    fn test_loop(
        provider: ScriptedProvider,
    ) -> AgentLoop<ScriptedProvider, MockExtractorAdapter, MockAnalysisAdapter> {
        let extractor = MockExtractorAdapter::new("features:\n  SSO: {}\n");
        let cache = Arc::new(PricingContextCache::new(
            extractor,
            Arc::new(NotifyBus::new()),
            harvey_cache::CacheConfig::default(),
        ));
        let analysis = Arc::new(MockAnalysisAdapter::new());
        AgentLoop::new(provider, cache, analysis, LoopConfig::default())
    }

    fn test_ctx() -> ToolContext {
        ToolContext {
            session: SessionId::new("s1"),
            cancellation: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn immediate_text_response_answers_without_tool_calls() {
        let provider = ScriptedProvider::new(vec![text_response("the answer")]);
        let agent = test_loop(provider);
        let outcome = agent.run(&test_ctx(), "system", &[], &[], "question").await;

        assert_eq!(outcome.exit_reason, ExitReason::Answered);
        assert_eq!(outcome.final_answer, "the answer");
        assert_eq!(outcome.steps.len(), 1);
    }

    #[tokio::test]
    async fn step_budget_at_cap_forces_terminal_answer_without_further_tool_call() {
        let summary_call =
            tool_call_response("call_1", "iPricing", serde_json::json!({"url": "https://example.com"}));
        let mut script = Vec::new();
        for _ in 0..8 {
            script.push(summary_call.clone());
        }
        script.push(text_response("forced answer"));

        let provider = ScriptedProvider::new(script);
        let agent = test_loop(provider);
        let outcome = agent.run(&test_ctx(), "system", &[], &[], "question").await;

        assert_eq!(outcome.exit_reason, ExitReason::BudgetExhausted);
        assert_eq!(outcome.final_answer, "forced answer");
        // 8 tool-using steps plus the forced final-answer step.
        assert_eq!(outcome.steps.len(), 9);
        assert!(outcome.steps.last().unwrap().tool_calls.is_empty());
    }

    #[tokio::test]
    async fn cancellation_before_a_step_returns_cancelled_with_partial_transcript() {
        let provider = ScriptedProvider::new(vec![text_response("unused")]);
        let agent = test_loop(provider);
        let ctx = test_ctx();
        ctx.cancellation.cancel();

        let outcome = agent.run(&ctx, "system", &[], &[], "question").await;
        assert_eq!(outcome.exit_reason, ExitReason::Cancelled);
        assert!(outcome.steps.is_empty());
    }

    #[tokio::test]
    async fn tool_call_fan_out_preserves_declaration_order_in_observations() {
        let call = tool_call_response("call_1", "iPricing", serde_json::json!({"url": "https://example.com"}));
        let mut double_call = call.clone();
        double_call.content.push(ContentPart::ToolUse {
            id: "call_2".to_string(),
            name: "iPricing".to_string(),
            input: serde_json::json!({"url": "https://example.org"}),
        });
        let provider = ScriptedProvider::new(vec![double_call, text_response("done")]);
        let agent = test_loop(provider);
        let outcome = agent.run(&test_ctx(), "system", &[], &[], "question").await;

        let first_step = &outcome.steps[0];
        assert_eq!(first_step.tool_calls.len(), 2);
        assert_eq!(first_step.tool_calls[0].args["url"], "https://example.com");
        assert_eq!(first_step.tool_calls[1].args["url"], "https://example.org");
    }
}
