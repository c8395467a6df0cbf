//! The Agentic Loop — LLM call with retry/backoff, tool dispatch
//! through the policy hooks, `ask_user` suspension, the verify gate's
//! one-retry rule, and the step/consecutive-error safety limits.
//!
//! A single synchronous per-Run loop rather than a streaming/graph
//! executor — PageForge has no multi-agent handoff to schedule around.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;
use uuid::Uuid;

use pf_domain::capability::ModelRole;
use pf_domain::entities::{ConversationContext, EventType, NodeKind, Run, RunNode, RunStatus};
use pf_domain::error::{Error, Result};
use pf_domain::tool::{Message, ToolCall};
use pf_domain::trace::TraceEvent;
use pf_providers::registry::Resolved;
use pf_providers::{ChatRequest, ChatResponse};
use pf_store::{EventStore, PageStore, ProductDocStore};
use pf_tools::policy::PolicyAction;
use pf_tools::ToolContext;

use crate::context;
use crate::run_service::persist_run_state;
use crate::state::AppState;
use crate::verify;

/// What one `run_step` call resolved to — the four terminal/suspended
/// shapes a Run can land in.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed { text: String },
    Failed { error: String },
    Cancelled,
    /// `questions` is the validated array `ask_user` (or a verify-gate
    /// exhaustion) produced — each entry `{question, type, options?,
    /// context?}` per §4.8, carried through verbatim so a resume can
    /// answer every question the model asked in one round-trip.
    WaitingInput { questions: Value },
}

/// One initial verify attempt plus one retry before the run suspends into
/// `waiting_input` (Open Questions: build is fatal, the other three checks
/// get exactly one retry).
const MAX_VERIFY_ATTEMPTS: u32 = 2;

/// Drive `run` through the loop until it lands in a terminal or
/// `waiting_input` state. The caller has already transitioned `run` to
/// `Running` and pushed the new input onto `ctx.short_term`; everything
/// after that belongs to this function.
pub async fn run_step(state: &AppState, run: &mut Run, ctx: &mut ConversationContext) -> Result<RunOutcome> {
    let session_id = run.session_id.clone();
    let run_id = run.run_id;
    let mut consecutive_errors: u32 = 0;
    let mut verify_attempt: u32 = 1;

    loop {
        if state.cancel.is_cancelled(run_id) {
            persist_run_state(&*state.runs, &*state.events, run, RunStatus::Cancelled, EventType::RunCancelled, serde_json::json!({}))?;
            return Ok(RunOutcome::Cancelled);
        }

        if run.step_count >= state.config.loop_.max_steps {
            return fail_run(state, run, &format!("exceeded max_steps ({})", state.config.loop_.max_steps));
        }

        if let Err(quota_err) = state.quota.check_quota(&session_id) {
            return fail_run(
                state,
                run,
                &format!("token quota exceeded ({}): used {} of {}", quota_err.kind, quota_err.used, quota_err.limit),
            );
        }

        run.step_count += 1;
        let step = run.step_count;
        state.events.append(&session_id, EventType::StepStart, Some(run_id), "loop", serde_json::json!({"step": step}))?;

        let doc = state.product_docs.get(&session_id)?;
        let messages = context::build_messages(&session_id, ctx, &doc, None);
        let tools = context::tool_definitions(&state.tools);

        let resolved = state.providers.resolve(ModelRole::Standard)?;
        let req = ChatRequest {
            messages,
            tools,
            temperature: Some(0.2),
            max_tokens: None,
            json_mode: false,
            model: resolved.model.clone(),
        };

        let node_id = run.nodes.len() as u32;
        let preview = req.messages.last().map(|m| pf_domain::util::truncate_str(&m.content.extract_all_text(), 300));
        let mut node = RunNode::start(node_id, NodeKind::LlmRequest, "llm_call", preview);
        let llm_start = std::time::Instant::now();

        let (response, llm_attempts) = match call_llm_with_retry(&resolved, &req, &state.config.loop_, run_id).await {
            Ok(r) => r,
            Err(e) => {
                node.finish(Some(e.to_string()), true);
                run.nodes.push(node);
                return fail_run(state, run, &format!("LLM call failed: {e}"));
            }
        };
        node.finish(Some(pf_domain::util::truncate_str(&response.content, 300)), false);
        run.nodes.push(node);

        TraceEvent::LlmRequest {
            run_id: run_id.to_string(),
            model: response.model.clone(),
            role: "standard".into(),
            duration_ms: llm_start.elapsed().as_millis() as u64,
            prompt_tokens: response.usage.as_ref().map(|u| u.prompt_tokens),
            completion_tokens: response.usage.as_ref().map(|u| u.completion_tokens),
            attempt: llm_attempts,
        }
        .emit();

        if let Some(usage) = &response.usage {
            state.quota.record_usage(&session_id, usage.total_tokens as u64);
        }

        if response.tool_calls.is_empty() {
            if let Some(outcome) = finish_text_step(state, run, ctx, &session_id, run_id, step, &response, &mut verify_attempt)? {
                return Ok(outcome);
            }
            continue;
        }

        ctx.short_term.push(Message::assistant_tool_calls(&response.content, &response.tool_calls));
        state.events.append(
            &session_id,
            EventType::ToolCall,
            Some(run_id),
            "loop",
            serde_json::json!({
                "step": step,
                "calls": response.tool_calls.iter().map(|c| serde_json::json!({"name": c.tool_name, "call_id": c.call_id})).collect::<Vec<_>>(),
            }),
        )?;

        let mut suspended = None;
        for call in &response.tool_calls {
            match dispatch_tool_call(state, &session_id, run_id, call).await? {
                DispatchOutcome::Blocking { questions } => {
                    suspended = Some(questions);
                    break;
                }
                DispatchOutcome::Ok { message } => {
                    ctx.short_term.push(message);
                    consecutive_errors = 0;
                }
                DispatchOutcome::Failed { message } => {
                    ctx.short_term.push(message);
                    consecutive_errors += 1;
                }
            }
        }

        state.events.append(&session_id, EventType::StepEnd, Some(run_id), "loop", serde_json::json!({"step": step}))?;

        if let Some(questions) = suspended {
            persist_run_state(
                &*state.runs,
                &*state.events,
                run,
                RunStatus::WaitingInput,
                EventType::RunWaitingInput,
                serde_json::json!({"questions": questions}),
            )?;
            return Ok(RunOutcome::WaitingInput { questions });
        }

        if consecutive_errors >= state.config.loop_.max_consecutive_errors {
            return fail_run(state, run, &format!("{consecutive_errors} consecutive tool errors"));
        }

        context::maybe_compact(&session_id, ctx, &state.providers, &state.config.compaction).await?;
    }
}

/// Handle a step whose LLM response carried no tool calls: record the text,
/// run the verify gate, and decide whether the run completes, retries once,
/// or suspends into `waiting_input`. Returns `Some(outcome)` when the loop
/// should stop, `None` when it should retry with a fresh step.
fn finish_text_step(
    state: &AppState,
    run: &mut Run,
    ctx: &mut ConversationContext,
    session_id: &str,
    run_id: Uuid,
    step: u32,
    response: &ChatResponse,
    verify_attempt: &mut u32,
) -> Result<Option<RunOutcome>> {
    ctx.short_term.push(Message::assistant(response.content.clone()));
    state.events.append(session_id, EventType::Text, Some(run_id), "loop", serde_json::json!({"text": response.content}))?;
    state.events.append(session_id, EventType::StepEnd, Some(run_id), "loop", serde_json::json!({"step": step}))?;

    let pages = state.pages.list(session_id)?;
    let output_dir = session_output_dir(state, session_id);
    let report = verify::run_checks(&*state.events, session_id, run_id, &output_dir, &pages, &state.config.verify, *verify_attempt)?;
    run.verify_report = Some(serde_json::to_value(&report)?);

    if report.passed {
        persist_run_state(&*state.runs, &*state.events, run, RunStatus::Completed, EventType::RunCompleted, serde_json::json!({"text": response.content}))?;
        return Ok(Some(RunOutcome::Completed { text: response.content.clone() }));
    }

    let failing: Vec<&verify::CheckOutcome> = report.checks.iter().filter(|c| !c.passed).collect();
    let fatal = failing.iter().any(|c| c.fatal);
    if fatal {
        let detail = failing.iter().filter(|c| c.fatal).map(|c| c.details.clone()).collect::<Vec<_>>().join("; ");
        return Ok(Some(fail_run(state, run, &format!("build check failed: {detail}"))?));
    }

    if *verify_attempt < MAX_VERIFY_ATTEMPTS {
        *verify_attempt += 1;
        let detail = failing.iter().map(|c| format!("{}: {}", c.name, c.details)).collect::<Vec<_>>().join("; ");
        ctx.short_term.push(Message::user(format!(
            "The previous attempt failed verification: {detail}. Please fix the issues and continue."
        )));
        return Ok(None);
    }

    let question = format!(
        "Verification did not pass after retrying: {}. How would you like to proceed?",
        failing.iter().map(|c| c.name.clone()).collect::<Vec<_>>().join(", ")
    );
    let questions = serde_json::json!([{"question": question, "type": "text"}]);
    persist_run_state(
        &*state.runs,
        &*state.events,
        run,
        RunStatus::WaitingInput,
        EventType::RunWaitingInput,
        serde_json::json!({"questions": questions, "reason": "verify_failed"}),
    )?;
    Ok(Some(RunOutcome::WaitingInput { questions }))
}

fn session_output_dir(state: &AppState, session_id: &str) -> PathBuf {
    state.output_dir.join(session_id)
}

fn fail_run(state: &AppState, run: &mut Run, error: &str) -> Result<RunOutcome> {
    run.error = Some(error.to_string());
    persist_run_state(&*state.runs, &*state.events, run, RunStatus::Failed, EventType::RunFailed, serde_json::json!({"error": error}))?;
    Ok(RunOutcome::Failed { error: error.to_string() })
}

/// Per-LLM-call retry with exponential backoff ("Retry"). Only
/// timeouts, connection errors, and 429/5xx provider responses are
/// transient — auth failures and malformed-response errors are not
/// retried. Returns the response plus the attempt number it succeeded on.
async fn call_llm_with_retry(
    resolved: &Resolved,
    req: &ChatRequest,
    config: &pf_domain::config::LoopConfig,
    run_id: Uuid,
) -> Result<(ChatResponse, u32)> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match resolved.provider.chat(req).await {
            Ok(resp) => return Ok((resp, attempt)),
            Err(e) if attempt < config.llm_retry_max_attempts && is_transient(&e) => {
                let delay = Duration::from_secs_f64(config.llm_retry_base_delay_seconds * 2f64.powi(attempt as i32 - 1));
                TraceEvent::LlmRetrying { run_id: run_id.to_string(), attempt, delay_ms: delay.as_millis() as u64, reason: e.to_string() }.emit();
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// `Error::Provider` encodes the HTTP status into its message string
/// (`openai_compat`'s `"HTTP {status} - {body}"`) rather than as a typed
/// field, so 429/5xx detection is a substring match on that message.
fn is_transient(e: &Error) -> bool {
    match e {
        Error::Timeout(_) | Error::Http(_) => true,
        Error::Provider { message, .. } => message.contains("HTTP 429") || message.contains("HTTP 5"),
        _ => false,
    }
}

enum DispatchOutcome {
    Ok { message: Message },
    Failed { message: Message },
    Blocking { questions: Value },
}

/// Run one tool call through the policy pre-check, dispatch it, run the
/// policy post-check, and translate the result into a transcript message
/// (or a suspension). Never raises — every path short-circuits into one of
/// the three [`DispatchOutcome`] variants.
async fn dispatch_tool_call(state: &AppState, session_id: &str, run_id: Uuid, call: &ToolCall) -> Result<DispatchOutcome> {
    let session_root = session_output_dir(state, session_id);
    let tool_ctx = ToolContext::new(
        session_id,
        run_id,
        &state.output_dir,
        state.providers.clone(),
        state.events.clone(),
        state.pages.clone(),
        state.product_docs.clone(),
    );

    let pre = state.policy.pre_check(&call.tool_name, &call.arguments, &session_root);
    if pre.action != PolicyAction::Allow {
        state.policy.emit(&*state.events, &tool_ctx, &call.tool_name, run_id, &pre);
    }
    if pre.action == PolicyAction::Block {
        return Ok(record_tool_failure(state, session_id, run_id, call, format!("blocked by policy: {}", pre.reason))?);
    }

    let dispatch_start = std::time::Instant::now();
    let mut result = state.tools.execute(&call.tool_name, call.arguments.clone(), &tool_ctx).await;
    TraceEvent::ToolDispatched {
        run_id: run_id.to_string(),
        tool_name: call.tool_name.clone(),
        duration_ms: dispatch_start.elapsed().as_millis() as u64,
        success: result.success,
    }
    .emit();

    if result.is_blocking() {
        let questions = result.artifacts.get("questions").cloned().unwrap_or_else(|| Value::Array(Vec::new()));
        return Ok(DispatchOutcome::Blocking { questions });
    }

    let post = state.policy.post_check(&call.arguments, &mut result.output);
    if post.action != PolicyAction::Allow {
        state.policy.emit(&*state.events, &tool_ctx, &call.tool_name, run_id, &post);
    }
    if post.action == PolicyAction::Block {
        return Ok(record_tool_failure(state, session_id, run_id, call, format!("blocked by policy: {}", post.reason))?);
    }

    state.events.append(
        session_id,
        EventType::ToolResult,
        Some(run_id),
        "loop",
        serde_json::json!({"call_id": call.call_id, "tool": call.tool_name, "success": result.success, "error": result.error}),
    )?;

    if result.success {
        Ok(DispatchOutcome::Ok { message: Message::tool_result(call.call_id.clone(), result.output, false) })
    } else {
        let content = result.error.unwrap_or_else(|| "tool failed".into());
        Ok(DispatchOutcome::Failed { message: Message::tool_result(call.call_id.clone(), content, true) })
    }
}

fn record_tool_failure(state: &AppState, session_id: &str, run_id: Uuid, call: &ToolCall, reason: String) -> Result<DispatchOutcome> {
    state.events.append(
        session_id,
        EventType::ToolResult,
        Some(run_id),
        "loop",
        serde_json::json!({"call_id": call.call_id, "tool": call.tool_name, "success": false, "error": reason}),
    )?;
    Ok(DispatchOutcome::Failed { message: Message::tool_result(call.call_id.clone(), reason, true) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Arc;

    use parking_lot::Mutex;

    use pf_domain::capability::LlmCapabilities;
    use pf_domain::config::{Config, LlmConfig, ProviderConfig};
    use pf_providers::{LlmProvider, ProviderRegistry};

    struct FakeProvider {
        responses: Mutex<VecDeque<ChatResponse>>,
        capabilities: LlmCapabilities,
    }

    impl FakeProvider {
        fn new(responses: Vec<ChatResponse>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                capabilities: LlmCapabilities {
                    supports_tools: true,
                    supports_json_mode: true,
                    supports_vision: false,
                    context_window_tokens: 128_000,
                    max_output_tokens: 4_096,
                },
            }
        }
    }

    #[async_trait::async_trait]
    impl LlmProvider for FakeProvider {
        async fn chat(&self, _req: &ChatRequest) -> Result<ChatResponse> {
            self.responses.lock().pop_front().ok_or_else(|| Error::Other("fake provider ran out of queued responses".into()))
        }
        fn capabilities(&self) -> &LlmCapabilities {
            &self.capabilities
        }
        fn provider_id(&self) -> &str {
            "fake"
        }
    }

    fn text_response(text: &str) -> ChatResponse {
        ChatResponse { content: text.into(), tool_calls: Vec::new(), usage: None, model: "fake-model".into(), finish_reason: Some("stop".into()) }
    }

    fn tool_call_response(call: ToolCall) -> ChatResponse {
        ChatResponse { content: String::new(), tool_calls: vec![call], usage: None, model: "fake-model".into(), finish_reason: Some("tool_calls".into()) }
    }

    fn test_state(dir: &std::path::Path, responses: Vec<ChatResponse>) -> AppState {
        let mut config = Config::default();
        config.store.state_path = dir.join("state").to_string_lossy().into_owned();
        config.store.output_path = dir.join("output").to_string_lossy().into_owned();

        let mut roles = HashMap::new();
        roles.insert(ModelRole::Standard, "fake".to_string());
        roles.insert(ModelRole::Fast, "fake".to_string());
        config.llm = LlmConfig {
            default_timeout_ms: 20_000,
            providers: vec![ProviderConfig { id: "fake".into(), base_url: "http://127.0.0.1:0".into(), api_key_env: None, default_model: Some("fake-model".into()) }],
            roles,
        };

        let mut state = AppState::new(config).unwrap();
        let mut registry = ProviderRegistry::from_config(&state.config.llm).unwrap();
        registry.register("fake", Arc::new(FakeProvider::new(responses)));
        state.providers = Arc::new(registry);
        state
    }

    fn test_run(state: &AppState, input: &str) -> (Run, ConversationContext) {
        let mut run = Run::new("s1", input);
        run.transition(RunStatus::Running).unwrap();
        state.runs.create(run.clone()).unwrap();
        let mut ctx = ConversationContext::new(&run.checkpoint_thread);
        ctx.short_term.push(Message::user(input));
        (run, ctx)
    }

    #[tokio::test]
    async fn no_tool_calls_and_no_pages_fails_structure_then_suspends() {
        // A text-only response with zero generation tool calls has no
        // `index` page to satisfy the Structure check (verify.rs), so it
        // cannot vacuously complete: it retries once (still no pages),
        // then suspends into `waiting_input` rather than reporting success.
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(
            dir.path(),
            vec![text_response("All done, no pages yet."), text_response("Still no pages.")],
        );
        let (mut run, mut ctx) = test_run(&state, "build me a site");

        let outcome = run_step(&state, &mut run, &mut ctx).await.unwrap();
        match outcome {
            RunOutcome::WaitingInput { questions } => {
                let arr = questions.as_array().unwrap();
                assert_eq!(arr.len(), 1);
                assert!(arr[0]["question"].as_str().unwrap().contains("structure"));
            }
            other => panic!("expected WaitingInput, got {other:?}"),
        }
        assert_eq!(run.status, RunStatus::WaitingInput);
    }

    #[tokio::test]
    async fn dispatches_a_tool_call_then_runs_verify_on_the_next_step() {
        // `list_pages` creates no pages, so the text step that follows it
        // still has nothing to satisfy Structure's `index`-page
        // requirement and runs the same retry-then-suspend path as
        // `no_tool_calls_and_no_pages_fails_structure_then_suspends`.
        let dir = tempfile::tempdir().unwrap();
        let call = ToolCall { call_id: "call_1".into(), tool_name: "list_pages".into(), arguments: serde_json::json!({}) };
        let state = test_state(
            dir.path(),
            vec![tool_call_response(call), text_response("listed the pages"), text_response("still nothing to show")],
        );
        let (mut run, mut ctx) = test_run(&state, "what pages exist?");

        let outcome = run_step(&state, &mut run, &mut ctx).await.unwrap();
        assert!(matches!(outcome, RunOutcome::WaitingInput { .. }));
        assert_eq!(run.step_count, 3);
        assert!(ctx.short_term.iter().any(|m| m.role == pf_domain::tool::Role::Tool));
    }

    #[tokio::test]
    async fn ask_user_tool_call_suspends_into_waiting_input() {
        let dir = tempfile::tempdir().unwrap();
        let call = ToolCall {
            call_id: "call_1".into(),
            tool_name: "ask_user".into(),
            arguments: serde_json::json!({"questions": [{"question": "cafe or bakery?", "type": "text"}]}),
        };
        let state = test_state(dir.path(), vec![tool_call_response(call)]);
        let (mut run, mut ctx) = test_run(&state, "build me a site");

        let outcome = run_step(&state, &mut run, &mut ctx).await.unwrap();
        match outcome {
            RunOutcome::WaitingInput { questions } => {
                assert_eq!(questions[0]["question"], serde_json::json!("cafe or bakery?"));
            }
            other => panic!("expected WaitingInput, got {other:?}"),
        }
        assert_eq!(run.status, RunStatus::WaitingInput);
    }

    #[tokio::test]
    async fn cancelled_before_first_step_returns_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), vec![]);
        let (mut run, mut ctx) = test_run(&state, "build me a site");
        state.cancel.register(run.run_id);
        state.cancel.cancel(run.run_id);

        let outcome = run_step(&state, &mut run, &mut ctx).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Cancelled));
        assert_eq!(run.status, RunStatus::Cancelled);
    }

    #[tokio::test]
    async fn exceeding_max_steps_fails_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = test_state(dir.path(), vec![]);
        state.config = Arc::new({
            let mut c = (*state.config).clone();
            c.loop_.max_steps = 0;
            c
        });
        let (mut run, mut ctx) = test_run(&state, "build me a site");

        let outcome = run_step(&state, &mut run, &mut ctx).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Failed { .. }));
        assert_eq!(run.status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn unknown_tool_name_fails_the_run_once_error_budget_is_spent() {
        let dir = tempfile::tempdir().unwrap();
        let call = ToolCall { call_id: "call_1".into(), tool_name: "not_a_real_tool".into(), arguments: serde_json::json!({}) };
        let mut state = test_state(dir.path(), vec![tool_call_response(call)]);
        state.config = Arc::new({
            let mut c = (*state.config).clone();
            c.loop_.max_consecutive_errors = 1;
            c
        });
        let (mut run, mut ctx) = test_run(&state, "build me a site");

        let outcome = run_step(&state, &mut run, &mut ctx).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Failed { .. }));
    }
}
