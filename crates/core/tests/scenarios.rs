//! End-to-end scenario coverage  driven through [`RunService`] rather
//! than `turn::run_step` directly — these exercise the public Run API a
//! caller actually has (`create_run` -> `start_run` -> `resume_run` /
//! `cancel_run`) against a queued fake LLM, the same way a thin HTTP
//! binary wrapping this crate would.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use pf_core::{AppState, RunOutcome, RunService};
use pf_domain::capability::{LlmCapabilities, ModelRole};
use pf_domain::config::{Config, LlmConfig, ProviderConfig};
use pf_domain::entities::{EventType, RunStatus};
use pf_domain::error::{Error, Result};
use pf_domain::tool::ToolCall;
use pf_providers::{ChatRequest, ChatResponse, LlmProvider, ProviderRegistry};

struct FakeProvider {
    responses: Mutex<VecDeque<ChatResponse>>,
    capabilities: LlmCapabilities,
    call_count: Mutex<u32>,
    /// Invoked with the 1-based call number right after a queued response
    /// is served — lets a test simulate "the cancel signal arrives right
    /// after this exchange" deterministically, without racing real time.
    on_call: Option<Box<dyn Fn(u32) + Send + Sync>>,
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
            call_count: Mutex::new(0),
            on_call: None,
        }
    }

    fn with_on_call(responses: Vec<ChatResponse>, on_call: impl Fn(u32) + Send + Sync + 'static) -> Self {
        let mut provider = Self::new(responses);
        provider.on_call = Some(Box::new(on_call));
        provider
    }
}

#[async_trait]
impl LlmProvider for FakeProvider {
    async fn chat(&self, _req: &ChatRequest) -> Result<ChatResponse> {
        let resp = self.responses.lock().pop_front().ok_or_else(|| Error::Other("fake provider ran out of queued responses".into()))?;
        let n = {
            let mut count = self.call_count.lock();
            *count += 1;
            *count
        };
        if let Some(hook) = &self.on_call {
            hook(n);
        }
        Ok(resp)
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

fn tool_call_response(calls: Vec<ToolCall>) -> ChatResponse {
    ChatResponse { content: String::new(), tool_calls: calls, usage: None, model: "fake-model".into(), finish_reason: Some("tool_calls".into()) }
}

fn call(tool_name: &str, arguments: serde_json::Value) -> ToolCall {
    ToolCall { call_id: format!("call_{}", Uuid::new_v4()), tool_name: tool_name.into(), arguments }
}

/// Build an [`AppState`] under a fresh temp dir with a fake Standard/Fast
/// provider pre-loaded with `responses`, consumed in order across every
/// `start_run`/`resume_run` invocation against it.
fn test_state(dir: &std::path::Path, responses: Vec<ChatResponse>) -> AppState {
    let mut config = Config::default();
    config.store.state_path = dir.join("state").to_string_lossy().into_owned();
    config.store.output_path = dir.join("output").to_string_lossy().into_owned();

    let mut roles = HashMap::new();
    roles.insert(ModelRole::Standard, "fake".to_string());
    roles.insert(ModelRole::Fast, "fake".to_string());
    roles.insert(ModelRole::Powerful, "fake".to_string());
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

/// Like [`test_state`], but with `policy.mode` set before [`AppState::new`]
/// builds `state.policy` — the engine snapshots the mode at construction
/// time, so it has to be set on the way in rather than patched afterward.
fn test_state_with_policy_mode(dir: &std::path::Path, responses: Vec<ChatResponse>, mode: pf_domain::config::PolicyMode) -> AppState {
    let mut config = Config::default();
    config.store.state_path = dir.join("state").to_string_lossy().into_owned();
    config.store.output_path = dir.join("output").to_string_lossy().into_owned();
    config.policy.mode = mode;

    let mut roles = HashMap::new();
    roles.insert(ModelRole::Standard, "fake".to_string());
    roles.insert(ModelRole::Fast, "fake".to_string());
    roles.insert(ModelRole::Powerful, "fake".to_string());
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

fn write_design_system(state: &AppState, session_id: &str) {
    let dir = state.output_dir.join(session_id);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("design-system.css"), ":root { --brand: #111; }").unwrap();
}

const GOOD_PAGE_HTML: &str = r#"<!DOCTYPE html>
<html><head><title>Menu</title>
<meta name="viewport" content="width=device-width, initial-scale=1">
<style>.container { max-width: 420px; } .btn { height: 48px; min-height: 48px; }</style>
</head>
<body class="no-scrollbar"><div id="app">menu</div></body></html>"#;

/// `generate_page`/`edit_page`/`create_design_system`/`analyze_brief` each
/// make their own LLM call inside `execute`  on top of the main
/// loop's own decision call — every queued-response list below accounts
/// for both: the tool-call decision, then the tool's internal content call.
fn page_call_and_content(slug: &str, title: &str, description: &str) -> [ChatResponse; 2] {
    [
        tool_call_response(vec![call("generate_page", serde_json::json!({"slug": slug, "title": title, "description": description}))]),
        text_response(GOOD_PAGE_HTML),
    ]
}

// ─────────────────────────────────────────────────────────────────────
// Scenario A — detailed input, direct generation, no ask_user.
// ─────────────────────────────────────────────────────────────────────
#[tokio::test]
async fn scenario_a_detailed_input_generates_directly_and_completes() {
    let dir = tempfile::tempdir().unwrap();
    let analysis_json = serde_json::json!({
        "product_type": "cafe",
        "complexity": "simple",
        "suggested_pages": ["index"],
        "data_model": {"items": []},
        "needs_clarification": false,
        "clarifying_questions": []
    })
    .to_string();
    let mut responses = vec![
        // analyze_brief: decision, then its own classification call.
        tool_call_response(vec![call("analyze_brief", serde_json::json!({"user_request": "coffee shop menu"}))]),
        text_response(&analysis_json),
        // create_design_system: decision, then its own CSS-generation call.
        tool_call_response(vec![call("create_design_system", serde_json::json!({"product_type": "cafe"}))]),
        text_response(":root { --brand: #2244ff; } .container { max-width: 420px; }"),
    ];
    responses.extend(page_call_and_content("index", "Menu", "dark theme coffee menu"));
    responses.push(text_response("All set — your menu page is ready."));
    let state = test_state(dir.path(), responses);
    write_design_system(&state, "s1");
    let service = RunService::new(&state);

    let run = service.create_run("s1", "Build a menu page for a coffee shop, dark theme, five items, order by tapping.", None).unwrap();
    assert_eq!(run.status, RunStatus::Queued);

    let outcome = service.start_run(&state, "s1", run.run_id).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed { .. }), "expected Completed, got {outcome:?}");

    let final_run = service.get_run("s1", run.run_id).unwrap().unwrap();
    assert_eq!(final_run.status, RunStatus::Completed);

    let pages = state.pages.list("s1").unwrap();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].slug, "index");
    let versions = state.pages.list_versions("s1", pages[0].page_id).unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].version, 1);

    let events = state.events.get_by_run("s1", run.run_id, None, 1000).unwrap();
    let types: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
    assert!(types.contains(&EventType::RunCreated));
    assert!(types.contains(&EventType::RunStarted));
    assert!(types.contains(&EventType::ToolCall));
    assert!(types.contains(&EventType::ToolResult));
    assert!(types.contains(&EventType::VerifyPass));
    assert!(types.contains(&EventType::RunCompleted));
    assert!(!types.contains(&EventType::RunWaitingInput));

    // tool_call always precedes its tool_result (property 3).
    let first_call = events.iter().position(|e| e.event_type == EventType::ToolCall).unwrap();
    let first_result = events.iter().position(|e| e.event_type == EventType::ToolResult).unwrap();
    assert!(first_call < first_result);

    // seq is strictly increasing and gap-free.
    let session_events = state.events.get_by_session("s1", None, 10_000).unwrap();
    for pair in session_events.windows(2) {
        assert_eq!(pair[1].seq, pair[0].seq + 1);
    }
}

// ─────────────────────────────────────────────────────────────────────
// Scenario B — vague input reaches ask_user, then resume completes.
// ─────────────────────────────────────────────────────────────────────
#[tokio::test]
async fn scenario_b_vague_input_interviews_then_resumes_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let mut responses = vec![tool_call_response(vec![call(
        "ask_user",
        serde_json::json!({"questions": [{
            "question": "What kind of site, and which pages?",
            "type": "checkbox",
            "options": ["cafe", "portfolio"],
        }]}),
    )])];
    // after resume: three generate_page round-trips, each a decision call
    // plus the tool's own content-generation call, then a final completion.
    responses.extend(page_call_and_content("index", "Home", "cafe landing"));
    responses.extend(page_call_and_content("menu", "Menu", "cafe menu"));
    responses.extend(page_call_and_content("about", "About", "cafe about"));
    responses.push(text_response("Built your cafe site with menu and about pages."));
    let state = test_state(dir.path(), responses);
    write_design_system(&state, "s2");
    let service = RunService::new(&state);

    let run = service.create_run("s2", "Make me a website.", None).unwrap();
    let outcome = service.start_run(&state, "s2", run.run_id).await.unwrap();
    match outcome {
        RunOutcome::WaitingInput { questions } => {
            assert!(questions[0]["question"].as_str().unwrap().contains("kind of site"));
        }
        other => panic!("expected WaitingInput, got {other:?}"),
    }
    let waiting_run = service.get_run("s2", run.run_id).unwrap().unwrap();
    assert_eq!(waiting_run.status, RunStatus::WaitingInput);

    let resumed = service
        .resume_run(&state, "s2", run.run_id, serde_json::json!({"type": "cafe", "pages": ["menu", "about"]}), None)
        .await
        .unwrap();
    assert!(matches!(resumed, RunOutcome::Completed { .. }), "expected Completed after resume, got {resumed:?}");

    let final_run = service.get_run("s2", run.run_id).unwrap().unwrap();
    assert_eq!(final_run.status, RunStatus::Completed);

    let mut slugs: Vec<String> = state.pages.list("s2").unwrap().into_iter().map(|p| p.slug).collect();
    slugs.sort();
    assert_eq!(slugs, vec!["about".to_string(), "index".to_string(), "menu".to_string()]);

    let events = state.events.get_by_run("s2", run.run_id, None, 1000).unwrap();
    assert!(events.iter().any(|e| e.event_type == EventType::RunWaitingInput));
    assert!(events.iter().any(|e| e.event_type == EventType::RunResumed));
}

// ─────────────────────────────────────────────────────────────────────
// Scenario C — refinement: edit_page bumps a new PageVersion, version 1
// still exists, current_version_id moves forward.
// ─────────────────────────────────────────────────────────────────────
#[tokio::test]
async fn scenario_c_refinement_creates_new_version_and_keeps_the_old_one() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), vec![]);
    write_design_system(&state, "s3");

    // Seed a completed page directly through the store, standing in for
    // Scenario A's completed state (cheaper than re-running the full loop).
    let (page, v1) = state.pages.create_page("s3", "index", "Home", 0, GOOD_PAGE_HTML.to_string(), "initial").unwrap();
    let pages_dir = state.output_dir.join("s3").join("pages");
    std::fs::create_dir_all(&pages_dir).unwrap();
    std::fs::write(pages_dir.join("index.html"), GOOD_PAGE_HTML).unwrap();
    assert_eq!(v1.version, 1);

    let edited_html = GOOD_PAGE_HTML.replace("#111", "#2244ff");
    let mut registry = ProviderRegistry::from_config(&state.config.llm).unwrap();
    registry.register(
        "fake",
        Arc::new(FakeProvider::new(vec![
            // read_page is a pure store read with no internal LLM call.
            tool_call_response(vec![call("read_page", serde_json::json!({"slug": "index"}))]),
            // edit_page: decision, then its own edit-generation call.
            tool_call_response(vec![call(
                "edit_page",
                serde_json::json!({"slug": "index", "edit_instructions": "Change the header color to blue."}),
            )]),
            text_response(&edited_html),
            text_response("Updated the header color."),
        ])),
    );
    let mut state = state;
    state.providers = Arc::new(registry);

    let service = RunService::new(&state);
    let run = service.create_run("s3", "Change the header color to blue.", None).unwrap();
    let outcome = service.start_run(&state, "s3", run.run_id).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed { .. }), "expected Completed, got {outcome:?}");

    let versions = state.pages.list_versions("s3", page.page_id).unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0].version, 1);
    assert_eq!(versions[1].version, 2);

    let current = state.pages.get("s3", page.page_id).unwrap().unwrap();
    assert_eq!(current.current_version_id, versions[1].version_id);
    assert_ne!(current.current_version_id, versions[0].version_id);
}

// ─────────────────────────────────────────────────────────────────────
// Scenario E — verify fails once on the mobile check, the loop self-fixes
// via edit_page, then verify passes and the run completes.
// ─────────────────────────────────────────────────────────────────────
#[tokio::test]
async fn scenario_e_verify_fails_once_then_self_fixes_and_passes() {
    let dir = tempfile::tempdir().unwrap();
    let bad_html = GOOD_PAGE_HTML.replace(r#"<meta name="viewport" content="width=device-width, initial-scale=1">"#, "");
    let responses = vec![
        // generate_page: decision, then its own (broken) content call.
        tool_call_response(vec![call("generate_page", serde_json::json!({"slug": "index", "title": "Home", "description": "cafe landing"}))]),
        text_response(&bad_html),
        // no tool calls -> verify runs, mobile check fails, one retry granted.
        text_response("Here is your page."),
        // self-fix: edit_page decision, then its own (fixed) content call.
        tool_call_response(vec![call("edit_page", serde_json::json!({"slug": "index", "edit_instructions": "Add the missing viewport meta tag."}))]),
        text_response(GOOD_PAGE_HTML),
        // no tool calls -> verify runs again, everything passes.
        text_response("Fixed the mobile viewport issue."),
    ];
    let state = test_state(dir.path(), responses);
    write_design_system(&state, "s5");
    let service = RunService::new(&state);

    let run = service.create_run("s5", "Build a cafe landing page.", None).unwrap();
    let outcome = service.start_run(&state, "s5", run.run_id).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed { .. }), "expected Completed, got {outcome:?}");

    let final_run = service.get_run("s5", run.run_id).unwrap().unwrap();
    assert_eq!(final_run.status, RunStatus::Completed);

    // the stored report reflects the attempt that finally passed...
    let report = final_run.verify_report.expect("verify_report set");
    assert_eq!(report.get("attempt").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(report.get("passed").and_then(|v| v.as_bool()), Some(true));

    // ...and the event log carries both attempts: a failing mobile check
    // on attempt 1, a passing one on attempt 2.
    let events = state.events.get_by_run("s5", run.run_id, None, 1000).unwrap();
    let mobile_checks: Vec<_> = events
        .iter()
        .filter(|e| e.event_type == EventType::VerifyFail || e.event_type == EventType::VerifyPass)
        .filter(|e| e.payload.get("check").and_then(|v| v.as_str()) == Some("mobile"))
        .collect();
    assert!(mobile_checks.iter().any(|e| e.event_type == EventType::VerifyFail && e.payload.get("attempt").and_then(|v| v.as_u64()) == Some(1)));
    assert!(mobile_checks.iter().any(|e| e.event_type == EventType::VerifyPass && e.payload.get("attempt").and_then(|v| v.as_u64()) == Some(2)));

    let pages = state.pages.list("s5").unwrap();
    assert_eq!(pages.len(), 1);
    let versions = state.pages.list_versions("s5", pages[0].page_id).unwrap();
    assert_eq!(versions.len(), 2, "generate_page then edit_page's self-fix each add a PageVersion");
}

// ─────────────────────────────────────────────────────────────────────
// Scenario D — cancel mid-run: after the second tool_result, no further
// tool_call events are emitted; partial PageVersions for pages already
// generated persist; the run lands in Cancelled.
// ─────────────────────────────────────────────────────────────────────
#[tokio::test]
async fn scenario_d_cancel_mid_run_stops_further_tool_calls() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), vec![]);
    write_design_system(&state, "s4");
    let service = RunService::new(&state);
    let run = service.create_run("s4", "Build five pages.", None).unwrap();

    // Five generate_page calls queued, each a decision call plus the
    // tool's own content-generation call (4 chat exchanges per completed
    // tool_result). The fake provider's `on_call` hook fires the cancel
    // flag right after the second tool's content call completes —
    // simulating `cancel_run` landing right after the second
    // `tool_result`, deterministically rather than racing real time.
    let mut responses = Vec::new();
    for (slug, title) in [("p1", "P1"), ("p2", "P2"), ("p3", "P3"), ("p4", "P4"), ("p5", "P5")] {
        responses.extend(page_call_and_content(slug, title, "d"));
    }
    let cancel_map = state.cancel.clone();
    let run_id = run.run_id;
    let mut state = state;
    let mut registry = ProviderRegistry::from_config(&state.config.llm).unwrap();
    registry.register(
        "fake",
        Arc::new(FakeProvider::with_on_call(responses, move |n| {
            if n == 4 {
                cancel_map.cancel(run_id);
            }
        })),
    );
    state.providers = Arc::new(registry);

    let outcome = service.start_run(&state, "s4", run.run_id).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Cancelled), "expected Cancelled, got {outcome:?}");

    let final_run = service.get_run("s4", run.run_id).unwrap().unwrap();
    assert_eq!(final_run.status, RunStatus::Cancelled);

    let events = state.events.get_by_run("s4", run.run_id, None, 1000).unwrap();
    let tool_call_count = events.iter().filter(|e| e.event_type == EventType::ToolCall).count();
    assert_eq!(tool_call_count, 2, "only the first two tool calls should have been dispatched before cancellation was observed");
    assert!(events.iter().any(|e| e.event_type == EventType::RunCancelled));

    let mut slugs: Vec<String> = state.pages.list("s4").unwrap().into_iter().map(|p| p.slug).collect();
    slugs.sort();
    assert_eq!(slugs, vec!["p1".to_string(), "p2".to_string()], "pages already generated before cancellation persist");

    // Calling cancel_run again afterward stays idempotent (property 9).
    let cancel_again = service.cancel_run("s4", run.run_id).unwrap();
    assert_eq!(cancel_again.status, RunStatus::Cancelled);
}

#[tokio::test]
async fn scenario_d_cancel_flagged_before_start_never_dispatches_a_tool_call() {
    let dir = tempfile::tempdir().unwrap();
    let responses = vec![tool_call_response(vec![call("generate_page", serde_json::json!({"slug": "p1", "title": "P1", "description": "d"}))])];
    let state = test_state(dir.path(), responses);
    write_design_system(&state, "s4b");
    let service = RunService::new(&state);

    let run = service.create_run("s4b", "Build five pages.", None).unwrap();
    state.cancel.register(run.run_id);
    state.cancel.cancel(run.run_id);

    let outcome = service.start_run(&state, "s4b", run.run_id).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Cancelled));
    let final_run = service.get_run("s4b", run.run_id).unwrap().unwrap();
    assert_eq!(final_run.status, RunStatus::Cancelled);

    let events = state.events.get_by_run("s4b", run.run_id, None, 1000).unwrap();
    assert!(!events.iter().any(|e| e.event_type == EventType::ToolCall));
    assert!(events.iter().any(|e| e.event_type == EventType::RunCancelled));

    // Cancelling the now-terminal run again is a no-op (property 9).
    let replay = service.cancel_run("s4b", run.run_id).unwrap();
    assert_eq!(replay.status, RunStatus::Cancelled);
}

// ─────────────────────────────────────────────────────────────────────
// Scenario F — policy block: an escape-path write under `enforce` mode
// is blocked, the loop continues, and nothing lands outside the session dir.
// ─────────────────────────────────────────────────────────────────────
#[tokio::test]
async fn scenario_f_enforced_path_escape_is_blocked_and_loop_continues() {
    let dir = tempfile::tempdir().unwrap();
    let responses = vec![
        tool_call_response(vec![call(
            "batch_file_write",
            serde_json::json!({"operations": [{"path": "../../etc/passwd", "content": "pwned"}]}),
        )]),
        text_response("Understood, I won't write outside the project directory."),
    ];
    // `PolicyEngine` snapshots `PolicyConfig` at construction time (inside
    // `AppState::new`), so the mode has to be set before the state is built —
    // mutating `state.config` afterward would not reach the already-built
    // `state.policy`.
    let state = test_state_with_policy_mode(dir.path(), responses, pf_domain::config::PolicyMode::Enforce);
    write_design_system(&state, "s6");
    // Seed an existing `index` page so the text-only completion step that
    // follows the blocked write satisfies the Structure check's "at least
    // an index page exists" requirement — this scenario is about the
    // policy block, not page generation.
    state.pages.create_page("s6", "index", "Home", 0, GOOD_PAGE_HTML.to_string(), "initial").unwrap();
    let pages_dir = state.output_dir.join("s6").join("pages");
    std::fs::create_dir_all(&pages_dir).unwrap();
    std::fs::write(pages_dir.join("index.html"), GOOD_PAGE_HTML).unwrap();
    let service = RunService::new(&state);

    let run = service.create_run("s6", "write a secrets file outside the project", None).unwrap();
    let outcome = service.start_run(&state, "s6", run.run_id).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed { .. }), "expected Completed, got {outcome:?}");

    assert!(!std::path::Path::new("/etc/passwd_pwned").exists());
    let events = state.events.get_by_run("s6", run.run_id, None, 1000).unwrap();
    assert!(events.iter().any(|e| e.event_type == EventType::ToolPolicyBlocked));

    let tool_result = events.iter().find(|e| e.event_type == EventType::ToolResult).unwrap();
    assert_eq!(tool_result.payload.get("success").and_then(|v| v.as_bool()), Some(false));
}
