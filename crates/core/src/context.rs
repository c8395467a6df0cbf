//! Conversation Context — three-layer message assembly and
//! AU2-summary compaction.
//!
//! A Fast-tier LLM call summarizes a contiguous slice of the transcript;
//! the result replaces that slice with a synthetic message holding a
//! structured `Au2Summary` (eight fixed dimensions merged field-by-field)
//! rather than a free-text marker line.

use pf_domain::capability::ModelRole;
use pf_domain::config::CompactionConfig;
use pf_domain::entities::{Au2Summary, ConversationContext, ProductDoc};
use pf_domain::error::{Error, Result};
use pf_domain::token::{CharApprox, TokenCounter};
use pf_domain::tool::{ContentPart, Message, MessageContent, Role, ToolDefinition};
use pf_domain::trace::TraceEvent;
use pf_providers::{ChatRequest, ProviderRegistry};

/// The project card's §3 budget, enforced via the token-accounting
/// fallback chain's [`CharApprox`] counter rather than a separate
/// hardcoded chars-per-token ratio.
const PROJECT_CARD_TOKEN_BUDGET: u32 = 500;

/// Long-term layer, part 1: the system prompt every Run opens with.
/// Static — doesn't vary per task_hint, unlike the ProductDoc sections below.
pub fn build_system_prompt() -> String {
    "You are PageForge's generation agent. Given a natural-language brief, \
     use the available tools to analyze the request, establish a design \
     system, and author mobile-optimized static HTML pages. Work \
     incrementally: inspect existing pages before editing them, validate \
     before finishing, and call ask_user only when a genuine ambiguity \
     would make guessing wrong rather than merely less polished."
        .to_string()
}

/// Selects which ProductDoc sections to inject for this step. `task_hint`
/// narrows inclusion to sections whose name or title contains it
/// (case-insensitive); `None` includes every section ("always-include
/// project card, selective section inclusion").
fn select_sections<'a>(doc: &'a ProductDoc, task_hint: Option<&str>) -> Vec<&'a str> {
    let mut names: Vec<&str> = doc
        .sections
        .iter()
        .filter(|(name, section)| match task_hint {
            Some(hint) => {
                let hint = hint.to_ascii_lowercase();
                name.to_ascii_lowercase().contains(&hint) || section.title.to_ascii_lowercase().contains(&hint)
            }
            None => true,
        })
        .map(|(name, _)| name.as_str())
        .collect();
    names.sort();
    names
}

/// Build the full message list for one LLM call: system prompt, project
/// card, selected ProductDoc sections, the AU2 summary (if any), then the
/// verbatim short-term transcript ("Assembly").
pub fn build_messages(
    session_id: &str,
    ctx: &ConversationContext,
    doc: &ProductDoc,
    task_hint: Option<&str>,
) -> Vec<Message> {
    let mut messages = Vec::new();
    let mut total_injected_chars = 0usize;

    let system_prompt = build_system_prompt();
    total_injected_chars += system_prompt.len();
    messages.push(Message::system(system_prompt));

    if !doc.project_card.is_empty() {
        let card = truncate_project_card(&doc.project_card);
        total_injected_chars += card.len();
        messages.push(Message::system(format!("[project card]\n{card}")));
    }

    let included = select_sections(doc, task_hint);
    for name in &included {
        if let Some(section) = doc.sections.get(*name) {
            let rendered = format!("[product doc: {}]\n{}", section.title, section.content);
            total_injected_chars += rendered.len();
            messages.push(Message::system(rendered));
        }
    }

    let au2_present = !ctx.au2.is_empty();
    if au2_present {
        let rendered = ctx.au2.render();
        total_injected_chars += rendered.len();
        messages.push(Message::assistant(rendered));
    }

    total_injected_chars += ctx.short_term.iter().map(approx_message_len).sum::<usize>();
    messages.extend(ctx.short_term.iter().cloned());

    TraceEvent::ContextBuilt {
        session_id: session_id.to_string(),
        total_injected_chars,
        sections_included: included.len(),
        short_term_messages: ctx.short_term.len(),
        au2_present,
    }
    .emit();

    messages
}

fn approx_message_len(msg: &Message) -> usize {
    msg.content.extract_all_text().len()
}

/// Truncate `card` to [`PROJECT_CARD_TOKEN_BUDGET`] using [`CharApprox`] —
/// the same fallback counter the token-accounting chain falls back to when
/// no model-family tokenizer is registered, rather than a separate ad hoc
/// chars-per-token ratio.
fn truncate_project_card(card: &str) -> String {
    if CharApprox.count(card) <= PROJECT_CARD_TOKEN_BUDGET {
        return card.to_string();
    }
    pf_domain::util::truncate_str(card, PROJECT_CARD_TOKEN_BUDGET as usize * 3)
}

/// The system prompt for the compaction LLM call — instructs it to return
/// the eight AU2 dimensions as a flat JSON object, nothing else.
fn compaction_system_prompt() -> String {
    "Summarize the conversation slice you're given into exactly these eight \
     JSON string fields, leaving a field empty (\"\") if it didn't change in \
     this slice: goal, progress, decisions, constraints, style, pages, \
     issues, next_steps. Respond with only the JSON object, no prose."
        .to_string()
}

fn render_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("{:?}: {}", m.role, m.content.extract_all_text()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Compact `ctx.short_term` once it exceeds `config.threshold` (step
/// 4): summarize the middle slice (everything but the first `keep_first`
/// and last `keep_last` dialogue messages) via a Fast-tier LLM call,
/// merge the result into `ctx.au2`, and replace that slice with one
/// synthetic assistant message rendering the updated summary. Returns
/// `true` if compaction ran. Idempotent: a context already below
/// threshold is a no-op.
pub async fn maybe_compact(
    session_id: &str,
    ctx: &mut ConversationContext,
    providers: &ProviderRegistry,
    config: &CompactionConfig,
) -> Result<bool> {
    if !config.auto || ctx.short_term.len() <= config.threshold {
        return Ok(false);
    }

    let keep_first = config.keep_first.min(ctx.short_term.len());
    let keep_last = config.keep_last.min(ctx.short_term.len().saturating_sub(keep_first));
    let middle_start = keep_first;
    let middle_end = ctx.short_term.len().saturating_sub(keep_last);
    if middle_end <= middle_start {
        return Ok(false);
    }

    let middle = &ctx.short_term[middle_start..middle_end];
    let resolved = providers.resolve(ModelRole::Fast)?;
    let req = ChatRequest {
        messages: vec![Message::system(compaction_system_prompt()), Message::user(render_transcript(middle))],
        tools: Vec::new(),
        temperature: Some(0.1),
        max_tokens: Some(800),
        json_mode: true,
        model: resolved.model.clone(),
    };
    let response = resolved.provider.chat(&req).await?;
    let new_summary: Au2Summary = serde_json::from_str(&response.content).map_err(|e| {
        Error::Provider {
            provider: resolved.provider.provider_id().to_string(),
            message: format!("compaction summary was not valid JSON: {e}"),
        }
    })?;

    let messages_compacted = middle.len();
    ctx.au2.merge(new_summary);
    let rendered = ctx.au2.render();

    let mut rebuilt = Vec::with_capacity(keep_first + 1 + keep_last);
    rebuilt.extend_from_slice(&ctx.short_term[..middle_start]);
    rebuilt.push(Message::assistant(rendered.clone()));
    rebuilt.extend_from_slice(&ctx.short_term[middle_end..]);
    ctx.short_term = rebuilt;

    TraceEvent::CompactionRan {
        session_id: session_id.to_string(),
        messages_compacted,
        summary_chars: rendered.len(),
    }
    .emit();

    Ok(true)
}

/// Tool defs aren't part of `build_messages` (they go on `ChatRequest.tools`
/// directly) but live here since C2 owns "what goes into one LLM call".
pub fn tool_definitions(registry: &pf_tools::ToolRegistry) -> Vec<ToolDefinition> {
    registry.get_openai_tools()
}

/// Find the `call_id` of the most recent `ask_user` tool call in
/// short-term history — resume synthesizes its tool-result message from
/// the user's answers ("Resume semantics"), and needs the original
/// call's id so the model sees a consistent call/result pair.
pub fn pending_ask_user_call_id(ctx: &ConversationContext) -> Option<String> {
    ctx.short_term.iter().rev().find_map(|m| {
        if m.role != Role::Assistant {
            return None;
        }
        match &m.content {
            MessageContent::Parts(parts) => parts.iter().find_map(|p| match p {
                ContentPart::ToolUse { id, name, .. } if name == "ask_user" => Some(id.clone()),
                _ => None,
            }),
            _ => None,
        }
    })
}
