//! `analyze_brief`  — classifies product type and complexity,
//! suggests a page list and a default data model. First tool the loop
//! reaches for a vague or detailed brief alike (Scenarios A, B).

use pf_domain::capability::ModelRole;
use pf_domain::entities::EventType;
use pf_domain::tool::{Message, ToolResult};
use pf_providers::ChatRequest;
use serde_json::Value;

use crate::context::ToolContext;
use crate::registry::Tool;

pub struct AnalyzeBrief;

const SYSTEM_PROMPT: &str = "You classify a short product request for a mobile-first static site \
generator. Respond with JSON only: {\"product_type\": string, \"complexity\": \"simple\"|\"medium\"|\"complex\", \
\"suggested_pages\": [string], \"data_model\": object, \"needs_clarification\": boolean, \
\"clarifying_questions\": [string]}. `suggested_pages` always includes \"index\". Set \
`needs_clarification` true only when the request is too vague to generate without guessing \
(e.g. \"make me a website\").";

#[async_trait::async_trait]
impl Tool for AnalyzeBrief {
    fn name(&self) -> &str {
        "analyze_brief"
    }

    fn description(&self) -> &str {
        "Classify a product request: product type, complexity, suggested pages, default data model."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "user_request": {"type": "string"},
                "conversation_summary": {"type": "string"}
            },
            "required": ["user_request"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let user_request = match params.get("user_request").and_then(|v| v.as_str()) {
            Some(s) => s,
            None => return ToolResult::err("user_request must be a string"),
        };
        let conversation_summary = params.get("conversation_summary").and_then(|v| v.as_str()).unwrap_or("");

        let resolved = match ctx.providers.resolve(ModelRole::Fast) {
            Ok(r) => r,
            Err(e) => return ToolResult::err(format!("no model configured for analyze_brief: {e}")),
        };

        let mut prompt = format!("Request: {user_request}");
        if !conversation_summary.is_empty() {
            prompt.push_str(&format!("\nConversation so far: {conversation_summary}"));
        }

        let req = ChatRequest {
            messages: vec![Message::system(SYSTEM_PROMPT), Message::user(prompt)],
            tools: vec![],
            temperature: Some(0.2),
            max_tokens: Some(1024),
            json_mode: true,
            model: resolved.model.clone(),
        };

        let resp = match resolved.provider.chat(&req).await {
            Ok(r) => r,
            Err(e) => return ToolResult::err(format!("analyze_brief LLM call failed: {e}")),
        };

        let analysis: Value = match serde_json::from_str(&resp.content) {
            Ok(v) => v,
            Err(e) => return ToolResult::err(format!("analyze_brief returned non-JSON output: {e}")),
        };

        let mut doc = match ctx.product_docs.get(&ctx.session_id) {
            Ok(d) => d,
            Err(e) => return ToolResult::err(format!("failed to load product doc: {e}")),
        };
        doc.upsert_section(
            "overview",
            "Product Overview",
            &serde_json::to_string_pretty(&analysis).unwrap_or_default(),
            "analyze_brief",
        );
        if doc.project_card.is_empty() {
            doc.project_card = pf_domain::util::truncate_str(user_request, 480);
        }
        if let Err(e) = ctx.product_docs.save(&ctx.session_id, &doc) {
            return ToolResult::err(format!("failed to save product doc: {e}"));
        }

        let _ = ctx.events.append(
            &ctx.session_id,
            EventType::ProductDocGenerated,
            Some(ctx.run_id),
            "analyze_brief",
            serde_json::json!({"section": "overview"}),
        );

        ToolResult::ok(serde_json::to_string_pretty(&analysis).unwrap_or_default())
            .with_artifact("analysis", analysis)
    }
}
