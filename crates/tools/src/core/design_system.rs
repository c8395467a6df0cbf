//! `create_design_system`  — produces the shared CSS document every
//! generated page references: variables, component classes, mobile
//! utilities. Written to `{output_dir}/{session_id}/design-system.css`
//! (filesystem layout).

use pf_domain::capability::ModelRole;
use pf_domain::tool::{Message, ToolResult};
use pf_providers::ChatRequest;
use serde_json::Value;

use crate::context::ToolContext;
use crate::registry::Tool;

pub struct CreateDesignSystem;

const SYSTEM_PROMPT: &str = "You write a single mobile-first CSS stylesheet for a static site \
design system. Output raw CSS only, no markdown fences, no commentary. Include: CSS custom \
properties for colors/spacing/radius/shadow/typography; a `.container` class with \
`max-width: 430px` and centered layout; utility classes for buttons and cards with a minimum \
`min-height: 44px` on interactive elements; a `.no-scrollbar` class that hides scrollbars while \
preserving scroll.";

#[async_trait::async_trait]
impl Tool for CreateDesignSystem {
    fn name(&self) -> &str {
        "create_design_system"
    }

    fn description(&self) -> &str {
        "Produce the shared mobile-first CSS design system (variables, components, utilities) for this session."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "product_type": {"type": "string"},
                "style_tokens": {"type": "object"},
                "brand_colors": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["product_type"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let product_type = match params.get("product_type").and_then(|v| v.as_str()) {
            Some(s) => s,
            None => return ToolResult::err("product_type must be a string"),
        };

        let resolved = match ctx.providers.resolve(ModelRole::Standard) {
            Ok(r) => r,
            Err(e) => return ToolResult::err(format!("no model configured for create_design_system: {e}")),
        };

        let mut prompt = format!("Product type: {product_type}");
        if let Some(tokens) = params.get("style_tokens") {
            prompt.push_str(&format!("\nStyle tokens: {tokens}"));
        }
        if let Some(colors) = params.get("brand_colors") {
            prompt.push_str(&format!("\nBrand colors: {colors}"));
        }

        let req = ChatRequest {
            messages: vec![Message::system(SYSTEM_PROMPT), Message::user(prompt)],
            tools: vec![],
            temperature: Some(0.3),
            max_tokens: Some(4096),
            json_mode: false,
            model: resolved.model.clone(),
        };

        let resp = match resolved.provider.chat(&req).await {
            Ok(r) => r,
            Err(e) => return ToolResult::err(format!("create_design_system LLM call failed: {e}")),
        };

        if let Err(e) = std::fs::create_dir_all(&ctx.session_output_dir) {
            return ToolResult::err(format!("failed to create session output dir: {e}"));
        }
        let path = ctx.design_system_path();
        if let Err(e) = std::fs::write(&path, &resp.content) {
            return ToolResult::err(format!("failed to write design-system.css: {e}"));
        }

        ToolResult::ok(format!("design system written ({} bytes)", resp.content.len()))
            .with_artifact("path", serde_json::json!(path.display().to_string()))
            .with_artifact("css", serde_json::json!(resp.content))
    }
}
