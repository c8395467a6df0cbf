//! `generate_page`, `edit_page`, `read_page`, `list_pages`  — the
//! page-authoring tools. Each write-side call creates a new
//! [`pf_domain::entities::PageVersion`] via [`pf_store::PageStore`] and
//! mirrors the current HTML onto the filesystem layout :
//! `pages/{slug}.html` (current) + `pages/v{ts}_{slug}.html` (history).

use pf_domain::capability::ModelRole;
use pf_domain::entities::EventType;
use pf_domain::tool::{Message, ToolResult};
use pf_providers::ChatRequest;
use serde_json::Value;

use crate::context::ToolContext;
use crate::registry::Tool;

const GENERATE_SYSTEM_PROMPT: &str = "You write a single standalone mobile-first HTML page for a \
static site. Output raw HTML only, no markdown fences, no commentary. Requirements: valid \
<!DOCTYPE html>; a <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\"> tag; \
link or embed the provided design system CSS; wrap the page body in a single root element with \
id=\"app\"; every interactive element must be at least 44px tall; apply a no-scrollbar utility \
class to any internally-scrolling region.";

const EDIT_SYSTEM_PROMPT: &str = "You edit an existing standalone HTML page per the given \
instructions. Output the full, complete modified HTML only, no markdown fences, no commentary. \
Preserve every section not targeted by the instructions byte-for-byte.";

fn mirror_to_filesystem(ctx: &ToolContext, slug: &str, html: &str, version: u32) -> Result<(), String> {
    let pages_dir = ctx.pages_dir();
    std::fs::create_dir_all(&pages_dir).map_err(|e| e.to_string())?;
    std::fs::write(ctx.page_path(slug), html).map_err(|e| e.to_string())?;
    let ts = chrono::Utc::now().timestamp();
    let history_path = pages_dir.join(format!("v{ts}_{slug}.html"));
    std::fs::write(history_path, html).map_err(|e| e.to_string())?;
    let _ = version;
    Ok(())
}

pub struct GeneratePage;

#[async_trait::async_trait]
impl Tool for GeneratePage {
    fn name(&self) -> &str {
        "generate_page"
    }

    fn description(&self) -> &str {
        "Generate a new standalone mobile-first HTML page and create its first PageVersion."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "slug": {"type": "string"},
                "title": {"type": "string"},
                "description": {"type": "string"},
                "design_system_css": {"type": "string"},
                "data_model": {"type": "object"}
            },
            "required": ["slug", "title", "description"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let slug = match params.get("slug").and_then(|v| v.as_str()) {
            Some(s) => s,
            None => return ToolResult::err("slug must be a string"),
        };
        let title = params.get("title").and_then(|v| v.as_str()).unwrap_or(slug);
        let description = params.get("description").and_then(|v| v.as_str()).unwrap_or("");

        if let Err(e) = pf_domain::entities::Page::validate_slug(slug) {
            return ToolResult::err(format!("invalid slug: {e}"));
        }

        let resolved = match ctx.providers.resolve(ModelRole::Standard) {
            Ok(r) => r,
            Err(e) => return ToolResult::err(format!("no model configured for generate_page: {e}")),
        };

        let mut prompt = format!("Page slug: {slug}\nTitle: {title}\nDescription: {description}");
        let css = params.get("design_system_css").and_then(|v| v.as_str()).map(String::from).unwrap_or_else(|| {
            std::fs::read_to_string(ctx.design_system_path()).unwrap_or_default()
        });
        if !css.is_empty() {
            prompt.push_str(&format!("\nDesign system CSS (embed via <style>):\n{css}"));
        }
        if let Some(model) = params.get("data_model") {
            prompt.push_str(&format!("\nData model: {model}"));
        }

        let req = ChatRequest {
            messages: vec![Message::system(GENERATE_SYSTEM_PROMPT), Message::user(prompt)],
            tools: vec![],
            temperature: Some(0.4),
            max_tokens: Some(8192),
            json_mode: false,
            model: resolved.model.clone(),
        };

        let resp = match resolved.provider.chat(&req).await {
            Ok(r) => r,
            Err(e) => return ToolResult::err(format!("generate_page LLM call failed: {e}")),
        };

        let existing = match ctx.pages.list(&ctx.session_id) {
            Ok(p) => p,
            Err(e) => return ToolResult::err(format!("failed to list pages: {e}")),
        };
        let order_index = existing.len() as u32;

        let (page, version) = match ctx.pages.create_page(&ctx.session_id, slug, title, order_index, resp.content.clone(), description) {
            Ok(pv) => pv,
            Err(e) => return ToolResult::err(format!("failed to persist page: {e}")),
        };

        if let Err(e) = mirror_to_filesystem(ctx, slug, &resp.content, version.version) {
            return ToolResult::err(format!("failed to write page to filesystem: {e}"));
        }

        let _ = ctx.events.append(&ctx.session_id, EventType::PageCreated, Some(ctx.run_id), "generate_page", serde_json::json!({"slug": slug, "page_id": page.page_id}));
        let _ = ctx.events.append(&ctx.session_id, EventType::PageVersionCreated, Some(ctx.run_id), "generate_page", serde_json::json!({"slug": slug, "version": version.version}));

        ToolResult::ok(format!("generated page {slug:?} (version {})", version.version))
            .with_artifact("page_id", serde_json::json!(page.page_id))
            .with_artifact("slug", serde_json::json!(slug))
            .with_artifact("version", serde_json::json!(version.version))
            .with_artifact("html", serde_json::json!(resp.content))
    }
}

pub struct EditPage;

#[async_trait::async_trait]
impl Tool for EditPage {
    fn name(&self) -> &str {
        "edit_page"
    }

    fn description(&self) -> &str {
        "Apply edit instructions to an existing page, creating a new PageVersion."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "slug": {"type": "string"},
                "edit_instructions": {"type": "string"},
                "current_html": {"type": "string"}
            },
            "required": ["slug", "edit_instructions"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let slug = match params.get("slug").and_then(|v| v.as_str()) {
            Some(s) => s,
            None => return ToolResult::err("slug must be a string"),
        };
        let edit_instructions = match params.get("edit_instructions").and_then(|v| v.as_str()) {
            Some(s) => s,
            None => return ToolResult::err("edit_instructions must be a string"),
        };

        let page = match ctx.pages.get_by_slug(&ctx.session_id, slug) {
            Ok(Some(p)) => p,
            Ok(None) => return ToolResult::err(format!("no page with slug {slug:?}")),
            Err(e) => return ToolResult::err(format!("failed to look up page: {e}")),
        };

        let current_html = match params.get("current_html").and_then(|v| v.as_str()) {
            Some(h) => h.to_string(),
            None => {
                let versions = match ctx.pages.list_versions(&ctx.session_id, page.page_id) {
                    Ok(v) => v,
                    Err(e) => return ToolResult::err(format!("failed to load page history: {e}")),
                };
                match versions.into_iter().find(|v| v.version_id == page.current_version_id) {
                    Some(v) => v.html,
                    None => return ToolResult::err("current version missing from history"),
                }
            }
        };

        let resolved = match ctx.providers.resolve(ModelRole::Standard) {
            Ok(r) => r,
            Err(e) => return ToolResult::err(format!("no model configured for edit_page: {e}")),
        };

        let prompt = format!("Edit instructions: {edit_instructions}\n\nCurrent HTML:\n{current_html}");
        let req = ChatRequest {
            messages: vec![Message::system(EDIT_SYSTEM_PROMPT), Message::user(prompt)],
            tools: vec![],
            temperature: Some(0.3),
            max_tokens: Some(8192),
            json_mode: false,
            model: resolved.model.clone(),
        };

        let resp = match resolved.provider.chat(&req).await {
            Ok(r) => r,
            Err(e) => return ToolResult::err(format!("edit_page LLM call failed: {e}")),
        };

        let (updated_page, version) = match ctx.pages.add_version(&ctx.session_id, page.page_id, resp.content.clone(), edit_instructions) {
            Ok(pv) => pv,
            Err(e) => return ToolResult::err(format!("failed to persist page edit: {e}")),
        };

        if let Err(e) = mirror_to_filesystem(ctx, slug, &resp.content, version.version) {
            return ToolResult::err(format!("failed to write page to filesystem: {e}"));
        }

        let _ = ctx.events.append(&ctx.session_id, EventType::PageVersionCreated, Some(ctx.run_id), "edit_page", serde_json::json!({"slug": slug, "version": version.version}));

        ToolResult::ok(format!("edited page {slug:?} (now version {})", version.version))
            .with_artifact("page_id", serde_json::json!(updated_page.page_id))
            .with_artifact("slug", serde_json::json!(slug))
            .with_artifact("version", serde_json::json!(version.version))
            .with_artifact("html", serde_json::json!(resp.content))
    }
}

pub struct ReadPage;

#[async_trait::async_trait]
impl Tool for ReadPage {
    fn name(&self) -> &str {
        "read_page"
    }

    fn description(&self) -> &str {
        "Read the current HTML of a page by slug."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {"slug": {"type": "string"}},
            "required": ["slug"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let slug = match params.get("slug").and_then(|v| v.as_str()) {
            Some(s) => s,
            None => return ToolResult::err("slug must be a string"),
        };
        let page = match ctx.pages.get_by_slug(&ctx.session_id, slug) {
            Ok(Some(p)) => p,
            Ok(None) => return ToolResult::err(format!("no page with slug {slug:?}")),
            Err(e) => return ToolResult::err(format!("failed to look up page: {e}")),
        };
        let versions = match ctx.pages.list_versions(&ctx.session_id, page.page_id) {
            Ok(v) => v,
            Err(e) => return ToolResult::err(format!("failed to load page history: {e}")),
        };
        match versions.into_iter().find(|v| v.version_id == page.current_version_id) {
            Some(v) => ToolResult::ok(v.html).with_artifact("version", serde_json::json!(v.version)),
            None => ToolResult::err("current version missing from history"),
        }
    }
}

pub struct ListPages;

#[async_trait::async_trait]
impl Tool for ListPages {
    fn name(&self) -> &str {
        "list_pages"
    }

    fn description(&self) -> &str {
        "List every page in the session with its slug, title, and current version."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> ToolResult {
        let pages = match ctx.pages.list(&ctx.session_id) {
            Ok(p) => p,
            Err(e) => return ToolResult::err(format!("failed to list pages: {e}")),
        };
        let summary: Vec<Value> = pages
            .iter()
            .map(|p| serde_json::json!({"slug": p.slug, "title": p.title, "order_index": p.order_index, "page_id": p.page_id}))
            .collect();
        ToolResult::ok(serde_json::to_string_pretty(&summary).unwrap_or_default()).with_artifact("pages", serde_json::json!(summary))
    }
}
