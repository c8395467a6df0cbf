//! `validate_html`  — report-only structural/mobile/lint check over
//! a page's current HTML. Runs the same structure and mobile checks as
//! the Verify Gate (in `pf-core`) plus lint-only checks, but never
//! gates anything itself — it only ever returns a report.

use pf_domain::config::VerifyConfig;
use pf_domain::tool::ToolResult;
use serde_json::Value;

use super::checks::{lint_check, mobile_check, structure_check};
use crate::context::ToolContext;
use crate::registry::Tool;

pub struct ValidateHtml;

#[async_trait::async_trait]
impl Tool for ValidateHtml {
    fn name(&self) -> &str {
        "validate_html"
    }

    fn description(&self) -> &str {
        "Report structural, mobile, and lint issues in a page's current HTML without gating anything."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "slug": {"type": "string"},
                "html": {"type": "string"}
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let html = match params.get("html").and_then(|v| v.as_str()) {
            Some(h) => h.to_string(),
            None => {
                let slug = match params.get("slug").and_then(|v| v.as_str()) {
                    Some(s) => s,
                    None => return ToolResult::err("either html or slug must be provided"),
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
                    Some(v) => v.html,
                    None => return ToolResult::err("current version missing from history"),
                }
            }
        };

        let config = VerifyConfig::default();
        let structure = structure_check(&html);
        let mobile = mobile_check(&html, &config);
        let lint = lint_check(&html);
        let all_passed = structure.passed && mobile.passed && lint.passed;

        let report = serde_json::json!({
            "structure": {"passed": structure.passed, "details": structure.details},
            "mobile": {"passed": mobile.passed, "details": mobile.details},
            "lint": {"passed": lint.passed, "details": lint.details},
            "all_passed": all_passed,
        });

        ToolResult::ok(serde_json::to_string_pretty(&report).unwrap_or_default())
            .with_artifact("report", report)
    }
}
