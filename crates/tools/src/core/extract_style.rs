//! `extract_style`  — derives a style-tokens JSON object (palette,
//! font stack, spacing scale) from a reference screenshot or image URL,
//! via a vision-capable model, then checks the extracted palette for
//! WCAG AA text contrast.

use pf_domain::capability::ModelRole;
use pf_domain::tool::{ContentPart, Message, MessageContent, Role, ToolResult};
use pf_providers::ChatRequest;
use serde_json::Value;

use crate::context::ToolContext;
use crate::registry::Tool;

pub struct ExtractStyle;

const SYSTEM_PROMPT: &str = "You extract a reusable style-tokens JSON object from a reference \
image of a UI. Respond with JSON only: {\"colors\": {\"primary\": string, \"secondary\": string, \
\"background\": string, \"text\": string}, \"font_family\": string, \"spacing_scale_px\": [number], \
\"corner_radius_px\": number}. Colors must be hex strings.";

#[async_trait::async_trait]
impl Tool for ExtractStyle {
    fn name(&self) -> &str {
        "extract_style"
    }

    fn description(&self) -> &str {
        "Extract a style-tokens JSON object (palette, fonts, spacing) from a reference image."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "image_url": {"type": "string"}
            },
            "required": ["image_url"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let image_url = match params.get("image_url").and_then(|v| v.as_str()) {
            Some(s) => s,
            None => return ToolResult::err("image_url must be a string"),
        };

        let resolved = match ctx.providers.resolve(ModelRole::Powerful) {
            Ok(r) => r,
            Err(e) => return ToolResult::err(format!("no vision-capable model configured for extract_style: {e}")),
        };
        if !resolved.provider.capabilities().supports_vision {
            return ToolResult::err("configured model for extract_style does not support vision input");
        }

        let user_message = Message {
            role: Role::User,
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: "Extract style tokens from this reference image.".to_string() },
                ContentPart::Image { url: image_url.to_string(), media_type: None },
            ]),
        };

        let req = ChatRequest {
            messages: vec![Message::system(SYSTEM_PROMPT), user_message],
            tools: vec![],
            temperature: Some(0.2),
            max_tokens: Some(1024),
            json_mode: true,
            model: resolved.model.clone(),
        };

        let resp = match resolved.provider.chat(&req).await {
            Ok(r) => r,
            Err(e) => return ToolResult::err(format!("extract_style LLM call failed: {e}")),
        };

        let tokens: Value = match serde_json::from_str(&resp.content) {
            Ok(v) => v,
            Err(e) => return ToolResult::err(format!("extract_style returned non-JSON output: {e}")),
        };

        let contrast_issues = check_contrast(&tokens);

        ToolResult::ok(serde_json::to_string_pretty(&tokens).unwrap_or_default())
            .with_artifact("style_tokens", tokens)
            .with_artifact("contrast_issues", serde_json::json!(contrast_issues))
    }
}

/// WCAG AA requires a contrast ratio >= 4.5:1 for normal body text. Flags
/// `text`-on-`background` pairs below that threshold; not a hard gate,
/// just a warning surfaced in the tool's artifacts.
fn check_contrast(tokens: &Value) -> Vec<String> {
    let mut issues = Vec::new();
    let colors = match tokens.get("colors").and_then(|c| c.as_object()) {
        Some(c) => c,
        None => return issues,
    };
    let text = colors.get("text").and_then(|v| v.as_str());
    let background = colors.get("background").and_then(|v| v.as_str());
    if let (Some(text_hex), Some(bg_hex)) = (text, background) {
        if let (Some(t), Some(b)) = (parse_hex(text_hex), parse_hex(bg_hex)) {
            let ratio = contrast_ratio(t, b);
            if ratio < 4.5 {
                issues.push(format!(
                    "text/background contrast ratio {ratio:.2} is below WCAG AA's 4.5 minimum"
                ));
            }
        }
    }
    issues
}

fn parse_hex(hex: &str) -> Option<(u8, u8, u8)> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some((r, g, b))
}

fn relative_luminance((r, g, b): (u8, u8, u8)) -> f64 {
    let channel = |c: u8| {
        let c = c as f64 / 255.0;
        if c <= 0.03928 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        }
    };
    0.2126 * channel(r) + 0.7152 * channel(g) + 0.0722 * channel(b)
}

fn contrast_ratio(a: (u8, u8, u8), b: (u8, u8, u8)) -> f64 {
    let (l1, l2) = (relative_luminance(a), relative_luminance(b));
    let (lighter, darker) = if l1 >= l2 { (l1, l2) } else { (l2, l1) };
    (lighter + 0.05) / (darker + 0.05)
}
