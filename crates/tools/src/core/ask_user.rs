//! `ask_user` (step 4) — the blocking-tool sentinel. Its
//! `ToolResult` never fails on its own account; instead it sets
//! `artifacts.blocking = true`, which the agentic loop (in
//! `pf-core`) reads via [`pf_domain::tool::ToolResult::is_blocking`] to
//! suspend the Run into `WaitingInput` rather than continue stepping.
//!
//! §4.8: `questions[]`, each `{question, type ∈ {radio, checkbox, text},
//! options?, context?}`, with `options` required for `radio`/`checkbox`.
//! One malformed entry fails the whole call — the tool never half
//! suspends on a partially-valid batch.

use pf_domain::tool::ToolResult;
use serde_json::Value;

use crate::context::ToolContext;
use crate::registry::Tool;

pub struct AskUser;

const QUESTION_TYPES: [&str; 3] = ["radio", "checkbox", "text"];

#[async_trait::async_trait]
impl Tool for AskUser {
    fn name(&self) -> &str {
        "ask_user"
    }

    fn description(&self) -> &str {
        "Pause the run and ask the user one or more clarifying questions before continuing."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "questions": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "question": {"type": "string"},
                            "type": {"type": "string", "enum": QUESTION_TYPES},
                            "options": {"type": "array", "items": {"type": "string"}},
                            "context": {"type": "string"}
                        },
                        "required": ["question", "type"]
                    }
                }
            },
            "required": ["questions"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> ToolResult {
        let questions = match params.get("questions").and_then(|v| v.as_array()) {
            Some(qs) if !qs.is_empty() => qs,
            Some(_) => return ToolResult::err("questions must not be empty"),
            None => return ToolResult::err("questions must be a non-empty array"),
        };

        for (i, q) in questions.iter().enumerate() {
            let question = match q.get("question").and_then(|v| v.as_str()) {
                Some(s) if !s.trim().is_empty() => s,
                _ => return ToolResult::err(format!("questions[{i}].question must be a non-empty string")),
            };
            let kind = match q.get("type").and_then(|v| v.as_str()) {
                Some(t) if QUESTION_TYPES.contains(&t) => t,
                Some(t) => return ToolResult::err(format!("questions[{i}].type {t:?} must be one of {QUESTION_TYPES:?}")),
                None => return ToolResult::err(format!("questions[{i}].type is required")),
            };
            if matches!(kind, "radio" | "checkbox") {
                let has_options = q
                    .get("options")
                    .and_then(|v| v.as_array())
                    .map(|opts| !opts.is_empty())
                    .unwrap_or(false);
                if !has_options {
                    return ToolResult::err(format!("questions[{i}] ({question:?}) is {kind} and requires non-empty options"));
                }
            }
        }

        let summary = questions
            .iter()
            .filter_map(|q| q.get("question").and_then(|v| v.as_str()))
            .collect::<Vec<_>>()
            .join(" / ");
        ToolResult::ok(summary)
            .with_artifact("blocking", serde_json::json!(true))
            .with_artifact("questions", Value::Array(questions.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn dummy_ctx() -> (tempfile::TempDir, ToolContext) {
        let dir = tempfile::tempdir().unwrap();
        let providers = Arc::new(pf_providers::ProviderRegistry::from_config(&pf_domain::config::LlmConfig::default()).unwrap());
        let events = Arc::new(pf_store::JsonlEventStore::new(dir.path()).unwrap());
        let pages = Arc::new(pf_store::JsonPageStore::new(dir.path()).unwrap());
        let docs = Arc::new(pf_store::JsonProductDocStore::new(dir.path()).unwrap());
        let ctx = ToolContext::new("s1", uuid::Uuid::new_v4(), dir.path(), providers, events, pages, docs);
        (dir, ctx)
    }

    #[tokio::test]
    async fn sets_blocking_artifact_for_a_text_question() {
        let (_dir, ctx) = dummy_ctx();
        let result = AskUser
            .execute(serde_json::json!({"questions": [{"question": "What colors do you want?", "type": "text"}]}), &ctx)
            .await;
        assert!(result.success);
        assert!(result.is_blocking());
    }

    #[tokio::test]
    async fn missing_questions_is_rejected() {
        let (_dir, ctx) = dummy_ctx();
        let result = AskUser.execute(serde_json::json!({}), &ctx).await;
        assert!(!result.success);
        assert!(!result.is_blocking());
    }

    #[tokio::test]
    async fn empty_questions_array_is_rejected() {
        let (_dir, ctx) = dummy_ctx();
        let result = AskUser.execute(serde_json::json!({"questions": []}), &ctx).await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn radio_without_options_is_rejected() {
        let (_dir, ctx) = dummy_ctx();
        let result = AskUser
            .execute(serde_json::json!({"questions": [{"question": "Light or dark theme?", "type": "radio"}]}), &ctx)
            .await;
        assert!(!result.success);
        assert!(!result.is_blocking());
    }

    #[tokio::test]
    async fn checkbox_with_empty_options_is_rejected() {
        let (_dir, ctx) = dummy_ctx();
        let result = AskUser
            .execute(
                serde_json::json!({"questions": [{"question": "Which pages?", "type": "checkbox", "options": []}]}),
                &ctx,
            )
            .await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn radio_with_options_carries_them_through() {
        let (_dir, ctx) = dummy_ctx();
        let result = AskUser
            .execute(
                serde_json::json!({"questions": [{"question": "Light or dark theme?", "type": "radio", "options": ["light", "dark"]}]}),
                &ctx,
            )
            .await;
        assert!(result.success);
        assert!(result.is_blocking());
        assert_eq!(result.artifacts["questions"][0]["options"], serde_json::json!(["light", "dark"]));
    }

    #[tokio::test]
    async fn multiple_questions_all_carried_through_in_one_batch() {
        let (_dir, ctx) = dummy_ctx();
        let result = AskUser
            .execute(
                serde_json::json!({"questions": [
                    {"question": "What kind of site?", "type": "text"},
                    {"question": "Which pages?", "type": "checkbox", "options": ["menu", "about"]}
                ]}),
                &ctx,
            )
            .await;
        assert!(result.success);
        let questions = result.artifacts["questions"].as_array().unwrap();
        assert_eq!(questions.len(), 2);
    }

    #[tokio::test]
    async fn one_malformed_entry_fails_the_whole_batch() {
        let (_dir, ctx) = dummy_ctx();
        let result = AskUser
            .execute(
                serde_json::json!({"questions": [
                    {"question": "What kind of site?", "type": "text"},
                    {"question": "Which pages?", "type": "checkbox"}
                ]}),
                &ctx,
            )
            .await;
        assert!(!result.success);
        assert!(!result.is_blocking());
    }
}
