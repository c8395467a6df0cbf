//! Tool Policy Hooks  — pre/post interception of every tool
//! call: command whitelist, path boundary, secret scan, large-output
//! truncation.
//!
//! Grounded on `sa_domain::config::ToolPolicy` (teacher, allow/deny-list
//! shape) for the policy-as-config-data pattern, and on
//! `file_ops.rs::validate_path` (teacher) for the path-boundary check,
//! reused here via [`crate::path_guard::resolve_within`].

use std::path::Path;

use pf_domain::entities::EventType;
use pf_domain::trace::TraceEvent;
use pf_domain::util::truncate_str;
use regex::Regex;
use serde_json::Value;
use uuid::Uuid;

pub use pf_domain::config::PolicyMode;
use pf_domain::config::PolicyConfig;

use crate::context::ToolContext;
use crate::path_guard;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyAction {
    Allow,
    Warn,
    Block,
}

#[derive(Debug, Clone)]
pub struct PolicyDecision {
    pub action: PolicyAction,
    pub reason: String,
    pub details: Value,
}

impl PolicyDecision {
    fn allow() -> Self {
        Self { action: PolicyAction::Allow, reason: String::new(), details: Value::Null }
    }
    fn warn(reason: impl Into<String>, details: Value) -> Self {
        Self { action: PolicyAction::Warn, reason: reason.into(), details }
    }
    fn block(reason: impl Into<String>, details: Value) -> Self {
        Self { action: PolicyAction::Block, reason: reason.into(), details }
    }
}

/// Regexes for the sensitive-content scan (policy #3). Deliberately
/// narrow — high-confidence token shapes only, to keep the `log_only`
/// default from drowning in false positives.
fn secret_patterns() -> &'static [(&'static str, &'static str)] {
    &[
        ("aws_access_key", r"AKIA[0-9A-Z]{16}"),
        ("openai_key", r"sk-[A-Za-z0-9]{20,}"),
        ("generic_bearer", r"(?i)bearer\s+[A-Za-z0-9\-_.=]{20,}"),
        ("private_key_block", r"-----BEGIN [A-Z ]*PRIVATE KEY-----"),
    ]
}

/// Evaluates the built-in policy set against a single tool invocation.
/// Stateless aside from its `Config` snapshot — safe to share across
/// concurrent Runs via `Arc`.
pub struct PolicyEngine {
    config: PolicyConfig,
    secret_regexes: Vec<(&'static str, Regex)>,
}

impl PolicyEngine {
    pub fn new(config: PolicyConfig) -> Self {
        let secret_regexes = secret_patterns()
            .iter()
            .map(|(name, pattern)| (*name, Regex::new(pattern).expect("static secret pattern compiles")))
            .collect();
        Self { config, secret_regexes }
    }

    fn effective_mode(&self) -> PolicyMode {
        if !self.config.enabled {
            PolicyMode::Off
        } else {
            self.config.mode
        }
    }

    /// Pre-hook: command whitelist (shell-like tools) + path boundary
    /// (file-system tools). Run before the tool body executes.
    pub fn pre_check(&self, tool_name: &str, arguments: &Value, session_root: &Path) -> PolicyDecision {
        if self.effective_mode() == PolicyMode::Off {
            return PolicyDecision::allow();
        }

        if let Some(command) = arguments.get("command").and_then(|v| v.as_str()) {
            if let Some(decision) = self.check_command_whitelist(command) {
                return self.degrade_if_log_only(decision);
            }
        }

        for key in ["path", "slug"] {
            if let Some(raw) = arguments.get(key).and_then(|v| v.as_str()) {
                if let Some(decision) = self.check_path_boundary(session_root, raw) {
                    return self.degrade_if_log_only(decision);
                }
            }
        }
        if tool_name == "batch_file_write" {
            if let Some(ops) = arguments.get("operations").and_then(|v| v.as_array()) {
                for op in ops {
                    if let Some(raw) = op.get("path").and_then(|v| v.as_str()) {
                        if let Some(decision) = self.check_path_boundary(session_root, raw) {
                            return self.degrade_if_log_only(decision);
                        }
                    }
                }
            }
        }

        PolicyDecision::allow()
    }

    /// `log_only` evaluates every policy the same as `enforce` but never
    /// actually blocks a tool call — a `Block` decision degrades to `Warn`.
    fn degrade_if_log_only(&self, decision: PolicyDecision) -> PolicyDecision {
        if decision.action == PolicyAction::Block && self.effective_mode() == PolicyMode::LogOnly {
            return PolicyDecision::warn(decision.reason, decision.details);
        }
        decision
    }

    fn check_command_whitelist(&self, command: &str) -> Option<PolicyDecision> {
        let first_token = command.split_whitespace().next().unwrap_or("");
        let allowed = self.config.allowed_cmd_prefixes.iter().any(|p| p == first_token);
        if allowed {
            None
        } else {
            Some(PolicyDecision::block(
                format!("command prefix {first_token:?} is not in the allowed list"),
                serde_json::json!({"command": command}),
            ))
        }
    }

    fn check_path_boundary(&self, session_root: &Path, raw_path: &str) -> Option<PolicyDecision> {
        match path_guard::resolve_within(session_root, raw_path) {
            Ok(_) => None,
            Err(e) => Some(PolicyDecision::block(
                format!("path boundary: {e}"),
                serde_json::json!({"path": raw_path}),
            )),
        }
    }

    /// Post-hook: sensitive-content scan + large-output truncation. Run
    /// after the tool body produces a `ToolResult`; may rewrite `output`
    /// in place (truncation) and always returns the governing decision.
    pub fn post_check(&self, arguments: &Value, output: &mut String) -> PolicyDecision {
        if self.effective_mode() == PolicyMode::Off {
            return PolicyDecision::allow();
        }

        let haystack = format!("{}\n{output}", arguments);
        if let Some(decision) = self.scan_for_secrets(&haystack) {
            return self.degrade_if_log_only(decision);
        }

        if output.len() > self.config.max_output_bytes {
            let truncated = truncate_str(output, self.config.max_output_bytes);
            let original_len = output.len();
            *output = format!("{truncated}\n[truncated: {original_len} bytes -> {} bytes]", truncated.len());
            return PolicyDecision::warn(
                "output exceeded the truncation threshold",
                serde_json::json!({"original_bytes": original_len, "threshold": self.config.max_output_bytes}),
            );
        }

        PolicyDecision::allow()
    }

    fn scan_for_secrets(&self, text: &str) -> Option<PolicyDecision> {
        for (name, re) in &self.secret_regexes {
            if re.is_match(text) {
                return Some(PolicyDecision::block(
                    format!("possible {name} detected in tool arguments or output"),
                    serde_json::json!({"pattern": name}),
                ));
            }
        }
        None
    }

    /// Emit the governing Event + TraceEvent for a policy decision:
    /// `block` -> `tool_policy_blocked`, `warn` -> `tool_policy_warn`.
    pub fn emit(&self, events: &dyn pf_store::EventStore, ctx: &ToolContext, tool_name: &str, run_id: Uuid, decision: &PolicyDecision) {
        let event_type = match decision.action {
            PolicyAction::Block => EventType::ToolPolicyBlocked,
            PolicyAction::Warn => EventType::ToolPolicyWarn,
            PolicyAction::Allow => return,
        };
        let action_str = match decision.action {
            PolicyAction::Allow => "allow",
            PolicyAction::Warn => "warn",
            PolicyAction::Block => "block",
        };
        let _ = events.append(
            &ctx.session_id,
            event_type,
            Some(run_id),
            "policy",
            serde_json::json!({
                "tool_name": tool_name,
                "reason": decision.reason,
                "details": decision.details,
            }),
        );
        TraceEvent::ToolPolicyDecision {
            run_id: run_id.to_string(),
            tool_name: tool_name.to_string(),
            action: action_str.to_string(),
            reason: decision.reason.clone(),
        }
        .emit();
    }
}
