use serde::Serialize;

/// Structured trace events emitted across every PageForge crate.
///
/// Operator-facing telemetry, distinct from the session [`Event`] log
/// (`crate::entities::Event`): this is what shows up in `tracing` output,
/// not what's replayed to a client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    ContextBuilt {
        session_id: String,
        total_injected_chars: usize,
        sections_included: usize,
        short_term_messages: usize,
        au2_present: bool,
    },
    CompactionRan {
        session_id: String,
        messages_compacted: usize,
        summary_chars: usize,
    },
    LlmRequest {
        run_id: String,
        model: String,
        role: String,
        duration_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
        attempt: u32,
    },
    LlmRetrying {
        run_id: String,
        attempt: u32,
        delay_ms: u64,
        reason: String,
    },
    ToolDispatched {
        run_id: String,
        tool_name: String,
        duration_ms: u64,
        success: bool,
    },
    ToolPolicyDecision {
        run_id: String,
        tool_name: String,
        action: String,
        reason: String,
    },
    VerifyCheckRan {
        run_id: String,
        check: String,
        passed: bool,
        attempt: u32,
    },
    RunStatusChanged {
        run_id: String,
        from: String,
        to: String,
    },
    EventAppended {
        session_id: String,
        run_id: Option<String>,
        seq: u64,
        event_type: String,
    },
    PageVersionCreated {
        session_id: String,
        slug: String,
        version: u32,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "pf_event");
    }
}
