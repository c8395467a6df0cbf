//! Core data model : Session, Run, Event, ConversationContext,
//! ProductDoc, Page, PageVersion.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Long-lived conversation scope. Owns Runs, Pages, a ProductDoc, Events.
/// Created on first request; never destroyed by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub next_event_seq: u64,
    #[serde(default)]
    pub next_page_order: u32,
}

impl Session {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            created_at: now,
            updated_at: now,
            next_event_seq: 1,
            next_page_order: 0,
        }
    }

    /// Allocate the next gap-free session-scoped event `seq`.
    pub fn allocate_seq(&mut self) -> u64 {
        let seq = self.next_event_seq;
        self.next_event_seq += 1;
        self.updated_at = Utc::now();
        seq
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Run & state machine 
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    WaitingInput,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether `self -> next` is a legal state-machine transition.
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        use RunStatus::*;
        matches!(
            (self, next),
            (Queued, Running)
                | (Queued, Cancelled)
                | (Running, WaitingInput)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
                | (WaitingInput, Running)
                | (WaitingInput, Cancelled)
        )
    }
}

/// A timed node (LLM call or tool call) within a Run's execution, kept as
/// a denormalized read-model for a single Run's detail view — independent
/// of the Event Store, which remains the canonical ordered history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    LlmRequest,
    ToolCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunNode {
    pub node_id: u32,
    pub kind: NodeKind,
    pub name: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_preview: Option<String>,
    #[serde(default)]
    pub is_error: bool,
}

impl RunNode {
    pub fn start(node_id: u32, kind: NodeKind, name: impl Into<String>, input_preview: Option<String>) -> Self {
        Self {
            node_id,
            kind,
            name: name.into(),
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: None,
            input_preview,
            output_preview: None,
            is_error: false,
        }
    }

    pub fn finish(&mut self, output_preview: Option<String>, is_error: bool) {
        let end = Utc::now();
        self.ended_at = Some(end);
        self.duration_ms = Some((end - self.started_at).num_milliseconds().max(0) as u64);
        self.output_preview = output_preview;
        self.is_error = is_error;
    }
}

/// One generation attempt (Run).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub run_id: Uuid,
    pub session_id: String,
    pub input_message: String,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_report: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_payload: Option<serde_json::Value>,
    /// `"{session_id}:{run_id}"` — scopes conversation state so concurrent
    /// runs in the same Session cannot collide.
    pub checkpoint_thread: String,
    #[serde(default)]
    pub nodes: Vec<RunNode>,
    #[serde(default)]
    pub step_count: u32,
}

impl Run {
    pub fn new(session_id: impl Into<String>, input_message: impl Into<String>) -> Self {
        let run_id = Uuid::new_v4();
        let session_id = session_id.into();
        let checkpoint_thread = format!("{session_id}:{run_id}");
        Self {
            run_id,
            session_id,
            input_message: input_message.into(),
            status: RunStatus::Queued,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            verify_report: None,
            error: None,
            resume_payload: None,
            checkpoint_thread,
            nodes: Vec::new(),
            step_count: 0,
        }
    }

    /// Apply a status transition, enforcing the Run state machine and its
    /// `started_at`/`ended_at` invariants.
    pub fn transition(&mut self, next: RunStatus) -> crate::error::Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(crate::error::Error::StateConflict(format!(
                "illegal run transition {:?} -> {:?}",
                self.status, next
            )));
        }
        if self.started_at.is_none() && !matches!(next, RunStatus::Queued) {
            self.started_at = Some(Utc::now());
        }
        if next.is_terminal() {
            self.ended_at = Some(Utc::now());
        }
        self.status = next;
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event Store 
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Closed event-type taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RunCreated,
    RunStarted,
    RunWaitingInput,
    RunResumed,
    RunCompleted,
    RunFailed,
    RunCancelled,
    StepStart,
    StepEnd,
    ToolCall,
    ToolResult,
    Text,
    Error,
    VerifyStart,
    VerifyPass,
    VerifyFail,
    ToolPolicyBlocked,
    ToolPolicyWarn,
    ProductDocGenerated,
    ProductDocUpdated,
    PageCreated,
    PageVersionCreated,
    PagePreviewReady,
}

impl EventType {
    /// Run-scoped events must carry a `run_id` at emission.
    pub fn requires_run_id(self) -> bool {
        !matches!(
            self,
            EventType::ProductDocGenerated
                | EventType::ProductDocUpdated
                | EventType::PageCreated
                | EventType::PageVersionCreated
                | EventType::PagePreviewReady
        )
    }
}

/// An immutable append-only log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    pub seq: u64,
    pub source: String,
    pub payload: serde_json::Value,
}

impl Event {
    /// Construct a new event. `seq` must have been allocated atomically by
    /// the owning Session beforehand (see [`Session::allocate_seq`]).
    pub fn new(
        seq: u64,
        event_type: EventType,
        session_id: impl Into<String>,
        run_id: Option<Uuid>,
        source: impl Into<String>,
        payload: serde_json::Value,
    ) -> crate::error::Result<Self> {
        if event_type.requires_run_id() && run_id.is_none() {
            return Err(crate::error::Error::Validation(format!(
                "{event_type:?} is run-scoped and requires a run_id"
            )));
        }
        Ok(Self {
            event_id: Uuid::new_v4(),
            event_type,
            timestamp: Utc::now(),
            session_id: session_id.into(),
            run_id,
            seq,
            source: source.into(),
            payload,
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ProductDoc 
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductDocSection {
    pub title: String,
    pub content: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

/// One per Session. Sections are LLM-decided, not a fixed schema.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProductDoc {
    pub sections: HashMap<String, ProductDocSection>,
    /// Compressed summary, kept ≤ 500 tokens by the writer.
    #[serde(default)]
    pub project_card: String,
}

impl ProductDoc {
    pub fn upsert_section(&mut self, name: impl Into<String>, title: impl Into<String>, content: impl Into<String>, updated_by: impl Into<String>) {
        self.sections.insert(
            name.into(),
            ProductDocSection {
                title: title.into(),
                content: content.into(),
                updated_at: Utc::now(),
                updated_by: updated_by.into(),
            },
        );
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Page & PageVersion 
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub page_id: Uuid,
    pub session_id: String,
    pub slug: String,
    pub title: String,
    pub order_index: u32,
    pub current_version_id: Uuid,
}

impl Page {
    /// Validate the slug shape: lowercase, hyphenated, ≤ 40 chars.
    pub fn validate_slug(slug: &str) -> crate::error::Result<()> {
        if slug.is_empty() || slug.len() > 40 {
            return Err(crate::error::Error::Validation(format!(
                "slug must be 1-40 chars, got {}",
                slug.len()
            )));
        }
        if !slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
            return Err(crate::error::Error::Validation(
                "slug must be lowercase, digits, and hyphens only".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageVersion {
    pub version_id: Uuid,
    pub page_id: Uuid,
    /// Auto-increment within the page, starting at 1.
    pub version: u32,
    pub html: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl PageVersion {
    pub fn first(page_id: Uuid, html: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            version_id: Uuid::new_v4(),
            page_id,
            version: 1,
            html: html.into(),
            description: description.into(),
            created_at: Utc::now(),
        }
    }

    pub fn next(&self, html: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            version_id: Uuid::new_v4(),
            page_id: self.page_id,
            version: self.version + 1,
            html: html.into(),
            description: description.into(),
            created_at: Utc::now(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ConversationContext 
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The medium-term AU2 summary: eight fixed dimensions, merged
/// "new supersedes old unless new is empty" on every compaction.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Au2Summary {
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub progress: String,
    #[serde(default)]
    pub decisions: String,
    #[serde(default)]
    pub constraints: String,
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub pages: String,
    #[serde(default)]
    pub issues: String,
    #[serde(default)]
    pub next_steps: String,
}

impl Au2Summary {
    pub fn is_empty(&self) -> bool {
        self.goal.is_empty()
            && self.progress.is_empty()
            && self.decisions.is_empty()
            && self.constraints.is_empty()
            && self.style.is_empty()
            && self.pages.is_empty()
            && self.issues.is_empty()
            && self.next_steps.is_empty()
    }

    /// Merge `new` into `self`: per-key, new supersedes old unless empty.
    pub fn merge(&mut self, new: Au2Summary) {
        macro_rules! merge_field {
            ($field:ident) => {
                if !new.$field.is_empty() {
                    self.$field = new.$field;
                }
            };
        }
        merge_field!(goal);
        merge_field!(progress);
        merge_field!(decisions);
        merge_field!(constraints);
        merge_field!(style);
        merge_field!(pages);
        merge_field!(issues);
        merge_field!(next_steps);
    }

    /// Render the eight dimensions into the synthetic assistant message
    /// that replaces the compacted middle slice (step 4).
    pub fn render(&self) -> String {
        format!(
            "[conversation summary]\ngoal: {}\nprogress: {}\ndecisions: {}\nconstraints: {}\nstyle: {}\npages: {}\nissues: {}\nnext_steps: {}",
            self.goal, self.progress, self.decisions, self.constraints, self.style, self.pages, self.issues, self.next_steps
        )
    }
}

/// In-memory working set for one Run . Exists only while the Run
/// is running; rebuilt from persistent state on resume.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConversationContext {
    pub checkpoint_thread: String,
    pub au2: Au2Summary,
    pub short_term: Vec<crate::tool::Message>,
}

impl ConversationContext {
    pub fn new(checkpoint_thread: impl Into<String>) -> Self {
        Self {
            checkpoint_thread: checkpoint_thread.into(),
            au2: Au2Summary::default(),
            short_term: Vec::new(),
        }
    }
}
