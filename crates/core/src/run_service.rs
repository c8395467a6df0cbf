//! Run Service & State Machine — Run lifecycle CRUD, the
//! cancellation/idempotency wiring the loop needs, and the `persist_run_state`
//! helper every status transition (including the loop's own, in `turn.rs`)
//! goes through.
//!
//! One service owns create/get/list/cancel, backed by a pluggable store,
//! narrowed onto the six-state Run state machine and its concurrency rule:
//! one active execution per Run, enforced here with an in-memory
//! active-run set rather than a session-lock file.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use pf_domain::entities::{ConversationContext, Event, EventType, Run, RunStatus};
use pf_domain::error::{Error, Result};
use pf_domain::tool::Message;
use pf_store::{ContextStore, EventStore, IdempotencyStore, RunStore, SessionStore};

use crate::cancel::CancelMap;
use crate::state::AppState;
use crate::turn::{self, RunOutcome};

/// Apply a status transition to `run`, persist it, and emit the matching
/// lifecycle event + `TraceEvent::RunStatusChanged`. Every caller that
/// moves a Run between states — `RunService` itself and the loop in
/// `turn.rs` — goes through this rather than mutating `run.status` and
/// the store independently, so the event log and the Run record can
/// never drift apart.
pub fn persist_run_state(
    runs: &dyn RunStore,
    events: &dyn EventStore,
    run: &mut Run,
    next: RunStatus,
    event_type: EventType,
    payload: Value,
) -> Result<Event> {
    let from = run.status;
    run.transition(next)?;
    runs.save(run)?;
    let event = events.append(&run.session_id, event_type, Some(run.run_id), "run_service", payload)?;
    pf_domain::trace::TraceEvent::RunStatusChanged {
        run_id: run.run_id.to_string(),
        from: format!("{from:?}"),
        to: format!("{next:?}"),
    }
    .emit();
    Ok(event)
}

/// The most recent `text` event's payload for a Run — used to reconstruct
/// a `RunOutcome::Completed`'s text on an idempotent resume replay, where
/// no live `ConversationContext` is at hand.
fn final_text_from_events(events: &dyn EventStore, session_id: &str, run_id: Uuid) -> String {
    events
        .get_by_run(session_id, run_id, None, usize::MAX)
        .unwrap_or_default()
        .into_iter()
        .filter(|e| e.event_type == EventType::Text)
        .next_back()
        .and_then(|e| e.payload.get("text").and_then(|v| v.as_str()).map(str::to_string))
        .unwrap_or_default()
}

/// The most recent `run_waiting_input` event's `questions` payload for a
/// Run — mirrors `final_text_from_events` but for the suspended-state
/// shape instead of the completed-state one.
fn pending_questions_from_events(events: &dyn EventStore, session_id: &str, run_id: Uuid) -> Value {
    events
        .get_by_run(session_id, run_id, None, usize::MAX)
        .unwrap_or_default()
        .into_iter()
        .filter(|e| e.event_type == EventType::RunWaitingInput)
        .next_back()
        .and_then(|e| e.payload.get("questions").cloned())
        .unwrap_or_else(|| Value::Array(Vec::new()))
}

/// Project a Run's current (terminal or waiting_input) status into the
/// same [`RunOutcome`] shape `turn::run_step` returns, for idempotent
/// replay of `resume_run`.
fn run_to_outcome(run: &Run, events: &dyn EventStore) -> RunOutcome {
    match run.status {
        RunStatus::Completed => RunOutcome::Completed { text: final_text_from_events(events, &run.session_id, run.run_id) },
        RunStatus::Failed => RunOutcome::Failed { error: run.error.clone().unwrap_or_default() },
        RunStatus::Cancelled => RunOutcome::Cancelled,
        RunStatus::WaitingInput => RunOutcome::WaitingInput { questions: pending_questions_from_events(events, &run.session_id, run.run_id) },
        RunStatus::Queued | RunStatus::Running => RunOutcome::WaitingInput { questions: Value::Array(Vec::new()) },
    }
}

/// Run lifecycle CRUD and the Run state machine's entry points. Doesn't
/// own the loop itself (`turn::run_step`) — `start_run`/`resume_run`
/// invoke it, threading through the full [`AppState`] the loop needs
/// (providers, tools, policy) that a pure Run-record service has no
/// business holding.
pub struct RunService {
    runs: Arc<dyn RunStore>,
    sessions: Arc<dyn SessionStore>,
    events: Arc<dyn EventStore>,
    contexts: Arc<dyn ContextStore>,
    cancel: Arc<CancelMap>,
    idempotency: Arc<IdempotencyStore>,
    /// Runs with an execution instance (loop or resume) currently in
    /// flight — enforces one active execution instance per Run.
    active: Mutex<HashSet<Uuid>>,
}

impl RunService {
    pub fn new(state: &AppState) -> Self {
        Self {
            runs: state.runs.clone(),
            sessions: state.sessions.clone(),
            events: state.events.clone(),
            contexts: state.contexts.clone(),
            cancel: state.cancel.clone(),
            idempotency: state.idempotency.clone(),
            active: Mutex::new(HashSet::new()),
        }
    }

    /// Create a queued Run. Idempotent under a repeated `idempotency_key`
    /// within the store's TTL.
    pub fn create_run(&self, session_id: &str, input_message: &str, idempotency_key: Option<&str>) -> Result<Run> {
        if let Some(key) = idempotency_key {
            if let Some(cached) = self.idempotency.get(key) {
                if let Ok(run) = serde_json::from_value::<Run>(cached) {
                    return Ok(run);
                }
            }
        }

        self.sessions.resolve_or_create(session_id)?;
        let run = Run::new(session_id, input_message);
        self.runs.create(run.clone())?;
        self.events.append(
            session_id,
            EventType::RunCreated,
            Some(run.run_id),
            "run_service",
            serde_json::json!({"input_message": input_message}),
        )?;

        if let Some(key) = idempotency_key {
            self.idempotency.put(key, serde_json::to_value(&run)?);
        }
        Ok(run)
    }

    pub fn get_run(&self, session_id: &str, run_id: Uuid) -> Result<Option<Run>> {
        self.runs.get(session_id, run_id)
    }

    pub fn list_runs(&self, session_id: &str) -> Result<Vec<Run>> {
        self.runs.list_by_session(session_id)
    }

    fn claim_active(&self, run_id: Uuid) -> Result<()> {
        let mut active = self.active.lock();
        if !active.insert(run_id) {
            return Err(Error::StateConflict(format!("run {run_id} already has an active execution")));
        }
        Ok(())
    }

    fn release_active(&self, run_id: Uuid) {
        self.active.lock().remove(&run_id);
    }

    /// Transition a queued Run to running and drive the agentic loop
    ///  to completion, suspension, or failure.
    pub async fn start_run(&self, state: &AppState, session_id: &str, run_id: Uuid) -> Result<RunOutcome> {
        self.claim_active(run_id)?;
        let outcome = self.start_run_inner(state, session_id, run_id).await;
        self.release_active(run_id);
        outcome
    }

    async fn start_run_inner(&self, state: &AppState, session_id: &str, run_id: Uuid) -> Result<RunOutcome> {
        let mut run = self.runs.get(session_id, run_id)?.ok_or_else(|| Error::NotFound(format!("run {run_id}")))?;
        if run.status != RunStatus::Queued {
            return Err(Error::StateConflict(format!("start_run requires queued, got {:?}", run.status)));
        }

        self.cancel.register(run_id);
        persist_run_state(&*self.runs, &*self.events, &mut run, RunStatus::Running, EventType::RunStarted, serde_json::json!({}))?;

        let mut ctx = self
            .contexts
            .get(&run.checkpoint_thread)?
            .unwrap_or_else(|| ConversationContext::new(&run.checkpoint_thread));
        ctx.short_term.push(Message::user(run.input_message.clone()));

        let outcome = turn::run_step(state, &mut run, &mut ctx).await?;
        self.contexts.save(&ctx)?;
        if run.status.is_terminal() {
            self.cancel.remove(run_id);
        }
        Ok(outcome)
    }

    /// Resume a Run suspended in `waiting_input` with the user's answers,
    /// synthesizing the pending `ask_user` call's tool-result message and
    /// re-entering the loop ("Resume semantics").
    pub async fn resume_run(
        &self,
        state: &AppState,
        session_id: &str,
        run_id: Uuid,
        answers: Value,
        idempotency_key: Option<&str>,
    ) -> Result<RunOutcome> {
        if let Some(key) = idempotency_key {
            if self.idempotency.get(key).is_some() {
                let run = self.runs.get(session_id, run_id)?.ok_or_else(|| Error::NotFound(format!("run {run_id}")))?;
                return Ok(run_to_outcome(&run, &*self.events));
            }
        }

        self.claim_active(run_id)?;
        let outcome = self.resume_run_inner(state, session_id, run_id, &answers).await;
        self.release_active(run_id);

        if outcome.is_ok() {
            if let Some(key) = idempotency_key {
                self.idempotency.put(key, serde_json::json!({"run_id": run_id}));
            }
        }
        outcome
    }

    async fn resume_run_inner(&self, state: &AppState, session_id: &str, run_id: Uuid, answers: &Value) -> Result<RunOutcome> {
        let mut run = self.runs.get(session_id, run_id)?.ok_or_else(|| Error::NotFound(format!("run {run_id}")))?;
        if run.status != RunStatus::WaitingInput {
            return Err(Error::StateConflict(format!("resume_run requires waiting_input, got {:?}", run.status)));
        }

        let mut ctx = self
            .contexts
            .get(&run.checkpoint_thread)?
            .ok_or_else(|| Error::NotFound(format!("no saved context for {}", run.checkpoint_thread)))?;
        let call_id = crate::context::pending_ask_user_call_id(&ctx)
            .ok_or_else(|| Error::StateConflict("no pending ask_user call to resume".into()))?;
        ctx.short_term.push(Message::tool_result(call_id, answers.to_string(), false));

        self.cancel.register(run_id);
        persist_run_state(
            &*self.runs,
            &*self.events,
            &mut run,
            RunStatus::Running,
            EventType::RunResumed,
            serde_json::json!({"answers": answers}),
        )?;

        let outcome = turn::run_step(state, &mut run, &mut ctx).await?;
        self.contexts.save(&ctx)?;
        if run.status.is_terminal() {
            self.cancel.remove(run_id);
        }
        Ok(outcome)
    }

    /// Idempotent (property 9): a terminal Run is returned
    /// unchanged. A queued or waiting-input Run has no active loop to
    /// observe a flag, so it's cancelled directly. A running Run only has
    /// its flag set — the loop itself transitions it between steps.
    pub fn cancel_run(&self, session_id: &str, run_id: Uuid) -> Result<Run> {
        let mut run = self.runs.get(session_id, run_id)?.ok_or_else(|| Error::NotFound(format!("run {run_id}")))?;
        if run.status.is_terminal() {
            return Ok(run);
        }

        match run.status {
            RunStatus::Queued | RunStatus::WaitingInput => {
                persist_run_state(&*self.runs, &*self.events, &mut run, RunStatus::Cancelled, EventType::RunCancelled, serde_json::json!({}))?;
                self.cancel.remove(run_id);
            }
            RunStatus::Running => {
                self.cancel.cancel(run_id);
            }
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled => unreachable!("handled by is_terminal above"),
        }
        Ok(run)
    }
}
