//! Cooperative cancellation ("Cancellation", `cancel_run`): an
//! `Arc<AtomicBool>` flag per Run, checked between steps, never
//! mid-LLM-call. No group-cascade (cancelling a parent cancels its
//! children) — a Run never spawns child Runs, so there's nothing to cascade.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

#[derive(Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One token per in-flight Run. Idempotent: cancelling an already-cancelled
/// or already-removed Run is not an error ("Idempotency").
#[derive(Default)]
pub struct CancelMap {
    tokens: Mutex<HashMap<Uuid, CancelToken>>,
}

impl CancelMap {
    pub fn new() -> Self {
        Self { tokens: Mutex::new(HashMap::new()) }
    }

    /// Register a fresh token for `run_id`, replacing any stale one left
    /// over from a prior attempt (e.g. a resumed Run).
    pub fn register(&self, run_id: Uuid) -> CancelToken {
        let token = CancelToken::new();
        self.tokens.lock().insert(run_id, token.clone());
        token
    }

    /// Flip the flag for `run_id` if it's currently registered. Returns
    /// `true` if a running token was found and cancelled, `false` if the
    /// Run wasn't registered (already terminal, or never started).
    pub fn cancel(&self, run_id: Uuid) -> bool {
        match self.tokens.lock().get(&run_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, run_id: Uuid) {
        self.tokens.lock().remove(&run_id);
    }

    pub fn is_running(&self, run_id: Uuid) -> bool {
        self.tokens.lock().contains_key(&run_id)
    }

    /// Whether `run_id`'s token is registered and flagged. `false` for an
    /// unregistered run — the loop's per-step check treats "never started"
    /// and "not cancelled" identically.
    pub fn is_cancelled(&self, run_id: Uuid) -> bool {
        match self.tokens.lock().get(&run_id) {
            Some(token) => token.is_cancelled(),
            None => false,
        }
    }
}
