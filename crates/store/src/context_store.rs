//! `ConversationContext` persistence  — a JSON snapshot keyed by
//! `checkpoint_thread` so a `resume_run` after `waiting_input` rebuilds the
//! exact short-term/AU2 state the loop suspended with.
//!
//! Grounded on `session_store.rs`'s single-file-per-store-instance shape:
//! same small, mutable, read-heavy aggregate pattern, keyed by thread
//! instead of session.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use pf_domain::entities::ConversationContext;
use pf_domain::error::{Error, Result};

pub trait ContextStore: Send + Sync {
    fn get(&self, checkpoint_thread: &str) -> Result<Option<ConversationContext>>;
    fn save(&self, ctx: &ConversationContext) -> Result<()>;
}

pub struct JsonContextStore {
    path: PathBuf,
    contexts: RwLock<HashMap<String, ConversationContext>>,
}

impl JsonContextStore {
    pub fn new(state_path: &Path) -> Result<Self> {
        let dir = state_path.join("contexts");
        std::fs::create_dir_all(&dir).map_err(Error::Io)?;
        let path = dir.join("contexts.json");
        let contexts = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };
        Ok(Self { path, contexts: RwLock::new(contexts) })
    }

    fn flush(&self, contexts: &HashMap<String, ConversationContext>) -> Result<()> {
        let raw = serde_json::to_string_pretty(contexts).map_err(Error::Json)?;
        std::fs::write(&self.path, raw).map_err(Error::Io)
    }
}

impl ContextStore for JsonContextStore {
    fn get(&self, checkpoint_thread: &str) -> Result<Option<ConversationContext>> {
        Ok(self.contexts.read().get(checkpoint_thread).cloned())
    }

    fn save(&self, ctx: &ConversationContext) -> Result<()> {
        let mut contexts = self.contexts.write();
        contexts.insert(ctx.checkpoint_thread.clone(), ctx.clone());
        self.flush(&contexts)
    }
}
