//! `ToolContext`  — everything a tool's `execute` needs: session
//! id, run id, output directory, an LLM client handle, the event emitter,
//! and a data-access handle.
//!
//! Grounded on `crate::state::AppState` (teacher) for the "one struct
//! bundles every shared handle, cloned cheaply via `Arc`" shape; narrowed
//! to the stores and provider registry this spec's tools actually touch.

use std::path::PathBuf;
use std::sync::Arc;

use pf_providers::ProviderRegistry;
use pf_store::{EventStore, PageStore, ProductDocStore};
use uuid::Uuid;

/// Shared handles passed to every tool invocation.
#[derive(Clone)]
pub struct ToolContext {
    pub session_id: String,
    pub run_id: Uuid,
    /// `{output_dir}/{session_id}` — the session's output root (filesystem layout).
    pub session_output_dir: PathBuf,
    pub providers: Arc<ProviderRegistry>,
    pub events: Arc<dyn EventStore>,
    pub pages: Arc<dyn PageStore>,
    pub product_docs: Arc<dyn ProductDocStore>,
}

impl ToolContext {
    pub fn new(
        session_id: impl Into<String>,
        run_id: Uuid,
        output_root: &std::path::Path,
        providers: Arc<ProviderRegistry>,
        events: Arc<dyn EventStore>,
        pages: Arc<dyn PageStore>,
        product_docs: Arc<dyn ProductDocStore>,
    ) -> Self {
        let session_id = session_id.into();
        let session_output_dir = output_root.join(&session_id);
        Self {
            session_id,
            run_id,
            session_output_dir,
            providers,
            events,
            pages,
            product_docs,
        }
    }

    pub fn design_system_path(&self) -> PathBuf {
        self.session_output_dir.join("design-system.css")
    }

    pub fn pages_dir(&self) -> PathBuf {
        self.session_output_dir.join("pages")
    }

    pub fn page_path(&self, slug: &str) -> PathBuf {
        self.pages_dir().join(format!("{slug}.html"))
    }
}
