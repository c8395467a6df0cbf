//! Shared service handles (Configuration, Run Service). One struct
//! bundling every store, the provider registry, and the tool registry
//! behind cheap `Arc` clones, built once and threaded through every Run.
//! No auth/session-lock/scheduler/MCP/cache fields — there's no HTTP
//! surface or multi-agent scheduling here for any of those to back.

use std::path::PathBuf;
use std::sync::Arc;

use pf_domain::config::Config;
use pf_providers::ProviderRegistry;
use pf_store::{
    ContextStore, EventStore, IdempotencyStore, JsonContextStore, JsonPageStore,
    JsonProductDocStore, JsonRunStore, JsonSessionStore, JsonlEventStore, PageStore,
    ProductDocStore, RunStore, SessionStore,
};
use pf_tools::{PolicyEngine, ToolRegistry};

use crate::cancel::CancelMap;
use crate::quota::QuotaTracker;

/// Shared handles passed to the Run Service and, via [`pf_tools::ToolContext`],
/// to every tool invocation.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub providers: Arc<ProviderRegistry>,
    pub sessions: Arc<dyn SessionStore>,
    pub runs: Arc<dyn RunStore>,
    pub events: Arc<dyn EventStore>,
    pub pages: Arc<dyn PageStore>,
    pub product_docs: Arc<dyn ProductDocStore>,
    pub contexts: Arc<dyn ContextStore>,
    pub idempotency: Arc<IdempotencyStore>,
    pub tools: Arc<ToolRegistry>,
    pub policy: Arc<PolicyEngine>,
    pub cancel: Arc<CancelMap>,
    pub quota: Arc<QuotaTracker>,
    pub output_dir: PathBuf,
}

impl AppState {
    /// Wire up every store under `config.store.state_path` / `output_path`
    /// and the provider registry from `config.llm`. One fallible
    /// constructor, no partial states.
    pub fn new(config: Config) -> pf_domain::error::Result<Self> {
        let state_path = PathBuf::from(&config.store.state_path);
        let output_dir = PathBuf::from(&config.store.output_path);

        let providers = Arc::new(ProviderRegistry::from_config(&config.llm)?);
        let sessions = Arc::new(JsonSessionStore::new(&state_path)?);
        let runs = Arc::new(JsonRunStore::new(&state_path)?);
        let events = Arc::new(JsonlEventStore::new(&state_path)?);
        let pages = Arc::new(JsonPageStore::new(&state_path)?);
        let product_docs = Arc::new(JsonProductDocStore::new(&state_path)?);
        let contexts = Arc::new(JsonContextStore::new(&state_path)?);
        let idempotency = Arc::new(IdempotencyStore::new(config.idempotency.ttl_hours));
        let tools = Arc::new(pf_tools::core::build_registry());
        let policy = Arc::new(PolicyEngine::new(config.policy.clone()));
        let cancel = Arc::new(CancelMap::new());
        let quota = Arc::new(QuotaTracker::new(config.quota.clone()));

        Ok(Self {
            config: Arc::new(config),
            providers,
            sessions,
            runs,
            events,
            pages,
            product_docs,
            contexts,
            idempotency,
            tools,
            policy,
            cancel,
            quota,
            output_dir,
        })
    }
}
