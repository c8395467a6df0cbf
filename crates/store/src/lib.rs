//! Persistence for the Agentic Generation Core.
//!
//! JSONL append-only logs for anything that must never be mutated in
//! place (the Event Store, PageVersion history); a single JSON snapshot
//! file for mutable aggregates that are small and read far more than
//! written (Session index, Run index, Page index).

pub mod context_store;
pub mod event_store;
pub mod idempotency;
pub mod page_store;
pub mod product_doc_store;
pub mod run_store;
pub mod session_store;

pub use context_store::{ContextStore, JsonContextStore};
pub use event_store::{EventStore, JsonlEventStore};
pub use idempotency::IdempotencyStore;
pub use page_store::{JsonPageStore, PageStore};
pub use product_doc_store::{JsonProductDocStore, ProductDocStore};
pub use run_store::{JsonRunStore, RunStore};
pub use session_store::{JsonSessionStore, SessionStore};
