//! The Agentic Generation Core  — session/run lifecycle, conversation
//! context assembly, the agentic tool-calling loop, the verify gate, and
//! token quota enforcement. Everything here is library code: the HTTP/CLI
//! surface that would call it is out of scope (Non-goals).

pub mod cancel;
pub mod context;
pub mod quota;
pub mod run_service;
pub mod state;
pub mod turn;
pub mod verify;

pub use cancel::{CancelMap, CancelToken};
pub use quota::{QuotaExceeded, QuotaTracker};
pub use run_service::RunService;
pub use state::AppState;
pub use turn::{run_step, RunOutcome};
pub use verify::{run_checks, CheckOutcome, VerifyReport};
