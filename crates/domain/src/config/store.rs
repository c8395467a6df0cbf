use serde::{Deserialize, Serialize};

/// Persistence settings (§[FULL] Ambient stack — JSONL/JSON-snapshot split).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory for per-session JSONL/JSON state.
    #[serde(default = "d_state_path")]
    pub state_path: String,
    /// Root directory for generated page output (`{output_dir}/{session_id}/...`).
    #[serde(default = "d_output_path")]
    pub output_path: String,
    /// Hard max for `limit` on event queries.
    #[serde(default = "d_event_limit_max")]
    pub event_limit_max: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            state_path: d_state_path(),
            output_path: d_output_path(),
            event_limit_max: d_event_limit_max(),
        }
    }
}

fn d_state_path() -> String {
    "./state".into()
}
fn d_output_path() -> String {
    "./output".into()
}
fn d_event_limit_max() -> usize {
    1000
}

/// Idempotency-key TTL for `create_run`/`resume_run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    #[serde(default = "d_ttl_hours")]
    pub ttl_hours: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_hours: d_ttl_hours(),
        }
    }
}

fn d_true() -> bool {
    true
}
fn d_ttl_hours() -> u64 {
    24
}

/// Optional per-session/per-day token/cost ceiling, off by default.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QuotaConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub max_tokens_per_day: Option<u64>,
    #[serde(default)]
    pub max_tokens_per_session: Option<u64>,
}
