use serde::{Deserialize, Serialize};

/// Safety limits for the agentic loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Max steps per loop invocation.
    #[serde(default = "d_max_steps")]
    pub max_steps: u32,
    /// Max consecutive tool-execution errors before the loop gives up.
    /// Non-error steps reset the counter.
    #[serde(default = "d_max_consecutive_errors")]
    pub max_consecutive_errors: u32,
    /// Per-LLM-call retry attempts on transient errors.
    #[serde(default = "d_llm_retry_max_attempts")]
    pub llm_retry_max_attempts: u32,
    /// Base delay (seconds) for the retry's exponential backoff.
    #[serde(default = "d_llm_retry_base_delay_seconds")]
    pub llm_retry_base_delay_seconds: f64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_steps: d_max_steps(),
            max_consecutive_errors: d_max_consecutive_errors(),
            llm_retry_max_attempts: d_llm_retry_max_attempts(),
            llm_retry_base_delay_seconds: d_llm_retry_base_delay_seconds(),
        }
    }
}

fn d_max_steps() -> u32 {
    30
}
fn d_max_consecutive_errors() -> u32 {
    3
}
fn d_llm_retry_max_attempts() -> u32 {
    3
}
fn d_llm_retry_base_delay_seconds() -> f64 {
    1.0
}
