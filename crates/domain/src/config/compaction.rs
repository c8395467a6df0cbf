use serde::{Deserialize, Serialize};

/// Compaction collapses old short-term messages into the AU2 summary so
/// the context window doesn't overflow after many turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// Enable automatic compaction once the short-term count exceeds `threshold`.
    #[serde(default = "d_true")]
    pub auto: bool,
    /// Short-term message count that triggers `maybe_compact`.
    #[serde(default = "d_threshold")]
    pub threshold: usize,
    /// Leading dialogue messages never compacted.
    #[serde(default = "d_keep_first")]
    pub keep_first: usize,
    /// Trailing dialogue messages never compacted.
    #[serde(default = "d_keep_last")]
    pub keep_last: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            auto: true,
            threshold: d_threshold(),
            keep_first: d_keep_first(),
            keep_last: d_keep_last(),
        }
    }
}

fn d_true() -> bool {
    true
}
fn d_threshold() -> usize {
    20
}
fn d_keep_first() -> usize {
    2
}
fn d_keep_last() -> usize {
    4
}
