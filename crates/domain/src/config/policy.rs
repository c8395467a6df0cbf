use serde::{Deserialize, Serialize};

/// Enforcement mode for the Tool Policy Hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PolicyMode {
    /// Skip policy evaluation entirely.
    Off,
    /// Evaluate and emit events, never block.
    #[default]
    LogOnly,
    /// Block on `block` decisions.
    Enforce,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    #[serde(default)]
    pub mode: PolicyMode,
    /// Allowed first-token prefixes for shell-like tools.
    #[serde(default = "d_allowed_cmd_prefixes")]
    pub allowed_cmd_prefixes: Vec<String>,
    /// Byte threshold above which a tool result is truncated.
    #[serde(default = "d_max_output_bytes")]
    pub max_output_bytes: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: PolicyMode::LogOnly,
            allowed_cmd_prefixes: d_allowed_cmd_prefixes(),
            max_output_bytes: d_max_output_bytes(),
        }
    }
}

fn d_true() -> bool {
    true
}
fn d_allowed_cmd_prefixes() -> Vec<String> {
    ["npm", "npx", "node", "python", "pip", "git", "ls", "cat", "echo", "mkdir", "cp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn d_max_output_bytes() -> usize {
    100 * 1024
}
