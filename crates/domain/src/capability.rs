use serde::{Deserialize, Serialize};

/// The three configured model tiers: `model_fast`, `model_standard`,
/// `model_powerful`. Each role resolves through a provider-agnostic
/// catalog (`pf-providers::registry`) rather than a hardcoded model string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelRole {
    /// Compaction summaries and lightweight classification (`analyze_brief`).
    Fast,
    /// Page generation, edits, the main agentic loop.
    Standard,
    /// Hard reasoning — complex product-doc synthesis, multi-page planning.
    Powerful,
}

/// What a given model can do, used by the registry to reject a role
/// assignment that the model can't actually serve (e.g. a model with no
/// tool-calling support can't back `Standard`, which drives the loop).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LlmCapabilities {
    pub supports_tools: bool,
    pub supports_json_mode: bool,
    pub supports_vision: bool,
    pub context_window_tokens: u32,
    pub max_output_tokens: u32,
}

impl LlmCapabilities {
    /// The minimum a model must offer to serve [`ModelRole::Standard`] —
    /// the agentic loop calls tools on every step.
    pub fn supports_role(&self, role: ModelRole) -> bool {
        match role {
            ModelRole::Fast => true,
            ModelRole::Standard => self.supports_tools,
            ModelRole::Powerful => self.supports_tools,
        }
    }
}
