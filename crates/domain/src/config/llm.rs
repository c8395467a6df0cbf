use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::capability::ModelRole;

/// LLM provider + model-tier configuration ("Model tiers").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "d_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Registered OpenAI-compatible providers (data-driven: adding a
    /// provider = adding config, no code change).
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    /// Model each role resolves to (`model_fast`, `model_standard`,
    /// `model_powerful` — key is the `ModelRole`, value is `"provider_id/model"`).
    #[serde(default)]
    pub roles: HashMap<ModelRole, String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: d_timeout_ms(),
            providers: Vec::new(),
            roles: HashMap::new(),
        }
    }
}

fn d_timeout_ms() -> u64 {
    20_000
}

/// One OpenAI-compatible chat/tool-calling endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub base_url: String,
    /// Environment variable holding the bearer token.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub default_model: Option<String>,
}
