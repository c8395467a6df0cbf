//! Provider registry: constructs configured LLM providers and resolves
//! `ModelRole` ("Model tiers") to a concrete provider + model pair.

use crate::openai_compat::OpenAiCompatProvider;
use crate::traits::LlmProvider;
use pf_domain::capability::ModelRole;
use pf_domain::config::LlmConfig;
use pf_domain::error::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// A resolved provider + the model string to send on that provider.
pub struct Resolved {
    pub provider: Arc<dyn LlmProvider>,
    pub model: Option<String>,
}

pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    /// `ModelRole` -> `"provider_id"` or `"provider_id/model"`.
    roles: HashMap<ModelRole, String>,
}

impl ProviderRegistry {
    /// Instantiate every configured provider. A provider id collision is a
    /// configuration error, not a silent overwrite.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();
        for pc in &config.providers {
            if providers.contains_key(&pc.id) {
                return Err(Error::Config(format!("duplicate provider id {:?}", pc.id)));
            }
            let provider = OpenAiCompatProvider::from_config(pc)?;
            providers.insert(pc.id.clone(), Arc::new(provider));
        }
        Ok(Self { providers, roles: config.roles.clone() })
    }

    pub fn register(&mut self, id: impl Into<String>, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(id.into(), provider);
    }

    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers.get(provider_id).cloned()
    }

    /// Resolve a [`ModelRole`] to the provider/model pair configured for it
    /// (: `model_fast`, `model_standard`, `model_powerful`).
    pub fn resolve(&self, role: ModelRole) -> Result<Resolved> {
        let spec = self.roles.get(&role).ok_or_else(|| {
            Error::Config(format!("no provider configured for role {role:?}"))
        })?;
        let (provider_id, model) = match spec.split_once('/') {
            Some((p, m)) => (p, Some(m.to_string())),
            None => (spec.as_str(), None),
        };
        let provider = self.get(provider_id).ok_or_else(|| {
            Error::Config(format!("role {role:?} references unknown provider {provider_id:?}"))
        })?;
        if !provider.capabilities().supports_role(role) {
            return Err(Error::Config(format!(
                "provider {provider_id:?} cannot serve role {role:?} (missing tool support)"
            )));
        }
        Ok(Resolved { provider, model })
    }
}
