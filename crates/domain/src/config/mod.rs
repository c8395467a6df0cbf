mod compaction;
mod llm;
mod loop_;
mod policy;
mod store;
mod verify;

pub use compaction::*;
pub use llm::*;
pub use loop_::*;
pub use policy::*;
pub use store::*;
pub use verify::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Every top-level configuration key, one field per submodule.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub loop_: LoopConfig,
    #[serde(default)]
    pub compaction: CompactionConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub verify: VerifyConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub idempotency: IdempotencyConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues. Empty
    /// means everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.store.state_path.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "store.state_path".into(),
                message: "state_path must not be empty".into(),
            });
        }
        if self.store.output_path.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "store.output_path".into(),
                message: "output_path must not be empty".into(),
            });
        }

        if self.llm.providers.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "llm.providers".into(),
                message: "no LLM providers configured".into(),
            });
        }
        for (i, provider) in self.llm.providers.iter().enumerate() {
            if provider.id.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("llm.providers[{i}].id"),
                    message: "provider id must not be empty".into(),
                });
            }
            if !provider.base_url.starts_with("http://") && !provider.base_url.starts_with("https://") {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("llm.providers[{i}].base_url"),
                    message: format!(
                        "base_url must start with http:// or https:// (got \"{}\")",
                        provider.base_url
                    ),
                });
            }
        }

        if self.compaction.keep_first + self.compaction.keep_last >= self.compaction.threshold {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "compaction.threshold".into(),
                message: "keep_first + keep_last >= threshold; compaction will never have a middle slice to compress".into(),
            });
        }

        errors
    }

    /// Load from `path` if it exists (TOML), otherwise return defaults.
    pub fn load_from_path(path: &std::path::Path) -> crate::error::Result<Self> {
        if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            toml::from_str(&raw).map_err(|e| crate::error::Error::Config(e.to_string()))
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_warns_on_no_providers() {
        let errors = Config::default().validate();
        assert!(errors
            .iter()
            .any(|e| e.field == "llm.providers" && e.severity == ConfigSeverity::Warning));
    }

    #[test]
    fn default_config_has_no_hard_errors() {
        let errors = Config::default().validate();
        assert!(!errors.iter().any(|e| e.severity == ConfigSeverity::Error));
    }

    #[test]
    fn compaction_keep_window_larger_than_threshold_warns() {
        let mut config = Config::default();
        config.compaction.threshold = 4;
        config.compaction.keep_first = 2;
        config.compaction.keep_last = 4;
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.field == "compaction.threshold"));
    }

    #[test]
    fn load_from_missing_path_returns_defaults() {
        let config = Config::load_from_path(std::path::Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.loop_.max_steps, 30);
    }

    #[test]
    fn load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[loop_]\nmax_steps = 10\n").unwrap();
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.loop_.max_steps, 10);
    }
}
