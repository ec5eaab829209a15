//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use story_rules::{ConfigError, RulesConfig};

/// Speculative generation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    /// Launch a prefetch pass after every successful advance.
    pub auto: bool,
    /// Upper bound on concurrent prefetch generator calls per engine.
    pub max_concurrent: usize,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            auto: true,
            max_concurrent: 4,
        }
    }
}

/// Generator context settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Most recent turns included with full narration; older turns are
    /// reduced to their summaries.
    pub max_full_turns: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self { max_full_turns: 4 }
    }
}

/// All engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub rules: RulesConfig,
    pub prefetch: PrefetchConfig,
    pub context: ContextConfig,
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prefetch.max_concurrent == 0 {
            return Err(ConfigError::Invalid(
                "prefetch.max_concurrent must be at least 1".to_string(),
            ));
        }
        self.rules.validate()
    }

    /// Disable automatic prefetching.
    pub fn without_auto_prefetch(mut self) -> Self {
        self.prefetch.auto = false;
        self
    }
}
