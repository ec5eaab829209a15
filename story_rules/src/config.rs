//! Rule configuration: counter thresholds and phase boundaries.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading or validating rule configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Thresholds that end a story regardless of what the generator says.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterRules {
    /// `progress_a` at or above this value ends the story.
    pub terminal_threshold_a: u32,
    /// `progress_b` at or above this value ends the story.
    pub terminal_threshold_b: u32,
}

impl Default for CounterRules {
    fn default() -> Self {
        Self {
            terminal_threshold_a: 5,
            terminal_threshold_b: 5,
        }
    }
}

/// Phase boundaries. A phase is entered once either its turn boundary or its
/// progress boundary is reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseThresholds {
    pub rising_turn: u32,
    pub climax_turn: u32,
    pub resolution_turn: u32,

    /// Peak counter value that forces `Rising`.
    pub rising_progress: u32,
    /// Peak counter value that forces `Climax`.
    pub climax_progress: u32,
    /// Peak counter value that forces `Resolution`.
    pub resolution_progress: u32,
}

impl Default for PhaseThresholds {
    fn default() -> Self {
        Self {
            rising_turn: 3,
            climax_turn: 10,
            resolution_turn: 16,
            rising_progress: 1,
            climax_progress: 3,
            resolution_progress: 5,
        }
    }
}

impl PhaseThresholds {
    /// Check that boundaries are ordered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.rising_turn <= self.climax_turn && self.climax_turn <= self.resolution_turn) {
            return Err(ConfigError::Invalid(format!(
                "turn boundaries must be non-decreasing (got {}, {}, {})",
                self.rising_turn, self.climax_turn, self.resolution_turn
            )));
        }
        if !(self.rising_progress <= self.climax_progress
            && self.climax_progress <= self.resolution_progress)
        {
            return Err(ConfigError::Invalid(format!(
                "progress boundaries must be non-decreasing (got {}, {}, {})",
                self.rising_progress, self.climax_progress, self.resolution_progress
            )));
        }
        Ok(())
    }
}

/// All rule-book settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RulesConfig {
    pub counters: CounterRules,
    pub phases: PhaseThresholds,
}

impl RulesConfig {
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
        if self.counters.terminal_threshold_a == 0 || self.counters.terminal_threshold_b == 0 {
            return Err(ConfigError::Invalid(
                "terminal thresholds must be at least 1".to_string(),
            ));
        }
        self.phases.validate()
    }
}
