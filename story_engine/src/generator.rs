//! Generator interface - the external service that writes each turn.
//!
//! The engine hands the generator a [`GenerationRequest`] and gets back a
//! [`TurnOutput`]. Every field of the output is treated as untrusted: options
//! are sanitized here, state effects are clamped by the reducer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use story_rules::{Phase, TurnEffects};
use thiserror::Error;

use crate::context_assembler::StoryContext;
use crate::error::EngineError;
use crate::story_graph::{OptionId, StoryOption};

/// Errors a generator may report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeneratorError {
    /// Network, quota, timeout and similar transient problems.
    #[error("{0}")]
    Failure(String),

    /// Output arrived but was not in the expected shape.
    #[error("{0}")]
    Parse(String),
}

impl From<GeneratorError> for EngineError {
    fn from(err: GeneratorError) -> Self {
        match err {
            GeneratorError::Failure(msg) => EngineError::GeneratorFailure(msg),
            GeneratorError::Parse(msg) => EngineError::ParseFailure(msg),
        }
    }
}

/// What the player did to leave a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerAction {
    /// Picked one of the offered options.
    Choose(StoryOption),
    /// Typed their own action.
    FreeText(String),
}

impl PlayerAction {
    /// The branch this action leads down.
    pub fn branch_id(&self) -> OptionId {
        match self {
            PlayerAction::Choose(option) => option.id.clone(),
            PlayerAction::FreeText(text) => OptionId::custom(text),
        }
    }

    /// Human-readable description for prompts.
    pub fn describe(&self) -> &str {
        match self {
            PlayerAction::Choose(option) => &option.label,
            PlayerAction::FreeText(text) => text,
        }
    }
}

/// Everything the generator gets for one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub context: StoryContext,
    pub action: PlayerAction,
    pub phase: Phase,
}

impl GenerationRequest {
    /// Content policy hint for the current phase.
    pub fn content_policy(&self) -> &'static str {
        self.phase.content_policy()
    }
}

/// One generated turn, as returned by a generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TurnOutput {
    pub narration: String,

    #[serde(default)]
    pub options: Vec<StoryOption>,

    #[serde(flatten)]
    pub effects: TurnEffects,
}

impl TurnOutput {
    pub fn new(narration: impl Into<String>) -> Self {
        Self {
            narration: narration.into(),
            ..Default::default()
        }
    }

    pub fn with_option(mut self, id: &str, label: &str) -> Self {
        self.options.push(StoryOption::new(id, label));
        self
    }

    pub fn with_effects(mut self, effects: TurnEffects) -> Self {
        self.effects = effects;
        self
    }

    /// Parse a generator's raw text response.
    ///
    /// The JSON object may be surrounded by other text (reasoning, code
    /// fences); the outermost `{ ... }` span is used.
    pub fn from_json(raw: &str) -> Result<Self, GeneratorError> {
        let start = raw
            .find('{')
            .ok_or_else(|| GeneratorError::Parse("no JSON object in output".to_string()))?;
        let end = raw
            .rfind('}')
            .filter(|end| *end > start)
            .ok_or_else(|| GeneratorError::Parse("unterminated JSON object".to_string()))?;

        let output: TurnOutput = serde_json::from_str(&raw[start..=end])
            .map_err(|err| GeneratorError::Parse(format!("failed to parse turn: {}", err)))?;
        output.sanitize()
    }

    /// Normalize untrusted output.
    ///
    /// Trims text, drops options with blank or repeated ids and options that
    /// reuse the free-text marker, and falls back to the id for blank labels.
    /// Blank narration is rejected outright.
    pub fn sanitize(mut self) -> Result<Self, GeneratorError> {
        self.narration = self.narration.trim().to_string();
        if self.narration.is_empty() {
            return Err(GeneratorError::Parse("turn has no narration".to_string()));
        }

        let mut seen = HashSet::new();
        self.options = self
            .options
            .into_iter()
            .filter_map(|option| {
                let id = option.id.as_str().trim().to_string();
                if id.is_empty() || is_reserved(&id) || !seen.insert(id.clone()) {
                    return None;
                }
                let label = option.label.trim();
                let label = if label.is_empty() { id.clone() } else { label.to_string() };
                Some(StoryOption::new(id, label))
            })
            .collect();

        Ok(self)
    }
}

/// Ids the engine uses for free-text branches.
fn is_reserved(id: &str) -> bool {
    id == OptionId::CUSTOM || id.starts_with(&format!("{}:", OptionId::CUSTOM))
}

/// The text-generation collaborator.
#[async_trait]
pub trait Generator: Send + Sync + 'static {
    /// Produce the next turn for `request`.
    async fn generate(&self, request: GenerationRequest) -> Result<TurnOutput, GeneratorError>;
}
