//! Option definitions - the labelled choices offered by a node.

use serde::{Deserialize, Serialize};

/// Identifier of an option, unique within one node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionId(pub String);

impl OptionId {
    /// Option id that marks a free-text player action.
    pub const CUSTOM: &'static str = "custom";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive the branch id for a free-text action.
    ///
    /// Texts that differ only in case or spacing share a branch.
    pub fn custom(text: &str) -> Self {
        let normalized = text
            .split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(" ");
        Self(format!("{}:{}", Self::CUSTOM, normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the bare free-text marker.
    pub fn is_custom_marker(&self) -> bool {
        self.0 == Self::CUSTOM
    }
}

impl From<&str> for OptionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for OptionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for OptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A choice presented to the player.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoryOption {
    pub id: OptionId,
    pub label: String,
}

impl StoryOption {
    pub fn new(id: impl Into<OptionId>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}
