//! Node definitions - one generated turn in the story graph.

use serde::{Deserialize, Serialize};
use story_rules::{RunningState, TerminalKind};
use uuid::Uuid;

use super::{OptionId, StoryOption};

/// Unique identifier for nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn nil() -> Self {
        Self(Uuid::nil())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One turn of a story: narration, the choices it offers, and the game state
/// as of that turn.
///
/// Once stored in a graph, only `chosen_option_id` and `visited` ever change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryNode {
    pub id: NodeId,

    /// `None` only for the root.
    pub parent_id: Option<NodeId>,

    /// Distance from the root.
    pub depth: u32,

    pub generated_text: String,

    pub available_options: Vec<StoryOption>,

    /// Last option the player picked here, recorded before generation.
    pub chosen_option_id: Option<OptionId>,

    /// Game state as of the end of this turn.
    pub state_snapshot: RunningState,

    pub is_terminal: bool,
    pub terminal_kind: Option<TerminalKind>,

    /// Whether the player has actually been here (prefetched nodes start unvisited).
    pub visited: bool,

    pub turn_summary: String,
}

impl StoryNode {
    /// Create a root node holding the initial state.
    pub fn root(generated_text: impl Into<String>, state: RunningState) -> Self {
        Self {
            id: NodeId::new(),
            parent_id: None,
            depth: 0,
            generated_text: generated_text.into(),
            available_options: Vec::new(),
            chosen_option_id: None,
            is_terminal: state.terminal,
            terminal_kind: None,
            state_snapshot: state,
            visited: true,
            turn_summary: String::new(),
        }
    }

    /// Create an unvisited child of `parent`.
    pub fn child_of(parent: &StoryNode, generated_text: impl Into<String>, state: RunningState) -> Self {
        Self {
            id: NodeId::new(),
            parent_id: Some(parent.id),
            depth: parent.depth + 1,
            generated_text: generated_text.into(),
            available_options: Vec::new(),
            chosen_option_id: None,
            is_terminal: state.terminal,
            terminal_kind: None,
            state_snapshot: state,
            visited: false,
            turn_summary: String::new(),
        }
    }

    /// Set the offered options. Terminal nodes keep none.
    pub fn with_options(mut self, options: Vec<StoryOption>) -> Self {
        self.available_options = if self.is_terminal { Vec::new() } else { options };
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.turn_summary = summary.into();
        self
    }

    pub fn with_terminal_kind(mut self, kind: Option<TerminalKind>) -> Self {
        if self.is_terminal {
            self.terminal_kind = kind;
        }
        self
    }

    /// Look up an offered option by id.
    pub fn option(&self, id: &OptionId) -> Option<&StoryOption> {
        self.available_options.iter().find(|option| &option.id == id)
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}
