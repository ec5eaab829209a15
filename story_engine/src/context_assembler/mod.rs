//! Context Assembler - Builds generator context from a node's history.
//!
//! The context for a turn is the path from the root down to the node being
//! left:
//! 1. **Walk**: collect the path to the root
//! 2. **Label**: attach the option taken out of each ancestor
//! 3. **Trim**: keep full narration only for the most recent turns
//! 4. **Assembly**: add the state snapshot and phase of the node being left

use serde::{Deserialize, Serialize};
use story_rules::{Phase, RunningState};

use crate::config::ContextConfig;
use crate::story_graph::{GraphError, NodeId, OptionId, StoryGraph};

/// One past turn as seen by the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextTurn {
    pub depth: u32,

    /// Full narration, present only for recent turns.
    pub narration: Option<String>,

    pub summary: String,

    /// Label of the option taken out of this turn, if the path continues.
    pub choice: Option<String>,
}

/// The assembled context ready for prompt generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryContext {
    /// Node the player is leaving.
    pub node_id: NodeId,

    /// Root first.
    pub turns: Vec<ContextTurn>,

    /// Game state at the node being left.
    pub state: RunningState,

    pub phase: Phase,
}

impl StoryContext {
    /// Format the context as a prompt string.
    pub fn to_prompt_string(&self) -> String {
        let mut prompt = String::new();

        prompt.push_str("## Story So Far\n");
        for turn in &self.turns {
            match &turn.narration {
                Some(text) => prompt.push_str(&format!("[{}] {}\n", turn.depth, text)),
                None if !turn.summary.is_empty() => {
                    prompt.push_str(&format!("[{}] ({})\n", turn.depth, turn.summary))
                }
                None => {}
            }
            if let Some(choice) = &turn.choice {
                prompt.push_str(&format!("> {}\n", choice));
            }
        }
        prompt.push('\n');

        prompt.push_str("## State\n");
        if !self.state.location.is_empty() {
            prompt.push_str(&format!("Location: {}\n", self.state.location));
        }
        prompt.push_str(&format!(
            "Inventory: {}\n",
            if self.state.inventory.is_empty() {
                "None".to_string()
            } else {
                self.state.inventory.join(", ")
            }
        ));
        let active_flags: Vec<_> = self
            .state
            .flags
            .iter()
            .filter(|(_, value)| **value)
            .map(|(name, _)| name.as_str())
            .collect();
        if !active_flags.is_empty() {
            prompt.push_str(&format!("Flags: {}\n", active_flags.join(", ")));
        }
        prompt.push_str(&format!(
            "Turn {}, phase {} ({})\n",
            self.state.turn_count,
            self.phase,
            self.phase.content_policy()
        ));

        prompt
    }
}

/// The context assembler builds generator context from the story graph.
pub struct ContextAssembler {
    config: ContextConfig,
}

impl ContextAssembler {
    /// Create a new context assembler with the given configuration.
    pub fn new(config: ContextConfig) -> Self {
        Self { config }
    }

    /// Create a context assembler with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ContextConfig::default())
    }

    /// Assemble the context for leaving `node_id`.
    pub fn assemble(
        &self,
        graph: &StoryGraph,
        node_id: NodeId,
        phase: Phase,
    ) -> Result<StoryContext, GraphError> {
        let path = graph.path_to_root(node_id)?;
        let full_from = path.len().saturating_sub(self.config.max_full_turns);

        let mut turns = Vec::with_capacity(path.len());
        for (index, id) in path.iter().enumerate() {
            let node = graph.get_node(*id).ok_or(GraphError::NodeNotFound(*id))?;

            let choice = path.get(index + 1).and_then(|next| {
                graph
                    .incoming_option(*next)
                    .map(|option_id| choice_label(node.option(option_id).map(|o| o.label.as_str()), option_id))
            });

            turns.push(ContextTurn {
                depth: node.depth,
                narration: (index >= full_from).then(|| node.generated_text.clone()),
                summary: node.turn_summary.clone(),
                choice,
            });
        }

        let state = graph
            .get_node(node_id)
            .map(|node| node.state_snapshot.clone())
            .ok_or(GraphError::NodeNotFound(node_id))?;

        Ok(StoryContext {
            node_id,
            turns,
            state,
            phase,
        })
    }
}

/// Offered label if known, otherwise the typed text of a free-text branch.
fn choice_label(offered: Option<&str>, option_id: &OptionId) -> String {
    match offered {
        Some(label) => label.to_string(),
        None => option_id
            .as_str()
            .strip_prefix(&format!("{}:", OptionId::CUSTOM))
            .unwrap_or(option_id.as_str())
            .to_string(),
    }
}
