//! Session - one player's story: the graph, where they are in it, and the
//! state at that point.

use serde::{Deserialize, Serialize};
use story_rules::{apply_delta, classify, CounterRules, Phase, PhaseThresholds, RunningState};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::generator::TurnOutput;
use crate::persistence::{SessionBlob, SessionMetadata};
use crate::story_graph::{NodeId, OptionId, StoryGraph, StoryNode};

/// Unique identifier for sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Starting parameters for a new session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionParams {
    pub title: String,
    /// Narration shown at the root.
    pub opening_text: String,
    pub initial_state: RunningState,
}

impl SessionParams {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_opening(mut self, text: impl Into<String>) -> Self {
        self.opening_text = text.into();
        self
    }

    pub fn with_state(mut self, state: RunningState) -> Self {
        self.initial_state = state;
        self
    }
}

/// Result of committing a generated turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommittedBranch {
    pub node_id: NodeId,
    /// `false` when another operation had already filled the branch and the
    /// candidate was discarded.
    pub inserted: bool,
}

/// A complete story session.
///
/// `running_state` always equals the current node's snapshot once an
/// operation has returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "SessionRecord")]
pub struct Session {
    id: SessionId,
    title: String,
    root_node_id: NodeId,
    current_node_id: NodeId,
    graph: StoryGraph,
    running_state: RunningState,
}

impl Session {
    /// Create a session whose root holds the initial state. No generation
    /// happens here.
    pub fn new(params: SessionParams) -> Self {
        let root = StoryNode::root(params.opening_text, params.initial_state.clone());
        let root_id = root.id;
        let graph = StoryGraph::with_root(root);

        Self {
            id: SessionId::new(),
            title: params.title,
            root_node_id: root_id,
            current_node_id: root_id,
            graph,
            running_state: params.initial_state,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn root_node_id(&self) -> NodeId {
        self.root_node_id
    }

    pub fn current_node_id(&self) -> NodeId {
        self.current_node_id
    }

    pub fn graph(&self) -> &StoryGraph {
        &self.graph
    }

    pub fn running_state(&self) -> &RunningState {
        &self.running_state
    }

    pub fn current_node(&self) -> EngineResult<&StoryNode> {
        self.node(self.current_node_id)
    }

    pub fn node(&self, id: NodeId) -> EngineResult<&StoryNode> {
        self.graph.get_node(id).ok_or(EngineError::NodeNotFound(id))
    }

    /// Phase of the current position.
    pub fn phase(&self, thresholds: &PhaseThresholds) -> Phase {
        classify(
            self.running_state.turn_count,
            &self.running_state.counters,
            thresholds,
        )
    }

    /// Move to `id`, mark it visited and adopt its snapshot.
    pub(crate) fn enter(&mut self, id: NodeId) -> EngineResult<&StoryNode> {
        let snapshot = self.node(id)?.state_snapshot.clone();
        self.graph.mark_visited(id)?;
        self.current_node_id = id;
        self.running_state = snapshot;
        self.node(id)
    }

    pub(crate) fn mark_chosen(&mut self, id: NodeId, option_id: OptionId) -> EngineResult<()> {
        Ok(self.graph.mark_chosen(id, option_id)?)
    }

    /// Turn a generated candidate into a child of `parent_id`, unless the
    /// branch was filled in the meantime.
    ///
    /// State is reduced from the parent's snapshot, never from the live
    /// running state, which may have moved elsewhere.
    pub(crate) fn commit_turn(
        &mut self,
        parent_id: NodeId,
        option_id: OptionId,
        output: TurnOutput,
        rules: &CounterRules,
    ) -> EngineResult<CommittedBranch> {
        if let Some(existing) = self.graph.child_id(parent_id, &option_id) {
            return Ok(CommittedBranch {
                node_id: existing,
                inserted: false,
            });
        }

        let parent = self.node(parent_id)?;
        let reduced = apply_delta(&parent.state_snapshot, &output.effects, rules);
        let node = StoryNode::child_of(parent, output.narration, reduced.state)
            .with_options(output.options)
            .with_summary(output.effects.turn_summary.trim())
            .with_terminal_kind(reduced.terminal_kind);
        let node_id = node.id;

        self.graph.add_child(option_id, node)?;
        Ok(CommittedBranch {
            node_id,
            inserted: true,
        })
    }

    /// Storage summary.
    pub fn metadata(&self, thresholds: &PhaseThresholds) -> SessionMetadata {
        SessionMetadata {
            session_id: self.id,
            title: self.title.clone(),
            turn_count: self.running_state.turn_count,
            node_count: self.graph.node_count(),
            depth: self.current_node().map(|node| node.depth).unwrap_or(0),
            phase: self.phase(thresholds),
            terminal: self.running_state.terminal,
        }
    }

    /// Encode for a [`crate::SessionStore`].
    pub fn to_blob(&self, thresholds: &PhaseThresholds) -> EngineResult<SessionBlob> {
        Ok(SessionBlob {
            metadata: self.metadata(thresholds),
            payload: serde_json::to_value(self)?,
        })
    }

    /// Decode a stored session, re-checking all invariants.
    pub fn from_blob(blob: SessionBlob) -> EngineResult<Self> {
        Ok(serde_json::from_value(blob.payload)?)
    }
}

/// Unvalidated serialized form of a session.
#[derive(Deserialize)]
struct SessionRecord {
    id: SessionId,
    title: String,
    root_node_id: NodeId,
    current_node_id: NodeId,
    graph: StoryGraph,
    running_state: RunningState,
}

impl TryFrom<SessionRecord> for Session {
    type Error = EngineError;

    fn try_from(record: SessionRecord) -> Result<Self, Self::Error> {
        if record.graph.root_id() != Some(record.root_node_id) {
            return Err(EngineError::CorruptSession(format!(
                "root {} is not the graph root",
                record.root_node_id
            )));
        }
        let current = record
            .graph
            .get_node(record.current_node_id)
            .ok_or(EngineError::NodeNotFound(record.current_node_id))?;
        if current.state_snapshot != record.running_state {
            return Err(EngineError::CorruptSession(
                "running state differs from the current node's snapshot".to_string(),
            ));
        }

        Ok(Self {
            id: record.id,
            title: record.title,
            root_node_id: record.root_node_id,
            current_node_id: record.current_node_id,
            graph: record.graph,
            running_state: record.running_state,
        })
    }
}
