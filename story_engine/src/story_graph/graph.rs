//! Story Graph - the arena of nodes and the edges between them.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use super::{NodeId, OptionId, StoryNode};

/// Structural violations. These indicate a bug in the caller, never bad
/// generator output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("node {0} already exists")]
    DuplicateId(NodeId),

    #[error("node {from} already has a branch for option '{option_id}'")]
    DuplicateEdge { from: NodeId, option_id: OptionId },

    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error("parent {parent} of node {node} not found")]
    MissingParent { node: NodeId, parent: NodeId },

    #[error("node {0} is a second root")]
    SecondRoot(NodeId),

    #[error("node {node} has depth {found}, expected {expected}")]
    DepthMismatch { node: NodeId, expected: u32, found: u32 },

    #[error("node {from} is not the parent of node {to}")]
    NotParent { from: NodeId, to: NodeId },

    #[error("node {0} already has an incoming edge")]
    AlreadyLinked(NodeId),

    #[error("node {0} is not reachable from the root")]
    Unreachable(NodeId),
}

/// The reuse key: one branch out of one node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchKey {
    pub node: NodeId,
    pub option: OptionId,
}

impl BranchKey {
    pub fn new(node: NodeId, option: OptionId) -> Self {
        Self { node, option }
    }
}

impl std::fmt::Display for BranchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.node, self.option)
    }
}

/// A committed transition from a node via one option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeId,
    pub option_id: OptionId,
    pub to: NodeId,
}

/// The main story graph structure.
///
/// Nodes live in an arena keyed by id, edges in a flat list. The graph is a
/// tree: one root, at most one incoming edge per node, and at most one edge
/// per `(node, option)` pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "StoredGraph", into = "StoredGraph")]
pub struct StoryGraph {
    /// All nodes stored by ID.
    nodes: HashMap<NodeId, StoryNode>,

    /// Edges in insertion order.
    edges: Vec<Edge>,

    /// Index: branch -> child node.
    edge_index: HashMap<BranchKey, NodeId>,

    /// Nodes that already have their incoming edge.
    linked: HashSet<NodeId>,

    root: Option<NodeId>,
}

impl StoryGraph {
    /// Create a new empty story graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node.
    ///
    /// The first parentless node becomes the root; any later one is rejected.
    /// A child must name an existing parent and sit exactly one level below it.
    pub fn add_node(&mut self, node: StoryNode) -> Result<(), GraphError> {
        if self.nodes.contains_key(&node.id) {
            return Err(GraphError::DuplicateId(node.id));
        }

        match node.parent_id {
            None => {
                if self.root.is_some() {
                    return Err(GraphError::SecondRoot(node.id));
                }
                if node.depth != 0 {
                    return Err(GraphError::DepthMismatch {
                        node: node.id,
                        expected: 0,
                        found: node.depth,
                    });
                }
                self.root = Some(node.id);
            }
            Some(parent_id) => {
                let parent = self.nodes.get(&parent_id).ok_or(GraphError::MissingParent {
                    node: node.id,
                    parent: parent_id,
                })?;
                if node.depth != parent.depth + 1 {
                    return Err(GraphError::DepthMismatch {
                        node: node.id,
                        expected: parent.depth + 1,
                        found: node.depth,
                    });
                }
            }
        }

        self.nodes.insert(node.id, node);
        Ok(())
    }

    /// Link `from` to `to` via `option_id`.
    ///
    /// Callers check [`StoryGraph::child`] first; a second edge for the same
    /// branch is an integrity error, never an overwrite.
    pub fn add_edge(
        &mut self,
        from: NodeId,
        option_id: OptionId,
        to: NodeId,
    ) -> Result<(), GraphError> {
        let key = BranchKey::new(from, option_id);
        if self.edge_index.contains_key(&key) {
            return Err(GraphError::DuplicateEdge {
                from,
                option_id: key.option,
            });
        }
        if !self.nodes.contains_key(&from) {
            return Err(GraphError::NodeNotFound(from));
        }
        let target = self.nodes.get(&to).ok_or(GraphError::NodeNotFound(to))?;
        if target.parent_id != Some(from) {
            return Err(GraphError::NotParent { from, to });
        }
        if self.linked.contains(&to) {
            return Err(GraphError::AlreadyLinked(to));
        }

        self.edges.push(Edge {
            from,
            option_id: key.option.clone(),
            to,
        });
        self.edge_index.insert(key, to);
        self.linked.insert(to);
        Ok(())
    }

    /// Create a graph holding only `root`. Its parent is cleared and its
    /// depth reset to 0.
    pub fn with_root(mut root: StoryNode) -> Self {
        root.parent_id = None;
        root.depth = 0;
        let root_id = root.id;

        let mut graph = Self::new();
        graph.nodes.insert(root_id, root);
        graph.root = Some(root_id);
        graph
    }

    /// Insert a child node and the edge leading to it, or neither.
    ///
    /// Every check runs before anything is written, so a failure leaves the
    /// graph untouched.
    pub fn add_child(&mut self, option_id: OptionId, node: StoryNode) -> Result<(), GraphError> {
        let parent_id = node.parent_id.ok_or(GraphError::SecondRoot(node.id))?;
        if self.nodes.contains_key(&node.id) {
            return Err(GraphError::DuplicateId(node.id));
        }
        if self.child_id(parent_id, &option_id).is_some() {
            return Err(GraphError::DuplicateEdge {
                from: parent_id,
                option_id,
            });
        }
        let parent = self.nodes.get(&parent_id).ok_or(GraphError::MissingParent {
            node: node.id,
            parent: parent_id,
        })?;
        if node.depth != parent.depth + 1 {
            return Err(GraphError::DepthMismatch {
                node: node.id,
                expected: parent.depth + 1,
                found: node.depth,
            });
        }

        let child_id = node.id;
        self.add_node(node)?;
        self.add_edge(parent_id, option_id, child_id)
    }

    /// The reuse lookup: the node already generated for this branch, if any.
    pub fn child(&self, node_id: NodeId, option_id: &OptionId) -> Option<&StoryNode> {
        self.child_id(node_id, option_id)
            .and_then(|id| self.nodes.get(&id))
    }

    /// Like [`StoryGraph::child`], returning only the id.
    pub fn child_id(&self, node_id: NodeId, option_id: &OptionId) -> Option<NodeId> {
        self.edge_index
            .get(&BranchKey::new(node_id, option_id.clone()))
            .copied()
    }

    /// Ids from the root down to `node_id`, inclusive.
    pub fn path_to_root(&self, node_id: NodeId) -> Result<Vec<NodeId>, GraphError> {
        let mut path = Vec::new();
        let mut cursor = Some(node_id);

        while let Some(id) = cursor {
            let node = self.nodes.get(&id).ok_or(GraphError::NodeNotFound(id))?;
            path.push(id);
            cursor = node.parent_id;
        }

        path.reverse();
        Ok(path)
    }

    /// Materialized branches out of a node, in the order they were created.
    pub fn children_of(&self, node_id: NodeId) -> Vec<(&OptionId, &StoryNode)> {
        self.edges
            .iter()
            .filter(|edge| edge.from == node_id)
            .filter_map(|edge| self.nodes.get(&edge.to).map(|node| (&edge.option_id, node)))
            .collect()
    }

    /// The option on the edge leading into `node_id`, if it has one.
    pub fn incoming_option(&self, node_id: NodeId) -> Option<&OptionId> {
        self.edges
            .iter()
            .find(|edge| edge.to == node_id)
            .map(|edge| &edge.option_id)
    }

    /// Get node by ID.
    pub fn get_node(&self, id: NodeId) -> Option<&StoryNode> {
        self.nodes.get(&id)
    }

    /// Record the option the player picked at a node.
    pub(crate) fn mark_chosen(&mut self, id: NodeId, option_id: OptionId) -> Result<(), GraphError> {
        let node = self.nodes.get_mut(&id).ok_or(GraphError::NodeNotFound(id))?;
        node.chosen_option_id = Some(option_id);
        Ok(())
    }

    /// Record that the player has entered a node.
    pub(crate) fn mark_visited(&mut self, id: NodeId) -> Result<(), GraphError> {
        let node = self.nodes.get_mut(&id).ok_or(GraphError::NodeNotFound(id))?;
        node.visited = true;
        Ok(())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn root_id(&self) -> Option<NodeId> {
        self.root
    }

    /// All nodes, in no particular order.
    pub fn nodes(&self) -> impl Iterator<Item = &StoryNode> {
        self.nodes.values()
    }

    /// All edges, in insertion order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

/// Serialized form of a graph: plain node and edge lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredGraph {
    nodes: Vec<StoryNode>,
    edges: Vec<Edge>,
}

impl From<StoryGraph> for StoredGraph {
    fn from(graph: StoryGraph) -> Self {
        let mut nodes: Vec<_> = graph.nodes.into_values().collect();
        nodes.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.id.0.cmp(&b.id.0)));
        Self {
            nodes,
            edges: graph.edges,
        }
    }
}

impl TryFrom<StoredGraph> for StoryGraph {
    type Error = GraphError;

    /// Rebuild indexes and re-check every structural invariant.
    fn try_from(stored: StoredGraph) -> Result<Self, Self::Error> {
        let mut graph = StoryGraph::new();

        let mut nodes = stored.nodes;
        nodes.sort_by_key(|node| node.depth);
        for node in nodes {
            graph.add_node(node)?;
        }
        for edge in stored.edges {
            graph.add_edge(edge.from, edge.option_id, edge.to)?;
        }

        if let Some(orphan) = graph
            .nodes
            .values()
            .find(|node| !node.is_root() && !graph.linked.contains(&node.id))
        {
            return Err(GraphError::Unreachable(orphan.id));
        }

        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::story_graph::StoryOption;
    use story_rules::RunningState;

    fn graph_with_root() -> (StoryGraph, StoryNode) {
        let root = StoryNode::root("Start", RunningState::new());
        (StoryGraph::with_root(root.clone()), root)
    }

    fn attach(graph: &mut StoryGraph, parent: &StoryNode, option: &str) -> StoryNode {
        let child = StoryNode::child_of(parent, format!("after {}", option), RunningState::new());
        graph.add_node(child.clone()).unwrap();
        graph.add_edge(parent.id, OptionId::new(option), child.id).unwrap();
        child
    }

    #[test]
    fn test_add_and_get_node() {
        let (graph, root) = graph_with_root();

        assert_eq!(graph.root_id(), Some(root.id));
        assert_eq!(graph.get_node(root.id).unwrap().generated_text, "Start");
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn test_with_root_normalizes_node() {
        let (_, parent) = graph_with_root();
        let stray = StoryNode::child_of(&parent, "Elsewhere", RunningState::new());

        let graph = StoryGraph::with_root(stray.clone());

        let root = graph.get_node(stray.id).unwrap();
        assert_eq!(graph.root_id(), Some(stray.id));
        assert_eq!(root.parent_id, None);
        assert_eq!(root.depth, 0);
        assert_eq!(graph.path_to_root(stray.id).unwrap(), vec![stray.id]);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let (mut graph, root) = graph_with_root();

        let result = graph.add_node(root.clone());
        assert_eq!(result, Err(GraphError::DuplicateId(root.id)));
    }

    #[test]
    fn test_second_root_rejected() {
        let (mut graph, _) = graph_with_root();

        let other = StoryNode::root("Another start", RunningState::new());
        assert_eq!(graph.add_node(other.clone()), Err(GraphError::SecondRoot(other.id)));
    }

    #[test]
    fn test_child_requires_parent_and_depth() {
        let (mut graph, root) = graph_with_root();

        let stranger = StoryNode::root("Elsewhere", RunningState::new());
        let orphan = StoryNode::child_of(&stranger, "Lost", RunningState::new());
        assert!(matches!(
            graph.add_node(orphan),
            Err(GraphError::MissingParent { .. })
        ));

        let mut deep = StoryNode::child_of(&root, "Too deep", RunningState::new());
        deep.depth = 4;
        assert!(matches!(
            graph.add_node(deep),
            Err(GraphError::DepthMismatch { expected: 1, found: 4, .. })
        ));
    }

    #[test]
    fn test_duplicate_edge_rejected() {
        let (mut graph, root) = graph_with_root();
        attach(&mut graph, &root, "north");

        let second = StoryNode::child_of(&root, "North again", RunningState::new());
        graph.add_node(second.clone()).unwrap();

        let result = graph.add_edge(root.id, OptionId::new("north"), second.id);
        assert!(matches!(result, Err(GraphError::DuplicateEdge { .. })));
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_edge_must_follow_parent() {
        let (mut graph, root) = graph_with_root();
        let a = attach(&mut graph, &root, "a");
        let b = attach(&mut graph, &root, "b");

        // b's parent is root, not a.
        let result = graph.add_edge(a.id, OptionId::new("x"), b.id);
        assert_eq!(result, Err(GraphError::NotParent { from: a.id, to: b.id }));

        // b already has its incoming edge.
        let result = graph.add_edge(root.id, OptionId::new("again"), b.id);
        assert_eq!(result, Err(GraphError::AlreadyLinked(b.id)));
    }

    #[test]
    fn test_add_child_is_all_or_nothing() {
        let (mut graph, root) = graph_with_root();
        let first = StoryNode::child_of(&root, "First", RunningState::new());
        graph.add_child(OptionId::new("go"), first.clone()).unwrap();

        assert_eq!(graph.child_id(root.id, &OptionId::new("go")), Some(first.id));

        let second = StoryNode::child_of(&root, "Second", RunningState::new());
        let result = graph.add_child(OptionId::new("go"), second.clone());

        assert!(matches!(result, Err(GraphError::DuplicateEdge { .. })));
        assert!(!graph.contains(second.id));
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);

        let stray = StoryNode::root("Not a child", RunningState::new());
        assert!(graph.add_child(OptionId::new("x"), stray).is_err());
    }

    #[test]
    fn test_child_lookup() {
        let (mut graph, root) = graph_with_root();
        let north = attach(&mut graph, &root, "north");

        assert_eq!(graph.child(root.id, &OptionId::new("north")).unwrap().id, north.id);
        assert!(graph.child(root.id, &OptionId::new("south")).is_none());
        assert!(graph.child(north.id, &OptionId::new("north")).is_none());
    }

    #[test]
    fn test_path_to_root() {
        let (mut graph, root) = graph_with_root();
        let a = attach(&mut graph, &root, "a");
        let b = attach(&mut graph, &a, "b");
        attach(&mut graph, &root, "side");

        assert_eq!(graph.path_to_root(b.id).unwrap(), vec![root.id, a.id, b.id]);
        assert_eq!(graph.incoming_option(b.id), Some(&OptionId::new("b")));
        assert_eq!(graph.incoming_option(root.id), None);
        assert_eq!(graph.path_to_root(root.id).unwrap(), vec![root.id]);
        assert_eq!(
            graph.path_to_root(NodeId::nil()),
            Err(GraphError::NodeNotFound(NodeId::nil()))
        );
    }

    #[test]
    fn test_children_of_keeps_insertion_order() {
        let (mut graph, root) = graph_with_root();
        let west = attach(&mut graph, &root, "west");
        let east = attach(&mut graph, &root, "east");

        let children = graph.children_of(root.id);
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].0.as_str(), "west");
        assert_eq!(children[0].1.id, west.id);
        assert_eq!(children[1].1.id, east.id);
        assert!(graph.children_of(east.id).is_empty());
    }

    #[test]
    fn test_mark_chosen_and_visited() {
        let (mut graph, root) = graph_with_root();
        let child = attach(&mut graph, &root, "go");

        graph.mark_chosen(root.id, OptionId::new("go")).unwrap();
        graph.mark_visited(child.id).unwrap();

        assert_eq!(
            graph.get_node(root.id).unwrap().chosen_option_id,
            Some(OptionId::new("go"))
        );
        assert!(graph.get_node(child.id).unwrap().visited);
        assert!(graph.mark_visited(NodeId::nil()).is_err());
    }

    #[test]
    fn test_serde_round_trip_rebuilds_index() {
        let (mut graph, root) = graph_with_root();
        let a = attach(&mut graph, &root, "a");
        attach(&mut graph, &a, "deeper");

        let json = serde_json::to_string(&graph).unwrap();
        let restored: StoryGraph = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.node_count(), 3);
        assert_eq!(restored.root_id(), Some(root.id));
        assert_eq!(restored.child_id(root.id, &OptionId::new("a")), Some(a.id));
    }

    #[test]
    fn test_deserialize_rejects_orphan() {
        let root = StoryNode::root("Start", RunningState::new())
            .with_options(vec![StoryOption::new("a", "A")]);
        let child = StoryNode::child_of(&root, "Unlinked", RunningState::new());
        let stored = StoredGraph {
            nodes: vec![root, child.clone()],
            edges: Vec::new(),
        };

        let json = serde_json::to_string(&stored).unwrap();
        let result: Result<StoryGraph, _> = serde_json::from_str(&json);
        assert!(result.is_err());
    }
}
