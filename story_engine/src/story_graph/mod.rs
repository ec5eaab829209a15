//! Story Graph module - the branching history of a session.
//!
//! The graph consists of:
//! - **Nodes**: one generated turn each, with the game state as of that turn
//! - **Edges**: a committed transition from a node via one option
//! - **Options**: the labelled choices a node offers
//!
//! Nodes are stored in an arena keyed by id; parents are plain id references.

mod graph;
mod node;
mod option;

pub use graph::*;
pub use node::*;
pub use option::*;
