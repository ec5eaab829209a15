//! # Story Engine
//!
//! Runs branching story sessions. Every turn the player takes becomes a node
//! in a per-session story graph; the generator is asked for a turn only when
//! the branch has never been materialized, and untaken branches can be
//! generated ahead of time.
//!
//! ## Core Components
//!
//! - **story_graph**: Arena of story nodes with `(parent, option) -> child` edges
//! - **orchestrator**: Session lifecycle - create, advance, rollback, prefetch
//! - **context_assembler**: Builds the path-derived context handed to the generator
//! - **generator**: The generator contract and its output sanitizer
//! - **persistence**: Opaque session blobs keyed by session id
//!
//! State reduction and phase classification live in `story_rules`.

pub mod config;
pub mod context_assembler;
pub mod error;
pub mod generator;
pub mod orchestrator;
pub mod persistence;
pub mod session;
pub mod story_graph;

pub use config::*;
pub use context_assembler::*;
pub use error::*;
pub use generator::*;
pub use orchestrator::*;
pub use persistence::*;
pub use session::*;
pub use story_graph::*;
