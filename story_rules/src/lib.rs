//! # Story Rules
//!
//! The "rule book" crate - holds the running game state carried by every turn,
//! the reducer that folds generator-declared deltas into it, and the phase
//! classifier that buckets narrative progress.
//! This crate performs no I/O and knows nothing about generators or graphs.

pub mod config;
pub mod mechanics;
pub mod state;

pub use config::*;
pub use mechanics::*;
pub use state::*;
