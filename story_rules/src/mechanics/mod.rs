//! Game mechanics: folding turn effects into state, and classifying progress.

mod phase;
mod reducer;

pub use phase::*;
pub use reducer::*;
