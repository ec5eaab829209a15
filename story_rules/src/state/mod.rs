//! Running state - the game data carried alongside every narrative turn.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Progress counters. Both only ever grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct ProgressCounters {
    pub progress_a: u32,
    pub progress_b: u32,
}

impl ProgressCounters {
    pub fn new(progress_a: u32, progress_b: u32) -> Self {
        Self {
            progress_a,
            progress_b,
        }
    }

    /// The larger of the two counters.
    pub fn peak(&self) -> u32 {
        self.progress_a.max(self.progress_b)
    }
}

/// How a finished story ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TerminalKind {
    /// The protagonist reached their goal.
    Success,
    /// The protagonist was stopped.
    Failure,
    /// The story simply ran out.
    Neutral,
}

/// The complete game state at one point of a story's history.
///
/// Every node of the narrative graph owns its own copy; nothing in here is
/// shared between snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RunningState {
    /// Where the protagonist currently is.
    pub location: String,

    /// Held items, in acquisition order, without duplicates.
    pub inventory: Vec<String>,

    /// Named boolean story flags.
    pub flags: BTreeMap<String, bool>,

    /// Append-only log of turn summaries.
    pub event_log: Vec<String>,

    pub counters: ProgressCounters,

    /// Number of completed turns.
    pub turn_count: u32,

    /// Whether the story has ended.
    pub terminal: bool,
}

impl RunningState {
    /// Create a new empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the starting location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Add a starting item (ignored if already held).
    pub fn with_item(mut self, item: impl Into<String>) -> Self {
        self.add_item(item);
        self
    }

    /// Set a starting flag.
    pub fn with_flag(mut self, name: impl Into<String>, value: bool) -> Self {
        self.flags.insert(name.into(), value);
        self
    }

    /// Check if an item is held.
    pub fn has_item(&self, item: &str) -> bool {
        self.inventory.iter().any(|held| held == item)
    }

    /// Read a flag; unset flags read as `false`.
    pub fn flag(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }

    /// Add an item unless it is already held. Returns whether it was added.
    pub fn add_item(&mut self, item: impl Into<String>) -> bool {
        let item = item.into();
        if self.has_item(&item) {
            return false;
        }
        self.inventory.push(item);
        true
    }

    /// Remove an item if held. Returns whether anything was removed.
    pub fn remove_item(&mut self, item: &str) -> bool {
        let before = self.inventory.len();
        self.inventory.retain(|held| held != item);
        self.inventory.len() != before
    }
}

/// Incremental changes a generator declares for one turn.
///
/// Nothing in here is trusted; see [`crate::apply_delta`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StateDelta {
    pub inventory_added: Vec<String>,
    pub inventory_removed: Vec<String>,
    pub flags_set: BTreeMap<String, bool>,
    pub flags_cleared: Vec<String>,
    /// New location, if the protagonist moved.
    pub location: Option<String>,
}

impl StateDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_item(mut self, item: impl Into<String>) -> Self {
        self.inventory_added.push(item.into());
        self
    }

    pub fn remove_item(mut self, item: impl Into<String>) -> Self {
        self.inventory_removed.push(item.into());
        self
    }

    pub fn set_flag(mut self, name: impl Into<String>, value: bool) -> Self {
        self.flags_set.insert(name.into(), value);
        self
    }

    pub fn clear_flag(mut self, name: impl Into<String>) -> Self {
        self.flags_cleared.push(name.into());
        self
    }

    pub fn move_to(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Everything about a generated turn that affects game state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TurnEffects {
    pub delta: StateDelta,

    /// One-line recap of the turn, appended to the event log.
    pub turn_summary: String,

    /// Declared increments. Anything outside `0..=1` is clamped.
    pub progress_a_delta: i64,
    pub progress_b_delta: i64,

    /// Whether the generator considers the story finished.
    pub terminal: bool,
    pub terminal_kind: Option<TerminalKind>,
}

impl TurnEffects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delta(mut self, delta: StateDelta) -> Self {
        self.delta = delta;
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.turn_summary = summary.into();
        self
    }

    pub fn with_progress(mut self, progress_a_delta: i64, progress_b_delta: i64) -> Self {
        self.progress_a_delta = progress_a_delta;
        self.progress_b_delta = progress_b_delta;
        self
    }

    pub fn ending(mut self, kind: Option<TerminalKind>) -> Self {
        self.terminal = true;
        self.terminal_kind = kind;
        self
    }
}
