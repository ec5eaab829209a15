//! State reducer - merges a generated turn's effects into the running state.

use crate::config::CounterRules;
use crate::state::{RunningState, TerminalKind, TurnEffects};

/// The outcome of reducing one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReducedTurn {
    pub state: RunningState,
    /// Set only when `state.terminal` is true.
    pub terminal_kind: Option<TerminalKind>,
}

/// Apply a turn's declared effects to `prev`, producing a fresh state.
///
/// The generator is not trusted:
/// - `turn_count` always advances by exactly one
/// - each counter grows by at most one per turn
/// - blank items, flags and summaries are ignored
/// - crossing a counter threshold ends the story even if the generator
///   claimed otherwise
///
/// Additions are applied before removals, so an item both added and removed
/// in the same turn ends up absent. The same holds for flags.
pub fn apply_delta(prev: &RunningState, effects: &TurnEffects, rules: &CounterRules) -> ReducedTurn {
    let mut state = prev.clone();
    let delta = &effects.delta;

    for item in &delta.inventory_added {
        let item = item.trim();
        if !item.is_empty() {
            state.add_item(item);
        }
    }
    for item in &delta.inventory_removed {
        state.remove_item(item.trim());
    }

    for (name, value) in &delta.flags_set {
        let name = name.trim();
        if !name.is_empty() {
            state.flags.insert(name.to_string(), *value);
        }
    }
    for name in &delta.flags_cleared {
        state.flags.remove(name.trim());
    }

    if let Some(location) = &delta.location {
        let location = location.trim();
        if !location.is_empty() {
            state.location = location.to_string();
        }
    }

    state.turn_count = state.turn_count.saturating_add(1);

    let summary = effects.turn_summary.trim();
    if !summary.is_empty() {
        state.event_log.push(summary.to_string());
    }

    state.counters.progress_a = state
        .counters
        .progress_a
        .saturating_add(clamp_progress(effects.progress_a_delta));
    state.counters.progress_b = state
        .counters
        .progress_b
        .saturating_add(clamp_progress(effects.progress_b_delta));

    let crossed_a = state.counters.progress_a >= rules.terminal_threshold_a;
    let crossed_b = state.counters.progress_b >= rules.terminal_threshold_b;

    state.terminal = prev.terminal || effects.terminal || crossed_a || crossed_b;

    let terminal_kind = if !state.terminal {
        None
    } else if let Some(kind) = effects.terminal_kind {
        Some(kind)
    } else if crossed_a {
        Some(TerminalKind::Success)
    } else if crossed_b {
        Some(TerminalKind::Failure)
    } else {
        Some(TerminalKind::Neutral)
    };

    ReducedTurn {
        state,
        terminal_kind,
    }
}

/// Counters move by at most one step per turn, and never backwards.
fn clamp_progress(declared: i64) -> u32 {
    declared.clamp(0, 1) as u32
}
