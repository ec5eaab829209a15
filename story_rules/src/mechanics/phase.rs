//! Phase classifier - buckets narrative progress into coarse story phases.

use serde::{Deserialize, Serialize};

use crate::config::PhaseThresholds;
use crate::state::ProgressCounters;

/// Coarse narrative phases, in story order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    Opening,
    Rising,
    Climax,
    Resolution,
}

impl Phase {
    /// Content policy hint handed to the generator for this phase.
    pub fn content_policy(&self) -> &'static str {
        match self {
            Phase::Opening => "introduce",
            Phase::Rising => "escalate",
            Phase::Climax => "confront",
            Phase::Resolution => "conclude",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Opening => "opening",
            Phase::Rising => "rising",
            Phase::Climax => "climax",
            Phase::Resolution => "resolution",
        };
        write!(f, "{}", name)
    }
}

/// Classify progress into a phase.
///
/// The result is the later of the turn-based phase and the counter-based
/// phase. Both are step functions of non-decreasing inputs, so the result
/// never moves backwards while the inputs only grow.
pub fn classify(turn_count: u32, counters: &ProgressCounters, thresholds: &PhaseThresholds) -> Phase {
    phase_by_turns(turn_count, thresholds).max(phase_by_progress(counters.peak(), thresholds))
}

fn phase_by_turns(turn_count: u32, thresholds: &PhaseThresholds) -> Phase {
    if turn_count >= thresholds.resolution_turn {
        Phase::Resolution
    } else if turn_count >= thresholds.climax_turn {
        Phase::Climax
    } else if turn_count >= thresholds.rising_turn {
        Phase::Rising
    } else {
        Phase::Opening
    }
}

fn phase_by_progress(peak: u32, thresholds: &PhaseThresholds) -> Phase {
    if peak >= thresholds.resolution_progress {
        Phase::Resolution
    } else if peak >= thresholds.climax_progress {
        Phase::Climax
    } else if peak >= thresholds.rising_progress {
        Phase::Rising
    } else {
        Phase::Opening
    }
}
