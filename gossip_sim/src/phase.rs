use rand::seq::SliceRandom;
use rand::Rng;

use crate::archetype_config::{Archetype, PhaseNext};
use crate::instance::GossipInstance;

/// Phase names that end an instance regardless of archetype.
pub const TERMINAL_PHASES: &[&str] = &[
    "RESOLVED",
    "STABLE",
    "INTEGRATED",
    "ABANDONED",
    "FORGOTTEN",
    "DEPARTED",
    "RETIRED",
];

pub const ABANDONED_PHASE: &str = "ABANDONED";

pub fn is_terminal(phase: &str) -> bool {
    TERMINAL_PHASES.contains(&phase)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseTransition {
    pub from: String,
    pub to: String,
    /// Ticks spent in `from` before leaving it.
    pub elapsed: u32,
}

/// Advance one instance by a tick.
///
/// The elapsed counter always increments; the phase changes only once the
/// counter reaches the current entry's duration. Branches are picked
/// uniformly at random.
pub fn advance_phase<R: Rng + ?Sized>(
    instance: &mut GossipInstance,
    archetype: &Archetype,
    rng: &mut R,
) -> Option<PhaseTransition> {
    if is_terminal(&instance.phase) {
        return None;
    }
    let entry = archetype.phase(&instance.phase)?;

    instance.phase_elapsed_ticks += 1;
    if instance.phase_elapsed_ticks < entry.duration {
        return None;
    }

    let next = match entry.next.as_ref()? {
        PhaseNext::Single(next) => next.clone(),
        PhaseNext::Branch(options) => options.choose(rng)?.clone(),
    };
    if next == instance.phase {
        return None;
    }

    let transition = PhaseTransition {
        from: std::mem::replace(&mut instance.phase, next.clone()),
        to: next,
        elapsed: instance.phase_elapsed_ticks,
    };
    instance.phase_elapsed_ticks = 0;
    Some(transition)
}
