//! Gameplay effect tables and the scaling rules that turn an instance's
//! phase and spread into concrete per-crew deltas.

use std::collections::BTreeMap;
use std::fmt;

use bevy::prelude::Resource;
use serde::{Deserialize, Serialize};

use crate::crew::CrewId;

/// Every stat or flag a gossip instance is allowed to touch.
///
/// Unknown keys in the catalog are a load-time parse error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKey {
    Stress,
    Morale,
    Focus,
    Performance,
    Reputation,
    Productivity,
    TeamCohesion,
    Chemistry,
    Distraction,
    Loyalty,
    SeekingTransfer,
    ConsideringRetirement,
    UnderReview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectKind {
    Numeric,
    Flag,
}

impl EffectKey {
    pub fn kind(self) -> EffectKind {
        match self {
            EffectKey::SeekingTransfer
            | EffectKey::ConsideringRetirement
            | EffectKey::UnderReview => EffectKind::Flag,
            _ => EffectKind::Numeric,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EffectKey::Stress => "stress",
            EffectKey::Morale => "morale",
            EffectKey::Focus => "focus",
            EffectKey::Performance => "performance",
            EffectKey::Reputation => "reputation",
            EffectKey::Productivity => "productivity",
            EffectKey::TeamCohesion => "team_cohesion",
            EffectKey::Chemistry => "chemistry",
            EffectKey::Distraction => "distraction",
            EffectKey::Loyalty => "loyalty",
            EffectKey::SeekingTransfer => "seeking_transfer",
            EffectKey::ConsideringRetirement => "considering_retirement",
            EffectKey::UnderReview => "under_review",
        }
    }
}

impl fmt::Display for EffectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EffectValue {
    Flag(bool),
    Number(f32),
}

impl EffectValue {
    pub fn kind(self) -> EffectKind {
        match self {
            EffectValue::Flag(_) => EffectKind::Flag,
            EffectValue::Number(_) => EffectKind::Numeric,
        }
    }

    pub fn as_number(self) -> Option<f32> {
        match self {
            EffectValue::Number(value) => Some(value),
            EffectValue::Flag(_) => None,
        }
    }

    fn scaled(self, factor: f32) -> Self {
        match self {
            EffectValue::Number(value) => EffectValue::Number(value * factor),
            flag => flag,
        }
    }

    fn accumulate(&mut self, other: EffectValue) {
        match (self, other) {
            (EffectValue::Number(total), EffectValue::Number(delta)) => *total += delta,
            (EffectValue::Flag(total), EffectValue::Flag(flag)) => *total |= flag,
            (slot, value) => *slot = value,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectMap(BTreeMap<EffectKey, EffectValue>);

impl EffectMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: EffectKey, value: EffectValue) -> Self {
        self.0.insert(key, value);
        self
    }

    pub fn get(&self, key: EffectKey) -> Option<EffectValue> {
        self.0.get(&key).copied()
    }

    pub fn number(&self, key: EffectKey) -> Option<f32> {
        self.get(key).and_then(EffectValue::as_number)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EffectKey, EffectValue)> + '_ {
        self.0.iter().map(|(key, value)| (*key, *value))
    }

    /// Multiply every numeric entry by `factor`; flags pass through.
    pub fn scaled(&self, factor: f32) -> EffectMap {
        EffectMap(
            self.0
                .iter()
                .map(|(key, value)| (*key, value.scaled(factor)))
                .collect(),
        )
    }

    /// Sum numbers and OR flags from `other` into this map.
    pub fn accumulate(&mut self, other: &EffectMap) {
        for (key, value) in other.iter() {
            self.0
                .entry(key)
                .and_modify(|slot| slot.accumulate(value))
                .or_insert(value);
        }
    }

    /// Entries whose value type does not match the key's declared kind.
    pub fn mismatched_keys(&self) -> Vec<EffectKey> {
        self.0
            .iter()
            .filter(|(key, value)| key.kind() != value.kind())
            .map(|(key, _)| *key)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectBucket {
    Positive,
    Negative,
    Direct,
    Hidden,
    Cascade,
}

const VISIBLE_PHASES: &[&str] = &[
    "REVEALED",
    "OBVIOUS",
    "CRISIS",
    "CONFRONTATION",
    "CONFESSION",
    "BREAKDOWN",
    "ESCALATION",
    "EXPOSED",
];

const RESOLUTION_PHASES: &[&str] = &["RESOLVED", "ACCEPTED", "STABLE", "INTEGRATED", "RECONCILED"];

/// Candidate buckets for a phase, most specific first.
pub fn bucket_preference(phase: &str) -> &'static [EffectBucket] {
    if VISIBLE_PHASES.contains(&phase) {
        &[EffectBucket::Negative, EffectBucket::Direct]
    } else if RESOLUTION_PHASES.contains(&phase) {
        &[EffectBucket::Positive]
    } else {
        &[EffectBucket::Hidden, EffectBucket::Direct]
    }
}

/// Pick the first bucket from the phase's preference list that the table defines.
pub fn classify_phase(
    phase: &str,
    table: &BTreeMap<EffectBucket, EffectMap>,
) -> Option<EffectBucket> {
    bucket_preference(phase)
        .iter()
        .copied()
        .find(|bucket| table.contains_key(bucket))
}

/// `floor + (1 - floor) * spread_fraction`, with the fraction clamped to `[0, 1]`.
pub fn spread_scaling(believers: usize, crew_size: usize, floor: f32) -> f32 {
    let fraction = if crew_size == 0 {
        0.0
    } else {
        (believers as f32 / crew_size as f32).clamp(0.0, 1.0)
    };
    floor + (1.0 - floor) * fraction
}

/// Effects resolved for one instance on one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEffects {
    pub bucket: Option<EffectBucket>,
    pub scaling: f32,
    pub primary: EffectMap,
    pub cascade: EffectMap,
}

pub fn resolve_effects(
    phase: &str,
    table: &BTreeMap<EffectBucket, EffectMap>,
    believers: usize,
    crew_size: usize,
    floor: f32,
    cascade_factor: f32,
) -> ResolvedEffects {
    let scaling = spread_scaling(believers, crew_size, floor);
    let bucket = classify_phase(phase, table);
    let primary = bucket
        .and_then(|bucket| table.get(&bucket))
        .map(|effects| effects.scaled(scaling))
        .unwrap_or_default();
    let cascade = table
        .get(&EffectBucket::Cascade)
        .map(|effects| effects.scaled(scaling * cascade_factor))
        .unwrap_or_default();
    ResolvedEffects {
        bucket,
        scaling,
        primary,
        cascade,
    }
}

/// Receiver for the deltas the engine produces; owned by the crew simulation.
pub trait EffectSink {
    /// Called by the engine once per tick, before any effect is applied.
    fn begin_tick(&mut self, _tick: u64) {}

    fn apply_effects(&mut self, crew: CrewId, effects: &EffectMap);
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppliedEffect {
    pub tick: u64,
    pub crew: CrewId,
    pub effects: EffectMap,
}

/// Sink that records every application and keeps running per-crew totals.
#[derive(Resource, Debug, Clone, Default)]
pub struct EffectLedger {
    current_tick: u64,
    totals: BTreeMap<CrewId, EffectMap>,
    journal: Vec<AppliedEffect>,
}

impl EffectLedger {
    pub fn totals(&self, crew: CrewId) -> Option<&EffectMap> {
        self.totals.get(&crew)
    }

    pub fn journal(&self) -> &[AppliedEffect] {
        &self.journal
    }
}

impl EffectSink for EffectLedger {
    /// The journal only holds the latest tick's entries.
    fn begin_tick(&mut self, tick: u64) {
        self.current_tick = tick;
        self.journal.clear();
    }

    fn apply_effects(&mut self, crew: CrewId, effects: &EffectMap) {
        self.totals.entry(crew).or_default().accumulate(effects);
        self.journal.push(AppliedEffect {
            tick: self.current_tick,
            crew,
            effects: effects.clone(),
        });
    }
}
