use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::archetype_config::Archetype;
use crate::crew::CrewId;
use crate::effects::EffectMap;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct GossipId(pub u64);

impl fmt::Display for GossipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gossip-{}", self.0)
    }
}

/// One exposure of a crew member to an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpreadEvent {
    pub from: CrewId,
    pub to: CrewId,
    pub tick: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GossipInstance {
    pub id: GossipId,
    pub archetype_id: String,
    pub subjects: BTreeMap<String, Option<CrewId>>,
    pub primary_subject: CrewId,
    pub phase: String,
    pub phase_elapsed_ticks: u32,
    believers: BTreeSet<CrewId>,
    deniers: BTreeSet<CrewId>,
    spread_log: Vec<SpreadEvent>,
    pub created_at_tick: u64,
    pub accumulated_effects: EffectMap,
    /// Latest narrative text and the phase it describes.
    pub narrative: Option<String>,
    pub narrative_phase: Option<String>,
}

impl GossipInstance {
    /// Start an instance in the archetype's initial phase.
    ///
    /// The primary subject always knows about their own situation, so they
    /// begin as the only believer.
    pub fn new(
        id: GossipId,
        archetype: &Archetype,
        subjects: BTreeMap<String, Option<CrewId>>,
        primary_subject: CrewId,
        created_at_tick: u64,
    ) -> Self {
        Self {
            id,
            archetype_id: archetype.id.clone(),
            subjects,
            primary_subject,
            phase: archetype.initial_phase().phase.clone(),
            phase_elapsed_ticks: 0,
            believers: BTreeSet::from([primary_subject]),
            deniers: BTreeSet::new(),
            spread_log: Vec::new(),
            created_at_tick,
            accumulated_effects: EffectMap::new(),
            narrative: None,
            narrative_phase: None,
        }
    }

    pub fn believers(&self) -> &BTreeSet<CrewId> {
        &self.believers
    }

    pub fn deniers(&self) -> &BTreeSet<CrewId> {
        &self.deniers
    }

    pub fn spread_log(&self) -> &[SpreadEvent] {
        &self.spread_log
    }

    pub fn has_reacted(&self, crew: CrewId) -> bool {
        self.believers.contains(&crew) || self.deniers.contains(&crew)
    }

    /// Record an exposure. The crew member joins exactly one of the two sets;
    /// members who already reacted keep their first reaction.
    pub fn record_exposure(&mut self, from: CrewId, to: CrewId, tick: u64, believes: bool) {
        self.spread_log.push(SpreadEvent { from, to, tick });
        if self.has_reacted(to) {
            return;
        }
        if believes {
            self.believers.insert(to);
        } else {
            self.deniers.insert(to);
        }
    }

    /// Named subjects with a crew id assigned, in role order.
    pub fn subject_ids(&self) -> impl Iterator<Item = CrewId> + '_ {
        self.subjects.values().filter_map(|slot| *slot)
    }

    /// Every crew id this instance refers to.
    pub fn referenced_crew(&self) -> BTreeSet<CrewId> {
        self.subject_ids()
            .chain(std::iter::once(self.primary_subject))
            .chain(self.believers.iter().copied())
            .chain(self.deniers.iter().copied())
            .collect()
    }

    pub fn needs_narrative(&self) -> bool {
        self.narrative_phase.as_deref() != Some(self.phase.as_str())
    }
}

/// An instance that left the active set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedGossip {
    pub instance: GossipInstance,
    pub resolved_at_tick: u64,
    pub final_phase: String,
}

/// Active instances keyed by id plus the append-only archive.
#[derive(Debug, Clone, Default)]
pub struct GossipLedger {
    active: BTreeMap<GossipId, GossipInstance>,
    history: Vec<ResolvedGossip>,
    next_id: u64,
}

impl GossipLedger {
    pub fn allocate_id(&mut self) -> GossipId {
        self.next_id += 1;
        GossipId(self.next_id)
    }

    pub fn insert(&mut self, instance: GossipInstance) {
        self.active.insert(instance.id, instance);
    }

    pub fn get(&self, id: GossipId) -> Option<&GossipInstance> {
        self.active.get(&id)
    }

    pub fn get_mut(&mut self, id: GossipId) -> Option<&mut GossipInstance> {
        self.active.get_mut(&id)
    }

    pub fn active(&self) -> impl Iterator<Item = &GossipInstance> {
        self.active.values()
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn history(&self) -> &[ResolvedGossip] {
        &self.history
    }

    pub fn find_active(&self, archetype_id: &str, primary: CrewId) -> Option<GossipId> {
        self.active
            .values()
            .find(|instance| instance.archetype_id == archetype_id && instance.primary_subject == primary)
            .map(|instance| instance.id)
    }

    /// Move an instance into the archive, forcing its final phase.
    pub fn archive(&mut self, id: GossipId, tick: u64, final_phase: &str) -> Option<&ResolvedGossip> {
        let mut instance = self.active.remove(&id)?;
        instance.phase = final_phase.to_string();
        self.history.push(ResolvedGossip {
            instance,
            resolved_at_tick: tick,
            final_phase: final_phase.to_string(),
        });
        self.history.last()
    }

    /// Archive every instance whose phase satisfies `is_terminal`.
    pub fn retire_where(&mut self, tick: u64, is_terminal: impl Fn(&str) -> bool) -> Vec<GossipId> {
        let finished: Vec<(GossipId, String)> = self
            .active
            .values()
            .filter(|instance| is_terminal(&instance.phase))
            .map(|instance| (instance.id, instance.phase.clone()))
            .collect();
        for (id, phase) in &finished {
            self.archive(*id, tick, phase);
        }
        finished.into_iter().map(|(id, _)| id).collect()
    }
}
