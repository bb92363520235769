use std::{
    collections::{BTreeMap, BTreeSet, HashSet, VecDeque},
    env, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use bevy::prelude::Resource;
use serde::Deserialize;
use thiserror::Error;

use crate::{
    crew::CrewRecord,
    effects::{EffectBucket, EffectMap},
    engine::GossipError,
    phase::is_terminal,
    triggers::{CrewAttribute, TriggerSpec},
};

pub const BUILTIN_GOSSIP_ARCHETYPES: &str = include_str!("data/gossip_archetypes.json");

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ArchetypeCatalog {
    pub version: u32,
    archetypes: Vec<Archetype>,
}

impl ArchetypeCatalog {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            Self::from_json_str(BUILTIN_GOSSIP_ARCHETYPES)
                .expect("builtin gossip archetype catalog should validate"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, ArchetypeCatalogError> {
        let mut catalog: ArchetypeCatalog = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn from_file(path: &Path) -> Result<Self, ArchetypeCatalogError> {
        let contents = fs::read_to_string(path).map_err(|source| ArchetypeCatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    /// Look up an archetype; ids are matched case-insensitively.
    pub fn archetype(&self, id: &str) -> Result<&Archetype, GossipError> {
        let normalized = id.to_ascii_lowercase();
        self.archetypes
            .iter()
            .find(|entry| entry.id == normalized)
            .ok_or_else(|| GossipError::Configuration {
                reason: format!("unknown gossip archetype '{id}'"),
            })
    }

    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archetypes.is_empty()
    }

    fn validate(&mut self) -> Result<(), ArchetypeCatalogError> {
        let mut seen = HashSet::new();
        for archetype in &mut self.archetypes {
            archetype.normalize();
            if !seen.insert(archetype.id.clone()) {
                return Err(ArchetypeCatalogError::Duplicate {
                    id: archetype.id.clone(),
                });
            }
            archetype.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Archetype {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub template: String,
    pub subject_roles: Vec<String>,
    pub phase_graph: Vec<PhaseEntry>,
    pub spread_mechanics: SpreadMechanics,
    #[serde(default)]
    pub gameplay_effects: BTreeMap<EffectBucket, EffectMap>,
    #[serde(default)]
    pub trigger: Option<TriggerSpec>,
    #[serde(default)]
    pub llm_hooks: LlmHooks,
    #[serde(default)]
    pub fallback_narratives: BTreeMap<String, String>,
}

impl Archetype {
    pub fn initial_phase(&self) -> &PhaseEntry {
        // validated non-empty at load
        &self.phase_graph[0]
    }

    pub fn phase(&self, name: &str) -> Option<&PhaseEntry> {
        self.phase_graph.iter().find(|entry| entry.phase == name)
    }

    pub fn has_phase(&self, name: &str) -> bool {
        self.phase(name).is_some()
    }

    pub fn primary_role(&self) -> &str {
        &self.subject_roles[0]
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.subject_roles.iter().any(|candidate| candidate == role)
    }

    /// Substitute `{role}` placeholders with the given display names.
    pub fn render_template(&self, names: &BTreeMap<String, String>) -> String {
        self.render_template_line(&self.template, names)
    }

    pub fn render_template_line(&self, line: &str, names: &BTreeMap<String, String>) -> String {
        let mut rendered = line.to_string();
        for (role, name) in names {
            rendered = rendered.replace(&format!("{{{role}}}"), name);
        }
        rendered
    }

    fn normalize(&mut self) {
        self.id.make_ascii_lowercase();
        self.phase_graph
            .iter_mut()
            .for_each(|entry| entry.phase.make_ascii_uppercase());
        for entry in &mut self.phase_graph {
            if let Some(next) = entry.next.as_mut() {
                next.normalize();
            }
        }
        let bonuses = &mut self.spread_mechanics.bonuses;
        bonuses.phases = std::mem::take(&mut bonuses.phases)
            .into_iter()
            .map(|(phase, bonus)| (phase.to_ascii_uppercase(), bonus))
            .collect();
        self.fallback_narratives = std::mem::take(&mut self.fallback_narratives)
            .into_iter()
            .map(|(phase, line)| (phase.to_ascii_uppercase(), line))
            .collect();
    }

    fn validate(&self) -> Result<(), ArchetypeCatalogError> {
        let archetype = || self.id.clone();

        if self.subject_roles.is_empty() {
            return Err(ArchetypeCatalogError::NoSubjectRoles { archetype: archetype() });
        }
        if self.phase_graph.is_empty() {
            return Err(ArchetypeCatalogError::EmptyPhaseGraph { archetype: archetype() });
        }

        let mut names = BTreeSet::new();
        for entry in &self.phase_graph {
            if !names.insert(entry.phase.as_str()) {
                return Err(ArchetypeCatalogError::DuplicatePhase {
                    archetype: archetype(),
                    phase: entry.phase.clone(),
                });
            }
        }

        for entry in &self.phase_graph {
            let successors = entry.successors();
            for next in &successors {
                if !names.contains(next) {
                    return Err(ArchetypeCatalogError::UndefinedPhase {
                        archetype: archetype(),
                        phase: entry.phase.clone(),
                        next: (*next).to_string(),
                    });
                }
            }
            if is_terminal(&entry.phase) {
                if !successors.is_empty() {
                    return Err(ArchetypeCatalogError::TerminalWithSuccessor {
                        archetype: archetype(),
                        phase: entry.phase.clone(),
                    });
                }
                continue;
            }
            if successors.is_empty() {
                return Err(ArchetypeCatalogError::DeadEnd {
                    archetype: archetype(),
                    phase: entry.phase.clone(),
                });
            }
            if entry.duration == 0 {
                return Err(ArchetypeCatalogError::ZeroDuration {
                    archetype: archetype(),
                    phase: entry.phase.clone(),
                });
            }
        }

        let reachable = self.reachable_from_initial();
        if let Some(entry) = self
            .phase_graph
            .iter()
            .find(|entry| !reachable.contains(entry.phase.as_str()))
        {
            return Err(ArchetypeCatalogError::Unreachable {
                archetype: archetype(),
                phase: entry.phase.clone(),
            });
        }

        let resolving = self.phases_reaching_terminal();
        if let Some(entry) = self
            .phase_graph
            .iter()
            .find(|entry| !resolving.contains(entry.phase.as_str()))
        {
            return Err(ArchetypeCatalogError::NoTerminalPath {
                archetype: archetype(),
                phase: entry.phase.clone(),
            });
        }

        let chance = self.spread_mechanics.base_spread_chance;
        if !(0.0..=1.0).contains(&chance) {
            return Err(ArchetypeCatalogError::SpreadChanceOutOfRange {
                archetype: archetype(),
                value: chance,
            });
        }

        for phase in self.spread_mechanics.bonuses.phases.keys() {
            if !names.contains(phase.as_str()) {
                return Err(ArchetypeCatalogError::UnknownPhaseReference {
                    archetype: archetype(),
                    phase: phase.clone(),
                    field: "spread_mechanics.bonuses.phases",
                });
            }
        }
        for phase in self.fallback_narratives.keys() {
            if !names.contains(phase.as_str()) {
                return Err(ArchetypeCatalogError::UnknownPhaseReference {
                    archetype: archetype(),
                    phase: phase.clone(),
                    field: "fallback_narratives",
                });
            }
        }

        for (bucket, effects) in &self.gameplay_effects {
            if let Some(key) = effects.mismatched_keys().first() {
                return Err(ArchetypeCatalogError::EffectTypeMismatch {
                    archetype: archetype(),
                    bucket: *bucket,
                    key: key.to_string(),
                });
            }
        }

        if let Some(trigger) = &self.trigger {
            self.validate_trigger(trigger)?;
        }

        Ok(())
    }

    fn validate_trigger(&self, trigger: &TriggerSpec) -> Result<(), ArchetypeCatalogError> {
        let invalid = |reason: &str| ArchetypeCatalogError::InvalidTrigger {
            archetype: self.id.clone(),
            reason: reason.to_string(),
        };
        let paired = self.subject_roles.len() >= 2;
        if paired && trigger.partner.is_none() {
            return Err(invalid("multi-subject archetype needs a partner rule"));
        }
        if !paired && trigger.partner.is_some() {
            return Err(invalid("partner rule on a single-subject archetype"));
        }
        let uses_chemistry = trigger
            .conditions
            .iter()
            .any(|condition| condition.attribute == CrewAttribute::Chemistry);
        if uses_chemistry && !paired {
            return Err(invalid("chemistry condition without a partner"));
        }
        if !(0.0..=1.0).contains(&trigger.baseline) {
            return Err(invalid("baseline outside [0, 1]"));
        }
        if trigger
            .conditions
            .iter()
            .any(|condition| condition.multiplier < 0.0)
        {
            return Err(invalid("negative multiplier"));
        }
        Ok(())
    }

    fn reachable_from_initial(&self) -> BTreeSet<&str> {
        let mut reached = BTreeSet::new();
        let mut queue = VecDeque::from([self.initial_phase().phase.as_str()]);
        while let Some(phase) = queue.pop_front() {
            if !reached.insert(phase) {
                continue;
            }
            if let Some(entry) = self.phase(phase) {
                queue.extend(entry.successors());
            }
        }
        reached
    }

    fn phases_reaching_terminal(&self) -> BTreeSet<&str> {
        let mut resolving: BTreeSet<&str> = self
            .phase_graph
            .iter()
            .filter(|entry| is_terminal(&entry.phase))
            .map(|entry| entry.phase.as_str())
            .collect();
        loop {
            let before = resolving.len();
            for entry in &self.phase_graph {
                if entry
                    .successors()
                    .iter()
                    .any(|next| resolving.contains(next))
                {
                    resolving.insert(entry.phase.as_str());
                }
            }
            if resolving.len() == before {
                return resolving;
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhaseEntry {
    pub phase: String,
    #[serde(default)]
    pub duration: u32,
    #[serde(default)]
    pub next: Option<PhaseNext>,
}

impl PhaseEntry {
    /// Successor phases, excluding a self-reference.
    pub fn successors(&self) -> Vec<&str> {
        let candidates: Vec<&str> = match &self.next {
            None => Vec::new(),
            Some(PhaseNext::Single(next)) => vec![next.as_str()],
            Some(PhaseNext::Branch(options)) => options.iter().map(String::as_str).collect(),
        };
        candidates
            .into_iter()
            .filter(|next| *next != self.phase)
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PhaseNext {
    Single(String),
    Branch(Vec<String>),
}

impl PhaseNext {
    fn normalize(&mut self) {
        match self {
            PhaseNext::Single(next) => next.make_ascii_uppercase(),
            PhaseNext::Branch(options) => options
                .iter_mut()
                .for_each(|next| next.make_ascii_uppercase()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpreadMechanics {
    #[serde(default)]
    pub primary_spreader_roles: Vec<String>,
    pub base_spread_chance: f32,
    #[serde(default)]
    pub bonuses: SpreadBonuses,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpreadBonuses {
    pub gossip_trait: f32,
    pub discrete_trait: f32,
    pub phases: BTreeMap<String, f32>,
}

impl Default for SpreadBonuses {
    fn default() -> Self {
        Self {
            gossip_trait: 0.2,
            discrete_trait: -0.3,
            phases: BTreeMap::new(),
        }
    }
}

impl SpreadBonuses {
    pub fn trait_bonus(&self, spreader: &CrewRecord) -> f32 {
        let mut bonus = 0.0;
        if spreader.has_trait("gossip") {
            bonus += self.gossip_trait;
        }
        if spreader.has_trait("discrete") {
            bonus += self.discrete_trait;
        }
        bonus
    }

    pub fn phase_bonus(&self, phase: &str) -> f32 {
        self.phases.get(phase).copied().unwrap_or(0.0)
    }
}

/// Phrase fragments handed to the narrative collaborator.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LlmHooks {
    pub behaviors: Vec<String>,
    pub complications: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ArchetypeCatalogError {
    #[error("failed to parse gossip archetype catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read gossip archetype catalog from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("duplicate gossip archetype id {id}")]
    Duplicate { id: String },
    #[error("archetype {archetype} declares no subject roles")]
    NoSubjectRoles { archetype: String },
    #[error("archetype {archetype} has an empty phase graph")]
    EmptyPhaseGraph { archetype: String },
    #[error("archetype {archetype} declares phase {phase} more than once")]
    DuplicatePhase { archetype: String, phase: String },
    #[error("archetype {archetype} phase {phase} transitions to undefined phase {next}")]
    UndefinedPhase {
        archetype: String,
        phase: String,
        next: String,
    },
    #[error("archetype {archetype} terminal phase {phase} declares a successor")]
    TerminalWithSuccessor { archetype: String, phase: String },
    #[error("archetype {archetype} phase {phase} has no successor and is not terminal")]
    DeadEnd { archetype: String, phase: String },
    #[error("archetype {archetype} phase {phase} must last at least one tick")]
    ZeroDuration { archetype: String, phase: String },
    #[error("archetype {archetype} phase {phase} is unreachable from the initial phase")]
    Unreachable { archetype: String, phase: String },
    #[error("archetype {archetype} phase {phase} never reaches a terminal phase")]
    NoTerminalPath { archetype: String, phase: String },
    #[error("archetype {archetype} base spread chance {value} is outside [0, 1]")]
    SpreadChanceOutOfRange { archetype: String, value: f32 },
    #[error("archetype {archetype} references undefined phase {phase} in {field}")]
    UnknownPhaseReference {
        archetype: String,
        phase: String,
        field: &'static str,
    },
    #[error("archetype {archetype} effect {key} in bucket {bucket:?} has the wrong value type")]
    EffectTypeMismatch {
        archetype: String,
        bucket: EffectBucket,
        key: String,
    },
    #[error("archetype {archetype} has an invalid trigger: {reason}")]
    InvalidTrigger { archetype: String, reason: String },
}

#[derive(Resource, Debug, Clone)]
pub struct ArchetypeCatalogHandle(Arc<ArchetypeCatalog>);

impl ArchetypeCatalogHandle {
    pub fn new(catalog: Arc<ArchetypeCatalog>) -> Self {
        Self(catalog)
    }

    pub fn get(&self) -> Arc<ArchetypeCatalog> {
        Arc::clone(&self.0)
    }

    pub fn replace(&mut self, catalog: Arc<ArchetypeCatalog>) {
        self.0 = catalog;
    }
}

#[derive(Resource, Debug, Clone)]
pub struct ArchetypeCatalogMetadata {
    path: Option<PathBuf>,
}

impl ArchetypeCatalogMetadata {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }
}

pub fn load_gossip_archetypes_from_env() -> (Arc<ArchetypeCatalog>, ArchetypeCatalogMetadata) {
    load_with_env_paths(
        "GOSSIP_ARCHETYPES_PATH",
        "gossip_archetypes",
        ArchetypeCatalog::builtin,
        ArchetypeCatalog::from_file,
        ArchetypeCatalogMetadata::new,
    )
}

pub(crate) fn load_with_env_paths<T, E, M>(
    env_var: &str,
    label: &'static str,
    builtin: fn() -> Arc<T>,
    from_file: fn(&Path) -> Result<T, E>,
    metadata_ctor: fn(Option<PathBuf>) -> M,
) -> (Arc<T>, M)
where
    E: std::fmt::Display,
{
    let override_path = env::var(env_var).ok().map(PathBuf::from);
    let default_path =
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(format!("src/data/{label}.json"));
    let path = override_path.unwrap_or(default_path);

    match from_file(&path) {
        Ok(cfg) => {
            tracing::info!(
                target: "gossip_sim::config",
                path = %path.display(),
                "{label}.loaded=file"
            );
            return (Arc::new(cfg), metadata_ctor(Some(path)));
        }
        Err(err) => {
            tracing::warn!(
                target: "gossip_sim::config",
                path = %path.display(),
                error = %err,
                "{label}.load_failed"
            );
        }
    }

    tracing::info!(
        target: "gossip_sim::config",
        "{label}.loaded=builtin"
    );
    (builtin(), metadata_ctor(None))
}
