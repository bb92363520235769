use std::collections::BTreeMap;
use std::sync::Arc;

use bevy::prelude::Resource;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    archetype_config::{Archetype, ArchetypeCatalog},
    crew::{CrewId, CrewRecord, CrewRepository},
    effects::{resolve_effects, EffectSink},
    instance::{GossipId, GossipInstance, GossipLedger, ResolvedGossip},
    narrative::{NarrativeRequest, Narrator, TemplateNarrator},
    phase::{advance_phase, is_terminal, ABANDONED_PHASE},
    resources::GossipConfig,
    social::{SocialNetwork, SocialNetworkCache},
    spread::propagate,
    triggers::evaluate_triggers,
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GossipError {
    #[error("configuration error: {reason}")]
    Configuration { reason: String },
    #[error("{gossip} references {crew}, who is not on the roster")]
    DataIntegrity { gossip: GossipId, crew: CrewId },
    #[error("{archetype} is already active for {subject} as {existing}")]
    DuplicateInstance {
        archetype: String,
        subject: CrewId,
        existing: GossipId,
    },
}

impl GossipError {
    pub(crate) fn dangling(gossip: GossipId, crew: CrewId) -> Self {
        GossipError::DataIntegrity { gossip, crew }
    }
}

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub transitions: u32,
    pub exposures: u32,
    pub effect_applications: u32,
    pub created: Vec<GossipId>,
    pub resolved: Vec<GossipId>,
    pub abandoned: Vec<GossipId>,
    /// Instances whose archetype no longer resolves; left untouched this tick.
    pub skipped: Vec<GossipId>,
    pub duplicate_triggers: u32,
}

/// Read-only projection of an active instance for display and reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GossipSummary {
    pub id: GossipId,
    pub archetype_id: String,
    pub archetype_name: String,
    pub phase: String,
    pub spread_percentage: f32,
    pub subjects: BTreeMap<String, Option<CrewId>>,
    pub narrative: Option<String>,
}

/// Owns every piece of mutable gossip state for one simulated world.
#[derive(Resource)]
pub struct GossipEngine {
    catalog: Arc<ArchetypeCatalog>,
    config: GossipConfig,
    ledger: GossipLedger,
    network: SocialNetworkCache,
    rng: ChaCha8Rng,
    narrator: Box<dyn Narrator>,
    current_tick: u64,
    last_crew_size: usize,
}

impl GossipEngine {
    pub fn new(catalog: Arc<ArchetypeCatalog>, config: GossipConfig) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            catalog,
            config,
            ledger: GossipLedger::default(),
            network: SocialNetworkCache::default(),
            narrator: Box::new(TemplateNarrator),
            current_tick: 0,
            last_crew_size: 0,
        }
    }

    pub fn with_narrator(mut self, narrator: Box<dyn Narrator>) -> Self {
        self.narrator = narrator;
        self
    }

    pub fn current_tick(&self) -> u64 {
        self.current_tick
    }

    pub fn catalog(&self) -> &ArchetypeCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &GossipConfig {
        &self.config
    }

    pub fn active(&self) -> impl Iterator<Item = &GossipInstance> {
        self.ledger.active()
    }

    pub fn active_len(&self) -> usize {
        self.ledger.active_len()
    }

    pub fn instance(&self, id: GossipId) -> Option<&GossipInstance> {
        self.ledger.get(id)
    }

    pub fn history(&self) -> &[ResolvedGossip] {
        self.ledger.history()
    }

    pub fn network(&self) -> &SocialNetwork {
        self.network.network()
    }

    /// Force the social network to rebuild on the next tick.
    pub fn invalidate_network(&mut self) {
        self.network.invalidate();
    }

    /// Swap in a new catalog. Active instances whose archetype disappeared are
    /// skipped until it comes back.
    pub fn reload_catalog(&mut self, catalog: Arc<ArchetypeCatalog>) {
        info!(
            target: "gossip_sim::engine",
            archetypes = catalog.len(),
            "gossip.catalog.reloaded"
        );
        self.catalog = catalog;
    }

    /// Create an instance directly, bypassing trigger evaluation.
    ///
    /// Roles not listed start empty. Crew ids are checked against the roster
    /// on the next tick.
    pub fn create_gossip<I, R>(
        &mut self,
        archetype_id: &str,
        subjects: I,
    ) -> Result<GossipId, GossipError>
    where
        I: IntoIterator<Item = (R, CrewId)>,
        R: Into<String>,
    {
        let catalog = Arc::clone(&self.catalog);
        let archetype = catalog.archetype(archetype_id)?;

        let provided: BTreeMap<String, CrewId> = subjects
            .into_iter()
            .map(|(role, crew)| (role.into(), crew))
            .collect();
        if let Some(role) = provided.keys().find(|role| !archetype.has_role(role)) {
            return Err(GossipError::Configuration {
                reason: format!("archetype {} has no subject role '{role}'", archetype.id),
            });
        }
        let primary = provided
            .get(archetype.primary_role())
            .copied()
            .ok_or_else(|| GossipError::Configuration {
                reason: format!(
                    "archetype {} needs a crew id for primary role '{}'",
                    archetype.id,
                    archetype.primary_role()
                ),
            })?;
        if let Some(existing) = self.ledger.find_active(&archetype.id, primary) {
            return Err(GossipError::DuplicateInstance {
                archetype: archetype.id.clone(),
                subject: primary,
                existing,
            });
        }

        let subjects = archetype
            .subject_roles
            .iter()
            .map(|role| (role.clone(), provided.get(role).copied()))
            .collect();
        let id = self.ledger.allocate_id();
        let instance = GossipInstance::new(id, archetype, subjects, primary, self.current_tick);
        info!(
            target: "gossip_sim::engine",
            gossip = %id,
            archetype = %archetype.id,
            subject = %primary,
            tick = self.current_tick,
            "gossip.created.manual"
        );
        self.ledger.insert(instance);
        Ok(id)
    }

    /// Advance every active instance by one tick, then look for new gossip
    /// and retire finished instances.
    pub fn tick(&mut self, crew: &dyn CrewRepository, sink: &mut dyn EffectSink) -> TickReport {
        self.current_tick += 1;
        let tick = self.current_tick;
        let mut report = TickReport {
            tick,
            ..TickReport::default()
        };
        sink.begin_tick(tick);

        let roster: BTreeMap<CrewId, CrewRecord> = crew
            .all_crew()
            .into_iter()
            .map(|record| (record.id, record))
            .collect();
        self.last_crew_size = roster.len();
        self.network
            .refresh(roster.values(), self.config.relationship_edge_threshold);
        let catalog = Arc::clone(&self.catalog);

        let mut runnable = self.integrity_pass(&catalog, &roster, &mut report);

        for id in &runnable {
            let Some(instance) = self.ledger.get_mut(*id) else {
                continue;
            };
            let Ok(archetype) = catalog.archetype(&instance.archetype_id) else {
                continue;
            };
            if let Some(transition) = advance_phase(instance, archetype, &mut self.rng) {
                report.transitions += 1;
                debug!(
                    target: "gossip_sim::engine",
                    gossip = %instance.id,
                    from = %transition.from,
                    to = %transition.to,
                    elapsed = transition.elapsed,
                    tick,
                    "gossip.phase.transition"
                );
            }
            if instance.needs_narrative() {
                refresh_narrative(self.narrator.as_ref(), archetype, instance, &roster);
            }
        }

        let settings = self.config.spread_settings();
        let network = self.network.network();
        let mut failures = Vec::new();
        for id in &runnable {
            let Some(instance) = self.ledger.get_mut(*id) else {
                continue;
            };
            if is_terminal(&instance.phase) {
                continue;
            }
            let Ok(archetype) = catalog.archetype(&instance.archetype_id) else {
                continue;
            };
            match propagate(
                instance,
                archetype,
                network,
                &roster,
                settings,
                tick,
                &mut self.rng,
            ) {
                Ok(outcome) => report.exposures += outcome.exposures,
                Err(err) => failures.push((*id, err)),
            }
        }
        for (id, err) in failures {
            self.abandon(id, &err, &mut report);
        }
        runnable.retain(|id| self.ledger.get(*id).is_some());

        for id in &runnable {
            let Some(instance) = self.ledger.get_mut(*id) else {
                continue;
            };
            let Ok(archetype) = catalog.archetype(&instance.archetype_id) else {
                continue;
            };
            let resolved = resolve_effects(
                &instance.phase,
                &archetype.gameplay_effects,
                instance.believers().len(),
                roster.len(),
                self.config.spread_floor,
                self.config.cascade_factor,
            );
            if !resolved.primary.is_empty() {
                for subject in instance.subject_ids() {
                    sink.apply_effects(subject, &resolved.primary);
                    report.effect_applications += 1;
                }
                instance.accumulated_effects.accumulate(&resolved.primary);
            }
            if !resolved.cascade.is_empty() {
                for believer in instance.believers() {
                    sink.apply_effects(*believer, &resolved.cascade);
                    report.effect_applications += 1;
                }
            }
        }

        if self.config.triggers_enabled {
            self.spawn_triggered(&catalog, &roster, &mut report);
        }

        let retired = self.ledger.retire_where(tick, is_terminal);
        for resolved in &self.ledger.history()[self.ledger.history().len() - retired.len()..] {
            info!(
                target: "gossip_sim::engine",
                gossip = %resolved.instance.id,
                archetype = %resolved.instance.archetype_id,
                final_phase = %resolved.final_phase,
                believers = resolved.instance.believers().len(),
                tick,
                "gossip.resolved"
            );
        }
        report.resolved = retired;

        debug!(
            target: "gossip_sim::engine",
            tick,
            active = self.ledger.active_len(),
            transitions = report.transitions,
            exposures = report.exposures,
            created = report.created.len(),
            resolved = report.resolved.len(),
            abandoned = report.abandoned.len(),
            "gossip.tick.complete"
        );
        report
    }

    /// Read-only view of every active instance, ascending by id.
    pub fn gossip_summary(&self) -> Vec<GossipSummary> {
        self.ledger
            .active()
            .map(|instance| {
                let archetype_name = self
                    .catalog
                    .archetype(&instance.archetype_id)
                    .map(|archetype| archetype.name.clone())
                    .unwrap_or_else(|_| instance.archetype_id.clone());
                let spread_percentage = if self.last_crew_size == 0 {
                    0.0
                } else {
                    (instance.believers().len() as f32 / self.last_crew_size as f32 * 100.0)
                        .min(100.0)
                };
                GossipSummary {
                    id: instance.id,
                    archetype_id: instance.archetype_id.clone(),
                    archetype_name,
                    phase: instance.phase.clone(),
                    spread_percentage,
                    subjects: instance.subjects.clone(),
                    narrative: instance.narrative.clone(),
                }
            })
            .collect()
    }

    /// Split active instances into runnable ids. Unknown archetypes are
    /// skipped; instances in a phase their archetype no longer defines, or
    /// referencing missing crew, are abandoned.
    fn integrity_pass(
        &mut self,
        catalog: &ArchetypeCatalog,
        roster: &BTreeMap<CrewId, CrewRecord>,
        report: &mut TickReport,
    ) -> Vec<GossipId> {
        let mut runnable = Vec::new();
        let mut broken = Vec::new();
        for instance in self.ledger.active() {
            let archetype = match catalog.archetype(&instance.archetype_id) {
                Ok(archetype) => archetype,
                Err(err) => {
                    warn!(
                        target: "gossip_sim::engine",
                        gossip = %instance.id,
                        error = %err,
                        "gossip.tick.skipped"
                    );
                    report.skipped.push(instance.id);
                    continue;
                }
            };
            if !archetype.has_phase(&instance.phase) {
                broken.push((
                    instance.id,
                    GossipError::Configuration {
                        reason: format!(
                            "archetype {} no longer defines phase {}",
                            archetype.id, instance.phase
                        ),
                    },
                ));
                continue;
            }
            match instance
                .referenced_crew()
                .into_iter()
                .find(|crew| !roster.contains_key(crew))
            {
                Some(crew) => broken.push((instance.id, GossipError::dangling(instance.id, crew))),
                None => runnable.push(instance.id),
            }
        }
        for (id, err) in broken {
            self.abandon(id, &err, report);
        }
        runnable
    }

    fn spawn_triggered(
        &mut self,
        catalog: &ArchetypeCatalog,
        roster: &BTreeMap<CrewId, CrewRecord>,
        report: &mut TickReport,
    ) {
        let (triggered, scan) = evaluate_triggers(
            catalog,
            roster,
            &self.ledger,
            self.config.max_active_instances,
            &mut self.rng,
        );
        report.duplicate_triggers = scan.duplicates;
        if scan.capped > 0 {
            debug!(
                target: "gossip_sim::triggers",
                capped = scan.capped,
                limit = self.config.max_active_instances,
                "gossip.trigger.capped"
            );
        }

        for candidate in triggered {
            let archetype = match catalog.archetype(&candidate.archetype_id) {
                Ok(archetype) => archetype,
                Err(err) => {
                    warn!(
                        target: "gossip_sim::triggers",
                        error = %err,
                        "gossip.trigger.unknown_archetype"
                    );
                    continue;
                }
            };
            let id = self.ledger.allocate_id();
            let mut instance = GossipInstance::new(
                id,
                archetype,
                candidate.subjects,
                candidate.primary_subject,
                self.current_tick,
            );
            refresh_narrative(self.narrator.as_ref(), archetype, &mut instance, roster);
            info!(
                target: "gossip_sim::triggers",
                gossip = %id,
                archetype = %archetype.id,
                subject = %candidate.primary_subject,
                chance = candidate.chance,
                tick = self.current_tick,
                "gossip.created.triggered"
            );
            self.ledger.insert(instance);
            report.created.push(id);
        }
    }

    fn abandon(&mut self, id: GossipId, err: &GossipError, report: &mut TickReport) {
        warn!(
            target: "gossip_sim::engine",
            gossip = %id,
            error = %err,
            tick = self.current_tick,
            "gossip.abandoned"
        );
        if self
            .ledger
            .archive(id, self.current_tick, ABANDONED_PHASE)
            .is_some()
        {
            report.abandoned.push(id);
        }
    }
}

fn refresh_narrative(
    narrator: &dyn Narrator,
    archetype: &Archetype,
    instance: &mut GossipInstance,
    roster: &BTreeMap<CrewId, CrewRecord>,
) {
    let subjects = instance
        .subjects
        .iter()
        .map(|(role, crew)| {
            let name = crew
                .and_then(|id| roster.get(&id))
                .map(|record| record.name.clone())
                .unwrap_or_else(|| "someone".to_string());
            (role.clone(), name)
        })
        .collect();
    let text = narrator.narrate(&NarrativeRequest {
        archetype,
        phase: &instance.phase,
        subjects,
        salt: instance.id.0,
    });
    instance.narrative = Some(text);
    instance.narrative_phase = Some(instance.phase.clone());
}
