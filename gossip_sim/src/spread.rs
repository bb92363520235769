use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;

use crate::archetype_config::Archetype;
use crate::crew::{CrewId, CrewRecord};
use crate::engine::GossipError;
use crate::instance::GossipInstance;
use crate::social::SocialNetwork;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpreadSettings {
    pub believe_chance: f32,
    pub default_relationship_weight: f32,
}

impl Default for SpreadSettings {
    fn default() -> Self {
        Self {
            believe_chance: 0.7,
            default_relationship_weight: 0.5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpreadOutcome {
    pub exposures: u32,
    pub new_believers: u32,
    pub new_deniers: u32,
}

/// Spreader's score toward the neighbour, else the reverse, else the default.
pub fn relationship_weight(spreader: &CrewRecord, neighbor: &CrewRecord, default: f32) -> f32 {
    spreader
        .relationship_with(neighbor.id)
        .or_else(|| neighbor.relationship_with(spreader.id))
        .unwrap_or(default)
}

/// `clamp((base + trait bonus) × relationship weight + phase bonus, 0, 1)`.
pub fn exposure_chance(
    archetype: &Archetype,
    phase: &str,
    spreader: &CrewRecord,
    neighbor: &CrewRecord,
    default_weight: f32,
) -> f32 {
    let mechanics = &archetype.spread_mechanics;
    let mut chance = mechanics.base_spread_chance + mechanics.bonuses.trait_bonus(spreader);
    chance *= relationship_weight(spreader, neighbor, default_weight);
    chance += mechanics.bonuses.phase_bonus(phase);
    chance.clamp(0.0, 1.0)
}

/// Believers plus anyone holding a primary spreader role in a subject's department.
pub fn spreaders(
    instance: &GossipInstance,
    archetype: &Archetype,
    roster: &BTreeMap<CrewId, CrewRecord>,
) -> BTreeSet<CrewId> {
    let mut spreaders = instance.believers().clone();
    let roles = &archetype.spread_mechanics.primary_spreader_roles;
    if roles.is_empty() {
        return spreaders;
    }
    let departments: BTreeSet<&str> = instance
        .subject_ids()
        .filter_map(|id| roster.get(&id))
        .map(|subject| subject.department.as_str())
        .filter(|department| !department.is_empty())
        .collect();
    spreaders.extend(
        roster
            .values()
            .filter(|member| departments.contains(member.department.as_str()))
            .filter(|member| roles.iter().any(|role| member.has_role(role)))
            .map(|member| member.id),
    );
    spreaders
}

/// Diffuse an instance one hop along the social network.
///
/// The spreader set is fixed before any exposure, so crew converted this tick
/// only start spreading on the next one.
pub fn propagate<R: Rng + ?Sized>(
    instance: &mut GossipInstance,
    archetype: &Archetype,
    network: &SocialNetwork,
    roster: &BTreeMap<CrewId, CrewRecord>,
    settings: SpreadSettings,
    tick: u64,
    rng: &mut R,
) -> Result<SpreadOutcome, GossipError> {
    let mut outcome = SpreadOutcome::default();
    let phase = instance.phase.clone();

    for spreader_id in spreaders(instance, archetype, roster) {
        let spreader = roster
            .get(&spreader_id)
            .ok_or_else(|| GossipError::dangling(instance.id, spreader_id))?;
        for neighbor_id in network.neighbors(spreader_id) {
            if instance.has_reacted(neighbor_id) {
                continue;
            }
            let neighbor = roster
                .get(&neighbor_id)
                .ok_or_else(|| GossipError::dangling(instance.id, neighbor_id))?;
            let chance = exposure_chance(
                archetype,
                &phase,
                spreader,
                neighbor,
                settings.default_relationship_weight,
            );
            if rng.gen::<f32>() >= chance {
                continue;
            }
            let believes = rng.gen::<f32>() < settings.believe_chance;
            instance.record_exposure(spreader_id, neighbor_id, tick, believes);
            outcome.exposures += 1;
            if believes {
                outcome.new_believers += 1;
            } else {
                outcome.new_deniers += 1;
            }
            tracing::trace!(
                target: "gossip_sim::spread",
                gossip = %instance.id,
                from = spreader_id.0,
                to = neighbor_id.0,
                chance,
                believes,
                "gossip.spread.exposure"
            );
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::archetype_config::ArchetypeCatalog;
    use crate::instance::GossipId;
    use crate::social::DEFAULT_RELATIONSHIP_EDGE_THRESHOLD;

    fn index(members: Vec<CrewRecord>) -> BTreeMap<CrewId, CrewRecord> {
        members.into_iter().map(|member| (member.id, member)).collect()
    }

    fn rumour_catalog() -> ArchetypeCatalog {
        ArchetypeCatalog::from_json_str(
            r#"{
                "archetypes": [{
                    "id": "rumour",
                    "name": "Rumour",
                    "subject_roles": ["subject"],
                    "phase_graph": [
                        {"phase": "WHISPER", "duration": 5, "next": "OBVIOUS"},
                        {"phase": "OBVIOUS", "duration": 5, "next": "RESOLVED"},
                        {"phase": "RESOLVED"}
                    ],
                    "spread_mechanics": {
                        "primary_spreader_roles": ["supervisor"],
                        "base_spread_chance": 0.7,
                        "bonuses": {"phases": {"OBVIOUS": 0.3}}
                    }
                }]
            }"#,
        )
        .unwrap()
    }

    fn rumour_instance(archetype: &Archetype, subject: u32) -> GossipInstance {
        let subjects = BTreeMap::from([("subject".to_string(), Some(CrewId(subject)))]);
        GossipInstance::new(GossipId(1), archetype, subjects, CrewId(subject), 0)
    }

    #[test]
    fn gossip_trait_and_relationship_weight_combine() {
        let catalog = rumour_catalog();
        let archetype = catalog.archetype("rumour").unwrap();
        let spreader = CrewRecord::new(1, "Ada")
            .with_trait("gossip")
            .with_relationship(2, 0.8);
        let neighbor = CrewRecord::new(2, "Bo");
        let chance = exposure_chance(archetype, "WHISPER", &spreader, &neighbor, 0.5);
        assert!((chance - 0.72).abs() < 1e-6);
    }

    #[test]
    fn discrete_trait_and_phase_bonus_apply() {
        let catalog = rumour_catalog();
        let archetype = catalog.archetype("rumour").unwrap();
        let spreader = CrewRecord::new(1, "Ada").with_trait("discrete");
        let neighbor = CrewRecord::new(2, "Bo");
        let quiet = exposure_chance(archetype, "WHISPER", &spreader, &neighbor, 0.5);
        assert!((quiet - 0.2).abs() < 1e-6);
        let loud = exposure_chance(archetype, "OBVIOUS", &spreader, &neighbor, 0.5);
        assert!((loud - 0.5).abs() < 1e-6);
    }

    #[test]
    fn reverse_relationship_used_when_spreader_has_none() {
        let spreader = CrewRecord::new(1, "Ada");
        let neighbor = CrewRecord::new(2, "Bo").with_relationship(1, 0.9);
        assert!((relationship_weight(&spreader, &neighbor, 0.5) - 0.9).abs() < 1e-6);
        let stranger = CrewRecord::new(3, "Cy");
        assert!((relationship_weight(&spreader, &stranger, 0.5) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn role_spreaders_come_from_subject_departments() {
        let catalog = rumour_catalog();
        let archetype = catalog.archetype("rumour").unwrap();
        let roster = index(vec![
            CrewRecord::new(1, "Ada").with_department("engineering"),
            CrewRecord::new(2, "Bo")
                .with_department("engineering")
                .with_role("supervisor"),
            CrewRecord::new(3, "Cy")
                .with_department("medical")
                .with_role("supervisor"),
        ]);
        let instance = rumour_instance(archetype, 1);
        let ids: Vec<u32> = spreaders(&instance, archetype, &roster)
            .into_iter()
            .map(|id| id.0)
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn propagation_moves_one_hop_and_logs_every_exposure() {
        let catalog = rumour_catalog();
        let archetype = catalog.archetype("rumour").unwrap();
        // chain 1 - 2 - 3 via relationships only
        let roster = index(vec![
            CrewRecord::new(1, "Ada").with_relationship(2, 1.0),
            CrewRecord::new(2, "Bo").with_relationship(3, 1.0),
            CrewRecord::new(3, "Cy"),
        ]);
        let network = SocialNetwork::build(roster.values(), DEFAULT_RELATIONSHIP_EDGE_THRESHOLD);
        let mut instance = rumour_instance(archetype, 1);
        instance.phase = "OBVIOUS".to_string();
        let settings = SpreadSettings {
            believe_chance: 1.0,
            ..SpreadSettings::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        let outcome =
            propagate(&mut instance, archetype, &network, &roster, settings, 1, &mut rng).unwrap();
        assert_eq!(outcome.exposures, 1);
        assert!(instance.believers().contains(&CrewId(2)));
        assert!(!instance.has_reacted(CrewId(3)), "only one hop per tick");

        propagate(&mut instance, archetype, &network, &roster, settings, 2, &mut rng).unwrap();
        assert!(instance.believers().contains(&CrewId(3)));
        let log: Vec<(u32, u32, u64)> = instance
            .spread_log()
            .iter()
            .map(|event| (event.from.0, event.to.0, event.tick))
            .collect();
        assert_eq!(log, vec![(1, 2, 1), (2, 3, 2)]);
    }

    #[test]
    fn missing_spreader_is_data_integrity_error() {
        let catalog = rumour_catalog();
        let archetype = catalog.archetype("rumour").unwrap();
        let roster = index(vec![CrewRecord::new(2, "Bo")]);
        let network = SocialNetwork::build(roster.values(), DEFAULT_RELATIONSHIP_EDGE_THRESHOLD);
        let mut instance = rumour_instance(archetype, 1);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let err = propagate(
            &mut instance,
            archetype,
            &network,
            &roster,
            SpreadSettings::default(),
            1,
            &mut rng,
        )
        .unwrap_err();
        assert!(matches!(err, GossipError::DataIntegrity { .. }));
    }
}
