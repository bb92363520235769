//! Per-tick scan of crew state for new gossip.

use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;
use serde::Deserialize;

use crate::archetype_config::{Archetype, ArchetypeCatalog};
use crate::crew::{CrewId, CrewRecord};
use crate::instance::GossipLedger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrewAttribute {
    RecentFailures,
    Stress,
    /// Relationship score between the member and the selected partner.
    Chemistry,
    PerformanceTrend,
    Age,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    AtLeast,
    AtMost,
}

impl Comparison {
    fn holds(self, value: f32, threshold: f32) -> bool {
        match self {
            Comparison::AtLeast => value >= threshold,
            Comparison::AtMost => value <= threshold,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TriggerCondition {
    pub attribute: CrewAttribute,
    pub comparison: Comparison,
    pub threshold: f32,
    #[serde(default)]
    pub additive: f32,
    #[serde(default = "default_multiplier")]
    pub multiplier: f32,
    /// A failed required condition zeroes the chance.
    #[serde(default)]
    pub required: bool,
}

fn default_multiplier() -> f32 {
    1.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartnerSelection {
    HighestRelationship,
    LowestRelationship,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PartnerRule {
    pub selection: PartnerSelection,
    #[serde(default)]
    pub same_department: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TriggerSpec {
    #[serde(default)]
    pub baseline: f32,
    #[serde(default)]
    pub conditions: Vec<TriggerCondition>,
    #[serde(default)]
    pub partner: Option<PartnerRule>,
}

/// Choose a partner for a multi-subject archetype. Ties go to the lower id.
pub fn select_partner<'a>(
    member: &CrewRecord,
    rule: &PartnerRule,
    roster: &'a BTreeMap<CrewId, CrewRecord>,
) -> Option<(&'a CrewRecord, f32)> {
    let mut best: Option<(&CrewRecord, f32)> = None;
    for candidate in roster.values() {
        if candidate.id == member.id {
            continue;
        }
        if rule.same_department && candidate.department != member.department {
            continue;
        }
        let Some(score) = member.relationship_with(candidate.id) else {
            continue;
        };
        let better = match (best, rule.selection) {
            (None, _) => true,
            (Some((_, current)), PartnerSelection::HighestRelationship) => score > current,
            (Some((_, current)), PartnerSelection::LowestRelationship) => score < current,
        };
        if better {
            best = Some((candidate, score));
        }
    }
    best
}

fn attribute_value(member: &CrewRecord, attribute: CrewAttribute, chemistry: Option<f32>) -> Option<f32> {
    match attribute {
        CrewAttribute::RecentFailures => Some(member.recent_failures as f32),
        CrewAttribute::Stress => Some(member.stress),
        CrewAttribute::Chemistry => chemistry,
        CrewAttribute::PerformanceTrend => Some(member.performance_trend),
        CrewAttribute::Age => Some(member.age as f32),
    }
}

/// `clamp((baseline + Σ additive) × Π multiplier, 0, 1)` over satisfied
/// conditions, or zero when a required condition fails.
pub fn trigger_chance(spec: &TriggerSpec, member: &CrewRecord, chemistry: Option<f32>) -> f32 {
    let mut additive = 0.0;
    let mut multiplier = 1.0;
    for condition in &spec.conditions {
        let satisfied = attribute_value(member, condition.attribute, chemistry)
            .map(|value| condition.comparison.holds(value, condition.threshold))
            .unwrap_or(false);
        if satisfied {
            additive += condition.additive;
            multiplier *= condition.multiplier;
        } else if condition.required {
            return 0.0;
        }
    }
    ((spec.baseline + additive) * multiplier).clamp(0.0, 1.0)
}

/// A trigger that fired and survived the duplicate check.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggeredGossip {
    pub archetype_id: String,
    pub subjects: BTreeMap<String, Option<CrewId>>,
    pub primary_subject: CrewId,
    pub chance: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerScan {
    pub fired: u32,
    pub duplicates: u32,
    pub capped: u32,
}

/// Scan every crew member against every triggerable archetype.
///
/// Members are visited in ascending id order and archetypes in catalog order,
/// with exactly one draw per evaluated pair whose chance is positive.
pub fn evaluate_triggers<R: Rng + ?Sized>(
    catalog: &ArchetypeCatalog,
    roster: &BTreeMap<CrewId, CrewRecord>,
    ledger: &GossipLedger,
    max_active: usize,
    rng: &mut R,
) -> (Vec<TriggeredGossip>, TriggerScan) {
    let mut created = Vec::new();
    let mut scan = TriggerScan::default();
    let mut claimed: BTreeSet<(String, CrewId)> = BTreeSet::new();

    for member in roster.values() {
        for archetype in catalog.archetypes() {
            let Some(spec) = archetype.trigger.as_ref() else {
                continue;
            };
            let partner = match spec.partner.as_ref() {
                Some(rule) => match select_partner(member, rule, roster) {
                    Some(found) => Some(found),
                    None => continue,
                },
                None => None,
            };
            let chance = trigger_chance(spec, member, partner.map(|(_, score)| score));
            if chance <= 0.0 || !rng.gen_bool(chance as f64) {
                continue;
            }
            scan.fired += 1;

            let key = (archetype.id.clone(), member.id);
            if claimed.contains(&key) || ledger.find_active(&archetype.id, member.id).is_some() {
                scan.duplicates += 1;
                continue;
            }
            if ledger.active_len() + created.len() >= max_active {
                scan.capped += 1;
                continue;
            }

            claimed.insert(key);
            created.push(TriggeredGossip {
                archetype_id: archetype.id.clone(),
                subjects: assign_subjects(archetype, member.id, partner.map(|(crew, _)| crew.id)),
                primary_subject: member.id,
                chance,
            });
        }
    }

    (created, scan)
}

fn assign_subjects(
    archetype: &Archetype,
    primary: CrewId,
    partner: Option<CrewId>,
) -> BTreeMap<String, Option<CrewId>> {
    archetype
        .subject_roles
        .iter()
        .enumerate()
        .map(|(index, role)| {
            let crew = match index {
                0 => Some(primary),
                1 => partner,
                _ => None,
            };
            (role.clone(), crew)
        })
        .collect()
}
