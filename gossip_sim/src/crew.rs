use std::collections::BTreeMap;
use std::fmt;

use bevy::prelude::Resource;
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct CrewId(pub u32);

impl fmt::Display for CrewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "crew#{}", self.0)
    }
}

/// Snapshot of one crew member as seen by the gossip engine.
///
/// The engine only reads these; the crew simulation owns the underlying
/// stats and receives changes through an [`crate::effects::EffectSink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrewRecord {
    pub id: CrewId,
    pub name: String,
    pub department: String,
    pub shift: String,
    /// Job role, matched against an archetype's primary spreader roles.
    pub role: Option<String>,
    /// Outgoing relationship scores in `[-1, 1]`.
    pub relationships: BTreeMap<CrewId, f32>,
    pub traits: Vec<String>,
    pub stress: f32,
    pub recent_failures: u32,
    /// Positive when improving, negative when slipping.
    pub performance_trend: f32,
    pub age: u32,
}

impl Default for CrewRecord {
    fn default() -> Self {
        Self {
            id: CrewId(0),
            name: String::new(),
            department: String::new(),
            shift: String::new(),
            role: None,
            relationships: BTreeMap::new(),
            traits: Vec::new(),
            stress: 0.0,
            recent_failures: 0,
            performance_trend: 0.0,
            age: 30,
        }
    }
}

impl CrewRecord {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id: CrewId(id),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = department.into();
        self
    }

    pub fn with_shift(mut self, shift: impl Into<String>) -> Self {
        self.shift = shift.into();
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_trait(mut self, label: impl Into<String>) -> Self {
        self.traits.push(label.into());
        self
    }

    pub fn with_relationship(mut self, other: u32, score: f32) -> Self {
        self.relationships.insert(CrewId(other), score);
        self
    }

    pub fn has_trait(&self, label: &str) -> bool {
        self.traits
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(label))
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.role
            .as_deref()
            .map(|own| own.eq_ignore_ascii_case(role))
            .unwrap_or(false)
    }

    pub fn relationship_with(&self, other: CrewId) -> Option<f32> {
        self.relationships.get(&other).copied()
    }
}

/// Read access to the crew roster owned by the crew simulation.
pub trait CrewRepository {
    fn all_crew(&self) -> Vec<CrewRecord>;
    fn crew_by_id(&self, id: CrewId) -> Option<CrewRecord>;
}

/// In-memory roster, also the Bevy resource the gossip system reads from.
#[derive(Resource, Debug, Clone, Default)]
pub struct CrewRoster {
    members: BTreeMap<CrewId, CrewRecord>,
}

impl CrewRoster {
    pub fn new(members: impl IntoIterator<Item = CrewRecord>) -> Self {
        Self {
            members: members
                .into_iter()
                .map(|record| (record.id, record))
                .collect(),
        }
    }

    pub fn insert(&mut self, record: CrewRecord) -> Option<CrewRecord> {
        self.members.insert(record.id, record)
    }

    pub fn remove(&mut self, id: CrewId) -> Option<CrewRecord> {
        self.members.remove(&id)
    }

    pub fn get_mut(&mut self, id: CrewId) -> Option<&mut CrewRecord> {
        self.members.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CrewRecord> {
        self.members.values()
    }
}

impl CrewRepository for CrewRoster {
    fn all_crew(&self) -> Vec<CrewRecord> {
        self.members.values().cloned().collect()
    }

    fn crew_by_id(&self, id: CrewId) -> Option<CrewRecord> {
        self.members.get(&id).cloned()
    }
}
