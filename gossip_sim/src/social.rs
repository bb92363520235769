//! Undirected crew adjacency used for gossip diffusion.
//!
//! The network is derived data: it is rebuilt from the roster whenever the
//! edge-relevant parts of the roster change, never edited in place.

use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use crate::crew::{CrewId, CrewRecord};
use crate::hashing::FnvHasher;

pub const DEFAULT_RELATIONSHIP_EDGE_THRESHOLD: f32 = 0.4;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SocialNetwork {
    adjacency: BTreeMap<CrewId, BTreeSet<CrewId>>,
}

impl SocialNetwork {
    /// Connect every pair sharing a department or shift, or whose relationship
    /// score exceeds `threshold` in either direction.
    pub fn build<'a>(roster: impl IntoIterator<Item = &'a CrewRecord>, threshold: f32) -> Self {
        let members: Vec<&CrewRecord> = roster.into_iter().collect();
        let mut adjacency: BTreeMap<CrewId, BTreeSet<CrewId>> = members
            .iter()
            .map(|member| (member.id, BTreeSet::new()))
            .collect();

        for (index, left) in members.iter().enumerate() {
            for right in &members[index + 1..] {
                if left.id == right.id || !connected(left, right, threshold) {
                    continue;
                }
                adjacency.entry(left.id).or_default().insert(right.id);
                adjacency.entry(right.id).or_default().insert(left.id);
            }
        }

        Self { adjacency }
    }

    /// Neighbours in ascending id order.
    pub fn neighbors(&self, crew: CrewId) -> impl Iterator<Item = CrewId> + '_ {
        self.adjacency
            .get(&crew)
            .into_iter()
            .flat_map(|neighbors| neighbors.iter().copied())
    }

    pub fn are_connected(&self, left: CrewId, right: CrewId) -> bool {
        self.adjacency
            .get(&left)
            .map(|neighbors| neighbors.contains(&right))
            .unwrap_or(false)
    }

    pub fn degree(&self, crew: CrewId) -> usize {
        self.adjacency.get(&crew).map(BTreeSet::len).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(BTreeSet::len).sum::<usize>() / 2
    }
}

fn connected(left: &CrewRecord, right: &CrewRecord, threshold: f32) -> bool {
    let same_department = !left.department.is_empty() && left.department == right.department;
    let same_shift = !left.shift.is_empty() && left.shift == right.shift;
    let close = left
        .relationship_with(right.id)
        .map(|score| score > threshold)
        .unwrap_or(false)
        || right
            .relationship_with(left.id)
            .map(|score| score > threshold)
            .unwrap_or(false);
    same_department || same_shift || close
}

/// Fingerprint of everything that can change an edge.
///
/// Relationship scores only contribute which side of the threshold they sit
/// on, so small score drift does not force a rebuild.
pub fn roster_fingerprint<'a>(
    roster: impl IntoIterator<Item = &'a CrewRecord>,
    threshold: f32,
) -> u64 {
    let mut hasher = FnvHasher::new();
    threshold.to_bits().hash(&mut hasher);
    for member in roster {
        member.id.hash(&mut hasher);
        member.department.hash(&mut hasher);
        member.shift.hash(&mut hasher);
        for (other, score) in &member.relationships {
            if *score > threshold {
                other.hash(&mut hasher);
            }
        }
        0xffu8.hash(&mut hasher);
    }
    hasher.finish()
}

/// Network plus the fingerprint it was built from.
#[derive(Debug, Clone, Default)]
pub struct SocialNetworkCache {
    fingerprint: Option<u64>,
    network: SocialNetwork,
    rebuilds: u64,
}

impl SocialNetworkCache {
    /// Return the cached network, rebuilding it first if the roster changed.
    pub fn refresh<'a>(
        &mut self,
        roster: impl IntoIterator<Item = &'a CrewRecord> + Clone,
        threshold: f32,
    ) -> &SocialNetwork {
        let fingerprint = roster_fingerprint(roster.clone(), threshold);
        if self.fingerprint != Some(fingerprint) {
            self.network = SocialNetwork::build(roster, threshold);
            self.fingerprint = Some(fingerprint);
            self.rebuilds += 1;
            tracing::debug!(
                target: "gossip_sim::social",
                crew = self.network.len(),
                edges = self.network.edge_count(),
                rebuilds = self.rebuilds,
                "social.network.rebuilt"
            );
        }
        &self.network
    }

    pub fn invalidate(&mut self) {
        self.fingerprint = None;
    }

    pub fn network(&self) -> &SocialNetwork {
        &self.network
    }

    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster() -> Vec<CrewRecord> {
        vec![
            CrewRecord::new(1, "Ada").with_department("engineering").with_shift("alpha"),
            CrewRecord::new(2, "Bo").with_department("engineering").with_shift("beta"),
            CrewRecord::new(3, "Cy").with_department("medical").with_shift("beta"),
            CrewRecord::new(4, "Di")
                .with_department("science")
                .with_shift("gamma")
                .with_relationship(1, 0.55),
            CrewRecord::new(5, "Ev")
                .with_department("security")
                .with_shift("delta")
                .with_relationship(1, 0.4),
        ]
    }

    #[test]
    fn edges_follow_department_shift_and_relationships() {
        let members = roster();
        let network = SocialNetwork::build(&members, DEFAULT_RELATIONSHIP_EDGE_THRESHOLD);
        assert!(network.are_connected(CrewId(1), CrewId(2)), "same department");
        assert!(network.are_connected(CrewId(2), CrewId(3)), "same shift");
        assert!(network.are_connected(CrewId(1), CrewId(4)), "score above threshold");
        assert!(network.are_connected(CrewId(4), CrewId(1)), "edges are undirected");
        assert!(!network.are_connected(CrewId(1), CrewId(5)), "threshold is exclusive");
        assert!(!network.are_connected(CrewId(1), CrewId(3)));
        assert_eq!(network.degree(CrewId(5)), 0);
    }

    #[test]
    fn no_self_loops() {
        let members = vec![CrewRecord::new(1, "Ada")
            .with_department("engineering")
            .with_relationship(1, 0.9)];
        let network = SocialNetwork::build(&members, DEFAULT_RELATIONSHIP_EDGE_THRESHOLD);
        assert_eq!(network.neighbors(CrewId(1)).count(), 0);
    }

    #[test]
    fn neighbors_are_sorted() {
        let members = vec![
            CrewRecord::new(7, "G").with_shift("alpha"),
            CrewRecord::new(3, "C").with_shift("alpha"),
            CrewRecord::new(5, "E").with_shift("alpha"),
        ];
        let network = SocialNetwork::build(&members, DEFAULT_RELATIONSHIP_EDGE_THRESHOLD);
        let ids: Vec<u32> = network.neighbors(CrewId(5)).map(|id| id.0).collect();
        assert_eq!(ids, vec![3, 7]);
    }

    #[test]
    fn cache_rebuilds_only_on_meaningful_change() {
        let mut members = roster();
        let mut cache = SocialNetworkCache::default();
        cache.refresh(&members, DEFAULT_RELATIONSHIP_EDGE_THRESHOLD);
        cache.refresh(&members, DEFAULT_RELATIONSHIP_EDGE_THRESHOLD);
        assert_eq!(cache.rebuilds(), 1);

        members[3].relationships.insert(CrewId(1), 0.6);
        cache.refresh(&members, DEFAULT_RELATIONSHIP_EDGE_THRESHOLD);
        assert_eq!(cache.rebuilds(), 1, "score drift above threshold keeps edges");

        members[4].relationships.insert(CrewId(1), 0.8);
        let network = cache.refresh(&members, DEFAULT_RELATIONSHIP_EDGE_THRESHOLD);
        assert!(network.are_connected(CrewId(1), CrewId(5)));
        assert_eq!(cache.rebuilds(), 2);

        cache.invalidate();
        cache.refresh(&members, DEFAULT_RELATIONSHIP_EDGE_THRESHOLD);
        assert_eq!(cache.rebuilds(), 3);
    }
}
