//! Cluster model and construction machinery.
//!
//! During a run every partitioner mutates exactly one [`ClusterBuilder`],
//! which owns the canonical list of clusters and hands out opaque slot
//! indices. Builders never renumber while a run is in flight; dense
//! [`ClusterId`]s are assigned by [`ClusterBuilder::finish`] once empty
//! clusters have been dropped. The finished engine output is a
//! [`ClusterAssignment`].

use dhp_core::{BuildingId, ClusterId, KilowattHours, StreetNodeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One group of buildings, open during construction, immutable once sealed.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub id: ClusterId,
    /// Members in assignment order.
    pub members: Vec<BuildingId>,
    /// Sealed clusters accept no further members.
    pub sealed: bool,
    /// Street node the cluster was opened at, for strategies that have one.
    pub anchor: Option<StreetNodeId>,
}

impl Cluster {
    fn new(id: ClusterId, anchor: Option<StreetNodeId>) -> Self {
        Self {
            id,
            members: Vec::new(),
            sealed: false,
            anchor,
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_full(&self, max_cluster_size: usize) -> bool {
        self.members.len() >= max_cluster_size
    }

    pub fn contains(&self, building: BuildingId) -> bool {
        self.members.contains(&building)
    }
}

/// Owns every cluster of one run.
///
/// Slot indices returned by [`open`](Self::open) are stable for the whole
/// run, so partitioner state machines can hold onto "the cluster I am
/// currently filling" without aliasing the cluster list.
#[derive(Debug)]
pub struct ClusterBuilder {
    first_cluster_id: usize,
    clusters: Vec<Cluster>,
}

impl ClusterBuilder {
    pub fn new(first_cluster_id: usize) -> Self {
        Self {
            first_cluster_id,
            clusters: Vec::new(),
        }
    }

    /// Open a fresh cluster and return its slot.
    pub fn open(&mut self, anchor: Option<StreetNodeId>) -> usize {
        let slot = self.clusters.len();
        let id = ClusterId::new(self.first_cluster_id + slot);
        self.clusters.push(Cluster::new(id, anchor));
        slot
    }

    /// Append a building to an open cluster.
    pub fn append(&mut self, slot: usize, building: BuildingId) {
        debug_assert!(!self.clusters[slot].sealed, "append into sealed cluster");
        self.clusters[slot].members.push(building);
    }

    /// Seal a cluster against further appends.
    pub fn seal(&mut self, slot: usize) {
        self.clusters[slot].sealed = true;
    }

    pub fn cluster(&self, slot: usize) -> &Cluster {
        &self.clusters[slot]
    }

    pub fn members(&self, slot: usize) -> &[BuildingId] {
        &self.clusters[slot].members
    }

    /// Hand back the best still-open cluster under a scoring rule, or open a
    /// fresh one.
    ///
    /// `score` returns `Some(cost)` for clusters the candidate may join;
    /// the open cluster with the lowest cost wins, earlier slots win ties.
    pub fn reopen_or_create<F>(&mut self, anchor: Option<StreetNodeId>, score: F) -> usize
    where
        F: Fn(&Cluster) -> Option<f64>,
    {
        let mut best: Option<(usize, f64)> = None;
        for (slot, cluster) in self.clusters.iter().enumerate() {
            if cluster.sealed {
                continue;
            }
            if let Some(cost) = score(cluster) {
                let improves = match best {
                    Some((_, best_cost)) => cost < best_cost,
                    None => true,
                };
                if improves {
                    best = Some((slot, cost));
                }
            }
        }
        match best {
            Some((slot, _)) => slot,
            None => self.open(anchor),
        }
    }

    /// Number of clusters opened so far, including empty ones.
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Iterate clusters in construction order.
    pub fn iter(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.iter()
    }

    /// Seal everything, drop empty clusters, and renumber ids densely from
    /// the configured base.
    pub fn finish(mut self) -> Vec<Cluster> {
        self.clusters.retain(|cluster| !cluster.members.is_empty());
        for (position, cluster) in self.clusters.iter_mut().enumerate() {
            cluster.id = ClusterId::new(self.first_cluster_id + position);
            cluster.sealed = true;
        }
        self.clusters
    }
}

/// Planar outline of one cluster.
///
/// `Hull` holds an open convex-hull ring (last vertex does not repeat the
/// first). Clusters with fewer than three distinct member positions report
/// those positions unchanged as `Degenerate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterBoundary {
    Hull(Vec<(f64, f64)>),
    Degenerate(Vec<(f64, f64)>),
}

impl ClusterBoundary {
    pub fn points(&self) -> &[(f64, f64)] {
        match self {
            ClusterBoundary::Hull(points) => points,
            ClusterBoundary::Degenerate(points) => points,
        }
    }
}

/// Size and demand statistics over a finished assignment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterStats {
    pub cluster_count: usize,
    pub min_size: usize,
    pub max_size: usize,
    pub mean_size: f64,
    pub total_heat_demand: KilowattHours,
    pub total_power_demand: KilowattHours,
}

impl fmt::Display for ClusterStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} clusters, sizes {}..={} (mean {:.1}), {:.0} kWh heat, {:.0} kWh power",
            self.cluster_count,
            self.min_size,
            self.max_size,
            self.mean_size,
            self.total_heat_demand.value(),
            self.total_power_demand.value()
        )
    }
}

/// Final engine output.
///
/// Cross-references are index-based in both directions: cluster → member
/// list and building → cluster id. All maps share the same dense id space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    /// Members per cluster, in assignment order.
    pub clusters: BTreeMap<ClusterId, Vec<BuildingId>>,
    /// Back-reference from each building to its cluster.
    pub membership: BTreeMap<BuildingId, ClusterId>,
    /// Convex-hull boundary per cluster.
    pub boundaries: BTreeMap<ClusterId, ClusterBoundary>,
    pub stats: ClusterStats,
}

impl ClusterAssignment {
    /// Number of clusters.
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Total building count across all clusters.
    pub fn building_count(&self) -> usize {
        self.membership.len()
    }

    pub fn members(&self, cluster: ClusterId) -> Option<&[BuildingId]> {
        self.clusters.get(&cluster).map(Vec::as_slice)
    }

    pub fn cluster_of(&self, building: BuildingId) -> Option<ClusterId> {
        self.membership.get(&building).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_appends_and_seals() {
        let mut builder = ClusterBuilder::new(0);
        let slot = builder.open(Some(StreetNodeId::new(4)));
        builder.append(slot, BuildingId::new(10));
        builder.append(slot, BuildingId::new(11));

        assert_eq!(builder.cluster(slot).len(), 2);
        assert!(builder.cluster(slot).contains(BuildingId::new(10)));
        assert!(!builder.cluster(slot).sealed);

        builder.seal(slot);
        assert!(builder.cluster(slot).sealed);
        assert_eq!(builder.cluster(slot).anchor, Some(StreetNodeId::new(4)));
    }

    #[test]
    fn test_finish_drops_empties_and_renumbers() {
        let mut builder = ClusterBuilder::new(100);
        let a = builder.open(None);
        let empty = builder.open(None);
        let b = builder.open(None);
        builder.append(a, BuildingId::new(0));
        builder.append(b, BuildingId::new(1));
        let _ = empty;

        let clusters = builder.finish();
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].id, ClusterId::new(100));
        assert_eq!(clusters[1].id, ClusterId::new(101));
        assert!(clusters.iter().all(|c| c.sealed));
    }

    #[test]
    fn test_reopen_or_create_picks_cheapest_open_cluster() {
        let mut builder = ClusterBuilder::new(0);
        let near = builder.open(None);
        let far = builder.open(None);
        let sealed = builder.open(None);
        builder.append(near, BuildingId::new(0));
        builder.append(far, BuildingId::new(1));
        builder.append(sealed, BuildingId::new(2));
        builder.seal(sealed);

        // Sealed clusters are never considered, even at cost zero.
        let chosen = builder.reopen_or_create(None, |cluster| {
            if cluster.contains(BuildingId::new(2)) {
                Some(0.0)
            } else if cluster.contains(BuildingId::new(0)) {
                Some(5.0)
            } else {
                Some(9.0)
            }
        });
        assert_eq!(chosen, near);

        // No open cluster qualifies: a fresh slot appears.
        let fresh = builder.reopen_or_create(None, |_| None);
        assert_eq!(fresh, 3);
        assert_eq!(builder.len(), 4);
    }

    #[test]
    fn test_assignment_lookups() {
        let mut clusters = BTreeMap::new();
        clusters.insert(ClusterId::new(0), vec![BuildingId::new(3), BuildingId::new(5)]);
        clusters.insert(ClusterId::new(1), vec![BuildingId::new(4)]);
        let mut membership = BTreeMap::new();
        membership.insert(BuildingId::new(3), ClusterId::new(0));
        membership.insert(BuildingId::new(5), ClusterId::new(0));
        membership.insert(BuildingId::new(4), ClusterId::new(1));

        let assignment = ClusterAssignment {
            clusters,
            membership,
            boundaries: BTreeMap::new(),
            stats: ClusterStats::default(),
        };

        assert_eq!(assignment.len(), 2);
        assert_eq!(assignment.building_count(), 3);
        assert_eq!(
            assignment.cluster_of(BuildingId::new(5)),
            Some(ClusterId::new(0))
        );
        assert_eq!(
            assignment.members(ClusterId::new(1)),
            Some(&[BuildingId::new(4)][..])
        );
        assert_eq!(assignment.cluster_of(BuildingId::new(99)), None);
    }

    #[test]
    fn test_stats_display() {
        let stats = ClusterStats {
            cluster_count: 3,
            min_size: 2,
            max_size: 8,
            mean_size: 4.667,
            total_heat_demand: KilowattHours(120_000.0),
            total_power_demand: KilowattHours(30_000.0),
        };
        let rendered = format!("{stats}");
        assert!(rendered.contains("3 clusters"));
        assert!(rendered.contains("2..=8"));
        assert!(rendered.contains("mean 4.7"));
    }
}
