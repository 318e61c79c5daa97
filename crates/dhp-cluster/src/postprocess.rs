//! Cluster postprocessing.
//!
//! Verifies the terminal invariants every partitioner must uphold (each
//! building assigned exactly once, no cluster over capacity) and derives the
//! presentation layer: per-cluster convex-hull boundaries and summary
//! statistics. Invariant violations here indicate a partitioner defect, not
//! bad input, so they are always fatal.

use crate::cluster::{Cluster, ClusterAssignment, ClusterBoundary, ClusterStats};
use crate::config::ClusterConfig;
use crate::error::{ClusterError, ClusterResult};
use dhp_core::{Building, BuildingId, ClusterId, KilowattHours, StreetGraph};
use geo::{ConvexHull, MultiPoint, Point};
use std::collections::BTreeMap;
use tracing::debug;

/// Validate a finished partition against the graph and assemble the final
/// assignment with boundaries and stats.
pub fn finalize(
    graph: &StreetGraph,
    clusters: &[Cluster],
    config: &ClusterConfig,
) -> ClusterResult<ClusterAssignment> {
    let registry: BTreeMap<BuildingId, &Building> =
        graph.buildings().into_iter().map(|b| (b.id, b)).collect();

    let mut membership: BTreeMap<BuildingId, ClusterId> = BTreeMap::new();
    let mut cluster_map: BTreeMap<ClusterId, Vec<BuildingId>> = BTreeMap::new();
    for cluster in clusters {
        if cluster.len() > config.max_cluster_size {
            return Err(ClusterError::AssignmentInvariant(format!(
                "cluster {} holds {} buildings, above the bound of {}",
                cluster.id.value(),
                cluster.len(),
                config.max_cluster_size
            )));
        }
        for &building in &cluster.members {
            if !registry.contains_key(&building) {
                return Err(ClusterError::AssignmentInvariant(format!(
                    "cluster {} references unknown building {}",
                    cluster.id.value(),
                    building.value()
                )));
            }
            if membership.insert(building, cluster.id).is_some() {
                return Err(ClusterError::AssignmentInvariant(format!(
                    "building {} is assigned more than once",
                    building.value()
                )));
            }
        }
        if cluster_map
            .insert(cluster.id, cluster.members.clone())
            .is_some()
        {
            return Err(ClusterError::AssignmentInvariant(format!(
                "duplicate cluster id {}",
                cluster.id.value()
            )));
        }
    }
    if membership.len() != registry.len() {
        let missing = registry
            .keys()
            .find(|b| !membership.contains_key(b))
            .map(|b| b.value())
            .unwrap_or_default();
        return Err(ClusterError::AssignmentInvariant(format!(
            "building {missing} was never assigned to a cluster"
        )));
    }

    let mut boundaries: BTreeMap<ClusterId, ClusterBoundary> = BTreeMap::new();
    for (&id, members) in &cluster_map {
        let points: Vec<Point<f64>> = members
            .iter()
            .filter_map(|b| registry.get(b).map(|building| building.position))
            .collect();
        boundaries.insert(id, boundary_of(&points));
    }

    let stats = stats_of(clusters, &registry);
    debug!(%stats, "assignment finalized");
    Ok(ClusterAssignment {
        clusters: cluster_map,
        membership,
        boundaries,
        stats,
    })
}

/// Convex hull for three or more distinct member positions; the raw member
/// positions otherwise (and for collinear clusters, whose hull collapses to
/// a line).
fn boundary_of(points: &[Point<f64>]) -> ClusterBoundary {
    let raw: Vec<(f64, f64)> = points.iter().map(|p| (p.x(), p.y())).collect();
    let mut distinct = raw.clone();
    distinct.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.total_cmp(&b.1)));
    distinct.dedup();
    if distinct.len() < 3 {
        return ClusterBoundary::Degenerate(raw);
    }
    let hull = MultiPoint::from(points.to_vec()).convex_hull();
    let mut ring: Vec<(f64, f64)> = hull.exterior().coords().map(|c| (c.x, c.y)).collect();
    if ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    if ring.len() < 3 {
        ClusterBoundary::Degenerate(raw)
    } else {
        ClusterBoundary::Hull(ring)
    }
}

fn stats_of(clusters: &[Cluster], registry: &BTreeMap<BuildingId, &Building>) -> ClusterStats {
    let sizes: Vec<usize> = clusters.iter().map(Cluster::len).collect();
    let count = sizes.len();
    let total: usize = sizes.iter().sum();
    ClusterStats {
        cluster_count: count,
        min_size: sizes.iter().copied().min().unwrap_or_default(),
        max_size: sizes.iter().copied().max().unwrap_or_default(),
        mean_size: if count == 0 {
            0.0
        } else {
            total as f64 / count as f64
        },
        total_heat_demand: registry.values().map(|b| b.heat_demand).sum::<KilowattHours>(),
        total_power_demand: registry.values().map(|b| b.power_demand).sum::<KilowattHours>(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterBuilder;

    fn demo_graph(points: &[(f64, f64)]) -> StreetGraph {
        let mut graph = StreetGraph::new();
        for (i, &(x, y)) in points.iter().enumerate() {
            graph
                .add_building(
                    Building::new(BuildingId::new(i), format!("b{i}"), Point::new(x, y))
                        .with_demand(100.0, 10.0),
                )
                .unwrap();
        }
        graph
    }

    fn clusters_of(groups: &[&[usize]]) -> Vec<Cluster> {
        let mut builder = ClusterBuilder::new(0);
        for group in groups {
            let slot = builder.open(None);
            for &b in *group {
                builder.append(slot, BuildingId::new(b));
            }
        }
        builder.finish()
    }

    #[test]
    fn test_finalize_builds_membership_boundaries_and_stats() {
        let graph = demo_graph(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]);
        let config = ClusterConfig::default();
        let clusters = clusters_of(&[&[0, 1, 2], &[3]]);
        let assignment = finalize(&graph, &clusters, &config).unwrap();

        assert_eq!(assignment.len(), 2);
        assert_eq!(assignment.building_count(), 4);
        assert_eq!(assignment.cluster_of(BuildingId::new(1)), Some(ClusterId::new(0)));
        assert_eq!(assignment.cluster_of(BuildingId::new(3)), Some(ClusterId::new(1)));

        let hull = assignment.boundaries.get(&ClusterId::new(0)).unwrap();
        match hull {
            ClusterBoundary::Hull(ring) => {
                let mut corners = ring.clone();
                corners.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.total_cmp(&b.1)));
                assert_eq!(corners, vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]);
            }
            other => panic!("expected hull, got {other:?}"),
        }
        let single = assignment.boundaries.get(&ClusterId::new(1)).unwrap();
        assert!(matches!(single, ClusterBoundary::Degenerate(points) if points.len() == 1));

        assert_eq!(assignment.stats.cluster_count, 2);
        assert_eq!(assignment.stats.min_size, 1);
        assert_eq!(assignment.stats.max_size, 3);
        assert_eq!(assignment.stats.mean_size, 2.0);
        assert_eq!(assignment.stats.total_heat_demand.value(), 400.0);
        assert_eq!(assignment.stats.total_power_demand.value(), 40.0);
    }

    #[test]
    fn test_collinear_cluster_falls_back_to_degenerate_boundary() {
        let graph = demo_graph(&[(0.0, 0.0), (5.0, 0.0), (10.0, 0.0)]);
        let config = ClusterConfig::default();
        let clusters = clusters_of(&[&[0, 1, 2]]);
        let assignment = finalize(&graph, &clusters, &config).unwrap();
        let boundary = assignment.boundaries.get(&ClusterId::new(0)).unwrap();
        assert!(matches!(boundary, ClusterBoundary::Degenerate(points) if points.len() == 3));
    }

    #[test]
    fn test_double_assignment_is_rejected() {
        let graph = demo_graph(&[(0.0, 0.0)]);
        let config = ClusterConfig::default();
        let clusters = clusters_of(&[&[0], &[0]]);
        let err = finalize(&graph, &clusters, &config).unwrap_err();
        assert!(
            err.to_string().contains("more than once"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn test_unassigned_building_is_rejected() {
        let graph = demo_graph(&[(0.0, 0.0), (5.0, 0.0)]);
        let config = ClusterConfig::default();
        let clusters = clusters_of(&[&[0]]);
        let err = finalize(&graph, &clusters, &config).unwrap_err();
        assert!(
            err.to_string().contains("never assigned"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn test_unknown_building_is_rejected() {
        let graph = demo_graph(&[(0.0, 0.0)]);
        let config = ClusterConfig::default();
        let clusters = clusters_of(&[&[0, 7]]);
        let err = finalize(&graph, &clusters, &config).unwrap_err();
        assert!(
            err.to_string().contains("unknown building"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn test_capacity_violation_is_rejected() {
        let graph = demo_graph(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)]);
        let config = ClusterConfig {
            max_cluster_size: 2,
            ..ClusterConfig::default()
        };
        let clusters = clusters_of(&[&[0, 1, 2]]);
        let err = finalize(&graph, &clusters, &config).unwrap_err();
        assert!(
            err.to_string().contains("above the bound"),
            "unexpected error: {err}"
        );
    }
}
