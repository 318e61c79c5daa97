//! Greedy position-chaining partitioner.
//!
//! Chains buildings by beeline proximity, starting from the building with
//! the smallest x coordinate. In active-node mode the chain always extends
//! from the most recently assigned building; when its nearest unassigned
//! neighbor is out of range the search falls back once to the previous chain
//! node before sealing the cluster and reseeding. Whole-cluster mode measures
//! the jump against the nearest member of the whole open cluster instead of
//! a single node. Street topology plays no role here; only coordinates do.

use crate::cluster::{Cluster, ClusterBuilder};
use crate::config::{ChainMode, ClusterConfig};
use crate::error::{ClusterError, ClusterResult};
use dhp_core::{geometry, BuildingId, Meters, StreetGraph};
use geo::Point;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Partition buildings by chaining nearest unassigned neighbors.
///
/// Every iteration assigns exactly one building, so the loop runs once per
/// building and the output covers the input exactly; a final count check
/// surfaces any violation as [`ClusterError::AssignmentInvariant`].
pub fn partition(graph: &StreetGraph, config: &ClusterConfig) -> ClusterResult<Vec<Cluster>> {
    let positions: BTreeMap<BuildingId, Point<f64>> = graph
        .buildings()
        .iter()
        .map(|b| (b.id, b.position))
        .collect();
    let total = positions.len();
    let mut builder = ClusterBuilder::new(config.first_cluster_id);
    let Some(seed) = westmost(&positions) else {
        return Ok(builder.finish());
    };

    let range = config.greedy.search_range;
    let max_size = config.max_cluster_size;
    let mut unassigned: BTreeSet<BuildingId> = positions.keys().copied().collect();

    let mut slot = builder.open(None);
    builder.append(slot, seed.0);
    unassigned.remove(&seed.0);
    let mut active = seed;
    let mut previous: Option<(BuildingId, Point<f64>)> = None;

    while !unassigned.is_empty() {
        let candidate = match config.greedy.chain_mode {
            ChainMode::ActiveNode => nearest_to_point(active.1, &unassigned, &positions),
            ChainMode::WholeCluster => {
                nearest_to_members(builder.members(slot), &unassigned, &positions)
            }
        };
        let Some((next, at, distance)) = candidate else {
            break;
        };
        if distance.value() <= range.value() {
            append_chained(&mut builder, &mut slot, max_size, next);
            unassigned.remove(&next);
            previous = Some(active);
            active = (next, at);
            continue;
        }
        // Out of range. In active-node mode, retry from the previous chain
        // node before giving up on the cluster.
        if matches!(config.greedy.chain_mode, ChainMode::ActiveNode) {
            if let Some(prev) = previous {
                if let Some((retry, retry_at, retry_distance)) =
                    nearest_to_point(prev.1, &unassigned, &positions)
                {
                    unassigned.remove(&retry);
                    if retry_distance.value() <= range.value() {
                        append_chained(&mut builder, &mut slot, max_size, retry);
                        // The previous node stays the chain's fallback point.
                        active = (retry, retry_at);
                    } else {
                        builder.seal(slot);
                        slot = builder.open(None);
                        builder.append(slot, retry);
                        active = (retry, retry_at);
                        previous = None;
                    }
                    continue;
                }
            }
        }
        // No fallback available: the nearest candidate seeds a fresh cluster.
        builder.seal(slot);
        slot = builder.open(None);
        builder.append(slot, next);
        unassigned.remove(&next);
        active = (next, at);
        previous = None;
    }

    let clusters = builder.finish();
    let assigned: usize = clusters.iter().map(Cluster::len).sum();
    if assigned != total {
        return Err(ClusterError::AssignmentInvariant(format!(
            "greedy chain assigned {assigned} of {total} buildings"
        )));
    }
    debug!(
        clusters = clusters.len(),
        buildings = total,
        "greedy chain finished"
    );
    Ok(clusters)
}

/// Building with the smallest x coordinate, ties broken by y, then id.
fn westmost(positions: &BTreeMap<BuildingId, Point<f64>>) -> Option<(BuildingId, Point<f64>)> {
    positions
        .iter()
        .min_by(|a, b| {
            a.1.x()
                .total_cmp(&b.1.x())
                .then_with(|| a.1.y().total_cmp(&b.1.y()))
                .then_with(|| a.0.cmp(b.0))
        })
        .map(|(&id, &at)| (id, at))
}

fn append_chained(
    builder: &mut ClusterBuilder,
    slot: &mut usize,
    max_size: usize,
    building: BuildingId,
) {
    if builder.cluster(*slot).is_full(max_size) {
        builder.seal(*slot);
        *slot = builder.open(None);
    }
    builder.append(*slot, building);
}

fn nearest_to_point(
    from: Point<f64>,
    unassigned: &BTreeSet<BuildingId>,
    positions: &BTreeMap<BuildingId, Point<f64>>,
) -> Option<(BuildingId, Point<f64>, Meters)> {
    let mut best: Option<(BuildingId, Point<f64>, Meters)> = None;
    for &candidate in unassigned {
        let Some(&at) = positions.get(&candidate) else {
            continue;
        };
        let distance = geometry::distance(from, at);
        if best.map_or(true, |(_, _, d)| distance.value() < d.value()) {
            best = Some((candidate, at, distance));
        }
    }
    best
}

/// Nearest unassigned building measured against the closest cluster member.
fn nearest_to_members(
    members: &[BuildingId],
    unassigned: &BTreeSet<BuildingId>,
    positions: &BTreeMap<BuildingId, Point<f64>>,
) -> Option<(BuildingId, Point<f64>, Meters)> {
    let mut best: Option<(BuildingId, Point<f64>, Meters)> = None;
    for &candidate in unassigned {
        let Some(&at) = positions.get(&candidate) else {
            continue;
        };
        let mut nearest: Option<f64> = None;
        for member in members {
            let Some(&member_at) = positions.get(member) else {
                continue;
            };
            let d = geometry::distance(at, member_at).value();
            if nearest.map_or(true, |n| d < n) {
                nearest = Some(d);
            }
        }
        let Some(d) = nearest else {
            continue;
        };
        if best.map_or(true, |(_, _, b)| d < b.value()) {
            best = Some((candidate, at, Meters::new(d)));
        }
    }
    best
}
