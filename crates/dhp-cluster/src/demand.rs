//! Demand-priority partitioner.
//!
//! Buildings are ranked by annual demand and the top of the ranking seeds
//! cluster centers, spaced apart by a shrinking minimum distance. Everything
//! else joins the center that is closest over the street network, with
//! spatially adjacent buildings pre-grouped so neighbors land in the same
//! cluster when capacity allows. Clusters over capacity shed members only
//! after the whole assignment pass, per the configured overflow mode.

use crate::cluster::{Cluster, ClusterBuilder};
use crate::config::{ClusterConfig, DemandConfig, DemandMetric, OverflowMode, ProximityPolicy};
use crate::error::{ClusterError, ClusterResult};
use crate::kmeans;
use crate::projection::ProjectionIndex;
use dhp_core::{geometry, Building, BuildingId, KilowattHours, Meters, NodeIndex, StreetGraph};
use geo::Point;
use petgraph::algo::dijkstra;
use petgraph::visit::EdgeRef;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// Below this center spacing the decay loop stops separating anything and
/// the ranking alone decides the remaining centers.
const MIN_CENTER_SPACING: f64 = 1e-6;

struct Ranked {
    id: BuildingId,
    position: Point<f64>,
    demand: KilowattHours,
}

/// Partition buildings around high-demand centers.
///
/// `graph` must be the projected query graph (buildings wired to their foot
/// points), since assignment distances follow the street network. A building
/// with no network path to any center is a topology defect and fails the
/// run.
pub fn partition(
    graph: &StreetGraph,
    index: &ProjectionIndex,
    config: &ClusterConfig,
) -> ClusterResult<Vec<Cluster>> {
    let mut ranked: Vec<Ranked> = graph
        .buildings()
        .iter()
        .map(|b| Ranked {
            id: b.id,
            position: b.position,
            demand: metric_demand(b, config.demand.demand_metric),
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.demand
            .value()
            .total_cmp(&a.demand.value())
            .then_with(|| a.id.cmp(&b.id))
    });
    let total = ranked.len();
    if total == 0 {
        return Ok(Vec::new());
    }

    let target = total.div_ceil(config.max_cluster_size);
    let center_ids: Vec<BuildingId> = select_centers(&ranked, target, &config.demand)
        .into_iter()
        .map(|i| ranked[i].id)
        .collect();
    debug!(
        centers = center_ids.len(),
        target, "demand centers selected"
    );

    let positions: BTreeMap<BuildingId, Point<f64>> =
        ranked.iter().map(|r| (r.id, r.position)).collect();
    let demands: BTreeMap<BuildingId, KilowattHours> =
        ranked.iter().map(|r| (r.id, r.demand)).collect();
    let building_nodes: BTreeMap<BuildingId, NodeIndex> = ranked
        .iter()
        .filter_map(|r| graph.building_index(r.id).map(|n| (r.id, n)))
        .collect();

    let groups = neighbor_groups(
        &positions,
        &center_ids,
        config.proximity_policy,
        config.max_building_to_building_distance,
        config.max_cluster_size,
    );

    // One shortest-path map per center over the query graph.
    let center_nodes: Vec<NodeIndex> = center_ids
        .iter()
        .map(|&id| {
            graph.building_index(id).ok_or_else(|| {
                ClusterError::Topology(format!(
                    "center building {} is not in the graph",
                    id.value()
                ))
            })
        })
        .collect::<ClusterResult<_>>()?;
    let distance_maps: Vec<HashMap<NodeIndex, f64>> = center_nodes
        .par_iter()
        .map(|&start| {
            dijkstra(&graph.graph, start, None, |e| {
                graph
                    .edge_length(e.id())
                    .map(Meters::value)
                    .unwrap_or(f64::INFINITY)
            })
        })
        .collect();

    let mut memberships: Vec<Vec<BuildingId>> = center_ids.iter().map(|&c| vec![c]).collect();
    for group in groups {
        let nodes: Vec<NodeIndex> = group
            .iter()
            .filter_map(|b| building_nodes.get(b).copied())
            .collect();
        let mut best: Option<(usize, f64)> = None;
        for (k, map) in distance_maps.iter().enumerate() {
            let Some(d) = nearest_member_distance(map, &nodes) else {
                continue;
            };
            if best.map_or(true, |(_, best_d)| d < best_d) {
                best = Some((k, d));
            }
        }
        let Some((k, _)) = best else {
            return Err(ClusterError::Topology(format!(
                "building {} has no network path to any cluster center",
                group.first().map(|b| b.value()).unwrap_or_default()
            )));
        };
        memberships[k].extend(group);
    }

    // Capacity is resolved only after the full assignment pass.
    let mut extras: Vec<Vec<BuildingId>> = Vec::new();
    for (k, members) in memberships.iter_mut().enumerate() {
        if members.len() <= config.max_cluster_size {
            continue;
        }
        let center = center_ids[k];
        let map = &distance_maps[k];
        let path = |b: BuildingId| building_nodes.get(&b).and_then(|n| map.get(n)).copied();
        match config.demand.overflow_mode {
            OverflowMode::Building => evict_until_fits(
                members,
                center,
                config.max_cluster_size,
                &mut extras,
                |b| path(b).unwrap_or(f64::INFINITY),
            ),
            OverflowMode::GroupEnergetic => evict_until_fits(
                members,
                center,
                config.max_cluster_size,
                &mut extras,
                |b| match path(b) {
                    // Lowest demand-per-meter goes first, so negate the
                    // factor; an unreachable member outranks any factor.
                    Some(d) => -demands.get(&b).map_or(0.0, |dem| dem.per_meter(Meters::new(d))),
                    None => 0.0,
                },
            ),
            OverflowMode::KMeans => {
                let points: Vec<(BuildingId, Point<f64>)> = members
                    .iter()
                    .filter_map(|b| positions.get(b).map(|&at| (*b, at)))
                    .collect();
                let split = kmeans::split(
                    &points,
                    config.max_cluster_size,
                    &config.kmeans,
                    config.seed.wrapping_add(k as u64),
                );
                match split {
                    Ok(mut parts) => {
                        let keep = parts
                            .iter()
                            .position(|part| part.contains(&center))
                            .unwrap_or(0);
                        *members = parts.swap_remove(keep);
                        extras.extend(parts);
                    }
                    Err(ClusterError::Convergence { attempts }) => {
                        debug!(
                            attempts,
                            cluster = k,
                            "overflow split failed; falling back to eviction"
                        );
                        evict_until_fits(
                            members,
                            center,
                            config.max_cluster_size,
                            &mut extras,
                            |b| path(b).unwrap_or(f64::INFINITY),
                        );
                    }
                    Err(other) => return Err(other),
                }
            }
        }
    }

    let mut builder = ClusterBuilder::new(config.first_cluster_id);
    for (k, members) in memberships.iter().enumerate() {
        let slot = builder.open(index.anchor_node(center_ids[k]));
        for &building in members {
            builder.append(slot, building);
        }
    }
    for extra in &extras {
        let anchor = extra.first().and_then(|&b| index.anchor_node(b));
        let slot = builder.open(anchor);
        for &building in extra {
            builder.append(slot, building);
        }
    }
    let clusters = builder.finish();
    let assigned: usize = clusters.iter().map(Cluster::len).sum();
    if assigned != total {
        return Err(ClusterError::AssignmentInvariant(format!(
            "demand partition assigned {assigned} of {total} buildings"
        )));
    }
    debug!(
        clusters = clusters.len(),
        buildings = total,
        "demand partition finished"
    );
    Ok(clusters)
}

fn metric_demand(building: &Building, metric: DemandMetric) -> KilowattHours {
    match metric {
        DemandMetric::Heat => building.heat_demand,
        DemandMetric::Power => building.power_demand,
        DemandMetric::Combined => building.heat_demand + building.power_demand,
    }
}

/// Walk the ranking and accept every building spaced clear of all accepted
/// centers; shrink the spacing and restart until the target count is met.
fn select_centers(ranked: &[Ranked], target: usize, config: &DemandConfig) -> Vec<usize> {
    let mut spacing = config.min_center_distance.value();
    loop {
        let mut picked: Vec<usize> = Vec::new();
        for (i, entry) in ranked.iter().enumerate() {
            let clear = picked
                .iter()
                .all(|&p| geometry::distance(entry.position, ranked[p].position).value() > spacing);
            if clear {
                picked.push(i);
            }
        }
        if picked.len() >= target {
            return picked;
        }
        spacing *= config.center_distance_decay;
        if spacing < MIN_CENTER_SPACING {
            // Spacing cannot separate anything any more; top up with the
            // best-ranked leftovers.
            let mut chosen: BTreeSet<usize> = picked.into_iter().collect();
            for i in 0..ranked.len() {
                if chosen.len() >= target {
                    break;
                }
                chosen.insert(i);
            }
            return chosen.into_iter().collect();
        }
    }
}

/// Group non-center buildings that the proximity policy links together, in
/// id order. Groups that alone exceed capacity fall apart into single
/// buildings.
fn neighbor_groups(
    positions: &BTreeMap<BuildingId, Point<f64>>,
    centers: &[BuildingId],
    policy: ProximityPolicy,
    bound: Meters,
    max_cluster_size: usize,
) -> Vec<Vec<BuildingId>> {
    let mut pool: BTreeMap<BuildingId, Point<f64>> = positions.clone();
    for center in centers {
        pool.remove(center);
    }
    let mut groups: Vec<Vec<BuildingId>> = Vec::new();
    while let Some((seed, seed_at)) = pool.pop_first() {
        let mut members = vec![seed];
        let mut spots = vec![seed_at];
        loop {
            let next = pool
                .iter()
                .find(|(_, at)| policy.admits(**at, spots.iter().copied(), bound))
                .map(|(&id, &at)| (id, at));
            let Some((id, at)) = next else {
                break;
            };
            pool.remove(&id);
            members.push(id);
            spots.push(at);
        }
        groups.push(members);
    }
    let mut units = Vec::new();
    for group in groups {
        if group.len() > max_cluster_size {
            units.extend(group.into_iter().map(|b| vec![b]));
        } else {
            units.push(group);
        }
    }
    units
}

fn nearest_member_distance(map: &HashMap<NodeIndex, f64>, nodes: &[NodeIndex]) -> Option<f64> {
    nodes
        .iter()
        .filter_map(|n| map.get(n).copied())
        .min_by(|a, b| a.total_cmp(b))
}

/// Move members out of an oversized cluster into singleton clusters until it
/// fits; `priority` marks the next member to go (higher first). The center
/// itself is never evicted.
fn evict_until_fits<F>(
    members: &mut Vec<BuildingId>,
    center: BuildingId,
    max_cluster_size: usize,
    extras: &mut Vec<Vec<BuildingId>>,
    priority: F,
) where
    F: Fn(BuildingId) -> f64,
{
    while members.len() > max_cluster_size {
        let mut pick: Option<(usize, f64)> = None;
        for (i, &building) in members.iter().enumerate() {
            if building == center {
                continue;
            }
            let key = priority(building);
            if pick.map_or(true, |(_, best)| key > best) {
                pick = Some((i, key));
            }
        }
        let Some((i, _)) = pick else {
            break;
        };
        extras.push(vec![members.remove(i)]);
    }
}
