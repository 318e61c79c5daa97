//! Topology-driven sequential partitioner.
//!
//! Walks the street graph junction by junction with a small state machine
//! and assigns projected buildings to capacity-bounded clusters in walk
//! order. At each junction the buildings anchored on the junction itself are
//! placed first, then the buildings along each incident segment in the
//! direction of travel. A rejected candidate is never dropped: rejection
//! opens a fresh cluster (or, in compact mode, reuses the best still-open
//! one) and the candidate becomes its member.

use crate::cluster::{Cluster, ClusterBuilder};
use crate::config::{ClusterConfig, ClusterOpenPolicy};
use crate::error::ClusterResult;
use crate::projection::ProjectionIndex;
use dhp_core::{geometry, BuildingId, Node, NodeIndex, StreetGraph, StreetNodeId, StreetNodeKind};
use geo::Point;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// States of the junction walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WalkState {
    SelectStart,
    ProcessNode(NodeIndex),
    ProcessEdges(NodeIndex),
    Advance(NodeIndex),
    Done,
}

/// Partition projected buildings by walking the street topology.
///
/// The walk starts at the junction with the lowest street degree (lowest id
/// on ties), handles node-anchored then edge-anchored buildings, and advances
/// breadth-wise until every junction has been visited, jumping to untouched
/// components when the current one is exhausted.
pub fn partition(
    graph: &StreetGraph,
    index: &ProjectionIndex,
    config: &ClusterConfig,
) -> ClusterResult<Vec<Cluster>> {
    let mut run = PartitionRun::new(graph, index, config);
    let mut state = WalkState::SelectStart;
    loop {
        state = match state {
            WalkState::SelectStart => match run.select_start() {
                Some(node) => WalkState::ProcessNode(node),
                None => WalkState::Done,
            },
            WalkState::ProcessNode(node) => {
                run.process_node(node);
                WalkState::ProcessEdges(node)
            }
            WalkState::ProcessEdges(node) => {
                run.process_edges(node);
                WalkState::Advance(node)
            }
            WalkState::Advance(node) => match run.advance(node) {
                Some(next) => WalkState::ProcessNode(next),
                None => WalkState::Done,
            },
            WalkState::Done => break,
        };
    }
    debug_assert_eq!(run.assigned.len(), index.len());
    let clusters = run.builder.finish();
    debug!(clusters = clusters.len(), "topology walk finished");
    Ok(clusters)
}

struct PartitionRun<'a> {
    graph: &'a StreetGraph,
    index: &'a ProjectionIndex,
    config: &'a ClusterConfig,
    positions: BTreeMap<BuildingId, Point<f64>>,
    junctions: BTreeMap<StreetNodeId, NodeIndex>,
    visited: BTreeSet<StreetNodeId>,
    assigned: BTreeSet<BuildingId>,
    builder: ClusterBuilder,
    /// Slot of the cluster currently accepting candidates.
    current: Option<usize>,
}

impl<'a> PartitionRun<'a> {
    fn new(graph: &'a StreetGraph, index: &'a ProjectionIndex, config: &'a ClusterConfig) -> Self {
        let positions = graph
            .buildings()
            .iter()
            .map(|b| (b.id, b.position))
            .collect();
        let junctions = graph
            .graph
            .node_indices()
            .filter_map(|idx| match graph.graph.node_weight(idx) {
                Some(Node::Street(s)) if matches!(s.kind, StreetNodeKind::Junction) => {
                    Some((s.id, idx))
                }
                _ => None,
            })
            .collect();
        Self {
            graph,
            index,
            config,
            positions,
            junctions,
            visited: BTreeSet::new(),
            assigned: BTreeSet::new(),
            builder: ClusterBuilder::new(config.first_cluster_id),
            current: None,
        }
    }

    /// Junction with the lowest street degree, ties broken by id.
    fn select_start(&self) -> Option<NodeIndex> {
        self.junctions
            .iter()
            .min_by_key(|(id, idx)| (self.graph.street_degree(**idx), **id))
            .map(|(_, &idx)| idx)
    }

    fn street_id(&self, node: NodeIndex) -> Option<StreetNodeId> {
        match self.graph.graph.node_weight(node) {
            Some(Node::Street(s)) => Some(s.id),
            _ => None,
        }
    }

    /// Place the buildings anchored directly at this junction, nearest first.
    fn process_node(&mut self, node: NodeIndex) {
        let Some(id) = self.street_id(node) else {
            return;
        };
        let index = self.index;
        for &building in index.buildings_at_node(id) {
            if self.assigned.contains(&building) {
                continue;
            }
            self.place(building, id);
        }
    }

    /// Place the buildings along each incident segment, ordered away from the
    /// current junction.
    fn process_edges(&mut self, node: NodeIndex) {
        let Some(current_id) = self.street_id(node) else {
            return;
        };
        let index = self.index;
        for edge in self.graph.segment_edges(node) {
            let Some((a, b)) = self.graph.graph.edge_endpoints(edge) else {
                continue;
            };
            let (Some(a_id), Some(b_id)) = (self.street_id(a), self.street_id(b)) else {
                continue;
            };
            let key = if a_id <= b_id { (a_id, b_id) } else { (b_id, a_id) };
            let along = index.buildings_on_edge(key);
            // Foot-point order runs from the lower-id endpoint; flip it when
            // we stand at the other end so placement follows the walk.
            if current_id == key.0 {
                for &building in along {
                    if !self.assigned.contains(&building) {
                        self.place(building, current_id);
                    }
                }
            } else {
                for &building in along.iter().rev() {
                    if !self.assigned.contains(&building) {
                        self.place(building, current_id);
                    }
                }
            }
        }
    }

    /// Try the open cluster; on any rejection the candidate moves to a fresh
    /// or reopened cluster instead.
    fn place(&mut self, building: BuildingId, at: StreetNodeId) {
        let street_bound = self.config.max_building_to_street_distance;
        let too_far = self
            .index
            .anchor(building)
            .map_or(true, |a| a.distance().value() > street_bound.value());
        if too_far {
            self.relocate(building, at);
            return;
        }
        let Some(slot) = self.current else {
            let slot = self.builder.open(Some(at));
            self.builder.append(slot, building);
            self.assigned.insert(building);
            self.current = Some(slot);
            return;
        };
        if self.builder.cluster(slot).is_full(self.config.max_cluster_size)
            || !self.admits(slot, building)
        {
            self.relocate(building, at);
            return;
        }
        self.builder.append(slot, building);
        self.assigned.insert(building);
    }

    fn admits(&self, slot: usize, building: BuildingId) -> bool {
        let Some(&position) = self.positions.get(&building) else {
            return false;
        };
        let members = self
            .builder
            .members(slot)
            .iter()
            .filter_map(|m| self.positions.get(m).copied());
        self.config.proximity_policy.admits(
            position,
            members,
            self.config.max_building_to_building_distance,
        )
    }

    /// Rejection path: eager mode seals the open cluster and starts fresh,
    /// compact mode reuses the cheapest still-open cluster that admits the
    /// candidate.
    fn relocate(&mut self, building: BuildingId, at: StreetNodeId) {
        match self.config.cluster_open_policy {
            ClusterOpenPolicy::Eager => {
                if let Some(slot) = self.current {
                    self.builder.seal(slot);
                }
                let slot = self.builder.open(Some(at));
                self.builder.append(slot, building);
                self.current = Some(slot);
            }
            ClusterOpenPolicy::Compact => {
                let Some(&position) = self.positions.get(&building) else {
                    let slot = self.builder.open(Some(at));
                    self.builder.append(slot, building);
                    self.current = Some(slot);
                    self.assigned.insert(building);
                    return;
                };
                let positions = &self.positions;
                let policy = self.config.proximity_policy;
                let neighbor_bound = self.config.max_building_to_building_distance;
                let max_size = self.config.max_cluster_size;
                let slot = self.builder.reopen_or_create(Some(at), |cluster| {
                    if cluster.is_full(max_size) {
                        return None;
                    }
                    let members =
                        || cluster.members.iter().filter_map(|m| positions.get(m).copied());
                    if !policy.admits(position, members(), neighbor_bound) {
                        return None;
                    }
                    // Cost is the mean distance to the members, so the
                    // geometrically closest open cluster wins.
                    let (count, total) = members().fold((0usize, 0.0), |(c, t), p| {
                        (c + 1, t + geometry::distance(position, p).value())
                    });
                    if count == 0 {
                        Some(0.0)
                    } else {
                        Some(total / count as f64)
                    }
                });
                self.builder.append(slot, building);
                self.current = Some(slot);
            }
        }
        self.assigned.insert(building);
    }

    /// Next junction: unvisited neighbor of the current one, else the first
    /// frontier neighbor of any visited junction, else the lowest-id junction
    /// of an untouched component.
    fn advance(&mut self, current: NodeIndex) -> Option<NodeIndex> {
        if let Some(id) = self.street_id(current) {
            self.visited.insert(id);
        }
        if let Some(next) = self.unvisited_neighbor(current) {
            return Some(next);
        }
        for &id in &self.visited {
            let Some(&idx) = self.junctions.get(&id) else {
                continue;
            };
            if let Some(next) = self.unvisited_neighbor(idx) {
                return Some(next);
            }
        }
        self.junctions
            .iter()
            .find(|(id, _)| !self.visited.contains(*id))
            .map(|(_, &idx)| idx)
    }

    fn unvisited_neighbor(&self, node: NodeIndex) -> Option<NodeIndex> {
        let mut best: Option<(StreetNodeId, NodeIndex)> = None;
        for edge in self.graph.segment_edges(node) {
            let Some((a, b)) = self.graph.graph.edge_endpoints(edge) else {
                continue;
            };
            let other = if a == node { b } else { a };
            let Some(id) = self.street_id(other) else {
                continue;
            };
            if self.visited.contains(&id) || !self.junctions.contains_key(&id) {
                continue;
            }
            if best.map_or(true, |(best_id, _)| id < best_id) {
                best = Some((id, other));
            }
        }
        best.map(|(_, idx)| idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClusterOpenPolicy, ProximityPolicy};
    use crate::decompose::decompose;
    use crate::projection::{apply, project};
    use dhp_core::{Building, Meters, Segment, SegmentId, StreetNode};

    fn grid_graph(nodes: &[(f64, f64)], buildings: &[(f64, f64)]) -> StreetGraph {
        let mut graph = StreetGraph::new();
        for (i, &(x, y)) in nodes.iter().enumerate() {
            graph
                .add_street_node(StreetNode::junction(
                    StreetNodeId::new(i),
                    format!("n{i}"),
                    Point::new(x, y),
                ))
                .unwrap();
        }
        for i in 1..nodes.len() {
            graph
                .add_segment(Segment::new(
                    SegmentId::new(i - 1),
                    format!("s{}", i - 1),
                    StreetNodeId::new(i - 1),
                    StreetNodeId::new(i),
                ))
                .unwrap();
        }
        for (i, &(x, y)) in buildings.iter().enumerate() {
            graph
                .add_building(Building::new(
                    BuildingId::new(i),
                    format!("b{i}"),
                    Point::new(x, y),
                ))
                .unwrap();
        }
        graph
    }

    fn run_pipeline(graph: &StreetGraph, config: &ClusterConfig) -> Vec<Cluster> {
        let streets = decompose(graph, &config.decomposition).unwrap();
        let mut graph = graph.clone();
        let mut index = project(&graph, &streets, config.projection_mode).unwrap();
        apply(&mut graph, &mut index).unwrap();
        partition(&graph, &index, config).unwrap()
    }

    fn member_values(cluster: &Cluster) -> Vec<usize> {
        cluster.members.iter().map(|b| b.value()).collect()
    }

    #[test]
    fn test_capacity_splits_line_into_contiguous_clusters() {
        let graph = grid_graph(
            &[(0.0, 0.0), (20.0, 0.0)],
            &[
                (2.0, 1.0),
                (4.0, 1.0),
                (6.0, 1.0),
                (8.0, 1.0),
                (10.0, 1.0),
                (12.0, 1.0),
            ],
        );
        let config = ClusterConfig {
            max_cluster_size: 2,
            ..ClusterConfig::default()
        };
        let clusters = run_pipeline(&graph, &config);
        assert_eq!(clusters.len(), 3, "six buildings at capacity two");
        assert_eq!(member_values(&clusters[0]), vec![0, 1]);
        assert_eq!(member_values(&clusters[1]), vec![2, 3]);
        assert_eq!(member_values(&clusters[2]), vec![4, 5]);
        assert_eq!(clusters[0].id.value(), 0);
        assert_eq!(clusters[2].id.value(), 2);
        assert_eq!(clusters[0].anchor, Some(StreetNodeId::new(0)));
    }

    #[test]
    fn test_node_anchored_buildings_placed_before_edge_buildings() {
        let graph = grid_graph(&[(0.0, 0.0), (20.0, 0.0)], &[(10.0, 1.0), (0.0, 3.0)]);
        let config = ClusterConfig::default();
        let clusters = run_pipeline(&graph, &config);
        assert_eq!(clusters.len(), 1);
        // Building 1 snaps onto the start junction and is handled first.
        assert_eq!(member_values(&clusters[0]), vec![1, 0]);
    }

    #[test]
    fn test_building_beyond_street_bound_gets_own_cluster() {
        let graph = grid_graph(
            &[(0.0, 0.0), (40.0, 0.0)],
            &[(5.0, 2.0), (10.0, 2.0), (20.0, 80.0)],
        );
        let config = ClusterConfig::default();
        let clusters = run_pipeline(&graph, &config);
        assert_eq!(clusters.len(), 2);
        assert_eq!(member_values(&clusters[0]), vec![0, 1]);
        assert_eq!(member_values(&clusters[1]), vec![2]);
    }

    #[test]
    fn test_compact_mode_reuses_open_cluster() {
        // U-shaped street; the last building sits far along the walk but
        // geometrically next to the first cluster.
        let nodes = [(0.0, 0.0), (40.0, 0.0), (40.0, 6.0), (0.0, 6.0)];
        let buildings = [(2.0, -1.0), (4.0, -1.0), (38.0, 7.0), (2.0, 7.0)];
        let base = ClusterConfig {
            max_cluster_size: 3,
            max_building_to_building_distance: Meters::new(10.0),
            proximity_policy: ProximityPolicy::SingleNeighbor,
            ..ClusterConfig::default()
        };

        let eager = run_pipeline(
            &grid_graph(&nodes, &buildings),
            &ClusterConfig {
                cluster_open_policy: ClusterOpenPolicy::Eager,
                ..base.clone()
            },
        );
        assert_eq!(eager.len(), 3, "eager never returns to a sealed cluster");

        let compact = run_pipeline(
            &grid_graph(&nodes, &buildings),
            &ClusterConfig {
                cluster_open_policy: ClusterOpenPolicy::Compact,
                ..base
            },
        );
        assert_eq!(compact.len(), 2);
        assert_eq!(member_values(&compact[0]), vec![0, 1, 3]);
        assert_eq!(member_values(&compact[1]), vec![2]);
    }

    #[test]
    fn test_partition_is_deterministic() {
        let nodes = [(0.0, 0.0), (40.0, 0.0), (40.0, 6.0), (0.0, 6.0)];
        let buildings = [(2.0, -1.0), (4.0, -1.0), (38.0, 7.0), (2.0, 7.0)];
        let config = ClusterConfig::default();
        let first = run_pipeline(&grid_graph(&nodes, &buildings), &config);
        let second = run_pipeline(&grid_graph(&nodes, &buildings), &config);
        let first_members: Vec<Vec<usize>> = first.iter().map(member_values).collect();
        let second_members: Vec<Vec<usize>> = second.iter().map(member_values).collect();
        assert_eq!(first_members, second_members);
    }

    #[test]
    fn test_empty_graph_yields_no_clusters() {
        let graph = StreetGraph::new();
        let config = ClusterConfig::default();
        let index = project(&graph, &[], config.projection_mode).unwrap();
        let clusters = partition(&graph, &index, &config).unwrap();
        assert!(clusters.is_empty());
    }
}
