//! Building projection onto the street network.
//!
//! Every building is projected onto its globally closest segment (or street
//! node) once per run. [`project`] performs the pure scan and produces a
//! [`ProjectionIndex`]; [`apply`] then materializes the result in the graph:
//! a synthetic foot-point node per edge-anchored building, link edges
//! chaining the foot points along their segment, and one connector per
//! building. After `apply`, "network distance between two buildings" is an
//! ordinary shortest-path query.
//!
//! Original segments are never removed or split, so edge indices recorded by
//! the street decomposition stay valid for the whole run.

use crate::config::ProjectionMode;
use crate::decompose::LogicalStreet;
use crate::error::{ClusterError, ClusterResult};
use dhp_core::{
    geometry, Building, BuildingId, Connector, EdgeIndex, Link, Meters, Node, StreetGraph,
    StreetId, StreetNode, StreetNodeId,
};
use geo::Point;
use std::collections::BTreeMap;

/// Distances closer than this count as equal when picking the best segment.
const TIE_EPS: f64 = 1e-9;
/// Foot points this close to a segment endpoint snap onto the street node.
const SNAP_EPS: f64 = 1e-6;

/// Where one building attaches to the street network.
#[derive(Debug, Clone)]
pub enum Anchor {
    /// Closest point coincides with an existing street node.
    Node { node: StreetNodeId, distance: Meters },
    /// Closest point lies strictly inside a segment.
    Edge {
        /// Endpoint ids of the segment, smaller id first.
        key: (StreetNodeId, StreetNodeId),
        edge: EdgeIndex,
        /// Logical street of the segment, when projected per street.
        street: Option<StreetId>,
        foot: Point<f64>,
        /// Position along the segment, measured from the smaller-id endpoint.
        param: f64,
        distance: Meters,
    },
}

impl Anchor {
    /// Distance from the building to its anchor point.
    pub fn distance(&self) -> Meters {
        match self {
            Anchor::Node { distance, .. } => *distance,
            Anchor::Edge { distance, .. } => *distance,
        }
    }
}

/// Immutable projection result for one clustering run.
#[derive(Debug, Default)]
pub struct ProjectionIndex {
    anchors: BTreeMap<BuildingId, Anchor>,
    /// Street node each connector attaches to; filled by [`apply`].
    anchor_nodes: BTreeMap<BuildingId, StreetNodeId>,
    /// Buildings snapped onto a street node, sorted by distance to it.
    by_node: BTreeMap<StreetNodeId, Vec<BuildingId>>,
    /// Buildings per segment key, sorted by position along the segment.
    by_edge: BTreeMap<(StreetNodeId, StreetNodeId), Vec<BuildingId>>,
}

impl ProjectionIndex {
    pub fn anchor(&self, building: BuildingId) -> Option<&Anchor> {
        self.anchors.get(&building)
    }

    /// Street node the building's connector attaches to (only available
    /// after [`apply`]).
    pub fn anchor_node(&self, building: BuildingId) -> Option<StreetNodeId> {
        self.anchor_nodes.get(&building).copied()
    }

    /// Buildings anchored exactly at a street node, nearest first.
    pub fn buildings_at_node(&self, node: StreetNodeId) -> &[BuildingId] {
        self.by_node.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Buildings anchored inside a segment, ordered by position along it
    /// (measured from the smaller-id endpoint).
    pub fn buildings_on_edge(&self, key: (StreetNodeId, StreetNodeId)) -> &[BuildingId] {
        self.by_edge.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of projected buildings.
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

struct Candidate {
    edge: EdgeIndex,
    street: Option<StreetId>,
    /// Tie-break rank: street id in per-street mode, edge index in raw mode.
    rank: usize,
}

/// Project every building onto its closest segment or street node.
///
/// The scan covers segments street by street in [`ProjectionMode::PerStreet`]
/// or the raw edge set in [`ProjectionMode::Raw`]. Equal distances (within
/// `1e-9`) resolve to the lower street id, then the lower edge index, so
/// repeated runs agree.
pub fn project(
    graph: &StreetGraph,
    streets: &[LogicalStreet],
    mode: ProjectionMode,
) -> ClusterResult<ProjectionIndex> {
    let mut buildings: Vec<&Building> = graph.buildings();
    buildings.sort_by_key(|building| building.id);
    if buildings.is_empty() {
        return Ok(ProjectionIndex::default());
    }

    let candidates = candidate_segments(graph, streets, mode);
    if candidates.is_empty() {
        return Err(ClusterError::Topology(
            "no street segments to project buildings onto".to_string(),
        ));
    }

    let mut index = ProjectionIndex::default();
    for building in buildings {
        let anchor = best_anchor(graph, building, &candidates)?;
        match &anchor {
            Anchor::Node { node, .. } => {
                index.by_node.entry(*node).or_default().push(building.id);
            }
            Anchor::Edge { key, .. } => {
                index.by_edge.entry(*key).or_default().push(building.id);
            }
        }
        index.anchors.insert(building.id, anchor);
    }

    // Orderings the partitioners rely on: nearest-first at nodes,
    // position-first along edges. Building id breaks exact ties.
    let anchors = &index.anchors;
    for list in index.by_node.values_mut() {
        list.sort_by(|a, b| {
            let da = anchors[a].distance().value();
            let db = anchors[b].distance().value();
            da.total_cmp(&db).then(a.cmp(b))
        });
    }
    for list in index.by_edge.values_mut() {
        list.sort_by(|a, b| {
            let pa = edge_param(&anchors[a]);
            let pb = edge_param(&anchors[b]);
            pa.total_cmp(&pb).then(a.cmp(b))
        });
    }

    Ok(index)
}

fn edge_param(anchor: &Anchor) -> f64 {
    match anchor {
        Anchor::Edge { param, .. } => *param,
        Anchor::Node { .. } => 0.0,
    }
}

fn candidate_segments(
    graph: &StreetGraph,
    streets: &[LogicalStreet],
    mode: ProjectionMode,
) -> Vec<Candidate> {
    match mode {
        ProjectionMode::PerStreet => {
            let mut candidates = Vec::new();
            for street in streets {
                for &edge in &street.segments {
                    candidates.push(Candidate {
                        edge,
                        street: Some(street.id),
                        rank: street.id.value(),
                    });
                }
            }
            candidates
        }
        ProjectionMode::Raw => {
            let mut edges: Vec<EdgeIndex> = graph
                .graph
                .edge_indices()
                .filter(|&edge| {
                    matches!(graph.graph.edge_weight(edge), Some(dhp_core::Edge::Segment(_)))
                })
                .collect();
            edges.sort();
            edges
                .into_iter()
                .map(|edge| Candidate {
                    edge,
                    street: None,
                    rank: edge.index(),
                })
                .collect()
        }
    }
}

fn best_anchor(
    graph: &StreetGraph,
    building: &Building,
    candidates: &[Candidate],
) -> ClusterResult<Anchor> {
    struct Best {
        edge: EdgeIndex,
        street: Option<StreetId>,
        rank: usize,
        foot: Point<f64>,
        param: f64,
        distance: f64,
    }

    let mut best: Option<Best> = None;
    for candidate in candidates {
        let Some((from_idx, to_idx)) = graph.graph.edge_endpoints(candidate.edge) else {
            continue;
        };
        let (Some(from_pos), Some(to_pos)) =
            (graph.node_position(from_idx), graph.node_position(to_idx))
        else {
            continue;
        };
        let projected = geometry::project_point_to_segment(building.position, from_pos, to_pos);
        let distance = projected.distance.value();

        let improves = match &best {
            None => true,
            Some(current) => {
                if (distance - current.distance).abs() <= TIE_EPS {
                    (candidate.rank, candidate.edge.index()) < (current.rank, current.edge.index())
                } else {
                    distance < current.distance
                }
            }
        };
        if improves {
            best = Some(Best {
                edge: candidate.edge,
                street: candidate.street,
                rank: candidate.rank,
                foot: projected.foot,
                param: projected.param,
                distance,
            });
        }
    }

    let best = best.ok_or_else(|| {
        ClusterError::Topology(format!(
            "building {} could not be projected onto any segment",
            building.id.value()
        ))
    })?;

    let Some((from_idx, to_idx)) = graph.graph.edge_endpoints(best.edge) else {
        return Err(ClusterError::Topology(format!(
            "projection target edge for building {} vanished",
            building.id.value()
        )));
    };
    let (Some(from_id), Some(to_id)) = (street_id_at(graph, from_idx), street_id_at(graph, to_idx))
    else {
        return Err(ClusterError::Topology(format!(
            "projection target edge for building {} has non-street endpoints",
            building.id.value()
        )));
    };
    let from_pos = graph.node_position(from_idx).unwrap_or(best.foot);
    let to_pos = graph.node_position(to_idx).unwrap_or(best.foot);

    // Foot points on (or numerically at) an endpoint snap to that node.
    let snaps_to_from =
        best.param <= SNAP_EPS || geometry::distance(best.foot, from_pos).value() <= SNAP_EPS;
    let snaps_to_to =
        best.param >= 1.0 - SNAP_EPS || geometry::distance(best.foot, to_pos).value() <= SNAP_EPS;
    if snaps_to_from {
        return Ok(Anchor::Node {
            node: from_id,
            distance: geometry::distance(building.position, from_pos),
        });
    }
    if snaps_to_to {
        return Ok(Anchor::Node {
            node: to_id,
            distance: geometry::distance(building.position, to_pos),
        });
    }

    // Normalize so the key is ordered and the parameter runs from the
    // smaller-id endpoint regardless of segment orientation.
    let (key, param) = if from_id <= to_id {
        ((from_id, to_id), best.param)
    } else {
        ((to_id, from_id), 1.0 - best.param)
    };
    Ok(Anchor::Edge {
        key,
        edge: best.edge,
        street: best.street,
        foot: best.foot,
        param,
        distance: Meters(best.distance),
    })
}

fn street_id_at(graph: &StreetGraph, idx: dhp_core::NodeIndex) -> Option<StreetNodeId> {
    match graph.graph.node_weight(idx) {
        Some(Node::Street(street_node)) => Some(street_node.id),
        _ => None,
    }
}

/// Materialize the projection in the graph.
///
/// Edge-anchored buildings get a synthetic foot-point node; foot points on
/// the same segment are chained between its endpoints with link edges. Every
/// building gets exactly one connector to its anchor node. The index's
/// `anchor_node` lookup becomes available afterwards.
pub fn apply(graph: &mut StreetGraph, index: &mut ProjectionIndex) -> ClusterResult<()> {
    let mut next_node_id = graph
        .street_nodes()
        .iter()
        .map(|node| node.id.value() + 1)
        .max()
        .unwrap_or(0);

    let graph_error = |err: dhp_core::DhpError| ClusterError::Topology(err.to_string());

    // Chain foot points segment by segment, in key order for stable ids.
    let mut connectors: Vec<(BuildingId, StreetNodeId)> = Vec::new();
    for (key, buildings) in &index.by_edge {
        let mut previous = key.0;
        for &building in buildings {
            let Some(Anchor::Edge { foot, .. }) = index.anchors.get(&building) else {
                continue;
            };
            let foot_id = StreetNodeId::new(next_node_id);
            next_node_id += 1;
            graph
                .add_street_node(StreetNode::projected(
                    foot_id,
                    format!("foot b{}", building.value()),
                    *foot,
                ))
                .map_err(graph_error)?;
            graph
                .add_link(Link::new(previous, foot_id))
                .map_err(graph_error)?;
            connectors.push((building, foot_id));
            previous = foot_id;
        }
        graph.add_link(Link::new(previous, key.1)).map_err(graph_error)?;
    }

    for &(building, foot_id) in &connectors {
        graph
            .add_connector(Connector::new(building, foot_id))
            .map_err(graph_error)?;
        index.anchor_nodes.insert(building, foot_id);
    }

    // Node-anchored buildings connect straight to the existing street node.
    for (building, anchor) in &index.anchors {
        if let Anchor::Node { node, .. } = anchor {
            graph
                .add_connector(Connector::new(*building, *node))
                .map_err(graph_error)?;
            index.anchor_nodes.insert(*building, *node);
        }
    }

    Ok(())
}
