//! Street decomposition: collapse raw segments into logical streets.
//!
//! A [`LogicalStreet`] is a maximal chain of segments between two
//! topologically significant nodes. Significance is decided per node from
//! its *effective* degree (short dead-end spurs are merged away first):
//!
//! - degree 1: terminal, the street ends here
//! - degree 2: pass-through, the street continues
//! - degree 3: if the two most nearly opposite edges are straight within
//!   the colinear tolerance they form a through street and the third edge
//!   belongs to another street; otherwise a genuine three-way intersection
//! - degree 4 and up: intersection, every edge starts or ends a street here
//!
//! The walk itself is a small state machine over a work-list of unconsumed
//! edges: pick a start half-edge, walk forward until stuck, emit, repeat.
//! Every segment ends up in exactly one street.

use crate::config::DecompositionConfig;
use crate::error::{ClusterError, ClusterResult};
use dhp_core::{geometry, EdgeIndex, Meters, Node, NodeIndex, StreetGraph, StreetId, StreetNodeId};
use geo::Point;
use std::collections::{HashMap, HashSet};
use std::mem;

/// Maximal chain of segments between two topologically significant nodes.
#[derive(Debug, Clone)]
pub struct LogicalStreet {
    pub id: StreetId,
    /// Street nodes along the walk, in traversal order. Spur terminals are
    /// not part of the walk and do not appear here.
    pub nodes: Vec<StreetNodeId>,
    /// Member segments in consumption order, merged spur edges included.
    pub segments: Vec<EdgeIndex>,
    /// Total geometric length of all member segments.
    pub length: Meters,
}

impl LogicalStreet {
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }
}

/// Classification of one street node by effective degree and geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeRole {
    /// No effective edges; nothing to walk here.
    Isolated,
    /// Effective degree 1: streets end here.
    Terminal,
    /// Effective degree 2: streets continue straight through.
    PassThrough,
    /// Effective degree 3 with a straight pair: the pair passes through,
    /// the remaining edge ends a different street.
    Colinear { through: (EdgeIndex, EdgeIndex) },
    /// Every incident edge starts or ends a street here.
    Intersection,
}

/// Walk states of the decomposition machine.
enum WalkState {
    SelectStart,
    Walk { node: NodeIndex, edge: EdgeIndex },
    Emit,
    Done,
}

/// Split the street graph into logical streets.
///
/// Fails with [`ClusterError::Topology`] when the graph has segments but no
/// terminal or intersection anywhere (a closed ring of pass-through nodes
/// gives the walk no place to start).
pub fn decompose(
    graph: &StreetGraph,
    config: &DecompositionConfig,
) -> ClusterResult<Vec<LogicalStreet>> {
    let street_nodes: Vec<NodeIndex> = graph
        .graph
        .node_indices()
        .filter(|idx| matches!(graph.graph[*idx], Node::Street(_)))
        .collect();

    let mut has_segments = false;
    let mut has_anchor = false;
    for &idx in &street_nodes {
        let degree = graph.street_degree(idx);
        if degree > 0 {
            has_segments = true;
        }
        if degree == 1 || degree >= 3 {
            has_anchor = true;
        }
    }
    if has_segments && !has_anchor {
        return Err(ClusterError::Topology(
            "street graph is fully cyclic: no terminal or intersection to start a street from"
                .to_string(),
        ));
    }

    let mut run = DecomposeRun::new(graph, config, &street_nodes);

    let mut state = WalkState::SelectStart;
    loop {
        state = match state {
            WalkState::SelectStart => match run.select_start() {
                Some((node, edge)) => {
                    run.begin_street(node);
                    WalkState::Walk { node, edge }
                }
                None => WalkState::Done,
            },
            WalkState::Walk { node, edge } => match run.step(node, edge) {
                Some((next_node, next_edge)) => WalkState::Walk {
                    node: next_node,
                    edge: next_edge,
                },
                None => WalkState::Emit,
            },
            WalkState::Emit => {
                run.emit();
                WalkState::SelectStart
            }
            WalkState::Done => break,
        };
    }

    Ok(run.streets)
}

struct DecomposeRun<'a> {
    graph: &'a StreetGraph,
    roles: HashMap<NodeIndex, NodeRole>,
    /// Merged spur edges, keyed by the junction they hang off.
    spurs_at: HashMap<NodeIndex, Vec<EdgeIndex>>,
    spur_edges: HashSet<EdgeIndex>,
    consumed: HashSet<EdgeIndex>,
    /// Start half-edges at intersections and at the odd edge of colinear
    /// nodes, tried before terminals.
    primary_starts: Vec<(NodeIndex, EdgeIndex)>,
    terminal_starts: Vec<(NodeIndex, EdgeIndex)>,
    primary_cursor: usize,
    terminal_cursor: usize,
    // Accumulator for the street currently being walked.
    nodes: Vec<NodeIndex>,
    segments: Vec<EdgeIndex>,
    streets: Vec<LogicalStreet>,
}

impl<'a> DecomposeRun<'a> {
    fn new(
        graph: &'a StreetGraph,
        config: &DecompositionConfig,
        street_nodes: &[NodeIndex],
    ) -> Self {
        // Spur pass: a dead-end edge short enough to be a driveway, hanging
        // off a junction, is merged into the street through that junction
        // instead of fragmenting it into an intersection.
        let mut spur_edges = HashSet::new();
        let mut spurs_at: HashMap<NodeIndex, Vec<EdgeIndex>> = HashMap::new();
        for &idx in street_nodes {
            if graph.street_degree(idx) != 1 {
                continue;
            }
            let Some(&edge) = graph.segment_edges(idx).first() else {
                continue;
            };
            let Some(junction) = opposite_endpoint(graph, edge, idx) else {
                continue;
            };
            if graph.street_degree(junction) < 3 {
                continue;
            }
            let short = graph
                .edge_length(edge)
                .map_or(false, |length| length.value() <= config.side_street_max.value());
            if short {
                spur_edges.insert(edge);
                spurs_at.entry(junction).or_default().push(edge);
            }
        }
        for spurs in spurs_at.values_mut() {
            spurs.sort();
        }

        let mut roles = HashMap::new();
        let mut primary_starts = Vec::new();
        let mut terminal_starts = Vec::new();
        for &idx in street_nodes {
            let effective: Vec<EdgeIndex> = graph
                .segment_edges(idx)
                .into_iter()
                .filter(|edge| !spur_edges.contains(edge))
                .collect();
            let role = classify(graph, idx, &effective, config.colinear_tolerance_deg);
            match role {
                NodeRole::Terminal => {
                    if let Some(&edge) = effective.first() {
                        terminal_starts.push((idx, edge));
                    }
                }
                NodeRole::Intersection => {
                    for &edge in &effective {
                        primary_starts.push((idx, edge));
                    }
                }
                NodeRole::Colinear { through } => {
                    for &edge in &effective {
                        if edge != through.0 && edge != through.1 {
                            primary_starts.push((idx, edge));
                        }
                    }
                }
                NodeRole::PassThrough | NodeRole::Isolated => {}
            }
            roles.insert(idx, role);
        }

        Self {
            graph,
            roles,
            spurs_at,
            spur_edges,
            consumed: HashSet::new(),
            primary_starts,
            terminal_starts,
            primary_cursor: 0,
            terminal_cursor: 0,
            nodes: Vec::new(),
            segments: Vec::new(),
            streets: Vec::new(),
        }
    }

    /// Next start half-edge: intersections first, then unmerged terminals,
    /// then any leftover edge (cycles hanging off the walked network).
    fn select_start(&mut self) -> Option<(NodeIndex, EdgeIndex)> {
        while self.primary_cursor < self.primary_starts.len() {
            let candidate = self.primary_starts[self.primary_cursor];
            self.primary_cursor += 1;
            if !self.consumed.contains(&candidate.1) {
                return Some(candidate);
            }
        }
        while self.terminal_cursor < self.terminal_starts.len() {
            let candidate = self.terminal_starts[self.terminal_cursor];
            self.terminal_cursor += 1;
            if !self.consumed.contains(&candidate.1) {
                return Some(candidate);
            }
        }
        // Leftovers are rings reachable only through pass-through nodes.
        // Walk them from their lowest-index edge so output stays stable.
        let mut leftover: Vec<EdgeIndex> = Vec::new();
        for edge in self.graph.graph.edge_indices() {
            if matches!(self.graph.graph.edge_weight(edge), Some(dhp_core::Edge::Segment(_)))
                && !self.consumed.contains(&edge)
            {
                leftover.push(edge);
            }
        }
        leftover.sort();
        let edge = *leftover.first()?;
        let (a, b) = self.graph.graph.edge_endpoints(edge)?;
        let start = if a.index() <= b.index() { a } else { b };
        Some((start, edge))
    }

    fn begin_street(&mut self, start: NodeIndex) {
        self.nodes.push(start);
    }

    /// Consume one edge and report where the walk continues, if anywhere.
    fn step(&mut self, node: NodeIndex, edge: EdgeIndex) -> Option<(NodeIndex, EdgeIndex)> {
        self.consumed.insert(edge);
        self.segments.push(edge);
        let next = opposite_endpoint(self.graph, edge, node)?;
        self.nodes.push(next);
        self.claim_spurs(next);

        // Spur edges never continue a walk.
        if self.spur_edges.contains(&edge) {
            return None;
        }

        let continuation = match self.roles.get(&next)? {
            NodeRole::PassThrough => self
                .effective_edges(next)
                .into_iter()
                .find(|candidate| *candidate != edge),
            NodeRole::Colinear { through } => {
                if edge == through.0 {
                    Some(through.1)
                } else if edge == through.1 {
                    Some(through.0)
                } else {
                    None
                }
            }
            NodeRole::Terminal | NodeRole::Intersection | NodeRole::Isolated => None,
        }?;

        if self.consumed.contains(&continuation) {
            return None;
        }
        Some((next, continuation))
    }

    fn emit(&mut self) {
        // The first street through a junction claims its spurs; the start
        // node is only covered here since step() never arrives at it.
        if let Some(&start) = self.nodes.first() {
            self.claim_spurs(start);
        }

        let segments = mem::take(&mut self.segments);
        let nodes = mem::take(&mut self.nodes);
        let length: Meters = segments
            .iter()
            .filter_map(|&edge| self.graph.edge_length(edge))
            .sum();
        let node_ids = nodes
            .into_iter()
            .filter_map(|idx| match self.graph.graph.node_weight(idx) {
                Some(Node::Street(street_node)) => Some(street_node.id),
                _ => None,
            })
            .collect();

        self.streets.push(LogicalStreet {
            id: StreetId::new(self.streets.len()),
            nodes: node_ids,
            segments,
            length,
        });
    }

    fn claim_spurs(&mut self, node: NodeIndex) {
        let Some(spurs) = self.spurs_at.get(&node) else {
            return;
        };
        for &spur in spurs {
            if self.consumed.insert(spur) {
                self.segments.push(spur);
            }
        }
    }

    fn effective_edges(&self, node: NodeIndex) -> Vec<EdgeIndex> {
        self.graph
            .segment_edges(node)
            .into_iter()
            .filter(|edge| !self.spur_edges.contains(edge))
            .collect()
    }
}

/// Role of a node given its effective (non-spur) incident edges.
fn classify(
    graph: &StreetGraph,
    node: NodeIndex,
    effective: &[EdgeIndex],
    colinear_tolerance_deg: f64,
) -> NodeRole {
    match effective.len() {
        0 => NodeRole::Isolated,
        1 => NodeRole::Terminal,
        2 => NodeRole::PassThrough,
        3 => match straightest_pair(graph, node, effective, colinear_tolerance_deg) {
            Some(through) => NodeRole::Colinear { through },
            None => NodeRole::Intersection,
        },
        _ => NodeRole::Intersection,
    }
}

/// The pair of incident edges closest to 180 degrees apart, if it lies
/// within the tolerance window.
fn straightest_pair(
    graph: &StreetGraph,
    node: NodeIndex,
    effective: &[EdgeIndex],
    colinear_tolerance_deg: f64,
) -> Option<(EdgeIndex, EdgeIndex)> {
    let at = node_point(graph, node)?;
    let mut best: Option<((EdgeIndex, EdgeIndex), f64)> = None;
    for (i, &first) in effective.iter().enumerate() {
        for &second in &effective[i + 1..] {
            let far_first = opposite_endpoint(graph, first, node).and_then(|n| node_point(graph, n));
            let far_second =
                opposite_endpoint(graph, second, node).and_then(|n| node_point(graph, n));
            let (Some(p), Some(q)) = (far_first, far_second) else {
                continue;
            };
            let deviation = (180.0 - geometry::angle_between_deg(at, p, q)).abs();
            let improves = match best {
                Some((_, best_deviation)) => deviation < best_deviation,
                None => true,
            };
            if improves {
                best = Some(((first, second), deviation));
            }
        }
    }
    match best {
        Some((pair, deviation)) if deviation <= colinear_tolerance_deg => Some(pair),
        _ => None,
    }
}

fn opposite_endpoint(graph: &StreetGraph, edge: EdgeIndex, node: NodeIndex) -> Option<NodeIndex> {
    let (a, b) = graph.graph.edge_endpoints(edge)?;
    Some(if a == node { b } else { a })
}

fn node_point(graph: &StreetGraph, node: NodeIndex) -> Option<Point<f64>> {
    graph.node_position(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dhp_core::{Segment, SegmentId, StreetNode};

    fn add_node(graph: &mut StreetGraph, id: usize, x: f64, y: f64) {
        graph
            .add_street_node(StreetNode::junction(
                StreetNodeId::new(id),
                format!("n{id}"),
                Point::new(x, y),
            ))
            .unwrap();
    }

    fn add_edge(graph: &mut StreetGraph, id: usize, from: usize, to: usize) -> EdgeIndex {
        graph
            .add_segment(Segment::new(
                SegmentId::new(id),
                format!("e{id}"),
                StreetNodeId::new(from),
                StreetNodeId::new(to),
            ))
            .unwrap()
    }

    fn covered_exactly_once(graph: &StreetGraph, streets: &[LogicalStreet]) -> bool {
        let mut seen = HashSet::new();
        for street in streets {
            for &edge in &street.segments {
                if !seen.insert(edge) {
                    return false;
                }
            }
        }
        seen.len() == graph.segments().len()
    }

    #[test]
    fn test_straight_line_is_one_street() {
        let mut graph = StreetGraph::new();
        add_node(&mut graph, 0, 0.0, 0.0);
        add_node(&mut graph, 1, 5.0, 0.0);
        add_node(&mut graph, 2, 10.0, 0.0);
        add_edge(&mut graph, 0, 0, 1);
        add_edge(&mut graph, 1, 1, 2);

        let streets = decompose(&graph, &DecompositionConfig::default()).unwrap();
        assert_eq!(streets.len(), 1);
        assert_eq!(streets[0].segment_count(), 2);
        assert_eq!(
            streets[0].nodes,
            vec![StreetNodeId::new(0), StreetNodeId::new(1), StreetNodeId::new(2)]
        );
        assert!((streets[0].length.value() - 10.0).abs() < 1e-9);
        assert!(covered_exactly_once(&graph, &streets));
    }

    #[test]
    fn test_t_junction_keeps_through_street() {
        // Main road passes straight through; the branch is its own street.
        let mut graph = StreetGraph::new();
        add_node(&mut graph, 0, 0.0, 0.0);
        add_node(&mut graph, 1, 50.0, 0.0);
        add_node(&mut graph, 2, 100.0, 0.0);
        add_node(&mut graph, 3, 50.0, 60.0);
        add_edge(&mut graph, 0, 0, 1);
        add_edge(&mut graph, 1, 1, 2);
        add_edge(&mut graph, 2, 1, 3);

        let streets = decompose(&graph, &DecompositionConfig::default()).unwrap();
        assert_eq!(streets.len(), 2);
        assert!(covered_exactly_once(&graph, &streets));

        let main = streets
            .iter()
            .find(|street| street.segment_count() == 2)
            .unwrap();
        assert!((main.length.value() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_wide_y_junction_is_intersection() {
        // Three edges at 120 degrees: no colinear pair, three streets.
        let mut graph = StreetGraph::new();
        add_node(&mut graph, 0, 0.0, 0.0);
        add_node(&mut graph, 1, 100.0, 0.0);
        add_node(&mut graph, 2, -50.0, 86.6);
        add_node(&mut graph, 3, -50.0, -86.6);
        add_edge(&mut graph, 0, 0, 1);
        add_edge(&mut graph, 1, 0, 2);
        add_edge(&mut graph, 2, 0, 3);

        let streets = decompose(&graph, &DecompositionConfig::default()).unwrap();
        assert_eq!(streets.len(), 3);
        assert!(streets.iter().all(|street| street.segment_count() == 1));
        assert!(covered_exactly_once(&graph, &streets));
    }

    #[test]
    fn test_cross_intersection_splits_four_ways() {
        let mut graph = StreetGraph::new();
        add_node(&mut graph, 0, 0.0, 0.0);
        add_node(&mut graph, 1, 100.0, 0.0);
        add_node(&mut graph, 2, -100.0, 0.0);
        add_node(&mut graph, 3, 0.0, 100.0);
        add_node(&mut graph, 4, 0.0, -100.0);
        for (id, to) in [(0, 1), (1, 2), (2, 3), (3, 4)] {
            add_edge(&mut graph, id, 0, to);
        }

        let streets = decompose(&graph, &DecompositionConfig::default()).unwrap();
        assert_eq!(streets.len(), 4);
        assert!(covered_exactly_once(&graph, &streets));
    }

    #[test]
    fn test_short_spur_merges_into_through_street() {
        // A 10 m driveway off a straight road must not split the road.
        let mut graph = StreetGraph::new();
        add_node(&mut graph, 0, 0.0, 0.0);
        add_node(&mut graph, 1, 50.0, 0.0);
        add_node(&mut graph, 2, 100.0, 0.0);
        add_node(&mut graph, 3, 50.0, 10.0);
        add_edge(&mut graph, 0, 0, 1);
        add_edge(&mut graph, 1, 1, 2);
        let spur = add_edge(&mut graph, 2, 1, 3);

        let streets = decompose(&graph, &DecompositionConfig::default()).unwrap();
        assert_eq!(streets.len(), 1);
        assert_eq!(streets[0].segment_count(), 3);
        assert!(streets[0].segments.contains(&spur));
        // The spur terminal is not part of the walk.
        assert!(!streets[0].nodes.contains(&StreetNodeId::new(3)));
        assert!((streets[0].length.value() - 110.0).abs() < 1e-9);
    }

    #[test]
    fn test_long_spur_stays_separate() {
        let mut graph = StreetGraph::new();
        add_node(&mut graph, 0, 0.0, 0.0);
        add_node(&mut graph, 1, 50.0, 0.0);
        add_node(&mut graph, 2, 100.0, 0.0);
        add_node(&mut graph, 3, 50.0, 40.0);
        add_edge(&mut graph, 0, 0, 1);
        add_edge(&mut graph, 1, 1, 2);
        add_edge(&mut graph, 2, 1, 3);

        let streets = decompose(&graph, &DecompositionConfig::default()).unwrap();
        assert_eq!(streets.len(), 2);
        assert!(covered_exactly_once(&graph, &streets));
    }

    #[test]
    fn test_pure_ring_is_topology_error() {
        let mut graph = StreetGraph::new();
        add_node(&mut graph, 0, 0.0, 0.0);
        add_node(&mut graph, 1, 100.0, 0.0);
        add_node(&mut graph, 2, 100.0, 100.0);
        add_node(&mut graph, 3, 0.0, 100.0);
        add_edge(&mut graph, 0, 0, 1);
        add_edge(&mut graph, 1, 1, 2);
        add_edge(&mut graph, 2, 2, 3);
        add_edge(&mut graph, 3, 3, 0);

        let result = decompose(&graph, &DecompositionConfig::default());
        assert!(matches!(result, Err(ClusterError::Topology(_))));
    }

    #[test]
    fn test_ring_with_stub_decomposes() {
        // A stub on the ring gives the walk an anchor; the ring itself comes
        // back as one closed street.
        let mut graph = StreetGraph::new();
        add_node(&mut graph, 0, 0.0, 0.0);
        add_node(&mut graph, 1, 100.0, 0.0);
        add_node(&mut graph, 2, 100.0, 100.0);
        add_node(&mut graph, 3, 0.0, 100.0);
        add_node(&mut graph, 4, -50.0, -50.0);
        add_edge(&mut graph, 0, 0, 1);
        add_edge(&mut graph, 1, 1, 2);
        add_edge(&mut graph, 2, 2, 3);
        add_edge(&mut graph, 3, 3, 0);
        add_edge(&mut graph, 4, 0, 4);

        let streets = decompose(&graph, &DecompositionConfig::default()).unwrap();
        assert_eq!(streets.len(), 2);
        assert!(covered_exactly_once(&graph, &streets));
    }

    #[test]
    fn test_empty_graph_has_no_streets() {
        let graph = StreetGraph::new();
        let streets = decompose(&graph, &DecompositionConfig::default()).unwrap();
        assert!(streets.is_empty());
    }

    #[test]
    fn test_decomposition_is_deterministic() {
        let build = || {
            let mut graph = StreetGraph::new();
            add_node(&mut graph, 0, 0.0, 0.0);
            add_node(&mut graph, 1, 50.0, 0.0);
            add_node(&mut graph, 2, 100.0, 0.0);
            add_node(&mut graph, 3, 50.0, 60.0);
            add_node(&mut graph, 4, 50.0, -60.0);
            add_edge(&mut graph, 0, 0, 1);
            add_edge(&mut graph, 1, 1, 2);
            add_edge(&mut graph, 2, 1, 3);
            add_edge(&mut graph, 3, 1, 4);
            graph
        };

        let first = decompose(&build(), &DecompositionConfig::default()).unwrap();
        let second = decompose(&build(), &DecompositionConfig::default()).unwrap();
        let shape =
            |streets: &[LogicalStreet]| -> Vec<(StreetId, Vec<StreetNodeId>)> {
                streets
                    .iter()
                    .map(|street| (street.id, street.nodes.clone()))
                    .collect()
            };
        assert_eq!(shape(&first), shape(&second));
    }
}
