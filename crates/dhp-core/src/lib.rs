//! # dhp-core: Street-Graph Modeling Core
//!
//! Provides the fundamental data structures and graph-based street models for
//! district-energy network planning.
//!
//! ## Design Philosophy
//!
//! City quarters are modeled as **undirected graphs** where:
//! - **Nodes**: Street nodes (junctions and projected foot points) and buildings
//! - **Edges**: Street segments, derived query links, and building connectors
//!
//! This graph-based approach enables:
//! - Fast topological queries (connectivity, island detection)
//! - Network path distances along streets instead of beeline distances
//! - Type-safe element access with newtype IDs
//! - Cheap deep copies so clustering runs never mutate caller data
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # fn main() -> dhp_core::DhpResult<()> {
//! use dhp_core::*;
//! use geo::Point;
//!
//! let mut graph = StreetGraph::new();
//!
//! // Two junctions joined by a 120 m street segment
//! graph.add_street_node(StreetNode::junction(
//!     StreetNodeId::new(0),
//!     "Corner A",
//!     Point::new(0.0, 0.0),
//! ))?;
//! graph.add_street_node(StreetNode::junction(
//!     StreetNodeId::new(1),
//!     "Corner B",
//!     Point::new(120.0, 0.0),
//! ))?;
//! graph.add_segment(Segment::new(
//!     SegmentId::new(0),
//!     "Main St",
//!     StreetNodeId::new(0),
//!     StreetNodeId::new(1),
//! ))?;
//!
//! // A building 18 m off the street with annual demands in kWh
//! graph.add_building(
//!     Building::new(BuildingId::new(0), "Main St 5", Point::new(60.0, 18.0))
//!         .with_demand(12_000.0, 3_500.0),
//! )?;
//!
//! println!("{}", graph.stats());
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Data Structures
//!
//! - [`StreetGraph`] - The main street container (petgraph `UnGraph<Node, Edge>`)
//! - [`Node`] - Enum for street-node and building elements
//! - [`Edge`] - Enum for segment, link, and connector edges
//! - Type-safe IDs: [`StreetNodeId`], [`BuildingId`], [`SegmentId`], [`StreetId`], [`ClusterId`]
//!
//! ## ID System
//!
//! Every element has a unique ID (newtype wrapper around `usize`) assigned by
//! the upstream GIS import: StreetNode#0, Building#0, Segment#0, ... IDs are
//! stable across a planning session, so cluster assignments can be joined back
//! onto the source data. Derived elements get fresh IDs: [`StreetId`] numbers
//! logical streets produced by decomposition, [`ClusterId`] numbers clusters.
//!
//! IDs enable:
//! - Type safety: Can't confuse building IDs with street-node IDs
//! - Deterministic total orderings (all tie-breaks fall back to IDs)
//! - Consistent serialization of assignments and boundaries
//!
//! ## Modules
//!
//! - [`diagnostics`] - Validation and diagnostic reporting
//! - [`geometry`] - Planar projection and angle helpers
//! - [`graph_utils`] - Topological analysis (islands, path distances, DOT export)
//! - [`units`] - Unit-safe wrappers for meters and kilowatt-hours

use geo::Point;
use petgraph::visit::EdgeRef;
use petgraph::{prelude::*, Undirected};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod diagnostics;
pub mod error;
pub mod geometry;
pub mod graph_utils;
pub mod units;

pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::{DhpError, DhpResult};
pub use geometry::*;
pub use graph_utils::*;
pub use petgraph::graph::{EdgeIndex, NodeIndex};
pub use units::{KilowattHours, Meters};

// Newtype wrappers for IDs for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreetNodeId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildingId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreetId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(usize);

impl StreetNodeId {
    #[inline]
    pub fn new(value: usize) -> Self {
        StreetNodeId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl BuildingId {
    #[inline]
    pub fn new(value: usize) -> Self {
        BuildingId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl SegmentId {
    #[inline]
    pub fn new(value: usize) -> Self {
        SegmentId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl StreetId {
    #[inline]
    pub fn new(value: usize) -> Self {
        StreetId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl ClusterId {
    #[inline]
    pub fn new(value: usize) -> Self {
        ClusterId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

/// Origin of a street node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreetNodeKind {
    /// Imported street junction or polyline vertex.
    Junction,
    /// Synthetic node inserted at a building's foot point during projection.
    Projected,
}

// Basic component structs
#[derive(Debug, Clone)]
pub struct StreetNode {
    pub id: StreetNodeId,
    pub name: String,
    /// Planar position in a local metric projection (meters)
    pub position: Point<f64>,
    pub kind: StreetNodeKind,
}

impl StreetNode {
    pub fn new(
        id: StreetNodeId,
        name: impl Into<String>,
        position: Point<f64>,
        kind: StreetNodeKind,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            position,
            kind,
        }
    }

    /// Create an imported street junction.
    pub fn junction(id: StreetNodeId, name: impl Into<String>, position: Point<f64>) -> Self {
        Self::new(id, name, position, StreetNodeKind::Junction)
    }

    /// Create a synthetic foot-point node.
    pub fn projected(id: StreetNodeId, name: impl Into<String>, position: Point<f64>) -> Self {
        Self::new(id, name, position, StreetNodeKind::Projected)
    }
}

#[derive(Debug, Clone)]
pub struct Building {
    pub id: BuildingId,
    pub name: String,
    /// Planar position in a local metric projection (meters)
    pub position: Point<f64>,
    /// Annual space-heating plus hot-water demand (kWh)
    pub heat_demand: KilowattHours,
    /// Annual electricity demand (kWh)
    pub power_demand: KilowattHours,
}

impl Building {
    /// Create a building with zero demand.
    pub fn new(id: BuildingId, name: impl Into<String>, position: Point<f64>) -> Self {
        Self {
            id,
            name: name.into(),
            position,
            heat_demand: KilowattHours(0.0),
            power_demand: KilowattHours(0.0),
        }
    }

    /// Set annual heat and power demand (in kWh).
    pub fn with_demand(mut self, heat_kwh: f64, power_kwh: f64) -> Self {
        self.heat_demand = KilowattHours(heat_kwh);
        self.power_demand = KilowattHours(power_kwh);
        self
    }
}

/// Street edge between two street nodes.
///
/// Lengths are derived from endpoint positions, never stored, so splitting
/// and merging segments cannot drift out of sync with the geometry.
#[derive(Debug, Clone)]
pub struct Segment {
    pub id: SegmentId,
    pub name: String,
    pub from: StreetNodeId,
    pub to: StreetNodeId,
}

impl Segment {
    pub fn new(
        id: SegmentId,
        name: impl Into<String>,
        from: StreetNodeId,
        to: StreetNodeId,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            from,
            to,
        }
    }
}

/// Spur edge tying a building to its anchor street node.
#[derive(Debug, Clone)]
pub struct Connector {
    pub building: BuildingId,
    pub anchor: StreetNodeId,
}

impl Connector {
    pub fn new(building: BuildingId, anchor: StreetNodeId) -> Self {
        Self { building, anchor }
    }
}

/// Derived query edge chaining projected foot points along a segment.
///
/// Links run parallel to the segment they subdivide, so path queries can
/// route through foot points while the original segment set stays intact.
#[derive(Debug, Clone)]
pub struct Link {
    pub from: StreetNodeId,
    pub to: StreetNodeId,
}

impl Link {
    pub fn new(from: StreetNodeId, to: StreetNodeId) -> Self {
        Self { from, to }
    }
}

// Enum to represent different types of nodes in the graph
#[derive(Debug, Clone)]
pub enum Node {
    Street(StreetNode),
    Building(Building),
}

// Enum to represent different types of edges in the graph
#[derive(Debug, Clone)]
pub enum Edge {
    Segment(Segment),
    Link(Link),
    Connector(Connector),
}

impl Node {
    /// Returns a human-readable label for the node (street-node/building name).
    pub fn label(&self) -> &str {
        match self {
            Node::Street(node) => &node.name,
            Node::Building(building) => &building.name,
        }
    }

    /// Planar position of the element.
    pub fn position(&self) -> Point<f64> {
        match self {
            Node::Street(node) => node.position,
            Node::Building(building) => building.position,
        }
    }
}

impl Edge {
    /// Returns a human-readable label for the edge (segment name or edge type).
    pub fn label(&self) -> &str {
        match self {
            Edge::Segment(segment) => &segment.name,
            Edge::Link(_) => "link",
            Edge::Connector(_) => "connector",
        }
    }
}

/// The core street graph
///
/// Street nodes and buildings are graph nodes; segments and connectors are
/// edges. Buildings never carry segment edges, so street topology queries can
/// skip buildings by filtering on edge type.
#[derive(Debug, Default, Clone)]
pub struct StreetGraph {
    pub graph: Graph<Node, Edge, Undirected>,
    street_index: HashMap<StreetNodeId, NodeIndex>,
    building_index: HashMap<BuildingId, NodeIndex>,
}

impl StreetGraph {
    pub fn new() -> Self {
        Self {
            graph: Graph::new_undirected(),
            street_index: HashMap::new(),
            building_index: HashMap::new(),
        }
    }

    /// Add a street node and index it by ID. IDs must be unique.
    pub fn add_street_node(&mut self, node: StreetNode) -> DhpResult<NodeIndex> {
        let id = node.id;
        if self.street_index.contains_key(&id) {
            return Err(DhpError::Graph(format!(
                "street node {} already exists",
                id.value()
            )));
        }
        let idx = self.graph.add_node(Node::Street(node));
        self.street_index.insert(id, idx);
        Ok(idx)
    }

    /// Add a building node and index it by ID. IDs must be unique.
    pub fn add_building(&mut self, building: Building) -> DhpResult<NodeIndex> {
        let id = building.id;
        if self.building_index.contains_key(&id) {
            return Err(DhpError::Graph(format!(
                "building {} already exists",
                id.value()
            )));
        }
        let idx = self.graph.add_node(Node::Building(building));
        self.building_index.insert(id, idx);
        Ok(idx)
    }

    /// Add a street segment between two previously added street nodes.
    pub fn add_segment(&mut self, segment: Segment) -> DhpResult<EdgeIndex> {
        let from = self.street_node_index(segment.from).ok_or_else(|| {
            DhpError::Graph(format!(
                "segment {} references unknown street node {}",
                segment.id.value(),
                segment.from.value()
            ))
        })?;
        let to = self.street_node_index(segment.to).ok_or_else(|| {
            DhpError::Graph(format!(
                "segment {} references unknown street node {}",
                segment.id.value(),
                segment.to.value()
            ))
        })?;
        Ok(self.graph.add_edge(from, to, Edge::Segment(segment)))
    }

    /// Add a derived query link between two street nodes.
    pub fn add_link(&mut self, link: Link) -> DhpResult<EdgeIndex> {
        let from = self.street_node_index(link.from).ok_or_else(|| {
            DhpError::Graph(format!(
                "link references unknown street node {}",
                link.from.value()
            ))
        })?;
        let to = self.street_node_index(link.to).ok_or_else(|| {
            DhpError::Graph(format!(
                "link references unknown street node {}",
                link.to.value()
            ))
        })?;
        Ok(self.graph.add_edge(from, to, Edge::Link(link)))
    }

    /// Add a connector tying a building to its anchor street node.
    pub fn add_connector(&mut self, connector: Connector) -> DhpResult<EdgeIndex> {
        let building = self.building_index(connector.building).ok_or_else(|| {
            DhpError::Graph(format!(
                "connector references unknown building {}",
                connector.building.value()
            ))
        })?;
        let anchor = self.street_node_index(connector.anchor).ok_or_else(|| {
            DhpError::Graph(format!(
                "connector for building {} references unknown street node {}",
                connector.building.value(),
                connector.anchor.value()
            ))
        })?;
        Ok(self.graph.add_edge(building, anchor, Edge::Connector(connector)))
    }

    /// Graph index of a street node, if present.
    pub fn street_node_index(&self, id: StreetNodeId) -> Option<NodeIndex> {
        self.street_index.get(&id).copied()
    }

    /// Graph index of a building, if present.
    pub fn building_index(&self, id: BuildingId) -> Option<NodeIndex> {
        self.building_index.get(&id).copied()
    }

    /// Planar position of any node.
    pub fn node_position(&self, node: NodeIndex) -> Option<Point<f64>> {
        self.graph.node_weight(node).map(Node::position)
    }

    /// Geometric length of any edge, derived from its endpoint positions.
    pub fn edge_length(&self, edge: EdgeIndex) -> Option<Meters> {
        let (a, b) = self.graph.edge_endpoints(edge)?;
        Some(geometry::distance(
            self.node_position(a)?,
            self.node_position(b)?,
        ))
    }

    /// Number of incident street segments (links and connectors are not counted).
    pub fn street_degree(&self, node: NodeIndex) -> usize {
        self.graph
            .edges(node)
            .filter(|e| matches!(e.weight(), Edge::Segment(_)))
            .count()
    }

    /// Incident street segment edges, ordered by edge index.
    pub fn segment_edges(&self, node: NodeIndex) -> Vec<EdgeIndex> {
        let mut edges: Vec<EdgeIndex> = self
            .graph
            .edges(node)
            .filter(|e| matches!(e.weight(), Edge::Segment(_)))
            .map(|e| e.id())
            .collect();
        edges.sort();
        edges
    }

    /// Get all street nodes as a vector
    pub fn street_nodes(&self) -> Vec<&StreetNode> {
        self.graph
            .node_weights()
            .filter_map(|n| match n {
                Node::Street(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    /// Get all buildings as a vector
    pub fn buildings(&self) -> Vec<&Building> {
        self.graph
            .node_weights()
            .filter_map(|n| match n {
                Node::Building(b) => Some(b),
                _ => None,
            })
            .collect()
    }

    /// Get all segments as a vector
    pub fn segments(&self) -> Vec<&Segment> {
        self.graph
            .edge_weights()
            .filter_map(|e| match e {
                Edge::Segment(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    /// Compute basic statistics about the street graph
    pub fn stats(&self) -> StreetGraphStats {
        let mut stats = StreetGraphStats::default();

        for node in self.graph.node_weights() {
            match node {
                Node::Street(s) => {
                    stats.num_street_nodes += 1;
                    if s.kind == StreetNodeKind::Projected {
                        stats.num_projected_nodes += 1;
                    }
                }
                Node::Building(b) => {
                    stats.num_buildings += 1;
                    stats.total_heat_kwh += b.heat_demand.value();
                    stats.total_power_kwh += b.power_demand.value();
                }
            }
        }

        for edge in self.graph.edge_indices() {
            let length = self.edge_length(edge).map(Meters::value).unwrap_or(0.0);
            match self.graph.edge_weight(edge) {
                Some(Edge::Segment(_)) => {
                    stats.num_segments += 1;
                    stats.total_street_m += length;
                }
                // Links retrace segment geometry, so they carry no length share.
                Some(Edge::Link(_)) => {
                    stats.num_links += 1;
                }
                Some(Edge::Connector(_)) => {
                    stats.num_connectors += 1;
                    stats.total_connector_m += length;
                }
                None => {}
            }
        }

        stats
    }

    /// Validate street-graph data for issues that break clustering runs.
    ///
    /// Populates the provided `Diagnostics` with any warnings/errors found.
    /// This is the preferred validation method.
    pub fn validate_into(&self, diag: &mut Diagnostics) {
        let stats = self.stats();

        // Check for empty graph
        if stats.num_street_nodes == 0 {
            diag.add_error("structure", "Street graph has no street nodes");
            return; // Can't check further
        }

        if stats.num_buildings == 0 {
            diag.add_warning("structure", "Street graph has no buildings");
        }

        // Check for disconnected street nodes
        if stats.num_segments == 0 && stats.num_street_nodes > 1 {
            diag.add_error(
                "structure",
                "Street graph has multiple street nodes but no segments",
            );
        }

        for node in self.graph.node_indices() {
            match &self.graph[node] {
                Node::Building(b) => {
                    // Buildings must never carry street-level edges
                    if self
                        .graph
                        .edges(node)
                        .any(|e| matches!(e.weight(), Edge::Segment(_) | Edge::Link(_)))
                    {
                        diag.add_error_with_entity(
                            "structure",
                            "Building node carries a street segment",
                            &b.name,
                        );
                    }
                    if !b.position.x().is_finite() || !b.position.y().is_finite() {
                        diag.add_error_with_entity(
                            "geometry",
                            "Building position is not finite",
                            &b.name,
                        );
                    }
                    if b.heat_demand.value() < 0.0 || b.power_demand.value() < 0.0 {
                        diag.add_warning_with_entity(
                            "demand",
                            "Building has negative annual demand",
                            &b.name,
                        );
                    }
                }
                Node::Street(s) => {
                    if !s.position.x().is_finite() || !s.position.y().is_finite() {
                        diag.add_error_with_entity(
                            "geometry",
                            "Street node position is not finite",
                            &s.name,
                        );
                    }
                }
            }
        }

        for edge in self.graph.edge_indices() {
            if let (Some(Edge::Segment(s)), Some(length)) =
                (self.graph.edge_weight(edge), self.edge_length(edge))
            {
                if length.value() < 1e-9 {
                    diag.add_warning_with_entity(
                        "geometry",
                        "Segment has zero length",
                        &s.name,
                    );
                }
            }
        }
    }
}

/// Statistics about a street graph's size and demand
#[derive(Debug, Clone, Default)]
pub struct StreetGraphStats {
    pub num_street_nodes: usize,
    pub num_projected_nodes: usize,
    pub num_buildings: usize,
    pub num_segments: usize,
    pub num_links: usize,
    pub num_connectors: usize,
    pub total_street_m: f64,
    pub total_connector_m: f64,
    pub total_heat_kwh: f64,
    pub total_power_kwh: f64,
}

impl std::fmt::Display for StreetGraphStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} street nodes, {} segments ({:.0} m), {} buildings ({:.0} kWh heat, {:.0} kWh power)",
            self.num_street_nodes,
            self.num_segments,
            self.total_street_m,
            self.num_buildings,
            self.total_heat_kwh,
            self.total_power_kwh
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_street_graph_creation() {
        let mut graph = StreetGraph::new();

        let a = graph
            .add_street_node(StreetNode::junction(
                StreetNodeId::new(0),
                "Corner A",
                Point::new(0.0, 0.0),
            ))
            .unwrap();
        graph
            .add_street_node(StreetNode::junction(
                StreetNodeId::new(1),
                "Corner B",
                Point::new(100.0, 0.0),
            ))
            .unwrap();

        graph
            .add_segment(Segment::new(
                SegmentId::new(0),
                "Main St",
                StreetNodeId::new(0),
                StreetNodeId::new(1),
            ))
            .unwrap();

        assert_eq!(graph.graph.node_count(), 2);
        assert_eq!(graph.graph.edge_count(), 1);
        assert_eq!(graph.street_node_index(StreetNodeId::new(0)), Some(a));

        if let Node::Street(s) = graph.graph[a].clone() {
            assert_eq!(s.name, "Corner A");
        } else {
            panic!("Expected street node");
        }
    }

    #[test]
    fn test_add_segment_unknown_node() {
        let mut graph = StreetGraph::new();
        graph
            .add_street_node(StreetNode::junction(
                StreetNodeId::new(0),
                "Corner A",
                Point::new(0.0, 0.0),
            ))
            .unwrap();

        let result = graph.add_segment(Segment::new(
            SegmentId::new(0),
            "Broken",
            StreetNodeId::new(0),
            StreetNodeId::new(7),
        ));
        assert!(matches!(result, Err(DhpError::Graph(_))));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut graph = StreetGraph::new();
        graph
            .add_street_node(StreetNode::junction(
                StreetNodeId::new(0),
                "first",
                Point::new(0.0, 0.0),
            ))
            .unwrap();
        let dup = graph.add_street_node(StreetNode::junction(
            StreetNodeId::new(0),
            "second",
            Point::new(5.0, 0.0),
        ));
        assert!(matches!(dup, Err(DhpError::Graph(_))));
        assert_eq!(graph.graph.node_count(), 1);

        graph
            .add_building(Building::new(
                BuildingId::new(0),
                "house",
                Point::new(1.0, 1.0),
            ))
            .unwrap();
        let dup = graph.add_building(Building::new(
            BuildingId::new(0),
            "house again",
            Point::new(2.0, 2.0),
        ));
        assert!(matches!(dup, Err(DhpError::Graph(_))));
        assert_eq!(graph.graph.node_count(), 2);
    }

    #[test]
    fn test_edge_length_from_positions() {
        let mut graph = StreetGraph::new();
        graph
            .add_street_node(StreetNode::junction(
                StreetNodeId::new(0),
                "A",
                Point::new(0.0, 0.0),
            ))
            .unwrap();
        graph
            .add_street_node(StreetNode::junction(
                StreetNodeId::new(1),
                "B",
                Point::new(30.0, 40.0),
            ))
            .unwrap();
        let edge = graph
            .add_segment(Segment::new(
                SegmentId::new(0),
                "A-B",
                StreetNodeId::new(0),
                StreetNodeId::new(1),
            ))
            .unwrap();

        assert!((graph.edge_length(edge).unwrap().value() - 50.0).abs() < 1e-12);
    }

    #[test]
    fn test_street_degree_ignores_connectors() {
        let mut graph = StreetGraph::new();
        let a = graph
            .add_street_node(StreetNode::junction(
                StreetNodeId::new(0),
                "A",
                Point::new(0.0, 0.0),
            ))
            .unwrap();
        graph
            .add_street_node(StreetNode::junction(
                StreetNodeId::new(1),
                "B",
                Point::new(10.0, 0.0),
            ))
            .unwrap();
        graph
            .add_building(Building::new(
                BuildingId::new(0),
                "House",
                Point::new(0.0, 5.0),
            ))
            .unwrap();
        graph
            .add_segment(Segment::new(
                SegmentId::new(0),
                "A-B",
                StreetNodeId::new(0),
                StreetNodeId::new(1),
            ))
            .unwrap();
        graph
            .add_connector(Connector::new(BuildingId::new(0), StreetNodeId::new(0)))
            .unwrap();

        assert_eq!(graph.street_degree(a), 1);
        assert_eq!(graph.graph.edges(a).count(), 2);
        assert_eq!(graph.segment_edges(a).len(), 1);
    }

    #[test]
    fn test_links_do_not_count_as_street_degree() {
        let mut graph = StreetGraph::new();
        let a = graph
            .add_street_node(StreetNode::junction(
                StreetNodeId::new(0),
                "A",
                Point::new(0.0, 0.0),
            ))
            .unwrap();
        graph
            .add_street_node(StreetNode::projected(
                StreetNodeId::new(1),
                "foot",
                Point::new(5.0, 0.0),
            ))
            .unwrap();
        graph
            .add_link(Link::new(StreetNodeId::new(0), StreetNodeId::new(1)))
            .unwrap();

        assert_eq!(graph.street_degree(a), 0);
        assert_eq!(graph.graph.edges(a).count(), 1);
        assert_eq!(graph.stats().num_links, 1);
    }

    #[test]
    fn test_validation_empty() {
        let graph = StreetGraph::new();
        let mut diag = Diagnostics::new();
        graph.validate_into(&mut diag);
        assert!(diag.has_errors());
        assert!(diag.errors().any(|i| i.message.contains("no street nodes")));
    }

    #[test]
    fn test_validation_building_on_segment() {
        let mut graph = StreetGraph::new();
        let a = graph
            .add_street_node(StreetNode::junction(
                StreetNodeId::new(0),
                "A",
                Point::new(0.0, 0.0),
            ))
            .unwrap();
        let house = graph
            .add_building(Building::new(
                BuildingId::new(0),
                "House",
                Point::new(5.0, 5.0),
            ))
            .unwrap();
        // Bypass add_segment to wire a segment into a building node.
        graph.graph.add_edge(
            a,
            house,
            Edge::Segment(Segment::new(
                SegmentId::new(0),
                "bad",
                StreetNodeId::new(0),
                StreetNodeId::new(1),
            )),
        );

        let mut diag = Diagnostics::new();
        graph.validate_into(&mut diag);
        assert!(diag.has_errors());
        assert!(diag
            .errors()
            .any(|i| i.message.contains("carries a street segment")));
    }

    #[test]
    fn test_validation_zero_length_segment() {
        let mut graph = StreetGraph::new();
        graph
            .add_street_node(StreetNode::junction(
                StreetNodeId::new(0),
                "A",
                Point::new(0.0, 0.0),
            ))
            .unwrap();
        graph
            .add_street_node(StreetNode::junction(
                StreetNodeId::new(1),
                "B",
                Point::new(0.0, 0.0),
            ))
            .unwrap();
        graph
            .add_segment(Segment::new(
                SegmentId::new(0),
                "degenerate",
                StreetNodeId::new(0),
                StreetNodeId::new(1),
            ))
            .unwrap();

        let mut diag = Diagnostics::new();
        graph.validate_into(&mut diag);
        assert!(!diag.has_errors());
        assert!(diag.warnings().any(|i| i.message.contains("zero length")));
    }

    #[test]
    fn test_stats() {
        let mut graph = StreetGraph::new();
        graph
            .add_street_node(StreetNode::junction(
                StreetNodeId::new(0),
                "A",
                Point::new(0.0, 0.0),
            ))
            .unwrap();
        graph
            .add_street_node(StreetNode::junction(
                StreetNodeId::new(1),
                "B",
                Point::new(100.0, 0.0),
            ))
            .unwrap();
        graph
            .add_building(
                Building::new(BuildingId::new(0), "House", Point::new(50.0, 20.0))
                    .with_demand(12_000.0, 3_000.0),
            )
            .unwrap();
        graph
            .add_segment(Segment::new(
                SegmentId::new(0),
                "A-B",
                StreetNodeId::new(0),
                StreetNodeId::new(1),
            ))
            .unwrap();
        graph
            .add_connector(Connector::new(BuildingId::new(0), StreetNodeId::new(0)))
            .unwrap();

        let stats = graph.stats();
        assert_eq!(stats.num_street_nodes, 2);
        assert_eq!(stats.num_projected_nodes, 0);
        assert_eq!(stats.num_buildings, 1);
        assert_eq!(stats.num_segments, 1);
        assert_eq!(stats.num_connectors, 1);
        assert!((stats.total_street_m - 100.0).abs() < 1e-9);
        assert!((stats.total_heat_kwh - 12_000.0).abs() < 1e-9);

        let rendered = format!("{stats}");
        assert!(rendered.contains("2 street nodes"));
        assert!(rendered.contains("1 buildings"));

        // Valid graph should have no errors
        let mut diag = Diagnostics::new();
        graph.validate_into(&mut diag);
        assert!(!diag.has_errors());
    }

    #[test]
    fn test_building_demand_builder() {
        let building = Building::new(BuildingId::new(3), "House", Point::new(0.0, 0.0))
            .with_demand(20_000.0, 4_000.0);
        assert_eq!(building.heat_demand, KilowattHours(20_000.0));
        assert_eq!(building.power_demand, KilowattHours(4_000.0));
    }
}
