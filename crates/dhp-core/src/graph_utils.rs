use crate::units::Meters;
use crate::{Edge, Node, StreetGraph};
use anyhow::{anyhow, Result};
use petgraph::algo::{connected_components, dijkstra};
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use std::collections::{HashSet, VecDeque};

/// Summary statistics for a street graph (density/degree/connected components).
#[derive(Debug)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub street_nodes: usize,
    pub buildings: usize,
    pub connected_components: usize,
    pub min_degree: usize,
    pub avg_degree: f64,
    pub max_degree: usize,
    pub density: f64,
}

/// Island summary (one connected component of the street graph).
///
/// Buildings on an island without a heat source candidate cannot be assigned
/// across islands, so island membership is reported separately.
#[derive(Debug)]
pub struct IslandSummary {
    pub island_id: usize,
    pub node_count: usize,
    pub building_count: usize,
}

/// Node-to-island assignment for tagging every node with its component.
#[derive(Debug)]
pub struct NodeAssignment {
    pub node_index: usize,
    pub label: String,
    pub island_id: usize,
}

/// Aggregated island analysis result.
#[derive(Debug)]
pub struct IslandAnalysis {
    pub islands: Vec<IslandSummary>,
    pub assignments: Vec<NodeAssignment>,
}

/// Calculates graph-level statistics such as density, degree distribution, and component counts.
pub fn graph_stats(graph: &StreetGraph) -> Result<GraphStats> {
    let node_count = graph.graph.node_count();
    let edge_count = graph.graph.edge_count();
    let mut degrees = Vec::with_capacity(node_count);
    let mut street_nodes = 0;
    let mut buildings = 0;
    for node in graph.graph.node_indices() {
        degrees.push(graph.graph.neighbors(node).count());
        match graph.graph[node] {
            Node::Street(_) => street_nodes += 1,
            Node::Building(_) => buildings += 1,
        }
    }
    let min_degree = *degrees.iter().min().unwrap_or(&0);
    let max_degree = *degrees.iter().max().unwrap_or(&0);
    let avg_degree = if node_count == 0 {
        0.0
    } else {
        degrees.iter().copied().sum::<usize>() as f64 / node_count as f64
    };
    let density = if node_count < 2 {
        0.0
    } else {
        2.0 * edge_count as f64 / (node_count as f64 * (node_count as f64 - 1.0))
    };
    let connected_components = connected_components(&graph.graph);
    Ok(GraphStats {
        node_count,
        edge_count,
        street_nodes,
        buildings,
        connected_components,
        min_degree,
        avg_degree,
        max_degree,
        density,
    })
}

/// Labels connected components (breadth-first search) and pulls island metadata for reporting.
pub fn find_islands(graph: &StreetGraph) -> Result<IslandAnalysis> {
    let mut visited = HashSet::new();
    let mut islands = Vec::new();
    let mut assignments = Vec::new();
    let mut island_id = 0;
    for start in graph.graph.node_indices() {
        if visited.contains(&start) {
            continue;
        }
        let mut queue = VecDeque::new();
        queue.push_back(start);
        let mut members = Vec::new();
        while let Some(node) = queue.pop_front() {
            if !visited.insert(node) {
                continue;
            }
            members.push(node);
            for neighbor in graph.graph.neighbors(node) {
                if !visited.contains(&neighbor) {
                    queue.push_back(neighbor);
                }
            }
        }
        if members.is_empty() {
            continue;
        }
        let building_count = members
            .iter()
            .filter(|&&n| matches!(graph.graph[n], Node::Building(_)))
            .count();
        islands.push(IslandSummary {
            island_id,
            node_count: members.len(),
            building_count,
        });
        for node in members {
            assignments.push(NodeAssignment {
                node_index: node.index(),
                label: graph.graph[node].label().to_string(),
                island_id,
            });
        }
        island_id += 1;
    }
    assignments.sort_by_key(|assignment| assignment.node_index);
    Ok(IslandAnalysis {
        islands,
        assignments,
    })
}

/// Shortest network path distance between two nodes, following segments and
/// connectors with their geometric lengths as edge weights.
///
/// Returns `None` when `to` is unreachable from `from`.
pub fn path_distance(graph: &StreetGraph, from: NodeIndex, to: NodeIndex) -> Option<Meters> {
    if from == to {
        return Some(Meters(0.0));
    }
    let costs = dijkstra(&graph.graph, from, Some(to), |e| {
        graph
            .edge_length(e.id())
            .map(Meters::value)
            .unwrap_or(f64::INFINITY)
    });
    costs.get(&to).copied().map(Meters)
}

/// Export the topology to a DOT string (Graphviz) so external tools can visualize the layout.
///
/// Buildings render as boxes, street nodes as ellipses, connectors as dashed
/// edges.
pub fn export_graph(graph: &StreetGraph, format: &str) -> Result<String> {
    match format.to_ascii_lowercase().as_str() {
        "graphviz" | "dot" => Ok(render_dot(graph)),
        other => Err(anyhow!("unsupported graph export format '{other}'")),
    }
}

fn render_dot(graph: &StreetGraph) -> String {
    let mut buffer = String::new();
    buffer.push_str("graph dhp_streets {\n");
    for node in graph.graph.node_indices() {
        let label = sanitize_label(graph.graph[node].label());
        match graph.graph[node] {
            Node::Street(_) => {
                buffer.push_str(&format!("  n{} [label=\"{}\"];\n", node.index(), label));
            }
            Node::Building(_) => {
                buffer.push_str(&format!(
                    "  n{} [label=\"{}\", shape=box];\n",
                    node.index(),
                    label
                ));
            }
        }
    }
    for edge in graph.graph.edge_references() {
        let source = edge.source().index();
        let target = edge.target().index();
        match edge.weight() {
            Edge::Segment(_) => buffer.push_str(&format!("  n{source} -- n{target};\n")),
            Edge::Link(_) => {
                buffer.push_str(&format!("  n{source} -- n{target} [style=dotted];\n"))
            }
            Edge::Connector(_) => {
                buffer.push_str(&format!("  n{source} -- n{target} [style=dashed];\n"))
            }
        }
    }
    buffer.push('}');
    buffer
}

fn sanitize_label(label: &str) -> String {
    label.replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Building, BuildingId, Connector, Segment, SegmentId, StreetNode, StreetNodeId};
    use geo::Point;

    fn line_graph() -> StreetGraph {
        // s0 --100m-- s1 --50m-- s2, building b0 hanging off s1.
        let mut graph = StreetGraph::new();
        graph
            .add_street_node(StreetNode::junction(
                StreetNodeId::new(0),
                "s0",
                Point::new(0.0, 0.0),
            ))
            .unwrap();
        graph
            .add_street_node(StreetNode::junction(
                StreetNodeId::new(1),
                "s1",
                Point::new(100.0, 0.0),
            ))
            .unwrap();
        graph
            .add_street_node(StreetNode::junction(
                StreetNodeId::new(2),
                "s2",
                Point::new(150.0, 0.0),
            ))
            .unwrap();
        graph
            .add_building(Building::new(
                BuildingId::new(0),
                "b0",
                Point::new(100.0, 20.0),
            ))
            .unwrap();
        graph
            .add_segment(Segment::new(
                SegmentId::new(0),
                "s0-s1",
                StreetNodeId::new(0),
                StreetNodeId::new(1),
            ))
            .unwrap();
        graph
            .add_segment(Segment::new(
                SegmentId::new(1),
                "s1-s2",
                StreetNodeId::new(1),
                StreetNodeId::new(2),
            ))
            .unwrap();
        graph
            .add_connector(Connector::new(BuildingId::new(0), StreetNodeId::new(1)))
            .unwrap();
        graph
    }

    #[test]
    fn test_path_distance_follows_segments() {
        let graph = line_graph();
        let s0 = graph.street_node_index(StreetNodeId::new(0)).unwrap();
        let s2 = graph.street_node_index(StreetNodeId::new(2)).unwrap();
        let dist = path_distance(&graph, s0, s2).unwrap();
        assert!((dist.value() - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_path_distance_through_connector() {
        let graph = line_graph();
        let b0 = graph.building_index(BuildingId::new(0)).unwrap();
        let s0 = graph.street_node_index(StreetNodeId::new(0)).unwrap();
        // 20 m connector + 100 m segment.
        let dist = path_distance(&graph, b0, s0).unwrap();
        assert!((dist.value() - 120.0).abs() < 1e-9);
    }

    #[test]
    fn test_path_distance_unreachable() {
        let mut graph = line_graph();
        graph
            .add_street_node(StreetNode::junction(
                StreetNodeId::new(9),
                "lonely",
                Point::new(999.0, 999.0),
            ))
            .unwrap();
        let s0 = graph.street_node_index(StreetNodeId::new(0)).unwrap();
        let lonely = graph.street_node_index(StreetNodeId::new(9)).unwrap();
        assert!(path_distance(&graph, s0, lonely).is_none());
    }

    #[test]
    fn test_graph_stats_counts_node_kinds() {
        let graph = line_graph();
        let stats = graph_stats(&graph).unwrap();
        assert_eq!(stats.node_count, 4);
        assert_eq!(stats.edge_count, 3);
        assert_eq!(stats.street_nodes, 3);
        assert_eq!(stats.buildings, 1);
        assert_eq!(stats.connected_components, 1);
        assert_eq!(stats.min_degree, 1);
        assert_eq!(stats.max_degree, 3);
    }

    #[test]
    fn test_islands_count_buildings() {
        let graph = line_graph();
        let analysis = find_islands(&graph).unwrap();
        assert_eq!(analysis.islands.len(), 1);
        assert_eq!(analysis.islands[0].node_count, 4);
        assert_eq!(analysis.islands[0].building_count, 1);
    }

    #[test]
    fn test_dot_export_marks_connectors() {
        let graph = line_graph();
        let dot = export_graph(&graph, "dot").unwrap();
        assert!(dot.starts_with("graph dhp_streets {"));
        assert!(dot.contains("shape=box"));
        assert!(dot.contains("style=dashed"));
        assert!(export_graph(&graph, "svg").is_err());
    }
}
