//! Shared builders for integration tests.

use crate::cluster::ClusterAssignment;
use dhp_core::{
    Building, BuildingId, DhpResult, Segment, SegmentId, StreetGraph, StreetNode, StreetNodeId,
};
use geo::Point;

/// Assemble a street graph from junction positions, segment endpoint pairs
/// and buildings given as `(x, y, heat_kwh)`. Power demand is derived as a
/// tenth of the heat demand.
pub fn city(
    junctions: &[(f64, f64)],
    segments: &[(usize, usize)],
    buildings: &[(f64, f64, f64)],
) -> DhpResult<StreetGraph> {
    let mut graph = StreetGraph::new();
    for (i, &(x, y)) in junctions.iter().enumerate() {
        graph.add_street_node(StreetNode::junction(
            StreetNodeId::new(i),
            format!("n{i}"),
            Point::new(x, y),
        ))?;
    }
    for (i, &(from, to)) in segments.iter().enumerate() {
        graph.add_segment(Segment::new(
            SegmentId::new(i),
            format!("s{i}"),
            StreetNodeId::new(from),
            StreetNodeId::new(to),
        ))?;
    }
    for (i, &(x, y, heat)) in buildings.iter().enumerate() {
        graph.add_building(
            Building::new(BuildingId::new(i), format!("b{i}"), Point::new(x, y))
                .with_demand(heat, heat / 10.0),
        )?;
    }
    Ok(graph)
}

/// A straight west-to-east street with `count` buildings spaced `spacing`
/// metres apart, all five metres north of the centre line.
pub fn row_city(count: usize, spacing: f64) -> DhpResult<StreetGraph> {
    let length = spacing * count as f64;
    let buildings: Vec<(f64, f64, f64)> = (0..count)
        .map(|i| (spacing / 2.0 + spacing * i as f64, 5.0, 1000.0))
        .collect();
    city(&[(0.0, 0.0), (length, 0.0)], &[(0, 1)], &buildings)
}

/// Cluster members as raw building ids, sorted inside and across clusters so
/// assertions do not depend on cluster numbering.
pub fn member_sets(assignment: &ClusterAssignment) -> Vec<Vec<usize>> {
    let mut sets: Vec<Vec<usize>> = assignment
        .clusters
        .values()
        .map(|members| {
            let mut ids: Vec<usize> = members.iter().map(BuildingId::value).collect();
            ids.sort_unstable();
            ids
        })
        .collect();
    sets.sort();
    sets
}
