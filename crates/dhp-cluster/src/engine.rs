//! Clustering engine orchestration.
//!
//! Ties the pipeline together: validate the configuration, decompose the
//! street graph into logical streets, project buildings onto them, run the
//! configured partitioning strategy on a working copy, and hand the result
//! to the postprocessor. The caller's graph is never modified.

use crate::cluster::{Cluster, ClusterAssignment, ClusterBuilder};
use crate::config::{ClusterConfig, Strategy};
use crate::error::ClusterResult;
use crate::projection::ProjectionIndex;
use crate::{decompose, demand, greedy, kmeans, postprocess, projection, topology};
use dhp_core::{find_islands, graph_stats, BuildingId, Diagnostics, StreetGraph};
use geo::Point;
use tracing::{info, warn};

/// One configured clustering run.
///
/// ```ignore
/// let engine = ClusterEngine::new(ClusterConfig::default());
/// let assignment = engine.partition(&graph)?;
/// ```
#[derive(Debug, Clone)]
pub struct ClusterEngine {
    config: ClusterConfig,
}

impl ClusterEngine {
    pub fn new(config: ClusterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Run the full pipeline and return the validated assignment.
    ///
    /// Fails fast on an invalid configuration or street topology; no partial
    /// result is produced on error. Data issues flagged by graph validation
    /// are logged but do not abort the run.
    pub fn partition(&self, graph: &StreetGraph) -> ClusterResult<ClusterAssignment> {
        self.config.validate()?;

        if let Ok(stats) = graph_stats(graph) {
            info!(
                street_nodes = stats.street_nodes,
                buildings = stats.buildings,
                segments = stats.edge_count,
                components = stats.connected_components,
                "starting clustering run"
            );
            if stats.connected_components > 1 {
                if let Ok(analysis) = find_islands(graph) {
                    for island in &analysis.islands {
                        warn!(
                            island = island.island_id,
                            nodes = island.node_count,
                            buildings = island.building_count,
                            "street graph is not connected"
                        );
                    }
                }
            }
        }

        let mut structural = Diagnostics::new();
        graph.validate_into(&mut structural);
        if structural.has_errors() {
            warn!(
                errors = structural.error_count(),
                warnings = structural.warning_count(),
                "clustering a street graph with structural issues: {}",
                structural.summary()
            );
            for issue in structural.errors() {
                warn!(%issue, "street graph issue");
            }
        }

        let streets = decompose::decompose(graph, &self.config.decomposition)?;
        info!(streets = streets.len(), "street decomposition done");

        let mut query = graph.clone();
        let mut index = projection::project(&query, &streets, self.config.projection_mode)?;
        projection::apply(&mut query, &mut index)?;
        info!(buildings = index.len(), "buildings projected onto streets");

        let clusters = match self.config.strategy {
            Strategy::Topology => topology::partition(&query, &index, &self.config)?,
            Strategy::PositionGreedy => greedy::partition(&query, &self.config)?,
            Strategy::DemandPriority => demand::partition(&query, &index, &self.config)?,
            Strategy::KMeans => whole_city_kmeans(&query, &index, &self.config)?,
        };
        info!(
            clusters = clusters.len(),
            strategy = ?self.config.strategy,
            "partitioning done"
        );
        postprocess::finalize(graph, &clusters, &self.config)
    }
}

/// Whole-city k-means: ignore the street topology and split every building
/// coordinate at once. Unlike the demand partitioner's overflow path, a
/// failed convergence here fails the run.
fn whole_city_kmeans(
    graph: &StreetGraph,
    index: &ProjectionIndex,
    config: &ClusterConfig,
) -> ClusterResult<Vec<Cluster>> {
    let mut points: Vec<(BuildingId, Point<f64>)> = graph
        .buildings()
        .iter()
        .map(|b| (b.id, b.position))
        .collect();
    points.sort_by_key(|(id, _)| *id);
    let parts = kmeans::split(&points, config.max_cluster_size, &config.kmeans, config.seed)?;
    let mut builder = ClusterBuilder::new(config.first_cluster_id);
    for part in parts {
        let anchor = part.first().and_then(|&b| index.anchor_node(b));
        let slot = builder.open(anchor);
        for building in part {
            builder.append(slot, building);
        }
    }
    Ok(builder.finish())
}
