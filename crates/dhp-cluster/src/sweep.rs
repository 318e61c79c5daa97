//! Parallel parameter sweeps.
//!
//! Planning work rarely runs one configuration: strategies and bounds get
//! compared side by side. The sweep fans independent runs out over a rayon
//! pool; every run works on its own copy of the graph, so per-run
//! determinism carries over unchanged.

use crate::cluster::ClusterAssignment;
use crate::config::ClusterConfig;
use crate::engine::ClusterEngine;
use crate::error::ClusterResult;
use dhp_core::StreetGraph;
use rayon::prelude::*;
use tracing::debug;

/// Run several configurations against the same street graph in parallel.
///
/// Results come back in input order, one per configuration; a failing
/// configuration fails only its own slot.
pub fn partition_sweep(
    graph: &StreetGraph,
    configs: &[ClusterConfig],
) -> Vec<ClusterResult<ClusterAssignment>> {
    debug!(configs = configs.len(), "starting partition sweep");
    configs
        .par_iter()
        .map(|config| ClusterEngine::new(config.clone()).partition(graph))
        .collect()
}
