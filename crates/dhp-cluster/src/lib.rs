//! # dhp-cluster: Street-Aware Building Clustering for District Heating
//!
//! This crate partitions the buildings of a city into capacity-bounded
//! clusters along the street network, the preparatory step for sizing
//! district-heating subnetworks. It consumes a [`StreetGraph`](dhp_core::StreetGraph)
//! of junctions, street segments and buildings, decomposes the segments into
//! logical streets, projects every building onto its nearest street, and then
//! partitions the projected buildings with one of four strategies.
//!
//! ## Partitioning Strategies
//!
//! The [`ClusterEngine`] dispatches on [`Strategy`]:
//!
//! | Strategy | Description | Character |
//! |----------|-------------|-----------|
//! | [`Strategy::Topology`] | Street-by-street walk over the decomposed network | Street-contiguous clusters |
//! | [`Strategy::PositionGreedy`] | West-to-east nearest-neighbour chaining | Short hops, no street awareness |
//! | [`Strategy::DemandPriority`] | Demand-ranked centers, assignment by network distance | Centers sit on heavy consumers |
//! | [`Strategy::KMeans`] | Whole-city Lloyd iteration with a capacity sweep over k | Compact Euclidean clusters |
//!
//! ### Pipeline
//!
//! Every run passes through the same stages:
//!
//! - **[`decompose`]**: merge street segments into logical streets at junctions
//! - **[`projection`]**: drop a perpendicular foot from each building onto its street
//! - **strategy module**: partition the projected buildings into clusters
//! - **[`postprocess`]**: check completeness and capacity, compute hulls and stats
//!
//! All strategies respect the same `max_cluster_size` bound, assign every
//! building exactly once, and are deterministic for a fixed configuration.
//!
//! ## Parameter Sweeps
//!
//! [`partition_sweep`] evaluates several configurations against one graph on
//! a rayon pool and returns one independent result per configuration.
//!
//! ## Example
//!
//! ```ignore
//! use dhp_cluster::{ClusterConfig, ClusterEngine, Strategy};
//!
//! let config = ClusterConfig {
//!     strategy: Strategy::DemandPriority,
//!     max_cluster_size: 12,
//!     ..ClusterConfig::default()
//! };
//!
//! let assignment = ClusterEngine::new(config).partition(&graph)?;
//! for (cluster, members) in &assignment.clusters {
//!     println!("{cluster:?}: {} buildings", members.len());
//! }
//! ```

pub mod cluster;
pub mod config;
pub mod decompose;
pub mod demand;
pub mod engine;
pub mod error;
pub mod greedy;
pub mod kmeans;
pub mod postprocess;
pub mod projection;
pub mod sweep;
pub mod test_utils;
pub mod topology;

pub use cluster::{Cluster, ClusterAssignment, ClusterBoundary, ClusterBuilder, ClusterStats};
pub use config::{
    load_config_from_path, ChainMode, ClusterConfig, ClusterOpenPolicy, DecompositionConfig,
    DemandConfig, DemandMetric, GreedyConfig, KMeansConfig, OverflowMode, ProjectionMode,
    ProximityPolicy, Strategy,
};
pub use decompose::LogicalStreet;
pub use engine::ClusterEngine;
pub use error::{ClusterError, ClusterResult};
pub use projection::{Anchor, ProjectionIndex};
pub use sweep::partition_sweep;
