//! Clustering run configuration.
//!
//! A [`ClusterConfig`] is the complete parameter bundle for one clustering
//! run: the strategy choice, the capacity and distance bounds shared by all
//! strategies, and per-strategy knobs grouped into sub-structs. Every field
//! has a serde default, so a config file only needs to name what it changes:
//!
//! ```yaml
//! strategy: demand_priority
//! max_cluster_size: 12
//! demand:
//!   demand_metric: combined
//!   overflow_mode: k_means
//! ```
//!
//! Call [`ClusterConfig::validate`] (the engine does this for you) to reject
//! out-of-range parameters before any clustering work starts.

use crate::error::{ClusterError, ClusterResult};
use anyhow::Context;
use dhp_core::{geometry, DhpResult, Meters};
use geo::Point;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Which partitioning algorithm drives the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Walk the street topology node by node, filling clusters along the way.
    #[default]
    Topology,
    /// Chain nearest unassigned buildings by beeline position.
    PositionGreedy,
    /// Pick high-demand centers, assign by network path distance, split
    /// overflowing clusters.
    DemandPriority,
    /// Plain capacity-bounded k-means over building coordinates.
    KMeans,
}

/// Rule deciding whether a candidate building is close enough to join a
/// cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProximityPolicy {
    /// At least one current member must be within
    /// `max_building_to_building_distance` of the candidate.
    #[default]
    SingleNeighbor,
    /// Every current member must be within the bound.
    AllNeighbors,
}

impl ProximityPolicy {
    /// Whether a candidate at `position` may join a group whose members sit
    /// at `members`. An empty group admits anything.
    pub fn admits<I>(&self, position: Point<f64>, members: I, bound: Meters) -> bool
    where
        I: IntoIterator<Item = Point<f64>>,
    {
        let mut seen_any = false;
        for member in members {
            seen_any = true;
            let close = geometry::distance(position, member).value() <= bound.value();
            match self {
                ProximityPolicy::SingleNeighbor => {
                    if close {
                        return true;
                    }
                }
                ProximityPolicy::AllNeighbors => {
                    if !close {
                        return false;
                    }
                }
            }
        }
        match self {
            ProximityPolicy::SingleNeighbor => !seen_any,
            ProximityPolicy::AllNeighbors => true,
        }
    }
}

/// What the topology partitioner does when a candidate is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClusterOpenPolicy {
    /// Seal the current cluster and start a fresh one for the candidate.
    #[default]
    Eager,
    /// Scan earlier still-open clusters for one with spare capacity that
    /// satisfies the proximity policy; fall back to a fresh cluster. Slower,
    /// but yields fewer and denser clusters.
    Compact,
}

/// Which edges building projection scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionMode {
    /// Scan segments street by street in logical-street order.
    #[default]
    PerStreet,
    /// Scan the raw segment set, ignoring the street decomposition.
    Raw,
}

/// Search mode of the greedy position-chaining partitioner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChainMode {
    /// Distance is measured to a single active node (the last assigned
    /// building).
    #[default]
    ActiveNode,
    /// Distance is measured to the nearest member of the whole open cluster.
    WholeCluster,
}

/// Demand metric used to rank buildings for center selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DemandMetric {
    /// Annual heat demand.
    #[default]
    Heat,
    /// Annual electricity demand.
    Power,
    /// Sum of heat and electricity demand.
    Combined,
}

/// How the demand-priority partitioner resolves clusters over capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverflowMode {
    /// Evict the member farthest from the center (by network path) into a
    /// new singleton cluster, one at a time.
    #[default]
    Building,
    /// Evict the member with the lowest energetic factor (demand per meter
    /// of network path to the center) first.
    GroupEnergetic,
    /// Split the oversized cluster with a bounded k-means run; falls back to
    /// `Building` eviction if the split does not converge.
    KMeans,
}

/// Street-decomposition tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecompositionConfig {
    /// Dead-end spur edges up to this length are merged into the street they
    /// hang off instead of forming their own logical street.
    #[serde(default = "default_side_street_max")]
    pub side_street_max: Meters,
    /// Half-width of the angle window around 180 degrees within which two
    /// edges at a three-way node count as one street passing through.
    #[serde(default = "default_colinear_tolerance_deg")]
    pub colinear_tolerance_deg: f64,
}

fn default_side_street_max() -> Meters {
    Meters(30.0)
}

fn default_colinear_tolerance_deg() -> f64 {
    20.0
}

impl Default for DecompositionConfig {
    fn default() -> Self {
        Self {
            side_street_max: default_side_street_max(),
            colinear_tolerance_deg: default_colinear_tolerance_deg(),
        }
    }
}

/// Greedy position-chaining tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GreedyConfig {
    /// Maximum beeline distance the chain may jump to the next building.
    #[serde(default = "default_search_range")]
    pub search_range: Meters,
    #[serde(default)]
    pub chain_mode: ChainMode,
}

fn default_search_range() -> Meters {
    Meters(100.0)
}

impl Default for GreedyConfig {
    fn default() -> Self {
        Self {
            search_range: default_search_range(),
            chain_mode: ChainMode::default(),
        }
    }
}

/// Demand-priority tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DemandConfig {
    /// Minimum beeline spacing between accepted cluster centers.
    #[serde(default = "default_min_center_distance")]
    pub min_center_distance: Meters,
    /// Factor applied to the center spacing each time the selection walk
    /// finds too few centers. Must lie in (0, 1).
    #[serde(default = "default_center_distance_decay")]
    pub center_distance_decay: f64,
    #[serde(default)]
    pub demand_metric: DemandMetric,
    #[serde(default)]
    pub overflow_mode: OverflowMode,
}

fn default_min_center_distance() -> Meters {
    Meters(200.0)
}

fn default_center_distance_decay() -> f64 {
    0.9
}

impl Default for DemandConfig {
    fn default() -> Self {
        Self {
            min_center_distance: default_min_center_distance(),
            center_distance_decay: default_center_distance_decay(),
            demand_metric: DemandMetric::default(),
            overflow_mode: OverflowMode::default(),
        }
    }
}

/// k-means splitting tuning.
///
/// The splitter tries cluster counts from `ceil(n / max_cluster_size)` up to
/// `ceil(n * max_split_factor / max_cluster_size)` and keeps the first
/// clustering where every cluster fits the capacity bound. Both bounds are
/// empirical, not derived; treat them as tunables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KMeansConfig {
    #[serde(default = "default_max_split_factor")]
    pub max_split_factor: f64,
    /// Lloyd-iteration cap per cluster count.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

fn default_max_split_factor() -> f64 {
    3.0
}

fn default_max_iterations() -> usize {
    100
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            max_split_factor: default_max_split_factor(),
            max_iterations: default_max_iterations(),
        }
    }
}

/// Complete parameter bundle for one clustering run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(default)]
    pub strategy: Strategy,
    /// Hard cap on members per sealed cluster. Must be at least 2.
    #[serde(default = "default_max_cluster_size")]
    pub max_cluster_size: usize,
    /// Buildings farther than this from their street anchor never join the
    /// cluster currently under construction.
    #[serde(default = "default_max_building_to_street_distance")]
    pub max_building_to_street_distance: Meters,
    /// Pairwise building spacing bound checked by the proximity policy.
    #[serde(default = "default_max_building_to_building_distance")]
    pub max_building_to_building_distance: Meters,
    #[serde(default)]
    pub proximity_policy: ProximityPolicy,
    #[serde(default)]
    pub cluster_open_policy: ClusterOpenPolicy,
    #[serde(default)]
    pub projection_mode: ProjectionMode,
    /// Cluster ids are numbered densely starting here.
    #[serde(default)]
    pub first_cluster_id: usize,
    /// Seed for the k-means initialization; fixed seed makes runs
    /// reproducible.
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub decomposition: DecompositionConfig,
    #[serde(default)]
    pub greedy: GreedyConfig,
    #[serde(default)]
    pub demand: DemandConfig,
    #[serde(default)]
    pub kmeans: KMeansConfig,
}

fn default_max_cluster_size() -> usize {
    20
}

fn default_max_building_to_street_distance() -> Meters {
    Meters(50.0)
}

fn default_max_building_to_building_distance() -> Meters {
    Meters(60.0)
}

fn default_seed() -> u64 {
    42
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            max_cluster_size: default_max_cluster_size(),
            max_building_to_street_distance: default_max_building_to_street_distance(),
            max_building_to_building_distance: default_max_building_to_building_distance(),
            proximity_policy: ProximityPolicy::default(),
            cluster_open_policy: ClusterOpenPolicy::default(),
            projection_mode: ProjectionMode::default(),
            first_cluster_id: 0,
            seed: default_seed(),
            decomposition: DecompositionConfig::default(),
            greedy: GreedyConfig::default(),
            demand: DemandConfig::default(),
            kmeans: KMeansConfig::default(),
        }
    }
}

impl ClusterConfig {
    /// Check every parameter against its valid range.
    ///
    /// Returns the first violated bound. Comparisons are written so that NaN
    /// values fail them too.
    pub fn validate(&self) -> ClusterResult<()> {
        if self.max_cluster_size < 2 {
            return Err(ClusterError::Constraint(format!(
                "max_cluster_size must be at least 2, got {}",
                self.max_cluster_size
            )));
        }
        if !(self.max_building_to_street_distance.value() > 0.0) {
            return Err(ClusterError::Constraint(format!(
                "max_building_to_street_distance must be positive, got {}",
                self.max_building_to_street_distance
            )));
        }
        if !(self.max_building_to_building_distance.value() > 0.0) {
            return Err(ClusterError::Constraint(format!(
                "max_building_to_building_distance must be positive, got {}",
                self.max_building_to_building_distance
            )));
        }
        if !(self.decomposition.side_street_max.value() >= 0.0) {
            return Err(ClusterError::Constraint(format!(
                "side_street_max must not be negative, got {}",
                self.decomposition.side_street_max
            )));
        }
        let tolerance = self.decomposition.colinear_tolerance_deg;
        if !(tolerance > 0.0 && tolerance < 90.0) {
            return Err(ClusterError::Constraint(format!(
                "colinear_tolerance_deg must lie in (0, 90), got {tolerance}"
            )));
        }
        if !(self.greedy.search_range.value() > 0.0) {
            return Err(ClusterError::Constraint(format!(
                "search_range must be positive, got {}",
                self.greedy.search_range
            )));
        }
        if !(self.demand.min_center_distance.value() > 0.0) {
            return Err(ClusterError::Constraint(format!(
                "min_center_distance must be positive, got {}",
                self.demand.min_center_distance
            )));
        }
        let decay = self.demand.center_distance_decay;
        if !(decay > 0.0 && decay < 1.0) {
            return Err(ClusterError::Constraint(format!(
                "center_distance_decay must lie in (0, 1), got {decay}"
            )));
        }
        if !(self.kmeans.max_split_factor >= 1.0) {
            return Err(ClusterError::Constraint(format!(
                "max_split_factor must be at least 1, got {}",
                self.kmeans.max_split_factor
            )));
        }
        if self.kmeans.max_iterations == 0 {
            return Err(ClusterError::Constraint(
                "max_iterations must be at least 1, got 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load a [`ClusterConfig`] from a YAML or JSON file.
///
/// The format is chosen by file extension; unknown extensions are parsed as
/// YAML first, then JSON. Missing fields fall back to their defaults, so a
/// one-line file is a valid config.
pub fn load_config_from_path(path: &Path) -> DhpResult<ClusterConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading cluster config '{}'", path.display()))?;

    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let config = if extension.eq_ignore_ascii_case("json") {
        serde_json::from_str(&data)
            .with_context(|| format!("parsing cluster config json '{}'", path.display()))?
    } else if extension.eq_ignore_ascii_case("yaml") || extension.eq_ignore_ascii_case("yml") {
        serde_yaml::from_str(&data)
            .with_context(|| format!("parsing cluster config yaml '{}'", path.display()))?
    } else {
        serde_yaml::from_str(&data)
            .or_else(|_| serde_json::from_str(&data))
            .with_context(|| format!("parsing cluster config '{}'", path.display()))?
    };

    Ok(config)
}
