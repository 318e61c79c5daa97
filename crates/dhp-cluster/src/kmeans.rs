//! Bounded k-means splitting.
//!
//! Lloyd's algorithm over building coordinates with seeded random-choice
//! initialization. The splitter sweeps increasing cluster counts and returns
//! the first stable clustering in which every cluster respects the capacity
//! bound, so callers get the coarsest split that fits. Convergence means a
//! stable assignment between consecutive iterations; a sweep that exhausts
//! its cluster-count range without a fitting split is reported as
//! [`ClusterError::Convergence`].

use crate::config::KMeansConfig;
use crate::error::{ClusterError, ClusterResult};
use dhp_core::{geometry, BuildingId};
use geo::Point;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use tracing::debug;

/// Split `points` into capacity-respecting parts.
///
/// Cluster counts are tried from `ceil(n / max_cluster_size)` up to
/// `ceil(n * max_split_factor / max_cluster_size)` (at most one cluster per
/// point). Parts come back in center order with the input's member order
/// preserved; empty parts are dropped.
pub fn split(
    points: &[(BuildingId, Point<f64>)],
    max_cluster_size: usize,
    config: &KMeansConfig,
    seed: u64,
) -> ClusterResult<Vec<Vec<BuildingId>>> {
    let n = points.len();
    if n == 0 {
        return Ok(Vec::new());
    }
    if n <= max_cluster_size {
        return Ok(vec![points.iter().map(|(id, _)| *id).collect()]);
    }
    let k_min = n.div_ceil(max_cluster_size);
    let k_max = ((n as f64 * config.max_split_factor / max_cluster_size as f64).ceil() as usize)
        .clamp(k_min, n);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut attempts = 0;
    for k in k_min..=k_max {
        attempts += 1;
        let Some(assignment) = lloyd(points, k, config.max_iterations, &mut rng) else {
            continue;
        };
        let mut sizes = vec![0usize; k];
        for &cluster in &assignment {
            sizes[cluster] += 1;
        }
        if sizes.iter().all(|&size| size <= max_cluster_size) {
            debug!(k, n, attempts, "k-means split fits capacity");
            let mut parts = vec![Vec::new(); k];
            for (&(id, _), &cluster) in points.iter().zip(&assignment) {
                parts[cluster].push(id);
            }
            parts.retain(|part| !part.is_empty());
            return Ok(parts);
        }
    }
    Err(ClusterError::Convergence { attempts })
}

/// One Lloyd run; `None` when the assignment does not stabilize within the
/// iteration cap.
fn lloyd(
    points: &[(BuildingId, Point<f64>)],
    k: usize,
    max_iterations: usize,
    rng: &mut StdRng,
) -> Option<Vec<usize>> {
    let mut centers = initial_centers(points, k, rng);
    let mut assignment: Option<Vec<usize>> = None;
    for _ in 0..max_iterations {
        let next = assign(points, &centers);
        let mut sizes = vec![0usize; k];
        for &cluster in &next {
            sizes[cluster] += 1;
        }
        let empties: Vec<usize> = sizes
            .iter()
            .enumerate()
            .filter(|&(_, &size)| size == 0)
            .map(|(cluster, _)| cluster)
            .collect();
        if !empties.is_empty() {
            // An empty cluster re-seeds on the point farthest from its
            // assigned center, then the run restarts its stability check.
            let mut used: HashSet<usize> = HashSet::new();
            for empty in empties {
                let mut farthest: Option<(usize, f64)> = None;
                for (i, &(_, at)) in points.iter().enumerate() {
                    if used.contains(&i) {
                        continue;
                    }
                    let d = geometry::distance(at, centers[next[i]]).value();
                    if farthest.map_or(true, |(_, best)| d > best) {
                        farthest = Some((i, d));
                    }
                }
                if let Some((i, _)) = farthest {
                    centers[empty] = points[i].1;
                    used.insert(i);
                }
            }
            assignment = None;
            continue;
        }
        if assignment.as_ref() == Some(&next) {
            return Some(next);
        }
        centers = centroids(points, &next, &centers, k);
        assignment = Some(next);
    }
    None
}

/// Distinct random points as starting centers, in index order so the outcome
/// depends only on the rng sequence.
fn initial_centers(
    points: &[(BuildingId, Point<f64>)],
    k: usize,
    rng: &mut StdRng,
) -> Vec<Point<f64>> {
    let mut chosen: HashSet<usize> = HashSet::new();
    while chosen.len() < k.min(points.len()) {
        chosen.insert(rng.gen_range(0..points.len()));
    }
    let mut indices: Vec<usize> = chosen.into_iter().collect();
    indices.sort_unstable();
    indices.into_iter().map(|i| points[i].1).collect()
}

fn assign(points: &[(BuildingId, Point<f64>)], centers: &[Point<f64>]) -> Vec<usize> {
    points
        .iter()
        .map(|&(_, at)| {
            let mut best = 0usize;
            let mut best_d = f64::INFINITY;
            for (cluster, &center) in centers.iter().enumerate() {
                let d = geometry::distance(at, center).value();
                if d < best_d {
                    best_d = d;
                    best = cluster;
                }
            }
            best
        })
        .collect()
}

fn centroids(
    points: &[(BuildingId, Point<f64>)],
    assignment: &[usize],
    previous: &[Point<f64>],
    k: usize,
) -> Vec<Point<f64>> {
    let mut sums = vec![(0.0_f64, 0.0_f64, 0_usize); k];
    for (&(_, at), &cluster) in points.iter().zip(assignment) {
        sums[cluster].0 += at.x();
        sums[cluster].1 += at.y();
        sums[cluster].2 += 1;
    }
    sums.iter()
        .enumerate()
        .map(|(cluster, &(x, y, count))| {
            if count == 0 {
                previous[cluster]
            } else {
                Point::new(x / count as f64, y / count as f64)
            }
        })
        .collect()
}
