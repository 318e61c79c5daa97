//! Error types for clustering runs.
//!
//! Every fallible engine operation returns [`ClusterResult`]. The variants
//! separate bad input (`Topology`, `Constraint`) from internal defects
//! (`AssignmentInvariant`) so callers can decide what is retryable.

use thiserror::Error;

/// Errors produced while partitioning a street graph into clusters.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The street topology cannot support a run: no decomposition start
    /// edge exists, or a building is unreachable from every cluster center.
    #[error("Topology error: {0}")]
    Topology(String),

    /// A configuration parameter is outside its valid range.
    #[error("Constraint error: {0}")]
    Constraint(String),

    /// The k-means overflow splitter found no capacity-respecting
    /// clustering within its bounded cluster-count range.
    #[error("No capacity-respecting split found after {attempts} attempts")]
    Convergence { attempts: usize },

    /// The postprocessor found a building assigned zero or multiple times,
    /// or a sealed cluster over capacity. Always a defect, never bad input.
    #[error("Assignment invariant violated: {0}")]
    AssignmentInvariant(String),
}

/// Result type alias for clustering operations
pub type ClusterResult<T> = Result<T, ClusterError>;

impl From<ClusterError> for dhp_core::DhpError {
    fn from(err: ClusterError) -> Self {
        match err {
            ClusterError::Topology(msg) => dhp_core::DhpError::Graph(msg),
            ClusterError::Constraint(msg) => dhp_core::DhpError::Config(msg),
            ClusterError::Convergence { attempts } => dhp_core::DhpError::Other(format!(
                "clustering failed to converge after {attempts} attempts"
            )),
            ClusterError::AssignmentInvariant(msg) => dhp_core::DhpError::Validation(msg),
        }
    }
}
