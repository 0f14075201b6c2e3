//! Error types for the algorithm kernels.

use thiserror::Error;

/// Errors from graph algorithms.
///
/// All algorithms validate their inputs up front and return these instead of
/// silently ignoring malformed edge lists.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    /// An edge references a node id >= the declared node count.
    #[error("edge references node {0} but graph has only {1} nodes")]
    NodeOutOfBounds(u32, u32),
}
