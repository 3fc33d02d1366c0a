// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Argument-shape errors detected at call boundaries.
///
/// Numerical edge cases (zero-weight graphs, already-converged partitions)
/// are not errors; the optimisation routines report them as a total
/// improvement of `0.0`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The multiplex layer vectors do not line up.
    #[error("layer count mismatch: {partitions} partitions, {weights} layer weights")]
    LayerCountMismatch { partitions: usize, weights: usize },

    /// Two structures that must cover the same node set have different sizes.
    /// Raised for mismatched layers, membership vectors of the wrong length
    /// and constrained partitions that do not cover every node.
    #[error("node count mismatch: expected {expected}, found {found}")]
    NodeCountMismatch { expected: usize, found: usize },

    /// An edge endpoint refers to a node outside the graph.
    #[error("node index {index} out of bounds for a graph with {node_count} nodes")]
    NodeIndexOutOfBounds { index: usize, node_count: usize },

    /// A membership entry refers to a community outside the declared range.
    #[error("community {index} out of bounds for {community_count} communities")]
    CommunityIndexOutOfBounds {
        index: usize,
        community_count: usize,
    },
}
