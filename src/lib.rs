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

//! Community detection with the Leiden algorithm.
//!
//! The Leiden algorithm improves on Louvain by refining each partition
//! before aggregation, which guarantees that communities are internally
//! well connected, and by using a fast queue-driven local move. This crate
//! implements the optimisation core: quality functions ([`Cpm`] and
//! [`Modularity`], extensible through [`QualityFunction`]), incremental
//! partitions, and the multilevel [`Optimiser`] with multiplex support.
//!
//! ```
//! use std::rc::Rc;
//! use leidenalg::{Graph, Modularity, Optimiser, VertexPartition};
//!
//! let graph = Rc::new(Graph::from_edges(
//!     6,
//!     &[
//!         (0, 1, 1.0),
//!         (1, 2, 1.0),
//!         (0, 2, 1.0),
//!         (3, 4, 1.0),
//!         (4, 5, 1.0),
//!         (3, 5, 1.0),
//!     ],
//! )?);
//! let mut optimiser = Optimiser::with_seed(42);
//! let partition = optimiser.find_partition::<Modularity>(&graph)?;
//! assert_eq!(partition.n_communities(), 2);
//! # Ok::<(), leidenalg::Error>(())
//! ```

pub mod error;
pub mod graph;
pub mod optimiser;
pub mod partition;
pub mod quality;

pub use error::{Error, Result};
pub use graph::Graph;
pub use optimiser::{ConsiderComms, Optimiser, Routine};
pub use partition::{Partition, VertexPartition};
pub use quality::{CommunityView, Cpm, Modularity, MoveContext, QualityFunction};
