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

//! Weighted undirected graph consumed by the optimiser.
//!
//! Nodes are contiguous indices `0..n`. Parallel edges and self-loops are
//! allowed. Every node carries a real-valued size, 1.0 for input graphs;
//! aggregate graphs produced by [`Graph::collapse`] carry the summed sizes of
//! the communities they stand for.

use foldhash::{HashMap, HashMapExt};
use petgraph::graph::UnGraph;
use petgraph::visit::EdgeRef;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct Graph {
    /// Adjacency lists. Each undirected edge `{u, v}` with `u != v` appears
    /// in both `adj[u]` and `adj[v]`; a self-loop appears once in `adj[v]`.
    adj: Vec<Vec<(usize, f64)>>,
    node_sizes: Vec<f64>,
    /// Weighted degree per node, self-loops counted twice.
    strength: Vec<f64>,
    self_loops: Vec<f64>,
    /// Sum of all edge weights, each edge counted once.
    total_weight: f64,
    total_size: f64,
}

impl Graph {
    /// Build a graph with unit node sizes from a weighted edge list.
    pub fn from_edges(node_count: usize, edges: &[(usize, usize, f64)]) -> Result<Self> {
        Self::from_edges_with_sizes(node_count, edges, vec![1.0; node_count])
    }

    /// Build a graph with explicit node sizes from a weighted edge list.
    pub fn from_edges_with_sizes(
        node_count: usize,
        edges: &[(usize, usize, f64)],
        node_sizes: Vec<f64>,
    ) -> Result<Self> {
        if node_sizes.len() != node_count {
            return Err(Error::NodeCountMismatch {
                expected: node_count,
                found: node_sizes.len(),
            });
        }
        let mut adj = vec![Vec::new(); node_count];
        let mut strength = vec![0.0; node_count];
        let mut self_loops = vec![0.0; node_count];
        let mut total_weight = 0.0;
        for &(u, v, w) in edges {
            if u >= node_count {
                return Err(Error::NodeIndexOutOfBounds {
                    index: u,
                    node_count,
                });
            }
            if v >= node_count {
                return Err(Error::NodeIndexOutOfBounds {
                    index: v,
                    node_count,
                });
            }
            if u == v {
                adj[u].push((u, w));
                self_loops[u] += w;
                strength[u] += 2.0 * w;
            } else {
                adj[u].push((v, w));
                adj[v].push((u, w));
                strength[u] += w;
                strength[v] += w;
            }
            total_weight += w;
        }
        let total_size = node_sizes.iter().sum();
        Ok(Graph {
            adj,
            node_sizes,
            strength,
            self_loops,
            total_weight,
            total_size,
        })
    }

    /// Build a graph from a petgraph [`UnGraph`], extracting edge weights
    /// with the supplied closure.
    pub fn from_ungraph<N, E>(
        graph: &UnGraph<N, E>,
        mut weight: impl FnMut(&E) -> f64,
    ) -> Result<Self> {
        let edges: Vec<(usize, usize, f64)> = graph
            .edge_references()
            .map(|edge| {
                (
                    edge.source().index(),
                    edge.target().index(),
                    weight(edge.weight()),
                )
            })
            .collect();
        Self::from_edges(graph.node_count(), &edges)
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.adj.len()
    }

    /// Neighbour slots of `v` with their edge weights. A self-loop shows up
    /// as a single `(v, w)` entry.
    #[inline]
    pub fn neighbours(&self, v: usize) -> &[(usize, f64)] {
        &self.adj[v]
    }

    /// Weighted degree of `v`, self-loops counted twice.
    #[inline]
    pub fn strength(&self, v: usize) -> f64 {
        self.strength[v]
    }

    #[inline]
    pub fn self_loop(&self, v: usize) -> f64 {
        self.self_loops[v]
    }

    #[inline]
    pub fn node_size(&self, v: usize) -> f64 {
        self.node_sizes[v]
    }

    #[inline]
    pub fn node_sizes(&self) -> &[f64] {
        &self.node_sizes
    }

    /// Sum of all edge weights, each edge counted once.
    #[inline]
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    #[inline]
    pub fn total_size(&self) -> f64 {
        self.total_size
    }

    /// Collapse communities into super-nodes.
    ///
    /// `membership` assigns each node a community in `0..n_comms`; ids must
    /// be contiguous. The aggregate graph has one node per community, node
    /// sizes summed, edge weights between communities summed, and
    /// intra-community weight turned into a self-loop. Total edge weight and
    /// total node size are conserved exactly.
    pub fn collapse(&self, membership: &[usize], n_comms: usize) -> Result<Graph> {
        let n = self.node_count();
        if membership.len() != n {
            return Err(Error::NodeCountMismatch {
                expected: n,
                found: membership.len(),
            });
        }
        let mut sizes = vec![0.0; n_comms];
        for v in 0..n {
            let c = membership[v];
            if c >= n_comms {
                return Err(Error::CommunityIndexOutOfBounds {
                    index: c,
                    community_count: n_comms,
                });
            }
            sizes[c] += self.node_sizes[v];
        }
        let mut weights: HashMap<(usize, usize), f64> = HashMap::new();
        for v in 0..n {
            let cv = membership[v];
            for &(u, w) in &self.adj[v] {
                // Visit each undirected edge exactly once; self-loops are
                // stored once and satisfy u == v.
                if u < v {
                    continue;
                }
                let cu = membership[u];
                let key = if cu < cv { (cu, cv) } else { (cv, cu) };
                *weights.entry(key).or_insert(0.0) += w;
            }
        }
        let mut edges: Vec<(usize, usize, f64)> = weights
            .into_iter()
            .map(|((a, b), w)| (a, b, w))
            .collect();
        // Hash order is not deterministic; adjacency order must be.
        edges.sort_unstable_by_key(|&(a, b, _)| (a, b));
        Self::from_edges_with_sizes(n_comms, &edges, sizes)
    }
}
