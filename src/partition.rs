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

//! Node-to-community assignments with incremental bookkeeping.
//!
//! [`VertexPartition`] is the seam the optimiser works against: an object-safe
//! view of one layer's assignment that can price and apply single-node moves
//! and be re-created on aggregate graphs. [`Partition`] is the concrete
//! implementation, generic over the quality function.

use std::rc::Rc;

use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::quality::{CommunityView, MoveContext, QualityFunction};

/// One layer's node-to-community assignment, as consumed by the optimiser.
///
/// Community ids are indices into the per-community aggregate tables; they
/// are not required to be contiguous while moves are in flight. Moving a
/// node to an id one past the current table length founds a new community.
pub trait VertexPartition {
    fn graph(&self) -> &Rc<Graph>;

    fn node_count(&self) -> usize;

    fn membership(&self) -> &[usize];

    fn community_of(&self, v: usize) -> usize;

    fn community_node_count(&self, comm: usize) -> usize;

    fn community_size(&self, comm: usize) -> f64;

    /// Number of non-empty communities.
    fn n_communities(&self) -> usize;

    /// Ids of all non-empty communities, in ascending order.
    fn nonempty_communities(&self) -> Vec<usize>;

    /// Gain from moving `v` into `comm`, without applying it. Zero when `v`
    /// is already a member.
    fn diff_move(&self, v: usize, comm: usize) -> f64;

    /// Move `v` into `comm`, updating the community aggregates.
    fn move_node(&mut self, v: usize, comm: usize);

    /// Score of the current assignment under the partition's quality function.
    fn quality(&self) -> f64;

    /// Replace the whole assignment and rebuild the aggregates. The slice
    /// must cover every node.
    fn set_membership(&mut self, membership: &[usize]);

    /// Adopt a coarser partition's assignment: node `v` takes the community
    /// of the aggregate node `node_to_aggregate[v]`.
    fn from_coarse_partition(&mut self, coarse_membership: &[usize], node_to_aggregate: &[usize]);

    /// Compact community ids to `0..k`, ordered by first node occurrence.
    fn renumber_communities(&mut self);

    /// An id usable as an empty target community: an existing empty slot if
    /// any, otherwise a fresh id, or `None` when every node is already a
    /// singleton.
    fn empty_community(&self) -> Option<usize>;

    /// A fresh singleton partition over `graph` with the same quality
    /// parameters. Used to seed refinement.
    fn create_like(&self, graph: Rc<Graph>) -> Box<dyn VertexPartition>;

    /// Like [`VertexPartition::create_like`], with an explicit assignment.
    /// Used to seed the partition of an aggregate graph.
    fn create_like_with_membership(
        &self,
        graph: Rc<Graph>,
        membership: Vec<usize>,
    ) -> Box<dyn VertexPartition>;
}

/// Concrete [`VertexPartition`] over a [`Graph`], generic over the quality
/// function.
///
/// The graph is shared via `Rc` because aggregate graphs are created and
/// owned by the recursion frames of the multilevel driver while the
/// partitions over them move independently.
#[derive(Debug, Clone)]
pub struct Partition<Q> {
    graph: Rc<Graph>,
    membership: Vec<usize>,
    comms: Vec<CommunityView>,
    quality_fn: Q,
}

impl<Q: QualityFunction> Partition<Q> {
    /// Singleton partition: every node in its own community.
    pub fn singleton(graph: Rc<Graph>) -> Self
    where
        Q: Default,
    {
        Self::with_quality(graph, Q::default())
    }

    /// Singleton partition with an explicit resolution parameter.
    pub fn with_resolution(graph: Rc<Graph>, resolution: f64) -> Self {
        Self::with_quality(graph, Q::with_resolution(resolution))
    }

    /// Singleton partition with an explicit quality function instance.
    pub fn with_quality(graph: Rc<Graph>, quality_fn: Q) -> Self {
        let membership = (0..graph.node_count()).collect();
        Self::assemble(graph, membership, quality_fn)
    }

    /// Partition with a caller-supplied assignment, which must cover every
    /// node.
    pub fn with_membership(
        graph: Rc<Graph>,
        membership: Vec<usize>,
        quality_fn: Q,
    ) -> Result<Self> {
        if membership.len() != graph.node_count() {
            return Err(Error::NodeCountMismatch {
                expected: graph.node_count(),
                found: membership.len(),
            });
        }
        Ok(Self::assemble(graph, membership, quality_fn))
    }

    fn assemble(graph: Rc<Graph>, membership: Vec<usize>, quality_fn: Q) -> Self {
        let mut partition = Partition {
            graph,
            membership,
            comms: Vec::new(),
            quality_fn,
        };
        partition.rebuild_aggregates();
        partition
    }

    pub fn quality_fn(&self) -> &Q {
        &self.quality_fn
    }

    /// Per-community aggregates, indexed by community id. Entries for empty
    /// communities are all-zero.
    pub fn communities(&self) -> &[CommunityView] {
        &self.comms
    }

    fn rebuild_aggregates(&mut self) {
        let n_comms = self.membership.iter().copied().max().map_or(0, |m| m + 1);
        let mut comms = vec![CommunityView::default(); n_comms];
        for v in 0..self.membership.len() {
            let c = self.membership[v];
            comms[c].node_count += 1;
            comms[c].size += self.graph.node_size(v);
            comms[c].strength += self.graph.strength(v);
            comms[c].weight_inside += self.graph.self_loop(v);
            for &(u, w) in self.graph.neighbours(v) {
                // Each intra-community edge once; self-loops already added.
                if u > v && self.membership[u] == c {
                    comms[c].weight_inside += w;
                }
            }
        }
        self.comms = comms;
    }

    /// Edge weight from `v` to the members of `comm`, self-loops excluded.
    fn weight_to_comm(&self, v: usize, comm: usize) -> f64 {
        self.graph
            .neighbours(v)
            .iter()
            .filter(|&&(u, _)| u != v && self.membership[u] == comm)
            .map(|&(_, w)| w)
            .sum()
    }
}

impl<Q: QualityFunction + 'static> VertexPartition for Partition<Q> {
    fn graph(&self) -> &Rc<Graph> {
        &self.graph
    }

    fn node_count(&self) -> usize {
        self.membership.len()
    }

    fn membership(&self) -> &[usize] {
        &self.membership
    }

    fn community_of(&self, v: usize) -> usize {
        self.membership[v]
    }

    fn community_node_count(&self, comm: usize) -> usize {
        self.comms.get(comm).map_or(0, |c| c.node_count)
    }

    fn community_size(&self, comm: usize) -> f64 {
        self.comms.get(comm).map_or(0.0, |c| c.size)
    }

    fn n_communities(&self) -> usize {
        self.comms.iter().filter(|c| c.node_count > 0).count()
    }

    fn nonempty_communities(&self) -> Vec<usize> {
        self.comms
            .iter()
            .enumerate()
            .filter(|(_, c)| c.node_count > 0)
            .map(|(id, _)| id)
            .collect()
    }

    fn diff_move(&self, v: usize, comm: usize) -> f64 {
        let old = self.membership[v];
        if comm == old {
            return 0.0;
        }
        let ctx = MoveContext {
            node_size: self.graph.node_size(v),
            strength: self.graph.strength(v),
            weight_to_old: self.weight_to_comm(v, old),
            weight_to_new: self.weight_to_comm(v, comm),
            old: self.comms[old],
            new: self.comms.get(comm).copied().unwrap_or_default(),
        };
        self.quality_fn.diff_move(&self.graph, ctx)
    }

    fn move_node(&mut self, v: usize, comm: usize) {
        let old = self.membership[v];
        if comm == old {
            return;
        }
        if comm >= self.comms.len() {
            self.comms.resize(comm + 1, CommunityView::default());
        }
        let weight_to_old = self.weight_to_comm(v, old);
        let weight_to_new = self.weight_to_comm(v, comm);
        let size = self.graph.node_size(v);
        let strength = self.graph.strength(v);
        let self_loop = self.graph.self_loop(v);

        let from = &mut self.comms[old];
        from.node_count -= 1;
        from.size -= size;
        from.strength -= strength;
        from.weight_inside -= weight_to_old + self_loop;

        self.membership[v] = comm;

        let to = &mut self.comms[comm];
        to.node_count += 1;
        to.size += size;
        to.strength += strength;
        to.weight_inside += weight_to_new + self_loop;
    }

    fn quality(&self) -> f64 {
        self.quality_fn.quality(&self.graph, &self.comms)
    }

    fn set_membership(&mut self, membership: &[usize]) {
        debug_assert_eq!(membership.len(), self.membership.len());
        self.membership.clear();
        self.membership.extend_from_slice(membership);
        self.rebuild_aggregates();
    }

    fn from_coarse_partition(&mut self, coarse_membership: &[usize], node_to_aggregate: &[usize]) {
        debug_assert_eq!(node_to_aggregate.len(), self.membership.len());
        for v in 0..self.membership.len() {
            self.membership[v] = coarse_membership[node_to_aggregate[v]];
        }
        self.rebuild_aggregates();
    }

    fn renumber_communities(&mut self) {
        let mut new_id = vec![usize::MAX; self.comms.len()];
        let mut next = 0;
        for m in &mut self.membership {
            if new_id[*m] == usize::MAX {
                new_id[*m] = next;
                next += 1;
            }
            *m = new_id[*m];
        }
        self.rebuild_aggregates();
    }

    fn empty_community(&self) -> Option<usize> {
        if let Some(id) = self.comms.iter().position(|c| c.node_count == 0) {
            return Some(id);
        }
        if self.comms.len() < self.membership.len() {
            Some(self.comms.len())
        } else {
            None
        }
    }

    fn create_like(&self, graph: Rc<Graph>) -> Box<dyn VertexPartition> {
        Box::new(Self::with_quality(graph, self.quality_fn.clone()))
    }

    fn create_like_with_membership(
        &self,
        graph: Rc<Graph>,
        membership: Vec<usize>,
    ) -> Box<dyn VertexPartition> {
        debug_assert_eq!(membership.len(), graph.node_count());
        Box::new(Self::assemble(graph, membership, self.quality_fn.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::{Cpm, Modularity};

    fn two_triangles_with_bridge() -> Rc<Graph> {
        Rc::new(
            Graph::from_edges(
                6,
                &[
                    (0, 1, 1.0),
                    (1, 2, 1.0),
                    (0, 2, 1.0),
                    (3, 4, 1.0),
                    (4, 5, 1.0),
                    (3, 5, 1.0),
                    (2, 3, 0.5),
                ],
            )
            .unwrap(),
        )
    }

    #[test]
    fn singleton_aggregates() {
        let p = Partition::<Modularity>::singleton(two_triangles_with_bridge());
        assert_eq!(p.n_communities(), 6);
        for c in p.communities() {
            assert_eq!(c.node_count, 1);
            assert_eq!(c.weight_inside, 0.0);
        }
        assert_eq!(p.communities()[2].strength, 2.5);
    }

    #[test]
    fn move_node_matches_rebuilt_aggregates() {
        let graph = two_triangles_with_bridge();
        let mut p = Partition::<Modularity>::singleton(graph.clone());
        p.move_node(1, 0);
        p.move_node(2, 0);
        p.move_node(4, 3);
        p.move_node(5, 3);
        let rebuilt = Partition::with_membership(
            graph,
            p.membership().to_vec(),
            Modularity::default(),
        )
        .unwrap();
        for (a, b) in p.communities().iter().zip(rebuilt.communities()) {
            assert_eq!(a.node_count, b.node_count);
            assert!((a.size - b.size).abs() < 1e-12);
            assert!((a.strength - b.strength).abs() < 1e-12);
            assert!((a.weight_inside - b.weight_inside).abs() < 1e-12);
        }
    }

    #[test]
    fn diff_move_is_consistent_with_quality() {
        let graph = two_triangles_with_bridge();
        for resolution in [0.3, 1.0] {
            let mut p = Partition::<Cpm>::with_resolution(graph.clone(), resolution);
            let moves = [(1usize, 0usize), (2, 0), (4, 3), (5, 3), (3, 0)];
            for (v, c) in moves {
                let before = p.quality();
                let delta = p.diff_move(v, c);
                p.move_node(v, c);
                assert!((p.quality() - before - delta).abs() < 1e-12);
            }
        }
        let mut p = Partition::<Modularity>::singleton(graph);
        for (v, c) in [(1usize, 0usize), (2, 0), (4, 3), (0, 3)] {
            let before = p.quality();
            let delta = p.diff_move(v, c);
            p.move_node(v, c);
            assert!((p.quality() - before - delta).abs() < 1e-12);
        }
    }

    #[test]
    fn renumber_orders_by_first_occurrence() {
        let graph = two_triangles_with_bridge();
        let mut p = Partition::with_membership(
            graph,
            vec![7, 7, 3, 3, 9, 9],
            Modularity::default(),
        )
        .unwrap();
        p.renumber_communities();
        assert_eq!(p.membership(), &[0, 0, 1, 1, 2, 2]);
        assert_eq!(p.n_communities(), 3);
    }

    #[test]
    fn coarse_projection() {
        let graph = two_triangles_with_bridge();
        let mut p = Partition::<Modularity>::singleton(graph);
        // Aggregate nodes: 0 for the first triangle, 1 for the second; the
        // coarse partition then merges both aggregates into community 4.
        p.from_coarse_partition(&[4, 4], &[0, 0, 0, 1, 1, 1]);
        assert_eq!(p.membership(), &[4, 4, 4, 4, 4, 4]);
        assert_eq!(p.n_communities(), 1);
    }

    #[test]
    fn empty_community_reuses_holes() {
        let graph = two_triangles_with_bridge();
        let mut p = Partition::<Modularity>::singleton(graph);
        assert_eq!(p.empty_community(), None);
        p.move_node(1, 0);
        // Community 1 is now an empty slot.
        assert_eq!(p.empty_community(), Some(1));
        p.renumber_communities();
        assert_eq!(p.empty_community(), Some(5));
    }
}
