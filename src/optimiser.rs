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
// https://arxiv.org/abs/1810.08473

//! The Leiden optimisation driver.
//!
//! [`Optimiser`] repeatedly moves nodes between communities to maximise a
//! partition's quality function, optionally refines the result so that the
//! communities used for aggregation are internally well connected, collapses
//! the graph and recurses on the aggregate, then projects the coarse
//! assignment back onto the original nodes.
//!
//! Every operation exists in a multiplex form that optimises several
//! structurally aligned layers at once: a move is evaluated as the
//! layer-weight-weighted sum of per-layer gains and applied to all layers
//! atomically. Layer weights may be negative, in which case the
//! neighbourhood-restricted candidate policies can miss the optimum and
//! [`ConsiderComms::AllComms`] should be used instead.

use std::collections::VecDeque;
use std::rc::Rc;

use foldhash::{HashSet, HashSetExt};
use log::debug;
use rand::prelude::*;
use rand_pcg::Pcg64;

use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::partition::{Partition, VertexPartition};
use crate::quality::QualityFunction;

/// Which communities are evaluated as move targets for a node.
///
/// The variants correspond to the classic integer constants `ALL_COMMS = 1`,
/// `ALL_NEIGH_COMMS = 2`, `RAND_COMM = 3` and `RAND_NEIGH_COMM = 4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsiderComms {
    /// Every non-empty community in the partition.
    AllComms,
    /// The communities of the node's neighbours, across all layers.
    AllNeighComms,
    /// One non-empty community drawn uniformly at random.
    RandComm,
    /// The community of one uniformly random neighbour.
    RandNeighComm,
}

/// Which local-search routine a phase runs.
///
/// The variants correspond to the classic integer constants
/// `MOVE_NODES = 10` and `MERGE_NODES = 11`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routine {
    /// Full reassignment: a node may leave its community, found a new one,
    /// or join any candidate.
    MoveNodes,
    /// Join-only: a node still in a singleton community may join an existing
    /// community, and nothing ever fragments. Cheaper, and required for the
    /// refinement phase.
    MergeNodes,
}

/// Community detection driver implementing the Leiden algorithm.
///
/// Configuration lives in public fields; the RNG is instance-owned so that
/// several optimisers can run independently and reproducibly.
pub struct Optimiser {
    /// Candidate policy for the main local-move phase.
    pub consider_comms: ConsiderComms,
    /// Candidate policy for the refinement phase.
    pub refine_consider_comms: ConsiderComms,
    /// Refine the partition before aggregating. This is what guarantees
    /// aggregated communities are internally well connected.
    pub refine_partition: bool,
    /// Routine for the main phase.
    pub optimise_routine: Routine,
    /// Routine for the refinement phase.
    pub refine_routine: Routine,
    /// Always offer an empty community as a move target, enabling singleton
    /// splits.
    pub consider_empty_community: bool,
    rng: Pcg64,
}

impl Default for Optimiser {
    fn default() -> Self {
        Self::new()
    }
}

impl Optimiser {
    /// Optimiser with OS-entropy seeding. Use [`Optimiser::with_seed`] or
    /// [`Optimiser::set_rng_seed`] for reproducible runs.
    pub fn new() -> Self {
        Self::with_rng(Pcg64::from_os_rng())
    }

    /// Optimiser with a deterministic RNG stream.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(Pcg64::seed_from_u64(seed))
    }

    fn with_rng(rng: Pcg64) -> Self {
        Optimiser {
            consider_comms: ConsiderComms::AllNeighComms,
            refine_consider_comms: ConsiderComms::AllNeighComms,
            refine_partition: true,
            optimise_routine: Routine::MoveNodes,
            refine_routine: Routine::MergeNodes,
            consider_empty_community: true,
            rng,
        }
    }

    /// Reseed the instance RNG. Given a fixed seed and fixed inputs, every
    /// subsequent run is exactly reproducible.
    pub fn set_rng_seed(&mut self, seed: u64) {
        self.rng = Pcg64::seed_from_u64(seed);
    }

    // ------------------------------------------------------------------
    // Multilevel driver
    // ------------------------------------------------------------------

    /// Optimise a single partition in place. Returns the total quality
    /// improvement, which is never negative.
    pub fn optimise_partition(&mut self, partition: &mut dyn VertexPartition) -> Result<f64> {
        let mut layers = [partition];
        self.optimise_partitions(&mut layers, &[1.0])
    }

    /// Optimise several structurally aligned layers at once.
    ///
    /// All layers must have the same node count and start from identical
    /// membership vectors (a "node" is the tuple of corresponding nodes
    /// across layers). Moves are applied to every layer; on return all
    /// memberships are identical and compactly numbered.
    pub fn optimise_partitions(
        &mut self,
        partitions: &mut [&mut dyn VertexPartition],
        layer_weights: &[f64],
    ) -> Result<f64> {
        let n = check_layers(partitions, layer_weights)?;
        if n == 0 {
            return Ok(0.0);
        }
        let nb_layers = partitions.len();
        let mut total_improvement = 0.0;
        // Maps each original node to the aggregate node representing it at
        // the current level.
        let mut aggregate_node: Vec<usize> = (0..n).collect();
        // Aggregate layers owned by this recursion; `None` while optimising
        // the caller's partitions directly.
        let mut collapsed: Option<Vec<Box<dyn VertexPartition>>> = None;

        loop {
            // Local-move phase on the current level.
            let improvement = {
                let mut level: Vec<&mut dyn VertexPartition> = Vec::with_capacity(nb_layers);
                match collapsed.as_mut() {
                    None => {
                        for p in partitions.iter_mut() {
                            level.push(&mut **p);
                        }
                    }
                    Some(ps) => {
                        for p in ps.iter_mut() {
                            level.push(&mut **p);
                        }
                    }
                }
                match self.optimise_routine {
                    Routine::MoveNodes => self.local_move_pass(
                        &mut level,
                        layer_weights,
                        self.consider_comms,
                        self.consider_empty_community,
                        None,
                    ),
                    Routine::MergeNodes => {
                        self.merge_pass(&mut level, layer_weights, self.consider_comms, None)
                    }
                }
            };
            total_improvement += improvement;

            // Project the current assignment down to the caller's partitions.
            if let Some(ps) = collapsed.as_ref() {
                for (l, p) in partitions.iter_mut().enumerate() {
                    p.from_coarse_partition(ps[l].membership(), &aggregate_node);
                }
            }

            let level_membership: Vec<usize> = match collapsed.as_ref() {
                None => partitions[0].membership().to_vec(),
                Some(ps) => ps[0].membership().to_vec(),
            };
            let level_n = level_membership.len();
            // Memberships are renumbered after every pass, so ids are compact.
            let n_comms = level_membership.iter().copied().max().map_or(0, |m| m + 1);
            debug!(
                "level with {} nodes: improvement {}, {} communities",
                level_n, improvement, n_comms
            );

            // Refinement decides what gets aggregated; the move-phase
            // membership seeds the next level's initial assignment.
            let (agg_membership, agg_comms, seed_membership) = if self.refine_partition {
                let mut sub: Vec<Box<dyn VertexPartition>> = match collapsed.as_ref() {
                    None => partitions
                        .iter()
                        .map(|p| p.create_like(Rc::clone(p.graph())))
                        .collect(),
                    Some(ps) => ps
                        .iter()
                        .map(|p| p.create_like(Rc::clone(p.graph())))
                        .collect(),
                };
                {
                    let mut sub_refs: Vec<&mut dyn VertexPartition> =
                        Vec::with_capacity(nb_layers);
                    for p in sub.iter_mut() {
                        sub_refs.push(&mut **p);
                    }
                    match self.refine_routine {
                        Routine::MoveNodes => self.local_move_pass(
                            &mut sub_refs,
                            layer_weights,
                            self.refine_consider_comms,
                            false,
                            Some(&level_membership),
                        ),
                        Routine::MergeNodes => self.merge_pass(
                            &mut sub_refs,
                            layer_weights,
                            self.refine_consider_comms,
                            Some(&level_membership),
                        ),
                    };
                }
                let refined = sub[0].membership().to_vec();
                let k = refined.iter().copied().max().map_or(0, |m| m + 1);
                // Each refined community lies inside one move-phase
                // community, so any member is a valid representative.
                let mut seed = vec![0usize; k];
                for v in 0..level_n {
                    seed[refined[v]] = level_membership[v];
                }
                (refined, k, seed)
            } else {
                (
                    level_membership.clone(),
                    n_comms,
                    (0..n_comms).collect::<Vec<usize>>(),
                )
            };

            // Stop when the pass found nothing or no coarsening is possible.
            if improvement <= 0.0 || agg_comms >= level_n {
                break;
            }

            debug!("aggregating {} nodes into {}", level_n, agg_comms);
            let mut next: Vec<Box<dyn VertexPartition>> = Vec::with_capacity(nb_layers);
            for l in 0..nb_layers {
                let proto: &dyn VertexPartition = match collapsed.as_ref() {
                    None => &*partitions[l],
                    Some(ps) => &*ps[l],
                };
                let coarse = Rc::new(proto.graph().collapse(&agg_membership, agg_comms)?);
                next.push(proto.create_like_with_membership(coarse, seed_membership.clone()));
            }
            for a in aggregate_node.iter_mut() {
                *a = agg_membership[*a];
            }
            collapsed = Some(next);
        }

        // Compact ids, identical across layers.
        partitions[0].renumber_communities();
        if nb_layers > 1 {
            let membership = partitions[0].membership().to_vec();
            for p in partitions[1..].iter_mut() {
                p.set_membership(&membership);
            }
        }
        Ok(total_improvement)
    }

    /// Construct a singleton partition for `graph` under the quality
    /// function `Q` and optimise it.
    pub fn find_partition<Q>(&mut self, graph: &Rc<Graph>) -> Result<Partition<Q>>
    where
        Q: QualityFunction + Default + 'static,
    {
        let mut partition = Partition::<Q>::singleton(Rc::clone(graph));
        self.optimise_partition(&mut partition)?;
        Ok(partition)
    }

    /// Like [`Optimiser::find_partition`], forwarding a resolution parameter
    /// to the quality function's constructor.
    pub fn find_partition_with_resolution<Q>(
        &mut self,
        graph: &Rc<Graph>,
        resolution: f64,
    ) -> Result<Partition<Q>>
    where
        Q: QualityFunction + 'static,
    {
        let mut partition = Partition::<Q>::with_resolution(Rc::clone(graph), resolution);
        self.optimise_partition(&mut partition)?;
        Ok(partition)
    }

    // ------------------------------------------------------------------
    // Move / merge passes
    // ------------------------------------------------------------------

    /// One local-move pass to a fixed point, using the configured candidate
    /// policy.
    pub fn move_nodes(&mut self, partition: &mut dyn VertexPartition) -> Result<f64> {
        self.move_nodes_with(partition, self.consider_comms)
    }

    /// One local-move pass with an explicit candidate policy.
    pub fn move_nodes_with(
        &mut self,
        partition: &mut dyn VertexPartition,
        consider: ConsiderComms,
    ) -> Result<f64> {
        let empty = self.consider_empty_community;
        let mut layers = [partition];
        self.move_nodes_multiplex_with(&mut layers, &[1.0], consider, empty)
    }

    pub fn move_nodes_multiplex(
        &mut self,
        partitions: &mut [&mut dyn VertexPartition],
        layer_weights: &[f64],
    ) -> Result<f64> {
        let (consider, empty) = (self.consider_comms, self.consider_empty_community);
        self.move_nodes_multiplex_with(partitions, layer_weights, consider, empty)
    }

    pub fn move_nodes_multiplex_with(
        &mut self,
        partitions: &mut [&mut dyn VertexPartition],
        layer_weights: &[f64],
        consider: ConsiderComms,
        consider_empty_community: bool,
    ) -> Result<f64> {
        check_layers(partitions, layer_weights)?;
        Ok(self.local_move_pass(
            partitions,
            layer_weights,
            consider,
            consider_empty_community,
            None,
        ))
    }

    /// One join-only merge pass over nodes still in singleton communities.
    pub fn merge_nodes(&mut self, partition: &mut dyn VertexPartition) -> Result<f64> {
        self.merge_nodes_with(partition, self.consider_comms)
    }

    pub fn merge_nodes_with(
        &mut self,
        partition: &mut dyn VertexPartition,
        consider: ConsiderComms,
    ) -> Result<f64> {
        let mut layers = [partition];
        self.merge_nodes_multiplex_with(&mut layers, &[1.0], consider)
    }

    pub fn merge_nodes_multiplex(
        &mut self,
        partitions: &mut [&mut dyn VertexPartition],
        layer_weights: &[f64],
    ) -> Result<f64> {
        let consider = self.consider_comms;
        self.merge_nodes_multiplex_with(partitions, layer_weights, consider)
    }

    pub fn merge_nodes_multiplex_with(
        &mut self,
        partitions: &mut [&mut dyn VertexPartition],
        layer_weights: &[f64],
        consider: ConsiderComms,
    ) -> Result<f64> {
        check_layers(partitions, layer_weights)?;
        Ok(self.merge_pass(partitions, layer_weights, consider, None))
    }

    // ------------------------------------------------------------------
    // Constrained variants, used for refinement
    // ------------------------------------------------------------------

    /// Local moves restricted to communities lying inside the node's
    /// community of `constrained`. The resulting communities are always
    /// subsets of the constraining ones.
    pub fn move_nodes_constrained(
        &mut self,
        partition: &mut dyn VertexPartition,
        constrained: &dyn VertexPartition,
    ) -> Result<f64> {
        self.move_nodes_constrained_with(partition, self.refine_consider_comms, constrained)
    }

    pub fn move_nodes_constrained_with(
        &mut self,
        partition: &mut dyn VertexPartition,
        consider: ConsiderComms,
        constrained: &dyn VertexPartition,
    ) -> Result<f64> {
        let mut layers = [partition];
        self.move_nodes_constrained_multiplex_with(&mut layers, &[1.0], consider, constrained)
    }

    pub fn move_nodes_constrained_multiplex(
        &mut self,
        partitions: &mut [&mut dyn VertexPartition],
        layer_weights: &[f64],
        constrained: &dyn VertexPartition,
    ) -> Result<f64> {
        let consider = self.refine_consider_comms;
        self.move_nodes_constrained_multiplex_with(partitions, layer_weights, consider, constrained)
    }

    pub fn move_nodes_constrained_multiplex_with(
        &mut self,
        partitions: &mut [&mut dyn VertexPartition],
        layer_weights: &[f64],
        consider: ConsiderComms,
        constrained: &dyn VertexPartition,
    ) -> Result<f64> {
        let n = check_layers(partitions, layer_weights)?;
        check_constrained(constrained, n)?;
        Ok(self.local_move_pass(
            partitions,
            layer_weights,
            consider,
            false,
            Some(constrained.membership()),
        ))
    }

    pub fn merge_nodes_constrained(
        &mut self,
        partition: &mut dyn VertexPartition,
        constrained: &dyn VertexPartition,
    ) -> Result<f64> {
        self.merge_nodes_constrained_with(partition, self.refine_consider_comms, constrained)
    }

    pub fn merge_nodes_constrained_with(
        &mut self,
        partition: &mut dyn VertexPartition,
        consider: ConsiderComms,
        constrained: &dyn VertexPartition,
    ) -> Result<f64> {
        let mut layers = [partition];
        self.merge_nodes_constrained_multiplex_with(&mut layers, &[1.0], consider, constrained)
    }

    pub fn merge_nodes_constrained_multiplex(
        &mut self,
        partitions: &mut [&mut dyn VertexPartition],
        layer_weights: &[f64],
        constrained: &dyn VertexPartition,
    ) -> Result<f64> {
        let consider = self.refine_consider_comms;
        self.merge_nodes_constrained_multiplex_with(partitions, layer_weights, consider, constrained)
    }

    pub fn merge_nodes_constrained_multiplex_with(
        &mut self,
        partitions: &mut [&mut dyn VertexPartition],
        layer_weights: &[f64],
        consider: ConsiderComms,
        constrained: &dyn VertexPartition,
    ) -> Result<f64> {
        let n = check_layers(partitions, layer_weights)?;
        check_constrained(constrained, n)?;
        Ok(self.merge_pass(
            partitions,
            layer_weights,
            consider,
            Some(constrained.membership()),
        ))
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Queue-driven local moves until no node can improve (the Leiden fast
    /// local move): all nodes start queued in random order, and a successful
    /// move re-queues the neighbours left outside the new community.
    fn local_move_pass(
        &mut self,
        partitions: &mut [&mut dyn VertexPartition],
        layer_weights: &[f64],
        consider: ConsiderComms,
        consider_empty_community: bool,
        constrained: Option<&[usize]>,
    ) -> f64 {
        let n = partitions[0].node_count();
        if n == 0 {
            return 0.0;
        }
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut self.rng);
        let mut queue: VecDeque<usize> = order.into_iter().collect();
        let mut queued = vec![true; n];
        let mut total_improvement = 0.0;
        while let Some(v) = queue.pop_front() {
            queued[v] = false;
            let v_comm = partitions[0].community_of(v);
            let mut candidates = self.candidate_communities(v, partitions, consider, constrained);
            if consider_empty_community {
                if let Some(empty) = partitions[0].empty_community() {
                    candidates.push(empty);
                }
            }
            let (max_comm, max_improv) =
                self.best_candidate(partitions, layer_weights, v, v_comm, &candidates);
            if max_comm != v_comm && max_improv > 0.0 {
                for p in partitions.iter_mut() {
                    p.move_node(v, max_comm);
                }
                total_improvement += max_improv;
                // Neighbours that did not end up in the new community may
                // now have a better move available.
                for l in 0..partitions.len() {
                    for &(u, _) in partitions[l].graph().neighbours(v) {
                        if u != v && !queued[u] && partitions[0].community_of(u) != max_comm {
                            queued[u] = true;
                            queue.push_back(u);
                        }
                    }
                }
            }
        }
        self.sync_membership(partitions);
        total_improvement
    }

    /// One randomized pass of join-only merges over singleton communities.
    fn merge_pass(
        &mut self,
        partitions: &mut [&mut dyn VertexPartition],
        layer_weights: &[f64],
        consider: ConsiderComms,
        constrained: Option<&[usize]>,
    ) -> f64 {
        let n = partitions[0].node_count();
        if n == 0 {
            return 0.0;
        }
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut self.rng);
        let mut total_improvement = 0.0;
        for v in order {
            let v_comm = partitions[0].community_of(v);
            if partitions[0].community_node_count(v_comm) != 1 {
                continue;
            }
            let candidates = self.candidate_communities(v, partitions, consider, constrained);
            let (max_comm, max_improv) =
                self.best_candidate(partitions, layer_weights, v, v_comm, &candidates);
            if max_comm != v_comm && max_improv > 0.0 {
                for p in partitions.iter_mut() {
                    p.move_node(v, max_comm);
                }
                total_improvement += max_improv;
            }
        }
        self.sync_membership(partitions);
        total_improvement
    }

    /// Candidate communities for moving `v`, filtered by the constrained
    /// membership when present.
    fn candidate_communities(
        &mut self,
        v: usize,
        partitions: &[&mut dyn VertexPartition],
        consider: ConsiderComms,
        constrained: Option<&[usize]>,
    ) -> Vec<usize> {
        let p0: &dyn VertexPartition = &*partitions[0];
        match consider {
            ConsiderComms::AllComms => match constrained {
                None => p0.nonempty_communities(),
                Some(cons) => communities_within(p0, cons, v),
            },
            ConsiderComms::AllNeighComms => {
                let mut seen: HashSet<usize> = HashSet::new();
                let mut comms = Vec::new();
                for p in partitions {
                    for &(u, _) in p.graph().neighbours(v) {
                        if u == v {
                            continue;
                        }
                        if let Some(cons) = constrained {
                            if cons[u] != cons[v] {
                                continue;
                            }
                        }
                        let c = p0.community_of(u);
                        if seen.insert(c) {
                            comms.push(c);
                        }
                    }
                }
                comms
            }
            ConsiderComms::RandComm => {
                let pool = match constrained {
                    None => p0.nonempty_communities(),
                    Some(cons) => communities_within(p0, cons, v),
                };
                if pool.is_empty() {
                    Vec::new()
                } else {
                    vec![pool[self.rng.random_range(0..pool.len())]]
                }
            }
            ConsiderComms::RandNeighComm => {
                let mut neighbours = Vec::new();
                for p in partitions {
                    for &(u, _) in p.graph().neighbours(v) {
                        if u == v {
                            continue;
                        }
                        if let Some(cons) = constrained {
                            if cons[u] != cons[v] {
                                continue;
                            }
                        }
                        neighbours.push(u);
                    }
                }
                if neighbours.is_empty() {
                    Vec::new()
                } else {
                    let u = neighbours[self.rng.random_range(0..neighbours.len())];
                    vec![p0.community_of(u)]
                }
            }
        }
    }

    /// Pick the candidate with the highest layer-weighted gain. Equal
    /// maxima are broken uniformly at random for symmetry.
    fn best_candidate(
        &mut self,
        partitions: &[&mut dyn VertexPartition],
        layer_weights: &[f64],
        v: usize,
        v_comm: usize,
        candidates: &[usize],
    ) -> (usize, f64) {
        let mut max_comm = v_comm;
        let mut max_improv = 0.0;
        let mut ties = 0u32;
        for &comm in candidates {
            if comm == v_comm {
                continue;
            }
            let mut improv = 0.0;
            for (p, &w) in partitions.iter().zip(layer_weights) {
                improv += w * p.diff_move(v, comm);
            }
            if improv > max_improv {
                max_comm = comm;
                max_improv = improv;
                ties = 1;
            } else if improv == max_improv && improv > 0.0 {
                ties += 1;
                if self.rng.random_range(0..ties) == 0 {
                    max_comm = comm;
                }
            }
        }
        (max_comm, max_improv)
    }

    /// Compact community ids on layer 0 and mirror the membership onto the
    /// remaining layers.
    fn sync_membership(&mut self, partitions: &mut [&mut dyn VertexPartition]) {
        partitions[0].renumber_communities();
        if partitions.len() > 1 {
            let membership = partitions[0].membership().to_vec();
            for p in partitions[1..].iter_mut() {
                p.set_membership(&membership);
            }
        }
    }
}

fn check_layers(
    partitions: &[&mut dyn VertexPartition],
    layer_weights: &[f64],
) -> Result<usize> {
    if partitions.is_empty() || partitions.len() != layer_weights.len() {
        return Err(Error::LayerCountMismatch {
            partitions: partitions.len(),
            weights: layer_weights.len(),
        });
    }
    let n = partitions[0].node_count();
    for p in &partitions[1..] {
        if p.node_count() != n {
            return Err(Error::NodeCountMismatch {
                expected: n,
                found: p.node_count(),
            });
        }
    }
    Ok(n)
}

fn check_constrained(constrained: &dyn VertexPartition, n: usize) -> Result<()> {
    if constrained.node_count() != n {
        return Err(Error::NodeCountMismatch {
            expected: n,
            found: constrained.node_count(),
        });
    }
    Ok(())
}

/// Communities whose members all share `v`'s constrained community. Because
/// constrained passes never move a node across its constraint boundary,
/// these are exactly the communities of the nodes inside it.
fn communities_within(p0: &dyn VertexPartition, constrained: &[usize], v: usize) -> Vec<usize> {
    let group = constrained[v];
    let mut seen: HashSet<usize> = HashSet::new();
    let mut comms = Vec::new();
    for (u, &g) in constrained.iter().enumerate() {
        if g == group {
            let c = p0.community_of(u);
            if seen.insert(c) {
                comms.push(c);
            }
        }
    }
    comms
}
