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

//! Pluggable quality functions.
//!
//! A [`QualityFunction`] scores a partition and prices single-node moves. The
//! optimiser only ever consumes the trait, so alternative objectives can be
//! supplied by downstream crates; [`Cpm`] and [`Modularity`] are provided
//! here so the crate is usable out of the box.
//!
//! The one hard requirement is that [`QualityFunction::diff_move`] is exactly
//! consistent with [`QualityFunction::quality`]: the delta returned for a
//! move must equal the quality difference produced by applying it. The
//! optimiser's monotonicity guarantee rests on that identity, on the original
//! graph and on every aggregate level.

use crate::graph::Graph;

/// Aggregates a partition maintains per community.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CommunityView {
    /// Number of member nodes.
    pub node_count: usize,
    /// Sum of member node sizes.
    pub size: f64,
    /// Total intra-community edge weight, each edge counted once.
    pub weight_inside: f64,
    /// Summed weighted degree of the members, self-loops counted twice.
    pub strength: f64,
}

/// Everything a quality function may consult when pricing the move of one
/// node into a candidate community.
#[derive(Debug, Clone, Copy)]
pub struct MoveContext {
    /// Size of the moving node.
    pub node_size: f64,
    /// Weighted degree of the moving node, self-loops counted twice.
    pub strength: f64,
    /// Edge weight from the node to its current community, the node itself
    /// excluded.
    pub weight_to_old: f64,
    /// Edge weight from the node to the candidate community.
    pub weight_to_new: f64,
    /// Current community, aggregates still including the node.
    pub old: CommunityView,
    /// Candidate community, the node not a member.
    pub new: CommunityView,
}

/// A scalar objective over partitions; higher is better.
pub trait QualityFunction: Clone {
    /// Construct with an explicit resolution parameter.
    fn with_resolution(resolution: f64) -> Self;

    fn resolution(&self) -> f64;

    /// Gain from hypothetically moving one node into a candidate community.
    /// Pure; must match the difference in [`QualityFunction::quality`]
    /// produced by actually applying the move.
    fn diff_move(&self, graph: &Graph, ctx: MoveContext) -> f64;

    /// Score of a whole partition, described by its per-community aggregates.
    /// Empty communities must contribute zero.
    fn quality(&self, graph: &Graph, communities: &[CommunityView]) -> f64;
}

/// Constant Potts model.
///
/// `Q = sum_c [ w_c - gamma * s_c * (s_c - 1) / 2 ]` where `w_c` is the
/// intra-community weight and `s_c` the summed node size of community `c`.
/// Unlike modularity this objective is resolution-limit-free and independent
/// of the total graph weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cpm {
    resolution: f64,
}

impl Default for Cpm {
    fn default() -> Self {
        Cpm { resolution: 1.0 }
    }
}

impl QualityFunction for Cpm {
    fn with_resolution(resolution: f64) -> Self {
        Cpm { resolution }
    }

    fn resolution(&self) -> f64 {
        self.resolution
    }

    fn diff_move(&self, _graph: &Graph, ctx: MoveContext) -> f64 {
        let z = ctx.node_size;
        (ctx.weight_to_new - self.resolution * z * ctx.new.size)
            - (ctx.weight_to_old - self.resolution * z * (ctx.old.size - z))
    }

    fn quality(&self, _graph: &Graph, communities: &[CommunityView]) -> f64 {
        communities
            .iter()
            .map(|c| c.weight_inside - self.resolution * c.size * (c.size - 1.0) / 2.0)
            .sum()
    }
}

/// Modularity in its Reichardt-Bornholdt form.
///
/// `Q = sum_c [ w_c / m - gamma * (K_c / 2m)^2 ]` with `K_c` the summed
/// weighted degree of community `c` and `m` the total edge weight. With
/// `gamma = 1` (the default) this is standard Newman-Girvan modularity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Modularity {
    resolution: f64,
}

impl Default for Modularity {
    fn default() -> Self {
        Modularity { resolution: 1.0 }
    }
}

impl QualityFunction for Modularity {
    fn with_resolution(resolution: f64) -> Self {
        Modularity { resolution }
    }

    fn resolution(&self) -> f64 {
        self.resolution
    }

    fn diff_move(&self, graph: &Graph, ctx: MoveContext) -> f64 {
        let m = graph.total_weight();
        if m <= 0.0 {
            return 0.0;
        }
        let k = ctx.strength;
        (ctx.weight_to_new - ctx.weight_to_old) / m
            - self.resolution * k * (ctx.new.strength - (ctx.old.strength - k))
                / (2.0 * m * m)
    }

    fn quality(&self, graph: &Graph, communities: &[CommunityView]) -> f64 {
        let m = graph.total_weight();
        if m <= 0.0 {
            return 0.0;
        }
        communities
            .iter()
            .map(|c| {
                let frac = c.strength / (2.0 * m);
                c.weight_inside / m - self.resolution * frac * frac
            })
            .sum()
    }
}
