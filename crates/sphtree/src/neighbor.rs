//! Bounded-radius neighbour enumeration on top of [`SpatialTree`].

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};
use crate::particle::{Particle, Vector};
use crate::periodic::{box_distance2, separation};
use crate::tree::{log_timing, timer, SpatialTree, Visit};

/// Capacity of a neighbour buffer as a multiple of the neighbour target.
pub const SAFETY_FACTOR: usize = 20;

/// Which smoothing length bounds the search radius.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RadiusPolicy {
    /// `r < h_i`, used for density and the smoothing-length solve.
    #[default]
    Asymmetric,
    /// `r < max(h_i, h_j)`, used for pairwise forces.
    Symmetric,
}

/// What happens when more candidates are found than the buffer holds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Keep every candidate; the buffer grows.
    #[default]
    Grow,
    /// Keep the nearest candidates up to capacity and flag the result
    /// as truncated.
    Truncate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NeighborSearchConfig {
    pub max_neighbors: usize,
    pub policy: RadiusPolicy,
    pub overflow: OverflowPolicy,
}

impl NeighborSearchConfig {
    pub fn new(neighbor_number: usize, policy: RadiusPolicy) -> Self {
        Self {
            max_neighbors: neighbor_number.saturating_mul(SAFETY_FACTOR),
            policy,
            overflow: OverflowPolicy::Grow,
        }
    }

    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    pub fn with_max_neighbors(mut self, max_neighbors: usize) -> Self {
        self.max_neighbors = max_neighbors;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_neighbors == 0 {
            return Err(Error::invalid("max_neighbors must be positive"));
        }
        Ok(())
    }
}

/// Neighbours of one query point, nearest first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NeighborSearchResult {
    pub indices: Vec<usize>,
    /// Set when candidates were dropped because the buffer was full.
    pub is_truncated: bool,
    /// Every candidate inside the radius, stored or not.
    pub total_candidates: usize,
}

impl NeighborSearchResult {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

impl<const D: usize> SpatialTree<D> {
    /// Calls `f(j, r_ij, r)` for every indexed particle within the search
    /// radius of `center`, where `r_ij = center - pos_j`.
    ///
    /// No capacity limit applies. Visiting order follows the tree, not the
    /// distance.
    pub fn for_each_neighbor<F>(
        &self,
        particles: &[Particle<D>],
        center: &Vector<D>,
        h: f64,
        policy: RadiusPolicy,
        mut f: F,
    ) where
        F: FnMut(usize, &Vector<D>, f64),
    {
        let periodic = self.periodic();
        let h2 = h * h;
        self.traverse(
            |node| {
                let reach = match policy {
                    RadiusPolicy::Asymmetric => h,
                    RadiusPolicy::Symmetric => h.max(node.hmax),
                };
                box_distance2(periodic, center, &node.center, node.half_size) >= reach * reach
            },
            |visit| {
                let Visit::Particle(j) = visit else {
                    return;
                };
                let pj = &particles[j];
                let r_ij = separation(periodic, center, &pj.pos);
                let r2 = r_ij.norm_squared();
                let reach2 = match policy {
                    RadiusPolicy::Asymmetric => h2,
                    RadiusPolicy::Symmetric => {
                        let m = h.max(pj.sml);
                        m * m
                    }
                };
                if r2 < reach2 {
                    f(j, &r_ij, r2.sqrt());
                }
            },
        );
    }

    /// Neighbours of particle `i` at its current smoothing length.
    pub fn find_neighbors(
        &self,
        particles: &[Particle<D>],
        i: usize,
        config: &NeighborSearchConfig,
    ) -> Result<NeighborSearchResult> {
        let p = particles.get(i).ok_or_else(|| {
            Error::invalid(format!("particle index {i} out of range ({})", particles.len()))
        })?;
        self.find_neighbors_at(particles, &p.pos, p.sml, config)
    }

    /// Neighbours of an arbitrary point with search length `h`.
    pub fn find_neighbors_at(
        &self,
        particles: &[Particle<D>],
        center: &Vector<D>,
        h: f64,
        config: &NeighborSearchConfig,
    ) -> Result<NeighborSearchResult> {
        self.check(particles)?;
        Ok(self.search(particles, center, h, config))
    }

    fn search(
        &self,
        particles: &[Particle<D>],
        center: &Vector<D>,
        h: f64,
        config: &NeighborSearchConfig,
    ) -> NeighborSearchResult {
        let nearest = |a: &(f64, usize), b: &(f64, usize)| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1));
        let mut found: Vec<(f64, usize)> = Vec::with_capacity(config.max_neighbors.min(1024));
        self.for_each_neighbor(particles, center, h, config.policy, |j, _, r| {
            found.push((r, j));
        });
        let total = found.len();
        let limit = config.max_neighbors;
        if config.overflow == OverflowPolicy::Truncate && total > limit {
            // Keep the nearest `limit`; the far edge is dropped.
            if limit > 0 {
                found.select_nth_unstable_by(limit - 1, nearest);
            }
            found.truncate(limit);
        }
        found.sort_unstable_by(nearest);
        NeighborSearchResult {
            is_truncated: total > found.len(),
            total_candidates: total,
            indices: found.into_iter().map(|(_, j)| j).collect(),
        }
    }
}

/// Per-particle neighbour lists for the fluid-force modules.
///
/// Lists are built for real particles only; ghost entries stay empty.
#[derive(Clone, Debug, Default)]
pub struct NeighborLists {
    lists: Vec<NeighborSearchResult>,
}

impl NeighborLists {
    pub fn collect<const D: usize>(
        tree: &SpatialTree<D>,
        particles: &[Particle<D>],
        config: &NeighborSearchConfig,
    ) -> Result<Self> {
        tree.check(particles)?;
        config.validate()?;
        let t0 = timer();
        let n = tree.len();
        let one = |i: usize| {
            let p = &particles[i];
            if p.is_real() {
                tree.search(particles, &p.pos, p.sml, config)
            } else {
                NeighborSearchResult::default()
            }
        };
        let lists: Vec<NeighborSearchResult> = if n < 1024 {
            (0..n).map(one).collect()
        } else {
            (0..n).into_par_iter().map(one).collect()
        };

        let truncated = lists.iter().filter(|l| l.is_truncated).count();
        if truncated > 0 {
            warn!(
                truncated,
                capacity = config.max_neighbors,
                "neighbour lists truncated; raise the neighbour capacity"
            );
        }
        log_timing("neighbor.collect", t0);
        Ok(Self { lists })
    }

    pub fn get(&self, i: usize) -> Option<&NeighborSearchResult> {
        self.lists.get(i)
    }

    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NeighborSearchResult> {
        self.lists.iter()
    }

    pub fn truncated_count(&self) -> usize {
        self.lists.iter().filter(|l| l.is_truncated).count()
    }

    /// Largest list length, useful to size downstream buffers.
    pub fn max_len(&self) -> usize {
        self.lists.iter().map(NeighborSearchResult::len).max().unwrap_or(0)
    }
}
