//! Barnes–Hut self-gravity with Hernquist–Katz softening.
//!
//! A node is opened when `l^2 > theta^2 d^2`, with `l` the node edge and
//! `d` the distance from the target to the node's centre of mass. Nodes
//! that stay closed act as a softened point mass; particles of opened
//! leaves interact pairwise with the softening of both partners averaged.

use std::sync::atomic::{AtomicU64, Ordering};

use rayon::prelude::*;
use tracing::debug;

use crate::config::GravityConfig;
use crate::error::{Error, Result};
use crate::particle::{Particle, Vector};
use crate::periodic::separation;
use crate::softening::{force_softening, potential_softening};
use crate::tree::{log_timing, timer, SpatialTree, Visit};

/// Interaction counts of one tree walk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GravityStats {
    pub nodes_opened: usize,
    pub monopoles: usize,
    pub pairs: usize,
}

impl GravityStats {
    fn merge(self, o: Self) -> Self {
        Self {
            nodes_opened: self.nodes_opened + o.nodes_opened,
            monopoles: self.monopoles + o.monopoles,
            pairs: self.pairs + o.pairs,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ForceOutcome<const D: usize> {
    pub acc: Vector<D>,
    pub phi: f64,
    pub stats: GravityStats,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GravityReport {
    pub particles: usize,
    pub stats: GravityStats,
    /// `min_i sqrt(h_i / |a_i|)`, infinite when no particle accelerates.
    pub min_timestep: f64,
}

/// Running minimum of non-negative `f64`s shared between threads.
///
/// Non-negative IEEE doubles order like their bit patterns, so the minimum
/// is an integer `fetch_min`.
#[derive(Debug)]
pub struct AtomicMinF64(AtomicU64);

impl AtomicMinF64 {
    pub fn new(v: f64) -> Self {
        Self(AtomicU64::new(v.to_bits()))
    }

    #[inline]
    pub fn fetch_min(&self, v: f64) {
        if v >= 0.0 {
            self.0.fetch_min(v.to_bits(), Ordering::Relaxed);
        }
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }
}

#[derive(Clone, Copy, Debug)]
pub struct GravityEvaluator {
    constant: f64,
    theta2: f64,
    h_min: f64,
}

impl GravityEvaluator {
    pub fn new(config: &GravityConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            constant: config.constant,
            theta2: config.theta * config.theta,
            h_min: config.h_min,
        })
    }

    #[inline]
    fn softening_length(&self, sml: f64) -> f64 {
        sml.max(self.h_min)
    }

    /// Acceleration and potential of particle `i`.
    pub fn calc_force<const D: usize>(
        &self,
        tree: &SpatialTree<D>,
        particles: &[Particle<D>],
        i: usize,
    ) -> Result<ForceOutcome<D>> {
        tree.check(particles)?;
        if i >= particles.len() {
            return Err(Error::invalid(format!(
                "particle index {i} out of range ({})",
                particles.len()
            )));
        }
        Ok(self.walk(tree, particles, i))
    }

    fn walk<const D: usize>(
        &self,
        tree: &SpatialTree<D>,
        particles: &[Particle<D>],
        i: usize,
    ) -> ForceOutcome<D> {
        let periodic = tree.periodic();
        let target = &particles[i];
        let h_i = self.softening_length(target.sml);
        let theta2 = self.theta2;

        let mut opened = 0usize;
        let mut monopoles = 0usize;
        let mut pairs = 0usize;
        let mut acc = Vector::<D>::zeros();
        let mut phi = 0.0;

        tree.traverse(
            |node| {
                let d2 = separation(periodic, &target.pos, &node.com).norm_squared();
                // A node holding the target is never used as a point mass.
                let open = node.size2 > theta2 * d2 || tree.contains(node, i);
                if open {
                    opened += 1;
                }
                !open
            },
            |visit| match visit {
                Visit::Node(node) => {
                    let r_ij = separation(periodic, &target.pos, &node.com);
                    let r = r_ij.norm();
                    acc -= r_ij * (node.mass * force_softening(r, h_i));
                    phi -= node.mass * potential_softening(r, h_i);
                    monopoles += 1;
                }
                Visit::Particle(j) => {
                    if j == i {
                        return;
                    }
                    let pj = &particles[j];
                    let r_ij = separation(periodic, &target.pos, &pj.pos);
                    let r = r_ij.norm();
                    if r == 0.0 {
                        return;
                    }
                    let h_j = self.softening_length(pj.sml);
                    let g = 0.5 * (force_softening(r, h_i) + force_softening(r, h_j));
                    let f = 0.5 * (potential_softening(r, h_i) + potential_softening(r, h_j));
                    acc -= r_ij * (pj.mass * g);
                    phi -= pj.mass * f;
                    pairs += 1;
                }
            },
        );

        ForceOutcome {
            acc: acc * self.constant,
            phi: phi * self.constant,
            stats: GravityStats {
                nodes_opened: opened,
                monopoles,
                pairs,
            },
        }
    }

    /// Evaluates every real particle indexed by `tree`, writing `acc` and
    /// `phi`.
    pub fn calc_force_all<const D: usize>(
        &self,
        tree: &SpatialTree<D>,
        particles: &mut [Particle<D>],
    ) -> Result<GravityReport> {
        tree.check(particles)?;
        let t0 = timer();
        let n = tree.len();
        let dt_min = AtomicMinF64::new(f64::INFINITY);
        let snapshot: &[Particle<D>] = particles;
        let one = |i: usize| {
            let p = &snapshot[i];
            if !p.is_real() {
                return None;
            }
            let out = self.walk(tree, snapshot, i);
            let a = out.acc.norm();
            let h = self.softening_length(p.sml);
            if a > 0.0 && h > 0.0 {
                dt_min.fetch_min((h / a).sqrt());
            }
            Some(out)
        };
        let outcomes: Vec<Option<ForceOutcome<D>>> = if n < 1024 {
            (0..n).map(one).collect()
        } else {
            (0..n).into_par_iter().map(one).collect()
        };

        let mut stats = GravityStats::default();
        let mut count = 0usize;
        for (p, o) in particles.iter_mut().zip(&outcomes) {
            if let Some(o) = o {
                p.acc = o.acc;
                p.phi = o.phi;
                stats = stats.merge(o.stats);
                count += 1;
            }
        }

        debug!(
            particles = count,
            nodes_opened = stats.nodes_opened,
            monopoles = stats.monopoles,
            pairs = stats.pairs,
            "tree gravity evaluated"
        );
        log_timing("gravity.calc_force_all", t0);
        Ok(GravityReport {
            particles: count,
            stats,
            min_timestep: dt_min.get(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::AtomicMinF64;

    #[test]
    fn atomic_min_keeps_the_smallest_value() {
        let m = AtomicMinF64::new(f64::INFINITY);
        for v in [3.0, 0.5, 2.0, -1.0, 0.75] {
            m.fetch_min(v);
        }
        assert_eq!(m.get(), 0.5);
    }
}
