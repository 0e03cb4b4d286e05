//! O(N^2) references for the tree-based evaluators.

use rayon::prelude::*;

use crate::config::GravityConfig;
use crate::error::{Error, Result};
use crate::gravity::{ForceOutcome, GravityStats};
use crate::neighbor::RadiusPolicy;
use crate::particle::{Particle, Vector};
use crate::periodic::{separation, Periodic};
use crate::softening::{force_softening, potential_softening};

fn check_count<const D: usize>(particles: &[Particle<D>], count: usize) -> Result<()> {
    if count > particles.len() {
        return Err(Error::ParticleCount {
            count,
            len: particles.len(),
        });
    }
    Ok(())
}

#[inline]
fn direct_one<const D: usize>(
    particles: &[Particle<D>],
    i: usize,
    config: &GravityConfig,
    periodic: Option<&Periodic<D>>,
) -> ForceOutcome<D> {
    let target = &particles[i];
    let h_i = target.sml.max(config.h_min);
    let mut acc = Vector::<D>::zeros();
    let mut phi = 0.0;
    let mut pairs = 0usize;
    for (j, pj) in particles.iter().enumerate() {
        if j == i {
            continue;
        }
        let r_ij = separation(periodic, &target.pos, &pj.pos);
        let r = r_ij.norm();
        if r == 0.0 {
            continue;
        }
        let h_j = pj.sml.max(config.h_min);
        let g = 0.5 * (force_softening(r, h_i) + force_softening(r, h_j));
        let f = 0.5 * (potential_softening(r, h_i) + potential_softening(r, h_j));
        acc -= r_ij * (pj.mass * g);
        phi -= pj.mass * f;
        pairs += 1;
    }
    ForceOutcome {
        acc: acc * config.constant,
        phi: phi * config.constant,
        stats: GravityStats {
            pairs,
            ..GravityStats::default()
        },
    }
}

/// Softened gravity of the first `count` particles on each other by
/// direct summation, with the same pair rule as the tree walk.
pub fn direct_gravity<const D: usize>(
    particles: &[Particle<D>],
    count: usize,
    config: &GravityConfig,
    periodic: Option<&Periodic<D>>,
) -> Result<Vec<ForceOutcome<D>>> {
    check_count(particles, count)?;
    config.validate()?;
    let sources = &particles[..count];
    let out = if count < 1024 {
        (0..count)
            .map(|i| direct_one(sources, i, config, periodic))
            .collect()
    } else {
        (0..count)
            .into_par_iter()
            .map(|i| direct_one(sources, i, config, periodic))
            .collect()
    };
    Ok(out)
}

/// Every particle among the first `count` within the search radius of
/// `center`, nearest first. Ties are broken by index.
pub fn exhaustive_neighbors<const D: usize>(
    particles: &[Particle<D>],
    count: usize,
    center: &Vector<D>,
    h: f64,
    policy: RadiusPolicy,
    periodic: Option<&Periodic<D>>,
) -> Result<Vec<usize>> {
    check_count(particles, count)?;
    let mut found: Vec<(f64, usize)> = particles[..count]
        .iter()
        .enumerate()
        .filter_map(|(j, pj)| {
            let r2 = separation(periodic, center, &pj.pos).norm_squared();
            let reach = match policy {
                RadiusPolicy::Asymmetric => h,
                RadiusPolicy::Symmetric => h.max(pj.sml),
            };
            (r2 < reach * reach).then(|| (r2.sqrt(), j))
        })
        .collect();
    found.sort_unstable_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    Ok(found.into_iter().map(|(_, j)| j).collect())
}
