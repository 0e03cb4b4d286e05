//! Smoothing lengths converged to a target neighbour number.
//!
//! For particle `i` the solver looks for the root of
//!
//! ```text
//! f(h) = rho(h) h^D - b,   b = m_i N / A_D
//! ```
//!
//! with Newton–Raphson, re-querying the tree at every trial `h`. A solve
//! that fails keeps the previous smoothing length; it never produces NaN.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::CoreConfig;
use crate::error::{Error, Result};
use crate::kernel::{powd, KernelKind, SphKernel};
use crate::neighbor::RadiusPolicy;
use crate::particle::{unit_ball_volume, Particle};
use crate::tree::{log_timing, timer, SpatialTree};

pub const MAX_ITERATIONS: usize = 10;
pub const EPSILON: f64 = 1e-4;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmoothingLengthPolicy {
    #[default]
    NoMinimum,
    /// `h >= h_min_constant`.
    ConstantMinimum,
    /// `h >= alpha (m / rho_max)^(1/D)`.
    PhysicsBasedMinimum,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingLengthConfig {
    pub policy: SmoothingLengthPolicy,
    pub h_min_constant: f64,
    /// Highest density the run is expected to reach, `rho_max`.
    pub expected_max_density: f64,
    /// `alpha` in the physics-based floor.
    pub h_min_coefficient: f64,
}

impl Default for SmoothingLengthConfig {
    fn default() -> Self {
        Self {
            policy: SmoothingLengthPolicy::NoMinimum,
            h_min_constant: 0.0,
            expected_max_density: 1.0,
            h_min_coefficient: 2.0,
        }
    }
}

impl SmoothingLengthConfig {
    pub fn constant(h_min: f64) -> Self {
        Self {
            policy: SmoothingLengthPolicy::ConstantMinimum,
            h_min_constant: h_min,
            ..Self::default()
        }
    }

    pub fn physics_based(expected_max_density: f64, coefficient: f64) -> Self {
        Self {
            policy: SmoothingLengthPolicy::PhysicsBasedMinimum,
            expected_max_density,
            h_min_coefficient: coefficient,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.h_min_constant.is_finite() && self.h_min_constant >= 0.0) {
            return Err(Error::invalid(format!(
                "h_min_constant must be non-negative, got {}",
                self.h_min_constant
            )));
        }
        if !(self.expected_max_density.is_finite() && self.expected_max_density > 0.0) {
            return Err(Error::invalid(format!(
                "expected_max_density must be positive, got {}",
                self.expected_max_density
            )));
        }
        if !(self.h_min_coefficient.is_finite() && self.h_min_coefficient > 0.0) {
            return Err(Error::invalid(format!(
                "h_min_coefficient must be positive, got {}",
                self.h_min_coefficient
            )));
        }
        Ok(())
    }

    /// Floor on `h` for a particle of mass `mass` in `D` dimensions.
    pub fn min_h<const D: usize>(&self, mass: f64) -> f64 {
        match self.policy {
            SmoothingLengthPolicy::NoMinimum => 0.0,
            SmoothingLengthPolicy::ConstantMinimum => self.h_min_constant,
            SmoothingLengthPolicy::PhysicsBasedMinimum => {
                self.h_min_coefficient * (mass / self.expected_max_density).powf(1.0 / D as f64)
            }
        }
    }

    pub fn apply<const D: usize>(&self, h: f64, mass: f64) -> f64 {
        h.max(self.min_h::<D>(mass))
    }
}

/// Result of solving one particle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SmoothingOutcome {
    pub h: f64,
    pub dens: f64,
    /// `d rho / d h` at the final `h`.
    pub dens_dh: f64,
    pub gradh: f64,
    /// Neighbours inside `h`, self included.
    pub neighbor: usize,
    pub iterations: usize,
    pub converged: bool,
    /// Largest signal speed against any neighbour.
    pub v_sig: f64,
}

/// Totals over one `solve_all` pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolveReport {
    pub solved: usize,
    pub converged: usize,
    pub fallbacks: usize,
    pub max_iterations: usize,
    pub min_h: f64,
    pub max_h: f64,
    /// `min_i h_i / v_sig_i`, the sound-crossing timestep bound.
    pub min_h_over_vsig: f64,
}

impl Default for SolveReport {
    fn default() -> Self {
        Self {
            solved: 0,
            converged: 0,
            fallbacks: 0,
            max_iterations: 0,
            min_h: f64::INFINITY,
            max_h: 0.0,
            min_h_over_vsig: f64::INFINITY,
        }
    }
}

impl SolveReport {
    fn of(o: &SmoothingOutcome) -> Self {
        Self {
            solved: 1,
            converged: usize::from(o.converged),
            fallbacks: usize::from(!o.converged),
            max_iterations: o.iterations,
            min_h: o.h,
            max_h: o.h,
            min_h_over_vsig: if o.v_sig > 0.0 { o.h / o.v_sig } else { f64::INFINITY },
        }
    }

    fn merge(self, o: Self) -> Self {
        Self {
            solved: self.solved + o.solved,
            converged: self.converged + o.converged,
            fallbacks: self.fallbacks + o.fallbacks,
            max_iterations: self.max_iterations.max(o.max_iterations),
            min_h: self.min_h.min(o.min_h),
            max_h: self.max_h.max(o.max_h),
            min_h_over_vsig: self.min_h_over_vsig.min(o.min_h_over_vsig),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SmoothingLengthSolver<const D: usize> {
    kernel: SphKernel<D>,
    neighbor_number: f64,
    config: SmoothingLengthConfig,
    iterative: bool,
    max_iterations: usize,
    epsilon: f64,
}

impl<const D: usize> SmoothingLengthSolver<D> {
    pub fn new(
        kernel: KernelKind,
        neighbor_number: usize,
        config: SmoothingLengthConfig,
    ) -> Result<Self> {
        if neighbor_number == 0 {
            return Err(Error::invalid("neighbor_number must be positive"));
        }
        config.validate()?;
        Ok(Self {
            kernel: SphKernel::new(kernel)?,
            neighbor_number: neighbor_number as f64,
            config,
            iterative: true,
            max_iterations: MAX_ITERATIONS,
            epsilon: EPSILON,
        })
    }

    pub fn from_config(config: &CoreConfig<D>) -> Result<Self> {
        Ok(Self::new(config.kernel(), config.neighbor_number(), *config.smoothing())?
            .with_iterative(config.iterative_sml()))
    }

    /// With `false`, `h` is left alone and only density is evaluated.
    pub fn with_iterative(mut self, iterative: bool) -> Self {
        self.iterative = iterative;
        self
    }

    pub fn config(&self) -> &SmoothingLengthConfig {
        &self.config
    }

    pub fn kernel(&self) -> &SphKernel<D> {
        &self.kernel
    }

    /// `(N m / (rho A_D))^(1/D)`, or `None` without a usable density.
    pub fn initial_guess(&self, mass: f64, dens: f64) -> Option<f64> {
        if !(dens > 0.0 && mass > 0.0) {
            return None;
        }
        let h = (self.neighbor_number * mass / (dens * unit_ball_volume::<D>()))
            .powf(1.0 / D as f64);
        (h.is_finite() && h > 0.0).then_some(h)
    }

    /// Guess from the mean number density of the tree's root cell.
    fn volume_guess(&self, tree: &SpatialTree<D>) -> Option<f64> {
        let root = tree.root()?;
        let volume = powd::<D>(root.edge());
        if !(volume > 0.0) {
            return None;
        }
        let number_density = tree.len() as f64 / volume;
        let h = (self.neighbor_number / (number_density * unit_ball_volume::<D>()))
            .powf(1.0 / D as f64);
        (h.is_finite() && h > 0.0).then_some(h)
    }

    fn starting_h(&self, tree: &SpatialTree<D>, p: &Particle<D>) -> f64 {
        if p.sml > 0.0 {
            return p.sml;
        }
        self.initial_guess(p.mass, p.dens)
            .or_else(|| self.volume_guess(tree))
            .unwrap_or(0.0)
    }

    /// Gives every real particle without a smoothing length a first guess.
    pub fn initialize_smoothing_lengths(
        &self,
        tree: &SpatialTree<D>,
        particles: &mut [Particle<D>],
    ) -> Result<()> {
        tree.check(particles)?;
        for p in particles[..tree.len()].iter_mut().filter(|p| p.is_real() && p.sml <= 0.0) {
            let h = self.starting_h(tree, p);
            p.sml = self.config.apply::<D>(h, p.mass);
        }
        Ok(())
    }

    /// `(rho, d rho / d h)` of particle `i` at trial length `h`.
    fn density_at(
        &self,
        tree: &SpatialTree<D>,
        particles: &[Particle<D>],
        i: usize,
        h: f64,
    ) -> (f64, f64) {
        let mut dens = 0.0;
        let mut dens_dh = 0.0;
        let center = &particles[i].pos;
        tree.for_each_neighbor(particles, center, h, RadiusPolicy::Asymmetric, |j, _, r| {
            let m = particles[j].mass;
            dens += m * self.kernel.w(r, h);
            dens_dh += m * self.kernel.dhw(r, h);
        });
        (dens, dens_dh)
    }

    /// Converges `h` for particle `i` and evaluates its density there.
    ///
    /// `particles` is read only; the caller writes the outcome back.
    pub fn solve(
        &self,
        tree: &SpatialTree<D>,
        particles: &[Particle<D>],
        i: usize,
    ) -> Result<SmoothingOutcome> {
        tree.check(particles)?;
        if i >= tree.len() {
            return Err(Error::invalid(format!(
                "particle index {i} is not indexed by the tree ({})",
                tree.len()
            )));
        }
        Ok(self.solve_one(tree, particles, i))
    }

    fn solve_one(
        &self,
        tree: &SpatialTree<D>,
        particles: &[Particle<D>],
        i: usize,
    ) -> SmoothingOutcome {
        let p = &particles[i];
        let start = self.starting_h(tree, p);
        let mut h = start;
        let mut iterations = 0;
        let mut converged = !self.iterative;

        if self.iterative && h > 0.0 {
            let dim = D as f64;
            let b = p.mass * self.neighbor_number / unit_ball_volume::<D>();
            for it in 0..self.max_iterations {
                iterations = it + 1;
                let (dens, dens_dh) = self.density_at(tree, particles, i, h);
                let hd = powd::<D>(h);
                let f = dens * hd - b;
                let df = dens_dh * hd + dim * dens * hd / h;
                if !(df.is_finite() && df != 0.0) {
                    break;
                }
                let mut h_next = h - f / df;
                if !h_next.is_finite() {
                    break;
                }
                if h_next <= 0.0 {
                    h_next = 0.5 * h;
                }
                let done = (h_next - h).abs() < self.epsilon * (h_next + h);
                h = h_next;
                if done {
                    converged = true;
                    break;
                }
            }
            if !converged {
                warn!(
                    id = p.id,
                    index = i,
                    iterations,
                    h_prev = start,
                    "smoothing length did not converge; keeping previous value"
                );
                h = start;
            }
        } else if self.iterative {
            warn!(
                id = p.id,
                index = i,
                "smoothing length did not converge; no starting value could be derived"
            );
        }

        let h = self.config.apply::<D>(h, p.mass);
        self.evaluate(tree, particles, i, h, iterations, converged)
    }

    fn evaluate(
        &self,
        tree: &SpatialTree<D>,
        particles: &[Particle<D>],
        i: usize,
        h: f64,
        iterations: usize,
        converged: bool,
    ) -> SmoothingOutcome {
        let p = &particles[i];
        let mut dens = 0.0;
        let mut dens_dh = 0.0;
        let mut neighbor = 0usize;
        let mut v_sig = 2.0 * p.sound;
        tree.for_each_neighbor(particles, &p.pos, h, RadiusPolicy::Asymmetric, |j, r_ij, r| {
            let pj = &particles[j];
            dens += pj.mass * self.kernel.w(r, h);
            dens_dh += pj.mass * self.kernel.dhw(r, h);
            neighbor += 1;
            if j != i && r > 0.0 {
                let w_ij = (p.vel - pj.vel).dot(r_ij) / r;
                v_sig = v_sig.max(p.sound + pj.sound - 3.0 * w_ij.min(0.0));
            }
        });
        let gradh = if dens > 0.0 {
            let g = 1.0 / (1.0 + h * dens_dh / (D as f64 * dens));
            if g.is_finite() {
                g
            } else {
                1.0
            }
        } else {
            1.0
        };
        SmoothingOutcome {
            h,
            dens,
            dens_dh,
            gradh,
            neighbor,
            iterations,
            converged,
            v_sig,
        }
    }

    /// Solves every real particle indexed by `tree` and writes `sml`,
    /// `dens`, `gradh` and `neighbor` back.
    pub fn solve_all(
        &self,
        tree: &SpatialTree<D>,
        particles: &mut [Particle<D>],
    ) -> Result<SolveReport> {
        tree.check(particles)?;
        let t0 = timer();
        let n = tree.len();
        let snapshot: &[Particle<D>] = particles;
        let one = |i: usize| {
            snapshot[i]
                .is_real()
                .then(|| self.solve_one(tree, snapshot, i))
        };
        let outcomes: Vec<Option<SmoothingOutcome>> = if n < 1024 {
            (0..n).map(one).collect()
        } else {
            (0..n).into_par_iter().map(one).collect()
        };

        let report = if n < 1024 {
            outcomes
                .iter()
                .flatten()
                .map(SolveReport::of)
                .fold(SolveReport::default(), SolveReport::merge)
        } else {
            outcomes
                .par_iter()
                .flatten()
                .map(SolveReport::of)
                .reduce(SolveReport::default, SolveReport::merge)
        };

        for (p, o) in particles.iter_mut().zip(&outcomes) {
            if let Some(o) = o {
                p.sml = o.h;
                p.dens = o.dens;
                p.gradh = o.gradh;
                p.neighbor = o.neighbor;
            }
        }

        if report.fallbacks > 0 {
            warn!(
                fallbacks = report.fallbacks,
                solved = report.solved,
                "smoothing-length solve fell back for some particles"
            );
        }
        debug!(
            solved = report.solved,
            max_iterations = report.max_iterations,
            min_h = report.min_h,
            max_h = report.max_h,
            "smoothing lengths solved"
        );
        log_timing("smoothing.solve_all", t0);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physics_floor_uses_the_configured_density() {
        let cfg = SmoothingLengthConfig::physics_based(250.0, 2.0);
        let m = 1.0 / 4224.0;
        let h_min = cfg.min_h::<3>(m);
        assert!((h_min - 2.0 * (m / 250.0f64).cbrt()).abs() < 1e-15);
        assert!((h_min - 0.019_64).abs() < 5e-5);

        // With the default rho_max of 1 the same particle gets a floor of ~0.124.
        let loose = SmoothingLengthConfig::physics_based(1.0, 2.0);
        assert!((loose.min_h::<3>(m) - 0.1238).abs() < 5e-4);
    }

    #[test]
    fn floors_never_lower_h() {
        let cfg = SmoothingLengthConfig::constant(0.05);
        assert_eq!(cfg.apply::<2>(0.01, 1.0), 0.05);
        assert_eq!(cfg.apply::<2>(0.2, 1.0), 0.2);
        assert_eq!(SmoothingLengthConfig::default().apply::<1>(1e-9, 1.0), 1e-9);
    }
}
