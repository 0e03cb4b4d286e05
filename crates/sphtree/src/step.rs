use tracing::info_span;

use crate::config::CoreConfig;
use crate::error::Result;
use crate::gravity::{GravityEvaluator, GravityReport};
use crate::neighbor::{NeighborLists, NeighborSearchConfig, RadiusPolicy};
use crate::particle::Particle;
use crate::smoothing::{SmoothingLengthSolver, SolveReport};
use crate::tree::SpatialTree;

/// Outcome of one pass of [`SphCore::run_step`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepReport {
    pub solve: SolveReport,
    /// Fluid neighbour lists that hit their capacity.
    pub truncated_lists: usize,
    pub gravity: Option<GravityReport>,
    /// `min h / v_sig`; multiply by a CFL number for the sound timestep.
    pub dt_sound: f64,
    /// `min sqrt(h / |a|)`; multiply by a CFL number for the force timestep.
    pub dt_force: f64,
}

/// The per-timestep pipeline around a reusable tree.
///
/// `run_step` builds the tree over particles and ghosts, solves smoothing
/// lengths for the real particles, refreshes the tree's kernel sizes,
/// collects symmetric neighbour lists for the fluid-force modules and, if
/// configured, evaluates self-gravity.
#[derive(Debug)]
pub struct SphCore<const D: usize> {
    config: CoreConfig<D>,
    tree: SpatialTree<D>,
    solver: SmoothingLengthSolver<D>,
    gravity: Option<GravityEvaluator>,
    search: NeighborSearchConfig,
    lists: NeighborLists,
}

impl<const D: usize> SphCore<D> {
    pub fn new(config: CoreConfig<D>) -> Result<Self> {
        let mut tree = SpatialTree::new(*config.tree());
        if let Some(periodic) = config.periodic() {
            tree = tree.with_periodic(*periodic);
        }
        let solver = SmoothingLengthSolver::from_config(&config)?;
        let gravity = config.gravity().map(GravityEvaluator::new).transpose()?;
        let search = NeighborSearchConfig::new(config.neighbor_number(), RadiusPolicy::Symmetric)
            .with_overflow(config.overflow());
        Ok(Self {
            config,
            tree,
            solver,
            gravity,
            search,
            lists: NeighborLists::default(),
        })
    }

    pub fn config(&self) -> &CoreConfig<D> {
        &self.config
    }

    pub fn tree(&self) -> &SpatialTree<D> {
        &self.tree
    }

    pub fn solver(&self) -> &SmoothingLengthSolver<D> {
        &self.solver
    }

    /// Lists collected by the last step.
    pub fn neighbor_lists(&self) -> &NeighborLists {
        &self.lists
    }

    /// Runs the pipeline over the first `count` particles.
    pub fn run_step(&mut self, particles: &mut [Particle<D>], count: usize) -> Result<StepReport> {
        let _span = info_span!("run_step", particles = count).entered();

        self.tree.build(particles, count)?;
        self.solver.initialize_smoothing_lengths(&self.tree, particles)?;
        let solve = self.solver.solve_all(&self.tree, particles)?;
        self.tree.refresh_kernel_sizes(particles)?;
        self.lists = NeighborLists::collect(&self.tree, particles, &self.search)?;

        let gravity = match &self.gravity {
            Some(g) => Some(g.calc_force_all(&self.tree, particles)?),
            None => None,
        };

        Ok(StepReport {
            solve,
            truncated_lists: self.lists.truncated_count(),
            gravity,
            dt_sound: solve.min_h_over_vsig,
            dt_force: gravity.map_or(f64::INFINITY, |g| g.min_timestep),
        })
    }
}
