//! Spatial tree, neighbour search, smoothing-length solver and Barnes–Hut
//! gravity for smoothed particle hydrodynamics in one, two or three
//! dimensions.

pub mod config;
pub mod direct;
pub mod error;
pub mod gravity;
pub mod kernel;
pub mod neighbor;
pub mod particle;
pub mod periodic;
pub mod smoothing;
pub mod softening;
pub mod step;
pub mod tree;

pub use crate::config::{CoreConfig, CoreConfigBuilder, Formulation, GravityConfig, TreeConfig};
pub use crate::error::{Error, Result};
pub use crate::gravity::{ForceOutcome, GravityEvaluator, GravityReport, GravityStats};
pub use crate::kernel::{KernelKind, SphKernel};
pub use crate::neighbor::{
    NeighborLists, NeighborSearchConfig, NeighborSearchResult, OverflowPolicy, RadiusPolicy,
};
pub use crate::particle::{Particle, ParticleKind, Vector};
pub use crate::periodic::Periodic;
pub use crate::smoothing::{
    SmoothingLengthConfig, SmoothingLengthPolicy, SmoothingLengthSolver, SmoothingOutcome,
    SolveReport,
};
pub use crate::step::{SphCore, StepReport};
pub use crate::tree::{Node, SpatialTree, Visit};
