//! Run configuration: tree shape, kernel, neighbour target, smoothing-length
//! limits and gravity.
//!
//! [`CoreConfig`] is immutable once built. It is produced either through
//! [`CoreConfig::builder`] or by deserialising a [`CoreConfigBuilder`]
//! (the serialised form of a config), and in both cases goes through the
//! same validation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::kernel::KernelKind;
use crate::neighbor::OverflowPolicy;
use crate::particle::unit_ball_volume;
use crate::periodic::Periodic;
use crate::smoothing::SmoothingLengthConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Deepest level a node may sit at; the root is level 0.
    pub max_level: usize,
    /// A node holding at most this many particles is not split.
    pub leaf_particle_num: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_level: 20,
            leaf_particle_num: 1,
        }
    }
}

impl TreeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_level == 0 {
            return Err(Error::invalid("max_level must be at least 1"));
        }
        if self.leaf_particle_num == 0 {
            return Err(Error::invalid("leaf_particle_num must be at least 1"));
        }
        Ok(())
    }
}

/// Barnes–Hut self-gravity parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GravityConfig {
    /// Gravitational constant `G`.
    pub constant: f64,
    /// Opening angle; `0` opens every node.
    pub theta: f64,
    /// Floor on the softening length used for gravity.
    pub h_min: f64,
}

impl Default for GravityConfig {
    fn default() -> Self {
        Self {
            constant: 1.0,
            theta: 0.5,
            h_min: 0.0,
        }
    }
}

impl GravityConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.constant.is_finite() && self.constant > 0.0) {
            return Err(Error::invalid(format!(
                "gravitational constant must be positive, got {}",
                self.constant
            )));
        }
        if !(self.theta.is_finite() && self.theta >= 0.0) {
            return Err(Error::invalid(format!(
                "opening angle must be non-negative, got {}",
                self.theta
            )));
        }
        if !(self.h_min.is_finite() && self.h_min >= 0.0) {
            return Err(Error::invalid(format!(
                "gravity h_min must be non-negative, got {}",
                self.h_min
            )));
        }
        Ok(())
    }
}

/// Fluid formulation the caller's force modules implement.
///
/// The core does not branch on it; it is carried so a run is described by
/// one config value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Formulation {
    #[default]
    Ssph,
    Disph,
    Gsph,
}

const FORMULATIONS: &[(&str, Formulation, &str)] = &[
    ("ssph", Formulation::Ssph, "Standard SPH"),
    ("disph", Formulation::Disph, "Density Independent SPH"),
    ("gsph", Formulation::Gsph, "Godunov SPH"),
];

impl Formulation {
    pub fn all() -> impl Iterator<Item = Formulation> {
        FORMULATIONS.iter().map(|&(_, f, _)| f)
    }

    /// Short key, as accepted by `from_str`.
    pub fn key(self) -> &'static str {
        FORMULATIONS
            .iter()
            .find(|(_, f, _)| *f == self)
            .map_or("", |(k, _, _)| k)
    }

    /// Human readable name.
    pub fn name(self) -> &'static str {
        FORMULATIONS
            .iter()
            .find(|(_, f, _)| *f == self)
            .map_or("", |(_, _, n)| n)
    }
}

impl FromStr for Formulation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.to_ascii_lowercase();
        FORMULATIONS
            .iter()
            .find(|(k, _, _)| *k == key)
            .map(|&(_, f, _)| f)
            .ok_or_else(|| Error::UnknownName {
                kind: "formulation",
                name: s.to_string(),
                expected: FORMULATIONS
                    .iter()
                    .map(|(k, _, _)| *k)
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

impl fmt::Display for Formulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Neighbour target for a lattice with `support_over_spacing = h / dx`,
/// padded by 20% and clamped to a range that works in practice for `D`.
pub fn suggested_neighbor_number<const D: usize>(support_over_spacing: f64) -> usize {
    let theoretical = unit_ball_volume::<D>() * support_over_spacing.powi(D as i32);
    let (lo, hi) = match D {
        1 => (4, 10),
        2 => (12, 50),
        _ => (30, 100),
    };
    ((theoretical * 1.2) as usize).clamp(lo, hi)
}

/// Validated, immutable configuration of the core.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CoreConfigBuilder<D>", into = "CoreConfigBuilder<D>")]
pub struct CoreConfig<const D: usize> {
    tree: TreeConfig,
    kernel: KernelKind,
    formulation: Formulation,
    neighbor_number: usize,
    iterative_sml: bool,
    smoothing: SmoothingLengthConfig,
    overflow: OverflowPolicy,
    gravity: Option<GravityConfig>,
    periodic: Option<Periodic<D>>,
}

impl<const D: usize> CoreConfig<D> {
    pub fn builder() -> CoreConfigBuilder<D> {
        CoreConfigBuilder::default()
    }

    pub fn tree(&self) -> &TreeConfig {
        &self.tree
    }

    pub fn kernel(&self) -> KernelKind {
        self.kernel
    }

    pub fn formulation(&self) -> Formulation {
        self.formulation
    }

    pub fn neighbor_number(&self) -> usize {
        self.neighbor_number
    }

    /// Whether smoothing lengths are iterated to the neighbour target or
    /// only used to evaluate density.
    pub fn iterative_sml(&self) -> bool {
        self.iterative_sml
    }

    pub fn smoothing(&self) -> &SmoothingLengthConfig {
        &self.smoothing
    }

    pub fn overflow(&self) -> OverflowPolicy {
        self.overflow
    }

    pub fn gravity(&self) -> Option<&GravityConfig> {
        self.gravity.as_ref()
    }

    pub fn periodic(&self) -> Option<&Periodic<D>> {
        self.periodic.as_ref()
    }
}

/// Mutable form of [`CoreConfig`]; `build` validates.
///
/// Every field is optional in serialised form.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CoreConfigBuilder<const D: usize> {
    #[serde(default)]
    pub tree: TreeConfig,
    #[serde(default)]
    pub kernel: KernelKind,
    #[serde(default)]
    pub formulation: Formulation,
    #[serde(default)]
    pub neighbor_number: Option<usize>,
    #[serde(default)]
    pub iterative_sml: Option<bool>,
    #[serde(default)]
    pub smoothing: SmoothingLengthConfig,
    #[serde(default)]
    pub overflow: OverflowPolicy,
    #[serde(default)]
    pub gravity: Option<GravityConfig>,
    #[serde(default)]
    pub periodic: Option<Periodic<D>>,
}

impl<const D: usize> CoreConfigBuilder<D> {
    pub fn tree(mut self, tree: TreeConfig) -> Self {
        self.tree = tree;
        self
    }

    pub fn kernel(mut self, kernel: KernelKind) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn formulation(mut self, formulation: Formulation) -> Self {
        self.formulation = formulation;
        self
    }

    pub fn neighbor_number(mut self, n: usize) -> Self {
        self.neighbor_number = Some(n);
        self
    }

    pub fn iterative_sml(mut self, on: bool) -> Self {
        self.iterative_sml = Some(on);
        self
    }

    pub fn smoothing(mut self, smoothing: SmoothingLengthConfig) -> Self {
        self.smoothing = smoothing;
        self
    }

    pub fn overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    pub fn gravity(mut self, gravity: GravityConfig) -> Self {
        self.gravity = Some(gravity);
        self
    }

    pub fn periodic(mut self, periodic: Periodic<D>) -> Self {
        self.periodic = Some(periodic);
        self
    }

    pub fn build(self) -> Result<CoreConfig<D>> {
        if !(1..=3).contains(&D) {
            return Err(Error::invalid(format!("unsupported dimension {D}")));
        }
        let neighbor_number = match self.neighbor_number {
            Some(n) if n > 0 => n,
            Some(_) => return Err(Error::invalid("neighbor_number must be positive")),
            None => return Err(Error::invalid("neighbor_number is required")),
        };
        self.tree.validate()?;
        if !self.kernel.supports_dimension(D) {
            return Err(Error::invalid(format!(
                "kernel {} is not defined in {D} dimension(s)",
                self.kernel
            )));
        }
        self.smoothing.validate()?;
        if let Some(g) = &self.gravity {
            g.validate()?;
        }
        Ok(CoreConfig {
            tree: self.tree,
            kernel: self.kernel,
            formulation: self.formulation,
            neighbor_number,
            iterative_sml: self.iterative_sml.unwrap_or(true),
            smoothing: self.smoothing,
            overflow: self.overflow,
            gravity: self.gravity,
            periodic: self.periodic,
        })
    }
}

impl<const D: usize> TryFrom<CoreConfigBuilder<D>> for CoreConfig<D> {
    type Error = Error;

    fn try_from(b: CoreConfigBuilder<D>) -> Result<Self> {
        b.build()
    }
}

impl<const D: usize> From<CoreConfig<D>> for CoreConfigBuilder<D> {
    fn from(c: CoreConfig<D>) -> Self {
        Self {
            tree: c.tree,
            kernel: c.kernel,
            formulation: c.formulation,
            neighbor_number: Some(c.neighbor_number),
            iterative_sml: Some(c.iterative_sml),
            smoothing: c.smoothing,
            overflow: c.overflow,
            gravity: c.gravity,
            periodic: c.periodic,
        }
    }
}
