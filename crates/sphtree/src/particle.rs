use std::f64::consts::PI;

use nalgebra::SVector;

/// Position-like vector in `D` dimensions.
pub type Vector<const D: usize> = SVector<f64, D>;

/// Whether a particle belongs to the simulated fluid or is a boundary image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ParticleKind {
    #[default]
    Real,
    /// Image particle generated outside the core (walls, periodic copies).
    /// Indexed by the tree and visible to queries, never solved or integrated.
    Ghost,
}

/// Per-particle state shared by the tree, the solver and the gravity pass.
///
/// The caller owns the slice. The smoothing-length solver writes `sml`,
/// `dens`, `gradh` and `neighbor`; the gravity pass writes `acc` and `phi`.
#[derive(Clone, Debug, PartialEq)]
pub struct Particle<const D: usize> {
    pub pos: Vector<D>,
    pub vel: Vector<D>,
    pub acc: Vector<D>,
    pub mass: f64,
    pub dens: f64,
    /// Sound speed, used for the signal velocity.
    pub sound: f64,
    /// Smoothing length (kernel support radius). `<= 0` means "not yet set".
    pub sml: f64,
    pub gradh: f64,
    /// Neighbour count at the last solve, self included.
    pub neighbor: usize,
    pub phi: f64,
    pub id: usize,
    pub kind: ParticleKind,
}

impl<const D: usize> Particle<D> {
    pub fn new(pos: Vector<D>, mass: f64) -> Self {
        Self {
            pos,
            vel: Vector::zeros(),
            acc: Vector::zeros(),
            mass,
            dens: 0.0,
            sound: 0.0,
            sml: 0.0,
            gradh: 1.0,
            neighbor: 0,
            phi: 0.0,
            id: 0,
            kind: ParticleKind::Real,
        }
    }

    pub fn with_id(mut self, id: usize) -> Self {
        self.id = id;
        self
    }

    pub fn with_velocity(mut self, vel: Vector<D>) -> Self {
        self.vel = vel;
        self
    }

    pub fn with_sml(mut self, sml: f64) -> Self {
        self.sml = sml;
        self
    }

    pub fn with_sound(mut self, sound: f64) -> Self {
        self.sound = sound;
        self
    }

    pub fn ghost(mut self) -> Self {
        self.kind = ParticleKind::Ghost;
        self
    }

    #[inline]
    pub fn is_real(&self) -> bool {
        self.kind == ParticleKind::Real
    }
}

/// Volume of the unit ball in `D` dimensions: 2, pi, 4pi/3.
#[inline]
pub fn unit_ball_volume<const D: usize>() -> f64 {
    match D {
        1 => 2.0,
        2 => PI,
        _ => 4.0 * PI / 3.0,
    }
}

