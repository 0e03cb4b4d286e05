//! SPH smoothing kernels with compact support `r < h`.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use nalgebra::SVector;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelKind {
    /// Monaghan & Lattanzio (1985) M4 cubic spline, written with `q = 2r/h`.
    #[default]
    CubicSpline,
    /// Wendland C4 (Dehnen & Aly 2012), `q = r/h`. Not normalisable in 1D.
    WendlandC4,
}

/// Names accepted by [`KernelKind::from_str`].
const KERNEL_NAMES: &[(&str, KernelKind)] = &[
    ("cubic_spline", KernelKind::CubicSpline),
    ("wendland", KernelKind::WendlandC4),
    ("wendland_c4", KernelKind::WendlandC4),
];

impl KernelKind {
    pub fn name(self) -> &'static str {
        match self {
            KernelKind::CubicSpline => "cubic_spline",
            KernelKind::WendlandC4 => "wendland_c4",
        }
    }

    /// Whether the kernel has a normalisation constant in `dim` dimensions.
    pub fn supports_dimension(self, dim: usize) -> bool {
        match self {
            KernelKind::CubicSpline => (1..=3).contains(&dim),
            KernelKind::WendlandC4 => (2..=3).contains(&dim),
        }
    }
}

impl FromStr for KernelKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        KERNEL_NAMES
            .iter()
            .find(|(name, _)| *name == s)
            .map(|&(_, kind)| kind)
            .ok_or_else(|| Error::UnknownName {
                kind: "kernel",
                name: s.to_string(),
                expected: KERNEL_NAMES
                    .iter()
                    .map(|(n, _)| *n)
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

impl fmt::Display for KernelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `x^D` for the small dimensions used here.
#[inline]
pub(crate) fn powd<const D: usize>(x: f64) -> f64 {
    match D {
        1 => x,
        2 => x * x,
        _ => x * x * x,
    }
}

/// Kernel `kind` evaluated in `D` dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SphKernel<const D: usize> {
    kind: KernelKind,
}

impl<const D: usize> SphKernel<D> {
    const DIMENSION_OK: () = assert!(D >= 1 && D <= 3, "only 1, 2 and 3 dimensions are supported");

    pub fn new(kind: KernelKind) -> Result<Self> {
        #[allow(clippy::let_unit_value)]
        let () = Self::DIMENSION_OK;
        if !kind.supports_dimension(D) {
            return Err(Error::invalid(format!(
                "kernel {kind} is not defined in {D} dimension(s)"
            )));
        }
        Ok(Self { kind })
    }

    pub fn kind(&self) -> KernelKind {
        self.kind
    }

    /// `W(r, h)`.
    #[inline]
    pub fn w(&self, r: f64, h: f64) -> f64 {
        match self.kind {
            KernelKind::CubicSpline => {
                let h_ = 0.5 * h;
                let q = r / h_;
                let a = (2.0 - q).max(0.0);
                let b = (1.0 - q).max(0.0);
                sigma_cubic::<D>() / powd::<D>(h_) * (0.25 * a * a * a - b * b * b)
            }
            KernelKind::WendlandC4 => {
                let q = r / h;
                let a = (1.0 - q).max(0.0);
                let a2 = a * a;
                sigma_c4::<D>() / powd::<D>(h) * a2 * a2 * a2 * (1.0 + 6.0 * q + 35.0 / 3.0 * q * q)
            }
        }
    }

    /// `dW/dh` at fixed `r`.
    #[inline]
    pub fn dhw(&self, r: f64, h: f64) -> f64 {
        let dim = D as f64;
        match self.kind {
            KernelKind::CubicSpline => {
                let h_ = 0.5 * h;
                let q = r / h_;
                let a = (2.0 - q).max(0.0);
                let b = (1.0 - q).max(0.0);
                0.5 * sigma_cubic::<D>() / (powd::<D>(h_) * h_)
                    * (a * a * ((3.0 + dim) * 0.25 * q - 0.5 * dim)
                        + b * b * ((-3.0 - dim) * q + dim))
            }
            KernelKind::WendlandC4 => {
                let q = r / h;
                let a = (1.0 - q).max(0.0);
                let a5 = a * a * a * a * a;
                -sigma_c4::<D>() / (powd::<D>(h) * h * 3.0)
                    * a5
                    * (3.0 * dim + 15.0 * dim * q + (-56.0 + 17.0 * dim) * q * q
                        - 35.0 * (8.0 + dim) * q * q * q)
            }
        }
    }

    /// `grad_i W(|r_ij|, h)` for `r_ij = r_i - r_j`.
    #[inline]
    pub fn gradient(&self, r_ij: &SVector<f64, D>, r: f64, h: f64) -> SVector<f64, D> {
        if r == 0.0 {
            return SVector::zeros();
        }
        let c = match self.kind {
            KernelKind::CubicSpline => {
                let h_ = 0.5 * h;
                let q = r / h_;
                let a = (2.0 - q).max(0.0);
                let b = (1.0 - q).max(0.0);
                -sigma_cubic::<D>() / (powd::<D>(h_) * h_ * r) * (0.75 * a * a - 3.0 * b * b)
            }
            KernelKind::WendlandC4 => {
                let q = r / h;
                let a = (1.0 - q).max(0.0);
                -56.0 / 3.0 * sigma_c4::<D>() / (powd::<D>(h) * h * h)
                    * a * a * a * a * a
                    * (1.0 + 5.0 * q)
            }
        };
        r_ij * c
    }
}

#[inline]
fn sigma_cubic<const D: usize>() -> f64 {
    match D {
        1 => 2.0 / 3.0,
        2 => 10.0 / (7.0 * PI),
        _ => 1.0 / PI,
    }
}

#[inline]
fn sigma_c4<const D: usize>() -> f64 {
    match D {
        2 => 9.0 / PI,
        3 => 495.0 / (32.0 * PI),
        _ => 0.0,
    }
}
