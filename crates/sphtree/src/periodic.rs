use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::particle::Vector;

/// Axis-aligned periodic box `[min, max)` in every dimension.
///
/// Separations are taken with the minimum-image convention, so a query
/// near one face sees particles near the opposite face without any ghost
/// copies.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Bounds<D>", into = "Bounds<D>")]
pub struct Periodic<const D: usize> {
    min: Vector<D>,
    max: Vector<D>,
    range: Vector<D>,
}

#[derive(Clone, Copy, Serialize, Deserialize)]
struct Bounds<const D: usize> {
    min: Vector<D>,
    max: Vector<D>,
}

impl<const D: usize> TryFrom<Bounds<D>> for Periodic<D> {
    type Error = Error;

    fn try_from(b: Bounds<D>) -> Result<Self> {
        Self::new(b.min, b.max)
    }
}

impl<const D: usize> From<Periodic<D>> for Bounds<D> {
    fn from(p: Periodic<D>) -> Self {
        Bounds { min: p.min, max: p.max }
    }
}

impl<const D: usize> Periodic<D> {
    pub fn new(min: Vector<D>, max: Vector<D>) -> Result<Self> {
        let range = max - min;
        if let Some(axis) = range.iter().position(|r| !(r.is_finite() && *r > 0.0)) {
            return Err(Error::invalid(format!(
                "periodic range on axis {axis} must be positive and finite (min {}, max {})",
                min[axis], max[axis]
            )));
        }
        Ok(Self { min, max, range })
    }

    pub fn min(&self) -> &Vector<D> {
        &self.min
    }

    pub fn max(&self) -> &Vector<D> {
        &self.max
    }

    pub fn range(&self) -> &Vector<D> {
        &self.range
    }

    /// Minimum image of a separation vector.
    #[inline]
    pub fn min_image(&self, mut d: Vector<D>) -> Vector<D> {
        for k in 0..D {
            let half = 0.5 * self.range[k];
            if d[k] > half {
                d[k] -= self.range[k];
            } else if d[k] < -half {
                d[k] += self.range[k];
            }
        }
        d
    }

    /// Folds a position back into `[min, max)`.
    pub fn wrap(&self, mut p: Vector<D>) -> Vector<D> {
        for k in 0..D {
            let x = (p[k] - self.min[k]).rem_euclid(self.range[k]);
            p[k] = self.min[k] + x;
        }
        p
    }
}

/// `a - b`, taken through the minimum image when `periodic` is set.
#[inline]
pub fn separation<const D: usize>(
    periodic: Option<&Periodic<D>>,
    a: &Vector<D>,
    b: &Vector<D>,
) -> Vector<D> {
    let d = a - b;
    match periodic {
        Some(p) => p.min_image(d),
        None => d,
    }
}

/// Squared distance from `p` to the closest point of the cube
/// `center +- half`. Zero when `p` is inside.
#[inline]
pub(crate) fn box_distance2<const D: usize>(
    periodic: Option<&Periodic<D>>,
    p: &Vector<D>,
    center: &Vector<D>,
    half: f64,
) -> f64 {
    let d = separation(periodic, p, center);
    let mut s = 0.0;
    for k in 0..D {
        let e = (d[k].abs() - half).max(0.0);
        s += e * e;
    }
    s
}
