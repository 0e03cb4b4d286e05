//! Gravitational softening of Hernquist & Katz (1989).
//!
//! The softening length is `eps = h / 2` and `u = r / eps`. With the sign
//! convention used throughout the crate the softened potential of a unit
//! mass is `phi = -f(r, h)` and the acceleration it exerts on a point at
//! separation vector `r_ij` is `-r_ij * g(r, h)`. Both factors reduce to the
//! Newtonian `1/r` and `1/r^3` for `u >= 2`.

/// Potential factor `f(r, h)`, the softened replacement for `1/r`.
///
/// Finite at `r = 0` for `h > 0`. A non-positive `h` disables softening; in
/// that case `r = 0` yields zero rather than an infinity.
#[inline]
pub fn potential_softening(r: f64, h: f64) -> f64 {
    if h <= 0.0 {
        return if r > 0.0 { 1.0 / r } else { 0.0 };
    }
    let eps = 0.5 * h;
    let u = r / eps;
    if u < 1.0 {
        potential_inner(u, eps)
    } else if u < 2.0 {
        potential_outer(u, r, eps)
    } else {
        1.0 / r
    }
}

/// Force factor `g(r, h)`, the softened replacement for `1/r^3`.
#[inline]
pub fn force_softening(r: f64, h: f64) -> f64 {
    if h <= 0.0 {
        return if r > 0.0 { 1.0 / (r * r * r) } else { 0.0 };
    }
    let eps = 0.5 * h;
    let u = r / eps;
    if u < 1.0 {
        force_inner(u, eps)
    } else if u < 2.0 {
        force_outer(u, r)
    } else {
        1.0 / (r * r * r)
    }
}

// 0 <= u < 1
#[inline]
fn potential_inner(u: f64, eps: f64) -> f64 {
    let u2 = u * u;
    // 7/5 - 2/3 u^2 + 3/10 u^4 - 1/10 u^5
    (1.4 - u2 * (2.0 / 3.0 - 0.3 * u2 + 0.1 * u2 * u)) / eps
}

// 1 <= u < 2
#[inline]
fn potential_outer(u: f64, r: f64, eps: f64) -> f64 {
    let u2 = u * u;
    let u3 = u2 * u;
    // -1/(15 r) + [8/5 - 4/3 u^2 + u^3 - 3/10 u^4 + 1/30 u^5] / eps
    -1.0 / (15.0 * r) + (1.6 - 4.0 / 3.0 * u2 + u3 - 0.3 * u2 * u2 + u2 * u3 / 30.0) / eps
}

// 0 <= u < 1
#[inline]
fn force_inner(u: f64, eps: f64) -> f64 {
    let u2 = u * u;
    // [4/3 - 6/5 u^2 + 1/2 u^3] / eps^3
    (4.0 / 3.0 - 1.2 * u2 + 0.5 * u2 * u) / (eps * eps * eps)
}

// 1 <= u < 2
#[inline]
fn force_outer(u: f64, r: f64) -> f64 {
    let u3 = u * u * u;
    // [-1/15 + 8/3 u^3 - 3 u^4 + 6/5 u^5 - 1/6 u^6] / r^3
    (-1.0 / 15.0 + u3 * (8.0 / 3.0 - 3.0 * u + 1.2 * u * u - u3 / 6.0)) / (r * r * r)
}
