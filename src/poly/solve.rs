//! Closed-form root solving up to degree 3, and the `touches` predicate built
//! on top of it.

use std::{f64::consts::PI, ops::Deref};

use num::complex::Complex64;
use tracing::warn;

use super::{Poly, POLY_EPSILON};
use crate::error::{Result, TrajectoryError};

/// relative tolerance for deciding that a discriminant is zero
const DISCRIMINANT_EPSILON: f64 = 1e-9;

/// how far outside [0, 1] a root may fall and still count as touching
const DOMAIN_EPSILON: f64 = 1e-6;

const NEWTON_ITERATIONS: usize = 2;

/// Real roots of a polynomial of degree at most 3, in increasing order.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Roots {
    values: [f32; 3],
    len: usize,
}

impl Deref for Roots {
    type Target = [f32];

    fn deref(&self) -> &Self::Target {
        &self.values[..self.len]
    }
}

/// Same as `Roots` but kept in double precision for internal callers.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RootsF64 {
    values: [f64; 3],
    len: usize,
}

impl RootsF64 {
    fn push(&mut self, value: f64) {
        if value.is_finite() && self.len < self.values.len() {
            self.values[self.len] = value;
            self.len += 1;
        }
    }

    fn sorted(mut self) -> Self {
        self.values[..self.len].sort_by(f64::total_cmp);
        self
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &f64> {
        self.values[..self.len].iter()
    }
}

fn is_negligible(value: f64, magnitude: f64) -> bool {
    value.abs() <= DISCRIMINANT_EPSILON * magnitude.max(f64::MIN_POSITIVE)
}

fn solve_quadratic(a: f64, b: f64, c: f64, roots: &mut RootsF64) {
    let discriminant = b * b - 4. * a * c;
    if is_negligible(discriminant, (b * b).max((4. * a * c).abs())) {
        roots.push(-b / (2. * a));
    } else if discriminant > 0. {
        // numerically stable pair, avoids cancellation between -b and the root
        let q = -0.5 * (b + b.signum() * discriminant.sqrt());
        roots.push(q / a);
        roots.push(c / q);
    }
}

fn solve_cubic(a: f64, b: f64, c: f64, d: f64, roots: &mut RootsF64) {
    // t^3 + bb t^2 + cc t + dd = 0, then t = x - bb / 3 gives x^3 + p x + q = 0
    let (bb, cc, dd) = (b / a, c / a, d / a);
    let shift = bb / 3.;
    let p = cc - bb * bb / 3.;
    let q = 2. * bb * bb * bb / 27. - bb * cc / 3. + dd;

    let half_q = q / 2.;
    let third_p = p / 3.;
    let discriminant = half_q * half_q + third_p * third_p * third_p;
    let magnitude = (half_q * half_q).max(third_p.abs().powi(3));

    if is_negligible(discriminant, magnitude) {
        if is_negligible(p, bb * bb + cc.abs()) {
            // triple root
            roots.push(-shift);
        } else {
            let u = (-half_q).cbrt();
            roots.push(2. * u - shift);
            roots.push(-u - shift);
        }
    } else if discriminant > 0. {
        let sqrt_d = discriminant.sqrt();
        let u = (-half_q + sqrt_d).cbrt();
        let v = (-half_q - sqrt_d).cbrt();
        roots.push(u + v - shift);
    } else {
        // Casus irreducibilis: all three roots are real but Cardano's formula
        // goes through the complex plane. The cube roots of w and of its
        // conjugate pair up as conjugates, so each root is u_k + conj(u_k).
        let w = Complex64::new(-half_q, (-discriminant).sqrt());
        let u = w.cbrt();
        let omega = Complex64::from_polar(1., 2. * PI / 3.);
        let mut u_k = u;
        for _ in 0..3 {
            let x = u_k + u_k.conj();
            roots.push(x.re - shift);
            u_k *= omega;
        }
    }
}

fn polish(coeffs: &[f64], t: f64) -> f64 {
    let mut t = t;
    for _ in 0..NEWTON_ITERATIONS {
        let mut value = 0.;
        let mut slope = 0.;
        for &c in coeffs.iter().rev() {
            slope = slope * t + value;
            value = value * t + c;
        }
        if slope == 0. || !slope.is_finite() {
            break;
        }
        let next = t - value / slope;
        if !next.is_finite() {
            break;
        }
        t = next;
    }
    t
}

fn is_between(value: f32, a: f32, b: f32) -> bool {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    lo - POLY_EPSILON <= value && value <= hi + POLY_EPSILON
}

impl Poly {
    /// Real solutions of `poly(t) = rhs` over the whole real line, in
    /// increasing order.
    ///
    /// Polynomials of degree 4 and above are not supported. A constant
    /// polynomial reports no roots, even when it equals `rhs` everywhere.
    pub fn solve(&self, rhs: f32) -> Result<Roots> {
        let roots = self.solve_f64(rhs)?;
        let mut result = Roots::default();
        for &t in roots.iter() {
            result.values[result.len] = t as f32;
            result.len += 1;
        }
        Ok(result)
    }

    pub(crate) fn solve_f64(&self, rhs: f32) -> Result<RootsF64> {
        let n = self.num_significant_coeffs();
        let mut coeffs = [0f64; 4];
        for (i, c) in self.coeffs().iter().take(n.min(4)).enumerate() {
            coeffs[i] = *c as f64;
        }
        coeffs[0] -= rhs as f64;

        let mut roots = RootsF64::default();
        match n {
            0 | 1 => {}
            2 => roots.push(-coeffs[0] / coeffs[1]),
            3 => solve_quadratic(coeffs[2], coeffs[1], coeffs[0], &mut roots),
            4 => {
                solve_cubic(coeffs[3], coeffs[2], coeffs[1], coeffs[0], &mut roots);
                for i in 0..roots.len {
                    roots.values[i] = polish(&coeffs, roots.values[i]);
                }
            }
            _ => {
                warn!(degree = n - 1, "root solving requested above degree 3");
                return Err(TrajectoryError::Unsupported(
                    "root solving is only implemented up to degree 3",
                ));
            }
        }
        Ok(roots.sorted())
    }

    /// Tells whether the polynomial attains `value` somewhere in [0, 1], and
    /// returns the smallest such t if it does.
    pub fn touches(&self, value: f32) -> Result<Option<f32>> {
        let n = self.num_significant_coeffs();
        let start = self.eval(0.);
        if (start - value).abs() <= POLY_EPSILON {
            return Ok(Some(0.));
        }
        let end = self.eval(1.);
        let c = self.coeffs();

        match n {
            0 | 1 => return Ok(None),
            2 => {
                if !is_between(value, start, end) {
                    return Ok(None);
                }
                return Ok(Some(((value - c[0]) / c[1]).clamp(0., 1.)));
            }
            3 => {
                let vertex = -c[1] / (2. * c[2]);
                let monotonic = !(vertex > 0. && vertex < 1.);
                if monotonic && !is_between(value, start, end) {
                    return Ok(None);
                }
                if !monotonic {
                    let peak = self.eval(vertex);
                    let lo = start.min(end).min(peak);
                    let hi = start.max(end).max(peak);
                    if !is_between(value, lo, hi) {
                        return Ok(None);
                    }
                }
            }
            4 => {
                // the derivative 3a t^2 + 2b t + c keeps its sign on [0, 1]
                // iff it does so at both ends and at its vertex, if inside
                let derivative = self.derivative();
                let d0 = derivative.eval(0.);
                let d1 = derivative.eval(1.);
                let vertex = -c[2] / (3. * c[3]);
                let dv = if vertex > 0. && vertex < 1. {
                    derivative.eval(vertex)
                } else {
                    d0
                };
                let monotonic = (d0 >= 0. && d1 >= 0. && dv >= 0.) || (d0 <= 0. && d1 <= 0. && dv <= 0.);
                if monotonic && !is_between(value, start, end) {
                    return Ok(None);
                }
            }
            _ => {}
        }

        let roots = self.solve_f64(value)?;
        let found = roots
            .iter()
            .find(|t| **t >= -DOMAIN_EPSILON && **t <= 1. + DOMAIN_EPSILON)
            .map(|t| (*t as f32).clamp(0., 1.));
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poly(coeffs: &[f32]) -> Poly {
        let mut p = Poly::zero();
        p.coeffs[..coeffs.len()].copy_from_slice(coeffs);
        p.num_coeffs = coeffs.len();
        p
    }

    #[test]
    fn linear_root() {
        let roots = poly(&[2., 4.]).solve(10.).expect("linear is supported");
        assert_eq!(&*roots, &[2.]);
    }

    #[test]
    fn constant_has_no_roots() {
        assert!(poly(&[3.]).solve(3.).expect("constant is supported").is_empty());
        assert!(Poly::zero().solve(1.).expect("zero is supported").is_empty());
    }

    #[test]
    fn quadratic_two_roots() {
        let roots = poly(&[9., -6., 1.]).solve(4.).expect("quadratic is supported");
        assert_eq!(roots.len(), 2);
        assert!((roots[0] - 1.).abs() < 1e-7);
        assert!((roots[1] - 5.).abs() < 1e-7);
    }

    #[test]
    fn quadratic_tangent_and_none() {
        let p = poly(&[9., -6., 1.]);
        let tangent = p.solve(0.).expect("quadratic is supported");
        assert_eq!(tangent.len(), 1);
        assert!((tangent[0] - 3.).abs() < 1e-6);
        assert!(p.solve(-1.).expect("quadratic is supported").is_empty());
    }

    #[test]
    fn quadratic_symmetric_roots() {
        // t^2 - 4 = 0, b == 0
        let roots = poly(&[-4., 0., 1.]).solve(0.).expect("quadratic is supported");
        assert_eq!(&*roots, &[-2., 2.]);
    }

    #[test]
    fn cubic_single_real_root() {
        // t^3 + t - 2 = (t - 1)(t^2 + t + 2)
        let roots = poly(&[-2., 1., 0., 1.]).solve(0.).expect("cubic is supported");
        assert_eq!(roots.len(), 1);
        assert!((roots[0] - 1.).abs() < 1e-6);
    }

    #[test]
    fn cubic_three_real_roots() {
        // (t - 1)(t - 2)(t - 3) = t^3 - 6t^2 + 11t - 6
        let roots = poly(&[-6., 11., -6., 1.]).solve(0.).expect("cubic is supported");
        assert_eq!(roots.len(), 3);
        for (root, expected) in roots.iter().zip([1., 2., 3.]) {
            assert!((root - expected).abs() < 1e-5, "{root} != {expected}");
        }
    }

    #[test]
    fn cubic_double_root() {
        // (t - 1)^2 (t + 2) = t^3 - 3t + 2
        let roots = poly(&[2., -3., 0., 1.]).solve(0.).expect("cubic is supported");
        assert_eq!(roots.len(), 2);
        assert!((roots[0] + 2.).abs() < 1e-5);
        assert!((roots[1] - 1.).abs() < 1e-4);
    }

    #[test]
    fn cubic_triple_root() {
        // (t - 2)^3 = t^3 - 6t^2 + 12t - 8
        let roots = poly(&[-8., 12., -6., 1.]).solve(0.).expect("cubic is supported");
        assert_eq!(roots.len(), 1);
        assert!((roots[0] - 2.).abs() < 1e-4);
    }

    #[test]
    fn quartic_is_unsupported() {
        let result = poly(&[1., 0., 0., 0., 1.]).solve(0.);
        assert!(matches!(result, Err(TrajectoryError::Unsupported(_))));
    }

    #[test]
    fn touches_constant() {
        let p = Poly::constant(5.);
        assert_eq!(p.touches(5.).expect("constant is supported"), Some(0.));
        assert_eq!(p.touches(6.).expect("constant is supported"), None);
    }

    #[test]
    fn touches_linear() {
        let p = Poly::linear(1., 0., 10.);
        let t = p.touches(2.5).expect("linear is supported");
        assert_eq!(t, Some(0.25));
        assert_eq!(p.touches(11.).expect("linear is supported"), None);
        assert_eq!(p.touches(10.).expect("linear is supported"), Some(1.));
    }

    #[test]
    fn touches_quadratic_picks_leftmost() {
        // 4t(1 - t) reaches 0.75 at t = 0.5 +- 0.25
        let p = Poly::bezier(1., &[0., 2., 0.]).expect("valid control points");
        let t = p.touches(0.75).expect("quadratic is supported");
        assert!((t.expect("0.75 is reached") - 0.25).abs() < 1e-6);
        assert_eq!(p.touches(1.5).expect("quadratic is supported"), None);
    }

    #[test]
    fn touches_monotonic_cubic_short_circuits() {
        let p = Poly::bezier(1., &[0., 0., 5., 5.]).expect("valid control points");
        assert_eq!(p.touches(6.).expect("cubic is supported"), None);
        assert_eq!(p.touches(-1.).expect("cubic is supported"), None);
        let t = p.touches(2.5).expect("cubic is supported").expect("2.5 is reached");
        assert!((t - 0.5).abs() < 1e-5);
    }

    #[test]
    fn touches_overshooting_cubic() {
        // goes up to ~2.9 and back down to 0
        let p = Poly::bezier(1., &[0., 10., -10., 0.]).expect("valid control points");
        let t = p.touches(1.).expect("cubic is supported").expect("1 is reached");
        assert!((p.eval(t) - 1.).abs() < 1e-4);
        assert!(t < 0.5);
        assert_eq!(p.touches(5.).expect("cubic is supported"), None);
    }

    #[test]
    fn touches_seventh_degree_is_unsupported() {
        let points = [0., 10., -20., 30., 5., 8., 100., 50.];
        let p = Poly::bezier(1., &points).expect("valid control points");
        assert!(p.touches(25.).is_err());
    }
}
