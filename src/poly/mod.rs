//! Single-axis polynomials in power basis.
//!
//! Trajectory segments store Bezier control points; this module turns them into
//! power-basis coefficients that can be evaluated, differentiated and solved.
//! Degrees are capped at [`MAX_POLY_DEGREE`], which is what the binary segment
//! format can express.

pub mod poly4d;
mod solve;

pub use poly4d::Poly4D;
pub use solve::Roots;

use crate::{
    error::{Result, TrajectoryError},
    math::Interval,
};

pub const MAX_POLY_DEGREE: usize = 7;
const MAX_COEFFS: usize = MAX_POLY_DEGREE + 1;

/// Coefficients with an absolute value at or below this are treated as zero.
pub const POLY_EPSILON: f32 = 1e-5;

/// n! for n in 0..=7
const FACTORIALS: [f64; MAX_COEFFS] = [1., 1., 2., 6., 24., 120., 720., 5040.];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Poly {
    coeffs: [f32; MAX_COEFFS],
    num_coeffs: usize,
}

impl Default for Poly {
    fn default() -> Self {
        Self::zero()
    }
}

impl Poly {
    pub fn zero() -> Self {
        Self::constant(0.)
    }

    pub fn constant(x: f32) -> Self {
        let mut coeffs = [0.; MAX_COEFFS];
        coeffs[0] = x;
        Self {
            coeffs,
            num_coeffs: 1,
        }
    }

    /// Goes from `x0` at t = 0 to `x1` at t = `duration`.
    ///
    /// A non-positive duration collapses to the constant `x1`, i.e. an
    /// instantaneous jump.
    pub fn linear(duration: f32, x0: f32, x1: f32) -> Self {
        if duration <= 0. {
            return Self::constant(x1);
        }
        let mut poly = Self::constant(x0);
        poly.coeffs[1] = (x1 - x0) / duration;
        poly.num_coeffs = 2;
        poly
    }

    /// Builds the polynomial of the Bezier curve with the given control
    /// points, parametrized so that it starts at t = 0 and ends at
    /// t = `duration`.
    ///
    /// Coefficient j of a degree-n curve is
    /// `sum_i (-1)^(i+j) * n! / ((n-j)! * i! * (j-i)!) * P_i`; every weight is
    /// an integer, so integer control points yield exact coefficients.
    pub fn bezier(duration: f32, points: &[f32]) -> Result<Self> {
        if points.is_empty() || points.len() > MAX_COEFFS {
            return Err(TrajectoryError::InvalidArgument(
                "a Bezier curve needs between 1 and 8 control points",
            ));
        }

        let n = points.len() - 1;
        let mut poly = Self::zero();
        for j in 0..=n {
            let mut sum = 0f64;
            for (i, &p) in points.iter().enumerate().take(j + 1) {
                let weight =
                    FACTORIALS[n] / (FACTORIALS[n - j] * FACTORIALS[i] * FACTORIALS[j - i]);
                let term = weight * p as f64;
                if (i + j) % 2 == 1 {
                    sum -= term;
                } else {
                    sum += term;
                }
            }
            poly.coeffs[j] = sum as f32;
        }
        poly.num_coeffs = n + 1;

        if duration <= 0. {
            return Ok(Self::constant(points[n]));
        }
        if duration != 1. {
            poly.stretch(duration);
        }
        Ok(poly)
    }

    /// Coefficients in increasing order of degree, including trailing
    /// near-zero ones.
    pub fn coeffs(&self) -> &[f32] {
        &self.coeffs[..self.num_coeffs]
    }

    /// Number of coefficients left after ignoring near-zero trailing ones.
    /// Zero for the zero polynomial.
    pub fn num_significant_coeffs(&self) -> usize {
        let mut n = self.num_coeffs;
        while n > 0 && self.coeffs[n - 1].abs() <= POLY_EPSILON {
            n -= 1;
        }
        n
    }

    pub fn degree(&self) -> usize {
        self.num_significant_coeffs().saturating_sub(1)
    }

    pub fn is_constant(&self) -> bool {
        self.num_significant_coeffs() <= 1
    }

    /// Horner's method; `t` may lie outside [0, 1].
    pub fn eval(&self, t: f32) -> f32 {
        let mut result = 0f32;
        for &c in self.coeffs().iter().rev() {
            result = result * t + c;
        }
        result
    }

    pub fn eval_f64(&self, t: f64) -> f64 {
        let mut result = 0f64;
        for &c in self.coeffs().iter().rev() {
            result = result * t + c as f64;
        }
        result
    }

    /// Replaces the polynomial with its derivative.
    pub fn deriv(&mut self) {
        if self.num_coeffs <= 1 {
            self.coeffs[0] = 0.;
            self.num_coeffs = 1;
            return;
        }
        for i in 1..self.num_coeffs {
            self.coeffs[i - 1] = i as f32 * self.coeffs[i];
        }
        self.num_coeffs -= 1;
        self.coeffs[self.num_coeffs] = 0.;
    }

    pub fn derivative(&self) -> Self {
        let mut result = *self;
        result.deriv();
        result
    }

    /// Multiplies every coefficient by `factor`.
    pub fn scale(&mut self, factor: f32) {
        for c in self.coeffs[..self.num_coeffs].iter_mut() {
            *c *= factor;
        }
    }

    /// Stretches the polynomial along the time axis: p(t) becomes p(t / factor).
    pub fn stretch(&mut self, factor: f32) {
        let inv = 1. / factor as f64;
        let mut multiplier = 1f64;
        for c in self.coeffs[..self.num_coeffs].iter_mut() {
            *c = (*c as f64 * multiplier) as f32;
            multiplier *= inv;
        }
    }

    /// Minimum and maximum of the polynomial over [0, 1].
    pub fn get_extrema(&self) -> Result<Interval> {
        let mut result = Interval::new(self.eval(0.), self.eval(1.));
        if self.num_significant_coeffs() > 2 {
            let derivative = self.derivative();
            for t in derivative.solve_f64(0.)?.iter() {
                if *t > 0. && *t < 1. {
                    result.include(self.eval(*t as f32));
                }
            }
        }
        Ok(result)
    }
}
