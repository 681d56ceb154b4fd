//! Reference path fitting.
//!
//! Waypoints arrive in the global frame once per cycle. They are rotated
//! and translated into the vehicle frame, where the vehicle sits at the
//! origin facing the positive x axis, and a low-order polynomial is fit
//! through them by QR least squares. The fitted curve defines the
//! cross-track and heading errors the controller drives to zero.

#![allow(non_snake_case)]

use log::debug;
use nalgebra::{DMatrix, DVector};
use thiserror::Error;

use prelude::*;

/// Order of the reference polynomial. Fitting requires at least
/// `FIT_ORDER + 1` waypoints.
pub const FIT_ORDER: usize = 3;

/// Pivot ratio below which the design matrix is treated as rank deficient.
const PIVOT_RATIO_MIN: float = 1e-10;

#[derive(Debug, Error)]
pub enum FitError {
    #[error("reference fit needs at least {needed} waypoints, got {got}")]
    InsufficientWaypoints { got: usize, needed: usize },
    #[error("reference waypoints are degenerate (pivot ratio {pivot_ratio:.3e})")]
    NumericalDegeneracy { pivot_ratio: float },
}

/// Expresses global-frame points in the vehicle frame given the vehicle's
/// global pose (x, y, heading).
pub fn to_vehicle_frame(
    pose: (float, float, float),
    xs: &[float],
    ys: &[float],
) -> (Vec<float>, Vec<float>) {
    let (px, py, heading) = pose;
    let (sin_heading, cos_heading) = heading.sin_cos();
    xs.iter()
        .zip(ys)
        .map(|(&x, &y)| {
            let dx = x - px;
            let dy = y - py;
            (
                dx * cos_heading + dy * sin_heading,
                -dx * sin_heading + dy * cos_heading,
            )
        })
        .unzip()
}

/// Inverse of `to_vehicle_frame`.
pub fn to_global_frame(
    pose: (float, float, float),
    xs: &[float],
    ys: &[float],
) -> (Vec<float>, Vec<float>) {
    let (px, py, heading) = pose;
    let (sin_heading, cos_heading) = heading.sin_cos();
    xs.iter()
        .zip(ys)
        .map(|(&x, &y)| {
            (
                px + x * cos_heading - y * sin_heading,
                py + x * sin_heading + y * cos_heading,
            )
        })
        .unzip()
}

/// A polynomial reference curve y = f(x) in the vehicle frame.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferencePolynomial {
    coefficients: Vec<float>,
}

impl ReferencePolynomial {
    /// Builds a polynomial from coefficients ordered constant term first.
    pub fn from_coefficients(coefficients: Vec<float>) -> ReferencePolynomial {
        assert!(!coefficients.is_empty());
        ReferencePolynomial { coefficients }
    }

    pub fn order(&self) -> usize {
        self.coefficients.len() - 1
    }

    pub fn coefficients(&self) -> &[float] {
        &self.coefficients
    }

    /// Evaluates the polynomial at `x` by Horner's scheme, returning the
    /// value together with the first and second derivatives.
    pub fn evaluate(&self, x: float) -> (float, float, float) {
        let mut f = 0.0;
        let mut df = 0.0;
        let mut ddf = 0.0;
        for &c in self.coefficients.iter().rev() {
            ddf = ddf * x + 2.0 * df;
            df = df * x + f;
            f = f * x + c;
        }
        (f, df, ddf)
    }

    /// Heading of the reference at `x`: the arctangent of the local
    /// tangent, not just the linear coefficient.
    pub fn heading(&self, x: float) -> float {
        let (_, slope, _) = self.evaluate(x);
        slope.atan()
    }
}

/// Fits a `FIT_ORDER` polynomial through vehicle-frame waypoints.
///
/// An ill-conditioned design matrix (duplicate or collinear x values)
/// retries at the next lower order down to a straight line before
/// reporting degeneracy. Pure function of its inputs.
pub fn fit(xs: &[float], ys: &[float]) -> Result<ReferencePolynomial, FitError> {
    assert_eq!(xs.len(), ys.len());

    let needed = FIT_ORDER + 1;
    if xs.len() < needed {
        return Err(FitError::InsufficientWaypoints {
            got: xs.len(),
            needed,
        });
    }

    let mut worst_ratio = INFINITY;
    for order in (1..=FIT_ORDER).rev() {
        match fit_order(xs, ys, order) {
            Ok(coefficients) => {
                if order < FIT_ORDER {
                    debug!("reference fit degraded to order {}", order);
                }
                return Ok(ReferencePolynomial { coefficients });
            }
            Err(ratio) => worst_ratio = min(worst_ratio, ratio),
        }
    }
    Err(FitError::NumericalDegeneracy {
        pivot_ratio: worst_ratio,
    })
}

/// Least-squares fit at a fixed order via QR of the Vandermonde matrix.
/// Fails with the pivot ratio when the triangular factor is near singular.
fn fit_order(xs: &[float], ys: &[float], order: usize) -> Result<Vec<float>, float> {
    let m = xs.len();
    let n = order + 1;

    let mut A = DMatrix::zeros(m, n);
    for (i, &x) in xs.iter().enumerate() {
        let mut pow = 1.0;
        for j in 0..n {
            A[(i, j)] = pow;
            pow *= x;
        }
    }

    let qr = A.qr();
    let R = qr.r();

    let diagonal = R.diagonal();
    let max_pivot = diagonal.iter().fold(0.0, |acc, d| max(acc, d.abs()));
    let min_pivot = diagonal.iter().fold(INFINITY, |acc, d| min(acc, d.abs()));
    let ratio = if max_pivot > 0.0 {
        min_pivot / max_pivot
    } else {
        0.0
    };
    if ratio < PIVOT_RATIO_MIN {
        return Err(ratio);
    }

    let mut rhs = DVector::from_column_slice(ys);
    qr.q_tr_mul(&mut rhs);
    let coefficients = R.solve_upper_triangular(&rhs.rows(0, n)).ok_or(ratio)?;
    Ok(coefficients.iter().cloned().collect())
}
