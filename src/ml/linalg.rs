//! Penalised least squares on nalgebra matrices

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

/// Pivot tolerance relative to the largest matrix entry
const RELATIVE_TOLERANCE: f64 = 1e-10;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinalgError {
    #[error("Singular matrix (no usable pivot in column {column})")]
    Singular { column: usize },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Solve the square system `A x = b` through an LU decomposition
pub fn solve(a: DMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>, LinalgError> {
    if !a.is_square() || a.nrows() != b.len() {
        return Err(LinalgError::DimensionMismatch {
            expected: a.nrows(),
            actual: if a.is_square() { b.len() } else { a.ncols() },
        });
    }

    let tolerance = a.amax() * RELATIVE_TOLERANCE;
    let lu = a.lu();
    if let Some(column) = lu
        .u()
        .diagonal()
        .iter()
        .position(|d| !d.is_finite() || d.abs() <= tolerance)
    {
        return Err(LinalgError::Singular { column });
    }
    lu.solve(b).ok_or(LinalgError::Singular { column: 0 })
}

/// Minimise `|y - X b|^2 + sum(penalty_j * b_j^2)` via the normal equations
///
/// `penalties` must have one entry per column; zero leaves a coefficient free.
pub fn least_squares(x: &[Vec<f64>], y: &[f64], penalties: &[f64]) -> Result<Vec<f64>, LinalgError> {
    if x.len() != y.len() {
        return Err(LinalgError::DimensionMismatch {
            expected: x.len(),
            actual: y.len(),
        });
    }
    let k = penalties.len();
    if let Some(row) = x.iter().find(|row| row.len() != k) {
        return Err(LinalgError::DimensionMismatch {
            expected: k,
            actual: row.len(),
        });
    }

    let design = DMatrix::from_fn(x.len(), k, |r, c| x[r][c]);
    let target = DVector::from_column_slice(y);
    let xtx = design.transpose() * &design + DMatrix::from_diagonal(&DVector::from_column_slice(penalties));
    let xty = design.transpose() * target;

    Ok(solve(xtx, &xty)?.iter().copied().collect())
}
