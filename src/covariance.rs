//! Validated covariance matrices.
//!
//! A [`Covariance`] always holds a finite, symmetric, positive definite matrix
//! together with its inverse and a lower triangular factor `L` with `L L^T = Σ`.
//! The three are computed together, so a cached inverse can never be stale.

use log::warn;
use nalgebra::{Cholesky, DMatrix, DVector, SymmetricEigen};
use ndarray::ArrayView2;
use ndarray_stats::CorrelationExt;

use crate::error::{ProposalError, Result};

const SYMMETRY_TOLERANCE: f64 = 1e-9;

/// Smallest eigenvalue kept by [`nearest_positive_definite`], relative to the largest.
pub const EIGENVALUE_FLOOR: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq)]
pub struct Covariance {
    matrix: DMatrix<f64>,
    inverse: DMatrix<f64>,
    factor: DMatrix<f64>,
}

impl Covariance {
    /// Validates `matrix` and caches its inverse and Cholesky factor.
    pub fn new(matrix: DMatrix<f64>) -> Result<Self> {
        let matrix = checked_symmetric(matrix)?;
        let chol = Cholesky::new(matrix.clone()).ok_or(ProposalError::NotPositiveDefinite)?;
        let factor = chol.l();
        let inverse = chol.inverse();
        if factor.iter().chain(inverse.iter()).any(|v| !v.is_finite()) {
            return Err(ProposalError::NotPositiveDefinite);
        }
        Ok(Self {
            matrix,
            inverse,
            factor,
        })
    }

    /// Like [`Covariance::new`], but projects an indefinite matrix onto the
    /// nearest positive definite one instead of failing.
    pub fn repaired(matrix: DMatrix<f64>) -> Result<Self> {
        match Covariance::new(matrix.clone()) {
            Err(ProposalError::NotPositiveDefinite) => {
                warn!("covariance is not positive definite; projecting onto the nearest positive definite matrix");
                Covariance::new(nearest_positive_definite(&matrix, EIGENVALUE_FLOOR))
            }
            other => other,
        }
    }

    /// Builds a covariance from row slices.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let n = rows.len();
        if let Some(bad) = rows.iter().find(|r| r.len() != n) {
            return Err(ProposalError::NotSquare {
                rows: n,
                cols: bad.len(),
            });
        }
        Covariance::new(DMatrix::from_fn(n, n, |i, j| rows[i][j]))
    }

    pub fn identity(n: usize) -> Self {
        Self {
            matrix: DMatrix::identity(n, n),
            inverse: DMatrix::identity(n, n),
            factor: DMatrix::identity(n, n),
        }
    }

    /// Diagonal covariance with the given standard deviations.
    pub fn from_std(sigma: &[f64]) -> Result<Self> {
        let var = DVector::from_iterator(sigma.len(), sigma.iter().map(|s| s * s));
        Covariance::new(DMatrix::from_diagonal(&var))
    }

    pub fn dim(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    pub fn inverse(&self) -> &DMatrix<f64> {
        &self.inverse
    }

    /// Lower triangular `L` with `L L^T = Σ`.
    pub fn factor(&self) -> &DMatrix<f64> {
        &self.factor
    }

    /// Square roots of the diagonal.
    pub fn std_devs(&self) -> Vec<f64> {
        self.matrix.diagonal().iter().map(|v| v.abs().sqrt()).collect()
    }

    /// `self * scale`, revalidated (and repaired if drift broke definiteness).
    pub fn scaled(&self, scale: f64) -> Result<Self> {
        Covariance::repaired(&self.matrix * scale)
    }

    /// `d^T Σ^{-1} d`.
    pub fn quadratic_form(&self, d: &[f64]) -> f64 {
        let d = DVector::from_column_slice(d);
        (d.transpose() * &self.inverse * &d)[(0, 0)]
    }
}

fn checked_symmetric(mut matrix: DMatrix<f64>) -> Result<DMatrix<f64>> {
    let (rows, cols) = matrix.shape();
    if rows != cols {
        return Err(ProposalError::NotSquare { rows, cols });
    }
    for i in 0..rows {
        for j in 0..cols {
            if !matrix[(i, j)].is_finite() {
                return Err(ProposalError::NonFiniteCovariance { row: i, col: j });
            }
        }
    }
    for i in 0..rows {
        for j in (i + 1)..cols {
            let (a, b) = (matrix[(i, j)], matrix[(j, i)]);
            let scale = a.abs().max(b.abs()).max(1.0);
            if (a - b).abs() > SYMMETRY_TOLERANCE * scale {
                return Err(ProposalError::NotSymmetric { row: i, col: j });
            }
            let mean = 0.5 * (a + b);
            matrix[(i, j)] = mean;
            matrix[(j, i)] = mean;
        }
    }
    Ok(matrix)
}

/// Symmetrizes `matrix` and clips its eigenvalues at `floor` times the largest
/// absolute eigenvalue.
pub fn nearest_positive_definite(matrix: &DMatrix<f64>, floor: f64) -> DMatrix<f64> {
    let sym = (matrix + matrix.transpose()) * 0.5;
    let eigen = SymmetricEigen::new(sym);
    let largest = eigen
        .eigenvalues
        .iter()
        .fold(0.0_f64, |acc, v| acc.max(v.abs()))
        .max(f64::MIN_POSITIVE);
    let clipped = eigen.eigenvalues.map(|v| v.max(floor * largest));
    let rebuilt = &eigen.eigenvectors * DMatrix::from_diagonal(&clipped) * eigen.eigenvectors.transpose();
    (&rebuilt + rebuilt.transpose()) * 0.5
}

/// Sample covariance of `samples` (one row per sample, one column per parameter).
pub fn empirical_covariance(samples: ArrayView2<f64>) -> Result<DMatrix<f64>> {
    let (n_samples, n_params) = samples.dim();
    if n_samples < 2 {
        return Err(ProposalError::InsufficientSamples(n_samples));
    }
    let cov = samples
        .t()
        .cov(1.0)
        .map_err(|_| ProposalError::InsufficientSamples(n_samples))?;
    Ok(DMatrix::from_fn(n_params, n_params, |i, j| cov[[i, j]]))
}
