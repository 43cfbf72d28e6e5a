/*!
Covariance seeds from the local curvature of an objective.

A [`HesseCalculator`] turns a negative log density (or negative log likelihood)
evaluated around a point into a covariance estimate, the inverse of its
Hessian. [`MultivariateGaussianProposal::from_hessian`] uses it to start a
correlated proposal already shaped like the posterior mode, which saves most of
the manual tuning a burn-in would otherwise need.

```rust
use mcmc_proposals::distributions::Proposal;
use mcmc_proposals::hesse::FiniteDifferenceHesse;
use mcmc_proposals::multivariate::MultivariateGaussianProposal;
use mcmc_proposals::params::Kernel;

// negative log density of N(0, diag(4, 1))
let nll = |x: &[f64]| 0.5 * (x[0] * x[0] / 4.0 + x[1] * x[1]);
let proposal = MultivariateGaussianProposal::from_hessian(
    &FiniteDifferenceHesse,
    &nll,
    &[0.0, 0.0],
    &[1e-3, 1e-3],
    Kernel::RandomWalk,
)
.unwrap();
assert!((proposal.covariance().matrix()[(0, 0)] - 4.0).abs() < 1e-4);
```
*/

use log::debug;
use nalgebra::DMatrix;

use crate::covariance::Covariance;
use crate::error::{ProposalError, Result};
use crate::multivariate::MultivariateGaussianProposal;
use crate::params::{check_dim, Kernel};

/// Estimates a covariance from the curvature of `objective` at `point`.
///
/// `objective` is a negative log density. `step_sizes` gives one perturbation
/// scale per parameter.
pub trait HesseCalculator {
    fn covariance(
        &self,
        objective: &dyn Fn(&[f64]) -> f64,
        point: &[f64],
        step_sizes: &[f64],
    ) -> Result<DMatrix<f64>>;
}

/// Central finite differences of the objective.
#[derive(Debug, Clone, Copy, Default)]
pub struct FiniteDifferenceHesse;

impl FiniteDifferenceHesse {
    /// Symmetric Hessian of `objective` at `point`.
    pub fn hessian(
        &self,
        objective: &dyn Fn(&[f64]) -> f64,
        point: &[f64],
        step_sizes: &[f64],
    ) -> Result<DMatrix<f64>> {
        let n = point.len();
        check_dim(n, step_sizes.len())?;
        if let Some((index, &value)) = step_sizes
            .iter()
            .enumerate()
            .find(|(_, h)| !(h.is_finite() && **h > 0.0))
        {
            return Err(ProposalError::InvalidStepSize { index, value });
        }

        let eval = |x: &[f64]| {
            let v = objective(x);
            if v.is_finite() {
                Ok(v)
            } else {
                Err(ProposalError::NonFiniteObjective)
            }
        };
        let shifted = |moves: &[(usize, f64)]| {
            let mut x = point.to_vec();
            for &(i, d) in moves {
                x[i] += d;
            }
            eval(&x)
        };

        let f0 = eval(point)?;
        let mut hessian = DMatrix::zeros(n, n);
        for i in 0..n {
            let hi = step_sizes[i];
            let fp = shifted(&[(i, hi)])?;
            let fm = shifted(&[(i, -hi)])?;
            hessian[(i, i)] = (fp - 2.0 * f0 + fm) / (hi * hi);
            for j in 0..i {
                let hj = step_sizes[j];
                let fpp = shifted(&[(i, hi), (j, hj)])?;
                let fpm = shifted(&[(i, hi), (j, -hj)])?;
                let fmp = shifted(&[(i, -hi), (j, hj)])?;
                let fmm = shifted(&[(i, -hi), (j, -hj)])?;
                let h = (fpp - fpm - fmp + fmm) / (4.0 * hi * hj);
                hessian[(i, j)] = h;
                hessian[(j, i)] = h;
            }
        }
        Ok(hessian)
    }
}

impl HesseCalculator for FiniteDifferenceHesse {
    fn covariance(
        &self,
        objective: &dyn Fn(&[f64]) -> f64,
        point: &[f64],
        step_sizes: &[f64],
    ) -> Result<DMatrix<f64>> {
        let hessian = self.hessian(objective, point, step_sizes)?;
        debug!("finite-difference hessian at {point:?}: {hessian}");
        // Cholesky succeeds only for a positive definite Hessian, i.e. a local minimum
        let curvature = Covariance::new(hessian)?;
        Ok(curvature.inverse().clone())
    }
}

impl MultivariateGaussianProposal {
    /// Proposal whose covariance is the inverse Hessian of `objective` at `point`.
    ///
    /// Fails with [`ProposalError::NotPositiveDefinite`] if `point` is not a
    /// local minimum of the objective.
    pub fn from_hessian<H: HesseCalculator + ?Sized>(
        hesse: &H,
        objective: &dyn Fn(&[f64]) -> f64,
        point: &[f64],
        step_sizes: &[f64],
        kernel: Kernel,
    ) -> Result<Self> {
        let matrix = hesse.covariance(objective, point, step_sizes)?;
        check_dim(point.len(), matrix.nrows())?;
        Self::with_kernel(Covariance::new(matrix)?, kernel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributions::Proposal;
    use approx::assert_abs_diff_eq;

    fn quadratic(x: &[f64]) -> f64 {
        // 0.5 x^T A x with A = [[2, 1], [1, 3]]
        0.5 * (2.0 * x[0] * x[0] + 2.0 * x[0] * x[1] + 3.0 * x[1] * x[1])
    }

    #[test]
    fn recovers_hessian_of_quadratic() {
        let h = FiniteDifferenceHesse
            .hessian(&quadratic, &[0.3, -0.2], &[1e-3, 1e-3])
            .unwrap();
        assert_abs_diff_eq!(h[(0, 0)], 2.0, epsilon = 1e-5);
        assert_abs_diff_eq!(h[(0, 1)], 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(h[(1, 0)], 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(h[(1, 1)], 3.0, epsilon = 1e-5);
    }

    #[test]
    fn covariance_is_inverse_hessian() {
        let cov = FiniteDifferenceHesse
            .covariance(&quadratic, &[0.0, 0.0], &[1e-3, 1e-3])
            .unwrap();
        // inverse of [[2, 1], [1, 3]] is [[3, -1], [-1, 2]] / 5
        assert_abs_diff_eq!(cov[(0, 0)], 0.6, epsilon = 1e-5);
        assert_abs_diff_eq!(cov[(0, 1)], -0.2, epsilon = 1e-5);
        assert_abs_diff_eq!(cov[(1, 1)], 0.4, epsilon = 1e-5);
    }

    #[test]
    fn saddle_point_is_rejected() {
        let saddle = |x: &[f64]| x[0] * x[0] - x[1] * x[1];
        assert_eq!(
            MultivariateGaussianProposal::from_hessian(
                &FiniteDifferenceHesse,
                &saddle,
                &[0.0, 0.0],
                &[1e-2, 1e-2],
                Kernel::RandomWalk,
            )
            .unwrap_err(),
            ProposalError::NotPositiveDefinite
        );
    }

    #[test]
    fn invalid_inputs() {
        let hesse = FiniteDifferenceHesse;
        assert_eq!(
            hesse.covariance(&quadratic, &[0.0, 0.0], &[1e-3]).unwrap_err(),
            ProposalError::DimensionMismatch { expected: 2, found: 1 }
        );
        assert_eq!(
            hesse.covariance(&quadratic, &[0.0, 0.0], &[1e-3, 0.0]).unwrap_err(),
            ProposalError::InvalidStepSize { index: 1, value: 0.0 }
        );
        let log_barrier = |x: &[f64]| -x[0].ln();
        assert_eq!(
            hesse.covariance(&log_barrier, &[0.0], &[1e-3]).unwrap_err(),
            ProposalError::NonFiniteObjective
        );
    }

    #[test]
    fn seeded_proposal_uses_the_curvature() {
        let proposal = MultivariateGaussianProposal::from_hessian(
            &FiniteDifferenceHesse,
            &quadratic,
            &[0.0, 0.0],
            &[1e-3, 1e-3],
            Kernel::Independence(vec![1.0, 1.0]),
        )
        .unwrap();
        assert_eq!(proposal.dim(), 2);
        assert_abs_diff_eq!(proposal.covariance().inverse()[(0, 1)], 1.0, epsilon = 1e-4);
        assert_eq!(proposal.kernel(), &Kernel::Independence(vec![1.0, 1.0]));
    }
}
