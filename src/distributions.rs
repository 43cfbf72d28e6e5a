/*!
Defines the proposal capability set shared by every proposal in this crate, the
target trait consumed by the sampler driver, and a multivariate Gaussian target
used by the demo and the tests.

Every proposal implements [`Proposal`]. Wrappers such as
[`crate::composite::CompositeProposal`] and [`crate::fixed::FixedSubsetProposal`]
are proposals themselves, so they nest like any other.

# Examples

```rust
use mcmc_proposals::distributions::Proposal;
use mcmc_proposals::params::ParameterRange;
use mcmc_proposals::univariate::GaussianProposal;

let ranges = vec![ParameterRange::new(-5.0, 5.0); 2];
let mut proposal = GaussianProposal::new(ranges, 0.4).unwrap().set_seed(42);
let candidate = proposal.generate(&[0.0, 0.0]).unwrap();
assert_eq!(candidate.len(), 2);
let forward = proposal.log_density(&candidate, &[0.0, 0.0]).unwrap();
assert!(forward.is_finite());
```
*/

use ndarray::ArrayView2;

use crate::covariance::Covariance;
use crate::error::Result;
use crate::params::check_dim;

/// The capability set of a Metropolis-Hastings proposal.
pub trait Proposal: ProposalClone + Send {
    /// Number of parameters this proposal acts on.
    fn dim(&self) -> usize;

    /// Draws a candidate state given the current one.
    fn generate(&mut self, current: &[f64]) -> Result<Vec<f64>>;

    /// Log density of `x` under the kernel centered at `p`.
    ///
    /// The value may be unnormalized for symmetric kernels; only differences
    /// between two evaluations of the same proposal are meaningful.
    fn log_density(&self, x: &[f64], p: &[f64]) -> Result<f64>;

    /// Retunes the proposal from the acceptance efficiency of the last window
    /// and, optionally, the chain samples of that window (one row per sample).
    ///
    /// Returns whether the proposal has converged. Proposals that do not adapt
    /// are always converged.
    fn adapt(&mut self, _efficiency: f64, _samples: Option<ArrayView2<f64>>) -> Result<bool> {
        Ok(true)
    }

    /// Human readable configuration and current widths.
    fn info_string(&self) -> String;

    /// Replaces the random number generator. Buffered draws are discarded.
    fn reseed(&mut self, seed: u64);

    /// Index of the first parameter of a larger vector owned by this block, if recorded.
    fn block_start(&self) -> Option<usize> {
        None
    }

    /// Returns this proposal seeded with `seed`.
    fn set_seed(mut self, seed: u64) -> Self
    where
        Self: Sized,
    {
        self.reseed(seed);
        self
    }
}

/// Object-safe cloning for boxed proposals.
pub trait ProposalClone {
    fn clone_box(&self) -> Box<dyn Proposal>;
}

impl<P> ProposalClone for P
where
    P: Proposal + Clone + 'static,
{
    fn clone_box(&self) -> Box<dyn Proposal> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn Proposal> {
    fn clone(&self) -> Self {
        (**self).clone_box()
    }
}

impl Proposal for Box<dyn Proposal> {
    fn dim(&self) -> usize {
        (**self).dim()
    }

    fn generate(&mut self, current: &[f64]) -> Result<Vec<f64>> {
        (**self).generate(current)
    }

    fn log_density(&self, x: &[f64], p: &[f64]) -> Result<f64> {
        (**self).log_density(x, p)
    }

    fn adapt(&mut self, efficiency: f64, samples: Option<ArrayView2<f64>>) -> Result<bool> {
        (**self).adapt(efficiency, samples)
    }

    fn info_string(&self) -> String {
        (**self).info_string()
    }

    fn reseed(&mut self, seed: u64) {
        (**self).reseed(seed)
    }

    fn block_start(&self) -> Option<usize> {
        (**self).block_start()
    }
}

/// A continuous target distribution the sampler explores.
pub trait Target {
    /// Log of the unnormalized density at `theta`.
    fn unnorm_log_prob(&self, theta: &[f64]) -> f64;
}

impl<F> Target for F
where
    F: Fn(&[f64]) -> f64,
{
    fn unnorm_log_prob(&self, theta: &[f64]) -> f64 {
        self(theta)
    }
}

/**
A multivariate Gaussian target with a full covariance matrix.

```rust
use mcmc_proposals::covariance::Covariance;
use mcmc_proposals::distributions::{GaussianTarget, Target};

let cov = Covariance::from_rows(&[vec![4.0, 2.0], vec![2.0, 3.0]]).unwrap();
let target = GaussianTarget::new(vec![0.0, 1.0], cov).unwrap();
assert_eq!(target.unnorm_log_prob(&[0.0, 1.0]), 0.0);
```
*/
#[derive(Debug, Clone)]
pub struct GaussianTarget {
    pub mean: Vec<f64>,
    pub cov: Covariance,
}

impl GaussianTarget {
    pub fn new(mean: Vec<f64>, cov: Covariance) -> Result<Self> {
        check_dim(cov.dim(), mean.len())?;
        Ok(Self { mean, cov })
    }
}

impl Target for GaussianTarget {
    fn unnorm_log_prob(&self, theta: &[f64]) -> f64 {
        let diff: Vec<f64> = theta.iter().zip(&self.mean).map(|(x, m)| x - m).collect();
        -0.5 * self.cov.quadratic_form(&diff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParameterRange;
    use crate::univariate::GaussianProposal;
    use approx::assert_abs_diff_eq;

    #[test]
    fn boxed_proposals_delegate() {
        let ranges = vec![ParameterRange::new(-1.0, 1.0); 3];
        let inner = GaussianProposal::new(ranges, 0.5).unwrap();
        let mut boxed: Box<dyn Proposal> = Box::new(inner.clone());
        boxed.reseed(3);
        assert_eq!(boxed.dim(), 3);
        assert_eq!(boxed.generate(&[0.0; 3]).unwrap().len(), 3);
        assert_abs_diff_eq!(
            boxed.log_density(&[0.1, 0.2, 0.3], &[0.0; 3]).unwrap(),
            inner.log_density(&[0.1, 0.2, 0.3], &[0.0; 3]).unwrap()
        );
        assert!(boxed.adapt(0.0, None).unwrap());
    }

    #[test]
    fn cloned_boxes_are_independent_after_reseed() {
        let ranges = vec![ParameterRange::new(-1.0, 1.0); 2];
        let boxed: Box<dyn Proposal> =
            Box::new(GaussianProposal::new(ranges, 0.5).unwrap().set_seed(1));
        let mut a = boxed.clone();
        let mut b = boxed.clone();
        a.reseed(10);
        b.reseed(11);
        assert_ne!(a.generate(&[0.0, 0.0]).unwrap(), b.generate(&[0.0, 0.0]).unwrap());
    }

    #[test]
    fn gaussian_target_is_quadratic() {
        let cov = Covariance::from_rows(&[vec![1.0, 0.0], vec![0.0, 4.0]]).unwrap();
        let target = GaussianTarget::new(vec![1.0, 0.0], cov).unwrap();
        assert_abs_diff_eq!(target.unnorm_log_prob(&[2.0, 2.0]), -0.5 * (1.0 + 1.0));
    }

    #[test]
    fn closures_are_targets() {
        let target = |theta: &[f64]| -theta[0].abs();
        assert_eq!(target.unnorm_log_prob(&[-3.0]), -3.0);
    }
}
