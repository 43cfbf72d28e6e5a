/*!
Correlated Gaussian proposals.

[`MultivariateGaussianProposal`] perturbs a block of parameters with draws from
`N(0, Σ)`, taken from a [`BatchDrawGenerator`]. As a random walk it returns
`current + draw`; as an independence sampler it returns `mu + draw`.

The log density is the quadratic form only, `-0.5 (x - c)^T Σ^{-1} (x - c)`,
without the normalization constant. This is enough for the Hastings ratio of a
single proposal whose covariance does not change between the forward and
backward evaluations, but it must not be mixed with normalized densities.

# Examples

```rust
use mcmc_proposals::covariance::Covariance;
use mcmc_proposals::distributions::Proposal;
use mcmc_proposals::multivariate::MultivariateGaussianProposal;

let proposal = MultivariateGaussianProposal::random_walk(Covariance::identity(2));
let lp = proposal.log_density(&[1.0, 0.0], &[0.0, 0.0]).unwrap();
assert_eq!(lp, -0.5);
```
*/

use std::fmt::Write;

use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::batch::{BatchDrawGenerator, DEFAULT_BATCH_SIZE};
use crate::covariance::Covariance;
use crate::distributions::Proposal;
use crate::error::Result;
use crate::params::{check_dim, Kernel};

#[derive(Debug, Clone)]
pub struct MultivariateGaussianProposal {
    covariance: Covariance,
    kernel: Kernel,
    start_index: Option<usize>,
    draws: BatchDrawGenerator,
    rng: SmallRng,
}

impl MultivariateGaussianProposal {
    /// Proposal centered on the current state.
    pub fn random_walk(covariance: Covariance) -> Self {
        Self::build(covariance, Kernel::RandomWalk)
    }

    /// Proposal centered on `mu` regardless of the current state.
    pub fn independence(covariance: Covariance, mu: Vec<f64>) -> Result<Self> {
        Self::with_kernel(covariance, Kernel::Independence(mu))
    }

    pub fn with_kernel(covariance: Covariance, kernel: Kernel) -> Result<Self> {
        if let Kernel::Independence(mu) = &kernel {
            check_dim(covariance.dim(), mu.len())?;
        }
        Ok(Self::build(covariance, kernel))
    }

    fn build(covariance: Covariance, kernel: Kernel) -> Self {
        let draws = BatchDrawGenerator::new(covariance.factor().clone(), DEFAULT_BATCH_SIZE);
        Self {
            covariance,
            kernel,
            start_index: None,
            draws,
            rng: SmallRng::from_entropy(),
        }
    }

    /// Records that this block starts at `start_index` of a larger parameter vector.
    pub fn with_start_index(mut self, start_index: usize) -> Self {
        self.start_index = Some(start_index);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.draws.set_batch_size(batch_size);
        self
    }

    /// First index of the owned block, if one was recorded.
    pub fn start_index(&self) -> Option<usize> {
        self.start_index
    }

    /// One past the last index of the owned block, if a start was recorded.
    pub fn end_index(&self) -> Option<usize> {
        self.start_index.map(|start| start + self.covariance.dim())
    }

    pub fn covariance(&self) -> &Covariance {
        &self.covariance
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    /// Draws still buffered in the batch generator.
    pub fn buffered_draws(&self) -> usize {
        self.draws.buffered()
    }

    /// Replaces the covariance and restarts the draw sequence over it.
    pub fn set_covariance(&mut self, covariance: Covariance) -> Result<()> {
        check_dim(self.covariance.dim(), covariance.dim())?;
        self.draws.restart(covariance.factor().clone());
        self.covariance = covariance;
        Ok(())
    }
}

impl Proposal for MultivariateGaussianProposal {
    fn dim(&self) -> usize {
        self.covariance.dim()
    }

    fn generate(&mut self, current: &[f64]) -> Result<Vec<f64>> {
        check_dim(self.dim(), current.len())?;
        let draw = self.draws.next(&mut self.rng);
        let center = self.kernel.center(current);
        Ok(center.iter().zip(draw.iter()).map(|(c, d)| c + d).collect())
    }

    fn log_density(&self, x: &[f64], p: &[f64]) -> Result<f64> {
        check_dim(self.dim(), x.len())?;
        check_dim(self.dim(), p.len())?;
        let center = self.kernel.center(p);
        let diff: Vec<f64> = x.iter().zip(center).map(|(x, c)| x - c).collect();
        Ok(-0.5 * self.covariance.quadratic_form(&diff))
    }

    fn info_string(&self) -> String {
        let mut out = String::new();
        let name = if self.kernel.is_random_walk() {
            "MultiVariateGaussianProposal"
        } else {
            "FixedMultiVariateGaussianProposal"
        };
        let _ = write!(out, "{name}(npars={}", self.dim());
        if let Some(start) = self.start_index {
            let _ = write!(out, ", startindex={start}, endindex={}", start + self.dim());
        }
        out.push_str(")\n");
        for (i, sigma) in self.covariance.std_devs().iter().enumerate() {
            let _ = write!(out, "    {i} : sigma={sigma}");
            if let Kernel::Independence(mu) = &self.kernel {
                let _ = write!(out, ", mu={}", mu[i]);
            }
            out.push('\n');
        }
        let _ = write!(out, "{}", self.covariance.matrix());
        out
    }

    fn reseed(&mut self, seed: u64) {
        self.rng = SmallRng::seed_from_u64(seed);
        self.draws.clear();
    }

    fn block_start(&self) -> Option<usize> {
        self.start_index
    }
}
