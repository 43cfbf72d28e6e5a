/*!
Independent per-dimension Gaussian proposals.

[`GaussianProposal`] perturbs every parameter with its own width. With a
[`Kernel::RandomWalk`] kernel the draw is centered on the current state; with
[`Kernel::Independence`] it is centered on a constant and ignores the current
state, which is useful to resample nuisance parameters on every step.

# Examples

```rust
use mcmc_proposals::distributions::Proposal;
use mcmc_proposals::params::ParameterRange;
use mcmc_proposals::univariate::GaussianProposal;

let ranges = vec![ParameterRange::new(-5.0, 5.0); 2];
let mut proposal = GaussianProposal::new(ranges, 0.4).unwrap().set_seed(7);
assert_eq!(proposal.sigma(), &[4.0, 4.0]);

let candidate = proposal.generate(&[0.0, 0.0]).unwrap();
assert_eq!(candidate.len(), 2);
```
*/

use std::f64::consts::PI;
use std::fmt::Write;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::distributions::Proposal;
use crate::error::{ProposalError, Result};
use crate::params::{check_dim, derive_sigma, validate_sigma, Kernel, ParameterRange};

/// Width of the diagnostic range built around `mu` for the fixed variant, in sigmas.
const FIXED_RANGE_WIDTH: f64 = 5.0;

/// Draws `mu[i] + sigma[i] * z` with standard normal `z` for every dimension.
pub(crate) fn gaussian_draw<R: Rng + ?Sized>(rng: &mut R, mu: &[f64], sigma: &[f64]) -> Vec<f64> {
    mu.iter()
        .zip(sigma)
        .map(|(&m, &s)| {
            let z: f64 = rng.sample(StandardNormal);
            m + s * z
        })
        .collect()
}

/// Joint log density of independent normals with means `mu` and widths `sigma`.
pub(crate) fn gaussian_log_density(x: &[f64], mu: &[f64], sigma: &[f64]) -> f64 {
    let half_log_two_pi = 0.5 * (2.0 * PI).ln();
    x.iter()
        .zip(mu)
        .zip(sigma)
        .map(|((&x, &m), &s)| {
            let z = (x - m) / s;
            -0.5 * z * z - s.ln() - half_log_two_pi
        })
        .sum()
}

#[derive(Debug, Clone)]
pub struct GaussianProposal {
    ranges: Vec<ParameterRange>,
    step_size: Option<f64>,
    sigma: Vec<f64>,
    kernel: Kernel,
    rng: SmallRng,
}

impl GaussianProposal {
    /// Random-walk proposal with widths `step_size * (max - min)`.
    pub fn new(ranges: Vec<ParameterRange>, step_size: f64) -> Result<Self> {
        let overrides = vec![None; ranges.len()];
        Self::with_sigma(ranges, step_size, &overrides)
    }

    /// Random-walk proposal where `sigma[i]`, when given, replaces the derived width.
    pub fn with_sigma(
        ranges: Vec<ParameterRange>,
        step_size: f64,
        sigma: &[Option<f64>],
    ) -> Result<Self> {
        let sigma = derive_sigma(&ranges, step_size, sigma)?;
        Ok(Self {
            ranges,
            step_size: Some(step_size),
            sigma,
            kernel: Kernel::RandomWalk,
            rng: SmallRng::from_entropy(),
        })
    }

    /// Independence proposal centered on `mu`. The diagnostic ranges span
    /// five sigmas either side of `mu`.
    pub fn fixed(mu: Vec<f64>, sigma: Vec<f64>) -> Result<Self> {
        validate_sigma(&sigma, mu.len())?;
        let ranges = mu
            .iter()
            .zip(&sigma)
            .map(|(&m, &s)| ParameterRange::around(m, s, FIXED_RANGE_WIDTH))
            .collect();
        Self::fixed_with_ranges(mu, sigma, ranges)
    }

    /// Independence proposal centered on `mu` with explicit diagnostic ranges.
    pub fn fixed_with_ranges(
        mu: Vec<f64>,
        sigma: Vec<f64>,
        ranges: Vec<ParameterRange>,
    ) -> Result<Self> {
        validate_sigma(&sigma, mu.len())?;
        if ranges.len() != mu.len() {
            return Err(ProposalError::DimensionMismatch {
                expected: mu.len(),
                found: ranges.len(),
            });
        }
        Ok(Self {
            ranges,
            step_size: None,
            sigma,
            kernel: Kernel::Independence(mu),
            rng: SmallRng::from_entropy(),
        })
    }

    pub fn sigma(&self) -> &[f64] {
        &self.sigma
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub fn ranges(&self) -> &[ParameterRange] {
        &self.ranges
    }
}

impl Proposal for GaussianProposal {
    fn dim(&self) -> usize {
        self.sigma.len()
    }

    fn generate(&mut self, current: &[f64]) -> Result<Vec<f64>> {
        check_dim(self.dim(), current.len())?;
        let center = self.kernel.center(current);
        Ok(gaussian_draw(&mut self.rng, center, &self.sigma))
    }

    fn log_density(&self, x: &[f64], p: &[f64]) -> Result<f64> {
        check_dim(self.dim(), x.len())?;
        check_dim(self.dim(), p.len())?;
        Ok(gaussian_log_density(x, self.kernel.center(p), &self.sigma))
    }

    fn info_string(&self) -> String {
        let mut out = String::new();
        let name = if self.kernel.is_random_walk() {
            "GaussianProposal"
        } else {
            "FixedGaussianProposal"
        };
        let step = self
            .step_size
            .map_or_else(|| "none".to_string(), |s| s.to_string());
        let _ = writeln!(out, "{name}(npars={}, stepsize={step})", self.dim());
        for (i, (sigma, range)) in self.sigma.iter().zip(&self.ranges).enumerate() {
            let _ = write!(out, "    {i} : sigma={sigma}, low={}, high={}", range.min, range.max);
            if let Kernel::Independence(mu) = &self.kernel {
                let _ = write!(out, ", mu={}", mu[i]);
            }
            out.push('\n');
        }
        out
    }

    fn reseed(&mut self, seed: u64) {
        self.rng = SmallRng::seed_from_u64(seed);
    }
}
