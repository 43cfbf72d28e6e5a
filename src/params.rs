/*!
Static descriptors shared by the Gaussian proposals: parameter ranges, the
kernel centering and the derivation of default step widths.

A [`ParameterRange`] is only consulted when a proposal is built; it is not a
live constraint on generated candidates.

```rust
use mcmc_proposals::params::{derive_sigma, ParameterRange};

let ranges = [ParameterRange::new(-5.0, 5.0), ParameterRange::new(0.0, 1.0)];
let sigma = derive_sigma(&ranges, 0.4, &[None, Some(0.05)]).unwrap();
assert_eq!(sigma, vec![4.0, 0.05]);
```
*/

use crate::error::{ProposalError, Result};

/// Conventional step size for [`crate::univariate::GaussianProposal`].
pub const DEFAULT_STEP_SIZE: f64 = 0.4;

/// Conventional step size for [`crate::transform::TransformedGaussianProposal`].
pub const DEFAULT_TRANSFORM_STEP_SIZE: f64 = 0.1;

/// Lower and upper bound of a single parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterRange {
    pub min: f64,
    pub max: f64,
}

impl ParameterRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Range spanning `width` standard deviations either side of `mu`.
    pub fn around(mu: f64, sigma: f64, width: f64) -> Self {
        Self {
            min: mu - width * sigma,
            max: mu + width * sigma,
        }
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}

impl From<(f64, f64)> for ParameterRange {
    fn from((min, max): (f64, f64)) -> Self {
        Self { min, max }
    }
}

/// Where a proposal kernel is centered.
#[derive(Debug, Clone, PartialEq)]
pub enum Kernel {
    /// Centered on the current state of the chain.
    RandomWalk,
    /// Centered on a constant, independent of the current state.
    Independence(Vec<f64>),
}

impl Kernel {
    /// Independence kernel with the same center in every one of `n` dimensions.
    pub fn independence_broadcast(value: f64, n: usize) -> Self {
        Kernel::Independence(vec![value; n])
    }

    /// Picks the center for a draw or a density evaluation.
    pub(crate) fn center<'a>(&'a self, current: &'a [f64]) -> &'a [f64] {
        match self {
            Kernel::RandomWalk => current,
            Kernel::Independence(mu) => mu,
        }
    }

    pub(crate) fn is_random_walk(&self) -> bool {
        matches!(self, Kernel::RandomWalk)
    }
}

/// Fills unspecified widths with `step_size * (max - min)` and validates the result.
pub fn derive_sigma(
    ranges: &[ParameterRange],
    step_size: f64,
    overrides: &[Option<f64>],
) -> Result<Vec<f64>> {
    if overrides.len() != ranges.len() {
        return Err(ProposalError::SigmaLength {
            expected: ranges.len(),
            found: overrides.len(),
        });
    }
    let sigma: Vec<f64> = ranges
        .iter()
        .zip(overrides)
        .map(|(range, forced)| forced.unwrap_or(step_size * range.span()))
        .collect();
    validate_sigma(&sigma, ranges.len())?;
    Ok(sigma)
}

/// Checks that there is one finite, strictly positive width per parameter.
pub fn validate_sigma(sigma: &[f64], n_params: usize) -> Result<()> {
    if sigma.len() != n_params {
        return Err(ProposalError::SigmaLength {
            expected: n_params,
            found: sigma.len(),
        });
    }
    match sigma
        .iter()
        .enumerate()
        .find(|(_, s)| !(s.is_finite() && **s > 0.0))
    {
        Some((index, &value)) => Err(ProposalError::InvalidSigma { index, value }),
        None => Ok(()),
    }
}

pub(crate) fn check_dim(expected: usize, found: usize) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(ProposalError::DimensionMismatch { expected, found })
    }
}
