/*!
Gaussian proposals in a reparameterized space.

Some parameters are naturally Gaussian only after a change of variables, for
example a mixing angle that is Gaussian in `sin²(2θ)`. A [`Transform`] maps a
parameter into that space and back, and may restrict which transformed values
are valid. [`TransformedGaussianProposal`] draws the whole candidate in the
transformed space and redraws it until every dimension lies inside its domain.

```rust
use mcmc_proposals::distributions::Proposal;
use mcmc_proposals::params::ParameterRange;
use mcmc_proposals::transform::{Transform, TransformedGaussianProposal};

let ranges = vec![ParameterRange::new(0.0, 1.0), ParameterRange::new(-3.0, 3.0)];
let transforms = vec![Transform::sin_sq_two_theta(), Transform::identity()];
let mut proposal = TransformedGaussianProposal::new(ranges, 0.1, transforms)
    .unwrap()
    .set_seed(3);
let candidate = proposal.generate(&[0.4, 0.0]).unwrap();
assert!((0.0..=std::f64::consts::FRAC_PI_4).contains(&candidate[0]));
```
*/

use std::fmt::{self, Write};
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::distributions::Proposal;
use crate::error::{ProposalError, Result};
use crate::params::{check_dim, derive_sigma, ParameterRange};
use crate::univariate::{gaussian_draw, gaussian_log_density};

/// Default cap on joint redraws before a candidate outside the domain is an error.
pub const DEFAULT_MAX_RETRIES: usize = 10_000;

pub type Mapping = Arc<dyn Fn(f64) -> f64 + Send + Sync>;
pub type DomainCheck = Arc<dyn Fn(f64) -> bool + Send + Sync>;

/// Optional change of variables for one parameter, plus an optional domain
/// predicate evaluated in the transformed space.
#[derive(Clone, Default)]
pub struct Transform {
    name: Option<&'static str>,
    mapping: Option<(Mapping, Mapping)>,
    domain: Option<DomainCheck>,
}

impl Transform {
    /// Passes the parameter through unchanged and accepts every value.
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn new<F, G>(forward: F, inverse: G) -> Self
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
        G: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        Self {
            name: None,
            mapping: Some((Arc::new(forward), Arc::new(inverse))),
            domain: None,
        }
    }

    /// Restricts the transformed value to where `indomain` holds.
    pub fn with_domain<P>(mut self, indomain: P) -> Self
    where
        P: Fn(f64) -> bool + Send + Sync + 'static,
    {
        self.domain = Some(Arc::new(indomain));
        self
    }

    pub fn named(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    /// Gaussian in `sin²(2θ)`, valid for `θ` in `[0, π/4]`.
    pub fn sin_sq_two_theta() -> Self {
        Transform::new(|theta: f64| (2.0 * theta).sin().powi(2), |y: f64| y.sqrt().asin() / 2.0)
            .with_domain(|y| (0.0..=1.0).contains(&y))
            .named("sin^2(2x)")
    }

    /// Gaussian in `sin θ`, valid for `θ` in `[-π/2, π/2]`.
    pub fn sin() -> Self {
        Transform::new(f64::sin, f64::asin)
            .with_domain(|y| (-1.0..=1.0).contains(&y))
            .named("sin(x)")
    }

    pub fn forward(&self, x: f64) -> f64 {
        match &self.mapping {
            Some((f, _)) => f(x),
            None => x,
        }
    }

    pub fn inverse(&self, y: f64) -> f64 {
        match &self.mapping {
            Some((_, g)) => g(y),
            None => y,
        }
    }

    pub fn in_domain(&self, y: f64) -> bool {
        self.domain.as_ref().map_or(true, |check| check(y))
    }

    fn label(&self) -> &'static str {
        match (self.name, &self.mapping) {
            (Some(name), _) => name,
            (None, Some(_)) => "custom",
            (None, None) => "identity",
        }
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transform")
            .field("map", &self.label())
            .field("domain", &self.domain.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct TransformedGaussianProposal {
    ranges: Vec<ParameterRange>,
    step_size: f64,
    sigma: Vec<f64>,
    transforms: Vec<Transform>,
    max_retries: usize,
    rng: SmallRng,
}

impl TransformedGaussianProposal {
    /// `ranges` are expressed in the transformed (Gaussian) space; widths are
    /// `step_size * (max - min)`.
    pub fn new(
        ranges: Vec<ParameterRange>,
        step_size: f64,
        transforms: Vec<Transform>,
    ) -> Result<Self> {
        let overrides = vec![None; ranges.len()];
        Self::with_sigma(ranges, step_size, &overrides, transforms)
    }

    pub fn with_sigma(
        ranges: Vec<ParameterRange>,
        step_size: f64,
        sigma: &[Option<f64>],
        transforms: Vec<Transform>,
    ) -> Result<Self> {
        let sigma = derive_sigma(&ranges, step_size, sigma)?;
        check_dim(sigma.len(), transforms.len())?;
        Ok(Self {
            ranges,
            step_size,
            sigma,
            transforms,
            max_retries: DEFAULT_MAX_RETRIES,
            rng: SmallRng::from_entropy(),
        })
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn sigma(&self) -> &[f64] {
        &self.sigma
    }

    /// Maps `values` into the Gaussian space.
    pub fn to_gaussian_space(&self, values: &[f64]) -> Vec<f64> {
        values
            .iter()
            .zip(&self.transforms)
            .map(|(&v, t)| t.forward(v))
            .collect()
    }

    /// Maps `values` back from the Gaussian space.
    pub fn from_gaussian_space(&self, values: &[f64]) -> Vec<f64> {
        values
            .iter()
            .zip(&self.transforms)
            .map(|(&v, t)| t.inverse(v))
            .collect()
    }

    fn in_domain(&self, values: &[f64]) -> bool {
        values
            .iter()
            .zip(&self.transforms)
            .all(|(&v, t)| t.in_domain(v))
    }
}

impl Proposal for TransformedGaussianProposal {
    fn dim(&self) -> usize {
        self.sigma.len()
    }

    fn generate(&mut self, current: &[f64]) -> Result<Vec<f64>> {
        check_dim(self.dim(), current.len())?;
        let center = self.to_gaussian_space(current);
        for _ in 0..self.max_retries {
            let candidate = gaussian_draw(&mut self.rng, &center, &self.sigma);
            if self.in_domain(&candidate) {
                return Ok(self.from_gaussian_space(&candidate));
            }
        }
        Err(ProposalError::DomainExhausted {
            attempts: self.max_retries,
        })
    }

    fn log_density(&self, x: &[f64], p: &[f64]) -> Result<f64> {
        check_dim(self.dim(), x.len())?;
        check_dim(self.dim(), p.len())?;
        let x = self.to_gaussian_space(x);
        let p = self.to_gaussian_space(p);
        Ok(gaussian_log_density(&x, &p, &self.sigma))
    }

    fn info_string(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "TransformedGaussianProposal(npars={}, stepsize={}, maxretries={})",
            self.dim(),
            self.step_size,
            self.max_retries
        );
        for (i, ((sigma, range), t)) in self
            .sigma
            .iter()
            .zip(&self.ranges)
            .zip(&self.transforms)
            .enumerate()
        {
            let _ = writeln!(
                out,
                "    {i} : sigma={sigma}, low={}, high={}, transform={}",
                range.min,
                range.max,
                t.label()
            );
        }
        out
    }

    fn reseed(&mut self, seed: u64) {
        self.rng = SmallRng::seed_from_u64(seed);
    }
}
