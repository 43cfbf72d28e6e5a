/*!
Proposal functions for Metropolis-Hastings sampling.

Every proposal implements [`distributions::Proposal`]: it draws a candidate
from the current state, scores candidates with a log density for the Hastings
ratio, optionally adapts itself from the acceptance efficiency, and describes
its configuration as text.

- [`univariate::GaussianProposal`]: independent Gaussian widths, as a random walk
  or centered on a fixed point.
- [`transform::TransformedGaussianProposal`]: Gaussian in a reparameterized space,
  with domain rejection.
- [`multivariate::MultivariateGaussianProposal`]: correlated Gaussian draws from
  batches of precomputed deviates.
- [`adaptive`]: covariance rescaling and one-shot empirical re-estimation.
- [`composite::CompositeProposal`] and [`fixed::FixedSubsetProposal`]: decorators
  that compose proposals over blocks and pin parameters.
- [`hesse`]: covariance seeds from the curvature of an objective.

[`metropolis_hastings::MetropolisHastings`] drives any of them over parallel chains.
*/

pub mod adaptive;
pub mod batch;
pub mod composite;
pub mod core;
pub mod covariance;
pub mod distributions;
pub mod error;
pub mod fixed;
pub mod hesse;
pub mod metropolis_hastings;
pub mod multivariate;
pub mod params;
pub mod stats;
pub mod transform;
pub mod univariate;
