/*!
Adaptive wrappers around [`MultivariateGaussianProposal`].

Both controllers aim for an acceptance efficiency of `0.4`. While the observed
efficiency is further than `0.1` from the target, every call to `adapt`
multiplies the covariance by `1 + 2 (efficiency - 0.4)`: a chain that accepts
too often takes wider steps, one that rarely accepts takes narrower ones. Once
the efficiency lands inside the tolerance the controller latches as converged
and never changes the covariance again.

[`EmpiricalAdaptiveProposal`] additionally replaces the covariance, once, by the
sample covariance of the recent chain history (scaled by the accumulated
factor) the first time the efficiency exceeds `0.1`.

```rust
use mcmc_proposals::adaptive::ScaleAdaptiveProposal;
use mcmc_proposals::covariance::Covariance;
use mcmc_proposals::distributions::Proposal;
use mcmc_proposals::multivariate::MultivariateGaussianProposal;

let inner = MultivariateGaussianProposal::random_walk(Covariance::identity(2));
let mut proposal = ScaleAdaptiveProposal::new(inner);
assert!(!proposal.adapt(0.9, None).unwrap());
assert!(proposal.adapt(0.42, None).unwrap());
assert!(proposal.state().converged);
```
*/

use std::fmt::Write;

use log::{debug, info, warn};
use nalgebra::DMatrix;
use ndarray::ArrayView2;

use crate::covariance::{empirical_covariance, Covariance};
use crate::distributions::Proposal;
use crate::error::{ProposalError, Result};
use crate::multivariate::MultivariateGaussianProposal;
use crate::params::check_dim;

/// Tuning constants of the adaptive controllers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptSettings {
    /// Acceptance efficiency the controller steers towards.
    pub target_efficiency: f64,
    /// Distance from the target below which the controller converges.
    pub tolerance: f64,
    /// Slope of the rescaling rule `1 + gain * (efficiency - target)`.
    pub gain: f64,
    /// Efficiency above which the chain history is trusted for re-estimation.
    pub reestimate_threshold: f64,
}

impl Default for AdaptSettings {
    fn default() -> Self {
        Self {
            target_efficiency: 0.4,
            tolerance: 0.1,
            gain: 2.0,
            reestimate_threshold: 0.1,
        }
    }
}

impl AdaptSettings {
    /// Factor applied to the covariance for an observed efficiency.
    pub fn scale_for(&self, efficiency: f64) -> f64 {
        1.0 + self.gain * (efficiency - self.target_efficiency)
    }

    pub fn is_on_target(&self, efficiency: f64) -> bool {
        (efficiency - self.target_efficiency).abs() < self.tolerance
    }

    /// Checks that every efficiency in `[0, 1]` maps to a finite positive scale.
    /// The rule is linear in the efficiency, so the endpoints decide.
    pub fn validate(&self) -> Result<()> {
        for efficiency in [0.0, 1.0] {
            let scale = self.scale_for(efficiency);
            if !(scale.is_finite() && scale > 0.0) {
                return Err(ProposalError::InvalidAdaptSettings { efficiency, scale });
            }
        }
        Ok(())
    }
}

/// Queryable adaptation history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptationState {
    /// Latched once the efficiency is on target.
    pub converged: bool,
    /// Product of every scale applied so far.
    pub cumulative_scale: f64,
    /// Efficiency passed to the most recent `adapt` call.
    pub last_efficiency: Option<f64>,
    /// Number of covariance updates applied.
    pub updates: usize,
}

impl Default for AdaptationState {
    fn default() -> Self {
        Self {
            converged: false,
            cumulative_scale: 1.0,
            last_efficiency: None,
            updates: 0,
        }
    }
}

impl AdaptationState {
    /// Records `efficiency` and returns true if adaptation is over, latching on target.
    fn observe(&mut self, efficiency: f64, settings: &AdaptSettings, name: &str) -> Result<bool> {
        if !(0.0..=1.0).contains(&efficiency) {
            return Err(ProposalError::InvalidEfficiency(efficiency));
        }
        self.last_efficiency = Some(efficiency);
        debug!(
            "{name} eff={efficiency:.2}, scale={:.2}, converged={}",
            self.cumulative_scale, self.converged
        );
        if !self.converged && settings.is_on_target(efficiency) {
            self.converged = true;
            info!(
                "{name} converged at eff={efficiency:.2}, scale={:.2}",
                self.cumulative_scale
            );
        }
        Ok(self.converged)
    }

    fn describe(&self, out: &mut String) {
        let eff = self
            .last_efficiency
            .map_or_else(|| "none".to_string(), |e| format!("{e:.3}"));
        let _ = writeln!(
            out,
            "    adaptation: converged={}, scale={:.4}, updates={}, last_eff={eff}",
            self.converged, self.cumulative_scale, self.updates
        );
    }
}

/// Validates `matrix` (repairing drift) and swaps it into `inner`; on failure the
/// previous covariance stays in place.
fn replace_covariance(inner: &mut MultivariateGaussianProposal, matrix: DMatrix<f64>) -> Result<()> {
    let covariance = Covariance::repaired(matrix).map_err(|e| {
        warn!("rejecting covariance update: {e}");
        ProposalError::UpdateRejected(Box::new(e))
    })?;
    inner.set_covariance(covariance)
}

/// Rescales the covariance until the acceptance efficiency is on target.
#[derive(Debug, Clone)]
pub struct ScaleAdaptiveProposal {
    inner: MultivariateGaussianProposal,
    settings: AdaptSettings,
    state: AdaptationState,
}

impl ScaleAdaptiveProposal {
    pub fn new(inner: MultivariateGaussianProposal) -> Self {
        Self {
            inner,
            settings: AdaptSettings::default(),
            state: AdaptationState::default(),
        }
    }

    /// Fails if `settings` could shrink the covariance to zero or flip its sign.
    pub fn with_settings(inner: MultivariateGaussianProposal, settings: AdaptSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            ..Self::new(inner)
        })
    }

    pub fn state(&self) -> &AdaptationState {
        &self.state
    }

    pub fn inner(&self) -> &MultivariateGaussianProposal {
        &self.inner
    }

    pub fn into_inner(self) -> MultivariateGaussianProposal {
        self.inner
    }
}

impl Proposal for ScaleAdaptiveProposal {
    fn dim(&self) -> usize {
        self.inner.dim()
    }

    fn generate(&mut self, current: &[f64]) -> Result<Vec<f64>> {
        self.inner.generate(current)
    }

    fn log_density(&self, x: &[f64], p: &[f64]) -> Result<f64> {
        self.inner.log_density(x, p)
    }

    fn adapt(&mut self, efficiency: f64, _samples: Option<ArrayView2<f64>>) -> Result<bool> {
        if self
            .state
            .observe(efficiency, &self.settings, "ScaleAdaptiveProposal")?
        {
            return Ok(true);
        }
        let scale = self.settings.scale_for(efficiency);
        let rescaled = self.inner.covariance().matrix() * scale;
        replace_covariance(&mut self.inner, rescaled)?;
        self.state.cumulative_scale *= scale;
        self.state.updates += 1;
        Ok(false)
    }

    fn info_string(&self) -> String {
        let mut out = String::from("ScaleAdaptiveProposal wrapping ");
        out.push_str(&self.inner.info_string());
        out.push('\n');
        self.state.describe(&mut out);
        out
    }

    fn reseed(&mut self, seed: u64) {
        self.inner.reseed(seed)
    }

    fn block_start(&self) -> Option<usize> {
        self.inner.block_start()
    }
}

/// Rescales like [`ScaleAdaptiveProposal`], and re-estimates the covariance once
/// from the chain history when the efficiency first exceeds the threshold.
#[derive(Debug, Clone)]
pub struct EmpiricalAdaptiveProposal {
    inner: MultivariateGaussianProposal,
    settings: AdaptSettings,
    state: AdaptationState,
    reestimated: bool,
}

impl EmpiricalAdaptiveProposal {
    pub fn new(inner: MultivariateGaussianProposal) -> Self {
        Self {
            inner,
            settings: AdaptSettings::default(),
            state: AdaptationState::default(),
            reestimated: false,
        }
    }

    /// Fails if `settings` could shrink the covariance to zero or flip its sign.
    pub fn with_settings(inner: MultivariateGaussianProposal, settings: AdaptSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            ..Self::new(inner)
        })
    }

    pub fn state(&self) -> &AdaptationState {
        &self.state
    }

    /// Whether the one-shot re-estimation has happened.
    pub fn has_reestimated(&self) -> bool {
        self.reestimated
    }

    pub fn inner(&self) -> &MultivariateGaussianProposal {
        &self.inner
    }

    pub fn into_inner(self) -> MultivariateGaussianProposal {
        self.inner
    }

    fn reestimate(&self, samples: Option<ArrayView2<f64>>, scale: f64) -> Result<Option<DMatrix<f64>>> {
        let Some(samples) = samples else {
            debug!("EmpiricalAdaptiveProposal has no samples to re-estimate from; rescaling");
            return Ok(None);
        };
        check_dim(self.dim(), samples.ncols())?;
        match empirical_covariance(samples) {
            Ok(cov) => Ok(Some(cov * scale)),
            Err(ProposalError::InsufficientSamples(n)) => {
                debug!("EmpiricalAdaptiveProposal has {n} samples, too few to re-estimate; rescaling");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

impl Proposal for EmpiricalAdaptiveProposal {
    fn dim(&self) -> usize {
        self.inner.dim()
    }

    fn generate(&mut self, current: &[f64]) -> Result<Vec<f64>> {
        self.inner.generate(current)
    }

    fn log_density(&self, x: &[f64], p: &[f64]) -> Result<f64> {
        self.inner.log_density(x, p)
    }

    fn adapt(&mut self, efficiency: f64, samples: Option<ArrayView2<f64>>) -> Result<bool> {
        if self
            .state
            .observe(efficiency, &self.settings, "EmpiricalAdaptiveProposal")?
        {
            return Ok(true);
        }
        let scale = self.settings.scale_for(efficiency);
        let total_scale = self.state.cumulative_scale * scale;

        let estimate = if !self.reestimated && efficiency > self.settings.reestimate_threshold {
            self.reestimate(samples, total_scale)?
        } else {
            None
        };
        match estimate {
            Some(matrix) => {
                info!("EmpiricalAdaptiveProposal updating covariance matrix from chain history");
                replace_covariance(&mut self.inner, matrix)?;
                self.reestimated = true;
            }
            None => {
                let rescaled = self.inner.covariance().matrix() * scale;
                replace_covariance(&mut self.inner, rescaled)?;
            }
        }
        self.state.cumulative_scale = total_scale;
        self.state.updates += 1;
        Ok(false)
    }

    fn info_string(&self) -> String {
        let mut out = String::from("EmpiricalAdaptiveProposal wrapping ");
        out.push_str(&self.inner.info_string());
        out.push('\n');
        self.state.describe(&mut out);
        let _ = writeln!(out, "    reestimated={}", self.reestimated);
        out
    }

    fn reseed(&mut self, seed: u64) {
        self.inner.reseed(seed)
    }

    fn block_start(&self) -> Option<usize> {
        self.inner.block_start()
    }
}
