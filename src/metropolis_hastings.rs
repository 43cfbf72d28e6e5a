/*!
# Metropolis–Hastings Sampler

A generic Metropolis–Hastings sampler over any target `D` implementing [`Target`]
and any proposal `Q` implementing [`Proposal`]. The sampler runs several
independent chains in parallel, each with its own copy of the proposal and its
own random number generator. A global seed makes runs reproducible: chain `i`
is seeded with `seed + i`, and its proposal is reseeded from the chain's
generator.

## Adaptation

During the first [`MHSettings::warmup`] steps every chain counts its accepted
moves. Every [`MHSettings::adapt_every`] steps it hands the acceptance
efficiency of that window, together with the states visited in it, to
[`Proposal::adapt`]. Once the proposal reports convergence the chain stops
adapting. Proposals that do not adapt are converged from the start.

## Example Usage

```rust
use mcmc_proposals::adaptive::ScaleAdaptiveProposal;
use mcmc_proposals::core::ChainRunner;
use mcmc_proposals::covariance::Covariance;
use mcmc_proposals::distributions::GaussianTarget;
use mcmc_proposals::metropolis_hastings::MetropolisHastings;
use mcmc_proposals::multivariate::MultivariateGaussianProposal;

let target = GaussianTarget::new(vec![0.0, 0.0], Covariance::identity(2)).unwrap();
let proposal = ScaleAdaptiveProposal::new(MultivariateGaussianProposal::random_walk(
    Covariance::identity(2),
));
let mut mh = MetropolisHastings::new(target, proposal, &[0.0, 0.0], 2)
    .unwrap()
    .set_seed(42);
let samples = mh.run(1_500, 1_000).unwrap();
assert_eq!(samples.len(), 2);
assert_eq!(samples[0].nrows(), 500);
```
*/

use log::{info, warn};
use rand::prelude::*;

use crate::core::{HasChains, MarkovChain};
use crate::distributions::{Proposal, Target};
use crate::error::Result;
use crate::params::check_dim;
use crate::stats::AcceptanceTracker;

/// When and how often the chains adapt their proposals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MHSettings {
    /// Number of initial steps during which the proposal may adapt.
    pub warmup: usize,
    /// Steps between two adaptation points.
    pub adapt_every: usize,
}

impl Default for MHSettings {
    fn default() -> Self {
        Self {
            warmup: 1_000,
            adapt_every: 100,
        }
    }
}

/// Runs independent Metropolis–Hastings chains that share a target and start
/// from the same state.
#[derive(Debug, Clone)]
pub struct MetropolisHastings<D, Q> {
    /// The target distribution we want to sample from.
    pub target: D,
    /// The proposal every chain starts from.
    pub proposal: Q,
    /// The vector of independent Markov chains.
    pub chains: Vec<MHMarkovChain<D, Q>>,
    /// The global random seed.
    pub seed: u64,
}

/// A single Markov chain for the Metropolis–Hastings algorithm.
#[derive(Debug, Clone)]
pub struct MHMarkovChain<D, Q> {
    pub target: D,
    pub proposal: Q,
    pub current_state: Vec<f64>,
    /// The chain-specific random seed.
    pub seed: u64,
    pub rng: SmallRng,
    settings: MHSettings,
    window: AcceptanceTracker,
    iteration: usize,
    n_accepted: usize,
    converged: bool,
}

impl<D, Q> MetropolisHastings<D, Q>
where
    D: Target + Clone + Send,
    Q: Proposal + Clone,
{
    /// Creates `n_chains` chains starting at `initial_state`, with default settings.
    pub fn new(target: D, proposal: Q, initial_state: &[f64], n_chains: usize) -> Result<Self> {
        check_dim(proposal.dim(), initial_state.len())?;
        let chains = (0..n_chains)
            .map(|_| MHMarkovChain::new(target.clone(), proposal.clone(), initial_state))
            .collect::<Result<_>>()?;
        let seed = thread_rng().gen::<u64>();

        Ok(Self {
            target,
            proposal,
            chains,
            seed,
        })
    }

    pub fn with_settings(mut self, settings: MHSettings) -> Self {
        for chain in &mut self.chains {
            chain.set_settings(settings);
        }
        self
    }

    /// Sets a new global seed; chain `i` receives `seed + i`.
    ///
    /// ```rust
    /// use mcmc_proposals::distributions::GaussianTarget;
    /// use mcmc_proposals::covariance::Covariance;
    /// use mcmc_proposals::metropolis_hastings::MetropolisHastings;
    /// use mcmc_proposals::params::ParameterRange;
    /// use mcmc_proposals::univariate::GaussianProposal;
    ///
    /// let target = GaussianTarget::new(vec![0.0], Covariance::identity(1)).unwrap();
    /// let proposal = GaussianProposal::new(vec![ParameterRange::new(-5.0, 5.0)], 0.4).unwrap();
    /// let mh = MetropolisHastings::new(target, proposal, &[0.0], 2).unwrap().set_seed(42);
    /// assert_eq!(mh.chains[0].seed, 42);
    /// assert_eq!(mh.chains[1].seed, 43);
    /// ```
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        for (i, chain) in self.chains.iter_mut().enumerate() {
            chain.reseed(seed.wrapping_add(i as u64));
        }
        self
    }
}

impl<D, Q> HasChains for MetropolisHastings<D, Q>
where
    D: Target + Clone + Send,
    Q: Proposal + Clone,
{
    type Chain = MHMarkovChain<D, Q>;

    fn chains_mut(&mut self) -> &mut Vec<Self::Chain> {
        &mut self.chains
    }
}

impl<D, Q> MHMarkovChain<D, Q>
where
    D: Target + Clone,
    Q: Proposal + Clone,
{
    pub fn new(target: D, proposal: Q, initial_state: &[f64]) -> Result<Self> {
        check_dim(proposal.dim(), initial_state.len())?;
        let settings = MHSettings::default();
        let mut chain = Self {
            target,
            proposal,
            current_state: initial_state.to_vec(),
            seed: 0,
            rng: SmallRng::from_entropy(),
            settings,
            window: AcceptanceTracker::new(initial_state.len(), settings.adapt_every),
            iteration: 0,
            n_accepted: 0,
            converged: false,
        };
        chain.reseed(thread_rng().gen::<u64>());
        Ok(chain)
    }

    pub fn set_settings(&mut self, settings: MHSettings) {
        let settings = MHSettings {
            adapt_every: settings.adapt_every.max(1),
            ..settings
        };
        self.settings = settings;
        self.window = AcceptanceTracker::new(self.current_state.len(), settings.adapt_every);
    }

    /// Reseeds the chain and derives a fresh seed for its proposal.
    pub fn reseed(&mut self, seed: u64) {
        self.seed = seed;
        self.rng = SmallRng::seed_from_u64(seed);
        let proposal_seed = self.rng.gen::<u64>();
        self.proposal.reseed(proposal_seed);
    }

    /// Whether the proposal has stopped adapting.
    pub fn is_converged(&self) -> bool {
        self.converged
    }

    /// Fraction of all steps so far that were accepted.
    pub fn acceptance_rate(&self) -> f64 {
        if self.iteration == 0 {
            0.0
        } else {
            self.n_accepted as f64 / self.iteration as f64
        }
    }

    fn adapt(&mut self) -> Result<()> {
        let efficiency = self.window.efficiency();
        let samples = self.window.samples();
        match self.proposal.adapt(efficiency, Some(samples.view())) {
            Ok(converged) => {
                if converged {
                    info!(
                        "chain with seed {} converged its proposal after {} steps at eff={efficiency:.3}",
                        self.seed, self.iteration
                    );
                }
                self.converged = converged;
            }
            Err(e) if e.is_recoverable() => {
                warn!("chain with seed {} keeps its proposal: {e}", self.seed);
            }
            Err(e) => return Err(e),
        }
        self.window.clear();
        Ok(())
    }
}

impl<D, Q> MarkovChain for MHMarkovChain<D, Q>
where
    D: Target + Clone,
    Q: Proposal + Clone,
{
    /**
    Performs one Metropolis–Hastings update step.

    A candidate is drawn from the proposal and accepted with probability

    \[
    \min\left(1, \frac{p(\text{proposed})\, q(\text{current} \mid \text{proposed})}
                      {p(\text{current})\, q(\text{proposed} \mid \text{current})}\right)
    \]

    During warmup the outcome is recorded and the proposal adapted at the
    configured interval.
    */
    fn step(&mut self) -> Result<&[f64]> {
        let proposed = self.proposal.generate(&self.current_state)?;
        let current_lp = self.target.unnorm_log_prob(&self.current_state);
        let proposed_lp = self.target.unnorm_log_prob(&proposed);
        let log_q_forward = self.proposal.log_density(&proposed, &self.current_state)?;
        let log_q_backward = self.proposal.log_density(&self.current_state, &proposed)?;
        let log_accept_ratio = (proposed_lp + log_q_backward) - (current_lp + log_q_forward);
        let u: f64 = self.rng.gen();
        let accepted = log_accept_ratio > u.ln();
        if accepted {
            self.current_state = proposed;
            self.n_accepted += 1;
        }
        self.iteration += 1;

        if !self.converged && self.iteration <= self.settings.warmup {
            self.window.record(&self.current_state, accepted);
            if self.window.steps() >= self.settings.adapt_every {
                self.adapt()?;
            }
        }
        Ok(&self.current_state)
    }

    fn current_state(&self) -> &[f64] {
        &self.current_state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adaptive::ScaleAdaptiveProposal;
    use crate::core::ChainRunner;
    use crate::covariance::Covariance;
    use crate::distributions::GaussianTarget;
    use crate::error::ProposalError;
    use crate::multivariate::MultivariateGaussianProposal;
    use crate::params::ParameterRange;
    use crate::univariate::GaussianProposal;
    use approx::assert_abs_diff_eq;
    use ndarray::{arr1, arr2, concatenate, ArrayView2, Axis};
    use ndarray_stats::CorrelationExt;

    fn correlated_target() -> GaussianTarget {
        let cov = Covariance::from_rows(&[vec![4.0, 2.0], vec![2.0, 3.0]]).unwrap();
        GaussianTarget::new(vec![0.0, 1.0], cov).unwrap()
    }

    fn run_gaussian_2d_test<Q: Proposal + Clone>(proposal: Q, n_steps: usize, n_chains: usize) {
        const BURNIN: usize = 2_000;
        const SEED: u64 = 42;

        let target = correlated_target();
        let mut mh = MetropolisHastings::new(target, proposal, &[0.0, 0.0], n_chains)
            .unwrap()
            .set_seed(SEED);
        let samples = mh.run(n_steps + BURNIN, BURNIN).unwrap();
        let views: Vec<_> = samples.iter().map(|s| s.view()).collect();
        let stacked = concatenate(Axis(0), &views).unwrap();
        assert_eq!(stacked.nrows(), n_steps * n_chains);

        let mean = stacked.mean_axis(Axis(0)).unwrap();
        let cov = stacked.t().cov(1.0).unwrap();
        assert_abs_diff_eq!(mean, arr1(&[0.0, 1.0]), epsilon = 0.3);
        assert_abs_diff_eq!(cov, arr2(&[[4.0, 2.0], [2.0, 3.0]]), epsilon = 0.6);
    }

    #[test]
    fn univariate_random_walk_recovers_target() {
        let proposal =
            GaussianProposal::new(vec![ParameterRange::new(-5.0, 5.0); 2], 0.2).unwrap();
        run_gaussian_2d_test(proposal, 40_000, 2);
    }

    #[test]
    fn adaptive_multivariate_recovers_target() {
        let proposal = ScaleAdaptiveProposal::new(MultivariateGaussianProposal::random_walk(
            Covariance::identity(2),
        ));
        run_gaussian_2d_test(proposal, 40_000, 4);
    }

    #[test]
    fn independence_sampler_uses_hastings_correction() {
        // a wide independence proposal off the target mode still samples the target
        let cov = Covariance::from_std(&[4.0, 4.0]).unwrap();
        let proposal = MultivariateGaussianProposal::independence(cov, vec![1.0, 0.0]).unwrap();
        run_gaussian_2d_test(proposal, 60_000, 2);
    }

    #[test]
    fn same_seed_same_samples() {
        let proposal = ScaleAdaptiveProposal::new(MultivariateGaussianProposal::random_walk(
            Covariance::identity(2),
        ));
        let mut a = MetropolisHastings::new(correlated_target(), proposal.clone(), &[0.0, 0.0], 2)
            .unwrap()
            .set_seed(7);
        let mut b = MetropolisHastings::new(correlated_target(), proposal, &[0.0, 0.0], 2)
            .unwrap()
            .set_seed(7);
        assert_eq!(a.run(500, 0).unwrap(), b.run(500, 0).unwrap());
    }

    #[test]
    fn warmup_adapts_until_converged() {
        let proposal = ScaleAdaptiveProposal::new(MultivariateGaussianProposal::random_walk(
            Covariance::identity(2).scaled(100.0).unwrap(),
        ));
        let mut mh = MetropolisHastings::new(correlated_target(), proposal, &[0.0, 0.0], 1)
            .unwrap()
            .with_settings(MHSettings {
                warmup: 20_000,
                adapt_every: 200,
            })
            .set_seed(3);
        mh.run(20_000, 0).unwrap();
        let chain = &mh.chains[0];
        assert!(chain.is_converged());
        assert!(chain.proposal.state().cumulative_scale < 1.0);
    }

    /// Random walk whose covariance updates are always rejected.
    #[derive(Debug, Clone)]
    struct RejectingProposal {
        inner: GaussianProposal,
        attempts: usize,
    }

    impl Proposal for RejectingProposal {
        fn dim(&self) -> usize {
            self.inner.dim()
        }

        fn generate(&mut self, current: &[f64]) -> Result<Vec<f64>> {
            self.inner.generate(current)
        }

        fn log_density(&self, x: &[f64], p: &[f64]) -> Result<f64> {
            self.inner.log_density(x, p)
        }

        fn adapt(&mut self, _efficiency: f64, _samples: Option<ArrayView2<f64>>) -> Result<bool> {
            self.attempts += 1;
            Err(ProposalError::UpdateRejected(Box::new(
                ProposalError::NotPositiveDefinite,
            )))
        }

        fn info_string(&self) -> String {
            self.inner.info_string()
        }

        fn reseed(&mut self, seed: u64) {
            self.inner.reseed(seed)
        }
    }

    #[test]
    fn rejected_updates_do_not_stop_the_chain() {
        let proposal = RejectingProposal {
            inner: GaussianProposal::new(vec![ParameterRange::new(-5.0, 5.0); 2], 0.2).unwrap(),
            attempts: 0,
        };
        let mut mh = MetropolisHastings::new(correlated_target(), proposal, &[0.0, 0.0], 1)
            .unwrap()
            .with_settings(MHSettings {
                warmup: 500,
                adapt_every: 50,
            })
            .set_seed(5);
        let samples = mh.run(1_000, 0).unwrap();
        assert_eq!(samples[0].nrows(), 1_000);
        let chain = &mh.chains[0];
        assert_eq!(chain.proposal.attempts, 10);
        assert!(!chain.is_converged());
        assert!(chain.acceptance_rate() > 0.0);
    }

    #[test]
    fn initial_state_must_match_proposal() {
        let proposal = GaussianProposal::new(vec![ParameterRange::new(-1.0, 1.0); 3], 0.4).unwrap();
        assert_eq!(
            MetropolisHastings::new(correlated_target(), proposal, &[0.0, 0.0], 1).unwrap_err(),
            ProposalError::DimensionMismatch { expected: 3, found: 2 }
        );
    }

    #[test]
    fn chains_get_consecutive_seeds() {
        let proposal = GaussianProposal::new(vec![ParameterRange::new(-1.0, 1.0); 2], 0.4).unwrap();
        let mut mh = MetropolisHastings::new(correlated_target(), proposal, &[0.0, 0.0], 3)
            .unwrap()
            .set_seed(10);
        let seeds: Vec<u64> = mh.chains_mut().iter().map(|c| c.seed).collect();
        assert_eq!(seeds, vec![10, 11, 12]);
        let mut chain = mh.chains[0].clone();
        let state = chain.step().unwrap();
        assert_eq!(state.len(), 2);
    }
}
