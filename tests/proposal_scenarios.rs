//! End-to-end checks of the proposal capability set through the public API.
//!
//! 1. Derived widths and seeded reproducibility of the univariate proposal.
//! 2. The unnormalized density of the multivariate proposal.
//! 3. Generated candidates always match the dimension of the current state.
//! 4. Every proposal family fails at construction on invalid widths or covariances.

use mcmc_proposals::adaptive::{EmpiricalAdaptiveProposal, ScaleAdaptiveProposal};
use mcmc_proposals::composite::CompositeProposal;
use mcmc_proposals::covariance::Covariance;
use mcmc_proposals::distributions::Proposal;
use mcmc_proposals::error::ProposalError;
use mcmc_proposals::fixed::FixedSubsetProposal;
use mcmc_proposals::multivariate::MultivariateGaussianProposal;
use mcmc_proposals::params::{ParameterRange, DEFAULT_STEP_SIZE};
use mcmc_proposals::transform::{Transform, TransformedGaussianProposal};
use mcmc_proposals::univariate::GaussianProposal;

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    fn symmetric_ranges(n: usize) -> Vec<ParameterRange> {
        vec![ParameterRange::new(-5.0, 5.0); n]
    }

    #[test]
    fn default_step_size_derives_widths_and_reproduces() {
        let build = || {
            GaussianProposal::new(symmetric_ranges(2), DEFAULT_STEP_SIZE)
                .unwrap()
                .set_seed(2024)
        };
        let mut a = build();
        let mut b = build();
        assert_eq!(a.sigma(), &[4.0, 4.0]);
        let first = a.generate(&[0.0, 0.0]).unwrap();
        assert_eq!(first, b.generate(&[0.0, 0.0]).unwrap());
        assert_ne!(first, a.generate(&[0.0, 0.0]).unwrap());
    }

    #[test]
    fn multivariate_density_is_quadratic_form() {
        let identity = Covariance::from_rows(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        let proposal = MultivariateGaussianProposal::independence(identity, vec![0.0, 0.0]).unwrap();
        assert_abs_diff_eq!(proposal.log_density(&[1.0, 0.0], &[0.0, 0.0]).unwrap(), -0.5);
    }

    #[test]
    fn invalid_configurations_fail_before_sampling() {
        assert!(matches!(
            GaussianProposal::with_sigma(symmetric_ranges(2), 0.4, &[Some(f64::INFINITY), None]),
            Err(ProposalError::InvalidSigma { index: 0, .. })
        ));
        assert!(matches!(
            GaussianProposal::with_sigma(symmetric_ranges(2), 0.4, &[None, Some(0.0)]),
            Err(ProposalError::InvalidSigma { index: 1, .. })
        ));
        assert!(matches!(
            GaussianProposal::fixed(vec![0.0; 3], vec![1.0; 2]),
            Err(ProposalError::SigmaLength { expected: 3, found: 2 })
        ));
        assert!(matches!(
            TransformedGaussianProposal::with_sigma(
                symmetric_ranges(1),
                0.1,
                &[Some(-1.0)],
                vec![Transform::identity()]
            ),
            Err(ProposalError::InvalidSigma { .. })
        ));
        assert_eq!(
            Covariance::from_rows(&[vec![1.0, 2.0], vec![2.0, 1.0]]).unwrap_err(),
            ProposalError::NotPositiveDefinite
        );
        assert!(matches!(
            Covariance::from_rows(&[vec![1.0, 0.5], vec![0.0, 1.0]]),
            Err(ProposalError::NotSymmetric { row: 0, col: 1 })
        ));
        assert!(matches!(
            Covariance::from_rows(&[vec![f64::NAN]]),
            Err(ProposalError::NonFiniteCovariance { row: 0, col: 0 })
        ));
        let walk = GaussianProposal::new(symmetric_ranges(2), 0.4).unwrap();
        assert!(FixedSubsetProposal::new(walk, vec![None]).is_err());
    }

    /// One proposal per family, with block offsets matching this order.
    fn every_family(n: usize) -> Vec<Box<dyn Proposal>> {
        let cov = Covariance::identity(n);
        let walk_at = |block: usize| {
            MultivariateGaussianProposal::random_walk(cov.clone()).with_start_index(block * n)
        };
        vec![
            Box::new(GaussianProposal::new(symmetric_ranges(n), 0.4).unwrap()),
            Box::new(GaussianProposal::fixed(vec![1.0; n], vec![0.5; n]).unwrap()),
            Box::new(
                TransformedGaussianProposal::new(
                    symmetric_ranges(n),
                    0.1,
                    vec![Transform::identity(); n],
                )
                .unwrap(),
            ),
            Box::new(walk_at(3)),
            Box::new(
                MultivariateGaussianProposal::independence(cov.clone(), vec![0.0; n])
                    .unwrap()
                    .with_start_index(4 * n),
            ),
            Box::new(ScaleAdaptiveProposal::new(walk_at(5))),
            Box::new(EmpiricalAdaptiveProposal::new(walk_at(6))),
            Box::new(
                FixedSubsetProposal::new(
                    GaussianProposal::new(symmetric_ranges(n), 0.4).unwrap(),
                    vec![None; n],
                )
                .unwrap(),
            ),
        ]
    }

    proptest! {
        #[test]
        fn candidates_keep_the_dimension(
            current in proptest::collection::vec(-4.0f64..4.0, 1..5),
            seed in any::<u64>(),
        ) {
            let n = current.len();
            for mut proposal in every_family(n) {
                proposal.reseed(seed);
                let candidate = proposal.generate(&current).unwrap();
                prop_assert_eq!(candidate.len(), n);
                prop_assert!(proposal.log_density(&candidate, &current).unwrap().is_finite());
            }
            let mut composite = CompositeProposal::new(every_family(n)).unwrap().set_seed(seed);
            let full: Vec<f64> = current.iter().cycle().take(composite.dim()).copied().collect();
            prop_assert_eq!(composite.generate(&full).unwrap().len(), 8 * n);
        }
    }
}
