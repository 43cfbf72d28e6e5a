//! Pins selected parameters of any proposal to constants.
//!
//! [`FixedSubsetProposal`] keeps the wrapped proposal working on the full
//! vector, but overwrites every pinned position with its literal value on the
//! way in (the current state, both density arguments) and on the way out (the
//! candidate). Pinned dimensions therefore never move.

use std::fmt::Write;

use ndarray::ArrayView2;

use crate::distributions::Proposal;
use crate::error::Result;
use crate::params::check_dim;

#[derive(Debug, Clone)]
pub struct FixedSubsetProposal<P> {
    inner: P,
    fixed: Vec<Option<f64>>,
}

impl<P: Proposal> FixedSubsetProposal<P> {
    /// `fixed[i]` is `Some(value)` to pin parameter `i`, `None` to leave it free.
    pub fn new(inner: P, fixed: Vec<Option<f64>>) -> Result<Self> {
        check_dim(inner.dim(), fixed.len())?;
        Ok(Self { inner, fixed })
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn fixed(&self) -> &[Option<f64>] {
        &self.fixed
    }

    fn pin(&self, values: &[f64]) -> Result<Vec<f64>> {
        check_dim(self.fixed.len(), values.len())?;
        Ok(values
            .iter()
            .zip(&self.fixed)
            .map(|(&v, pinned)| pinned.unwrap_or(v))
            .collect())
    }
}

impl<P: Proposal + Clone + 'static> Proposal for FixedSubsetProposal<P> {
    fn dim(&self) -> usize {
        self.fixed.len()
    }

    fn generate(&mut self, current: &[f64]) -> Result<Vec<f64>> {
        let current = self.pin(current)?;
        let candidate = self.inner.generate(&current)?;
        self.pin(&candidate)
    }

    fn log_density(&self, x: &[f64], p: &[f64]) -> Result<f64> {
        self.inner.log_density(&self.pin(x)?, &self.pin(p)?)
    }

    fn adapt(&mut self, efficiency: f64, samples: Option<ArrayView2<f64>>) -> Result<bool> {
        self.inner.adapt(efficiency, samples)
    }

    fn info_string(&self) -> String {
        let mut out = String::from("FixedSubsetProposal wrapping ");
        out.push_str(&self.inner.info_string());
        if !out.ends_with('\n') {
            out.push('\n');
        }
        for (i, value) in self.fixed.iter().enumerate() {
            if let Some(value) = value {
                let _ = writeln!(out, "    {i} : fixed={value}");
            }
        }
        out
    }

    fn reseed(&mut self, seed: u64) {
        self.inner.reseed(seed)
    }

    fn block_start(&self) -> Option<usize> {
        self.inner.block_start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::covariance::Covariance;
    use crate::error::ProposalError;
    use crate::multivariate::MultivariateGaussianProposal;
    use crate::params::ParameterRange;
    use crate::univariate::GaussianProposal;
    use proptest::prelude::*;

    fn walk(n: usize) -> GaussianProposal {
        GaussianProposal::new(vec![ParameterRange::new(-5.0, 5.0); n], 0.4).unwrap()
    }

    #[test]
    fn configuration_must_cover_every_parameter() {
        assert_eq!(
            FixedSubsetProposal::new(walk(3), vec![None, Some(1.0)]).unwrap_err(),
            ProposalError::DimensionMismatch { expected: 3, found: 2 }
        );
        let mut proposal = FixedSubsetProposal::new(walk(2), vec![None, Some(1.0)]).unwrap();
        assert!(proposal.generate(&[0.0, 0.0, 0.0]).is_err());
        assert!(proposal.log_density(&[0.0, 0.0], &[0.0]).is_err());
    }

    #[test]
    fn pinned_dimension_does_not_contribute_to_density() {
        let proposal = FixedSubsetProposal::new(walk(2), vec![Some(3.0), None]).unwrap();
        let a = proposal.log_density(&[-4.0, 1.0], &[2.0, 0.5]).unwrap();
        let b = proposal.log_density(&[3.0, 1.0], &[3.0, 0.5]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn wraps_correlated_proposals() {
        let cov = Covariance::from_rows(&[vec![1.0, 0.9], vec![0.9, 1.0]]).unwrap();
        let inner = MultivariateGaussianProposal::random_walk(cov);
        let mut proposal = FixedSubsetProposal::new(inner, vec![None, Some(-2.0)])
            .unwrap()
            .set_seed(3);
        for _ in 0..20 {
            assert_eq!(proposal.generate(&[0.0, 7.0]).unwrap()[1], -2.0);
        }
        assert!(proposal.info_string().contains("1 : fixed=-2"));
    }

    fn config() -> impl Strategy<Value = Vec<Option<f64>>> {
        proptest::collection::vec(proptest::option::of(-10.0f64..10.0), 1..6)
    }

    proptest! {
        #[test]
        fn pinned_positions_never_move(
            fixed in config(),
            seed in any::<u64>(),
            start in proptest::collection::vec(-5.0f64..5.0, 6),
        ) {
            let n = fixed.len();
            let mut proposal = FixedSubsetProposal::new(walk(n), fixed.clone())
                .unwrap()
                .set_seed(seed);
            let current = &start[..n];
            let candidate = proposal.generate(current).unwrap();
            prop_assert_eq!(candidate.len(), n);
            for (i, pinned) in fixed.iter().enumerate() {
                if let Some(v) = pinned {
                    prop_assert_eq!(candidate[i], *v);
                }
            }
            // density sees the pinned values whatever the caller passes
            let lp = proposal.log_density(&candidate, current).unwrap();
            let repinned: Vec<f64> = current
                .iter()
                .zip(&fixed)
                .map(|(&c, f)| f.unwrap_or(c))
                .collect();
            prop_assert_eq!(lp, proposal.inner().log_density(&candidate, &repinned).unwrap());
        }
    }
}
