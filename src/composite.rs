/*!
Block-wise composition of proposals.

A [`CompositeProposal`] splits the parameter vector into contiguous blocks, in
the order the children are given, and lets every child propose its own block.
The candidate is the concatenation of the children's candidates and the log
density is the sum of the children's log densities over their own slices, so
symmetric and asymmetric children can be mixed freely.

```rust
use mcmc_proposals::composite::CompositeProposal;
use mcmc_proposals::covariance::Covariance;
use mcmc_proposals::distributions::Proposal;
use mcmc_proposals::multivariate::MultivariateGaussianProposal;
use mcmc_proposals::univariate::GaussianProposal;

let nuisance = GaussianProposal::fixed(vec![0.0], vec![1.0]).unwrap();
let physics = MultivariateGaussianProposal::random_walk(Covariance::identity(2)).with_start_index(1);
let mut proposal = CompositeProposal::new(vec![Box::new(nuisance), Box::new(physics)])
    .unwrap()
    .set_seed(1);
assert_eq!(proposal.dim(), 3);
assert_eq!(proposal.generate(&[0.0, 0.0, 0.0]).unwrap().len(), 3);
```
*/

use std::ops::Range;

use log::warn;
use ndarray::{s, ArrayView2};

use crate::distributions::Proposal;
use crate::error::{ProposalError, Result};
use crate::params::check_dim;

#[derive(Clone)]
struct Block {
    proposal: Box<dyn Proposal>,
    range: Range<usize>,
}

#[derive(Clone)]
pub struct CompositeProposal {
    blocks: Vec<Block>,
    dim: usize,
}

impl CompositeProposal {
    /// Lays the children out back to back. A child that records its own start
    /// index must sit at exactly that offset.
    pub fn new(children: Vec<Box<dyn Proposal>>) -> Result<Self> {
        let mut blocks = Vec::with_capacity(children.len());
        let mut offset = 0;
        for proposal in children {
            if let Some(start) = proposal.block_start() {
                if start != offset {
                    return Err(ProposalError::BlockMisaligned {
                        expected: offset,
                        found: start,
                    });
                }
            }
            let end = offset + proposal.dim();
            blocks.push(Block {
                proposal,
                range: offset..end,
            });
            offset = end;
        }
        Ok(Self {
            blocks,
            dim: offset,
        })
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Index range owned by each child, in order.
    pub fn block_ranges(&self) -> Vec<Range<usize>> {
        self.blocks.iter().map(|b| b.range.clone()).collect()
    }
}

impl std::fmt::Debug for CompositeProposal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeProposal")
            .field("blocks", &self.block_ranges())
            .finish()
    }
}

impl Proposal for CompositeProposal {
    fn dim(&self) -> usize {
        self.dim
    }

    fn generate(&mut self, current: &[f64]) -> Result<Vec<f64>> {
        check_dim(self.dim, current.len())?;
        let mut candidate = Vec::with_capacity(self.dim);
        for block in &mut self.blocks {
            let part = block.proposal.generate(&current[block.range.clone()])?;
            candidate.extend(part);
        }
        Ok(candidate)
    }

    fn log_density(&self, x: &[f64], p: &[f64]) -> Result<f64> {
        check_dim(self.dim, x.len())?;
        check_dim(self.dim, p.len())?;
        self.blocks.iter().try_fold(0.0, |acc, block| {
            let r = block.range.clone();
            Ok(acc + block.proposal.log_density(&x[r.clone()], &p[r])?)
        })
    }

    /// Adapts every child. Converged only when all children are; a rejected
    /// update in one child does not stop the others from adapting.
    fn adapt(&mut self, efficiency: f64, samples: Option<ArrayView2<f64>>) -> Result<bool> {
        if let Some(samples) = &samples {
            check_dim(self.dim, samples.ncols())?;
        }
        let mut converged = true;
        let mut rejected = None;
        for block in &mut self.blocks {
            let slice = samples
                .as_ref()
                .map(|s| s.slice(s![.., block.range.clone()]));
            match block.proposal.adapt(efficiency, slice) {
                Ok(done) => converged = converged && done,
                Err(e) if e.is_recoverable() => {
                    warn!("block {:?} kept its previous state: {e}", block.range);
                    converged = false;
                    rejected.get_or_insert(e);
                }
                Err(e) => return Err(e),
            }
        }
        match rejected {
            Some(e) => Err(e),
            None => Ok(converged),
        }
    }

    fn info_string(&self) -> String {
        let mut out = format!("CompositeProposal(npars={}, blocks={})\n", self.dim, self.len());
        for block in &self.blocks {
            out.push_str(&format!(
                "  [{}..{}] {}",
                block.range.start,
                block.range.end,
                block.proposal.info_string()
            ));
            if !out.ends_with('\n') {
                out.push('\n');
            }
        }
        out
    }

    fn reseed(&mut self, seed: u64) {
        for (i, block) in self.blocks.iter_mut().enumerate() {
            block.proposal.reseed(seed.wrapping_add(i as u64));
        }
    }
}
