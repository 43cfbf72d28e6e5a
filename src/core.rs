use indicatif::ProgressBar;
use indicatif::{MultiProgress, ProgressStyle};
use ndarray::{s, Array2};
use rayon::prelude::*;

use crate::error::Result;

pub trait MarkovChain {
    /// Does one iteration of the chain, returning the new current state.
    fn step(&mut self) -> Result<&[f64]>;

    /// Get the current state without stepping.
    fn current_state(&self) -> &[f64];
}

/// Runs `n_steps` iterations and returns them, one row per step.
pub fn run_chain<M>(chain: &mut M, n_steps: usize) -> Result<Array2<f64>>
where
    M: MarkovChain,
{
    let dim = chain.current_state().len();
    let mut out = Array2::<f64>::zeros((n_steps, dim));

    for mut row in out.rows_mut() {
        let state = chain.step()?;
        row.iter_mut().zip(state).for_each(|(dst, &src)| *dst = src);
    }

    Ok(out)
}

pub fn run_chain_with_progress<M>(
    chain: &mut M,
    n_steps: usize,
    pb: &ProgressBar,
) -> Result<Array2<f64>>
where
    M: MarkovChain,
{
    let dim = chain.current_state().len();
    let mut out = Array2::<f64>::zeros((n_steps, dim));

    pb.set_length(n_steps as u64);

    for mut row in out.rows_mut() {
        let state = chain.step()?;
        row.iter_mut().zip(state).for_each(|(dst, &src)| *dst = src);
        pb.inc(1);
    }

    Ok(out)
}

fn discard_prefix(samples: Array2<f64>, discard: usize) -> Array2<f64> {
    let start = discard.min(samples.nrows());
    samples.slice(s![start.., ..]).to_owned()
}

/// Anything that owns multiple independent Markov chains.
pub trait HasChains {
    type Chain: MarkovChain + Send;

    fn chains_mut(&mut self) -> &mut Vec<Self::Chain>;
}

pub trait ChainRunner: HasChains {
    /// Runs the chains in parallel for `n_steps` each and drops the first
    /// `discard` rows of every chain.
    fn run(&mut self, n_steps: usize, discard: usize) -> Result<Vec<Array2<f64>>> {
        let results: Vec<Array2<f64>> = self
            .chains_mut()
            .par_iter_mut()
            .map(|chain| run_chain(chain, n_steps))
            .collect::<Result<_>>()?;

        Ok(results
            .into_iter()
            .map(|samples| discard_prefix(samples, discard))
            .collect())
    }

    fn run_with_progress(&mut self, n_steps: usize, discard: usize) -> Result<Vec<Array2<f64>>> {
        let multi = MultiProgress::new();
        let pb_style = ProgressStyle::default_bar()
            .template("{prefix} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");

        let results: Vec<Array2<f64>> = self
            .chains_mut()
            .par_iter_mut()
            .enumerate()
            .map(|(i, chain)| {
                let pb = multi.add(ProgressBar::new(n_steps as u64));
                pb.set_prefix(format!("Chain {i}"));
                pb.set_style(pb_style.clone());

                let samples = run_chain_with_progress(chain, n_steps, &pb);
                match &samples {
                    Ok(_) => pb.finish_with_message("Done!"),
                    Err(e) => pb.abandon_with_message(format!("failed: {e}")),
                }
                samples
            })
            .collect::<Result<_>>()?;

        Ok(results
            .into_par_iter()
            .map(|samples| discard_prefix(samples, discard))
            .collect())
    }
}

impl<T: HasChains> ChainRunner for T {}
