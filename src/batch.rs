//! Buffered multivariate normal deviates.
//!
//! Drawing correlated normals costs a matrix-vector product per draw. The
//! [`BatchDrawGenerator`] amortizes this by computing a whole block of
//! zero-mean deviates `L Z` at once (`L` the covariance factor, `Z` a
//! `dim x batch_size` block of standard normals) and handing them out one
//! column at a time. The sequence never ends: an exhausted block is replaced
//! on the next call. [`BatchDrawGenerator::restart`] discards every buffered
//! draw, and must be called whenever the covariance changes.

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::StandardNormal;

/// Number of draws computed per block unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

#[derive(Debug, Clone, PartialEq)]
pub struct BatchDrawGenerator {
    factor: DMatrix<f64>,
    batch_size: usize,
    buffer: DMatrix<f64>,
    cursor: usize,
}

impl BatchDrawGenerator {
    /// Generator over `N(0, L L^T)`. Nothing is drawn until the first call to `next`.
    pub fn new(factor: DMatrix<f64>, batch_size: usize) -> Self {
        let dim = factor.nrows();
        Self {
            factor,
            batch_size: batch_size.max(1),
            buffer: DMatrix::zeros(dim, 0),
            cursor: 0,
        }
    }

    pub fn dim(&self) -> usize {
        self.factor.nrows()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Draws still buffered from the current block.
    pub fn buffered(&self) -> usize {
        self.buffer.ncols() - self.cursor
    }

    /// Next zero-mean deviate, computing a new block if the current one is used up.
    pub fn next<R: Rng + ?Sized>(&mut self, rng: &mut R) -> DVector<f64> {
        if self.cursor >= self.buffer.ncols() {
            self.refill(rng);
        }
        let draw = self.buffer.column(self.cursor).into_owned();
        self.cursor += 1;
        draw
    }

    /// Switches to a new factor and drops all buffered draws.
    pub fn restart(&mut self, factor: DMatrix<f64>) {
        self.factor = factor;
        self.clear();
    }

    /// Drops all buffered draws but keeps the factor.
    pub fn clear(&mut self) {
        self.buffer = DMatrix::zeros(self.dim(), 0);
        self.cursor = 0;
    }

    pub fn set_batch_size(&mut self, batch_size: usize) {
        self.batch_size = batch_size.max(1);
        self.clear();
    }

    fn refill<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let z = DMatrix::<f64>::from_fn(self.dim(), self.batch_size, |_, _| rng.sample(StandardNormal));
        self.buffer = &self.factor * z;
        self.cursor = 0;
    }
}
