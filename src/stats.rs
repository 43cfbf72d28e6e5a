//! Acceptance bookkeeping for adaptive sampling.

use std::collections::VecDeque;

use ndarray::Array2;

/// Counts accepted moves over a window of steps and keeps the states visited in
/// it, which is what an adaptive proposal needs at every adaptation point.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptanceTracker {
    n_params: usize,
    capacity: usize,
    steps: usize,
    accepted: usize,
    history: VecDeque<Vec<f64>>,
}

impl AcceptanceTracker {
    /// Window of at most `capacity` states of `n_params` parameters.
    pub fn new(n_params: usize, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            n_params,
            capacity,
            steps: 0,
            accepted: 0,
            history: VecDeque::with_capacity(capacity),
        }
    }

    /// Records the state after one step, and whether the step was accepted.
    pub fn record(&mut self, state: &[f64], accepted: bool) {
        debug_assert_eq!(state.len(), self.n_params);
        self.steps += 1;
        if accepted {
            self.accepted += 1;
        }
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(state.to_vec());
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn accepted(&self) -> usize {
        self.accepted
    }

    /// Fraction of accepted steps since the last reset, `0` before any step.
    pub fn efficiency(&self) -> f64 {
        if self.steps == 0 {
            0.0
        } else {
            self.accepted as f64 / self.steps as f64
        }
    }

    /// States in the window, one row per step, oldest first.
    pub fn samples(&self) -> Array2<f64> {
        let mut out = Array2::zeros((self.history.len(), self.n_params));
        for (mut row, state) in out.rows_mut().into_iter().zip(&self.history) {
            row.iter_mut().zip(state).for_each(|(dst, &src)| *dst = src);
        }
        out
    }

    pub fn clear(&mut self) {
        self.steps = 0;
        self.accepted = 0;
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn efficiency_counts_accepted_steps() {
        let mut tracker = AcceptanceTracker::new(1, 10);
        assert_eq!(tracker.efficiency(), 0.0);
        for i in 0..8 {
            tracker.record(&[i as f64], i % 4 == 0);
        }
        assert_eq!(tracker.steps(), 8);
        assert_eq!(tracker.accepted(), 2);
        assert_eq!(tracker.efficiency(), 0.25);
    }

    #[test]
    fn window_keeps_most_recent_states() {
        let mut tracker = AcceptanceTracker::new(2, 3);
        for i in 0..5 {
            tracker.record(&[i as f64, -(i as f64)], true);
        }
        assert_eq!(
            tracker.samples(),
            arr2(&[[2.0, -2.0], [3.0, -3.0], [4.0, -4.0]])
        );
        tracker.clear();
        assert_eq!(tracker.samples().nrows(), 0);
        assert_eq!(tracker.steps(), 0);
    }
}
