//! Bounded history of recent trace anomaly scores, used to derive the
//! service's current integrity gauge.

use std::collections::VecDeque;

/// Fixed-capacity, newest-last ring of scores.
///
/// Pushing past capacity drops the oldest entry first (FIFO), mirroring the
/// sentinel's bounded in-memory history buffer.
pub struct ScoreHistory {
    capacity: usize,
    scores: VecDeque<f64>,
}

impl ScoreHistory {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, scores: VecDeque::with_capacity(capacity) }
    }

    pub fn push(&mut self, score: f64) {
        if self.scores.len() >= self.capacity {
            self.scores.pop_front();
        }
        self.scores.push_back(score);
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn mean(&self) -> f64 {
        if self.scores.is_empty() {
            return 0.0;
        }
        self.scores.iter().sum::<f64>() / self.scores.len() as f64
    }

    /// Integrity score: `1 / (1 + mean(history))`, in `(0, 1]`.
    ///
    /// `1.0` when the history is empty (nothing observed yet ⇒ assume healthy).
    pub fn integrity_score(&self) -> f64 {
        1.0 / (1.0 + self.mean())
    }
}
