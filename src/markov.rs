//! Sparse, incremental Markov model over a sliding window of finalized traces.
//!
//! Maintains transition counts for a bounded number of the most recent trace
//! sequences, Laplace-smooths the resulting transition probabilities, and
//! scores new traces against the current model before learning from them.

use std::collections::{HashMap, HashSet, VecDeque};

use serde_json::Value;

use crate::event::{RawEvent, State};

/// Fixed penalty applied for a transition whose probability is zero.
/// Only reachable when the state set is empty — a safeguard, not a normal path.
const ZERO_PROBABILITY_PENALTY: f64 = 100.0;

/// Sparse, incremental Markov model with sliding-window expiration.
pub struct MarkovEngine {
    alpha: f64,
    window_capacity: usize,
    edge_counts: HashMap<(State, State), u64>,
    out_counts: HashMap<State, u64>,
    states: HashSet<State>,
    window: VecDeque<Vec<State>>,
}

impl MarkovEngine {
    pub fn new(alpha: f64, window_capacity: usize) -> Self {
        Self {
            alpha,
            window_capacity,
            edge_counts: HashMap::new(),
            out_counts: HashMap::new(),
            states: HashSet::new(),
            window: VecDeque::new(),
        }
    }

    pub fn window_size(&self) -> usize {
        self.window.len()
    }

    pub fn window_capacity(&self) -> usize {
        self.window_capacity
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_counts.len()
    }

    /// Map each event to its `State`; events raising during extraction are
    /// skipped rather than aborting the whole sequence.
    pub fn extract_sequence(events: &[Value]) -> Vec<State> {
        events.iter().map(|event| RawEvent(event.clone()).state()).collect()
    }

    /// Ingest a finalized trace into the current window.
    ///
    /// No-op if the trace's sequence is empty.
    pub fn add_trace(&mut self, events: &[Value]) {
        let sequence = Self::extract_sequence(events);
        if sequence.is_empty() {
            return;
        }

        for pair in sequence.windows(2) {
            let (src, dst) = (pair[0].clone(), pair[1].clone());
            *self.edge_counts.entry((src.clone(), dst.clone())).or_insert(0) += 1;
            *self.out_counts.entry(src.clone()).or_insert(0) += 1;
            self.states.insert(src);
            self.states.insert(dst);
        }

        self.window.push_back(sequence);
    }

    /// Remove the oldest sequence from the window and decrement its counts.
    ///
    /// No-op if the window is empty. Counts clamp at zero as a safeguard;
    /// under the add/expire symmetry invariant this clamp is never exercised.
    pub fn expire_oldest(&mut self) {
        let Some(sequence) = self.window.pop_front() else {
            return;
        };

        for pair in sequence.windows(2) {
            let (src, dst) = (&pair[0], &pair[1]);
            if let Some(count) = self.edge_counts.get_mut(&(src.clone(), dst.clone())) {
                *count = count.saturating_sub(1);
            }
            if let Some(count) = self.out_counts.get_mut(src) {
                *count = count.saturating_sub(1);
            }
        }
    }

    /// Laplace-smoothed `P(dst | src)`.
    ///
    /// Returns `0.0` if no state has ever been observed; otherwise strictly
    /// positive whenever `alpha > 0`.
    pub fn get_probability(&self, src: &str, dst: &str) -> f64 {
        let num_states = self.states.len();
        if num_states == 0 {
            return 0.0;
        }

        let count = self
            .edge_counts
            .get(&(src.to_owned(), dst.to_owned()))
            .copied()
            .unwrap_or(0) as f64;
        let out_total = self.out_counts.get(src).copied().unwrap_or(0) as f64;

        (count + self.alpha) / (out_total + self.alpha * num_states as f64)
    }

    /// Mean per-step surprisal of the trace's state sequence under the
    /// current model. Higher ⇒ more anomalous. `0.0` for sequences shorter
    /// than two states.
    pub fn score_trace(&self, events: &[Value]) -> f64 {
        let sequence = Self::extract_sequence(events);
        if sequence.len() < 2 {
            return 0.0;
        }

        let mut total = 0.0;
        for pair in sequence.windows(2) {
            let probability = self.get_probability(&pair[0], &pair[1]);
            total += if probability > 0.0 {
                -probability.ln()
            } else {
                ZERO_PROBABILITY_PENALTY
            };
        }

        total / sequence.len() as f64
    }
}
