//! The epoch loop that drives a compiled [`Sequential`](crate::nn::Sequential).

mod shuffle;
mod trainer;

use std::time::Duration;

pub use shuffle::shuffle_lockstep;
pub use trainer::Trainer;

/// Settings for one [`Trainer::fit`] run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainConfig {
    pub epochs: usize,
    /// Samples per optimizer step. `0` and `1` train sample by sample.
    pub batch_size: usize,
    pub shuffle: bool,
    pub track_history: bool,
    /// Seeds the per-epoch shuffle.
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            epochs: 1,
            batch_size: 1,
            shuffle: true,
            track_history: true,
            seed: 42,
        }
    }
}

impl TrainConfig {
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_history(mut self, track_history: bool) -> Self {
        self.track_history = track_history;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn is_batched(&self) -> bool {
        self.batch_size > 1
    }
}

/// What the per-epoch callback sees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochInfo<T> {
    /// Zero-based.
    pub epoch: usize,
    /// Mean loss over the epoch's samples.
    pub loss: T,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct History<T> {
    pub losses: Vec<T>,
}

impl<T: Copy> History<T> {
    pub fn last_loss(&self) -> Option<T> {
        self.losses.last().copied()
    }

    pub fn epochs(&self) -> usize {
        self.losses.len()
    }
}
