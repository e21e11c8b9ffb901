// ============================================================
// Layer 4 — Train/Validation/Test Splitter
// ============================================================
// Shuffles samples with a fixed seed and splits them into:
//   - Training set:   used to update model weights
//   - Validation set: used to pick the best checkpoint
//   - Test set:       held out for the final report
//
// Default ratio: 80% train, then the remaining 20% is halved
// into 10% validation and 10% test.
//
// The folder scan is ordered by task, so without shuffling the
// held-out sets would only contain Trunk2 photographs.
//
// The RNG is seeded so the same data directory always produces
// the same split (and a resumed run sees the same sets).
//
// Reference: rand crate documentation (SliceRandom, StdRng)

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};

/// Shuffle `samples` with `seed` and split into (train, rest).
///
/// # Arguments
/// * `samples`        - All available samples (consumed by this function)
/// * `train_fraction` - Proportion for training, e.g. 0.8 = 80%
pub fn split_train_val<T>(mut samples: Vec<T>, train_fraction: f64, seed: u64) -> (Vec<T>, Vec<T>) {
    let mut rng = StdRng::seed_from_u64(seed);
    samples.shuffle(&mut rng);

    let total    = samples.len();
    let split_at = ((total as f64) * train_fraction).round() as usize;
    let split_at = split_at.min(total);

    // After this: samples = [0..split_at], rest = [split_at..total]
    let rest = samples.split_off(split_at);

    tracing::debug!(
        "Dataset split: {} / {} ({}% / {}%)",
        samples.len(),
        rest.len(),
        (samples.len() * 100) / total.max(1),
        (rest.len()    * 100) / total.max(1),
    );

    (samples, rest)
}

/// The three sets a training run works with
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Splits<T> {
    pub train: Vec<T>,
    pub val:   Vec<T>,
    pub test:  Vec<T>,
}

/// Split into train / val / test. `held_out_fraction` of the data is
/// held out and then divided equally between validation and test.
pub fn split_three<T>(samples: Vec<T>, held_out_fraction: f64, seed: u64) -> Splits<T> {
    let (train, held_out) = split_train_val(samples, 1.0 - held_out_fraction, seed);
    let (val, test)       = split_train_val(held_out, 0.5, seed);
    Splits { train, val, test }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correct_split_sizes() {
        let items: Vec<usize> = (0..100).collect();
        let (train, val)      = split_train_val(items, 0.8, 7);
        assert_eq!(train.len(), 80);
        assert_eq!(val.len(),   20);
    }

    #[test]
    fn test_all_items_preserved() {
        let items: Vec<usize> = (0..50).collect();
        let splits = split_three(items, 0.2, 100);
        let mut all: Vec<usize> = splits.train.iter()
            .chain(&splits.val)
            .chain(&splits.test)
            .copied()
            .collect();
        all.sort();
        assert_eq!(all, (0..50).collect::<Vec<_>>());
        assert_eq!(splits.train.len(), 40);
        assert_eq!(splits.val.len(),   5);
        assert_eq!(splits.test.len(),  5);
    }

    #[test]
    fn test_same_seed_same_split() {
        let a = split_three((0..30).collect::<Vec<usize>>(), 0.2, 100);
        let b = split_three((0..30).collect::<Vec<usize>>(), 0.2, 100);
        assert_eq!(a.train, b.train);
        assert_eq!(a.test,  b.test);
    }

    #[test]
    fn test_empty_dataset() {
        let items: Vec<usize> = Vec::new();
        let splits = split_three(items, 0.2, 1);
        assert!(splits.train.is_empty());
        assert!(splits.val.is_empty());
        assert!(splits.test.is_empty());
    }
}
