use burn::data::dataset::Dataset;

use crate::domain::sample::TreeSample;

/// One sample as handed to the batcher: the scanned photograph plus
/// the seed that fixes its augmentation for this pass.
#[derive(Debug, Clone)]
pub struct TreeItem {
    pub sample: TreeSample,
    pub seed:   u64,
}

/// Burn dataset over scanned samples.
///
/// `repeat` makes one epoch visit every sample several times (each
/// visit gets its own augmentation seed). Index `i` maps to sample
/// `i % len`.
pub struct TreeDataset {
    samples:    Vec<TreeSample>,
    repeat:     usize,
    epoch_seed: u64,
}

impl TreeDataset {
    pub fn new(samples: Vec<TreeSample>) -> Self {
        Self { samples, repeat: 1, epoch_seed: 0 }
    }

    pub fn with_repeat(mut self, repeat: usize) -> Self {
        self.repeat = repeat.max(1);
        self
    }

    /// Fix the augmentation seeds for one epoch of one run.
    pub fn for_epoch(mut self, run_seed: u64, epoch: usize) -> Self {
        self.epoch_seed = mix_seed(run_seed, epoch as u64);
        self
    }
}

impl Dataset<TreeItem> for TreeDataset {
    fn get(&self, index: usize) -> Option<TreeItem> {
        if index >= self.len() {
            return None;
        }
        let sample = self.samples.get(index % self.samples.len())?.clone();
        Some(TreeItem { sample, seed: mix_seed(self.epoch_seed, index as u64) })
    }

    fn len(&self) -> usize {
        self.samples.len() * self.repeat
    }
}

/// SplitMix64 step over `a ^ b`; spreads nearby (seed, index) pairs apart.
pub fn mix_seed(a: u64, b: u64) -> u64 {
    let mut z = a
        .wrapping_add(0x9E37_79B9_7F4A_7C15)
        .wrapping_add(b.wrapping_mul(0xBF58_476D_1CE4_E5B9));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task::{Task, TaskLabels};

    fn samples(n: usize) -> Vec<TreeSample> {
        (0..n)
            .map(|i| TreeSample::new(format!("{i}.jpg"), TaskLabels::single(Task::Leaf, i % 3)))
            .collect()
    }

    #[test]
    fn test_repeat_multiplies_length() {
        let ds = TreeDataset::new(samples(4)).with_repeat(3);
        assert_eq!(ds.len(), 12);
        assert_eq!(ds.get(5).unwrap().sample.path, ds.get(1).unwrap().sample.path);
        assert!(ds.get(12).is_none());
    }

    #[test]
    fn test_each_visit_has_its_own_seed() {
        let ds = TreeDataset::new(samples(2)).with_repeat(2).for_epoch(100, 0);
        assert_ne!(ds.get(0).unwrap().seed, ds.get(2).unwrap().seed);
    }

    #[test]
    fn test_seeds_depend_on_epoch() {
        let e0 = TreeDataset::new(samples(2)).for_epoch(100, 0);
        let e1 = TreeDataset::new(samples(2)).for_epoch(100, 1);
        let again = TreeDataset::new(samples(2)).for_epoch(100, 0);
        assert_ne!(e0.get(0).unwrap().seed, e1.get(0).unwrap().seed);
        assert_eq!(e0.get(0).unwrap().seed, again.get(0).unwrap().seed);
    }

    #[test]
    fn test_empty_dataset() {
        let ds = TreeDataset::new(Vec::new()).with_repeat(3);
        assert_eq!(ds.len(), 0);
        assert!(ds.get(0).is_none());
    }
}
