// Shared fixtures for the training and evaluation tests.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use burn::backend::{ndarray::NdArray, Autodiff};

use crate::application::train_use_case::TrainConfig;
use crate::data::dataset::mix_seed;
use crate::data::splitter::Splits;
use crate::domain::sample::{Phase, TreeSample};
use crate::domain::task::{Task, TaskLabels};
use crate::domain::traits::ImageDecoder;
use crate::ml::backbone::ResNetConfig;
use crate::ml::model::MultiTaskConfig;

pub type TestBackend  = NdArray<f32>;
pub type TestAutodiff = Autodiff<NdArray<f32>>;

pub const IMAGE_SIZE: usize = 32;

/// One bottleneck per stage, four base channels
pub fn tiny_config() -> MultiTaskConfig {
    MultiTaskConfig::new(ResNetConfig::new([1, 1, 1, 1]).with_base_width(4))
}

/// Pseudo-random pixels derived from the path (and, in training,
/// the augmentation seed). Paths containing "corrupt" fail.
#[derive(Debug)]
pub struct SyntheticDecoder;

impl ImageDecoder for SyntheticDecoder {
    fn decode(&self, path: &Path, phase: Phase, seed: u64) -> Result<Vec<f32>> {
        let name = path.to_string_lossy();
        if name.contains("corrupt") {
            bail!("corrupt image");
        }
        let start = if phase.is_train() { seed } else { 0 };
        let mut state = name.bytes().fold(start, |h, b| h.wrapping_mul(31).wrapping_add(b as u64));
        Ok((0..3 * IMAGE_SIZE * IMAGE_SIZE)
            .map(|_| {
                state = mix_seed(state, 1);
                (state % 1000) as f32 / 500.0 - 1.0
            })
            .collect())
    }

    fn image_size(&self) -> usize {
        IMAGE_SIZE
    }
}

/// 3 leaf, 3 shape, 2 trunk and 2 trunk2 photographs
pub fn ten_samples() -> Vec<TreeSample> {
    let labelled: [(Task, usize); 10] = [
        (Task::Leaf, 0), (Task::Leaf, 1), (Task::Leaf, 2),
        (Task::Shape, 0), (Task::Shape, 1), (Task::Shape, 2),
        (Task::Trunk, 0), (Task::Trunk, 2),
        (Task::Trunk2, 0), (Task::Trunk2, 1),
    ];
    labelled.iter()
        .enumerate()
        .map(|(i, &(task, class))| {
            let path = PathBuf::from(task.dir_name())
                .join(task.class_names()[class])
                .join(format!("{i}.jpg"));
            TreeSample::new(path, TaskLabels::single(task, class))
        })
        .collect()
}

/// Small, single-worker run writing into `dir`
pub fn test_config(dir: &Path) -> TrainConfig {
    TrainConfig {
        checkpoint_dir: dir.to_string_lossy().into_owned(),
        epochs:         1,
        batch_size:     5,
        num_workers:    1,
        train_repeat:   1,
        image_size:     IMAGE_SIZE,
        resize:         IMAGE_SIZE,
        lr:             0.01,
        ..TrainConfig::default()
    }
}

/// The ten samples in every split
pub fn sample_splits() -> Splits<TreeSample> {
    Splits { train: ten_samples(), val: ten_samples(), test: ten_samples() }
}
