// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Scan the data directory       (Layer 4 - data)
//   Step 2: Split train / val / test      (Layer 4 - data)
//   Step 3: Save config + split manifest  (Layer 6 - infra)
//   Step 4: Run training loop             (Layer 5 - ml)
//   Step 5: Evaluate best model on test   (Layer 2 - evaluate)
//
// A resumed run reuses the saved split manifest instead of
// scanning again, so it trains on exactly the same samples.
//
// Reference: Burn Book §5 (Training)

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::application::evaluate_use_case::EvaluateUseCase;
use crate::data::{scanner::FolderScanner, splitter::split_three, transform::FileImageDecoder};
use crate::domain::sample::TreeSample;
use crate::domain::task::PerTask;
use crate::domain::traits::SampleSource;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::backbone::ResNetConfig;
use crate::ml::model::MultiTaskConfig;
use crate::ml::selection::PolicyKind;
use crate::ml::trainer::{run_training, OptimizerKind};

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a training run.
// Saved next to the checkpoints so evaluation can rebuild the model
// and the decoder exactly as they were during training.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub data_dir:          String,
    pub checkpoint_dir:    String,
    pub epochs:            usize,
    pub batch_size:        usize,
    pub lr:                f64,
    pub momentum:          f64,
    pub optimizer:         OptimizerKind,
    pub num_workers:       usize,
    pub seed:              u64,
    pub train_repeat:      usize,
    pub image_size:        usize,
    pub resize:            usize,
    /// Share of the data held out, split equally into val and test
    pub held_out_fraction: f64,
    pub backbone_weights:  Option<String>,
    pub checkpoint_policy: PolicyKind,
    pub resume:            bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_dir:          "dataset".to_string(),
            checkpoint_dir:    "checkpoints".to_string(),
            epochs:            101,
            batch_size:        32,
            lr:                1e-3,
            momentum:          0.9,
            optimizer:         OptimizerKind::Sgd,
            num_workers:       4,
            seed:              100,
            train_repeat:      3,
            image_size:        224,
            resize:            256,
            held_out_fraction: 0.2,
            backbone_weights:  None,
            checkpoint_policy: PolicyKind::Coupled,
            resume:            false,
        }
    }
}

impl TrainConfig {
    /// Architecture trained by this crate: ResNet50 trunk, four heads
    pub fn model_config(&self) -> MultiTaskConfig {
        MultiTaskConfig::new(ResNetConfig::resnet50())
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<()> {
        let cfg  = &self.config;
        let ckpt = CheckpointManager::new(&cfg.checkpoint_dir)?;

        // ── Steps 1–3: samples and splits ────────────────────────────────────
        let splits = if cfg.resume && ckpt.has_state() {
            tracing::info!("Resuming: reusing the saved split manifest");
            ckpt.load_splits()?
        } else {
            tracing::info!("Scanning images in '{}'", cfg.data_dir);
            let samples = FolderScanner::new(&cfg.data_dir).load_all()?;
            if samples.is_empty() {
                bail!("No images found under '{}'", cfg.data_dir);
            }

            let splits = split_three(samples, cfg.held_out_fraction, cfg.seed);
            ckpt.save_splits(&splits)?;
            splits
        };
        for (name, split) in [("train", &splits.train), ("validation", &splits.val), ("test", &splits.test)] {
            let [leaf, shape, trunk, trunk2] = task_counts(split).0;
            tracing::info!(
                "Split {}: {} images (leaf {}, shape {}, trunk {}, trunk2 {})",
                name, split.len(), leaf, shape, trunk, trunk2,
            );
        }
        ckpt.save_config(cfg)?;

        // ── Step 4: Run training loop (Layer 5) ───────────────────────────────
        let decoder = Arc::new(FileImageDecoder::new(cfg.image_size, cfg.resize));
        run_training(cfg, &splits, decoder, &ckpt)?;

        // ── Step 5: Held-out report ───────────────────────────────────────────
        EvaluateUseCase::new(cfg.checkpoint_dir.clone(), cfg.batch_size).execute()
    }
}

/// Images per task in one split
fn task_counts(samples: &[TreeSample]) -> PerTask<usize> {
    let mut counts = PerTask::default();
    for task in samples.iter().filter_map(TreeSample::task) {
        *counts.get_mut(task) += 1;
    }
    counts
}
