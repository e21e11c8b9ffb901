// ============================================================
// Layer 5 — Evaluator
// ============================================================
// Runs a trained model over a held-out split (no augmentation,
// no gradients) and collects, per task, the (predicted, true)
// pairs of every sample labelled for that task. The report layer
// turns those pairs into confusion matrices and per-class scores.

use std::sync::Arc;

use anyhow::Result;
use burn::{data::dataloader::DataLoaderBuilder, prelude::*};

use crate::data::batcher::TreeBatcher;
use crate::data::dataset::TreeDataset;
use crate::data::transform::FileImageDecoder;
use crate::domain::sample::{Phase, TreeSample};
use crate::domain::task::{PerTask, Task};
use crate::domain::traits::ImageDecoder;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::accuracy::{predictions, PhaseAccumulator, PhaseMetrics};
use crate::ml::loss::partial_loss;
use crate::ml::model::MultiTaskModel;

type InferBackend = burn::backend::Wgpu;

/// (predicted, true) class pairs, filtered to labelled samples
pub type TaskPairs = PerTask<Vec<(usize, usize)>>;

#[derive(Debug, Clone)]
pub struct Evaluation {
    pub metrics: PhaseMetrics,
    pub pairs:   TaskPairs,
}

pub struct Evaluator<B: Backend> {
    model:      MultiTaskModel<B>,
    decoder:    Arc<dyn ImageDecoder>,
    batch_size: usize,
    device:     B::Device,
}

impl Evaluator<InferBackend> {
    /// Rebuild the model described by the saved config and load the
    /// best weights into it.
    pub fn from_checkpoint(ckpt: &CheckpointManager, batch_size: usize) -> Result<Self> {
        let device = burn::backend::wgpu::WgpuDevice::default();
        let cfg    = ckpt.load_config()?;
        let model: MultiTaskModel<InferBackend> = cfg.model_config().init(&device);
        let model  = ckpt.load_model(model, &device)?;
        tracing::info!("Model loaded from checkpoint");

        let decoder = Arc::new(FileImageDecoder::new(cfg.image_size, cfg.resize));
        Ok(Self::new(model, decoder, batch_size, device))
    }
}

impl<B: Backend> Evaluator<B> {
    pub fn new(model: MultiTaskModel<B>, decoder: Arc<dyn ImageDecoder>, batch_size: usize, device: B::Device) -> Self {
        Self { model, decoder, batch_size: batch_size.max(1), device }
    }

    pub fn evaluate(&self, samples: Vec<TreeSample>) -> Evaluation {
        let batcher = TreeBatcher::<B>::new(self.decoder.clone(), Phase::Test, self.device.clone());
        let loader  = DataLoaderBuilder::new(batcher)
            .batch_size(self.batch_size)
            .build(TreeDataset::new(samples));

        let mut acc   = PhaseAccumulator::new(Phase::Test);
        let mut pairs = TaskPairs::default();

        for decoded in loader.iter() {
            let Some(batch) = acc.admit(decoded) else { continue };
            let logits = self.model.forward(batch.images.clone());
            let loss   = partial_loss(&logits, &batch).map(|l| l.into_scalar().elem::<f64>());
            acc.record_loss(loss, batch.len());

            for task in Task::ALL {
                let mask = &batch.target(task).mask;
                if mask.is_empty() {
                    continue;
                }
                let predicted = predictions(logits.get(task));
                acc.record_task(task, mask, &predicted);
                pairs.get_mut(task).extend(mask.pairs(&predicted));
            }
        }

        Evaluation { metrics: acc.finish(0), pairs }
    }
}
