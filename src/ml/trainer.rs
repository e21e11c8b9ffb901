// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Partial-label multi-task training with Burn's DataLoader.
//
// Per epoch:
//   train  autodiff model, augmented batches, shuffled with a
//          per-epoch seed; backward + optimiser step whenever
//          the batch produced a loss. The loader is single-threaded
//          so batch order depends on the seed alone; `num_workers`
//          threads decode the images inside each batch.
//   val    model.valid() on the inner backend (no gradients,
//          batch-norm uses its running statistics)
//
// After val the checkpoint selector decides whether this epoch
// becomes the best snapshot, and the resumable state is written.
// When the loop ends the model is rolled back to the snapshot.
//
// Key Burn insight:
//   - Training uses MyBackend (Autodiff<Wgpu>) for gradients
//   - model.valid() returns the model on B::InnerBackend (Wgpu)
//   - The validation batcher must also use the inner backend
//
// Reference: Burn Book §5, He et al. (2016)

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    module::AutodiffModule,
    optim::{momentum::MomentumConfig, AdamConfig, GradientsParams, Optimizer, SgdConfig},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};

use crate::application::train_use_case::TrainConfig;
use crate::data::batcher::{DecodedBatch, TreeBatcher};
use crate::data::dataset::TreeDataset;
use crate::data::splitter::Splits;
use crate::domain::sample::{Phase, TreeSample};
use crate::domain::task::TaskAccuracies;
use crate::domain::traits::ImageDecoder;
use crate::infra::checkpoint::{load_backbone, CheckpointManager, TrainingState};
use crate::infra::metrics::MetricsLogger;
use crate::ml::accuracy::{PhaseAccumulator, PhaseMetrics};
use crate::ml::loss::partial_loss;
use crate::ml::model::MultiTaskModel;
use crate::ml::selection::CheckpointSelector;

type MyBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    /// SGD with momentum, no dampening
    #[default]
    Sgd,
    Adam,
}

/// What a finished run hands back.
pub struct TrainOutcome<B: Backend> {
    /// Model restored to the best snapshot
    pub model:      MultiTaskModel<B>,
    pub best_epoch: Option<usize>,
    pub best:       TaskAccuracies,
    /// Train and val metrics of every epoch this invocation ran
    pub history:    Vec<PhaseMetrics>,
}

pub fn run_training(
    cfg:     &TrainConfig,
    splits:  &Splits<TreeSample>,
    decoder: Arc<dyn ImageDecoder>,
    ckpt:    &CheckpointManager,
) -> Result<()> {
    let device = burn::backend::wgpu::WgpuDevice::default();
    tracing::info!("Using WGPU device: {:?}", device);
    MyBackend::seed(cfg.seed);

    let model = build_model::<MyBackend>(cfg, &device)?;

    let outcome = match cfg.optimizer {
        OptimizerKind::Sgd => {
            let momentum = MomentumConfig::new().with_momentum(cfg.momentum).with_dampening(0.0);
            let optim    = SgdConfig::new()
                .with_momentum(Some(momentum))
                .init::<MyBackend, MultiTaskModel<MyBackend>>();
            train_loop(cfg, model, optim, splits, decoder, ckpt, &device)?
        }
        OptimizerKind::Adam => {
            let optim = AdamConfig::new().init::<MyBackend, MultiTaskModel<MyBackend>>();
            train_loop(cfg, model, optim, splits, decoder, ckpt, &device)?
        }
    };

    match outcome.best_epoch {
        Some(epoch) => {
            let loss = outcome.history
                .iter()
                .find(|m| m.epoch == epoch && m.phase == Phase::Val)
                .map(|m| m.loss);
            tracing::info!("Best epoch {} (val loss {:?}): {}", epoch, loss, outcome.best);
        }
        None => tracing::warn!("No epoch ran; saving the model as initialised"),
    }
    ckpt.save_model(&outcome.model)?;
    Ok(())
}

/// Backbone (pretrained when weights are configured) plus fresh heads.
pub fn build_model<B: Backend>(cfg: &TrainConfig, device: &B::Device) -> Result<MultiTaskModel<B>> {
    let backbone = cfg.model_config().backbone.init::<B>(device);
    let backbone = match &cfg.backbone_weights {
        Some(path) => {
            tracing::info!("Loading backbone weights from '{}'", path);
            load_backbone(backbone, Path::new(path), device)?
        }
        None => {
            tracing::warn!("No backbone weights given, starting from random initialisation");
            backbone
        }
    };
    Ok(MultiTaskModel::new(backbone, device))
}

pub fn train_loop<B, O>(
    cfg:       &TrainConfig,
    mut model: MultiTaskModel<B>,
    mut optim: O,
    splits:    &Splits<TreeSample>,
    decoder:   Arc<dyn ImageDecoder>,
    ckpt:      &CheckpointManager,
    device:    &B::Device,
) -> Result<TrainOutcome<B>>
where
    B: AutodiffBackend,
    O: Optimizer<MultiTaskModel<B>, B>,
{
    let started  = Instant::now();
    let mut selector = CheckpointSelector::new(cfg.checkpoint_policy.build());
    let mut first_epoch = 0;

    // ── Resume ────────────────────────────────────────────────────────────────
    if cfg.resume {
        if ckpt.has_state() {
            let state = ckpt.load_training_state()?;
            if state.policy != cfg.checkpoint_policy {
                tracing::warn!(
                    "Saved state used the {:?} policy, continuing with {:?}",
                    state.policy, cfg.checkpoint_policy,
                );
            }
            model = ckpt.load_state_model(model, device)?;
            optim = ckpt.load_optimizer::<B, O>(optim, device)?;
            if let Some(epoch) = state.best_epoch {
                selector.resume(epoch, state.bests(), ckpt.load_best_snapshot::<B>(device)?);
            }
            first_epoch = state.next_epoch;
            tracing::info!("Resuming at epoch {}", first_epoch);
        } else {
            tracing::warn!("--resume given but no saved state in '{}', starting fresh", ckpt.dir().display());
        }
    }

    let metrics = MetricsLogger::new(ckpt.dir(), first_epoch)?;
    tracing::info!("Train samples: {}, val samples: {}", splits.train.len(), splits.val.len());

    // ── Validation data loader (InnerBackend, fixed order) ────────────────────
    let val_batcher = TreeBatcher::<B::InnerBackend>::new(decoder.clone(), Phase::Val, device.clone())
        .with_workers(cfg.num_workers)?;
    let val_loader  = DataLoaderBuilder::new(val_batcher)
        .batch_size(cfg.batch_size)
        .build(TreeDataset::new(splits.val.clone()));

    let mut history = Vec::new();

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in first_epoch..cfg.epochs {
        println!("Epoch {}/{}", epoch, cfg.epochs.saturating_sub(1));
        println!("{}", "-".repeat(10));

        // ── Training phase ────────────────────────────────────────────────────
        // Rebuilt every epoch: shuffle order and augmentation seeds are
        // functions of (seed, epoch), so a resumed run sees the same data.
        let train_dataset = TreeDataset::new(splits.train.clone())
            .with_repeat(cfg.train_repeat)
            .for_epoch(cfg.seed, epoch);
        let train_batcher = TreeBatcher::<B>::new(decoder.clone(), Phase::Train, device.clone())
            .with_workers(cfg.num_workers)?;
        let train_loader  = DataLoaderBuilder::new(train_batcher)
            .batch_size(cfg.batch_size)
            .shuffle(cfg.seed.wrapping_add(epoch as u64))
            .build(train_dataset);

        let mut acc = PhaseAccumulator::new(Phase::Train);
        for decoded in train_loader.iter() {
            let Some(batch) = acc.admit(decoded) else { continue };
            let logits = model.forward(batch.images.clone());
            let loss   = partial_loss(&logits, &batch);
            let value  = loss.as_ref().map(|l| l.clone().into_scalar().elem::<f64>());
            acc.record_batch(value, &logits, &batch);

            if let Some(loss) = loss {
                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optim.step(cfg.lr, model, grads);
            }
        }
        let train = acc.finish(epoch);
        report(&train, &metrics)?;

        // ── Validation phase ──────────────────────────────────────────────────
        let model_valid = model.valid();
        let val = evaluate_phase(&model_valid, &val_loader, epoch, Phase::Val);
        report(&val, &metrics)?;

        if selector.observe(epoch, &val.accuracies, || model.clone().into_record()) {
            ckpt.save_best_snapshot(&model)?;
            tracing::info!("Epoch {} is the new best ({})", epoch, selector.bests());
        }

        let state = TrainingState::new(epoch + 1, selector.kind(), selector.best_epoch(), &selector.bests());
        ckpt.save_state(&model, &optim, &state)?;

        history.push(train);
        history.push(val);
        println!();
    }

    let elapsed = started.elapsed().as_secs();
    println!("Training complete in {}m {}s", elapsed / 60, elapsed % 60);
    let best = selector.bests();
    println!("Best val {}", best);

    let (best_epoch, model) = match selector.into_snapshot() {
        Some((epoch, snapshot)) => {
            tracing::info!("Restoring best snapshot from epoch {}", epoch);
            (Some(epoch), model.load_record(snapshot))
        }
        None => (None, model),
    };

    Ok(TrainOutcome { model, best_epoch, best, history })
}

/// Loss and accuracies of a model over one pass of `loader`, without
/// touching any parameter.
pub fn evaluate_phase<B: Backend>(
    model:  &MultiTaskModel<B>,
    loader: &Arc<dyn DataLoader<DecodedBatch<B>>>,
    epoch:  usize,
    phase:  Phase,
) -> PhaseMetrics {
    let mut acc = PhaseAccumulator::new(phase);
    for decoded in loader.iter() {
        let Some(batch) = acc.admit(decoded) else { continue };
        let logits = model.forward(batch.images.clone());
        let loss   = partial_loss(&logits, &batch).map(|l| l.into_scalar().elem::<f64>());
        acc.record_batch(loss, &logits, &batch);
    }
    acc.finish(epoch)
}

fn report(m: &PhaseMetrics, metrics: &MetricsLogger) -> Result<()> {
    println!("{m}");
    if m.skipped > 0 {
        tracing::warn!("{} phase of epoch {} skipped {} undecodable images", m.phase, m.epoch, m.skipped);
    }
    tracing::debug!(epoch = m.epoch, phase = %m.phase, samples = m.samples, "phase finished");
    metrics.log(m)
}
