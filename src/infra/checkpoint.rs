// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Everything a run leaves on disk, under one directory:
//
//   checkpoints/
//     train_config.json     ← hyperparameters of the run
//     splits.json           ← exact train / val / test samples
//     model_best.mpk.gz     ← restored best model (CompactRecorder)
//     state/
//       model.mpk.gz        ← model after the last finished epoch
//       optim.mpk.gz        ← optimiser state (momentum / moments)
//       best.mpk.gz         ← current best snapshot
//       state.json          ← next epoch, policy bests, best epoch
//
// The resumable state uses the full-precision recorder so a
// resumed run continues from bit-identical parameters; the final
// model uses the compact half-precision recorder.
//
// Pretrained backbones come either as a Burn record or as a
// torchvision ResNet `.pth` state dict, read with burn-import's
// PyTorchFileRecorder and renamed onto this crate's field names.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};
use burn::{
    optim::Optimizer,
    prelude::*,
    record::{CompactRecorder, FullPrecisionSettings, NamedMpkGzFileRecorder, Recorder},
    tensor::backend::AutodiffBackend,
};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use serde::{Deserialize, Serialize};

use crate::application::train_use_case::TrainConfig;
use crate::data::splitter::Splits;
use crate::domain::sample::TreeSample;
use crate::domain::task::{PerTask, TaskAccuracies};
use crate::ml::backbone::ResNet;
use crate::ml::model::{MultiTaskModel, MultiTaskRecord};
use crate::ml::selection::PolicyKind;

type StateRecorder = NamedMpkGzFileRecorder<FullPrecisionSettings>;

/// Progress of an interrupted run, written after every epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingState {
    /// First epoch the resumed run has to execute
    pub next_epoch: usize,
    pub policy:     PolicyKind,
    pub best_epoch: Option<usize>,
    /// Policy bests; `None` stands for NaN (JSON has no NaN)
    pub bests:      [Option<f64>; 4],
}

impl TrainingState {
    pub fn new(next_epoch: usize, policy: PolicyKind, best_epoch: Option<usize>, bests: &TaskAccuracies) -> Self {
        let bests = bests.0.map(|b| (!b.is_nan()).then_some(b));
        Self { next_epoch, policy, best_epoch, bests }
    }

    pub fn bests(&self) -> TaskAccuracies {
        PerTask(self.bests.map(|b| b.unwrap_or(f64::NAN)))
    }
}

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Creates the directory (and `state/`) if missing.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(dir.join("state"))
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn state_path(&self, name: &str) -> PathBuf {
        self.dir.join("state").join(name)
    }

    // ── JSON files ────────────────────────────────────────────────────────────

    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        fs::write(path, json).with_context(|| format!("Cannot write '{}'", path.display()))?;
        tracing::debug!("Wrote '{}'", path.display());
        Ok(())
    }

    fn read_json<T: for<'de> Deserialize<'de>>(&self, path: &Path, hint: &str) -> Result<T> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Cannot read '{}'. {hint}", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("Malformed '{}'", path.display()))
    }

    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        self.write_json(&self.dir.join("train_config.json"), cfg)
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        self.read_json(&self.dir.join("train_config.json"), "Have you run 'train' first?")
    }

    pub fn save_splits(&self, splits: &Splits<TreeSample>) -> Result<()> {
        self.write_json(&self.dir.join("splits.json"), splits)
    }

    pub fn load_splits(&self) -> Result<Splits<TreeSample>> {
        self.read_json(&self.dir.join("splits.json"), "Have you run 'train' first?")
    }

    // ── Final model ───────────────────────────────────────────────────────────

    pub fn save_model<B: Backend>(&self, model: &MultiTaskModel<B>) -> Result<()> {
        let path = self.dir.join("model_best");
        model
            .clone()
            .save_file(path.clone(), &CompactRecorder::new())
            .with_context(|| format!("Failed to save model to '{}'", path.display()))?;
        tracing::info!("Saved best model to '{}'", path.display());
        Ok(())
    }

    pub fn load_model<B: Backend>(&self, model: MultiTaskModel<B>, device: &B::Device) -> Result<MultiTaskModel<B>> {
        let path = self.dir.join("model_best");
        model
            .load_file(path.clone(), &CompactRecorder::new(), device)
            .with_context(|| {
                format!("Cannot load model '{}'. Have you trained the model first?", path.display())
            })
    }

    // ── Resumable state ───────────────────────────────────────────────────────

    pub fn has_state(&self) -> bool {
        self.state_path("state.json").exists()
    }

    /// Model, optimiser and progress after a finished epoch.
    pub fn save_state<B, O>(&self, model: &MultiTaskModel<B>, optim: &O, state: &TrainingState) -> Result<()>
    where
        B: AutodiffBackend,
        O: Optimizer<MultiTaskModel<B>, B>,
    {
        let recorder = StateRecorder::new();
        model
            .clone()
            .save_file(self.state_path("model"), &recorder)
            .context("Failed to save model state")?;
        <StateRecorder as Recorder<B>>::record(&recorder, optim.to_record(), self.state_path("optim"))
            .context("Failed to save optimizer state")?;
        // state.json last: its presence marks a complete state
        self.write_json(&self.state_path("state.json"), state)
    }

    pub fn save_best_snapshot<B: Backend>(&self, model: &MultiTaskModel<B>) -> Result<()> {
        model
            .clone()
            .save_file(self.state_path("best"), &StateRecorder::new())
            .context("Failed to save best snapshot")
    }

    pub fn load_training_state(&self) -> Result<TrainingState> {
        self.read_json(&self.state_path("state.json"), "No resumable state found.")
    }

    pub fn load_state_model<B: Backend>(&self, model: MultiTaskModel<B>, device: &B::Device) -> Result<MultiTaskModel<B>> {
        model
            .load_file(self.state_path("model"), &StateRecorder::new(), device)
            .context("Cannot load model state")
    }

    pub fn load_optimizer<B, O>(&self, optim: O, device: &B::Device) -> Result<O>
    where
        B: AutodiffBackend,
        O: Optimizer<MultiTaskModel<B>, B>,
    {
        let record: O::Record =
            <StateRecorder as Recorder<B>>::load(&StateRecorder::new(), self.state_path("optim"), device)
                .context("Cannot load optimizer state")?;
        Ok(optim.load_record(record))
    }

    pub fn load_best_snapshot<B: Backend>(&self, device: &B::Device) -> Result<MultiTaskRecord<B>> {
        <StateRecorder as Recorder<B>>::load(&StateRecorder::new(), self.state_path("best"), device)
            .context("Cannot load best snapshot")
    }
}

/// torchvision ResNet parameter names → `ResNet` field paths.
/// Applied in order; `fc.*` and block-internal names already match.
pub const TORCHVISION_KEY_REMAP: [(&str, &str); 8] = [
    (r"^conv1\.(.+)$",                "stem_conv.$1"),
    (r"^bn1\.(.+)$",                  "stem_bn.$1"),
    (r"^layer1\.([0-9]+)\.(.+)$",      "stages.0.$1.$2"),
    (r"^layer2\.([0-9]+)\.(.+)$",      "stages.1.$1.$2"),
    (r"^layer3\.([0-9]+)\.(.+)$",      "stages.2.$1.$2"),
    (r"^layer4\.([0-9]+)\.(.+)$",      "stages.3.$1.$2"),
    (r"^(.+)\.downsample\.0\.(.+)$",   "$1.downsample.conv.$2"),
    (r"^(.+)\.downsample\.1\.(.+)$",   "$1.downsample.bn.$2"),
];

/// Load pretrained backbone weights into the full ResNet (classifier
/// included). A `.pth` / `.pt` file is read as a torchvision state
/// dict; any other path names a Burn record given without extension.
pub fn load_backbone<B: Backend>(backbone: ResNet<B>, path: &Path, device: &B::Device) -> Result<ResNet<B>> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("pth" | "pt") => load_torchvision_backbone(backbone, path, device),
        _ => backbone
            .load_file(path.to_path_buf(), &CompactRecorder::new(), device)
            .with_context(|| format!("Cannot load backbone weights '{}'", path.display())),
    }
}

fn load_torchvision_backbone<B: Backend>(backbone: ResNet<B>, path: &Path, device: &B::Device) -> Result<ResNet<B>> {
    let args = TORCHVISION_KEY_REMAP
        .iter()
        .fold(LoadArgs::new(path.to_path_buf()), |args, (from, to)| args.with_key_remap(from, to));
    let recorder = PyTorchFileRecorder::<FullPrecisionSettings>::default();
    let record: <ResNet<B> as Module<B>>::Record =
        <PyTorchFileRecorder<FullPrecisionSettings> as Recorder<B>>::load(&recorder, args, device)
            .with_context(|| format!("Cannot read torchvision weights '{}'", path.display()))?;
    tracing::info!("Loaded torchvision ResNet weights from '{}'", path.display());
    Ok(backbone.load_record(record))
}
