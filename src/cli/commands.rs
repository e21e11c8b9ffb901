// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands: `train` and `evaluate`
// and all their configurable flags.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};

use crate::application::train_use_case::TrainConfig;
use crate::ml::selection::PolicyKind;
use crate::ml::trainer::OptimizerKind;

/// The two top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the multi-task classifier on the labelled photographs
    Train(TrainArgs),

    /// Report on the held-out test split of a trained checkpoint
    Evaluate(EvaluateArgs),
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Root holding Leaf/, Shape/, Trunk/ and Trunk2/, one folder per class inside each
    #[arg(long, default_value = "dataset")]
    pub data_dir: String,

    /// Directory for checkpoints, metrics and reports
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    #[arg(long, default_value_t = 101)]
    pub epochs: usize,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    /// Constant learning rate
    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    /// SGD momentum (ignored by Adam)
    #[arg(long, default_value_t = 0.9)]
    pub momentum: f64,

    #[arg(long, value_enum, default_value_t = OptimizerKind::Sgd)]
    pub optimizer: OptimizerKind,

    /// Threads decoding and augmenting training images
    #[arg(long, default_value_t = 4)]
    pub num_workers: usize,

    /// Seeds the split, the shuffling, the augmentation and the weights
    #[arg(long, default_value_t = 100)]
    pub seed: u64,

    /// Visits of every training image per epoch, each with its own augmentation
    #[arg(long, default_value_t = 3)]
    pub train_repeat: usize,

    /// Side of the square network input
    #[arg(long, default_value_t = 224)]
    pub image_size: usize,

    /// Shorter side before the centre crop (val / test)
    #[arg(long, default_value_t = 256)]
    pub resize: usize,

    /// Pretrained ResNet50 record, path without the .mpk.gz extension
    #[arg(long)]
    pub backbone_weights: Option<String>,

    /// How the best checkpoint is chosen from the four val accuracies
    #[arg(long, value_enum, default_value_t = PolicyKind::Coupled)]
    pub checkpoint_policy: PolicyKind,

    /// Continue from the state saved in --checkpoint-dir
    #[arg(long)]
    pub resume: bool,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            data_dir:          a.data_dir,
            checkpoint_dir:    a.checkpoint_dir,
            epochs:            a.epochs,
            batch_size:        a.batch_size,
            lr:                a.lr,
            momentum:          a.momentum,
            optimizer:         a.optimizer,
            num_workers:       a.num_workers,
            seed:              a.seed,
            train_repeat:      a.train_repeat,
            image_size:        a.image_size,
            resize:            a.resize,
            backbone_weights:  a.backbone_weights,
            checkpoint_policy: a.checkpoint_policy,
            resume:            a.resume,
            ..TrainConfig::default()
        }
    }
}

/// All arguments for the `evaluate` command
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Directory where `train` saved its checkpoints
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    #[test]
    fn test_train_defaults() {
        let cli = Cli::try_parse_from(["tree_morph", "train"]).unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let cfg: TrainConfig = args.into();
        assert_eq!(cfg.data_dir, "dataset");
        assert_eq!(cfg.epochs, 101);
        assert_eq!(cfg.lr, 1e-3);
        assert_eq!(cfg.held_out_fraction, 0.2);
        assert!(!cfg.resume);
    }

    #[test]
    fn test_train_flags() {
        let cli = Cli::try_parse_from([
            "tree_morph", "train",
            "--optimizer", "adam",
            "--checkpoint-policy", "independent",
            "--backbone-weights", "weights/resnet50",
            "--resume",
        ])
        .unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        assert_eq!(args.optimizer, OptimizerKind::Adam);
        assert_eq!(args.checkpoint_policy, PolicyKind::Independent);
        assert_eq!(args.backbone_weights.as_deref(), Some("weights/resnet50"));
        assert!(args.resume);
    }

    #[test]
    fn test_unknown_policy_rejected() {
        assert!(Cli::try_parse_from(["tree_morph", "train", "--checkpoint-policy", "best"]).is_err());
    }
}
