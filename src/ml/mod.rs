// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Everything that builds, trains or runs the network.
//
//   backbone.rs     ResNet trunk (bottleneck blocks, strippable fc)
//   model.rs        Shared trunk + four task heads
//   loss.rs         Cross-entropy over labelled rows, summed per task
//   accuracy.rs     Running per-task correct / valid counts
//   selection.rs    Checkpoint policies and the best-snapshot selector
//   trainer.rs      Epoch loop: train, validate, snapshot, resume
//   evaluator.rs    (predicted, true) pairs over a held-out split
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            He et al. (2016) Deep Residual Learning

/// ResNet feature extractor
pub mod backbone;

/// Multi-task model with one linear head per task
pub mod model;

/// Partial-label loss
pub mod loss;

/// Per-task accuracy accumulator
pub mod accuracy;

/// Best-checkpoint policies
pub mod selection;

/// Training loop with validation, checkpointing and resume
pub mod trainer;

/// Offline evaluation over a split
pub mod evaluator;

#[cfg(test)]
pub mod testing;
