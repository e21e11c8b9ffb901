// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Files a run reads and writes:
//
//   checkpoint.rs   config, split manifest, best model and the
//                   resumable training state (Burn recorders +
//                   serde_json)
//
//   metrics.rs      per-epoch, per-phase metrics CSV
//
//   report.rs       confusion matrices, classification reports
//                   and evaluation.json
//
// Reference: Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Checkpoint directory: model records, config, splits, state
pub mod checkpoint;

/// Training metrics CSV logger
pub mod metrics;

/// Per-task evaluation tables
pub mod report;
