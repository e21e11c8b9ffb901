// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from the data directory to tensor batches.
//
// The pipeline flows in this order:
//
//   data directory (Task/class/*.jpg)
//       │
//       ▼
//   FolderScanner     → one TreeSample per image, one label each
//       │
//       ▼
//   split_three       → seeded 80 / 10 / 10 train / val / test
//       │
//       ▼
//   TreeDataset       → implements Burn's Dataset trait
//       │               (train set repeated, per-visit seeds)
//       ▼
//   TreeBatcher       → decodes + augments via FileImageDecoder,
//       │               stacks images, builds per-task masks
//       ▼
//   DataLoader        → feeds batches to the training loop
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Walks the Task/class folder layout
pub mod scanner;

/// Decodes, augments and normalises images
pub mod transform;

/// Implements Burn's Dataset trait for tree samples
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Seeded train/validation/test split
pub mod splitter;
