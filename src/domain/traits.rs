// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The seams between the training core and its collaborators.
// The core programs against these traits only:
//
//   SampleSource  → where labelled samples come from
//                   (FolderScanner walks the data directory)
//   ImageDecoder  → turns a path into normalised pixels
//                   (FileImageDecoder decodes + augments with `image`;
//                    tests use a synthetic decoder)
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use std::fmt::Debug;
use std::path::Path;

use anyhow::Result;

use crate::domain::sample::{Phase, TreeSample};

// ─── SampleSource ─────────────────────────────────────────────────────────────
/// Any component that can list labelled samples.
pub trait SampleSource {
    /// Every sample available, in a deterministic order
    fn load_all(&self) -> Result<Vec<TreeSample>>;
}

// ─── ImageDecoder ─────────────────────────────────────────────────────────────
/// Maps (path, phase) to a fixed-size normalised image.
///
/// Output layout is channel-major `[3, size, size]`, flattened.
/// `seed` drives any random augmentation so that a given
/// (run, epoch, sample) always sees the same pixels.
pub trait ImageDecoder: Debug + Send + Sync {
    fn decode(&self, path: &Path, phase: Phase, seed: u64) -> Result<Vec<f32>>;

    /// Side length of the square output image
    fn image_size(&self) -> usize;
}
