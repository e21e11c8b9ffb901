// ============================================================
// Layer 4 — Tree Batcher
// ============================================================
// Implements Burn's Batcher trait: decodes the images of a
// mini-batch and stacks them into one tensor, and prepares the
// per-task label masks the loss and accuracy code need.
//
// Output of one batch of N decoded samples:
//   images   [N, 3, S, S]           float
//   targets  4 × TaskTargets        one per task
//
// TaskTargets holds the host-side LabelMask plus, when the task
// has at least one labelled sample, two aligned Int tensors:
//   rows     positions in the batch with a label for the task
//   classes  the label at each of those positions
//
// Corrupt images: the decoder error is logged and that sample is
// dropped from the batch. If nothing in the batch decodes there is
// no TreeBatch and the loop only counts the skipped samples.
//
// Images of one batch are decoded on a rayon pool of `num_workers`
// threads. The data loader itself stays single-threaded, so batches
// arrive in dataset order and the decoded rows keep sample order.
//
// Reference: Burn Book §4 (Batcher)

use std::sync::Arc;

use anyhow::{Context, Result};
use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};
use rayon::{prelude::*, ThreadPool, ThreadPoolBuilder};

use crate::data::dataset::TreeItem;
use crate::domain::mask::LabelMask;
use crate::domain::sample::{Phase, TreeSample};
use crate::domain::task::{PerTask, Task};
use crate::domain::traits::ImageDecoder;

// ─── TaskTargets ──────────────────────────────────────────────────────────────
/// Device tensors selecting the labelled rows of one task
#[derive(Debug, Clone)]
pub struct Selection<B: Backend> {
    pub rows:    Tensor<B, 1, Int>,
    pub classes: Tensor<B, 1, Int>,
}

#[derive(Debug, Clone)]
pub struct TaskTargets<B: Backend> {
    pub mask:      LabelMask,
    /// `None` when no sample in the batch is labelled for this task
    pub selection: Option<Selection<B>>,
}

impl<B: Backend> TaskTargets<B> {
    pub fn new(mask: LabelMask, device: &B::Device) -> Self {
        if mask.is_empty() {
            return Self { mask, selection: None };
        }
        let rows: Vec<i32>    = mask.positions().map(|p| p as i32).collect();
        let classes: Vec<i32> = mask.classes().map(|c| c as i32).collect();
        let selection = Selection {
            rows:    Tensor::<B, 1, Int>::from_ints(rows.as_slice(), device),
            classes: Tensor::<B, 1, Int>::from_ints(classes.as_slice(), device),
        };
        Self { mask, selection: Some(selection) }
    }
}

// ─── TreeBatch ────────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct TreeBatch<B: Backend> {
    /// Normalised images, shape [batch_size, 3, size, size]
    pub images:  Tensor<B, 4>,
    pub targets: PerTask<TaskTargets<B>>,
}

impl<B: Backend> TreeBatch<B> {
    /// Stack already-decoded images with their samples' labels.
    pub fn from_decoded(
        decoded: Vec<(TreeSample, Vec<f32>)>,
        image_size: usize,
        device: &B::Device,
    ) -> Option<Self> {
        if decoded.is_empty() {
            return None;
        }
        let batch_size = decoded.len();

        let targets = PerTask(Task::ALL.map(|task| {
            let labels: Vec<Option<usize>> =
                decoded.iter().map(|(s, _)| s.labels.get(task)).collect();
            TaskTargets::new(LabelMask::from_labels(&labels), device)
        }));

        let flat: Vec<f32> = decoded.into_iter().flat_map(|(_, px)| px).collect();
        let images = Tensor::<B, 4>::from_data(
            TensorData::new(flat, [batch_size, 3, image_size, image_size]),
            device,
        );

        Some(Self { images, targets })
    }

    pub fn len(&self) -> usize {
        self.images.dims()[0]
    }

    pub fn target(&self, task: Task) -> &TaskTargets<B> {
        self.targets.get(task)
    }
}

/// What the batcher hands the loop for one mini-batch
#[derive(Debug, Clone)]
pub struct DecodedBatch<B: Backend> {
    /// `None` when no image of the mini-batch decoded
    pub batch:   Option<TreeBatch<B>>,
    /// Samples dropped because their image failed to decode
    pub skipped: usize,
}

// ─── TreeBatcher ──────────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct TreeBatcher<B: Backend> {
    decoder: Arc<dyn ImageDecoder>,
    phase:   Phase,
    device:  B::Device,
    pool:    Option<Arc<ThreadPool>>,
}

impl<B: Backend> TreeBatcher<B> {
    /// Decodes on the calling thread.
    pub fn new(decoder: Arc<dyn ImageDecoder>, phase: Phase, device: B::Device) -> Self {
        Self { decoder, phase, device, pool: None }
    }

    /// Decode each batch on `workers` threads (1 keeps decoding inline).
    pub fn with_workers(mut self, workers: usize) -> Result<Self> {
        if workers > 1 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(workers)
                .thread_name(|i| format!("decode-{i}"))
                .build()
                .context("Cannot start the image decoding pool")?;
            self.pool = Some(Arc::new(pool));
        }
        Ok(self)
    }

    fn decode(&self, item: TreeItem) -> Option<(TreeSample, Vec<f32>)> {
        match self.decoder.decode(&item.sample.path, self.phase, item.seed) {
            Ok(pixels) => Some((item.sample, pixels)),
            Err(e) => {
                tracing::warn!("Skipping '{}': {:#}", item.sample.path.display(), e);
                None
            }
        }
    }
}

impl<B: Backend> Batcher<TreeItem, DecodedBatch<B>> for TreeBatcher<B> {
    fn batch(&self, items: Vec<TreeItem>) -> DecodedBatch<B> {
        let requested = items.len();

        // rayon collect() into a Vec keeps item order
        let decoded: Vec<(TreeSample, Vec<f32>)> = match &self.pool {
            Some(pool) => pool.install(|| {
                items.into_par_iter().filter_map(|item| self.decode(item)).collect()
            }),
            None => items.into_iter().filter_map(|item| self.decode(item)).collect(),
        };

        let skipped = requested - decoded.len();
        if skipped > 0 {
            tracing::debug!("{} of {} images in the batch could not be decoded", skipped, requested);
        }
        DecodedBatch {
            batch: TreeBatch::from_decoded(decoded, self.decoder.image_size(), &self.device),
            skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task::TaskLabels;
    use anyhow::{bail, Result};
    use burn::backend::ndarray::NdArray;
    use std::path::Path;

    type TestBackend = NdArray<f32>;

    /// Fills every pixel with a constant; paths containing "bad" fail.
    #[derive(Debug)]
    struct FlatDecoder;

    impl ImageDecoder for FlatDecoder {
        fn decode(&self, path: &Path, _phase: Phase, _seed: u64) -> Result<Vec<f32>> {
            if path.to_string_lossy().contains("bad") {
                bail!("corrupt");
            }
            Ok(vec![0.5; 3 * 4 * 4])
        }

        fn image_size(&self) -> usize { 4 }
    }

    fn item(path: &str, labels: TaskLabels) -> TreeItem {
        TreeItem { sample: TreeSample::new(path, labels), seed: 0 }
    }

    /// Pixel value encodes the item seed, so row order is visible.
    #[derive(Debug)]
    struct SeedDecoder;

    impl ImageDecoder for SeedDecoder {
        fn decode(&self, _path: &Path, _phase: Phase, seed: u64) -> Result<Vec<f32>> {
            Ok(vec![seed as f32; 3 * 2 * 2])
        }

        fn image_size(&self) -> usize { 2 }
    }

    #[test]
    fn test_batch_shapes_and_masks() {
        let batcher = TreeBatcher::<TestBackend>::new(Arc::new(FlatDecoder), Phase::Val, Default::default());
        let batch = batcher.batch(vec![
            item("a.jpg", TaskLabels::single(Task::Leaf, 2)),
            item("b.jpg", TaskLabels::single(Task::Trunk, 0)),
            item("c.jpg", TaskLabels::single(Task::Leaf, 1)),
        ]).batch.unwrap();

        assert_eq!(batch.images.dims(), [3, 3, 4, 4]);
        assert_eq!(batch.target(Task::Leaf).mask.valid_count(), 2);
        assert_eq!(batch.target(Task::Trunk).mask.valid_count(), 1);
        assert!(batch.target(Task::Shape).selection.is_none());

        let leaf = batch.target(Task::Leaf).selection.clone().unwrap();
        let rows: Vec<i64> = leaf.rows.into_data().convert::<i64>().to_vec().unwrap();
        let classes: Vec<i64> = leaf.classes.into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(rows, vec![0, 2]);
        assert_eq!(classes, vec![2, 1]);
    }

    #[test]
    fn test_corrupt_images_are_dropped() {
        let batcher = TreeBatcher::<TestBackend>::new(Arc::new(FlatDecoder), Phase::Train, Default::default());
        let decoded = batcher.batch(vec![
            item("bad.jpg", TaskLabels::single(Task::Leaf, 0)),
            item("ok.jpg",  TaskLabels::single(Task::Shape, 1)),
        ]);
        assert_eq!(decoded.skipped, 1);

        let batch = decoded.batch.unwrap();
        assert_eq!(batch.len(), 1);
        assert!(batch.target(Task::Leaf).mask.is_empty());
        assert_eq!(batch.target(Task::Shape).mask.valid_count(), 1);
    }

    #[test]
    fn test_all_corrupt_yields_none() {
        let batcher = TreeBatcher::<TestBackend>::new(Arc::new(FlatDecoder), Phase::Val, Default::default());
        let decoded = batcher.batch(vec![
            item("bad.jpg",  TaskLabels::single(Task::Leaf, 0)),
            item("bad2.jpg", TaskLabels::single(Task::Shape, 0)),
        ]);
        assert!(decoded.batch.is_none());
        assert_eq!(decoded.skipped, 2);
    }

    #[test]
    fn test_parallel_decoding_keeps_sample_order() {
        let batcher = TreeBatcher::<TestBackend>::new(Arc::new(SeedDecoder), Phase::Train, Default::default())
            .with_workers(4)
            .unwrap();
        let items: Vec<TreeItem> = (0..16)
            .map(|i| TreeItem {
                sample: TreeSample::new(format!("{i}.jpg"), TaskLabels::single(Task::Leaf, i % 3)),
                seed:   i as u64,
            })
            .collect();

        let batch = batcher.batch(items).batch.unwrap();
        let pixels: Vec<f32> = batch.images.into_data().to_vec().unwrap();
        let firsts: Vec<f32> = pixels.chunks(3 * 2 * 2).map(|row| row[0]).collect();
        assert_eq!(firsts, (0..16).map(|i| i as f32).collect::<Vec<_>>());

        let classes: Vec<usize> = batch.targets.get(Task::Leaf).mask.classes().collect();
        assert_eq!(classes, (0..16).map(|i| i % 3).collect::<Vec<_>>());
    }
}
