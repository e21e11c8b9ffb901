// ============================================================
// Layer 5 — Per-Task Accuracy Accumulator
// ============================================================
// Running sums for one phase of one epoch:
//
//   loss_sum    Σ batch_loss × batch_len
//   samples     Σ batch_len
//   correct[t]  Σ |{i : label_t(i) present ∧ argmax_t(i) = label_t(i)}|
//   valid[t]    Σ |{i : label_t(i) present}|
//   skipped     Σ samples whose image failed to decode
//
// At phase end:
//   loss        = loss_sum / samples
//   accuracy[t] = correct[t] / valid[t]   (NaN when valid[t] = 0)
//
// Both counts are running totals over every batch of the phase;
// nothing is ever taken from the last batch alone.

use std::fmt;

use burn::prelude::*;
use serde::Serialize;

use crate::data::batcher::{DecodedBatch, TreeBatch};
use crate::domain::mask::LabelMask;
use crate::domain::sample::Phase;
use crate::domain::task::{PerTask, Task, TaskAccuracies};
use crate::ml::model::TaskLogits;

/// Metrics of one finished phase
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseMetrics {
    pub epoch:      usize,
    pub phase:      Phase,
    pub loss:       f64,
    pub accuracies: TaskAccuracies,
    pub samples:    usize,
    pub valid:      PerTask<usize>,
    /// Samples dropped because their image could not be decoded
    pub skipped:    usize,
}

impl fmt::Display for PhaseMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Loss: {:.4} | {}", self.phase, self.loss, self.accuracies)?;
        if self.skipped > 0 {
            write!(f, " | Skipped: {}", self.skipped)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PhaseAccumulator {
    phase:    Phase,
    loss_sum: f64,
    samples:  usize,
    correct:  PerTask<usize>,
    valid:    PerTask<usize>,
    skipped:  usize,
}

impl PhaseAccumulator {
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            loss_sum: 0.0,
            samples:  0,
            correct:  PerTask::default(),
            valid:    PerTask::default(),
            skipped:  0,
        }
    }

    /// Count the batcher's dropped samples and pass on what decoded.
    pub fn admit<B: Backend>(&mut self, decoded: DecodedBatch<B>) -> Option<TreeBatch<B>> {
        self.skipped += decoded.skipped;
        decoded.batch
    }

    /// `loss` is the batch mean; `None` (no task active) counts as zero.
    pub fn record_loss(&mut self, loss: Option<f64>, batch_len: usize) {
        self.loss_sum += loss.unwrap_or(0.0) * batch_len as f64;
        self.samples  += batch_len;
    }

    pub fn record_task(&mut self, task: Task, mask: &LabelMask, predictions: &[usize]) {
        *self.correct.get_mut(task) += mask.count_correct(predictions);
        *self.valid.get_mut(task)   += mask.valid_count();
    }

    /// Update every counter from one batch's logits and targets.
    pub fn record_batch<B: Backend>(
        &mut self,
        loss: Option<f64>,
        logits: &TaskLogits<B>,
        batch: &TreeBatch<B>,
    ) {
        self.record_loss(loss, batch.len());
        for task in Task::ALL {
            let mask = &batch.target(task).mask;
            if mask.is_empty() {
                continue;
            }
            self.record_task(task, mask, &predictions(logits.get(task)));
        }
    }

    pub fn accuracy(&self, task: Task) -> f64 {
        let valid = *self.valid.get(task);
        if valid == 0 {
            return f64::NAN;
        }
        *self.correct.get(task) as f64 / valid as f64
    }

    pub fn finish(self, epoch: usize) -> PhaseMetrics {
        let loss = if self.samples > 0 { self.loss_sum / self.samples as f64 } else { f64::NAN };
        PhaseMetrics {
            epoch,
            phase: self.phase,
            loss,
            accuracies: PerTask(Task::ALL.map(|t| self.accuracy(t))),
            samples: self.samples,
            valid: self.valid,
            skipped: self.skipped,
        }
    }
}

/// Row-wise argmax of `[batch, classes]` logits.
pub fn predictions<B: Backend>(logits: &Tensor<B, 2>) -> Vec<usize> {
    // argmax(1) gives [batch, 1]; flatten to [batch]
    logits
        .clone()
        .argmax(1)
        .flatten::<1>(0, 1)
        .into_data()
        .iter::<i64>()
        .map(|p| p as usize)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_accuracy_uses_running_sums() {
        // batch 1: 4 valid leaf labels, 1 correct
        // batch 2: 1 valid leaf label,  1 correct
        // running: 2 / 5; last batch alone would say 1.0,
        // averaging the batch ratios would say 0.625
        let mut acc = PhaseAccumulator::new(Phase::Val);
        let b1 = LabelMask::from_labels(&[Some(0), Some(1), Some(2), Some(0)]);
        acc.record_task(Task::Leaf, &b1, &[0, 0, 0, 1]);
        let b2 = LabelMask::from_labels(&[None, Some(2), None]);
        acc.record_task(Task::Leaf, &b2, &[1, 2, 0]);

        assert!((acc.accuracy(Task::Leaf) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_task_without_labels_is_nan() {
        let mut acc = PhaseAccumulator::new(Phase::Val);
        acc.record_task(Task::Shape, &LabelMask::from_labels(&[Some(1)]), &[1]);
        let m = acc.finish(0);
        assert_eq!(*m.accuracies.get(Task::Shape), 1.0);
        assert!(m.accuracies.get(Task::Trunk2).is_nan());
    }

    #[test]
    fn test_loss_weighted_by_batch_size() {
        let mut acc = PhaseAccumulator::new(Phase::Train);
        acc.record_loss(Some(1.0), 4);
        acc.record_loss(Some(2.0), 1);
        acc.record_loss(None, 5);
        let m = acc.finish(3);
        assert_eq!(m.samples, 10);
        assert!((m.loss - 0.6).abs() < 1e-12);
        assert_eq!(m.epoch, 3);
    }

    #[test]
    fn test_empty_phase() {
        let m = PhaseAccumulator::new(Phase::Test).finish(0);
        assert!(m.loss.is_nan());
        assert!(m.accuracies.0.iter().all(|a| a.is_nan()));
    }

    #[test]
    fn test_predictions_argmax_rows() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_floats(
            [[0.1, 0.9, 0.0], [2.0, -1.0, 0.5], [0.0, 0.0, 3.0]],
            &device,
        );
        assert_eq!(predictions(&logits), vec![1, 0, 2]);
    }

    #[test]
    fn test_summary_line() {
        let m = PhaseMetrics {
            epoch:      0,
            phase:      Phase::Val,
            loss:       1.23456,
            accuracies: PerTask([0.5, 1.0, 0.0, 0.25]),
            samples:    4,
            valid:      PerTask([1, 1, 1, 1]),
            skipped:    0,
        };
        assert_eq!(
            m.to_string(),
            "val Loss: 1.2346 | Leaf Acc: 0.5000 | Shape Acc: 1.0000 | Trunk Acc: 0.0000 | Trunk2 Acc: 0.2500",
        );

        let with_skips = PhaseMetrics { skipped: 2, ..m };
        assert!(with_skips.to_string().ends_with(" | Skipped: 2"));
    }

    #[test]
    fn test_admit_counts_skipped_samples() {
        let mut acc = PhaseAccumulator::new(Phase::Train);
        let empty: DecodedBatch<TestBackend> = DecodedBatch { batch: None, skipped: 3 };
        assert!(acc.admit(empty).is_none());
        assert!(acc.admit(DecodedBatch::<TestBackend> { batch: None, skipped: 1 }).is_none());

        let m = acc.finish(0);
        assert_eq!(m.skipped, 4);
        assert_eq!(m.samples, 0);
    }
}
