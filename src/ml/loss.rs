// ============================================================
// Layer 5 — Partial-Label Loss
// ============================================================
// Each sample is labelled for one task only, so every head is
// trained on the rows that carry its label and nothing else.
//
//   loss = Σ over tasks with ≥1 labelled row in the batch of
//          CE(logits[task][rows], classes)
//
// A task with no labelled rows adds no term at all, so its head
// (and the trunk, through it) receives no gradient from that
// batch. The sum is deliberately not divided by the number of
// active tasks: a batch touching three tasks pushes harder than a
// batch touching one.
//
// If no task is active the result is `None`; the caller records a
// zero loss and skips the optimiser step.

use burn::{nn::loss::CrossEntropyLossConfig, prelude::*};

use crate::data::batcher::TreeBatch;
use crate::domain::task::Task;
use crate::ml::model::TaskLogits;

/// Cross-entropy of one head over its labelled rows.
pub fn task_loss<B: Backend>(
    logits: &Tensor<B, 2>,
    rows: Tensor<B, 1, Int>,
    classes: Tensor<B, 1, Int>,
) -> Tensor<B, 1> {
    let ce = CrossEntropyLossConfig::new().init(&logits.device());
    ce.forward(logits.clone().select(0, rows), classes)
}

/// Unweighted sum of the per-task losses defined for this batch.
pub fn partial_loss<B: Backend>(logits: &TaskLogits<B>, batch: &TreeBatch<B>) -> Option<Tensor<B, 1>> {
    Task::ALL
        .into_iter()
        .filter_map(|task| {
            let selection = batch.target(task).selection.clone()?;
            Some(task_loss(logits.get(task), selection.rows, selection.classes))
        })
        .reduce(|total, loss| total + loss)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sample::TreeSample;
    use crate::domain::task::TaskLabels;
    use burn::backend::{ndarray::NdArray, Autodiff};
    use burn::tensor::Distribution;

    type TestBackend = NdArray<f32>;
    type TestAutodiff = Autodiff<NdArray<f32>>;

    fn batch<B: Backend>(labels: &[TaskLabels], device: &B::Device) -> TreeBatch<B> {
        let decoded = labels
            .iter()
            .enumerate()
            .map(|(i, l)| (TreeSample::new(format!("{i}.jpg"), *l), vec![0.0; 3]))
            .collect();
        TreeBatch::from_decoded(decoded, 1, device).unwrap()
    }

    fn random_logits<B: Backend>(n: usize, device: &B::Device) -> TaskLogits<B> {
        let rand = |c: usize| Tensor::<B, 2>::random([n, c], Distribution::Normal(0.0, 1.0), device);
        TaskLogits { leaf: rand(3), shape: rand(3), trunk: rand(3), trunk2: rand(2) }
    }

    fn scalar<B: Backend>(t: Tensor<B, 1>) -> f64 {
        t.into_scalar().elem::<f64>()
    }

    #[test]
    fn test_loss_equals_sum_of_active_task_losses() {
        let device = Default::default();
        let labels = [
            TaskLabels::single(Task::Leaf, 0),
            TaskLabels::single(Task::Trunk, 2),
            TaskLabels::single(Task::Leaf, 1),
        ];
        let b = batch::<TestBackend>(&labels, &device);
        let logits = random_logits::<TestBackend>(3, &device);

        let ce = CrossEntropyLossConfig::new().init(&device);
        let leaf = ce.forward(
            logits.leaf.clone().select(0, Tensor::from_ints([0, 2], &device)),
            Tensor::from_ints([0, 1], &device),
        );
        let trunk = ce.forward(
            logits.trunk.clone().select(0, Tensor::from_ints([1], &device)),
            Tensor::from_ints([2], &device),
        );

        let total = scalar(partial_loss(&logits, &b).unwrap());
        assert!((total - (scalar(leaf) + scalar(trunk))).abs() < 1e-5);
    }

    #[test]
    fn test_inactive_task_logits_do_not_affect_loss() {
        let device = Default::default();
        let labels = [TaskLabels::single(Task::Leaf, 2), TaskLabels::single(Task::Shape, 0)];
        let b = batch::<TestBackend>(&labels, &device);

        let logits = random_logits::<TestBackend>(2, &device);
        let mut changed = logits.clone();
        changed.trunk  = changed.trunk * 100.0 - 7.0;
        changed.trunk2 = Tensor::random([2, 2], Distribution::Normal(5.0, 3.0), &device);

        let a = scalar(partial_loss(&logits, &b).unwrap());
        let c = scalar(partial_loss(&changed, &b).unwrap());
        assert_eq!(a, c);
    }

    #[test]
    fn test_inactive_head_gets_no_gradient() {
        let device = Default::default();
        let labels = [TaskLabels::single(Task::Shape, 1), TaskLabels::single(Task::Shape, 2)];
        let b = batch::<TestAutodiff>(&labels, &device);

        let logits = random_logits::<TestAutodiff>(2, &device);
        let leaf   = logits.leaf.clone().require_grad();
        let shape  = logits.shape.clone().require_grad();
        let with_grads = TaskLogits { leaf: leaf.clone(), shape: shape.clone(), ..logits };

        let grads = partial_loss(&with_grads, &b).unwrap().backward();
        assert!(leaf.grad(&grads).is_none());
        assert!(shape.grad(&grads).is_some());
    }

    #[test]
    fn test_no_active_task_gives_no_loss() {
        let device = Default::default();
        let b = batch::<TestBackend>(&[TaskLabels::default(), TaskLabels::default()], &device);
        let logits = random_logits::<TestBackend>(2, &device);
        assert!(partial_loss(&logits, &b).is_none());
    }
}
