// ============================================================
// Layer 3 — Valid-Label Mask
// ============================================================
// Marks which samples of a batch carry a label for one task.
//
// The same mask drives three things for every task and batch:
//   1. which logits rows / targets go into the loss
//   2. which predictions are compared for the correct count
//   3. the accuracy denominator
//
// A mask that selects nothing is a normal result: the task
// simply sits this batch out. Legacy `-1` labels are turned into
// `None` by `TaskLabels::from_raw` before any mask is built.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMask {
    /// (position in batch, class) for every valid entry, in batch order
    selected: Vec<(usize, usize)>,
}

impl LabelMask {
    pub fn from_labels(labels: &[Option<usize>]) -> Self {
        let selected = labels
            .iter()
            .enumerate()
            .filter_map(|(pos, label)| label.map(|class| (pos, class)))
            .collect();
        Self { selected }
    }

    pub fn valid_count(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn positions(&self) -> impl Iterator<Item = usize> + '_ {
        self.selected.iter().map(|&(p, _)| p)
    }

    pub fn classes(&self) -> impl Iterator<Item = usize> + '_ {
        self.selected.iter().map(|&(_, c)| c)
    }

    /// Count the valid entries whose prediction matches the label.
    /// `predictions` is aligned with the whole batch.
    pub fn count_correct(&self, predictions: &[usize]) -> usize {
        self.selected
            .iter()
            .filter(|&&(pos, class)| predictions.get(pos) == Some(&class))
            .count()
    }

    /// (predicted, true) pairs for the valid entries only
    pub fn pairs(&self, predictions: &[usize]) -> Vec<(usize, usize)> {
        self.selected
            .iter()
            .filter_map(|&(pos, class)| predictions.get(pos).map(|&p| (p, class)))
            .collect()
    }
}
