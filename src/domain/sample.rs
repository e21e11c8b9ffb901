// ============================================================
// Layer 3 — TreeSample Domain Type
// ============================================================
// One photograph and the labels it carries. By the time a
// TreeSample exists the file has been found on disk, but it has
// not been decoded: decoding happens per batch, per phase, so the
// same sample can be augmented differently on every pass.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::task::{Task, TaskLabels};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeSample {
    pub path:   PathBuf,
    pub labels: TaskLabels,
}

impl TreeSample {
    pub fn new(path: impl Into<PathBuf>, labels: TaskLabels) -> Self {
        Self { path: path.into(), labels }
    }

    /// The task this sample was scanned for, if exactly one label is present
    pub fn task(&self) -> Option<Task> {
        let mut present = Task::ALL.into_iter().filter(|&t| self.labels.get(t).is_some());
        match (present.next(), present.next()) {
            (Some(task), None) => Some(task),
            _ => None,
        }
    }
}

/// Which pass of the loop a batch belongs to.
/// Only `Train` updates parameters and uses random augmentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Train,
    Val,
    Test,
}

impl Phase {
    pub fn is_train(self) -> bool {
        matches!(self, Phase::Train)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Train => "train",
            Phase::Val   => "val",
            Phase::Test  => "test",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_of_single_label_sample() {
        let s = TreeSample::new("a.jpg", TaskLabels::single(Task::Shape, 0));
        assert_eq!(s.task(), Some(Task::Shape));
    }

    #[test]
    fn test_task_of_unlabelled_or_multi_label_sample() {
        let none = TreeSample::new("a.jpg", TaskLabels::default());
        let two  = TreeSample::new("b.jpg", TaskLabels::from_raw([0, 1, -1, -1]));
        assert_eq!(none.task(), None);
        assert_eq!(two.task(), None);
    }
}
