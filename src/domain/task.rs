// ============================================================
// Layer 3 — Task Domain Types
// ============================================================
// The four classification targets and their per-sample labels.
//
// Every photograph is labelled for exactly ONE task (the folder
// it was found in). The other three labels are absent. Older
// exports encode "absent" as -1; inside the crate an absent label
// is simply `None`, so no code ever has to remember that -1 is
// not a class.
//
//   Task     Folder   Classes
//   ───────  ───────  ────────────────────────
//   Leaf     Leaf     down, horizontal, up
//   Shape    Shape    conical, long, short
//   Trunk    Trunk    basin, crawl, stand
//   Trunk2   Trunk2   many, one

use std::fmt;

use serde::{Deserialize, Serialize};

/// Legacy integer used for "no label" in exported label vectors.
pub const SENTINEL: i64 = -1;

pub const TASK_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Task {
    Leaf,
    Shape,
    Trunk,
    Trunk2,
}

impl Task {
    pub const ALL: [Task; TASK_COUNT] = [Task::Leaf, Task::Shape, Task::Trunk, Task::Trunk2];

    pub fn index(self) -> usize {
        match self {
            Task::Leaf   => 0,
            Task::Shape  => 1,
            Task::Trunk  => 2,
            Task::Trunk2 => 3,
        }
    }

    /// Sub-directory of the data root holding this task's class folders
    pub fn dir_name(self) -> &'static str {
        match self {
            Task::Leaf   => "Leaf",
            Task::Shape  => "Shape",
            Task::Trunk  => "Trunk",
            Task::Trunk2 => "Trunk2",
        }
    }

    pub fn class_names(self) -> &'static [&'static str] {
        match self {
            Task::Leaf   => &["down", "horizontal", "up"],
            Task::Shape  => &["conical", "long", "short"],
            Task::Trunk  => &["basin", "crawl", "stand"],
            Task::Trunk2 => &["many", "one"],
        }
    }

    pub fn num_classes(self) -> usize {
        self.class_names().len()
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

// ─── TaskLabels ───────────────────────────────────────────────────────────────
/// One optional class index per task, indexed by `Task::index()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "[i64; TASK_COUNT]", into = "[i64; TASK_COUNT]")]
pub struct TaskLabels([Option<usize>; TASK_COUNT]);

impl TaskLabels {
    /// Labels for a sample that only carries ground truth for `task`
    pub fn single(task: Task, class: usize) -> Self {
        let mut labels = [None; TASK_COUNT];
        labels[task.index()] = Some(class);
        Self(labels)
    }

    /// Convert the legacy `[leaf, shape, trunk, trunk2]` encoding where
    /// `SENTINEL` (or any negative value) means "absent".
    pub fn from_raw(raw: [i64; TASK_COUNT]) -> Self {
        Self(raw.map(|v| usize::try_from(v).ok()))
    }

    pub fn to_raw(&self) -> [i64; TASK_COUNT] {
        self.0.map(|v| v.map_or(SENTINEL, |c| c as i64))
    }

    pub fn get(&self, task: Task) -> Option<usize> {
        self.0[task.index()]
    }
}

// splits.json stores labels in the legacy `[leaf, shape, trunk, trunk2]` form
impl From<[i64; TASK_COUNT]> for TaskLabels {
    fn from(raw: [i64; TASK_COUNT]) -> Self {
        Self::from_raw(raw)
    }
}

impl From<TaskLabels> for [i64; TASK_COUNT] {
    fn from(labels: TaskLabels) -> Self {
        labels.to_raw()
    }
}

// ─── PerTask ──────────────────────────────────────────────────────────────────
/// A value for each of the four tasks.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PerTask<T>(pub [T; TASK_COUNT]);

impl<T> PerTask<T> {
    pub fn get(&self, task: Task) -> &T {
        &self.0[task.index()]
    }

    pub fn get_mut(&mut self, task: Task) -> &mut T {
        &mut self.0[task.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Task, &T)> {
        Task::ALL.into_iter().zip(self.0.iter())
    }
}

impl<T: Copy> PerTask<T> {
    pub fn splat(value: T) -> Self {
        Self([value; TASK_COUNT])
    }
}

/// Epoch accuracy per task; NaN when a task had no labelled samples.
pub type TaskAccuracies = PerTask<f64>;

impl fmt::Display for TaskAccuracies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .iter()
            .map(|(task, acc)| format!("{task} Acc: {acc:.4}"))
            .collect();
        f.write_str(&parts.join(" | "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_label_sets_only_one_task() {
        let labels = TaskLabels::single(Task::Trunk, 2);
        assert_eq!(labels.get(Task::Trunk), Some(2));
        assert_eq!(labels.get(Task::Leaf), None);
    }

    #[test]
    fn test_raw_conversion_maps_sentinel_to_none() {
        let labels = TaskLabels::from_raw([SENTINEL, 1, SENTINEL, SENTINEL]);
        assert_eq!(labels, TaskLabels::single(Task::Shape, 1));
        assert_eq!(labels.to_raw(), [-1, 1, -1, -1]);
    }

    #[test]
    fn test_labels_serialize_in_legacy_form() {
        let json = serde_json::to_string(&TaskLabels::single(Task::Trunk2, 0)).unwrap();
        assert_eq!(json, "[-1,-1,-1,0]");
        let back: TaskLabels = serde_json::from_str("[2,-1,-1,-1]").unwrap();
        assert_eq!(back, TaskLabels::single(Task::Leaf, 2));
    }

    #[test]
    fn test_class_counts() {
        let counts: Vec<usize> = Task::ALL.iter().map(|t| t.num_classes()).collect();
        assert_eq!(counts, vec![3, 3, 3, 2]);
    }

    #[test]
    fn test_accuracies_display() {
        let accs = PerTask([0.5, 0.25, 1.0, f64::NAN]);
        let text = accs.to_string();
        assert!(text.starts_with("Leaf Acc: 0.5000"));
        assert!(text.ends_with("Trunk2 Acc: NaN"));
    }
}
