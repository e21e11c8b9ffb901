// ============================================================
// Layer 6 — Evaluation Report
// ============================================================
// Turns the (predicted, true) pairs of one task into
//   - a confusion matrix (rows = true class, columns = predicted)
//   - per-class precision, recall, F1 and support
//   - accuracy, macro average and support-weighted average
//
// A class that is never predicted has precision 0, a class with
// no samples has recall 0; nothing here divides by zero.
//
// Output: printed tables plus checkpoints/evaluation.json

use anyhow::{Context, Result};
use serde::Serialize;
use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use crate::domain::task::Task;
use crate::ml::accuracy::PhaseMetrics;

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

fn f1(p: f64, r: f64) -> f64 {
    if p + r == 0.0 { 0.0 } else { 2.0 * p * r / (p + r) }
}

// ─── ConfusionMatrix ──────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfusionMatrix {
    num_classes: usize,
    /// matrix[true][predicted]
    matrix:      Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    pub fn new(num_classes: usize) -> Self {
        Self { num_classes, matrix: vec![vec![0; num_classes]; num_classes] }
    }

    /// Pairs naming a class outside `0..num_classes` are ignored.
    pub fn from_pairs(num_classes: usize, pairs: &[(usize, usize)]) -> Self {
        let mut cm = Self::new(num_classes);
        for &(pred, truth) in pairs {
            if pred < num_classes && truth < num_classes {
                cm.matrix[truth][pred] += 1;
            }
        }
        cm
    }

    pub fn get(&self, true_class: usize, pred_class: usize) -> usize {
        self.matrix[true_class][pred_class]
    }

    pub fn total(&self) -> usize {
        self.matrix.iter().flatten().sum()
    }

    pub fn support_per_class(&self) -> Vec<usize> {
        self.matrix.iter().map(|row| row.iter().sum()).collect()
    }

    pub fn precision_per_class(&self) -> Vec<f64> {
        (0..self.num_classes)
            .map(|c| {
                let predicted: usize = self.matrix.iter().map(|row| row[c]).sum();
                ratio(self.matrix[c][c], predicted)
            })
            .collect()
    }

    pub fn recall_per_class(&self) -> Vec<f64> {
        self.support_per_class()
            .iter()
            .enumerate()
            .map(|(c, &support)| ratio(self.matrix[c][c], support))
            .collect()
    }

    pub fn accuracy(&self) -> f64 {
        let correct: usize = (0..self.num_classes).map(|c| self.matrix[c][c]).sum();
        ratio(correct, self.total())
    }
}

// ─── ClassificationReport ─────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassScores {
    pub name:      String,
    pub precision: f64,
    pub recall:    f64,
    pub f1:        f64,
    pub support:   usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationReport {
    pub classes:      Vec<ClassScores>,
    pub accuracy:     f64,
    pub macro_avg:    ClassScores,
    pub weighted_avg: ClassScores,
}

impl ClassificationReport {
    pub fn from_confusion(cm: &ConfusionMatrix, names: &[&str]) -> Self {
        let precision = cm.precision_per_class();
        let recall    = cm.recall_per_class();
        let support   = cm.support_per_class();
        let total     = cm.total();

        let classes: Vec<ClassScores> = (0..cm.num_classes)
            .map(|c| ClassScores {
                name:      names.get(c).map_or_else(|| c.to_string(), |n| n.to_string()),
                precision: precision[c],
                recall:    recall[c],
                f1:        f1(precision[c], recall[c]),
                support:   support[c],
            })
            .collect();

        let n = classes.len().max(1) as f64;
        let macro_avg = ClassScores {
            name:      "macro avg".into(),
            precision: classes.iter().map(|s| s.precision).sum::<f64>() / n,
            recall:    classes.iter().map(|s| s.recall).sum::<f64>() / n,
            f1:        classes.iter().map(|s| s.f1).sum::<f64>() / n,
            support:   total,
        };

        let weight = |pick: fn(&ClassScores) -> f64| -> f64 {
            if total == 0 {
                return 0.0;
            }
            classes.iter().map(|s| pick(s) * s.support as f64).sum::<f64>() / total as f64
        };
        let weighted_avg = ClassScores {
            name:      "weighted avg".into(),
            precision: weight(|s| s.precision),
            recall:    weight(|s| s.recall),
            f1:        weight(|s| s.f1),
            support:   total,
        };

        Self { accuracy: cm.accuracy(), classes, macro_avg, weighted_avg }
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.classes.iter().map(|s| s.name.len()).max().unwrap_or(0).max(12);
        writeln!(f, "{:>width$} {:>9} {:>9} {:>9} {:>9}", "", "precision", "recall", "f1-score", "support")?;
        writeln!(f)?;
        for s in &self.classes {
            writeln!(f, "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}", s.name, s.precision, s.recall, s.f1, s.support)?;
        }
        writeln!(f)?;
        writeln!(f, "{:>width$} {:>9} {:>9} {:>9.2} {:>9}", "accuracy", "", "", self.accuracy, self.macro_avg.support)?;
        for s in [&self.macro_avg, &self.weighted_avg] {
            writeln!(f, "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}", s.name, s.precision, s.recall, s.f1, s.support)?;
        }
        Ok(())
    }
}

// ─── TaskReport ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub task:      Task,
    pub classes:   Vec<String>,
    pub confusion: ConfusionMatrix,
    pub report:    ClassificationReport,
}

impl TaskReport {
    pub fn new(task: Task, pairs: &[(usize, usize)]) -> Self {
        let names     = task.class_names();
        let confusion = ConfusionMatrix::from_pairs(task.num_classes(), pairs);
        let report    = ClassificationReport::from_confusion(&confusion, names);
        Self {
            task,
            classes: names.iter().map(|n| n.to_string()).collect(),
            confusion,
            report,
        }
    }
}

impl fmt::Display for TaskReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== {} ===", self.task)?;
        writeln!(f, "Confusion matrix (rows = true, columns = predicted):")?;
        let width = self.classes.iter().map(|c| c.len()).max().unwrap_or(0).max(5);
        write!(f, "{:>width$}", "")?;
        for name in &self.classes {
            write!(f, " {name:>width$}")?;
        }
        writeln!(f)?;
        for (i, name) in self.classes.iter().enumerate() {
            write!(f, "{name:>width$}")?;
            for j in 0..self.classes.len() {
                write!(f, " {:>width$}", self.confusion.get(i, j))?;
            }
            writeln!(f)?;
        }
        writeln!(f)?;
        write!(f, "{}", self.report)
    }
}

#[derive(Serialize)]
struct EvaluationFile<'a> {
    metrics: &'a PhaseMetrics,
    tasks:   &'a [TaskReport],
}

/// Write `evaluation.json` into `dir` and return its path.
pub fn save_evaluation(dir: &Path, metrics: &PhaseMetrics, reports: &[TaskReport]) -> Result<PathBuf> {
    let path = dir.join("evaluation.json");
    let json = serde_json::to_string_pretty(&EvaluationFile { metrics, tasks: reports })?;
    fs::write(&path, json).with_context(|| format!("Cannot write '{}'", path.display()))?;
    Ok(path)
}
