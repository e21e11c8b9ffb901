// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records one CSV row per epoch and phase.
//
// Output file: checkpoints/metrics.csv
//
//   epoch,phase,loss,leaf_acc,shape_acc,trunk_acc,trunk2_acc,skipped
//   0,train,1.912000,0.410000,0.372000,0.455000,0.620000,0
//   0,val,1.804500,0.450000,0.400000,0.500000,NaN,0
//   ...
//
// NaN means no sample in that phase was labelled for the task;
// `skipped` counts images that could not be decoded.
//
// A fresh run truncates the file. A resumed run keeps the rows of
// the epochs before the resume point and drops anything later, so
// an epoch whose state was never saved is not logged twice.

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::ml::accuracy::PhaseMetrics;

pub const CSV_HEADER: &str = "epoch,phase,loss,leaf_acc,shape_acc,trunk_acc,trunk2_acc,skipped";

pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Open the CSV for a run starting at `first_epoch` (0 = fresh run).
    pub fn new(dir: &Path, first_epoch: usize) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let csv_path = dir.join("metrics.csv");

        let kept = if first_epoch > 0 && csv_path.exists() {
            let text = fs::read_to_string(&csv_path)
                .with_context(|| format!("Cannot read '{}'", csv_path.display()))?;
            rows_before(&text, first_epoch)
        } else {
            Vec::new()
        };

        let mut f = fs::File::create(&csv_path)
            .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
        writeln!(f, "{CSV_HEADER}")?;
        for row in &kept {
            writeln!(f, "{row}")?;
        }
        tracing::debug!("Metrics CSV '{}' ({} earlier rows kept)", csv_path.display(), kept.len());

        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &PhaseMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        let accs: Vec<String> = m.accuracies.0.iter().map(|a| format!("{a:.6}")).collect();
        writeln!(f, "{},{},{:.6},{},{}", m.epoch, m.phase, m.loss, accs.join(","), m.skipped)?;
        Ok(())
    }
}

/// Data rows of an existing CSV whose epoch is below `epoch`
fn rows_before(text: &str, epoch: usize) -> Vec<String> {
    text.lines()
        .skip(1)
        .filter(|line| {
            line.split(',')
                .next()
                .and_then(|e| e.parse::<usize>().ok())
                .is_some_and(|e| e < epoch)
        })
        .map(str::to_string)
        .collect()
}
