// ============================================================
// Layer 5 — Best-Checkpoint Selection
// ============================================================
// After every validation phase the selector is shown the four
// task accuracies and decides whether the current model becomes
// the new best snapshot.
//
//   Empty ──first val epoch──▶ Saved { epoch, snapshot }
//   Saved ──policy fires────▶ Saved { epoch', snapshot' }
//
// The decision itself is a swappable `CheckpointPolicy`:
//
//   coupled      any task beats its best → ALL four bests are
//                replaced by the current accuracies
//   independent  every task tracks its own best; fires when at
//                least one of them improved
//   mean         mean of the defined accuracies beats its best
//
// Comparisons are strict. A NaN accuracy never improves
// anything, and a NaN best is beaten by any number.

use serde::{Deserialize, Serialize};

use crate::domain::task::{PerTask, TaskAccuracies};

/// `current` strictly beats `best`
pub fn improves(current: f64, best: f64) -> bool {
    !current.is_nan() && (best.is_nan() || current > best)
}

pub trait CheckpointPolicy: std::fmt::Debug {
    fn kind(&self) -> PolicyKind;

    /// Update internal bests with one epoch's accuracies and report
    /// whether this epoch should become the snapshot.
    fn observe(&mut self, accuracies: &TaskAccuracies) -> bool;

    /// Best accuracies as the policy currently tracks them
    fn bests(&self) -> TaskAccuracies;

    /// Reinstate bests saved by an earlier run.
    fn restore(&mut self, bests: TaskAccuracies);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    #[default]
    Coupled,
    Independent,
    Mean,
}

impl PolicyKind {
    pub fn build(self) -> Box<dyn CheckpointPolicy> {
        match self {
            PolicyKind::Coupled     => Box::new(CoupledBest::default()),
            PolicyKind::Independent => Box::new(IndependentBest::default()),
            PolicyKind::Mean        => Box::new(MeanScore::default()),
        }
    }
}

// ─── Policies ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CoupledBest {
    best: TaskAccuracies,
}

impl Default for CoupledBest {
    fn default() -> Self {
        Self { best: PerTask::splat(f64::NAN) }
    }
}

impl CheckpointPolicy for CoupledBest {
    fn kind(&self) -> PolicyKind { PolicyKind::Coupled }

    fn observe(&mut self, accuracies: &TaskAccuracies) -> bool {
        let fired = accuracies.iter().any(|(task, &acc)| improves(acc, *self.best.get(task)));
        if fired {
            self.best = *accuracies;
        }
        fired
    }

    fn bests(&self) -> TaskAccuracies { self.best }

    fn restore(&mut self, bests: TaskAccuracies) { self.best = bests; }
}

#[derive(Debug, Clone)]
pub struct IndependentBest {
    best: TaskAccuracies,
}

impl Default for IndependentBest {
    fn default() -> Self {
        Self { best: PerTask::splat(f64::NAN) }
    }
}

impl CheckpointPolicy for IndependentBest {
    fn kind(&self) -> PolicyKind { PolicyKind::Independent }

    fn observe(&mut self, accuracies: &TaskAccuracies) -> bool {
        let mut fired = false;
        for (task, &acc) in accuracies.iter() {
            let best = self.best.get_mut(task);
            if improves(acc, *best) {
                *best = acc;
                fired = true;
            }
        }
        fired
    }

    fn bests(&self) -> TaskAccuracies { self.best }

    fn restore(&mut self, bests: TaskAccuracies) { self.best = bests; }
}

#[derive(Debug, Clone)]
pub struct MeanScore {
    best:      TaskAccuracies,
    best_mean: f64,
}

impl Default for MeanScore {
    fn default() -> Self {
        Self { best: PerTask::splat(f64::NAN), best_mean: f64::NAN }
    }
}

/// Mean over the tasks that had labels; NaN if none did.
pub fn defined_mean(accuracies: &TaskAccuracies) -> f64 {
    let defined: Vec<f64> = accuracies.0.iter().copied().filter(|a| !a.is_nan()).collect();
    if defined.is_empty() {
        return f64::NAN;
    }
    defined.iter().sum::<f64>() / defined.len() as f64
}

impl CheckpointPolicy for MeanScore {
    fn kind(&self) -> PolicyKind { PolicyKind::Mean }

    fn observe(&mut self, accuracies: &TaskAccuracies) -> bool {
        let mean = defined_mean(accuracies);
        let fired = improves(mean, self.best_mean);
        if fired {
            self.best      = *accuracies;
            self.best_mean = mean;
        }
        fired
    }

    fn bests(&self) -> TaskAccuracies { self.best }

    fn restore(&mut self, bests: TaskAccuracies) {
        self.best_mean = defined_mean(&bests);
        self.best      = bests;
    }
}

// ─── Selector ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum BestCheckpoint<R> {
    Empty,
    Saved { epoch: usize, snapshot: R },
}

/// Owns the policy and the snapshot it guards.
#[derive(Debug)]
pub struct CheckpointSelector<R> {
    policy: Box<dyn CheckpointPolicy>,
    state:  BestCheckpoint<R>,
}

impl<R> CheckpointSelector<R> {
    pub fn new(policy: Box<dyn CheckpointPolicy>) -> Self {
        Self { policy, state: BestCheckpoint::Empty }
    }

    /// Feed one validation epoch. `snapshot` is only called when the
    /// epoch wins. Returns whether it did.
    pub fn observe(&mut self, epoch: usize, accuracies: &TaskAccuracies, snapshot: impl FnOnce() -> R) -> bool {
        let fired = self.policy.observe(accuracies);
        // the first validation epoch always leaves a snapshot, even if
        // every accuracy was NaN
        let fired = fired || matches!(self.state, BestCheckpoint::Empty);
        if fired {
            self.state = BestCheckpoint::Saved { epoch, snapshot: snapshot() };
        }
        fired
    }

    /// Continue from a previous run's best.
    pub fn resume(&mut self, epoch: usize, bests: TaskAccuracies, snapshot: R) {
        self.policy.restore(bests);
        self.state = BestCheckpoint::Saved { epoch, snapshot };
    }

    pub fn kind(&self) -> PolicyKind {
        self.policy.kind()
    }

    pub fn bests(&self) -> TaskAccuracies {
        self.policy.bests()
    }

    pub fn best_epoch(&self) -> Option<usize> {
        match self.state {
            BestCheckpoint::Empty => None,
            BestCheckpoint::Saved { epoch, .. } => Some(epoch),
        }
    }

    pub fn into_snapshot(self) -> Option<(usize, R)> {
        match self.state {
            BestCheckpoint::Empty => None,
            BestCheckpoint::Saved { epoch, snapshot } => Some((epoch, snapshot)),
        }
    }
}
