// ============================================================
// Layer 2 — Evaluate Use Case
// ============================================================
// Reloads the best model of a finished run and reports on the
// held-out test split saved by `train`:
//   1. Load config, split manifest and best weights
//   2. Collect (predicted, true) pairs per task
//   3. Print confusion matrix + classification report per task
//   4. Write evaluation.json

use anyhow::Result;

use crate::domain::task::Task;
use crate::infra::checkpoint::CheckpointManager;
use crate::infra::report::{save_evaluation, TaskReport};
use crate::ml::evaluator::Evaluator;

pub struct EvaluateUseCase {
    checkpoint_dir: String,
    batch_size:     usize,
}

impl EvaluateUseCase {
    pub fn new(checkpoint_dir: String, batch_size: usize) -> Self {
        Self { checkpoint_dir, batch_size }
    }

    pub fn execute(&self) -> Result<()> {
        let ckpt      = CheckpointManager::new(&self.checkpoint_dir)?;
        let test      = ckpt.load_splits()?.test;
        let evaluator = Evaluator::from_checkpoint(&ckpt, self.batch_size)?;

        tracing::info!("Evaluating on {} test images", test.len());
        let evaluation = evaluator.evaluate(test);
        println!("{}", evaluation.metrics);

        let reports: Vec<TaskReport> = Task::ALL
            .iter()
            .map(|&task| TaskReport::new(task, evaluation.pairs.get(task)))
            .collect();
        for report in &reports {
            println!("\n{report}");
        }

        let path = save_evaluation(ckpt.dir(), &evaluation.metrics, &reports)?;
        tracing::info!("Wrote '{}'", path.display());
        Ok(())
    }
}
