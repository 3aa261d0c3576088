use crate::checkpoint::{CheckpointManager, EvalLog, HighWaterMarkPolicy, SelectionWindow};
use crate::error::{EvalError, SelectionError};

/// Something that can evaluate one checkpoint at a time.
///
/// Batch runs call `reset`, `restore` and `evaluate` in that order for every
/// selected checkpoint.
pub trait CheckpointEvaluator {
    /// Clear accumulated per-checkpoint state.
    fn reset(&mut self);
    /// Load the parameters of checkpoint `index`.
    fn restore(&mut self, index: u64) -> Result<(), EvalError>;
    /// Evaluate the currently restored parameters and return a report line
    /// starting with `index` and a tab.
    fn evaluate(&mut self, index: u64) -> Result<String, EvalError>;
}

/// Inputs of a batch evaluation over one run directory.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    pub checkpoints: CheckpointManager,
    pub log: EvalLog,
    pub window: SelectionWindow,
    pub policy: HighWaterMarkPolicy,
}

impl BatchPlan {
    /// Checkpoints the next batch run would evaluate, oldest first.
    pub fn select(&self) -> Result<Vec<u64>, EvalError> {
        let high_water_mark = self.log.high_water_mark(self.policy)?;
        tracing::debug!(
            high_water_mark,
            policy = ?self.policy,
            "Maximum checked ckpt is {}",
            high_water_mark
        );
        let available = self.checkpoints.available_indices()?;
        Ok(self.window.select(high_water_mark, available)?)
    }
}

/// Result of a completed batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Checkpoints evaluated and appended to the log, in order.
    Evaluated(Vec<u64>),
    /// No checkpoint at or above `start` exists yet.
    NothingToEvaluate { start: u64 },
}

/// Evaluate every selected checkpoint in ascending order, appending each
/// report to the evaluation log as soon as it is produced.
///
/// The first failure stops the run. Reports written before it stay in the
/// log, so a rerun resumes after the last completed checkpoint.
pub fn run_batch(
    plan: &BatchPlan,
    evaluator: &mut dyn CheckpointEvaluator,
) -> Result<BatchOutcome, EvalError> {
    let selected = match plan.select() {
        Ok(selected) => selected,
        Err(EvalError::Selection(SelectionError::NothingToEvaluate { start })) => {
            tracing::warn!(
                dir = %plan.checkpoints.checkpoint_dir().display(),
                start,
                "No checkpoints left to evaluate"
            );
            return Ok(BatchOutcome::NothingToEvaluate { start });
        }
        Err(e) => return Err(e),
    };
    tracing::info!(count = selected.len(), checkpoints = ?selected, "Selected checkpoints");

    let mut writer = plan.log.open_writer()?;
    let mut done = Vec::with_capacity(selected.len());
    for ckpt in selected {
        tracing::info!("Evaluation of ckpt {}", ckpt);
        evaluator.reset();
        evaluator.restore(ckpt)?;
        let report = evaluator.evaluate(ckpt)?;
        writer.append(&report)?;
        done.push(ckpt);
    }
    Ok(BatchOutcome::Evaluated(done))
}
