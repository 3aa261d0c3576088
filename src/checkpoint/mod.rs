//! Checkpoint bookkeeping: filename codec, directory scanning, the
//! evaluation log and batch selection.

pub mod batch;
mod codec;
mod eval_log;
mod manager;
mod selection;

pub use batch::{run_batch, BatchOutcome, BatchPlan, CheckpointEvaluator};
pub use codec::{filename_to_index, index_to_filename, is_checkpoint_data_file, STEPS_PER_INDEX};
pub use eval_log::{EvalLog, EvalLogWriter, HighWaterMarkPolicy};
pub use manager::CheckpointManager;
pub use selection::SelectionWindow;
