use crate::error::SelectionError;

/// Bounds applied when choosing which checkpoints a batch run evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionWindow {
    /// Lowest checkpoint index eligible for evaluation.
    pub min_ckpt: u64,
    /// Minimum index gap between two selected checkpoints.
    pub step: u64,
}

impl SelectionWindow {
    pub fn new(min_ckpt: u64, step: u64) -> Self {
        SelectionWindow { min_ckpt, step }
    }

    /// First eligible index given the already-evaluated high-water mark.
    pub fn start(&self, high_water_mark: u64) -> u64 {
        self.min_ckpt.max(high_water_mark.saturating_add(1))
    }

    /// Pick the checkpoints to evaluate, oldest first.
    ///
    /// The newest eligible checkpoint is always selected. Walking backwards
    /// from it, an older checkpoint is selected once it lies at least `step`
    /// indices below the previously selected one.
    pub fn select(
        &self,
        high_water_mark: u64,
        available: impl IntoIterator<Item = u64>,
    ) -> Result<Vec<u64>, SelectionError> {
        let start = self.start(high_water_mark);

        let mut eligible: Vec<u64> = available.into_iter().filter(|&n| n >= start).collect();
        eligible.sort_unstable();
        eligible.dedup();

        let Some((&newest, older)) = eligible.split_last() else {
            return Err(SelectionError::NothingToEvaluate { start });
        };

        let mut selected = vec![newest];
        let mut last = newest;
        for &n in older.iter().rev() {
            if last - n >= self.step {
                selected.push(n);
                last = n;
            }
        }
        selected.reverse();
        Ok(selected)
    }
}
